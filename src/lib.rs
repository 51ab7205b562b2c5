// CPUSCALE LIBRARY CRATE
// EVERYTHING BUT CLI PLUMBING LIVES HERE SO tests/ CAN DRIVE IT OFFLINE
// AGAINST A FAKE /proc AND sysfs TREE.

pub mod controller;
pub mod event;
pub mod hotplug;
pub mod loadtest;
pub mod stat;
pub mod supervisor;
pub mod tuning;
