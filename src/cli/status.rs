// SLOT STATUS -- PRINTS EVERY MANAGED CPU SLOT AND ITS HOTPLUG STATE,
// THE KERNEL'S OWN ONLINE LIST, AND THE KILL SWITCH

use std::path::Path;

use anyhow::{Context, Result};

use cpuscale::hotplug::{parse_cpu_list, HotplugActuator};

pub fn run_status(actuator: &HotplugActuator, kill_switch: &Path) -> Result<()> {
    println!("{:<8} {}", "CPU", "STATE");
    println!("{:<8} {}", "cpu0", "ONLINE (UNMANAGED)");
    for &cpu in actuator.slots() {
        let state = actuator.state(cpu).map_or("UNREADABLE", |s| s.label());
        println!("{:<8} {}", format!("cpu{}", cpu), state);
    }
    println!();

    println!("ONLINE:      {}", actuator.online_count());
    let online_path = actuator.root().join("online");
    let kernel = std::fs::read_to_string(&online_path)
        .with_context(|| format!("reading {}", online_path.display()))?;
    let listed = parse_cpu_list(kernel.trim());
    println!("KERNEL:      {} ({} CPUS)", kernel.trim(), listed.len());
    println!(
        "KILL SWITCH: {}",
        if kill_switch.exists() { "PRESENT" } else { "ABSENT" }
    );

    Ok(())
}
