// ENVIRONMENT CHECK -- CAN THIS GUEST RUN CPUSCALE AT ALL?

use std::io::Read;
use std::path::Path;

use anyhow::Result;

use cpuscale::hotplug::HotplugActuator;
use cpuscale::stat::StatSampler;

const KERNEL_CONFIG: &str = "/proc/config.gz";

// NONE WHEN THE RUNNING KERNEL DOES NOT EXPOSE ITS CONFIG
fn hotplug_configured() -> Option<bool> {
    let gz = std::fs::File::open(KERNEL_CONFIG).ok()?;
    let mut config = String::new();
    flate2::read::GzDecoder::new(gz).read_to_string(&mut config).ok()?;
    Some(config.lines().any(|l| l.trim() == "CONFIG_HOTPLUG_CPU=y"))
}

pub fn run_check(sampler: &StatSampler, actuator: &HotplugActuator, kill_switch: &Path) -> Result<()> {
    println!("CPUSCALE ENVIRONMENT CHECK");
    println!();

    let mut ok = true;

    match sampler.sample() {
        Ok(t) => println!("  {:<22}OK (idle={} iowait={})", sampler.path().display(), t.idle(), t.iowait()),
        Err(e) => {
            println!("  {:<22}FAILED: {}", sampler.path().display(), e);
            ok = false;
        }
    }

    let slots = actuator.slots().len();
    if slots > 0 {
        println!("  {:<22}{} SLOTS (cpu1..cpu{})", "HOTPLUG CONTROLS", slots, slots);
    } else {
        println!("  {:<22}NONE UNDER {}", "HOTPLUG CONTROLS", actuator.root().display());
        ok = false;
    }

    let root = unsafe { libc::geteuid() } == 0;
    if root {
        println!("  {:<22}OK", "ROOT");
    } else {
        println!("  {:<22}NOT ROOT -- hotplug writes will fail", "ROOT");
        ok = false;
    }

    match hotplug_configured() {
        Some(true) => println!("  {:<22}OK", "CONFIG_HOTPLUG_CPU"),
        Some(false) => {
            println!("  {:<22}NOT SET -- this kernel cannot offline CPUs", "CONFIG_HOTPLUG_CPU");
            ok = false;
        }
        None => println!("  {:<22}{} UNAVAILABLE (SKIPPED)", "CONFIG_HOTPLUG_CPU", KERNEL_CONFIG),
    }

    if kill_switch.exists() {
        println!("  {:<22}PRESENT ({}) -- cpuscale will stay suspended", "KILL SWITCH", kill_switch.display());
    } else {
        println!("  {:<22}ABSENT", "KILL SWITCH");
    }
    println!();

    if !ok {
        println!("CHECK FAILED");
        std::process::exit(1);
    }
    println!("READY");
    Ok(())
}
