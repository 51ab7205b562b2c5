// CPUSCALE LOAD TEST
// STRESSES THE ACTUATION PATH: EVERY RANDOM BIT IS EITHER AN IMMEDIATE
// ENABLE (1) OR A DEBOUNCED DISABLE (0), LSB FIRST, NO SLEEP BETWEEN.
// USES THE SAME CONTROLLER TRANSITIONS AS THE NORMAL LOOP.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, info};

use crate::controller::{ControllerState, CpuSwitch, HysteresisController, TickOutcome};
use crate::event::EventLog;

pub const RANDOM_SOURCE: &str = "/dev/urandom";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadTestStats {
    pub bytes: u64,
    pub enables: u64,
    pub disables: u64,
    pub failures: u64,
}

impl LoadTestStats {
    fn count(&mut self, outcome: TickOutcome) {
        match outcome {
            TickOutcome::Enabled(_) => self.enables += 1,
            TickOutcome::Disabled(_) => self.disables += 1,
            TickOutcome::EnableFailed | TickOutcome::DisableFailed => self.failures += 1,
            _ => {}
        }
    }
}

// APPLY THE 8 BITS OF ONE RANDOM BYTE. EVERY BIT LANDS IN THE EVENT LOG.
pub fn apply_byte(
    byte: u8,
    controller: &HysteresisController,
    state: &mut ControllerState,
    cpus: &mut impl CpuSwitch,
    log: &mut EventLog,
    stats: &mut LoadTestStats,
) {
    for bit in 0..8 {
        let outcome = if (byte >> bit) & 1 == 1 {
            controller.enable_now(state, cpus)
        } else {
            controller.debounced_disable(state, cpus)
        };
        stats.count(outcome);
        log.record_forced(state.online_cpus, state.disable_debounce, outcome);
    }
    stats.bytes += 1;
}

// RUN UNTIL SHUTDOWN. A SHORT READ BACKS OFF FOR A SECOND.
pub fn run(
    source: &mut impl Read,
    controller: &HysteresisController,
    state: &mut ControllerState,
    cpus: &mut impl CpuSwitch,
    log: &mut EventLog,
    shutdown: &AtomicBool,
) -> LoadTestStats {
    let mut stats = LoadTestStats::default();
    let mut buf = [0u8; 1];
    info!("LOAD TEST: TOGGLING CPUS FROM RANDOM BITS");

    while !shutdown.load(Ordering::Relaxed) {
        match source.read(&mut buf) {
            Ok(1) => apply_byte(buf[0], controller, state, cpus, log, &mut stats),
            _ => {
                debug!("RANDOM SOURCE SHORT READ");
                std::thread::sleep(Duration::from_secs(1));
            }
        }
    }

    info!(
        "LOAD TEST: {} BYTES, {} ENABLES, {} DISABLES, {} FAILURES",
        stats.bytes, stats.enables, stats.disables, stats.failures
    );
    stats
}
