// CPUSCALE SUPERVISOR LOOP
// SINGLE THREAD, ONE TICK PER POLL INTERVAL:
//   SLEEP -> (EVERY 10TH TICK: KILL SWITCH + SLOT/ONLINE RESYNC)
//         -> SAMPLE -> DELTA -> IDLE RATIO -> CONTROLLER -> ACTUATOR
//
// THE KILL SWITCH IS A MARKER FILE. WHILE IT EXISTS NOTHING IS SAMPLED
// OR WRITTEN AND THE LOOP BACKS OFF TO 30S. THE ONLY OTHER THREAD IS
// THE SIGNAL HANDLER THAT FLIPS THE SHUTDOWN FLAG.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use log::{debug, info, trace};

use crate::controller::{ControllerState, HysteresisController, TickOutcome};
use crate::event::EventLog;
use crate::hotplug::HotplugActuator;
use crate::stat::{self, CpuTimes, StatSampler};
use crate::tuning::Config;

pub const KILL_SWITCH: &str = "/etc/platform/disable_cpuscale";

// SLEEP GRANULARITY SO SHUTDOWN IS NOTICED DURING THE 30S BACKOFF
const SLEEP_SLICE: Duration = Duration::from_millis(100);

pub struct Supervisor {
    controller: HysteresisController,
    state: ControllerState,
    sampler: StatSampler,
    actuator: HotplugActuator,
    kill_switch: PathBuf,
    baseline: Option<CpuTimes>,
    pub log: EventLog,
}

impl Supervisor {
    pub fn new(
        config: Config,
        sampler: StatSampler,
        actuator: HotplugActuator,
        kill_switch: impl Into<PathBuf>,
    ) -> Self {
        let kill_switch = kill_switch.into();
        let mut state = ControllerState::new(actuator.online_count());
        state.apply_kill_switch(kill_switch.exists());
        let baseline = match sampler.sample() {
            Ok(t) => Some(t),
            Err(e) => {
                debug!("INITIAL SAMPLE FAILED: {}", e);
                None
            }
        };
        Self {
            controller: HysteresisController::new(config),
            state,
            sampler,
            actuator,
            kill_switch,
            baseline,
            log: EventLog::new(),
        }
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn actuator(&self) -> &HotplugActuator {
        &self.actuator
    }

    // ONE TICK WITHOUT THE SLEEP. NONE WHEN SUSPENDED, WHEN SAMPLING
    // FAILED, OR WHEN THIS TICK ONLY ESTABLISHED A FRESH BASELINE.
    pub fn step(&mut self) -> Option<TickOutcome> {
        if self.state.switch_check_due() {
            self.actuator.refresh();
            self.state.resync_online(self.actuator.online_count());
            self.state.apply_kill_switch(self.kill_switch.exists());
        }

        if !self.state.enabled {
            // RESUMING MUST NOT MEASURE ACROSS THE SUSPENDED WINDOW
            self.baseline = None;
            self.log.record_skipped(self.state.online_cpus);
            return None;
        }

        let current = match self.sampler.sample() {
            Ok(t) => t,
            Err(e) => {
                debug!("SAMPLE FAILED: {}", e);
                self.baseline = None;
                self.log.record_skipped(self.state.online_cpus);
                return None;
            }
        };
        let previous = match self.baseline.replace(current) {
            Some(p) => p,
            None => {
                self.log.record_skipped(self.state.online_cpus);
                return None;
            }
        };

        let d = stat::delta(&current, &previous);
        let idle = stat::idle_ratio(&d);
        trace!("DELTA {:?} IDLE {} OF {}: {}%", d.0, d.idle() + d.iowait(), d.total(), idle);

        let outcome = self.controller.tick(&mut self.state, idle, &mut self.actuator);
        self.log.record(idle, self.state.online_cpus, self.state.disable_debounce, outcome);
        Some(outcome)
    }

    pub fn run(&mut self, shutdown: &AtomicBool) {
        let cfg = self.controller.config();
        info!(
            "CONTROLLING {} SLOTS: LOW={}% HIGH={}% DELAY={} MINCPU={} ({} ONLINE)",
            self.actuator.slots().len(),
            cfg.low_pct, cfg.high_pct, cfg.disable_delay, cfg.min_cpus,
            self.state.online_cpus,
        );
        while !shutdown.load(Ordering::Relaxed) {
            if !sleep_unless(self.state.poll_interval, shutdown) {
                break;
            }
            self.step();
        }
    }
}

// SLEEP FOR dur IN SHORT SLICES. FALSE IF SHUTDOWN WAS REQUESTED.
pub fn sleep_unless(dur: Duration, shutdown: &AtomicBool) -> bool {
    let deadline = Instant::now() + dur;
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep(SLEEP_SLICE.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sleep_returns_false_on_shutdown() {
        let flag = AtomicBool::new(true);
        assert!(!sleep_unless(Duration::from_secs(30), &flag));
    }

    #[test]
    fn sleep_completes_short_interval() {
        let flag = AtomicBool::new(false);
        let start = Instant::now();
        assert!(sleep_unless(Duration::from_millis(20), &flag));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
