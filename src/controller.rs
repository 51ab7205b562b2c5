// CPUSCALE HYSTERESIS CONTROLLER
// FAST ENABLE, DEBOUNCED DISABLE.
//
// ENABLING IS CHEAP AND HAPPENS ON THE FIRST STARVED TICK. DISABLING ONLY
// HAPPENS AFTER disable_delay + 1 CONSECUTIVE SLACK TICKS: A WRONG DISABLE
// COSTS A LATENCY SPIKE ON THE NEXT BURST. ACTUATION FAILURES NEVER ABORT
// THE LOOP; THE NEXT TICK RE-EVALUATES FROM SCRATCH.

use std::time::Duration;

use log::{debug, info, trace};

use crate::hotplug::{HotplugActuator, HotplugError};
use crate::tuning::{self, Config, Pressure};

// THE ACTUATION SEAM. HotplugActuator IN PRODUCTION, SCRIPTED IN TESTS.
pub trait CpuSwitch {
    fn enable(&mut self) -> Result<u32, HotplugError>;
    fn disable(&mut self, min_index: u32) -> Result<u32, HotplugError>;
}

impl CpuSwitch for HotplugActuator {
    fn enable(&mut self) -> Result<u32, HotplugError> {
        HotplugActuator::enable(self)
    }

    fn disable(&mut self, min_index: u32) -> Result<u32, HotplugError> {
        HotplugActuator::disable(self, min_index)
    }
}

// MUTABLE LOOP STATE. OWNED BY THE SUPERVISOR, CHANGED ONLY THROUGH
// THE TRANSITIONS BELOW AND apply_kill_switch().
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerState {
    pub online_cpus: u32,
    pub disable_debounce: u32,
    pub switch_check: u32,
    pub enabled: bool,
    pub poll_interval: Duration,
}

impl ControllerState {
    pub fn new(online_cpus: u32) -> Self {
        Self {
            online_cpus: online_cpus.max(1),
            disable_debounce: 0,
            switch_check: 0,
            enabled: true,
            poll_interval: Duration::from_secs(tuning::ACTIVE_POLL_SECS),
        }
    }

    // MARKER PRESENT: SUSPEND AND BACK OFF. ABSENT: RESUME AT 1S.
    pub fn apply_kill_switch(&mut self, marker_present: bool) {
        let enabled = !marker_present;
        if enabled != self.enabled {
            info!("CPUSCALE {}", if enabled { "RESUMED" } else { "SUSPENDED (KILL SWITCH)" });
        }
        self.enabled = enabled;
        self.poll_interval = Duration::from_secs(if enabled {
            tuning::ACTIVE_POLL_SECS
        } else {
            tuning::SUSPENDED_POLL_SECS
        });
    }

    // ADVANCE THE SWITCH-CHECK COUNTER. TRUE EVERY SWITCH_CHECK_TICKS CALLS.
    pub fn switch_check_due(&mut self) -> bool {
        self.switch_check += 1;
        if self.switch_check >= tuning::SWITCH_CHECK_TICKS {
            self.switch_check = 0;
            true
        } else {
            false
        }
    }

    pub fn resync_online(&mut self, online_cpus: u32) {
        if online_cpus != self.online_cpus {
            debug!("ONLINE RESYNC: {} -> {}", self.online_cpus, online_cpus);
        }
        self.online_cpus = online_cpus.max(1);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Enabled(u32),
    Disabled(u32),
    EnableFailed,
    DisableFailed,
    // SLACK TICK STILL INSIDE THE DEBOUNCE WINDOW
    Pending(u32),
    // DEBOUNCE FIRED BUT THE TRACKED COUNT IS ALREADY AT THE FLOOR
    AtFloor,
    Steady,
}

impl TickOutcome {
    pub fn label(self) -> &'static str {
        match self {
            Self::Steady => "STEADY",
            Self::Pending(_) => "PENDING",
            Self::Enabled(_) => "ENABLE",
            Self::Disabled(_) => "DISABLE",
            Self::EnableFailed => "ENABLE_FAIL",
            Self::DisableFailed => "DISABLE_FAIL",
            Self::AtFloor => "FLOOR",
        }
    }
}

pub struct HysteresisController {
    config: Config,
}

impl HysteresisController {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // ONE CONTROL STEP FOR THE GIVEN IDLE RATIO
    pub fn tick(
        &self,
        state: &mut ControllerState,
        idle_pct: u64,
        cpus: &mut impl CpuSwitch,
    ) -> TickOutcome {
        let pressure = tuning::classify(&self.config, idle_pct, state.online_cpus);
        trace!(
            "IDLE {}% N={} DEBOUNCE={} -> {}",
            idle_pct, state.online_cpus, state.disable_debounce, pressure.label()
        );
        match pressure {
            Pressure::Starved => self.enable_now(state, cpus),
            Pressure::Slack => self.debounced_disable(state, cpus),
            Pressure::Steady => {
                state.disable_debounce = 0;
                TickOutcome::Steady
            }
        }
    }

    // ENABLE THE LOWEST OFFLINE CPU. SUCCESS CLEARS ALL DISABLE PRESSURE;
    // FAILURE LEAVES THE DEBOUNCE COUNTER UNTOUCHED.
    pub fn enable_now(&self, state: &mut ControllerState, cpus: &mut impl CpuSwitch) -> TickOutcome {
        debug!("ENABLING CPU");
        match cpus.enable() {
            Ok(cpu) => {
                state.online_cpus += 1;
                state.disable_debounce = 0;
                debug!("cpu{} ONLINE ({} CPUS)", cpu, state.online_cpus);
                TickOutcome::Enabled(cpu)
            }
            Err(e) => {
                debug!("ENABLE CPU FAILED: {}", e);
                TickOutcome::EnableFailed
            }
        }
    }

    // COUNT ONE SLACK TICK; DISABLE WHEN THE DEBOUNCE EXPIRES
    pub fn debounced_disable(
        &self,
        state: &mut ControllerState,
        cpus: &mut impl CpuSwitch,
    ) -> TickOutcome {
        let (counter, fire) = tuning::debounce_disable(state.disable_debounce, self.config.disable_delay);
        state.disable_debounce = counter;
        if !fire {
            return TickOutcome::Pending(counter);
        }
        if state.online_cpus <= self.config.min_cpus {
            trace!("AT FLOOR ({} CPUS), DISABLE SKIPPED", state.online_cpus);
            return TickOutcome::AtFloor;
        }
        debug!("DISABLING CPU");
        match cpus.disable(self.config.disable_floor()) {
            Ok(cpu) => {
                state.online_cpus = state.online_cpus.saturating_sub(1).max(1);
                debug!("cpu{} OFFLINE ({} CPUS)", cpu, state.online_cpus);
                TickOutcome::Disabled(cpu)
            }
            Err(e) => {
                debug!("DISABLE CPU FAILED: {}", e);
                TickOutcome::DisableFailed
            }
        }
    }
}
