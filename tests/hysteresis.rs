// CPUSCALE HYSTERESIS TESTS
// THRESHOLD CLASSIFICATION, DEBOUNCE TIMING, CONFIG CLAMPS, IDLE ARITHMETIC
//
// ALL TESTS USE PURE-RUST TYPES FROM cpuscale::{tuning, stat, controller}.
// NO FILESYSTEM. RUN OFFLINE.

use cpuscale::controller::{ControllerState, CpuSwitch, HysteresisController, TickOutcome};
use cpuscale::hotplug::{CpuState, HotplugError};
use cpuscale::stat::{delta, idle_ratio, CpuTimes};
use cpuscale::tuning::{
    classify, debounce_disable, Config, Pressure,
    DEFAULT_DISABLE_DELAY, DEFAULT_HIGH_PCT, DEFAULT_LOW_PCT, DEFAULT_MIN_CPUS,
};

// RECORDS EVERY DISABLE FLOOR IT IS HANDED, NEVER RUNS OUT OF CPUS
#[derive(Default)]
struct Recorder {
    enables: u32,
    disable_floors: Vec<u32>,
}

impl CpuSwitch for Recorder {
    fn enable(&mut self) -> Result<u32, HotplugError> {
        self.enables += 1;
        Ok(self.enables)
    }

    fn disable(&mut self, min_index: u32) -> Result<u32, HotplugError> {
        self.disable_floors.push(min_index);
        Ok(min_index)
    }
}

// === CONFIG CLAMPS ===

#[test]
fn config_defaults() {
    let c = Config::default();
    assert_eq!(c.low_pct, 20);
    assert_eq!(c.high_pct, 50);
    assert_eq!(c.disable_delay, 30);
    assert_eq!(c.min_cpus, 1);
    assert_eq!(DEFAULT_LOW_PCT, 20);
    assert_eq!(DEFAULT_HIGH_PCT, 50);
    assert_eq!(DEFAULT_DISABLE_DELAY, 30);
    assert_eq!(DEFAULT_MIN_CPUS, 1);
}

#[test]
fn config_low_clamped_to_high() {
    let c = Config::new(80, 40, 30, 1);
    assert_eq!(c.low_pct, 40);
    assert_eq!(c.high_pct, 40);
}

#[test]
fn config_floors() {
    let c = Config::new(-5, 0, -1, -3);
    assert_eq!(c.low_pct, 1);
    assert_eq!(c.high_pct, 50);     // NON-POSITIVE HIGH FALLS BACK TO THE DEFAULT
    assert_eq!(c.disable_delay, 0);
    assert_eq!(c.min_cpus, 1);
}

#[test]
fn disable_floor_never_below_one() {
    assert_eq!(Config::new(20, 50, 30, 1).disable_floor(), 1);
    assert_eq!(Config::new(20, 50, 30, 4).disable_floor(), 4);
}

// === CLASSIFICATION (SCALED BY ONLINE COUNT) ===

#[test]
fn classify_one_cpu() {
    let c = Config::default();
    assert_eq!(classify(&c, 5, 1), Pressure::Starved);
    assert_eq!(classify(&c, 20, 1), Pressure::Steady);   // NOT < 20
    assert_eq!(classify(&c, 50, 1), Pressure::Steady);   // NOT > 50
    assert_eq!(classify(&c, 51, 1), Pressure::Slack);
}

#[test]
fn classify_thresholds_shrink_with_cpus() {
    let c = Config::default();
    // FOUR CPUS: LOW 20/4 = 5, HIGH 50/4 = 12
    assert_eq!(classify(&c, 4, 4), Pressure::Starved);
    assert_eq!(classify(&c, 5, 4), Pressure::Steady);
    assert_eq!(classify(&c, 12, 4), Pressure::Steady);
    assert_eq!(classify(&c, 13, 4), Pressure::Slack);
}

#[test]
fn classify_many_cpus_never_starves() {
    // 21 CPUS: LOW 20/21 = 0, NOTHING IS BELOW ZERO
    let c = Config::default();
    assert_eq!(classify(&c, 0, 21), Pressure::Steady);
}

#[test]
fn classify_zero_online_treated_as_one() {
    let c = Config::default();
    assert_eq!(classify(&c, 5, 0), Pressure::Starved);
}

// === DEBOUNCE ===

#[test]
fn debounce_fires_on_pre_increment_equal_delay() {
    assert_eq!(debounce_disable(0, 2), (1, false));
    assert_eq!(debounce_disable(1, 2), (2, false));
    assert_eq!(debounce_disable(2, 2), (0, true));
}

#[test]
fn debounce_zero_delay_fires_immediately() {
    assert_eq!(debounce_disable(0, 0), (0, true));
}

#[test]
fn debounce_counter_strictly_increases_then_fires() {
    let ctl = HysteresisController::new(Config::new(20, 50, 5, 1));
    let mut state = ControllerState::new(4);
    let mut sw = Recorder::default();
    for expected in 1..=5 {
        assert_eq!(ctl.tick(&mut state, 90, &mut sw), TickOutcome::Pending(expected));
        assert_eq!(state.disable_debounce, expected);
    }
    assert_eq!(ctl.tick(&mut state, 90, &mut sw), TickOutcome::Disabled(1));
    assert_eq!(state.disable_debounce, 0);
    assert_eq!(state.online_cpus, 3);
}

// === SCENARIOS ===

#[test]
fn scenario_two_cpus_delay_two() {
    // LOW=20 HIGH=50 DELAY=2 MIN=1, TWO CPUS, IDLE 60 EVERY TICK (> 50/2)
    let ctl = HysteresisController::new(Config::new(20, 50, 2, 1));
    let mut state = ControllerState::new(2);
    let mut sw = Recorder::default();

    assert_eq!(ctl.tick(&mut state, 60, &mut sw), TickOutcome::Pending(1));
    assert_eq!(ctl.tick(&mut state, 60, &mut sw), TickOutcome::Pending(2));
    assert!(sw.disable_floors.is_empty());

    // THIRD CONSECUTIVE SLACK TICK: PRE-INCREMENT COUNTER == DELAY
    assert_eq!(ctl.tick(&mut state, 60, &mut sw), TickOutcome::Disabled(1));
    assert_eq!(state.online_cpus, 1);
    assert_eq!(sw.disable_floors, vec![1]);
}

#[test]
fn scenario_starved_enables_regardless_of_debounce() {
    let ctl = HysteresisController::new(Config::default());
    let mut state = ControllerState::new(1);
    state.disable_debounce = 29;
    let mut sw = Recorder::default();
    assert_eq!(ctl.tick(&mut state, 5, &mut sw), TickOutcome::Enabled(1));
    assert_eq!(state.disable_debounce, 0);
    assert_eq!(state.online_cpus, 2);
}

#[test]
fn steady_tick_breaks_the_streak() {
    let ctl = HysteresisController::new(Config::new(20, 50, 2, 1));
    let mut state = ControllerState::new(2);
    let mut sw = Recorder::default();
    ctl.tick(&mut state, 60, &mut sw);
    ctl.tick(&mut state, 60, &mut sw);
    assert_eq!(ctl.tick(&mut state, 20, &mut sw), TickOutcome::Steady);
    assert_eq!(state.disable_debounce, 0);
    // STREAK STARTS OVER
    assert_eq!(ctl.tick(&mut state, 60, &mut sw), TickOutcome::Pending(1));
}

#[test]
fn disable_floor_passed_from_config() {
    let ctl = HysteresisController::new(Config::new(20, 50, 0, 3));
    let mut state = ControllerState::new(8);
    let mut sw = Recorder::default();
    for _ in 0..5 {
        ctl.tick(&mut state, 99, &mut sw);
    }
    // STOPS AT THE FLOOR: 8 -> 3
    assert_eq!(state.online_cpus, 3);
    assert_eq!(sw.disable_floors, vec![3; 5]);
    assert_eq!(ctl.tick(&mut state, 99, &mut sw), TickOutcome::AtFloor);
}

#[test]
fn exhausted_enable_is_not_fatal() {
    struct Full;
    impl CpuSwitch for Full {
        fn enable(&mut self) -> Result<u32, HotplugError> {
            Err(HotplugError::NotFound { start: 1, state: CpuState::Offline })
        }
        fn disable(&mut self, min_index: u32) -> Result<u32, HotplugError> {
            Ok(min_index)
        }
    }
    let ctl = HysteresisController::new(Config::default());
    let mut state = ControllerState::new(1);
    for _ in 0..3 {
        assert_eq!(ctl.tick(&mut state, 0, &mut Full), TickOutcome::EnableFailed);
    }
    assert_eq!(state.online_cpus, 1);
}

// === IDLE ARITHMETIC ===

#[test]
fn idle_ratio_in_range_for_many_vectors() {
    let mut seed = 0x2545_f491_4f6c_dd1du64;
    for _ in 0..1000 {
        let mut v = [0u64; 7];
        for slot in v.iter_mut() {
            // XORSHIFT, BOUNDED TO A PLAUSIBLE ONE-SECOND DELTA
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            *slot = seed % 100_000;
        }
        let r = idle_ratio(&CpuTimes(v));
        assert!(r <= 100, "idle ratio {} out of range for {:?}", r, v);
    }
}

#[test]
fn delta_then_ratio() {
    let prev = CpuTimes([1000, 0, 500, 8000, 100, 10, 10]);
    let cur = CpuTimes([1050, 0, 520, 8025, 104, 10, 10]);
    let d = delta(&cur, &prev);
    assert_eq!(d.0, [50, 0, 20, 25, 4, 0, 0]);
    // (25 + 4) * 100 / (99 + 1)
    assert_eq!(idle_ratio(&d), 29);
}
