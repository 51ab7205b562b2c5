// CPUSCALE TUNING
// PURE-RUST MODULE: NO FILESYSTEM ACCESS
// CONFIGURATION DEFAULTS, CLAMPS AND THE THRESHOLD DECISION.
// SHARED BETWEEN THE BINARY (main.rs) AND THE LIB CRATE (tests)

// IDLE THRESHOLDS (ASYMMETRIC HYSTERESIS)
// BELOW LOW: ADD A CPU NOW. ABOVE HIGH: REMOVE ONE AFTER THE DEBOUNCE.
// BOTH ARE AGGREGATE PERCENTAGES, DIVIDED BY THE ONLINE COUNT AT USE.

pub const DEFAULT_LOW_PCT: i64    = 20;
pub const DEFAULT_HIGH_PCT: i64   = 50;
pub const DEFAULT_DISABLE_DELAY: i64 = 30;   // TICKS OVER HIGH BEFORE A DISABLE
pub const DEFAULT_MIN_CPUS: i64   = 1;

// POLL CADENCE

pub const ACTIVE_POLL_SECS: u64    = 1;
pub const SUSPENDED_POLL_SECS: u64 = 30;    // KILL SWITCH PRESENT: COARSE BACKOFF
pub const SWITCH_CHECK_TICKS: u32  = 10;    // KILL SWITCH + ONLINE RESYNC PERIOD

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    pub low_pct: u64,
    pub high_pct: u64,
    pub disable_delay: u32,
    pub min_cpus: u32,
}

impl Config {
    // APPLY EVERY FLOOR AND THE low <= high RELATION.
    // NEGATIVE OR ZERO INPUT IS CLAMPED, NEVER REJECTED.
    pub fn new(low: i64, high: i64, disable_delay: i64, min_cpus: i64) -> Self {
        let high = if high < 1 { DEFAULT_HIGH_PCT } else { high };
        let low = low.max(1).min(high);
        Self {
            low_pct: low as u64,
            high_pct: high as u64,
            disable_delay: disable_delay.clamp(0, u32::MAX as i64) as u32,
            min_cpus: min_cpus.clamp(1, u32::MAX as i64) as u32,
        }
    }

    // FIRST SLOT ELIGIBLE FOR DISABLE. cpu0 IS NEVER A CANDIDATE.
    pub fn disable_floor(&self) -> u32 {
        self.min_cpus.max(1)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(
            DEFAULT_LOW_PCT,
            DEFAULT_HIGH_PCT,
            DEFAULT_DISABLE_DELAY,
            DEFAULT_MIN_CPUS,
        )
    }
}

// PER-TICK VERDICT BEFORE ANY ACTUATION

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pressure {
    Starved,   // IDLE < low / N: ENABLE NOW
    Slack,     // IDLE > high / N: DEBOUNCE TOWARD A DISABLE
    Steady,    // BETWEEN (INCLUSIVE): CLEAR DISABLE PRESSURE
}

impl Pressure {
    pub fn label(self) -> &'static str {
        match self {
            Self::Starved => "STARVED",
            Self::Slack => "SLACK",
            Self::Steady => "STEADY",
        }
    }
}

// THRESHOLDS TIGHTEN AS MORE CPUS COME ONLINE: THE AGGREGATE TARGET IS
// SHARED ACROSS N. INTEGER DIVISION, N FLOORED AT 1.
pub fn classify(cfg: &Config, idle_pct: u64, online: u32) -> Pressure {
    let n = online.max(1) as u64;
    if idle_pct < cfg.low_pct / n {
        Pressure::Starved
    } else if idle_pct > cfg.high_pct / n {
        Pressure::Slack
    } else {
        Pressure::Steady
    }
}

// ADVANCE THE DISABLE DEBOUNCE. RETURNS (NEW_COUNTER, FIRE).
// FIRES WHEN THE INCREMENTED COUNTER EXCEEDS THE DELAY, I.E. ON THE
// (delay + 1)TH CONSECUTIVE SLACK TICK. THE COUNTER RESTARTS ON FIRE.
pub fn debounce_disable(counter: u32, disable_delay: u32) -> (u32, bool) {
    let next = counter.saturating_add(1);
    if next > disable_delay {
        (0, true)
    } else {
        (next, false)
    }
}

// atoi SEMANTICS FOR FLAG VALUES: OPTIONAL SIGN, LEADING DIGITS, REST
// IGNORED. NO DIGITS READS AS 0. SATURATES INSTEAD OF OVERFLOWING.
// THE RESULT STILL GOES THROUGH Config::new()'S CLAMPS.
pub fn lenient_int(s: &str) -> i64 {
    let s = s.trim_start();
    let (neg, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let mag = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |acc, d| acc.saturating_mul(10).saturating_add((d - b'0') as i64));
    if neg { -mag } else { mag }
}
