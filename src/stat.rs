// CPUSCALE CPU-TIME ACCOUNTING
// READS THE AGGREGATE "cpu" LINE OF /proc/stat AND TURNS TWO SAMPLES
// INTO A DELTA AND AN IDLE RATIO. PURE FUNCTIONS BELOW THE SAMPLER,
// TESTABLE OFFLINE.

use std::path::{Path, PathBuf};

use thiserror::Error;

pub const PROC_STAT: &str = "/proc/stat";

// user, nice, system, idle, iowait, irq, softirq
pub const NSTAT: usize = 7;

const NICE: usize = 1;
const IDLE: usize = 3;
const IOWAIT: usize = 4;

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("FAILED TO READ {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} IS EMPTY", .path.display())]
    Empty { path: PathBuf },
}

// CUMULATIVE CPU TIME IN USER_HZ TICKS SINCE BOOT
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CpuTimes(pub [u64; NSTAT]);

impl CpuTimes {
    pub fn idle(&self) -> u64 {
        self.0[IDLE]
    }

    pub fn iowait(&self) -> u64 {
        self.0[IOWAIT]
    }

    // CONSTANT +1 KEEPS THE IDLE RATIO DENOMINATOR NON-ZERO
    pub fn total(&self) -> u64 {
        self.0.iter().fold(1u64, |acc, &v| acc.saturating_add(v))
    }
}

// PARSE THE FIRST LINE OF /proc/stat: "cpu  4705 356 584 3699 23 23 0 0 0 0".
// THE LABEL IS SKIPPED, AT MOST NSTAT FIELDS ARE CONSUMED, MISSING OR
// UNPARSABLE FIELDS STAY ZERO. NICE IS DROPPED FROM ALL ACCOUNTING.
pub fn parse_stat_line(line: &str) -> CpuTimes {
    let mut v = [0u64; NSTAT];
    for (slot, field) in v.iter_mut().zip(line.split_whitespace().skip(1)) {
        *slot = field.parse().unwrap_or(0);
    }
    v[NICE] = 0;
    CpuTimes(v)
}

pub struct StatSampler {
    path: PathBuf,
}

impl StatSampler {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sample(&self) -> Result<CpuTimes, SampleError> {
        let raw = std::fs::read_to_string(&self.path).map_err(|source| SampleError::Io {
            path: self.path.clone(),
            source,
        })?;
        match raw.lines().next() {
            Some(line) if !line.trim().is_empty() => Ok(parse_stat_line(line)),
            _ => Err(SampleError::Empty {
                path: self.path.clone(),
            }),
        }
    }
}

impl Default for StatSampler {
    fn default() -> Self {
        Self::new(PROC_STAT)
    }
}

// ELEMENT-WISE current - previous. A COUNTER THAT WENT BACKWARDS
// (WRAP, HOTPLUG RESET, TORN READ) CONTRIBUTES ZERO, NEVER WRAPS.
pub fn delta(current: &CpuTimes, previous: &CpuTimes) -> CpuTimes {
    let mut d = [0u64; NSTAT];
    for (i, slot) in d.iter_mut().enumerate() {
        *slot = current.0[i].saturating_sub(previous.0[i]);
    }
    CpuTimes(d)
}

// PERCENT OF THE INTERVAL SPENT IDLE OR BLOCKED ON IO
pub fn idle_ratio(delta: &CpuTimes) -> u64 {
    let idle = delta.idle().saturating_add(delta.iowait());
    idle.saturating_mul(100) / delta.total()
}
