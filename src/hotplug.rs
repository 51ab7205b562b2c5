// CPUSCALE HOTPLUG ACTUATOR
// OWNS THE PER-CPU sysfs CONTROL FILES: /sys/devices/system/cpu/cpuN/online
//
// CPU 0 IS NEVER MANAGED (MOST ARCHES CANNOT OFFLINE IT, AND IT HAS NO
// online FILE ON X86 WITHOUT BOOTUP HOTPLUG). THE MANAGED SLOTS ARE THE
// CONTIGUOUS RUN cpu1, cpu2, ... UP TO THE FIRST MISSING CONTROL FILE.
// DISCOVERED ONCE AT STARTUP, REFRESHED BY THE SUPERVISOR EVERY FEW TICKS.

use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use log::{debug, trace};
use thiserror::Error;

pub const SYSFS_CPU_ROOT: &str = "/sys/devices/system/cpu";

// SANITY CAP ON THE DISCOVERY PROBE
const MAX_CPU_SLOTS: u32 = 8192;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CpuState {
    Online,
    Offline,
}

impl CpuState {
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Online => b'1',
            Self::Offline => b'0',
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'1' => Some(Self::Online),
            b'0' => Some(Self::Offline),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Online => "ONLINE",
            Self::Offline => "OFFLINE",
        }
    }
}

#[derive(Debug, Error)]
pub enum HotplugError {
    #[error("NO {} CPU AT OR ABOVE cpu{start}", .state.label())]
    NotFound { start: u32, state: CpuState },

    #[error("FAILED TO SET cpu{cpu} {}: {source}", .state.label())]
    Io {
        cpu: u32,
        state: CpuState,
        #[source]
        source: std::io::Error,
    },
}

// RESULT OF READING ONE CONTROL FILE
enum Probe {
    State(CpuState),
    Missing,
    Unreadable,
}

pub struct HotplugActuator {
    root: PathBuf,
    slots: Vec<u32>,
}

impl HotplugActuator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let mut act = Self {
            root: root.into(),
            slots: Vec::new(),
        };
        act.refresh();
        act
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn slots(&self) -> &[u32] {
        &self.slots
    }

    pub fn control_path(&self, cpu: u32) -> PathBuf {
        self.root.join(format!("cpu{}", cpu)).join("online")
    }

    // RE-DISCOVER MANAGED SLOTS. PICKS UP HOT-ADDED vCPUS AND DROPS
    // SLOTS WHOSE CONTROL FILE DISAPPEARED.
    pub fn refresh(&mut self) {
        let slots: Vec<u32> = (1..MAX_CPU_SLOTS)
            .take_while(|&cpu| self.control_path(cpu).exists())
            .collect();
        if slots != self.slots {
            debug!("HOTPLUG SLOTS: {} (cpu1..cpu{})", slots.len(), slots.len());
        }
        self.slots = slots;
    }

    fn probe(&self, cpu: u32) -> Probe {
        let mut file = match std::fs::File::open(self.control_path(cpu)) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Probe::Missing,
            Err(_) => return Probe::Unreadable,
        };
        let mut buf = [0u8; 1];
        match file.read(&mut buf) {
            Ok(1) => CpuState::from_byte(buf[0]).map_or(Probe::Unreadable, Probe::State),
            _ => Probe::Unreadable,
        }
    }

    pub fn state(&self, cpu: u32) -> Option<CpuState> {
        match self.probe(cpu) {
            Probe::State(s) => Some(s),
            _ => None,
        }
    }

    // LOWEST MANAGED CPU >= start IN THE REQUESTED STATE.
    // A VANISHED CONTROL FILE ENDS THE SCAN; A FAILED READ SKIPS THAT CPU.
    pub fn find_cpu(&self, start: u32, want: CpuState) -> Result<u32, HotplugError> {
        let not_found = HotplugError::NotFound { start, state: want };
        for &cpu in self.slots.iter().filter(|&&cpu| cpu >= start) {
            match self.probe(cpu) {
                Probe::State(s) if s == want => return Ok(cpu),
                Probe::State(_) => {}
                Probe::Unreadable => trace!("cpu{} UNREADABLE, SKIPPED", cpu),
                Probe::Missing => return Err(not_found),
            }
        }
        Err(not_found)
    }

    pub fn set_cpu(&self, cpu: u32, state: CpuState) -> Result<(), HotplugError> {
        let io_err = |source| HotplugError::Io { cpu, state, source };
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(self.control_path(cpu))
            .map_err(io_err)?;
        trace!("WRITING cpu{} '{}'", cpu, state.as_byte() as char);
        match file.write(&[state.as_byte()]) {
            Ok(1) => Ok(()),
            Ok(n) => Err(io_err(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                format!("SHORT WRITE ({} BYTES)", n),
            ))),
            Err(e) => Err(io_err(e)),
        }
    }

    pub fn enable(&self) -> Result<u32, HotplugError> {
        let cpu = self.find_cpu(1, CpuState::Offline)?;
        self.set_cpu(cpu, CpuState::Online)?;
        Ok(cpu)
    }

    pub fn disable(&self, min_index: u32) -> Result<u32, HotplugError> {
        let cpu = self.find_cpu(min_index.max(1), CpuState::Online)?;
        self.set_cpu(cpu, CpuState::Offline)?;
        Ok(cpu)
    }

    // CPU 0 IS ALWAYS COUNTED ONLINE
    pub fn online_count(&self) -> u32 {
        let managed = self
            .slots
            .iter()
            .filter(|&&cpu| self.state(cpu) == Some(CpuState::Online))
            .count() as u32;
        managed + 1
    }
}

impl Default for HotplugActuator {
    fn default() -> Self {
        Self::new(SYSFS_CPU_ROOT)
    }
}

// PARSE KERNEL CPU LIST FORMAT: "0,6" or "0-2,6-8" or "3"
pub fn parse_cpu_list(s: &str) -> Vec<u32> {
    let mut result = Vec::new();
    for part in s.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let Some((start, end)) = part.split_once('-') {
            if let (Ok(s), Ok(e)) = (start.parse::<u32>(), end.parse::<u32>()) {
                result.extend(s..=e);
            }
        } else if let Ok(cpu) = part.parse::<u32>() {
            result.push(cpu);
        }
    }
    result.sort();
    result.dedup();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // BUILD A FAKE sysfs: cpu0 WITHOUT CONTROL FILE, cpu1.. WITH THE GIVEN STATES
    fn fake_sysfs(states: &[u8]) -> TempDir {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("cpu0")).unwrap();
        for (i, s) in states.iter().enumerate() {
            let dir = tmp.path().join(format!("cpu{}", i + 1));
            std::fs::create_dir(&dir).unwrap();
            std::fs::write(dir.join("online"), [*s]).unwrap();
        }
        tmp
    }

    fn read_state(tmp: &TempDir, cpu: u32) -> u8 {
        std::fs::read(tmp.path().join(format!("cpu{}/online", cpu))).unwrap()[0]
    }

    #[test]
    fn discovers_contiguous_slots() {
        let tmp = fake_sysfs(b"110");
        // cpu5 PAST A GAP IS NOT MANAGED
        std::fs::create_dir(tmp.path().join("cpu5")).unwrap();
        std::fs::write(tmp.path().join("cpu5/online"), b"1").unwrap();
        let act = HotplugActuator::new(tmp.path());
        assert_eq!(act.slots(), &[1, 2, 3]);
    }

    #[test]
    fn find_lowest_matching() {
        let tmp = fake_sysfs(b"1010");
        let act = HotplugActuator::new(tmp.path());
        assert_eq!(act.find_cpu(1, CpuState::Offline).unwrap(), 2);
        assert_eq!(act.find_cpu(1, CpuState::Online).unwrap(), 1);
        assert_eq!(act.find_cpu(2, CpuState::Online).unwrap(), 3);
    }

    #[test]
    fn find_not_found_past_last_slot() {
        let tmp = fake_sysfs(b"11");
        let act = HotplugActuator::new(tmp.path());
        assert!(matches!(
            act.find_cpu(1, CpuState::Offline),
            Err(HotplugError::NotFound { start: 1, state: CpuState::Offline })
        ));
    }

    #[test]
    fn find_skips_unreadable_slot() {
        // cpu1 HOLDS GARBAGE, cpu2 IS OFFLINE
        let tmp = fake_sysfs(b"x0");
        let act = HotplugActuator::new(tmp.path());
        assert_eq!(act.find_cpu(1, CpuState::Offline).unwrap(), 2);
    }

    #[test]
    fn find_stops_at_vanished_file() {
        let tmp = fake_sysfs(b"110");
        let act = HotplugActuator::new(tmp.path());
        std::fs::remove_file(tmp.path().join("cpu2/online")).unwrap();
        assert!(act.find_cpu(1, CpuState::Offline).is_err());
    }

    #[test]
    fn enable_flips_lowest_offline() {
        let tmp = fake_sysfs(b"100");
        let act = HotplugActuator::new(tmp.path());
        assert_eq!(act.enable().unwrap(), 2);
        assert_eq!(read_state(&tmp, 2), b'1');
        assert_eq!(read_state(&tmp, 3), b'0');
    }

    #[test]
    fn unwritable_control_file_is_io_error() {
        // A DIRECTORY WHERE THE CONTROL FILE SHOULD BE: OPEN(O_RDWR) FAILS, EVEN FOR ROOT
        let tmp = fake_sysfs(b"0");
        std::fs::remove_file(tmp.path().join("cpu1/online")).unwrap();
        std::fs::create_dir(tmp.path().join("cpu1/online")).unwrap();
        let act = HotplugActuator::new(tmp.path());
        assert_eq!(act.slots(), &[1]);

        let err = act.set_cpu(1, CpuState::Online).unwrap_err();
        assert!(matches!(err, HotplugError::Io { cpu: 1, state: CpuState::Online, .. }));
        assert!(err.to_string().starts_with("FAILED TO SET cpu1 ONLINE"));
    }

    #[test]
    fn disable_respects_floor_index() {
        let tmp = fake_sysfs(b"111");
        let act = HotplugActuator::new(tmp.path());
        assert_eq!(act.disable(2).unwrap(), 2);
        assert_eq!(read_state(&tmp, 1), b'1');
        assert_eq!(read_state(&tmp, 2), b'0');
    }

    #[test]
    fn disable_zero_floor_never_touches_cpu0() {
        let tmp = fake_sysfs(b"01");
        let act = HotplugActuator::new(tmp.path());
        assert_eq!(act.disable(0).unwrap(), 2);
    }

    #[test]
    fn online_count_includes_cpu0() {
        let tmp = fake_sysfs(b"1010");
        let act = HotplugActuator::new(tmp.path());
        assert_eq!(act.online_count(), 3);
    }

    #[test]
    fn refresh_picks_up_new_slot() {
        let tmp = fake_sysfs(b"1");
        let mut act = HotplugActuator::new(tmp.path());
        assert_eq!(act.slots(), &[1]);
        std::fs::create_dir(tmp.path().join("cpu2")).unwrap();
        std::fs::write(tmp.path().join("cpu2/online"), b"0").unwrap();
        act.refresh();
        assert_eq!(act.slots(), &[1, 2]);
    }

    #[test]
    fn parse_range() {
        assert_eq!(parse_cpu_list("0-2,6-8"), vec![0, 1, 2, 6, 7, 8]);
    }

    #[test]
    fn parse_mixed() {
        assert_eq!(parse_cpu_list("0-2,5,9-11\n"), vec![0, 1, 2, 5, 9, 10, 11]);
    }

    #[test]
    fn parse_empty() {
        assert_eq!(parse_cpu_list(""), Vec::<u32>::new());
    }
}
