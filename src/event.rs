// CPUSCALE EVENT LOG
// ONE SNAPSHOT PER SUPERVISOR TICK, EVALUATED OR SKIPPED.
// FIXED-SIZE RING ALLOCATED AT STARTUP; THE LOOP NEVER ALLOCATES.
// A FULL RING OVERWRITES ITS OLDEST TICK.

use crate::controller::TickOutcome;

const MAX_SNAPSHOTS: usize = 8192;

#[derive(Clone, Copy)]
pub struct Snapshot {
    pub ts_ns:       u64,
    pub idle_pct:    Option<u64>,   // NONE: NO SAMPLE BEHIND THIS ENTRY
    pub online_cpus: u32,
    pub debounce:    u32,
    pub outcome:     Option<TickOutcome>,   // NONE: SUSPENDED OR SAMPLE FAILED
}

pub struct EventLog {
    snapshots: Vec<Snapshot>,
    head:      usize,
    len:       usize,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            snapshots: vec![
                Snapshot { ts_ns: 0, idle_pct: None, online_cpus: 0, debounce: 0, outcome: None };
                MAX_SNAPSHOTS
            ],
            head: 0,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    // RECORD ONE EVALUATED TICK
    pub fn record(&mut self, idle_pct: u64, online_cpus: u32, debounce: u32, outcome: TickOutcome) {
        self.push(Some(idle_pct), online_cpus, debounce, Some(outcome));
    }

    // RECORD AN ACTUATION FORCED WITHOUT A SAMPLE (LOAD TEST)
    pub fn record_forced(&mut self, online_cpus: u32, debounce: u32, outcome: TickOutcome) {
        self.push(None, online_cpus, debounce, Some(outcome));
    }

    // RECORD A TICK THAT NEVER REACHED THE CONTROLLER
    pub fn record_skipped(&mut self, online_cpus: u32) {
        self.push(None, online_cpus, 0, None);
    }

    fn push(&mut self, idle_pct: Option<u64>, online_cpus: u32, debounce: u32, outcome: Option<TickOutcome>) {
        self.snapshots[self.head] = Snapshot {
            ts_ns: now_ns(),
            idle_pct,
            online_cpus,
            debounce,
            outcome,
        };
        self.head = (self.head + 1) % MAX_SNAPSHOTS;
        if self.len < MAX_SNAPSHOTS {
            self.len += 1;
        }
    }

    // ITERATE SNAPSHOTS IN CHRONOLOGICAL ORDER
    pub fn iter_chronological(&self) -> impl Iterator<Item = &Snapshot> {
        let start = if self.len < MAX_SNAPSHOTS { 0 } else { self.head };
        (0..self.len).map(move |i| {
            &self.snapshots[(start + i) % MAX_SNAPSHOTS]
        })
    }

    // DUMP THE TIME SERIES AFTER EXECUTION
    pub fn dump(&self) {
        let mut iter = self.iter_chronological();
        let first = match iter.next() {
            Some(s) => s,
            None => return,
        };
        let base_ts = first.ts_ns;

        println!("\n{:<10} {:<8} {:<8} {:<10} {:<12}",
            "TIME_S", "IDLE%", "CPUS", "DEBOUNCE", "OUTCOME");
        println!("{}", "-".repeat(52));

        for s in std::iter::once(first).chain(iter) {
            let elapsed_s = s.ts_ns.saturating_sub(base_ts) as f64 / 1_000_000_000.0;
            println!("{:<10.1} {:<8} {:<8} {:<10} {:<12}",
                elapsed_s, s.idle_pct.map_or("-".to_string(), |v| v.to_string()), s.online_cpus, s.debounce, s.outcome.map_or("SKIPPED", TickOutcome::label));
        }

        if self.len == MAX_SNAPSHOTS {
            println!("\n(RING BUFFER WRAPPED -- SHOWING MOST RECENT {} SNAPSHOTS)", MAX_SNAPSHOTS);
        }
        println!("TOTAL SNAPSHOTS: {}", self.len);
    }

    pub fn totals(&self) -> Totals {
        let mut t = Totals::default();
        let mut idle_sum = 0u64;
        let mut sampled = 0u64;
        for s in self.iter_chronological() {
            t.ticks += 1;
            match s.outcome {
                None => {
                    t.skipped += 1;
                    continue;
                }
                Some(TickOutcome::Enabled(_)) => t.enables += 1,
                Some(TickOutcome::Disabled(_)) => t.disables += 1,
                Some(TickOutcome::EnableFailed | TickOutcome::DisableFailed) => t.failures += 1,
                Some(_) => {}
            }
            if let Some(idle) = s.idle_pct {
                idle_sum += idle;
                sampled += 1;
            }
            t.min_online = Some(t.min_online.map_or(s.online_cpus, |m| m.min(s.online_cpus)));
            t.max_online = t.max_online.max(s.online_cpus);
        }
        if sampled > 0 {
            t.avg_idle_pct = idle_sum / sampled;
        }
        t
    }

    // SUMMARY STATISTICS
    pub fn summary(&self) {
        if self.len < 2 {
            return;
        }

        let t = self.totals();
        let first = self.iter_chronological().next().map_or(0, |s| s.ts_ns);
        let last = self.iter_chronological().last().map_or(0, |s| s.ts_ns);
        let elapsed_s = last.saturating_sub(first) as f64 / 1_000_000_000.0;

        println!("\n{}", "=".repeat(50));
        println!("CPUSCALE SUMMARY");
        println!("{}", "=".repeat(50));
        println!("  TICKS:             {}", t.ticks);
        println!("  SUSPENDED/SKIPPED: {}", t.skipped);
        println!("  ENABLES:           {}", t.enables);
        println!("  DISABLES:          {}", t.disables);
        println!("  FAILURES:          {}", t.failures);
        println!("  AVG IDLE:          {}%", t.avg_idle_pct);
        if let Some(min) = t.min_online {
            println!("  ONLINE CPUS:       {}..{}", min, t.max_online);
        }
        println!("  ELAPSED:           {:.1}s", elapsed_s);
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Totals {
    pub ticks:        u64,
    pub skipped:      u64,
    pub enables:      u64,
    pub disables:     u64,
    pub failures:     u64,
    pub avg_idle_pct: u64,
    pub min_online:   Option<u32>,
    pub max_online:   u32,
}

fn now_ns() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
    }
    (ts.tv_sec as u64) * 1_000_000_000 + (ts.tv_nsec as u64)
}
