// CPUSCALE -- CPU HOTPLUG CONTROLLER FOR VIRTUALIZED LINUX GUESTS
// SHEDS vCPUS WHEN THE GUEST IS IDLE, BRINGS THEM BACK WHEN LOAD RISES
//
// POLICY AND PLUMBING LIVE IN THE LIB CRATE (src/lib.rs)
// THIS BINARY HANDLES: CLI, DAEMONIZING, LOGGING, SIGNALS, SUBCOMMANDS

mod cli;
mod daemon;

use std::convert::Infallible;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use cpuscale::controller::{ControllerState, HysteresisController};
use cpuscale::event::EventLog;
use cpuscale::hotplug::HotplugActuator;
use cpuscale::loadtest::{self, RANDOM_SOURCE};
use cpuscale::stat::StatSampler;
use cpuscale::supervisor::{Supervisor, KILL_SWITCH};
use cpuscale::tuning::{
    self, Config, DEFAULT_DISABLE_DELAY, DEFAULT_HIGH_PCT, DEFAULT_LOW_PCT, DEFAULT_MIN_CPUS,
};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

#[derive(Parser)]
#[command(name = "cpuscale")]
#[command(version)]
#[command(about = "CPUSCALE -- CPU HOTPLUG CONTROLLER FOR VIRTUAL GUESTS")]
#[command(args_override_self = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<SubCmd>,

    /// Daemonize (disables -v)
    #[arg(short = 'D', long)]
    daemon: bool,

    /// Increase verbosity/debugging. Specify multiple times for more.
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Idle low threshold in percent: below low/N a CPU is enabled
    #[arg(short = 'L', long, default_value_t = DEFAULT_LOW_PCT, value_parser = lenient)]
    low: i64,

    /// Idle high threshold in percent: above high/N a CPU is disabled after the delay
    #[arg(short = 'H', long, default_value_t = DEFAULT_HIGH_PCT, value_parser = lenient)]
    high: i64,

    /// Consecutive over-high ticks before a CPU is disabled
    #[arg(long, default_value_t = DEFAULT_DISABLE_DELAY, value_parser = lenient)]
    delay: i64,

    /// Minimum number of enabled CPUs
    #[arg(long, default_value_t = DEFAULT_MIN_CPUS, value_parser = lenient)]
    mincpu: i64,

    /// Randomly toggle CPUs to stress the hotplug path
    #[arg(long)]
    loadtest: bool,

    /// Dump the per-tick event log on exit
    #[arg(long)]
    dump_log: bool,
}

impl Cli {
    // argv IN ANY HISTORICAL SPELLING. ONLY --help AND --version EXIT.
    fn from_argv<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::parse_from(cli::args::normalize(args))
    }

    fn config(&self) -> Config {
        Config::new(self.low, self.high, self.delay, self.mincpu)
    }
}

// NUMERIC FLAG VALUES NEVER FAIL TO PARSE; Config::new() CLAMPS THEM
fn lenient(s: &str) -> Result<i64, Infallible> {
    Ok(tuning::lenient_int(s))
}

#[derive(Subcommand)]
enum SubCmd {
    /// Check /proc/stat, hotplug controls, privileges and kernel config
    Check,

    /// Show managed CPU slots and their hotplug state
    Status,
}

fn init_logger(verbose: u8) -> Result<()> {
    let llv = match verbose {
        0 => simplelog::LevelFilter::Info,
        1 => simplelog::LevelFilter::Debug,
        _ => simplelog::LevelFilter::Trace,
    };
    let mut lcfg = simplelog::ConfigBuilder::new();
    lcfg.set_time_level(simplelog::LevelFilter::Error)
        .set_location_level(simplelog::LevelFilter::Off)
        .set_target_level(simplelog::LevelFilter::Off)
        .set_thread_level(simplelog::LevelFilter::Off);
    simplelog::TermLogger::init(
        llv,
        lcfg.build(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    )?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::from_argv(std::env::args_os().map(|a| a.to_string_lossy().into_owned()));

    let sampler = StatSampler::default();
    let mut actuator = HotplugActuator::default();
    let kill_switch = Path::new(KILL_SWITCH);

    match cli.command {
        Some(SubCmd::Check) => return cli::check::run_check(&sampler, &actuator, kill_switch),
        Some(SubCmd::Status) => return cli::status::run_status(&actuator, kill_switch),
        None => {}
    }

    let config = cli.config();

    // DETACHED: NOBODY IS LISTENING ON STDERR
    let verbose = if cli.daemon { 0 } else { cli.verbose };
    if cli.daemon {
        daemon::daemonize()?;
    }
    init_logger(verbose)?;

    ctrlc::set_handler(move || {
        SHUTDOWN.store(true, Ordering::Relaxed);
    })
    .context("Error setting Ctrl-C handler")?;

    if cli.loadtest {
        let mut source = std::fs::File::open(RANDOM_SOURCE)
            .with_context(|| format!("Failed to open {}", RANDOM_SOURCE))?;
        let controller = HysteresisController::new(config);
        let mut state = ControllerState::new(actuator.online_count());
        let mut log = EventLog::new();
        loadtest::run(&mut source, &controller, &mut state, &mut actuator, &mut log, &SHUTDOWN);
        report(&log, cli.dump_log);
        return Ok(());
    }

    let mut sup = Supervisor::new(config, sampler, actuator, kill_switch);
    sup.run(&SHUTDOWN);
    report(&sup.log, cli.dump_log);

    Ok(())
}

fn report(log: &EventLog, dump: bool) {
    if dump {
        log.dump();
    }
    log.summary();
}
