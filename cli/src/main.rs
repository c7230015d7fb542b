#![deny(unsafe_code)]

use std::collections::VecDeque;
use std::error::Error;
use std::ffi::OsString;
use std::fmt::{self, Display, Formatter};
use std::fs;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::{event, span, Level};
use tracing_subscriber::prelude::*;

use base::prelude::*;
use cpu::{Device, HostClock, IoUnitId, LoadSource, ManualClock, Scheduler, SystemConfig, B5500};

mod clock;
mod devices;
mod sleep;
mod terminal;

use clock::WallClock;
use devices::{parse_deck, Card, CardReader, LinePrinter, Spo};
use sleep::MinimalSleeper;

const ABOUT: &str = "Emulate the Burroughs B5500 processor, Central Control and I/O units";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LoadFrom {
    Card,
    Disk,
}

impl From<LoadFrom> for LoadSource {
    fn from(l: LoadFrom) -> LoadSource {
        match l {
            LoadFrom::Card => LoadSource::Card,
            LoadFrom::Disk => LoadSource::Disk,
        }
    }
}

/// Emulator for the Burroughs B5500
#[derive(Parser, Debug)]
#[clap(version, about=ABOUT, long_about = None)]
struct Cli {
    /// Card deck for card reader A; one line per card.  Lines
    /// starting with '~' hold 6-bit codes as pairs of octal digits.
    #[clap(long)]
    card_deck: Option<OsString>,

    /// Where the Load button reads the first program from
    #[clap(long, value_enum, default_value = "card")]
    load: LoadFrom,

    /// Number of processors (1 or 2)
    #[clap(long, default_value_t = 1)]
    processors: u8,

    /// Number of I/O units (1 to 4)
    #[clap(long, default_value_t = 4)]
    io_units: u8,

    /// Number of 4096-word memory modules (1 to 8)
    #[clap(long, default_value_t = 8)]
    memory_modules: u8,

    /// Run this many times faster than real-time ('MAX' for
    /// as-fast-as-possible)
    #[clap(long, default_value = "1.0")]
    speed_multiplier: String,

    /// Stop after this many seconds of emulated time
    #[clap(long)]
    time_limit: Option<f64>,
}

#[derive(Debug)]
enum Fail {
    BadSpeed(String),
    Stopped(String),
}

impl Display for Fail {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Fail::BadSpeed(s) => write!(f, "invalid --speed-multiplier {s:?}"),
            Fail::Stopped(message) => f.write_str(message),
        }
    }
}

impl Error for Fail {}

/// How the main loop lets time pass between callbacks.
enum Pacing {
    /// Sleep on the host; emulated time follows the wall clock.
    RealTime {
        sleeper: MinimalSleeper,
        multiplier: f64,
    },
    /// Jump emulated time straight to the next callback.
    Max(ManualClock),
}

impl Pacing {
    fn wait(&mut self, interval: Duration) {
        match self {
            Pacing::RealTime {
                sleeper,
                multiplier,
            } => sleeper.sleep(interval.div_f64(*multiplier)),
            Pacing::Max(clk) => clk.advance(interval),
        }
    }
}

fn parse_speed(s: &str) -> Result<Option<f64>, Fail> {
    if s == "MAX" {
        event!(
            Level::INFO,
            "--speed-multiplier=MAX, running at maximum speed"
        );
        return Ok(None);
    }
    match s.parse::<f64>() {
        Ok(x) if x > 0.0 && x.is_finite() => {
            event!(Level::INFO, "running at speed multiplier {}", x);
            Ok(Some(x))
        }
        _ => Err(Fail::BadSpeed(s.to_string())),
    }
}

fn run(
    sys: &mut B5500,
    sched: &mut Scheduler<B5500>,
    mut pacing: Pacing,
    source: LoadSource,
    time_limit: Option<Duration>,
) -> Result<(), Box<dyn Error>> {
    let span = span!(Level::INFO, "run");
    let _enter = span.enter();
    sys.power_on(sched);
    sys.load(sched, source)?;
    let io1 = IoUnitId::new(1).ok_or_else(|| Fail::Stopped("no I/O unit 1".to_string()))?;
    let mut started = false;
    let result = loop {
        sys.service(sched);
        sched.run_due(sys);
        sys.service(sched);

        if let Some(failure) = sys.take_load_failure() {
            break Err(Box::new(failure) as Box<dyn Error>);
        }
        if let Some(fault) = sys.fault() {
            break Err(Box::new(fault) as Box<dyn Error>);
        }
        if sys.is_running() {
            started = true;
        } else if started {
            event!(Level::INFO, "P1 has stopped");
            break Ok(());
        } else if !sys.io_unit(io1).is_some_and(|iou| iou.is_busy()) {
            break Err(Box::new(Fail::Stopped(
                "the load finished but P1 did not start".to_string(),
            )) as Box<dyn Error>);
        }
        if let Some(limit) = time_limit {
            if sched.now() >= limit {
                event!(Level::INFO, "time limit reached");
                break Ok(());
            }
        }
        match sched.next_due_in() {
            Some(interval) => pacing.wait(interval),
            None => break Ok(()),
        }
    };
    let status = sys.status();
    for p in &status.processors {
        event!(Level::INFO, "{} executed {} cycles", p.id, p.cycles);
    }
    sys.power_off(sched);
    result
}

/// The demonstration device for `unit`, if there is one.  The card
/// deck goes to the first card reader.
fn device_for(unit: UnitId, deck: &mut Option<VecDeque<Card>>) -> Option<Box<dyn Device>> {
    match unit {
        UnitId::CRA | UnitId::CRB => Some(Box::new(CardReader::new(
            deck.take().unwrap_or_default(),
        ))),
        UnitId::LPA | UnitId::LPB => Some(Box::new(LinePrinter::new())),
        UnitId::SPO => Some(Box::new(Spo::new())),
        _ => None,
    }
}

fn attach_devices(sys: &mut B5500, units: &[UnitId], deck: VecDeque<Card>) {
    let mut deck = Some(deck);
    for &unit in units {
        match device_for(unit, &mut deck) {
            Some(device) => sys.attach(unit, device),
            None => event!(Level::WARN, "there is no device to attach as {}", unit),
        }
    }
}

fn run_simulator() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    // See
    // https://docs.rs/tracing-subscriber/0.3/tracing_subscriber/filter/struct.EnvFilter.html
    // for instructions on how to select which trace messages get
    // printed.
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
    let filter_layer = match tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))
    {
        Err(e) => {
            return Err(Box::new(e));
        }
        Ok(layer) => layer,
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();

    let speed_multiplier = parse_speed(&cli.speed_multiplier)?;
    let deck = match &cli.card_deck {
        Some(name) => parse_deck(&fs::read_to_string(name)?)?,
        None => Default::default(),
    };

    let config = SystemConfig {
        processors: cli.processors,
        io_units: cli.io_units,
        memory_modules: cli.memory_modules,
        ..SystemConfig::default()
    };
    let mut sys = B5500::new(&config)?;
    attach_devices(&mut sys, &config.devices, deck);

    let (host_clock, pacing): (Box<dyn HostClock>, Pacing) = match speed_multiplier {
        Some(multiplier) => (
            Box::new(WallClock::new(multiplier)),
            Pacing::RealTime {
                sleeper: MinimalSleeper::new(Duration::from_millis(2)),
                multiplier,
            },
        ),
        None => {
            let clk = ManualClock::new();
            (Box::new(clk.clone()), Pacing::Max(clk))
        }
    };
    let mut sched: Scheduler<B5500> = Scheduler::new(host_clock);
    let time_limit = cli
        .time_limit
        .map(Duration::try_from_secs_f64)
        .transpose()?;
    run(&mut sys, &mut sched, pacing, cli.load.into(), time_limit)
}

fn main() {
    match run_simulator() {
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
        Ok(()) => {
            std::process::exit(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_speed() {
        assert_eq!(parse_speed("MAX").ok(), Some(None));
        assert_eq!(parse_speed("2.5").ok(), Some(Some(2.5)));
        assert!(parse_speed("0").is_err());
        assert!(parse_speed("fast").is_err());
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["b5500"]);
        assert_eq!(cli.load, LoadFrom::Card);
        assert_eq!(cli.processors, 1);
        assert_eq!(cli.io_units, 4);
        assert_eq!(cli.speed_multiplier, "1.0");
        let cli = Cli::parse_from(["b5500", "--load", "disk", "--processors", "2"]);
        assert_eq!(cli.load, LoadFrom::Disk);
        assert_eq!(cli.processors, 2);
    }

    #[test]
    fn test_devices_follow_configured_units() {
        let mut deck = Some(parse_deck("FIRST\nSECOND\n").expect("valid deck"));
        let names: Vec<Option<String>> = SystemConfig::default()
            .devices
            .iter()
            .map(|&unit| device_for(unit, &mut deck).map(|d| d.name()))
            .collect();
        assert_eq!(
            names,
            vec![
                Some("card reader".to_string()),
                Some("line printer".to_string()),
                Some("console typewriter".to_string()),
            ]
        );
        assert!(deck.is_none());
        assert!(device_for(UnitId::MTA, &mut deck).is_none());
    }
}
