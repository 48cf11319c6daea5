use bpbench::benchmark::run_benchmark;
use bpbench::config::{BenchConfig, PatternKind, ProbeMode, Target, TriggerConfig};
use bpbench::exec_memory::DEFAULT_PAGE_SIZE;
use bpbench::report::{ConsoleReporter, JsonReporter};
use bpbench::sampler::DEFAULT_REPETITIONS;
use clap::Parser;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, Level};

#[derive(Parser, Debug)]
#[command(author, version, about = "Measure the cost of hitting a hardware breakpoint", long_about = None)]
struct Args {
    /// Number of timed executions per target
    #[arg(short = 'n', long, default_value_t = DEFAULT_REPETITIONS)]
    repetitions: u64,

    /// Page size the run assumes; must match the OS
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: usize,

    /// Number of pages to map
    #[arg(long, default_value_t = 1)]
    pages: usize,

    /// Preferred base address (hex), falls back to an OS-chosen one
    #[arg(long, value_parser = parse_hex)]
    address: Option<usize>,

    /// Where execution starts, in order
    #[arg(long, value_enum, value_delimiter = ',', default_values_t = [Target::Breakpoint, Target::Page])]
    target: Vec<Target>,

    /// What each measurement does
    #[arg(long, value_enum, default_value_t = ProbeMode::Exec)]
    mode: ProbeMode,

    /// Write "load constant, return" instead of the page-filling pattern
    #[arg(long)]
    load_constant: Option<u16>,

    /// Program to run (and wait for) before sampling
    #[arg(long)]
    trigger: Option<String>,

    /// Argument passed to the trigger program (repeatable)
    #[arg(long = "trigger-arg", requires = "trigger")]
    trigger_args: Vec<String>,

    /// Seconds to wait for the trigger; 0 waits forever
    #[arg(long, default_value_t = 300)]
    trigger_timeout: u64,

    /// Pin the sampling thread to this CPU core
    #[arg(long)]
    pin_core: Option<usize>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// More log output (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn parse_hex(s: &str) -> Result<usize, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    usize::from_str_radix(digits, 16).map_err(|e| format!("invalid hex address {}: {}", s, e))
}

impl Args {
    fn log_level(&self) -> Level {
        if self.quiet {
            return Level::ERROR;
        }
        match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }

    fn into_config(self) -> BenchConfig {
        let trigger = self.trigger.map(|program| TriggerConfig {
            program,
            args: self.trigger_args,
            timeout: match self.trigger_timeout {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        });

        BenchConfig {
            page_size: self.page_size,
            region_size: self.page_size.saturating_mul(self.pages),
            address_hint: self.address,
            pattern: match self.load_constant {
                Some(value) => PatternKind::LoadConstant(value),
                None => PatternKind::PageFill,
            },
            repetitions: self.repetitions,
            targets: self.target,
            mode: self.mode,
            trigger,
            pin_core: self.pin_core,
            ..Default::default()
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level())
        .with_writer(std::io::stderr)
        .init();

    let json = args.json;
    let config = args.into_config();

    let outcome = if json {
        run_benchmark(&config, &mut JsonReporter::stdout())
    } else {
        run_benchmark(&config, &mut ConsoleReporter::stdout())
    };

    match outcome {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
