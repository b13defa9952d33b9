use clap::Parser;
use cu_flight_core::clock::FlightClock;
use cu_flight_core::config::{read_configuration, FlightConfig};
use cu_flight_core::error::{FlightError, FlightResult};
use cu_flight_sim::{run_simulation, Scenario, SimOptions};
use log::{error, info};
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Flight configuration (RON). Defaults apply when omitted.
    #[arg(long)]
    config: Option<String>,

    /// Scenario to fly (RON).
    #[arg(long)]
    scenario: Option<String>,

    /// Fixed simulation tick in seconds.
    #[arg(long, default_value_t = 1.0 / 60.0)]
    dt: f32,

    /// Stops after this many ticks even if the scenario runs longer.
    #[arg(long)]
    ticks: Option<u64>,

    /// Height of the ground plane.
    #[arg(long, default_value_t = 0.0)]
    ground: f32,

    /// Log level: off, error, warn, info, debug or trace.
    #[arg(long, default_value = "info")]
    log_level: LevelFilter,

    /// Prints the effective configuration and exits.
    #[arg(long)]
    dump_config: bool,
}

fn run(args: &Args) -> FlightResult<()> {
    let config = match &args.config {
        Some(path) => read_configuration(path)?,
        None => FlightConfig::default(),
    };
    if args.dump_config {
        println!("{}", config.serialize_ron()?);
        return Ok(());
    }
    let scenario = match &args.scenario {
        Some(path) => Scenario::from_file(path)?,
        None => Scenario::default(),
    };
    let options = SimOptions {
        dt: args.dt,
        max_ticks: args.ticks,
        ground_height: args.ground,
    };

    let clock = FlightClock::new();
    let report = run_simulation(config, &scenario, &options)?;
    info!("simulated {} in {}", report.status.time, clock.now());

    let pretty = ron::ser::PrettyConfig::default();
    let text = ron::ser::to_string_pretty(&report, pretty)
        .map_err(|e| FlightError::ConfigParse(e.to_string()))?;
    println!("{text}");
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = TermLogger::init(
        args.log_level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    ) {
        eprintln!("could not install the logger: {e}");
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
