//! BINS: a command line driver for the strapdown inertial navigation mechanization.
//!
//! The binary runs the unaided mechanization over either an emulated stationary IMU or a
//! recorded sensor log and writes the resulting trajectory as CSV. Scenarios can be described
//! with command line flags or loaded from a configuration file (TOML/JSON/YAML).
use clap::{Args, Parser, Subcommand};
use log::{error, info};

use std::error::Error;
use std::path::{Path, PathBuf};

use bins::messages::{ImuEmulator, read_imu_log};
use bins::sim::{
    InitialConditions, MechanizationConfig, SimulationConfig, SourceConfig, Trajectory,
    TrailingPolicy, dead_reckoning,
};

const LONG_ABOUT: &str = "BINS: strapdown inertial navigation mechanization.

Integrates inertial sensor increments (delta-velocity and delta-angle) into latitude,
longitude, East-North-Up velocity and heading/pitch/roll. Sensor samples are summed into
fine increments every N samples and a coarse attitude, velocity and position update runs
every four fine increments. The vertical channel is not mechanized.

Sources:
  - emulate: a stationary IMU at a given position and attitude (Earth rate and gravity only)
  - replay:  a recorded, space-delimited log with a `t ax ay az wx wy wz` header, starting
             from a fix given with --latitude, --longitude, --heading, --pitch and --roll
  - run:     a scenario described by a configuration file (TOML/JSON/YAML)";

/// Command line arguments
#[derive(Parser)]
#[command(author, version, about = "Strapdown inertial navigation mechanization", long_about = LONG_ABOUT)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (off, error, warn, info, debug, trace). Defaults to the configuration file
    /// value, then to info
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log file path (if not specified, logs to stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

/// Top-level commands
#[derive(Subcommand, Clone, Debug)]
enum Command {
    /// Run a scenario from a configuration file
    Run(RunArgs),
    /// Run the mechanization over an emulated stationary IMU
    Emulate(EmulateArgs),
    /// Run the mechanization over a recorded sensor log
    Replay(ReplayArgs),
    /// Write a template configuration file
    Config(ConfigArgs),
}

#[derive(Args, Clone, Debug)]
struct RunArgs {
    /// Configuration file (TOML/JSON/YAML)
    #[arg(short, long)]
    config: PathBuf,
    /// Output CSV file path, overrides the configuration file
    #[arg(short, long)]
    output: Option<PathBuf>,
}

/// Initial position and attitude of the emulated IMU, in degrees
#[derive(Args, Clone, Debug)]
struct InitialArgs {
    #[arg(long, default_value_t = 56.0, allow_negative_numbers = true)]
    latitude: f64,
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    longitude: f64,
    #[arg(long, default_value_t = 45.0, allow_negative_numbers = true)]
    heading: f64,
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pitch: f64,
    #[arg(long, default_value_t = 5.0, allow_negative_numbers = true)]
    roll: f64,
}
impl From<&InitialArgs> for InitialConditions {
    fn from(args: &InitialArgs) -> Self {
        initial_conditions(
            args.latitude,
            args.longitude,
            args.heading,
            args.pitch,
            args.roll,
        )
    }
}

/// Starting fix of a recorded log, in degrees. A recording carries no position or attitude,
/// so every value must be given.
#[derive(Args, Clone, Debug)]
struct FixArgs {
    #[arg(long, allow_negative_numbers = true)]
    latitude: f64,
    #[arg(long, allow_negative_numbers = true)]
    longitude: f64,
    #[arg(long, allow_negative_numbers = true)]
    heading: f64,
    #[arg(long, allow_negative_numbers = true)]
    pitch: f64,
    #[arg(long, allow_negative_numbers = true)]
    roll: f64,
}
impl From<&FixArgs> for InitialConditions {
    fn from(args: &FixArgs) -> Self {
        initial_conditions(
            args.latitude,
            args.longitude,
            args.heading,
            args.pitch,
            args.roll,
        )
    }
}

fn initial_conditions(
    latitude_deg: f64,
    longitude_deg: f64,
    heading_deg: f64,
    pitch_deg: f64,
    roll_deg: f64,
) -> InitialConditions {
    InitialConditions {
        t: 0.0,
        latitude_deg,
        longitude_deg,
        heading_deg,
        pitch_deg,
        roll_deg,
        velocity: [0.0; 3],
    }
}

#[derive(Args, Clone, Debug)]
struct MechanizationArgs {
    /// Sensor sample rate in Hz
    #[arg(long, default_value_t = 800.0)]
    sample_rate: f64,
    /// Sensor samples per fine increment
    #[arg(long, default_value_t = 4)]
    decimation: usize,
    /// Run a final, shorter update over trailing samples instead of discarding them
    #[arg(long)]
    flush: bool,
}
impl From<&MechanizationArgs> for MechanizationConfig {
    fn from(args: &MechanizationArgs) -> Self {
        MechanizationConfig {
            sample_rate_hz: args.sample_rate,
            decimation: args.decimation,
            trailing: if args.flush {
                TrailingPolicy::Flush
            } else {
                TrailingPolicy::Discard
            },
            ..Default::default()
        }
    }
}

#[derive(Args, Clone, Debug)]
struct EmulateArgs {
    #[command(flatten)]
    initial: InitialArgs,
    #[command(flatten)]
    mechanization: MechanizationArgs,
    /// Emulated duration in seconds
    #[arg(long, default_value_t = 5400.0)]
    duration: f64,
    /// Output CSV file path
    #[arg(short, long)]
    output: PathBuf,
}

#[derive(Args, Clone, Debug)]
struct ReplayArgs {
    /// Recorded sensor log
    #[arg(short, long)]
    input: PathBuf,
    /// Output CSV file path
    #[arg(short, long)]
    output: PathBuf,
    /// Column delimiter of the log
    #[arg(long, default_value_t = ' ')]
    delimiter: char,
    #[command(flatten)]
    fix: FixArgs,
    #[command(flatten)]
    mechanization: MechanizationArgs,
}

#[derive(Args, Clone, Debug)]
struct ConfigArgs {
    /// Output configuration file (.toml, .json, .yaml or .yml)
    #[arg(short, long)]
    output: PathBuf,
}

/// Set up the global logger for the binary.
///
/// Every record is prefixed with a local timestamp and its level. An unknown level falls back to
/// `info` with a warning on stderr.
///
/// # Arguments
/// * `log_level` - level filter name (off, error, warn, info, debug, trace)
/// * `log_file` - append records to this file instead of stderr, creating parent directories
///
/// # Errors
/// Fails when the log file cannot be opened or a logger is already installed.
fn init_logger(log_level: &str, log_file: Option<&Path>) -> Result<(), Box<dyn Error>> {
    use std::io::Write;

    let level = match log_level.parse::<log::LevelFilter>() {
        Ok(level) => level,
        Err(_) => {
            eprintln!("Unknown log level '{log_level}', using info");
            log::LevelFilter::Info
        }
    };
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level).format(|buf, record| {
        writeln!(
            buf,
            "{} [{}] - {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.args()
        )
    });
    if let Some(path) = log_file {
        ensure_parent_dir(path)?;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.try_init()?;
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

fn write_trajectory(trajectory: &Trajectory, output: &Path) -> Result<(), Box<dyn Error>> {
    ensure_parent_dir(output)?;
    trajectory.to_csv(output)?;
    match trajectory.last() {
        Some(last) => info!(
            "Wrote {} states to {}, final state: {}",
            trajectory.len(),
            output.display(),
            last
        ),
        None => info!("Wrote an empty trajectory to {}", output.display()),
    }
    Ok(())
}

fn run_from_config(config: &SimulationConfig, output: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    let output = output
        .or_else(|| config.output.as_ref().map(PathBuf::from))
        .ok_or("no output path given on the command line or in the configuration file")?;
    let trajectory = config.run()?;
    write_trajectory(&trajectory, &output)
}

fn run_emulate(args: &EmulateArgs) -> Result<(), Box<dyn Error>> {
    let config = MechanizationConfig::from(&args.mechanization);
    let initial_state = InitialConditions::from(&args.initial).to_state();
    info!(
        "Emulating a stationary IMU for {} s at {} Hz: {}",
        args.duration, config.sample_rate_hz, initial_state
    );
    let source = ImuEmulator::stationary(
        &initial_state,
        &config.earth,
        config.sample_rate_hz,
        args.duration,
    )?;
    let trajectory = dead_reckoning(&config, initial_state, source)?;
    write_trajectory(&trajectory, &args.output)
}

fn run_replay(args: &ReplayArgs) -> Result<(), Box<dyn Error>> {
    if !args.delimiter.is_ascii() {
        return Err(format!("delimiter must be an ASCII character, got {:?}", args.delimiter).into());
    }
    let config = MechanizationConfig::from(&args.mechanization);
    let increments = read_imu_log(&args.input, args.delimiter as u8)?;
    info!(
        "Replaying {} increments from {}",
        increments.len(),
        args.input.display()
    );
    // Anchor the initial state one sample period before the first increment
    let mut initial = InitialConditions::from(&args.fix);
    if let Some(first) = increments.first() {
        initial.t = first.t - 1.0 / config.sample_rate_hz;
    }
    let trajectory = dead_reckoning(&config, initial.to_state(), increments)?;
    write_trajectory(&trajectory, &args.output)
}

fn create_config_file(args: &ConfigArgs) -> Result<(), Box<dyn Error>> {
    let config = SimulationConfig {
        output: Some("trajectory.csv".to_string()),
        log_level: Some("info".to_string()),
        source: SourceConfig::Emulator,
        ..Default::default()
    };
    config.to_file(&args.output)?;
    info!("Wrote template configuration to {}", args.output.display());
    Ok(())
}

fn load_scenario(path: &Path) -> Result<SimulationConfig, Box<dyn Error>> {
    SimulationConfig::from_file(path)
        .map_err(|e| format!("failed to load configuration {}: {e}", path.display()).into())
}

/// Pick the log level for a command: the command line wins, then the configuration file, then
/// info.
fn log_level<'a>(cli: &'a Cli, config: Option<&'a SimulationConfig>) -> &'a str {
    cli.log_level
        .as_deref()
        .or_else(|| config.and_then(|c| c.log_level.as_deref()))
        .unwrap_or("info")
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let log_file = cli.log_file.as_deref();

    let result = match &cli.command {
        Command::Run(args) => {
            // The logger comes up before a load error is reported
            let loaded = load_scenario(&args.config);
            init_logger(log_level(&cli, loaded.as_ref().ok()), log_file)?;
            loaded.and_then(|config| {
                info!("Running scenario from {}", args.config.display());
                run_from_config(&config, args.output.clone())
            })
        }
        Command::Emulate(args) => {
            init_logger(log_level(&cli, None), log_file)?;
            run_emulate(args)
        }
        Command::Replay(args) => {
            init_logger(log_level(&cli, None), log_file)?;
            run_replay(args)
        }
        Command::Config(args) => {
            init_logger(log_level(&cli, None), log_file)?;
            create_config_file(args)
        }
    };
    if let Err(e) = &result {
        error!("{e}");
    }
    result
}
