//! # Servo CLI
//!
//! Playback and hardware-diagnostic binary for the 6-DOF joint servo
//! workspace. One binary, four runtime-selected subcommands, replacing
//! a compile-time mode `#define` (§10.5, §11 REDESIGN FLAGS).
//!
//! ```bash
//! servo_cli --config robot.toml play-path --playback-speed 0.5 --active-move-mask 0b111111
//! servo_cli --config robot.toml record-optical-encoder-data --joint 1 --pwm 400 --seconds 2.0
//! ```

#![deny(warnings)]

mod modes;
mod path;
mod robot;
mod sim_device;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use servo_common::config::RobotConfig;

/// Joint servo playback and diagnostic CLI.
#[derive(Parser, Debug)]
#[command(name = "servo_cli")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Playback and hardware-diagnostic CLI for the 6-DOF joint servo workspace")]
#[command(long_about = None)]
struct Cli {
    /// Path to the robot configuration file.
    #[arg(short, long, default_value = "robot.toml")]
    config: PathBuf,

    /// Enable verbose (debug) logging.
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Hold one joint at a fixed open-loop PWM and record its optical
    /// encoder diagnostic channel.
    RecordOpticalEncoderData(modes::RecordOpticalArgs),
    /// Excite one joint with a sinusoidal open-loop PWM and record its
    /// position/velocity/current response.
    RecordMomentOfInertia(modes::RecordInertiaArgs),
    /// Hold one joint at a fixed open-loop PWM and record its current.
    RecordCurrentAndPwmBehaviour(modes::RecordCurrentPwmArgs),
    /// Play a joint-space move across the robot at a given playback speed.
    PlayPath(modes::PlayPathArgs),
}

fn main() {
    let cli = Cli::parse();
    setup_tracing(&cli);

    if let Err(e) = run(&cli) {
        error!("servo_cli failed: {e}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> servo_common::Result<()> {
    info!(config = %cli.config.display(), "loading robot configuration");
    let config = RobotConfig::load(&cli.config)?;

    let sigint = Arc::new(AtomicBool::new(false));
    let sigint_handler = sigint.clone();
    ctrlc::set_handler(move || {
        info!("received SIGINT, requesting graceful shutdown");
        sigint_handler.store(true, Ordering::SeqCst);
    })
    .map_err(|e| servo_common::Error::invariant(format!("failed to install SIGINT handler: {e}")))?;

    match &cli.mode {
        Mode::RecordOpticalEncoderData(args) => modes::run_record_optical(&config, args, sigint),
        Mode::RecordMomentOfInertia(args) => modes::run_record_inertia(&config, args, sigint),
        Mode::RecordCurrentAndPwmBehaviour(args) => {
            modes::run_record_current_pwm(&config, args, sigint)
        }
        Mode::PlayPath(args) => modes::run_play_path(&config, args, sigint),
    }
}

/// Build the global `tracing` subscriber from `--verbose`/`--json`.
fn setup_tracing(cli: &Cli) {
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if cli.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
