//! CLI argument definitions and shared statics.

use carport_core::DoorAction;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "carport", version, about = "Garage door controller")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/carport.toml")]
    pub config: PathBuf,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Door actions accepted on the command line.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ActionArg {
    Actuate,
    Open,
    Close,
    Check,
    StartMeasurement,
    StopMeasurement,
    GetMeasurement,
}

impl From<ActionArg> for DoorAction {
    fn from(a: ActionArg) -> Self {
        match a {
            ActionArg::Actuate => DoorAction::Actuate,
            ActionArg::Open => DoorAction::Open,
            ActionArg::Close => DoorAction::Close,
            ActionArg::Check => DoorAction::Check,
            ActionArg::StartMeasurement => DoorAction::StartMeasurement,
            ActionArg::StopMeasurement => DoorAction::StopMeasurement,
            ActionArg::GetMeasurement => DoorAction::GetMeasurement,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Bring up every door and answer JSON requests read line by line from stdin
    #[command(
        long_about = "Bring up every configured door, then read one JSON request per line on stdin and write one JSON response per line on stdout.\n\nControl: {\"garageDoorId\":0,\"action\":\"check\"}\nObserve: {\"garageDoorId\":0,\"observeTargets\":{\"measurements\":true}}\n\nStops at end of input or on Ctrl-C."
    )]
    Serve,
    /// Bring up the doors, run one action and print the response envelope
    Control {
        /// Zero-based door id (index in the door table)
        #[arg(long, value_name = "ID")]
        door: usize,
        /// Action to run
        #[arg(long, value_enum)]
        action: ActionArg,
    },
    /// Validate the config and check GPIO and serial availability
    SelfCheck,
}
