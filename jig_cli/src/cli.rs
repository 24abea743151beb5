//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

use jig_core::valve::RotationMode;
use jig_traits::{Direction, Valve};

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "jig", version, about = "Cartridge QR jig controller")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/jig_config.toml")]
    pub config: PathBuf,

    /// Persistent operator settings (created on first write)
    #[arg(long, value_name = "FILE", default_value = "etc/jig_settings.toml")]
    pub settings: PathBuf,

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

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ValveArg {
    #[value(name = "1")]
    One,
    #[value(name = "2")]
    Two,
}

impl From<ValveArg> for Valve {
    fn from(v: ValveArg) -> Self {
        match v {
            ValveArg::One => Valve::One,
            ValveArg::Two => Valve::Two,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum DirArg {
    Cw,
    Acw,
}

impl From<DirArg> for Direction {
    fn from(d: DirArg) -> Self {
        match d {
            DirArg::Cw => Direction::Cw,
            DirArg::Acw => Direction::Acw,
        }
    }
}

/// How a diagnostic valve rotation is judged.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ModeArg {
    /// Threshold crossing within the iteration bound
    Standard,
    /// Crossing must also land inside the fine window
    Fine,
    /// Fixed drive length plus the persisted tuning, no feedback
    OpenLoop,
}

impl ModeArg {
    pub fn closed_loop(self) -> Option<RotationMode> {
        match self {
            ModeArg::Standard => Some(RotationMode::Standard),
            ModeArg::Fine => Some(RotationMode::FineTuned),
            ModeArg::OpenLoop => None,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    pub fn is_on(self) -> bool {
        self == Toggle::On
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the production cycle
    Run {
        /// Stop after this many cartridges
        #[arg(long, value_name = "N")]
        cycles: Option<u64>,
        /// Stop after this many cold restarts
        #[arg(long, value_name = "N")]
        max_restarts: Option<u32>,
        /// Simulated bench only: advance a virtual clock instead of sleeping
        #[arg(long, action = ArgAction::SetTrue)]
        virtual_time: bool,
        /// Simulated bench only: verdict script, one letter per scan, `_` for silence
        #[arg(long, value_name = "SCRIPT", default_value = "A")]
        sim_responses: String,
        /// Simulated bench only: jam the carrier on every Nth forward command
        #[arg(long, value_name = "N")]
        sim_jam_every: Option<u32>,
        /// Simulated bench only: run without an SBC attached
        #[arg(long, action = ArgAction::SetTrue)]
        sim_no_sbc: bool,
    },
    /// Diagnostic valve rotation
    Valve {
        /// Valve number
        #[arg(long, value_enum)]
        valve: ValveArg,
        /// Rotation direction
        #[arg(long, value_enum)]
        dir: DirArg,
        /// Rotation check to run
        #[arg(long, value_enum, default_value = "standard")]
        mode: ModeArg,
        /// Write every feedback sample as CSV
        #[arg(long, value_name = "FILE")]
        trace_csv: Option<PathBuf>,
        /// Simulated bench only: advance a virtual clock instead of sleeping
        #[arg(long, action = ArgAction::SetTrue)]
        virtual_time: bool,
    },
    /// Show or change the persistent operator settings
    Settings {
        #[command(subcommand)]
        action: SettingsCmd,
    },
    /// Validate config and settings, then bring up the bench once
    SelfCheck,
}

#[derive(Subcommand, Debug)]
pub enum SettingsCmd {
    /// Print the current settings
    Show,
    /// Change one or more settings and save them
    Set {
        /// Use the SBC link
        #[arg(long, value_enum)]
        sbc: Option<Toggle>,
        /// Verify cartridges by QR
        #[arg(long, value_enum)]
        qr: Option<Toggle>,
        /// Extra open-loop CW drive in valve poll periods (0..=99)
        #[arg(long, value_name = "N")]
        valve_tuning: Option<u8>,
    },
}
