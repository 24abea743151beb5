//! Error types for faults the jig cannot report as a cycle status.
//!
//! A cartridge that fails its QR check or a valve that misses its threshold
//! is a *status*. These errors are for the cases where the controller itself
//! cannot go on: a pin that cannot be read, a link that went away, a setting
//! the store refuses.
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum JigError {
    /// A trait call failed with a backend error we could not classify.
    #[error("hardware error: {0}")]
    Hardware(String),
    /// The backend reported a known device fault (GPIO, UART, SPI).
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("rejected setting: {0}")]
    Config(String),
    #[error("timed out talking to the SBC or ADC")]
    Timeout,
    #[error("station in unexpected state: {0}")]
    State(String),
    #[error("io error: {0}")]
    Io(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing panel (sensors, buttons and actuators)")]
    MissingPanel,
    #[error("missing SBC link")]
    MissingLink,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
