//! Maps `Box<dyn Error>` from trait boundaries to typed `JigError`.
//!
//! The seams in `jig_traits` return `Box<dyn Error + Send + Sync>`; this module
//! turns those into our typed enum, with an optional feature-gated path for
//! `jig_hardware::HwError` downcasting.

use crate::error::JigError;

/// Map a trait-boundary error to a typed `JigError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> JigError {
    #[cfg(feature = "hardware-errors")]
    {
        use jig_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout => JigError::Timeout,
                HwError::Io(io) => JigError::Io(io.to_string()),
                other => JigError::HardwareFault(other.to_string()),
            };
        }
    }

    if let Some(io) = e.downcast_ref::<std::io::Error>() {
        return JigError::Io(io.to_string());
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        JigError::Timeout
    } else {
        JigError::Hardware(s)
    }
}
