//! Stand-ins for optional seams.

use jig_traits::{BoxError, Display, FeedbackAdc, Screen};

/// Feedback ADC for boards without valve feedback wiring; every conversion fails.
#[derive(Debug, Default)]
pub struct NoAdc;

impl FeedbackAdc for NoAdc {
    fn convert(&mut self, channel: u8) -> Result<u16, BoxError> {
        Err(Box::new(std::io::Error::other(format!(
            "no feedback ADC wired (channel {channel})"
        ))))
    }
}

/// Display that only traces what it would show.
#[derive(Debug, Default)]
pub struct NullDisplay;

impl Display for NullDisplay {
    fn show(&mut self, screen: &Screen) -> Result<(), BoxError> {
        tracing::trace!(top = ?screen.top, bottom = ?screen.bottom, "display");
        Ok(())
    }
}
