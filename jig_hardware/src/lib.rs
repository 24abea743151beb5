pub mod error;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod rpi;
pub mod sim;

use jig_traits::{BoxError, Display, Screen};

pub use sim::{SimBench, SimOptions};

/// Display that writes every change to the log.
///
/// Used where no character LCD is attached. Repeated identical screens are
/// logged once.
#[derive(Debug, Default)]
pub struct LogDisplay {
    top: String,
    bottom: String,
}

impl LogDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> (&str, &str) {
        (&self.top, &self.bottom)
    }
}

impl Display for LogDisplay {
    fn show(&mut self, screen: &Screen) -> Result<(), BoxError> {
        let mut top = if screen.clear { String::new() } else { self.top.clone() };
        let mut bottom = if screen.clear { String::new() } else { self.bottom.clone() };
        if let Some(t) = &screen.top {
            top.clone_from(t);
        }
        if let Some(b) = &screen.bottom {
            bottom.clone_from(b);
        }
        if top != self.top || bottom != self.bottom {
            tracing::info!(top = %top, bottom = %bottom, "display");
            self.top = top;
            self.bottom = bottom;
        }
        Ok(())
    }
}
