//! The wired-up bench: every seam the controller talks through, plus the clock.

use std::sync::Arc;
use std::time::Duration;

use eyre::{Report, WrapErr};
use jig_traits::{Clock, Display, FeedbackAdc, Input, Output, Panel, SbcLink, Screen};

use crate::error::Result;
use crate::hw_error::map_hw_error;

pub struct Rig {
    panel: Box<dyn Panel>,
    adc: Box<dyn FeedbackAdc>,
    link: Box<dyn SbcLink>,
    display: Box<dyn Display>,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl std::fmt::Debug for Rig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rig").finish_non_exhaustive()
    }
}

fn hw(e: jig_traits::BoxError) -> Report {
    Report::new(map_hw_error(&*e))
}

impl Rig {
    pub fn new(
        panel: Box<dyn Panel>,
        adc: Box<dyn FeedbackAdc>,
        link: Box<dyn SbcLink>,
        display: Box<dyn Display>,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            panel,
            adc,
            link,
            display,
            clock,
        }
    }

    pub fn clock(&self) -> &dyn Clock {
        &*self.clock
    }

    /// Owned handle, for polling loops whose probe borrows the rig.
    pub fn clock_handle(&self) -> Arc<dyn Clock + Send + Sync> {
        Arc::clone(&self.clock)
    }

    pub fn sleep(&self, d: Duration) {
        self.clock.sleep(d);
    }

    pub fn sense(&mut self, input: Input) -> Result<bool> {
        self.panel
            .sense(input)
            .map_err(hw)
            .wrap_err_with(|| format!("reading {input:?}"))
    }

    pub fn drive(&mut self, output: Output, on: bool) -> Result<()> {
        tracing::trace!(?output, on, "drive");
        self.panel
            .drive(output, on)
            .map_err(hw)
            .wrap_err_with(|| format!("driving {output:?}"))
    }

    /// Acknowledge chord: start and menu-alt held together.
    pub fn chord_held(&mut self) -> Result<bool> {
        Ok(self.sense(Input::Start)? && self.sense(Input::MenuAlt)?)
    }

    /// Either of the two chord buttons held.
    pub fn any_button(&mut self) -> Result<bool> {
        Ok(self.sense(Input::Start)? || self.sense(Input::MenuAlt)?)
    }

    pub fn convert(&mut self, channel: u8) -> Result<u16> {
        self.adc
            .convert(channel)
            .map_err(hw)
            .wrap_err_with(|| format!("converting feedback channel {channel}"))
    }

    pub fn show(&mut self, screen: Screen) -> Result<()> {
        self.display.show(&screen).map_err(hw).wrap_err("updating display")
    }

    pub fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.link.send(bytes).map_err(hw).wrap_err("writing to SBC")
    }

    pub fn try_recv(&mut self) -> Result<Option<u8>> {
        self.link.try_recv().map_err(hw).wrap_err("reading from SBC")
    }

    pub fn flush_input(&mut self) -> Result<()> {
        self.link.flush_input().map_err(hw).wrap_err("flushing SBC input")
    }

    /// SBC ready line.
    pub fn sbc_ready(&mut self) -> Result<bool> {
        self.link.ready().map_err(hw).wrap_err("reading SBC ready line")
    }

    /// Buzzer on for `d`, then off.
    pub fn chirp(&mut self, d: Duration) -> Result<()> {
        self.drive(Output::Buzzer, true)?;
        self.sleep(d);
        self.drive(Output::Buzzer, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JigError;
    use crate::mocks::{NoAdc, NullDisplay};
    use jig_traits::{BoxError, SimClock};

    struct DeadPanel;

    impl Panel for DeadPanel {
        fn sense(&mut self, _input: Input) -> std::result::Result<bool, BoxError> {
            Err("gpio line busy".into())
        }
        fn drive(&mut self, _output: Output, _on: bool) -> std::result::Result<(), BoxError> {
            Err("uart write timeout".into())
        }
    }

    struct QuietLink;

    impl SbcLink for QuietLink {
        fn send(&mut self, _bytes: &[u8]) -> std::result::Result<(), BoxError> {
            Ok(())
        }
        fn try_recv(&mut self) -> std::result::Result<Option<u8>, BoxError> {
            Ok(None)
        }
        fn flush_input(&mut self) -> std::result::Result<(), BoxError> {
            Ok(())
        }
        fn ready(&mut self) -> std::result::Result<bool, BoxError> {
            Ok(true)
        }
    }

    fn dead_rig() -> Rig {
        Rig::new(
            Box::new(DeadPanel),
            Box::new(NoAdc),
            Box::new(QuietLink),
            Box::new(NullDisplay),
            Arc::new(SimClock::new()),
        )
    }

    #[test]
    fn seam_errors_keep_their_type_under_context() {
        let mut rig = dead_rig();

        let err = rig.sense(Input::StackPresent).unwrap_err();
        assert!(format!("{err:#}").contains("reading StackPresent"));
        assert!(matches!(
            err.downcast_ref::<JigError>(),
            Some(JigError::Hardware(m)) if m == "gpio line busy"
        ));

        let err = rig.drive(Output::Buzzer, true).unwrap_err();
        assert!(matches!(err.downcast_ref::<JigError>(), Some(JigError::Timeout)));

        let err = rig.convert(1).unwrap_err();
        assert!(matches!(err.downcast_ref::<JigError>(), Some(JigError::Io(_))));
    }

    #[test]
    fn working_link_passes_through() {
        let mut rig = dead_rig();
        assert!(rig.sbc_ready().unwrap());
        assert_eq!(rig.try_recv().unwrap(), None);
        rig.send(&[20]).unwrap();
    }
}
