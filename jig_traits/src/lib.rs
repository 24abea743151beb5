//! Hardware seams for the cartridge jig.
//!
//! The control logic in `jig_core` only talks to the outside world through the
//! traits in this crate. Implementations live in `jig_hardware` (simulated
//! bench, Raspberry Pi GPIO/UART/SPI) and in test mocks.
pub mod clock;

use std::fmt;

pub use clock::{Clock, MonotonicClock, SimClock};

/// Error type used at every trait boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// One of the two bidirectional valve motors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Valve {
    One,
    Two,
}

impl Valve {
    pub const ALL: [Valve; 2] = [Valve::One, Valve::Two];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            Valve::One => 0,
            Valve::Two => 1,
        }
    }

    /// Analog channel carrying this valve's position feedback.
    #[inline]
    pub fn channel(self) -> u8 {
        match self {
            Valve::One => 0,
            Valve::Two => 1,
        }
    }

    pub fn number(self) -> u8 {
        self.channel() + 1
    }
}

impl fmt::Display for Valve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "V{}", self.number())
    }
}

/// Valve motor rotation direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    Cw,
    Acw,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Cw, Direction::Acw];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            Direction::Cw => 0,
            Direction::Acw => 1,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Cw => "CW",
            Direction::Acw => "ACW",
        })
    }
}

/// Digital inputs. `sense` returns the logical (already polarity-corrected)
/// level: `true` means "at position" for sensors and "pressed" for buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Input {
    /// Carrier reached the scan position.
    CarrierForward,
    /// Carrier is home.
    CarrierBackward,
    /// Reject gate sits in the reject position.
    RejectGate,
    /// Cartridges are present in the input stack.
    StackPresent,
    Start,
    MenuEnter,
    MenuAlt,
}

/// Digital outputs. `drive(out, true)` energises the actuator.
///
/// De-energised is the safe state for every output: carrier backward, gate in
/// pass position, stopper up, valve motors stopped, buzzer and tower off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Output {
    /// Carrier solenoid: on = forward, off = backward.
    Carrier,
    /// Reject gate solenoid: on = reject, off = pass.
    RejectGate,
    /// Stopper solenoid: on = down (lets one cartridge through).
    Stopper,
    ValveMotor(Valve, Direction),
    Buzzer,
    Tower,
}

impl Output {
    pub const ALL: [Output; 9] = [
        Output::Carrier,
        Output::RejectGate,
        Output::Stopper,
        Output::ValveMotor(Valve::One, Direction::Cw),
        Output::ValveMotor(Valve::One, Direction::Acw),
        Output::ValveMotor(Valve::Two, Direction::Cw),
        Output::ValveMotor(Valve::Two, Direction::Acw),
        Output::Buzzer,
        Output::Tower,
    ];
}

/// Sensor, button and actuator pins of the jig.
pub trait Panel {
    fn sense(&mut self, input: Input) -> Result<bool, BoxError>;
    fn drive(&mut self, output: Output, on: bool) -> Result<(), BoxError>;
}

/// Raw 10-bit analog conversions for the valve feedback channels.
pub trait FeedbackAdc {
    fn convert(&mut self, channel: u8) -> Result<u16, BoxError>;
}

/// Serial link plus ready/busy line to the companion SBC.
///
/// Single bytes in both directions, no framing.
pub trait SbcLink {
    fn send(&mut self, bytes: &[u8]) -> Result<(), BoxError>;
    /// Non-blocking read of one received byte.
    fn try_recv(&mut self) -> Result<Option<u8>, BoxError>;
    /// Drop anything sitting in the receive buffer.
    fn flush_input(&mut self) -> Result<(), BoxError>;
    /// Ready line: high when the SBC is idle and accepting commands, pulled
    /// low while it is busy with a scan.
    fn ready(&mut self) -> Result<bool, BoxError>;
}

/// Two-line character display contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Screen {
    /// Clear the whole display before writing.
    pub clear: bool,
    pub top: Option<String>,
    pub bottom: Option<String>,
}

impl Screen {
    /// Clear and write the top line only.
    pub fn title(top: impl Into<String>) -> Self {
        Self {
            clear: true,
            top: Some(top.into()),
            bottom: None,
        }
    }

    /// Clear and write both lines.
    pub fn pair(top: impl Into<String>, bottom: impl Into<String>) -> Self {
        Self {
            clear: true,
            top: Some(top.into()),
            bottom: Some(bottom.into()),
        }
    }

    /// Clear and write the bottom line only.
    pub fn status(bottom: impl Into<String>) -> Self {
        Self {
            clear: true,
            top: None,
            bottom: Some(bottom.into()),
        }
    }

    /// Overwrite the bottom line without clearing.
    pub fn overlay(bottom: impl Into<String>) -> Self {
        Self {
            clear: false,
            top: None,
            bottom: Some(bottom.into()),
        }
    }

    pub fn blank() -> Self {
        Self {
            clear: true,
            top: None,
            bottom: None,
        }
    }

    /// True when either line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.top.as_deref().is_some_and(|t| t.contains(needle))
            || self.bottom.as_deref().is_some_and(|b| b.contains(needle))
    }
}

/// Operator-facing character display.
pub trait Display {
    fn show(&mut self, screen: &Screen) -> Result<(), BoxError>;
}

impl<T: Panel + ?Sized> Panel for Box<T> {
    fn sense(&mut self, input: Input) -> Result<bool, BoxError> {
        (**self).sense(input)
    }
    fn drive(&mut self, output: Output, on: bool) -> Result<(), BoxError> {
        (**self).drive(output, on)
    }
}

impl<T: FeedbackAdc + ?Sized> FeedbackAdc for Box<T> {
    fn convert(&mut self, channel: u8) -> Result<u16, BoxError> {
        (**self).convert(channel)
    }
}

impl<T: SbcLink + ?Sized> SbcLink for Box<T> {
    fn send(&mut self, bytes: &[u8]) -> Result<(), BoxError> {
        (**self).send(bytes)
    }
    fn try_recv(&mut self) -> Result<Option<u8>, BoxError> {
        (**self).try_recv()
    }
    fn flush_input(&mut self) -> Result<(), BoxError> {
        (**self).flush_input()
    }
    fn ready(&mut self) -> Result<bool, BoxError> {
        (**self).ready()
    }
}

impl<T: Display + ?Sized> Display for Box<T> {
    fn show(&mut self, screen: &Screen) -> Result<(), BoxError> {
        (**self).show(screen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valve_channels_are_zero_based() {
        assert_eq!(Valve::One.channel(), 0);
        assert_eq!(Valve::Two.channel(), 1);
        assert_eq!(Valve::Two.to_string(), "V2");
    }

    #[test]
    fn screen_contains_checks_both_lines() {
        let s = Screen::pair("STACK EMPTY", "PRESS START");
        assert!(s.contains("START"));
        assert!(!Screen::blank().contains("START"));
    }
}
