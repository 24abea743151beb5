//! Averaged valve position feedback.

use jig_traits::Valve;

use crate::error::Result;
use crate::rig::Rig;

/// One 10-bit feedback sample, already averaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ValveReading(u16);

impl ValveReading {
    pub const MAX: u16 = 1023;

    /// Clamp into the 10-bit range.
    pub fn new(raw: u16) -> Self {
        Self(raw.min(Self::MAX))
    }

    #[inline]
    pub fn value(self) -> u16 {
        self.0
    }
}

impl std::fmt::Display for ValveReading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

/// Mean of `samples` raw conversions on the valve's feedback channel.
pub fn read_feedback(rig: &mut Rig, valve: Valve, samples: u16) -> Result<ValveReading> {
    let n = samples.max(1);
    let mut total: u32 = 0;
    for _ in 0..n {
        total += u32::from(rig.convert(valve.channel())?.min(ValveReading::MAX));
    }
    let mean = total / u32::from(n);
    Ok(ValveReading::new(u16::try_from(mean).unwrap_or(ValveReading::MAX)))
}
