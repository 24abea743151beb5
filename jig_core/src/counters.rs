//! Saturating fault counters.
//!
//! Each fault category owns an independent 4-bit style counter: it counts
//! classified failures, clamps at [`COUNTER_MAX`] and drops back to zero on the
//! next success of the same category. The record is a plain value owned by the
//! station and lent out by `&mut` to whichever component classifies an outcome.

use std::fmt;

use jig_traits::{Direction, Valve};

/// Highest value a counter can hold.
pub const COUNTER_MAX: u8 = 15;

/// Counter that stops at [`COUNTER_MAX`] instead of wrapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaturatingCounter(u8);

impl SaturatingCounter {
    pub const fn new() -> Self {
        Self(0)
    }

    #[inline]
    pub fn get(self) -> u8 {
        self.0
    }

    /// Add one, clamping at the maximum. Returns the new value.
    pub fn increment(&mut self) -> u8 {
        self.0 = (self.0 + 1).min(COUNTER_MAX);
        self.0
    }

    pub fn reset(&mut self) {
        self.0 = 0;
    }

    pub fn is_saturated(self) -> bool {
        self.0 == COUNTER_MAX
    }
}

/// Leak test stage. The last stage tolerates more failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LeakStage {
    First,
    Second,
    Third,
}

impl LeakStage {
    pub const ALL: [LeakStage; 3] = [LeakStage::First, LeakStage::Second, LeakStage::Third];
    pub const LAST: LeakStage = LeakStage::Third;

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Vacuum zone, shared by the leak and clog categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Zone {
    One,
    Two,
    Three,
}

impl Zone {
    pub const ALL: [Zone; 3] = [Zone::One, Zone::Two, Zone::Three];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Out-of-range stage or zone number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("vacuum index {0} out of range (expected 1..=3)")]
pub struct VacuumIndexError(pub u8);

// One-based, as printed on the jig.
impl TryFrom<u8> for LeakStage {
    type Error = VacuumIndexError;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        match n {
            1 => Ok(LeakStage::First),
            2 => Ok(LeakStage::Second),
            3 => Ok(LeakStage::Third),
            other => Err(VacuumIndexError(other)),
        }
    }
}

impl TryFrom<u8> for Zone {
    type Error = VacuumIndexError;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        match n {
            1 => Ok(Zone::One),
            2 => Ok(Zone::Two),
            3 => Ok(Zone::Three),
            other => Err(VacuumIndexError(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultCategory {
    /// Standard rotation check of one valve in one direction.
    Rotation(Valve, Direction),
    /// Fine-tuned rotation check of one valve in one direction.
    FineTuned(Valve, Direction),
    /// QR protocol exchange with the SBC.
    Qr,
    Leak { stage: LeakStage, zone: Zone },
    Clog { zone: Zone },
}

impl fmt::Display for FaultCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultCategory::Rotation(v, d) => write!(f, "{v} {d} rotation"),
            FaultCategory::FineTuned(v, d) => write!(f, "{v} FT {d} rotation"),
            FaultCategory::Qr => f.write_str("QR protocol"),
            FaultCategory::Leak { stage, zone } => {
                write!(f, "leak stage {} zone {}", stage.index() + 1, zone.index() + 1)
            }
            FaultCategory::Clog { zone } => write!(f, "clog zone {}", zone.index() + 1),
        }
    }
}

impl FaultCategory {
    /// Every leak category (stage-major), then every clog category.
    pub fn vacuum() -> impl Iterator<Item = FaultCategory> + Clone {
        let leak = LeakStage::ALL.into_iter().flat_map(|stage| {
            Zone::ALL
                .into_iter()
                .map(move |zone| FaultCategory::Leak { stage, zone })
        });
        let clog = Zone::ALL.into_iter().map(|zone| FaultCategory::Clog { zone });
        leak.chain(clog)
    }
}

/// The full counter record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultCounters {
    rotation: [[SaturatingCounter; 2]; 2],
    fine_tuned: [[SaturatingCounter; 2]; 2],
    qr: SaturatingCounter,
    leak: [[SaturatingCounter; 3]; 3],
    clog: [SaturatingCounter; 3],
}

impl FaultCounters {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, cat: FaultCategory) -> &SaturatingCounter {
        match cat {
            FaultCategory::Rotation(v, d) => &self.rotation[v.index()][d.index()],
            FaultCategory::FineTuned(v, d) => &self.fine_tuned[v.index()][d.index()],
            FaultCategory::Qr => &self.qr,
            FaultCategory::Leak { stage, zone } => &self.leak[stage.index()][zone.index()],
            FaultCategory::Clog { zone } => &self.clog[zone.index()],
        }
    }

    fn slot_mut(&mut self, cat: FaultCategory) -> &mut SaturatingCounter {
        match cat {
            FaultCategory::Rotation(v, d) => &mut self.rotation[v.index()][d.index()],
            FaultCategory::FineTuned(v, d) => &mut self.fine_tuned[v.index()][d.index()],
            FaultCategory::Qr => &mut self.qr,
            FaultCategory::Leak { stage, zone } => &mut self.leak[stage.index()][zone.index()],
            FaultCategory::Clog { zone } => &mut self.clog[zone.index()],
        }
    }

    pub fn get(&self, cat: FaultCategory) -> u8 {
        self.slot(cat).get()
    }

    /// Count one failure. Returns the new (clamped) value.
    pub fn record_failure(&mut self, cat: FaultCategory) -> u8 {
        let n = self.slot_mut(cat).increment();
        tracing::debug!(category = %cat, count = n, "fault counted");
        n
    }

    pub fn record_success(&mut self, cat: FaultCategory) {
        self.slot_mut(cat).reset();
    }

    pub fn reset_all(&mut self) {
        *self = Self::default();
    }

    /// Every category paired with its current value.
    pub fn iter(&self) -> impl Iterator<Item = (FaultCategory, u8)> + '_ {
        let valves = Valve::ALL
            .into_iter()
            .flat_map(|v| Direction::ALL.into_iter().map(move |d| (v, d)));
        let rotation = valves
            .clone()
            .map(|(v, d)| FaultCategory::Rotation(v, d));
        let fine = valves.map(|(v, d)| FaultCategory::FineTuned(v, d));
        rotation
            .chain(fine)
            .chain(std::iter::once(FaultCategory::Qr))
            .chain(FaultCategory::vacuum())
            .map(|cat| (cat, self.get(cat)))
    }
}
