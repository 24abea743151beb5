//! Fault escalation policies.
//!
//! A policy looks at the counter record and names the category that tripped,
//! if any. Each registered policy carries a mode: enforced trips halt the
//! station, advisory trips are only logged, disabled policies are skipped.

use jig_traits::{Direction, Valve};

use crate::config::{EscalationCfg, PolicyMode};
use crate::counters::{FaultCategory, FaultCounters, LeakStage};

pub trait EscalationPolicy {
    fn name(&self) -> &'static str;
    /// First category whose counter is strictly above its threshold.
    fn tripped(&self, counters: &FaultCounters) -> Option<FaultCategory>;
}

/// QR protocol counter above `threshold`.
#[derive(Debug, Clone, Copy)]
pub struct QrThreshold {
    pub threshold: u8,
}

impl EscalationPolicy for QrThreshold {
    fn name(&self) -> &'static str {
        "qr"
    }

    fn tripped(&self, counters: &FaultCounters) -> Option<FaultCategory> {
        (counters.get(FaultCategory::Qr) > self.threshold).then_some(FaultCategory::Qr)
    }
}

/// Any standard or fine-tuned rotation counter above `threshold`.
#[derive(Debug, Clone, Copy)]
pub struct ValveThreshold {
    pub threshold: u8,
}

impl EscalationPolicy for ValveThreshold {
    fn name(&self) -> &'static str {
        "valve"
    }

    fn tripped(&self, counters: &FaultCounters) -> Option<FaultCategory> {
        Valve::ALL
            .into_iter()
            .flat_map(|v| Direction::ALL.into_iter().map(move |d| (v, d)))
            .flat_map(|(v, d)| [FaultCategory::Rotation(v, d), FaultCategory::FineTuned(v, d)])
            .find(|cat| counters.get(*cat) > self.threshold)
    }
}

/// Leak and clog counters. The final leak stage uses its own threshold.
#[derive(Debug, Clone, Copy)]
pub struct VacuumThreshold {
    pub leak_threshold: u8,
    pub leak3_threshold: u8,
}

impl EscalationPolicy for VacuumThreshold {
    fn name(&self) -> &'static str {
        "vacuum"
    }

    fn tripped(&self, counters: &FaultCounters) -> Option<FaultCategory> {
        FaultCategory::vacuum().find(|cat| {
            let limit = match cat {
                FaultCategory::Leak {
                    stage: LeakStage::LAST,
                    ..
                } => self.leak3_threshold,
                _ => self.leak_threshold,
            };
            counters.get(*cat) > limit
        })
    }
}

/// Result of one policy check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    Continue,
    Halt {
        policy: &'static str,
        category: FaultCategory,
    },
}

/// The registered policies, evaluated in order.
pub struct FaultEscalation {
    policies: Vec<(Box<dyn EscalationPolicy>, PolicyMode)>,
}

impl std::fmt::Debug for FaultEscalation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.policies.iter().map(|(p, m)| (p.name(), m)))
            .finish()
    }
}

impl FaultEscalation {
    pub fn empty() -> Self {
        Self {
            policies: Vec::new(),
        }
    }

    pub fn register(&mut self, policy: impl EscalationPolicy + 'static, mode: PolicyMode) {
        self.policies.push((Box::new(policy), mode));
    }

    pub fn from_cfg(cfg: &EscalationCfg) -> Self {
        let mut esc = Self::empty();
        esc.register(
            QrThreshold {
                threshold: cfg.qr_threshold,
            },
            cfg.qr_mode,
        );
        esc.register(
            ValveThreshold {
                threshold: cfg.valve_threshold,
            },
            cfg.valve_mode,
        );
        esc.register(
            VacuumThreshold {
                leak_threshold: cfg.leak_threshold,
                leak3_threshold: cfg.leak3_threshold,
            },
            cfg.vacuum_mode,
        );
        esc
    }

    pub fn evaluate(&self, counters: &FaultCounters) -> Escalation {
        for (policy, mode) in &self.policies {
            if *mode == PolicyMode::Off {
                continue;
            }
            let Some(category) = policy.tripped(counters) else {
                continue;
            };
            if *mode == PolicyMode::Enforce {
                tracing::error!(policy = policy.name(), %category, "escalation threshold exceeded");
                return Escalation::Halt {
                    policy: policy.name(),
                    category,
                };
            }
            tracing::warn!(policy = policy.name(), %category, "advisory threshold exceeded");
        }
        Escalation::Continue
    }
}

impl Default for FaultEscalation {
    fn default() -> Self {
        Self::from_cfg(&EscalationCfg::default())
    }
}
