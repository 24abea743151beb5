//! Status returned from each station step.

use std::fmt;

use crate::alarm::AlarmKind;
use crate::counters::FaultCategory;
use crate::mechanism::FatalFault;
use crate::qr::QrVerdict;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Pass,
    Reject,
}

/// Summary of one finished cartridge cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Running count of cartridges tested, this one included.
    pub cycle: u64,
    pub verdict: Option<QrVerdict>,
    pub decision: Decision,
    /// Carrier recovery attempts before it reached the scan position.
    pub carrier_retries: u8,
    /// QR exchanges run for this cartridge.
    pub exchanges: u8,
    /// Operator skipped the final retract wait.
    pub retract_skipped: bool,
}

/// Why the station cold-restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    Mechanism(FatalFault),
    Escalation {
        policy: &'static str,
        category: FaultCategory,
    },
}

impl fmt::Display for RestartReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestartReason::Mechanism(fault) => write!(f, "mechanism fault: {fault}"),
            RestartReason::Escalation { policy, category } => {
                write!(f, "{policy} policy tripped on {category}")
            }
        }
    }
}

/// Public status of a single station step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleStatus {
    /// Keep stepping.
    Running,
    /// An alarm was just raised; following steps wait for the operator.
    Alarm(AlarmKind),
    /// A cartridge went through the whole cycle.
    CycleComplete(CycleReport),
    /// Fatal or systemic fault acknowledged; the station re-initialised itself.
    Restart(RestartReason),
    /// Kill switch honoured; every actuator parked.
    Shutdown,
}

/// Tested/passed totals since the last cold start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub tested: u64,
    pub passed: u64,
}

impl fmt::Display for CycleStats {
    /// 16-column counts line, `T0000012|P000009`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "T{:07}|P{:06}",
            self.tested % 10_000_000,
            self.passed % 1_000_000
        )
    }
}
