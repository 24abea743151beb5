//! Carrier, stopper and reject gate.
//!
//! Position is never cached: every decision re-reads the sensors. Each
//! operation returns a discriminated outcome and leaves the station to decide
//! what an alarm means. Any path that gives up parks every actuator first.

use std::fmt;
use std::time::Duration;

use jig_traits::{Input, Output, Screen};

use crate::config::MechanismCfg;
use crate::error::Result;
use crate::poll::{Poll, Probe, poll_until};
use crate::rig::Rig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePosition {
    Pass,
    Reject,
}

impl GatePosition {
    fn energised(self) -> bool {
        matches!(self, GatePosition::Reject)
    }
}

/// Mechanical faults that have no automatic recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalFault {
    /// Carrier never came home while recovering from a forward jam.
    RecoveryStuck,
    /// Carrier never came home at the end of a cycle.
    RetractStuck,
    /// Reject gate sensor never confirmed the commanded position.
    GateStuck(GatePosition),
}

impl FatalFault {
    /// Operator-facing tag.
    pub fn message(self) -> &'static str {
        match self {
            FatalFault::RecoveryStuck | FatalFault::RetractStuck => "CAT PLT BK STUCK",
            FatalFault::GateStuck(_) => "REJECT GATE STUCK",
        }
    }
}

impl fmt::Display for FatalFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Carrier at the scan position after `retries` recovery attempts.
    Arrived { retries: u8 },
    /// Recovery budget used up; actuators parked. Recoverable after acknowledgement.
    Stuck,
    Fatal(FatalFault),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retract {
    Home,
    /// Operator pressed a button to stop waiting.
    Skipped,
    Fatal(FatalFault),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateMove {
    Done,
    Fatal(FatalFault),
}

fn wait_for(rig: &mut Rig, cfg: &MechanismCfg, input: Input, ticks: u32) -> Result<Poll> {
    let clock = rig.clock_handle();
    poll_until(&*clock, cfg.tick, ticks, || {
        Ok(if rig.sense(input)? {
            Probe::Done
        } else {
            Probe::Pending
        })
    })
}

/// Drop one cartridge and push the carrier to the scan position.
///
/// A forward timeout triggers up to `stuck_retries` recoveries (carrier back
/// until home, then forward again). Failing to get home during a recovery is
/// fatal.
pub fn advance_carrier(rig: &mut Rig, cfg: &MechanismCfg) -> Result<Advance> {
    rig.drive(Output::Stopper, true)?;
    rig.drive(Output::Carrier, true)?;

    let mut retries = 0u8;
    loop {
        if let Poll::Ready(ticks) = wait_for(rig, cfg, Input::CarrierForward, cfg.forward_ticks)? {
            rig.drive(Output::Stopper, false)?;
            tracing::debug!(ticks, retries, "carrier forward");
            return Ok(Advance::Arrived { retries });
        }

        if retries >= cfg.stuck_retries {
            tracing::warn!(retries, "carrier stuck forward, recovery budget used");
            reset_to_safe_state(rig)?;
            return Ok(Advance::Stuck);
        }
        retries += 1;
        tracing::info!(attempt = retries, "carrier forward timeout, recovering");

        rig.drive(Output::Carrier, false)?;
        if !wait_for(rig, cfg, Input::CarrierBackward, cfg.recover_ticks)?.is_ready() {
            tracing::error!(attempt = retries, "carrier stuck during recovery");
            reset_to_safe_state(rig)?;
            return Ok(Advance::Fatal(FatalFault::RecoveryStuck));
        }
        rig.drive(Output::Stopper, true)?;
        rig.drive(Output::Carrier, true)?;
    }
}

/// Bring the carrier home. Either chord button aborts the wait.
pub fn retract_carrier(rig: &mut Rig, cfg: &MechanismCfg) -> Result<Retract> {
    rig.drive(Output::Carrier, false)?;
    let clock = rig.clock_handle();
    let res = poll_until(&*clock, cfg.tick, cfg.retract_ticks, || {
        if rig.sense(Input::CarrierBackward)? {
            return Ok(Probe::Done);
        }
        Ok(if rig.any_button()? {
            Probe::Abort
        } else {
            Probe::Pending
        })
    })?;

    match res {
        Poll::Ready(_) => Ok(Retract::Home),
        Poll::Aborted => {
            tracing::info!("retract wait skipped by operator");
            rig.drive(Output::Buzzer, false)?;
            rig.show(Screen::title("ERROR SKIPPED"))?;
            rig.sleep(Duration::from_secs(1));
            rig.show(Screen::blank())?;
            Ok(Retract::Skipped)
        }
        Poll::TimedOut => {
            tracing::error!(ticks = cfg.retract_ticks, "carrier did not return home");
            reset_to_safe_state(rig)?;
            Ok(Retract::Fatal(FatalFault::RetractStuck))
        }
    }
}

/// Move the reject gate; confirm with the gate sensor when the board has one.
pub fn actuate_reject_gate(
    rig: &mut Rig,
    cfg: &MechanismCfg,
    pos: GatePosition,
) -> Result<GateMove> {
    rig.drive(Output::RejectGate, pos.energised())?;
    if !cfg.gate_sensor {
        return Ok(GateMove::Done);
    }
    let want = pos.energised();
    let clock = rig.clock_handle();
    let res = poll_until(&*clock, cfg.tick, cfg.gate_ticks, || {
        Ok(if rig.sense(Input::RejectGate)? == want {
            Probe::Done
        } else {
            Probe::Pending
        })
    })?;
    if res.is_ready() {
        Ok(GateMove::Done)
    } else {
        tracing::error!(?pos, "reject gate did not confirm");
        reset_to_safe_state(rig)?;
        Ok(GateMove::Fatal(FatalFault::GateStuck(pos)))
    }
}

/// De-energise every output. Tries all of them even if one fails and
/// reports the first failure.
pub fn reset_to_safe_state(rig: &mut Rig) -> Result<()> {
    let mut first_err = None;
    for out in Output::ALL {
        if let Err(e) = rig.drive(out, false) {
            tracing::warn!(?out, error = %e, "failed to park output");
            first_err.get_or_insert(e);
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
