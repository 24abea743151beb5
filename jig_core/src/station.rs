//! The production cycle as a steppable state machine.
//!
//! One `step()` runs one phase: startup handshake, start prompt, escalation
//! check, stack check, carrier advance, gate preset, QR verification,
//! decision, retract. Blocking alarms are a phase of their own that polls the
//! operator one button period per step.
//!
//! The kill switch is only honoured between non-critical phases. A signal that
//! arrives while the carrier is out stays latched until the carrier is home.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use jig_config::Settings;
use jig_traits::{Direction, Input, Screen, Valve};

use crate::alarm::{ActiveAlarm, AlarmKind};
use crate::builder::{Missing, StationBuilder};
use crate::config::JigCfg;
use crate::counters::FaultCounters;
use crate::error::Result;
use crate::escalation::{Escalation, FaultEscalation};
use crate::mechanism::{self, Advance, GateMove, GatePosition, Retract};
use crate::poll::{Poll, Probe, poll_until};
use crate::qr::{self, Disposition, QrSession, QrVerdict};
use crate::rig::Rig;
use crate::stack::{StackCheck, StackMonitor};
use crate::status::{CycleReport, CycleStats, CycleStatus, Decision, RestartReason};
use crate::valve::{self, RotationMode, RotationReport};

/// Where the station goes once an alarm is acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resume {
    Startup,
    Advance,
    Decide(Disposition),
    Restart(RestartReason),
}

#[derive(Debug)]
enum Phase {
    Startup,
    AwaitStart { pressed: bool },
    Escalation,
    Stack,
    Advance,
    PresetGate,
    Verify,
    Decide(Disposition),
    Retract(Decision),
    Awaiting { alarm: ActiveAlarm, resume: Resume },
    Halted,
}

impl Phase {
    /// Phases during which the kill switch is masked.
    fn is_critical(&self) -> bool {
        matches!(
            self,
            Phase::Advance
                | Phase::PresetGate
                | Phase::Verify
                | Phase::Decide(_)
                | Phase::Retract(_)
        )
    }

    fn name(&self) -> &'static str {
        match self {
            Phase::Startup => "startup",
            Phase::AwaitStart { .. } => "await-start",
            Phase::Escalation => "escalation",
            Phase::Stack => "stack",
            Phase::Advance => "advance",
            Phase::PresetGate => "preset-gate",
            Phase::Verify => "verify",
            Phase::Decide(_) => "decide",
            Phase::Retract(_) => "retract",
            Phase::Awaiting { .. } => "awaiting-ack",
            Phase::Halted => "halted",
        }
    }
}

/// Per-cartridge facts collected on the way round.
#[derive(Debug, Default, Clone, Copy)]
struct Draft {
    carrier_retries: u8,
    verdict: Option<QrVerdict>,
    exchanges: u8,
}

pub struct Station {
    rig: Rig,
    cfg: JigCfg,
    settings: Settings,
    counters: FaultCounters,
    escalation: FaultEscalation,
    stack: StackMonitor,
    stats: CycleStats,
    /// Decision carried from the previous cartridge. Starts as reject.
    reject_flag: bool,
    sbc_ready: bool,
    phase: Phase,
    draft: Draft,
    kill: Arc<AtomicBool>,
    kill_latched: bool,
}

impl std::fmt::Debug for Station {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Station")
            .field("phase", &self.phase.name())
            .field("stats", &self.stats)
            .field("reject_flag", &self.reject_flag)
            .field("sbc_ready", &self.sbc_ready)
            .finish_non_exhaustive()
    }
}

impl Station {
    pub fn builder() -> StationBuilder<Missing, Missing> {
        StationBuilder::default()
    }

    pub(crate) fn new(rig: Rig, cfg: JigCfg, settings: Settings, kill: Arc<AtomicBool>) -> Self {
        let escalation = FaultEscalation::from_cfg(&cfg.escalation);
        let stack = StackMonitor::new(cfg.stack.skip_count);
        Self {
            rig,
            cfg,
            settings,
            counters: FaultCounters::new(),
            escalation,
            stack,
            stats: CycleStats::default(),
            reject_flag: true,
            sbc_ready: false,
            phase: Phase::Startup,
            draft: Draft::default(),
            kill,
            kill_latched: false,
        }
    }

    pub fn counters(&self) -> &FaultCounters {
        &self.counters
    }

    pub fn stats(&self) -> CycleStats {
        self.stats
    }

    pub fn reject_flag(&self) -> bool {
        self.reject_flag
    }

    pub fn sbc_ready(&self) -> bool {
        self.sbc_ready
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    /// Takes effect from the next startup phase.
    pub fn set_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    pub fn phase_name(&self) -> &'static str {
        self.phase.name()
    }

    /// Replace the escalation policies, e.g. to register a custom one.
    pub fn set_escalation(&mut self, escalation: FaultEscalation) {
        self.escalation = escalation;
    }

    /// Cold re-initialisation: counters, statistics, sticky decision and SBC
    /// state all start over.
    pub fn cold_restart(&mut self) {
        tracing::info!(tested = self.stats.tested, passed = self.stats.passed, "cold restart");
        self.counters.reset_all();
        self.stats = CycleStats::default();
        self.reject_flag = true;
        self.sbc_ready = false;
        self.stack.rearm();
        self.draft = Draft::default();
        self.phase = Phase::Startup;
    }

    /// Park every actuator.
    pub fn park(&mut self) -> Result<()> {
        mechanism::reset_to_safe_state(&mut self.rig)
    }

    fn telemetry_enabled(&mut self) -> Result<bool> {
        Ok(!self.settings.sbc_disabled && self.rig.sbc_ready()?)
    }

    /// Run one closed-loop valve check against this station's counters.
    pub fn diagnose_valve(
        &mut self,
        valve: Valve,
        dir: Direction,
        mode: RotationMode,
    ) -> Result<RotationReport> {
        let telemetry = self.telemetry_enabled()?;
        valve::rotate(
            &mut self.rig,
            &self.cfg.valve,
            &mut self.counters,
            valve,
            dir,
            mode,
            telemetry,
        )
    }

    /// Open-loop drive using the persisted tuning. Returns poll periods driven.
    pub fn drive_valve_open_loop(&mut self, valve: Valve, dir: Direction) -> Result<u32> {
        valve::rotate_open_loop(
            &mut self.rig,
            &self.cfg.valve,
            valve,
            dir,
            self.settings.valve_tuning_ticks,
        )
    }

    fn raise(&mut self, kind: AlarmKind, resume: Resume) -> Result<CycleStatus> {
        let alarm = ActiveAlarm::raise(&mut self.rig, kind)?;
        self.phase = Phase::Awaiting { alarm, resume };
        Ok(CycleStatus::Alarm(kind))
    }

    fn show_counts(&mut self) -> Result<()> {
        self.rig.show(Screen::title(self.stats.to_string()))
    }

    /// Run one phase.
    pub fn step(&mut self) -> Result<CycleStatus> {
        if !self.kill_latched && self.kill.load(Ordering::SeqCst) {
            self.kill_latched = true;
            if self.phase.is_critical() {
                tracing::info!(
                    phase = self.phase.name(),
                    "kill switch latched until carrier is home"
                );
            }
        }
        if self.kill_latched && !self.phase.is_critical() {
            if !matches!(self.phase, Phase::Halted) {
                tracing::warn!(phase = self.phase.name(), "kill switch: parking and shutting down");
                mechanism::reset_to_safe_state(&mut self.rig)?;
                self.rig.show(Screen::title("SHUTDOWN"))?;
                self.phase = Phase::Halted;
            }
            return Ok(CycleStatus::Shutdown);
        }

        let phase = std::mem::replace(&mut self.phase, Phase::Halted);
        match phase {
            Phase::Startup => self.startup(),
            Phase::AwaitStart { pressed } => self.await_start(pressed),
            Phase::Escalation => self.check_escalation(),
            Phase::Stack => self.check_stack(),
            Phase::Advance => self.advance(),
            Phase::PresetGate => self.preset_gate(),
            Phase::Verify => self.verify(),
            Phase::Decide(d) => self.decide(d),
            Phase::Retract(d) => self.retract(d),
            Phase::Awaiting { alarm, resume } => self.await_ack(alarm, resume),
            Phase::Halted => Ok(CycleStatus::Shutdown),
        }
    }

    fn startup(&mut self) -> Result<CycleStatus> {
        mechanism::reset_to_safe_state(&mut self.rig)?;

        if self.settings.sbc_disabled {
            tracing::info!("SBC disabled in settings");
            self.sbc_ready = false;
        } else if self.rig.sbc_ready()? {
            self.sbc_ready = true;
        } else {
            self.rig.show(Screen::title("INITIALIZING"))?;
            let clock = self.rig.clock_handle();
            let rig = &mut self.rig;
            let res = poll_until(&*clock, self.cfg.qr.poll, self.cfg.qr.ready_polls, || {
                if rig.sbc_ready()? {
                    return Ok(Probe::Done);
                }
                Ok(if rig.chord_held()? {
                    Probe::Abort
                } else {
                    Probe::Pending
                })
            })?;
            match res {
                Poll::Ready(polls) => {
                    tracing::info!(polls, "SBC ready");
                    self.sbc_ready = true;
                }
                Poll::Aborted => {
                    tracing::warn!("SBC handshake skipped by operator");
                    self.sbc_ready = false;
                }
                Poll::TimedOut => {
                    tracing::error!("SBC never became ready");
                    mechanism::reset_to_safe_state(&mut self.rig)?;
                    return self.raise(AlarmKind::SbcNotReady, Resume::Startup);
                }
            }
        }

        self.rig.show(Screen::title("PRESS START"))?;
        self.phase = Phase::AwaitStart { pressed: false };
        Ok(CycleStatus::Running)
    }

    fn await_start(&mut self, pressed: bool) -> Result<CycleStatus> {
        self.rig.sleep(self.cfg.alarm.button_poll);
        let start = self.rig.sense(Input::Start)?;
        self.phase = match (pressed, start) {
            (false, true) => Phase::AwaitStart { pressed: true },
            (true, false) => {
                tracing::info!(sbc_ready = self.sbc_ready, "testing started");
                Phase::Escalation
            }
            (p, _) => Phase::AwaitStart { pressed: p },
        };
        Ok(CycleStatus::Running)
    }

    fn check_escalation(&mut self) -> Result<CycleStatus> {
        match self.escalation.evaluate(&self.counters) {
            Escalation::Continue => {
                self.phase = Phase::Stack;
                Ok(CycleStatus::Running)
            }
            Escalation::Halt { policy, category } => {
                mechanism::reset_to_safe_state(&mut self.rig)?;
                self.raise(
                    AlarmKind::ContinuousError(category),
                    Resume::Restart(RestartReason::Escalation { policy, category }),
                )
            }
        }
    }

    fn check_stack(&mut self) -> Result<CycleStatus> {
        let present = self.rig.sense(Input::StackPresent)?;
        match self.stack.check(present) {
            StackCheck::Present => {}
            StackCheck::Debouncing { remaining } => {
                tracing::debug!(remaining, "stack reads empty, tolerating");
            }
            StackCheck::Empty => {
                mechanism::reset_to_safe_state(&mut self.rig)?;
                return self.raise(AlarmKind::StackEmpty, Resume::Advance);
            }
        }
        self.phase = Phase::Advance;
        Ok(CycleStatus::Running)
    }

    fn advance(&mut self) -> Result<CycleStatus> {
        self.draft = Draft::default();
        self.show_counts()?;
        match mechanism::advance_carrier(&mut self.rig, &self.cfg.mechanism)? {
            Advance::Arrived { retries } => {
                self.draft.carrier_retries = retries;
                self.phase = Phase::PresetGate;
                Ok(CycleStatus::Running)
            }
            Advance::Stuck => self.raise(AlarmKind::CarrierStuck, Resume::Advance),
            Advance::Fatal(f) => self.raise(
                AlarmKind::Mechanism(f),
                Resume::Restart(RestartReason::Mechanism(f)),
            ),
        }
    }

    fn move_gate(&mut self, pos: GatePosition) -> Result<Option<CycleStatus>> {
        match mechanism::actuate_reject_gate(&mut self.rig, &self.cfg.mechanism, pos)? {
            GateMove::Done => Ok(None),
            GateMove::Fatal(f) => self
                .raise(
                    AlarmKind::Mechanism(f),
                    Resume::Restart(RestartReason::Mechanism(f)),
                )
                .map(Some),
        }
    }

    /// The previous cartridge drops through the gate as this one arrives, so
    /// the gate follows the previous decision.
    fn preset_gate(&mut self) -> Result<CycleStatus> {
        self.rig.sleep(self.cfg.mechanism.settle);
        let pos = if self.reject_flag {
            GatePosition::Reject
        } else {
            GatePosition::Pass
        };
        if let Some(status) = self.move_gate(pos)? {
            return Ok(status);
        }
        self.rig.sleep(self.cfg.mechanism.settle);
        self.phase = Phase::Verify;
        Ok(CycleStatus::Running)
    }

    fn verify(&mut self) -> Result<CycleStatus> {
        self.stats.tested += 1;
        self.rig.flush_input()?;
        let session = QrSession {
            sbc_ready: self.sbc_ready,
            qr_disabled: self.settings.qr_disabled,
        };
        let v = qr::verify_cartridge(&mut self.rig, &self.cfg.qr, &mut self.counters, session)?;
        self.draft.verdict = v.verdict;
        self.draft.exchanges = v.exchanges;

        if v.disposition == Disposition::Pass {
            self.stats.passed += 1;
            self.show_counts()?;
        }

        match v.alarm {
            Some(kind) => {
                let rehome = match kind {
                    AlarmKind::Qr(verdict) => verdict.resets_mechanism(),
                    AlarmKind::SbcNoAck => true,
                    _ => false,
                };
                if rehome {
                    mechanism::reset_to_safe_state(&mut self.rig)?;
                }
                self.raise(kind, Resume::Decide(v.disposition))
            }
            None => {
                self.phase = Phase::Decide(v.disposition);
                Ok(CycleStatus::Running)
            }
        }
    }

    fn decide(&mut self, disposition: Disposition) -> Result<CycleStatus> {
        let decision = match disposition {
            Disposition::Pass => Decision::Pass,
            Disposition::Sticky if !self.reject_flag => Decision::Pass,
            Disposition::Sticky | Disposition::Reject | Disposition::Retry => Decision::Reject,
        };
        self.reject_flag = decision == Decision::Reject;
        tracing::info!(?disposition, ?decision, tested = self.stats.tested, "cartridge decided");

        let pos = match decision {
            Decision::Pass => GatePosition::Pass,
            Decision::Reject => GatePosition::Reject,
        };
        if let Some(status) = self.move_gate(pos)? {
            return Ok(status);
        }
        if self.sbc_ready {
            self.rig.send(&[self.cfg.qr.stop_code])?;
        }
        self.phase = Phase::Retract(decision);
        Ok(CycleStatus::Running)
    }

    fn retract(&mut self, decision: Decision) -> Result<CycleStatus> {
        let skipped = match mechanism::retract_carrier(&mut self.rig, &self.cfg.mechanism)? {
            Retract::Home => false,
            Retract::Skipped => true,
            Retract::Fatal(f) => {
                return self.raise(
                    AlarmKind::Mechanism(f),
                    Resume::Restart(RestartReason::Mechanism(f)),
                );
            }
        };
        let report = CycleReport {
            cycle: self.stats.tested,
            verdict: self.draft.verdict,
            decision,
            carrier_retries: self.draft.carrier_retries,
            exchanges: self.draft.exchanges,
            retract_skipped: skipped,
        };
        self.phase = Phase::Escalation;
        Ok(CycleStatus::CycleComplete(report))
    }

    fn await_ack(&mut self, mut alarm: ActiveAlarm, resume: Resume) -> Result<CycleStatus> {
        if !alarm.poll(&mut self.rig, &self.cfg.alarm, self.cfg.stack.debounce)? {
            self.phase = Phase::Awaiting { alarm, resume };
            return Ok(CycleStatus::Running);
        }

        if let Some(msg) = alarm.kind().cleared_message() {
            self.rig.show(Screen::status(msg))?;
            self.rig.sleep(Duration::from_secs(1));
            self.rig.show(Screen::blank())?;
        }

        match resume {
            Resume::Startup => self.phase = Phase::Startup,
            Resume::Advance => {
                if alarm.kind() == AlarmKind::StackEmpty {
                    self.stack.rearm();
                }
                self.phase = Phase::Advance;
            }
            Resume::Decide(d) => self.phase = Phase::Decide(d),
            Resume::Restart(reason) => {
                tracing::warn!(%reason, "restarting after acknowledged fault");
                self.cold_restart();
                return Ok(CycleStatus::Restart(reason));
            }
        }
        Ok(CycleStatus::Running)
    }
}
