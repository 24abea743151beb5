//! Blocking alarms.
//!
//! An alarm shows its message, drives a buzzer/tower pattern and waits for the
//! operator. It is polled one button period at a time so the station stays
//! steppable while an alarm is up.

use std::time::{Duration, Instant};

use jig_traits::{Input, Output, Screen};

use crate::config::AlarmCfg;
use crate::counters::FaultCategory;
use crate::error::Result;
use crate::mechanism::FatalFault;
use crate::qr::QrVerdict;
use crate::rig::Rig;

const PRESS_ACK: &str = "PRESS MENU/START";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmKind {
    /// Unrecoverable mechanism fault; cold restart after acknowledgement.
    Mechanism(FatalFault),
    /// Carrier recovery budget used up; the advance is retried after acknowledgement.
    CarrierStuck,
    /// Blocking QR verdict.
    Qr(QrVerdict),
    /// Every attempt used without a usable verdict.
    QrNotReadable,
    /// SBC never took a trigger.
    SbcNoAck,
    /// SBC never came up at startup.
    SbcNotReady,
    StackEmpty,
    /// An enforced escalation policy tripped on this category.
    ContinuousError(FaultCategory),
}

/// Buzzer/tower pattern while waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    /// Buzzer and tower take turns.
    Alternate,
    /// Buzzer toggles, tower off.
    Buzzer,
    /// Tower steady, buzzer toggles.
    TowerBuzzer,
}

/// What clears the alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckKind {
    /// Start and menu-alt held together.
    Chord,
    /// Debounced start press, release, then a fresh press.
    StartPress,
}

impl AlarmKind {
    pub fn screen(self) -> Screen {
        match self {
            AlarmKind::Mechanism(f) => Screen::status(f.message()),
            AlarmKind::CarrierStuck => Screen::status("CAT PLT FW STUCK"),
            AlarmKind::Qr(v) => Screen::pair(v.message(), PRESS_ACK),
            AlarmKind::QrNotReadable => Screen::pair("QR NOT READABLE", PRESS_ACK),
            AlarmKind::SbcNoAck => Screen::overlay("SBC Er-2"),
            AlarmKind::SbcNotReady => Screen::overlay("SBC Er-1"),
            AlarmKind::StackEmpty => Screen::title("STACK EMPTY"),
            AlarmKind::ContinuousError(_) => Screen::title("CONT. ERROR"),
        }
    }

    pub fn pattern(self) -> Pattern {
        match self {
            AlarmKind::Mechanism(_)
            | AlarmKind::CarrierStuck
            | AlarmKind::SbcNoAck
            | AlarmKind::SbcNotReady => Pattern::Alternate,
            AlarmKind::Qr(_) | AlarmKind::QrNotReadable => Pattern::Buzzer,
            AlarmKind::StackEmpty | AlarmKind::ContinuousError(_) => Pattern::TowerBuzzer,
        }
    }

    pub fn ack(self) -> AckKind {
        match self {
            AlarmKind::StackEmpty => AckKind::StartPress,
            _ => AckKind::Chord,
        }
    }

    /// Acknowledging leads to a cold restart rather than resuming.
    pub fn forces_restart(self) -> bool {
        matches!(self, AlarmKind::Mechanism(_) | AlarmKind::ContinuousError(_))
    }

    /// Shown for a second after acknowledgement.
    pub fn cleared_message(self) -> Option<&'static str> {
        match self {
            AlarmKind::Mechanism(_) | AlarmKind::SbcNoAck | AlarmKind::SbcNotReady => {
                Some("ERROR CLEARED")
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AckStage {
    Waiting,
    Debounce(Instant),
    Release,
    FreshPress,
}

/// An alarm waiting for the operator.
#[derive(Debug, Clone)]
pub struct ActiveAlarm {
    kind: AlarmKind,
    last_toggle: Instant,
    phase: bool,
    toggles: u32,
    stage: AckStage,
}

impl ActiveAlarm {
    /// Show the alarm and start its pattern.
    pub fn raise(rig: &mut Rig, kind: AlarmKind) -> Result<Self> {
        tracing::warn!(?kind, "alarm raised, waiting for operator");
        rig.show(kind.screen())?;
        let alarm = Self {
            kind,
            last_toggle: rig.clock().now(),
            phase: true,
            toggles: 0,
            stage: AckStage::Waiting,
        };
        alarm.apply_pattern(rig)?;
        Ok(alarm)
    }

    pub fn kind(&self) -> AlarmKind {
        self.kind
    }

    fn apply_pattern(&self, rig: &mut Rig) -> Result<()> {
        let (buzzer, tower) = match self.kind.pattern() {
            Pattern::Alternate => (self.phase, !self.phase),
            Pattern::Buzzer => (self.phase, false),
            Pattern::TowerBuzzer => (self.phase, true),
        };
        rig.drive(Output::Buzzer, buzzer)?;
        rig.drive(Output::Tower, tower)
    }

    fn silence(rig: &mut Rig) -> Result<()> {
        rig.drive(Output::Buzzer, false)?;
        rig.drive(Output::Tower, false)
    }

    fn blink(&mut self, rig: &mut Rig, cfg: &AlarmCfg) -> Result<()> {
        let now = rig.clock().now();
        if now.saturating_duration_since(self.last_toggle) < cfg.blink {
            return Ok(());
        }
        self.last_toggle = now;
        self.phase = !self.phase;
        self.toggles += 1;
        self.apply_pattern(rig)?;
        if self.kind == AlarmKind::StackEmpty && self.toggles % 3 == 0 {
            let screen = if (self.toggles / 3) % 2 == 1 {
                Screen::pair("FILL STACK &", "PRESS START")
            } else {
                AlarmKind::StackEmpty.screen()
            };
            rig.show(screen)?;
        }
        Ok(())
    }

    /// Wait one button period, advance the pattern and check for the
    /// acknowledgement. Returns `true` once acknowledged, with buzzer and
    /// tower off.
    pub fn poll(&mut self, rig: &mut Rig, cfg: &AlarmCfg, debounce: Duration) -> Result<bool> {
        rig.sleep(cfg.button_poll);
        if matches!(self.stage, AckStage::Waiting | AckStage::Debounce(_)) {
            self.blink(rig, cfg)?;
        }

        match self.kind.ack() {
            AckKind::Chord => {
                if rig.chord_held()? {
                    Self::silence(rig)?;
                    tracing::info!(kind = ?self.kind, "alarm acknowledged");
                    return Ok(true);
                }
            }
            AckKind::StartPress => {
                let start = rig.sense(Input::Start)?;
                let now = rig.clock().now();
                self.stage = match (self.stage, start) {
                    (AckStage::Waiting, true) => AckStage::Debounce(now),
                    (AckStage::Debounce(_), false) => AckStage::Waiting,
                    (AckStage::Debounce(t), true)
                        if now.saturating_duration_since(t) >= debounce =>
                    {
                        Self::silence(rig)?;
                        AckStage::Release
                    }
                    (AckStage::Release, false) => AckStage::FreshPress,
                    (AckStage::FreshPress, true) => {
                        tracing::info!(kind = ?self.kind, "alarm acknowledged");
                        return Ok(true);
                    }
                    (stage, _) => stage,
                };
            }
        }
        Ok(false)
    }
}
