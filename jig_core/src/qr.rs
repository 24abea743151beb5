//! QR verification protocol with the SBC.
//!
//! One exchange: flush stale input, wait for the SBC to take the trigger
//! (ready line drops), then wait for a single verdict byte. The retry wrapper
//! runs up to `attempts` exchanges per cartridge and reports a decision plus
//! the alarm, if any, that the station must hold before acting on it.

use std::fmt;
use std::time::Duration;

use jig_traits::{Output, Screen};

use crate::alarm::AlarmKind;
use crate::config::QrCfg;
use crate::counters::{FaultCategory, FaultCounters};
use crate::error::Result;
use crate::poll::{Poll, Probe, poll_until};
use crate::rig::Rig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QrVerdict {
    Accept,
    Reject,
    ScannerSoftError,
    ScannerHardError,
    LengthError,
    RepeatedTestingFault,
    DuplicateFault,
    NoQr,
    LoggingError,
    /// Unrecognised response byte.
    FeedbackError,
    /// No response byte within the window.
    Timeout,
}

/// What a verdict means for the cartridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Pass,
    Reject,
    /// Reuse the previous cycle's decision.
    Sticky,
    /// Spend another attempt.
    Retry,
}

impl QrVerdict {
    pub fn from_byte(b: u8) -> Self {
        match b {
            b'A' => QrVerdict::Accept,
            b'R' => QrVerdict::Reject,
            b'S' => QrVerdict::ScannerSoftError,
            b'H' => QrVerdict::ScannerHardError,
            b'N' | b'L' => QrVerdict::LengthError,
            b'B' => QrVerdict::LoggingError,
            b'C' => QrVerdict::RepeatedTestingFault,
            b'D' => QrVerdict::DuplicateFault,
            b'Q' => QrVerdict::NoQr,
            _ => QrVerdict::FeedbackError,
        }
    }

    pub fn disposition(self) -> Disposition {
        use QrVerdict::*;
        match self {
            Accept => Disposition::Pass,
            Reject | ScannerHardError | LengthError | LoggingError | DuplicateFault => {
                Disposition::Reject
            }
            RepeatedTestingFault => Disposition::Sticky,
            ScannerSoftError | NoQr | FeedbackError | Timeout => Disposition::Retry,
        }
    }

    /// Counts against the QR fault counter. Repeat and duplicate reports are
    /// about the cartridge's history, not the exchange.
    pub fn counts_failure(self) -> bool {
        !matches!(
            self,
            QrVerdict::Accept | QrVerdict::RepeatedTestingFault | QrVerdict::DuplicateFault
        )
    }

    /// Needs an operator acknowledgement before the cycle continues.
    pub fn is_blocking(self) -> bool {
        use QrVerdict::*;
        matches!(
            self,
            ScannerHardError | LengthError | LoggingError | RepeatedTestingFault | DuplicateFault
        )
    }

    /// The only verdict that re-homes the mechanism before its alarm.
    pub fn resets_mechanism(self) -> bool {
        matches!(self, QrVerdict::RepeatedTestingFault)
    }

    pub fn message(self) -> &'static str {
        use QrVerdict::*;
        match self {
            Accept => "ACCEPTED",
            Reject => "REJECTED",
            ScannerSoftError => "SCANNER ERROR",
            ScannerHardError => "SCANNER HW ERROR",
            LengthError => "LENGTH ERROR.",
            RepeatedTestingFault => "REPEATED TESTING.",
            DuplicateFault => "DUPLICATE QR.",
            NoQr => "NO QR",
            LoggingError => "LOGGING ERROR.",
            FeedbackError => "QR FB ERROR",
            Timeout => "QR T.OUT",
        }
    }
}

impl fmt::Display for QrVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Result of a single request/response exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exchange {
    Verdict(QrVerdict),
    /// Operator held the chord while waiting.
    Aborted,
}

/// Did the SBC take the trigger?
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    Acknowledged,
    NoAck,
}

/// After a trigger, wait for the SBC to pull its ready line low.
///
/// A line that is already low counts as acknowledged, as does the chord.
pub fn wait_busy(rig: &mut Rig, cfg: &QrCfg) -> Result<Ack> {
    let clock = rig.clock_handle();
    let res = poll_until(&*clock, cfg.poll, cfg.ack_polls, || {
        if !rig.sbc_ready()? {
            return Ok(Probe::Done);
        }
        Ok(if rig.chord_held()? {
            Probe::Abort
        } else {
            Probe::Pending
        })
    })?;
    Ok(match res {
        Poll::TimedOut => Ack::NoAck,
        Poll::Ready(_) | Poll::Aborted => Ack::Acknowledged,
    })
}

/// Wait for one verdict byte, classify it into `counters` and give the
/// non-blocking feedback for it. Blocking verdicts only show their message;
/// the station owns the alarm.
pub fn exchange(rig: &mut Rig, cfg: &QrCfg, counters: &mut FaultCounters) -> Result<Exchange> {
    rig.show(Screen::title("READING QR"))?;
    let mut byte = None;
    let clock = rig.clock_handle();
    let res = poll_until(&*clock, cfg.poll, cfg.response_polls, || {
        if let Some(b) = rig.try_recv()? {
            byte = Some(b);
            return Ok(Probe::Done);
        }
        Ok(if rig.chord_held()? {
            Probe::Abort
        } else {
            Probe::Pending
        })
    })?;

    let verdict = match (res, byte) {
        (Poll::Aborted, _) => {
            tracing::info!("QR wait aborted by operator");
            return Ok(Exchange::Aborted);
        }
        (Poll::Ready(_), Some(b)) => QrVerdict::from_byte(b),
        _ => QrVerdict::Timeout,
    };

    if verdict == QrVerdict::Accept {
        counters.record_success(FaultCategory::Qr);
    } else if verdict.counts_failure() {
        counters.record_failure(FaultCategory::Qr);
    }
    tracing::info!(
        ?verdict,
        byte = ?byte.map(char::from),
        qr_errors = counters.get(FaultCategory::Qr),
        "QR verdict"
    );

    annunciate(rig, verdict)?;
    Ok(Exchange::Verdict(verdict))
}

fn annunciate(rig: &mut Rig, verdict: QrVerdict) -> Result<()> {
    let short = Duration::from_millis(100);
    match verdict {
        QrVerdict::Accept => {
            rig.chirp(short)?;
            rig.show(Screen::status(verdict.message()))?;
            rig.sleep(Duration::from_secs(1));
        }
        QrVerdict::Reject | QrVerdict::ScannerSoftError => {
            rig.sleep(short);
            rig.drive(Output::Buzzer, true)?;
            rig.sleep(short);
            rig.show(Screen::status(verdict.message()))?;
            rig.sleep(Duration::from_secs(2));
            rig.drive(Output::Buzzer, false)?;
        }
        QrVerdict::NoQr | QrVerdict::FeedbackError | QrVerdict::Timeout => {
            rig.sleep(short);
            rig.drive(Output::Buzzer, true)?;
            rig.show(Screen::status(verdict.message()))?;
            rig.sleep(Duration::from_secs(1));
            rig.drive(Output::Buzzer, false)?;
        }
        // Blocking verdicts: the alarm carries the message.
        _ => rig.sleep(short),
    }
    Ok(())
}

/// Whether the SBC can be asked at all this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QrSession {
    pub sbc_ready: bool,
    pub qr_disabled: bool,
}

impl QrSession {
    pub fn enabled(self) -> bool {
        self.sbc_ready && !self.qr_disabled
    }
}

/// Outcome of the per-cartridge retry wrapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    /// Last verdict received, if any.
    pub verdict: Option<QrVerdict>,
    pub disposition: Disposition,
    /// Alarm to hold before acting on the disposition.
    pub alarm: Option<AlarmKind>,
    /// Exchanges actually run.
    pub exchanges: u8,
}

impl Verification {
    fn settled(verdict: Option<QrVerdict>, disposition: Disposition, exchanges: u8) -> Self {
        Self {
            verdict,
            disposition,
            alarm: None,
            exchanges,
        }
    }

    fn with_alarm(mut self, alarm: AlarmKind) -> Self {
        self.alarm = Some(alarm);
        self
    }
}

/// Send the trigger and wait for the SBC to take it, re-sending up to
/// `trigger_sends` times.
fn trigger(rig: &mut Rig, cfg: &QrCfg, code: u8) -> Result<Ack> {
    for send in 1..=cfg.trigger_sends {
        rig.send(&[code])?;
        if wait_busy(rig, cfg)? == Ack::Acknowledged {
            return Ok(Ack::Acknowledged);
        }
        tracing::warn!(send, code, "SBC did not acknowledge trigger");
    }
    Ok(Ack::NoAck)
}

/// Run up to `attempts` exchanges for one cartridge.
///
/// Retryable verdicts show "RETRYING" and spend an attempt. With the SBC not
/// ready or QR disabled no exchange runs and the attempts simply run out.
pub fn verify_cartridge(
    rig: &mut Rig,
    cfg: &QrCfg,
    counters: &mut FaultCounters,
    session: QrSession,
) -> Result<Verification> {
    let mut last = None;
    let mut exchanges = 0u8;

    for attempt in 1..=cfg.attempts {
        if !session.enabled() {
            continue;
        }
        let code = if attempt < cfg.attempts {
            cfg.trigger_code
        } else {
            cfg.final_trigger_code
        };

        if trigger(rig, cfg, code)? == Ack::NoAck {
            counters.record_failure(FaultCategory::Qr);
            tracing::error!(attempt, "SBC unresponsive to trigger");
            let hard = Some(QrVerdict::ScannerHardError);
            return Ok(Verification::settled(hard, Disposition::Reject, exchanges)
                .with_alarm(AlarmKind::SbcNoAck));
        }

        rig.flush_input()?;
        exchanges += 1;
        let verdict = match exchange(rig, cfg, counters)? {
            Exchange::Aborted => {
                return Ok(Verification::settled(last, Disposition::Reject, exchanges));
            }
            Exchange::Verdict(v) => v,
        };
        last = Some(verdict);

        let outcome = Verification::settled(last, verdict.disposition(), exchanges);
        match verdict.disposition() {
            Disposition::Pass => {
                rig.show(Screen::status("PASS"))?;
                return Ok(outcome);
            }
            Disposition::Retry => {
                tracing::info!(attempt, ?verdict, "retrying QR");
                rig.show(Screen::title("RETRYING"))?;
                rig.sleep(Duration::from_millis(500));
            }
            Disposition::Reject | Disposition::Sticky if verdict.is_blocking() => {
                return Ok(outcome.with_alarm(AlarmKind::Qr(verdict)));
            }
            Disposition::Reject | Disposition::Sticky => return Ok(outcome),
        }
    }

    tracing::warn!(exchanges, enabled = session.enabled(), "QR not readable");
    Ok(Verification::settled(last, Disposition::Reject, exchanges)
        .with_alarm(AlarmKind::QrNotReadable))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(b'A', QrVerdict::Accept, Disposition::Pass)]
    #[case(b'R', QrVerdict::Reject, Disposition::Reject)]
    #[case(b'S', QrVerdict::ScannerSoftError, Disposition::Retry)]
    #[case(b'H', QrVerdict::ScannerHardError, Disposition::Reject)]
    #[case(b'N', QrVerdict::LengthError, Disposition::Reject)]
    #[case(b'L', QrVerdict::LengthError, Disposition::Reject)]
    #[case(b'B', QrVerdict::LoggingError, Disposition::Reject)]
    #[case(b'C', QrVerdict::RepeatedTestingFault, Disposition::Sticky)]
    #[case(b'D', QrVerdict::DuplicateFault, Disposition::Reject)]
    #[case(b'Q', QrVerdict::NoQr, Disposition::Retry)]
    #[case(b'x', QrVerdict::FeedbackError, Disposition::Retry)]
    #[case(0, QrVerdict::FeedbackError, Disposition::Retry)]
    fn byte_mapping(#[case] b: u8, #[case] v: QrVerdict, #[case] d: Disposition) {
        assert_eq!(QrVerdict::from_byte(b), v);
        assert_eq!(v.disposition(), d);
    }

    #[test]
    fn only_repeated_testing_rehomes() {
        assert!(QrVerdict::RepeatedTestingFault.resets_mechanism());
        assert!(!QrVerdict::DuplicateFault.resets_mechanism());
        assert!(QrVerdict::DuplicateFault.is_blocking());
        assert!(!QrVerdict::NoQr.is_blocking());
    }

    #[test]
    fn history_verdicts_do_not_count() {
        assert!(!QrVerdict::RepeatedTestingFault.counts_failure());
        assert!(!QrVerdict::DuplicateFault.counts_failure());
        assert!(QrVerdict::Timeout.counts_failure());
        assert!(QrVerdict::Reject.counts_failure());
    }
}
