mod common;

use common::{Bench, Buttons};
use jig_core::FaultCategory;
use jig_core::alarm::AlarmKind;
use jig_core::config::QrCfg;
use jig_core::counters::FaultCounters;
use jig_core::qr::{
    Ack, Disposition, Exchange, QrSession, QrVerdict, exchange, verify_cartridge, wait_busy,
};
use rstest::rstest;

const LIVE: QrSession = QrSession {
    sbc_ready: true,
    qr_disabled: false,
};

fn counters_at(n: u8) -> FaultCounters {
    let mut c = FaultCounters::new();
    for _ in 0..n {
        c.record_failure(FaultCategory::Qr);
    }
    c
}

#[test]
fn accept_resets_the_counter() {
    let bench = Bench::new();
    let mut rig = bench.rig();
    let cfg = QrCfg::default();
    let mut counters = counters_at(3);
    bench.respond(b"A");
    rig.send(&[cfg.trigger_code]).unwrap();
    let ex = exchange(&mut rig, &cfg, &mut counters).unwrap();
    assert_eq!(ex, Exchange::Verdict(QrVerdict::Accept));
    assert_eq!(counters.get(FaultCategory::Qr), 0);
    assert!(bench.with(|s| s.screens.iter().any(|sc| sc.contains("ACCEPTED"))));
}

#[rstest]
#[case(b'R', 1)]
#[case(b'S', 1)]
#[case(b'H', 1)]
#[case(b'L', 1)]
#[case(b'B', 1)]
#[case(b'Q', 1)]
#[case(b'?', 1)]
#[case(b'C', 0)]
#[case(b'D', 0)]
fn failures_count_except_history_faults(#[case] byte: u8, #[case] counted: u8) {
    let bench = Bench::new();
    let mut rig = bench.rig();
    let cfg = QrCfg::default();
    let mut counters = FaultCounters::new();
    bench.respond(&[byte]);
    rig.send(&[cfg.trigger_code]).unwrap();
    exchange(&mut rig, &cfg, &mut counters).unwrap();
    assert_eq!(counters.get(FaultCategory::Qr), counted);
    assert!(bench.with(|s| !s.output(jig_traits::Output::Buzzer)));
}

#[test]
fn silence_times_out_and_counts() {
    let bench = Bench::new();
    let mut rig = bench.rig();
    let cfg = QrCfg {
        response_polls: 40,
        ..QrCfg::default()
    };
    let mut counters = FaultCounters::new();
    let ex = exchange(&mut rig, &cfg, &mut counters).unwrap();
    assert_eq!(ex, Exchange::Verdict(QrVerdict::Timeout));
    assert_eq!(counters.get(FaultCategory::Qr), 1);
    assert!(bench.with(|s| s.screens.iter().any(|sc| sc.contains("QR T.OUT"))));
}

#[test]
fn chord_aborts_the_wait_without_counting() {
    let bench = Bench::new();
    bench.with(|s| {
        s.buttons = Buttons::Held {
            start: true,
            alt: true,
        };
    });
    let mut rig = bench.rig();
    let mut counters = counters_at(2);
    let ex = exchange(&mut rig, &QrCfg::default(), &mut counters).unwrap();
    assert_eq!(ex, Exchange::Aborted);
    assert_eq!(counters.get(FaultCategory::Qr), 2);
}

#[test]
fn busy_line_acknowledges_trigger() {
    let bench = Bench::new();
    let mut rig = bench.rig();
    let cfg = QrCfg::default();
    bench.respond(b"A");
    rig.send(&[cfg.trigger_code]).unwrap();
    assert_eq!(wait_busy(&mut rig, &cfg).unwrap(), Ack::Acknowledged);

    let idle = Bench::new();
    let mut rig = idle.rig();
    assert_eq!(wait_busy(&mut rig, &cfg).unwrap(), Ack::NoAck);
}

#[test]
fn accept_on_first_attempt_passes() {
    let bench = Bench::new();
    bench.respond(b"A");
    let mut rig = bench.rig();
    let mut counters = FaultCounters::new();
    let v = verify_cartridge(&mut rig, &QrCfg::default(), &mut counters, LIVE).unwrap();
    assert_eq!(v.verdict, Some(QrVerdict::Accept));
    assert_eq!(v.disposition, Disposition::Pass);
    assert_eq!(v.alarm, None);
    assert_eq!(v.exchanges, 1);
    assert_eq!(bench.with(|s| s.single_bytes()), vec![20]);
}

#[test]
fn soft_failures_retry_then_pass() {
    let bench = Bench::new();
    bench.respond(b"QA");
    let mut rig = bench.rig();
    let mut counters = FaultCounters::new();
    let v = verify_cartridge(&mut rig, &QrCfg::default(), &mut counters, LIVE).unwrap();
    assert_eq!(v.disposition, Disposition::Pass);
    assert_eq!(v.exchanges, 2);
    assert_eq!(counters.get(FaultCategory::Qr), 0);
    assert!(bench.with(|s| s.screens.iter().any(|sc| sc.contains("RETRYING"))));
}

#[test]
fn exhausted_retries_end_in_not_readable() {
    let bench = Bench::new();
    bench.respond(b"SSS");
    let mut rig = bench.rig();
    let mut counters = FaultCounters::new();
    let v = verify_cartridge(&mut rig, &QrCfg::default(), &mut counters, LIVE).unwrap();
    assert_eq!(v.disposition, Disposition::Reject);
    assert_eq!(v.alarm, Some(AlarmKind::QrNotReadable));
    assert_eq!(v.exchanges, 3);
    assert_eq!(counters.get(FaultCategory::Qr), 3);
    // The last attempt uses the final trigger code.
    assert_eq!(bench.with(|s| s.single_bytes()), vec![20, 20, 19]);
}

#[test]
fn plain_reject_needs_no_operator() {
    let bench = Bench::new();
    bench.respond(b"R");
    let mut rig = bench.rig();
    let mut counters = FaultCounters::new();
    let v = verify_cartridge(&mut rig, &QrCfg::default(), &mut counters, LIVE).unwrap();
    assert_eq!(v.disposition, Disposition::Reject);
    assert_eq!(v.alarm, None);
}

#[rstest]
#[case(b'H', QrVerdict::ScannerHardError, Disposition::Reject)]
#[case(b'N', QrVerdict::LengthError, Disposition::Reject)]
#[case(b'B', QrVerdict::LoggingError, Disposition::Reject)]
#[case(b'D', QrVerdict::DuplicateFault, Disposition::Reject)]
#[case(b'C', QrVerdict::RepeatedTestingFault, Disposition::Sticky)]
fn blocking_verdicts_raise_an_alarm(
    #[case] byte: u8,
    #[case] verdict: QrVerdict,
    #[case] disposition: Disposition,
) {
    let bench = Bench::new();
    bench.respond(&[byte]);
    let mut rig = bench.rig();
    let mut counters = FaultCounters::new();
    let v = verify_cartridge(&mut rig, &QrCfg::default(), &mut counters, LIVE).unwrap();
    assert_eq!(v.verdict, Some(verdict));
    assert_eq!(v.disposition, disposition);
    assert_eq!(v.alarm, Some(AlarmKind::Qr(verdict)));
    assert_eq!(v.exchanges, 1);
}

#[test]
fn unacknowledged_trigger_is_a_hard_scanner_fault() {
    let bench = Bench::new();
    bench.with(|s| s.ignore_triggers = 3);
    let mut rig = bench.rig();
    let cfg = QrCfg {
        ack_polls: 20,
        ..QrCfg::default()
    };
    let mut counters = FaultCounters::new();
    let v = verify_cartridge(&mut rig, &cfg, &mut counters, LIVE).unwrap();
    assert_eq!(v.verdict, Some(QrVerdict::ScannerHardError));
    assert_eq!(v.disposition, Disposition::Reject);
    assert_eq!(v.alarm, Some(AlarmKind::SbcNoAck));
    assert_eq!(v.exchanges, 0);
    assert_eq!(counters.get(FaultCategory::Qr), 1);
    assert_eq!(bench.with(|s| s.single_bytes()), vec![20, 20, 20]);
}

#[test]
fn trigger_is_resent_until_acknowledged() {
    let bench = Bench::new();
    bench.with(|s| s.ignore_triggers = 2);
    bench.respond(b"A");
    let mut rig = bench.rig();
    let cfg = QrCfg {
        ack_polls: 20,
        ..QrCfg::default()
    };
    let mut counters = FaultCounters::new();
    let v = verify_cartridge(&mut rig, &cfg, &mut counters, LIVE).unwrap();
    assert_eq!(v.disposition, Disposition::Pass);
    assert_eq!(bench.with(|s| s.single_bytes()), vec![20, 20, 20]);
}

#[test]
fn operator_abort_rejects() {
    let bench = Bench::new();
    bench.with(|s| {
        s.buttons = Buttons::Held {
            start: true,
            alt: true,
        };
        s.response_delay = 1_000;
    });
    bench.respond(b"A");
    let mut rig = bench.rig();
    let mut counters = FaultCounters::new();
    let v = verify_cartridge(&mut rig, &QrCfg::default(), &mut counters, LIVE).unwrap();
    assert_eq!(v.disposition, Disposition::Reject);
    assert_eq!(v.alarm, None);
    assert_eq!(counters.get(FaultCategory::Qr), 0);
}

#[rstest]
#[case(QrSession { sbc_ready: false, qr_disabled: false })]
#[case(QrSession { sbc_ready: true, qr_disabled: true })]
fn disabled_session_never_triggers(#[case] session: QrSession) {
    let bench = Bench::new();
    let mut rig = bench.rig();
    let mut counters = FaultCounters::new();
    let v = verify_cartridge(&mut rig, &QrCfg::default(), &mut counters, session).unwrap();
    assert_eq!(v.disposition, Disposition::Reject);
    assert_eq!(v.alarm, Some(AlarmKind::QrNotReadable));
    assert_eq!(v.exchanges, 0);
    assert!(bench.with(|s| s.sent.is_empty()));
}
