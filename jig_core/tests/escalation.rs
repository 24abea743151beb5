use jig_core::config::{EscalationCfg, PolicyMode};
use jig_core::counters::{COUNTER_MAX, FaultCounters, LeakStage, Zone};
use jig_core::escalation::{Escalation, EscalationPolicy, FaultEscalation};
use jig_core::FaultCategory;
use jig_traits::{Direction, Valve};
use proptest::prelude::*;

fn failed(cat: FaultCategory, n: u8) -> FaultCounters {
    let mut c = FaultCounters::new();
    for _ in 0..n {
        c.record_failure(cat);
    }
    c
}

#[test]
fn qr_policy_trips_above_threshold() {
    let esc = FaultEscalation::default();
    assert_eq!(esc.evaluate(&failed(FaultCategory::Qr, 4)), Escalation::Continue);
    assert_eq!(
        esc.evaluate(&failed(FaultCategory::Qr, 5)),
        Escalation::Halt {
            policy: "qr",
            category: FaultCategory::Qr
        }
    );
}

#[test]
fn valve_policy_is_advisory_by_default() {
    let cat = FaultCategory::Rotation(Valve::Two, Direction::Cw);
    let counters = failed(cat, 10);
    assert_eq!(FaultEscalation::default().evaluate(&counters), Escalation::Continue);

    let enforced = FaultEscalation::from_cfg(&EscalationCfg {
        valve_mode: PolicyMode::Enforce,
        ..EscalationCfg::default()
    });
    assert_eq!(
        enforced.evaluate(&counters),
        Escalation::Halt {
            policy: "valve",
            category: cat
        }
    );
}

#[test]
fn vacuum_policy_uses_looser_last_stage_limit() {
    let esc = FaultEscalation::from_cfg(&EscalationCfg {
        vacuum_mode: PolicyMode::Enforce,
        ..EscalationCfg::default()
    });
    let last = FaultCategory::Leak {
        stage: LeakStage::Third,
        zone: Zone::Two,
    };
    assert_eq!(esc.evaluate(&failed(last, 9)), Escalation::Continue);
    assert!(matches!(esc.evaluate(&failed(last, 10)), Escalation::Halt { policy: "vacuum", .. }));

    let first = FaultCategory::Leak {
        stage: LeakStage::First,
        zone: Zone::One,
    };
    assert!(matches!(esc.evaluate(&failed(first, 5)), Escalation::Halt { .. }));
    let clog = FaultCategory::Clog { zone: Zone::Three };
    assert!(matches!(esc.evaluate(&failed(clog, 5)), Escalation::Halt { .. }));
}

#[test]
fn vacuum_policy_is_off_by_default() {
    let counters = failed(FaultCategory::Clog { zone: Zone::One }, COUNTER_MAX);
    assert_eq!(FaultEscalation::default().evaluate(&counters), Escalation::Continue);
}

struct AnyFailure;

impl EscalationPolicy for AnyFailure {
    fn name(&self) -> &'static str {
        "any"
    }

    fn tripped(&self, counters: &FaultCounters) -> Option<FaultCategory> {
        counters.iter().find(|(_, n)| *n > 0).map(|(cat, _)| cat)
    }
}

#[test]
fn custom_policies_can_be_registered() {
    let mut esc = FaultEscalation::empty();
    esc.register(AnyFailure, PolicyMode::Enforce);
    let cat = FaultCategory::FineTuned(Valve::One, Direction::Acw);
    assert_eq!(esc.evaluate(&FaultCounters::new()), Escalation::Continue);
    assert_eq!(
        esc.evaluate(&failed(cat, 1)),
        Escalation::Halt {
            policy: "any",
            category: cat
        }
    );
}

#[derive(Debug, Clone)]
enum Op {
    Fail,
    Succeed,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![3 => Just(Op::Fail), 1 => Just(Op::Succeed)]
}

proptest! {
    #[test]
    fn counter_tracks_failures_since_last_success(ops in proptest::collection::vec(op(), 0..60)) {
        let cat = FaultCategory::Qr;
        let mut counters = FaultCounters::new();
        let mut run = 0u32;
        for o in &ops {
            match o {
                Op::Fail => {
                    counters.record_failure(cat);
                    run += 1;
                }
                Op::Succeed => {
                    counters.record_success(cat);
                    run = 0;
                }
            }
        }
        let expected = u8::try_from(run.min(u32::from(COUNTER_MAX))).unwrap();
        prop_assert_eq!(counters.get(cat), expected);
        // Other categories are untouched.
        prop_assert_eq!(counters.get(FaultCategory::Clog { zone: Zone::One }), 0);
    }

    #[test]
    fn qr_halts_iff_count_exceeds_threshold(n in 0u8..=20) {
        let counters = failed(FaultCategory::Qr, n);
        let halted = matches!(
            FaultEscalation::default().evaluate(&counters),
            Escalation::Halt { .. }
        );
        prop_assert_eq!(halted, n.min(COUNTER_MAX) > 4);
    }
}
