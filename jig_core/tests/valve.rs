mod common;

use std::time::Duration;

use common::{Bench, crossing_at};
use jig_core::FaultCategory;
use jig_core::config::ValveCfg;
use jig_core::counters::{COUNTER_MAX, FaultCounters};
use jig_core::valve::{Rotation, RotationMode, rotate, rotate_open_loop};
use jig_traits::{Direction, Output, Valve};
use rstest::rstest;

fn short_cfg() -> ValveCfg {
    ValveCfg {
        max_iterations: 12,
        ..ValveCfg::default()
    }
}

#[rstest]
#[case(Valve::One, Direction::Acw)]
#[case(Valve::One, Direction::Cw)]
#[case(Valve::Two, Direction::Acw)]
#[case(Valve::Two, Direction::Cw)]
fn crossing_is_reported_at_its_iteration(#[case] valve: Valve, #[case] dir: Direction) {
    let bench = Bench::new();
    let cfg = ValveCfg::default();
    bench.with(|s| s.adc = crossing_at(Some(7), dir, u32::from(cfg.samples)));
    let mut rig = bench.rig();
    let mut counters = FaultCounters::new();
    let r =
        rotate(&mut rig, &cfg, &mut counters, valve, dir, RotationMode::Standard, false).unwrap();
    assert_eq!(r.outcome, Rotation::Reached { iteration: 7 });
    assert_eq!(r.outcome.code(), 0);
    assert_eq!(r.samples.len(), 8);
    assert_eq!(r.counter, 0);
    assert!(bench.with(|s| !s.output(Output::ValveMotor(valve, dir))));
}

#[test]
fn success_clears_the_counter() {
    let bench = Bench::new();
    let cfg = short_cfg();
    let mut rig = bench.rig();
    let mut counters = FaultCounters::new();
    let cat = FaultCategory::Rotation(Valve::One, Direction::Cw);

    bench.with(|s| s.adc = crossing_at(None, Direction::Cw, u32::from(cfg.samples)));
    rotate(&mut rig, &cfg, &mut counters, Valve::One, Direction::Cw, RotationMode::Standard, false)
        .unwrap();
    assert_eq!(counters.get(cat), 1);

    bench.with(|s| s.adc = crossing_at(Some(0), Direction::Cw, u32::from(cfg.samples)));
    rotate(&mut rig, &cfg, &mut counters, Valve::One, Direction::Cw, RotationMode::Standard, false)
        .unwrap();
    assert_eq!(counters.get(cat), 0);
}

#[test]
fn full_timeout_alarms_and_counts() {
    let bench = Bench::new();
    let cfg = short_cfg();
    bench.with(|s| s.adc = crossing_at(None, Direction::Acw, u32::from(cfg.samples)));
    let mut rig = bench.rig();
    let mut counters = FaultCounters::new();
    let before = bench.clock.elapsed();
    let r = rotate(
        &mut rig,
        &cfg,
        &mut counters,
        Valve::Two,
        Direction::Acw,
        RotationMode::Standard,
        false,
    )
    .unwrap();
    assert_eq!(r.outcome, Rotation::FullTimeout);
    assert_eq!(r.outcome.code(), 1);
    assert_eq!(r.counter, 1);
    assert_eq!(r.samples.len(), 12);
    let spent = bench.clock.elapsed() - before;
    assert_eq!(spent, cfg.settle + cfg.poll * 12 + cfg.fail_hold);
    bench.with(|s| {
        assert!(!s.output(Output::Buzzer));
        assert!(s.all_safe());
        assert_eq!(s.lcd.1.as_deref(), Some("E.VM ACW FAIL"));
    });
}

#[test]
fn counters_saturate() {
    let bench = Bench::new();
    let cfg = ValveCfg {
        max_iterations: 2,
        fail_hold: Duration::ZERO,
        ..ValveCfg::default()
    };
    let mut rig = bench.rig();
    let mut counters = FaultCounters::new();
    let mut last = 0;
    for _ in 0..20 {
        bench.with(|s| s.adc = crossing_at(None, Direction::Cw, u32::from(cfg.samples)));
        last = rotate(
            &mut rig,
            &cfg,
            &mut counters,
            Valve::One,
            Direction::Cw,
            RotationMode::Standard,
            false,
        )
        .unwrap()
        .counter;
    }
    assert_eq!(last, COUNTER_MAX);
}

#[rstest]
#[case(Some(80), Rotation::Reached { iteration: 80 })]
#[case(Some(128), Rotation::Reached { iteration: 128 })]
#[case(Some(79), Rotation::OutOfWindow { iteration: 79 })]
#[case(Some(129), Rotation::OutOfWindow { iteration: 129 })]
#[case(None, Rotation::FullTimeout)]
fn fine_tuned_window(#[case] k: Option<u32>, #[case] want: Rotation) {
    let bench = Bench::new();
    let cfg = ValveCfg::default();
    bench.with(|s| s.adc = crossing_at(k, Direction::Acw, u32::from(cfg.samples)));
    let mut rig = bench.rig();
    let mut counters = FaultCounters::new();
    let r = rotate(
        &mut rig,
        &cfg,
        &mut counters,
        Valve::One,
        Direction::Acw,
        RotationMode::FineTuned,
        false,
    )
    .unwrap();
    assert_eq!(r.outcome, want);
    let cat = FaultCategory::FineTuned(Valve::One, Direction::Acw);
    let expected = u8::from(!want.is_success());
    assert_eq!(counters.get(cat), expected);
    assert_eq!(counters.get(FaultCategory::Rotation(Valve::One, Direction::Acw)), 0);
}

#[test]
fn fine_tuned_failure_shows_iteration_and_tag() {
    let bench = Bench::new();
    let cfg = ValveCfg::default();
    bench.with(|s| s.adc = crossing_at(Some(40), Direction::Cw, u32::from(cfg.samples)));
    let mut rig = bench.rig();
    let mut counters = FaultCounters::new();
    let r = rotate(
        &mut rig,
        &cfg,
        &mut counters,
        Valve::Two,
        Direction::Cw,
        RotationMode::FineTuned,
        false,
    )
    .unwrap();
    assert_eq!(r.outcome.code(), 2);
    bench.with(|s| {
        assert_eq!(s.lcd.0.as_deref(), Some("T:040"));
        assert_eq!(s.lcd.1.as_deref(), Some("E.VM FT CW FAIL"));
    });
}

#[test]
fn telemetry_streams_samples() {
    let bench = Bench::new();
    let cfg = ValveCfg::default();
    bench.with(|s| s.adc = crossing_at(Some(1), Direction::Acw, u32::from(cfg.samples)));
    let mut rig = bench.rig();
    let mut counters = FaultCounters::new();
    rotate(&mut rig, &cfg, &mut counters, Valve::One, Direction::Acw, RotationMode::Standard, true)
        .unwrap();
    let text = bench.with(|s| s.sent_text());
    assert_eq!(text, "\nS.VM ACW\n000,0700\n001,0900\n-,-\n");
}

#[test]
fn telemetry_carries_failure_tag() {
    let bench = Bench::new();
    let cfg = ValveCfg {
        max_iterations: 1,
        ..ValveCfg::default()
    };
    bench.with(|s| s.adc = crossing_at(None, Direction::Cw, u32::from(cfg.samples)));
    let mut rig = bench.rig();
    let mut counters = FaultCounters::new();
    rotate(&mut rig, &cfg, &mut counters, Valve::One, Direction::Cw, RotationMode::Standard, true)
        .unwrap();
    let text = bench.with(|s| s.sent_text());
    assert_eq!(text, "\nS.VM CW\n000,0700\n-,-\n\nS.VM CW FAIL");
}

#[rstest]
#[case(Direction::Acw, 0, 55)]
#[case(Direction::Acw, 9, 55)]
#[case(Direction::Cw, 0, 45)]
#[case(Direction::Cw, 7, 52)]
fn open_loop_uses_tuning_for_cw(#[case] dir: Direction, #[case] tuning: u8, #[case] ticks: u32) {
    let bench = Bench::new();
    let cfg = ValveCfg::default();
    let mut rig = bench.rig();
    let driven = rotate_open_loop(&mut rig, &cfg, Valve::Two, dir, tuning).unwrap();
    assert_eq!(driven, ticks);
    assert_eq!(bench.clock.elapsed(), cfg.settle + cfg.poll * ticks);
    assert!(bench.with(|s| s.all_safe()));
}
