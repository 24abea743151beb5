//! Valve rotation checks.
//!
//! A check energises one direction relay, waits for the motor to settle, then
//! polls averaged feedback until it crosses the direction's threshold or the
//! iteration bound runs out. ACW passes above `acw_threshold`, CW passes below
//! `cw_threshold`. The fine-tuned check also requires the crossing iteration
//! to land inside `fine_window`.
//!
//! When telemetry is on, every sample is streamed to the SBC as `iii,vvvv`
//! lines framed by a header and a `-,-` break.

use std::fmt;

use jig_traits::{Direction, Output, Screen, Valve};

use crate::config::ValveCfg;
use crate::counters::{FaultCategory, FaultCounters};
use crate::error::Result;
use crate::feedback::{ValveReading, read_feedback};
use crate::rig::Rig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationMode {
    Standard,
    FineTuned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    /// Threshold crossed at `iteration` (zero-based).
    Reached { iteration: u32 },
    /// Threshold never crossed within the bound.
    FullTimeout,
    /// Fine-tuned only: crossed, but outside the window.
    OutOfWindow { iteration: u32 },
}

impl Rotation {
    /// Wire/report code: 0 success, 1 full timeout, 2 out of window.
    pub fn code(self) -> u8 {
        match self {
            Rotation::Reached { .. } => 0,
            Rotation::FullTimeout => 1,
            Rotation::OutOfWindow { .. } => 2,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, Rotation::Reached { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationSample {
    pub iteration: u32,
    pub reading: ValveReading,
}

#[derive(Debug, Clone)]
pub struct RotationReport {
    pub valve: Valve,
    pub direction: Direction,
    pub mode: RotationMode,
    pub outcome: Rotation,
    pub samples: Vec<RotationSample>,
    /// Category counter after this check.
    pub counter: u8,
}

/// Motor label used on the display and in telemetry.
fn motor_label(valve: Valve) -> &'static str {
    match valve {
        Valve::One => "S.VM",
        Valve::Two => "E.VM",
    }
}

struct Label(Valve, Direction, RotationMode);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Label(v, d, mode) = self;
        match mode {
            RotationMode::Standard => write!(f, "{} {}", motor_label(*v), d),
            RotationMode::FineTuned => write!(f, "{} FT {}", motor_label(*v), d),
        }
    }
}

/// Failure tag, e.g. `S.VM CW FAIL` or `E.VM FT ACW FAIL`.
pub fn failure_tag(valve: Valve, dir: Direction, mode: RotationMode) -> String {
    format!("{} FAIL", Label(valve, dir, mode))
}

fn category(valve: Valve, dir: Direction, mode: RotationMode) -> FaultCategory {
    match mode {
        RotationMode::Standard => FaultCategory::Rotation(valve, dir),
        RotationMode::FineTuned => FaultCategory::FineTuned(valve, dir),
    }
}

/// Has the reading crossed the threshold for `dir`?
pub fn crossed(cfg: &ValveCfg, dir: Direction, reading: ValveReading) -> bool {
    match dir {
        Direction::Acw => reading.value() > cfg.acw_threshold,
        Direction::Cw => reading.value() < cfg.cw_threshold,
    }
}

fn sample_loop(
    rig: &mut Rig,
    cfg: &ValveCfg,
    valve: Valve,
    dir: Direction,
    bound: u32,
    telemetry: bool,
    samples: &mut Vec<RotationSample>,
) -> Result<Option<u32>> {
    rig.sleep(cfg.settle);
    for iteration in 0..bound {
        rig.sleep(cfg.poll);
        let reading = read_feedback(rig, valve, cfg.samples)?;
        samples.push(RotationSample { iteration, reading });
        if telemetry {
            rig.send(format!("{iteration:03},{reading}\n").as_bytes())?;
        }
        if crossed(cfg, dir, reading) {
            return Ok(Some(iteration));
        }
    }
    Ok(None)
}

/// Run one closed-loop rotation check and classify it into `counters`.
pub fn rotate(
    rig: &mut Rig,
    cfg: &ValveCfg,
    counters: &mut FaultCounters,
    valve: Valve,
    dir: Direction,
    mode: RotationMode,
    telemetry: bool,
) -> Result<RotationReport> {
    let bound = match mode {
        RotationMode::Standard => cfg.max_iterations,
        RotationMode::FineTuned => cfg.fine_max_iterations,
    };
    let label = Label(valve, dir, mode);
    if telemetry {
        rig.send(format!("\n{label}\n").as_bytes())?;
    }

    let motor = Output::ValveMotor(valve, dir);
    let mut samples = Vec::new();
    rig.drive(motor, true)?;
    let hit = sample_loop(rig, cfg, valve, dir, bound, telemetry, &mut samples);
    // The relay must drop even when sampling failed.
    let stopped = rig.drive(motor, false);
    let hit = hit?;
    stopped?;
    if telemetry {
        rig.send(b"-,-\n")?;
    }

    let outcome = match (mode, hit) {
        (_, None) => Rotation::FullTimeout,
        (RotationMode::Standard, Some(iteration)) => Rotation::Reached { iteration },
        (RotationMode::FineTuned, Some(iteration)) if cfg.fine_window.contains(&iteration) => {
            Rotation::Reached { iteration }
        }
        (RotationMode::FineTuned, Some(iteration)) => Rotation::OutOfWindow { iteration },
    };

    let cat = category(valve, dir, mode);
    let counter = if outcome.is_success() {
        counters.record_success(cat);
        tracing::info!(%valve, %dir, ?mode, ?outcome, "rotation ok");
        0
    } else {
        let tag = failure_tag(valve, dir, mode);
        tracing::warn!(%valve, %dir, ?mode, ?outcome, "{tag}");
        rig.drive(Output::Buzzer, true)?;
        let screen = match mode {
            RotationMode::Standard => Screen::overlay(tag.clone()),
            RotationMode::FineTuned => {
                let at = hit.unwrap_or(bound);
                Screen::pair(format!("T:{at:03}"), tag.clone())
            }
        };
        rig.show(screen)?;
        if telemetry {
            rig.send(format!("\n{tag}").as_bytes())?;
        }
        rig.sleep(cfg.fail_hold);
        rig.drive(Output::Buzzer, false)?;
        counters.record_failure(cat)
    };

    Ok(RotationReport {
        valve,
        direction: dir,
        mode,
        outcome,
        samples,
        counter,
    })
}

/// Drive without feedback for a fixed number of poll periods.
///
/// CW runs `tuning_ticks` longer than the configured base. Returns the number
/// of periods driven.
pub fn rotate_open_loop(
    rig: &mut Rig,
    cfg: &ValveCfg,
    valve: Valve,
    dir: Direction,
    tuning_ticks: u8,
) -> Result<u32> {
    let ticks = match dir {
        Direction::Acw => cfg.open_loop_acw_ticks,
        Direction::Cw => cfg.open_loop_cw_ticks + u32::from(tuning_ticks),
    };
    let motor = Output::ValveMotor(valve, dir);
    rig.drive(motor, true)?;
    rig.sleep(cfg.settle);
    for _ in 0..ticks {
        rig.sleep(cfg.poll);
    }
    rig.drive(motor, false)?;
    tracing::debug!(%valve, %dir, ticks, "open-loop rotation");
    Ok(ticks)
}
