//! Production cycle and diagnostic valve commands.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use eyre::WrapErr;
use jig_config::{Config, SettingsStore};
use jig_core::runner::{RunLimits, RunSummary, run_station};
use jig_core::valve::{Rotation, RotationMode, RotationReport};
use jig_core::{CycleReport, Decision};
use jig_traits::{Direction, Valve};
use serde_json::json;

use crate::bench::{SimSetup, assemble};
use crate::trace_csv::write_trace;

fn decision_name(d: Decision) -> &'static str {
    match d {
        Decision::Pass => "pass",
        Decision::Reject => "reject",
    }
}

fn print_cycle(report: &CycleReport, json_mode: bool) {
    let verdict = report.verdict.map(|v| format!("{v:?}"));
    if json_mode {
        let line = json!({
            "event": "cycle",
            "cycle": report.cycle,
            "verdict": verdict,
            "decision": decision_name(report.decision),
            "carrier_retries": report.carrier_retries,
            "exchanges": report.exchanges,
            "retract_skipped": report.retract_skipped,
        });
        println!("{line}");
    } else {
        println!(
            "cycle {}: {} ({})",
            report.cycle,
            decision_name(report.decision),
            verdict.as_deref().unwrap_or("not verified")
        );
    }
}

fn print_summary(summary: &RunSummary, backend: &str, json_mode: bool) {
    if json_mode {
        let line = json!({
            "event": "summary",
            "backend": backend,
            "cycles": summary.cycles,
            "passed": summary.passed,
            "rejected": summary.rejected,
            "alarms": summary.alarms,
            "restarts": summary.restarts,
            "shutdown": summary.shutdown,
        });
        println!("{line}");
    } else {
        println!(
            "Run complete: {} cycles, {} passed, {} rejected, {} alarms, {} restarts{}",
            summary.cycles,
            summary.passed,
            summary.rejected,
            summary.alarms,
            summary.restarts,
            if summary.shutdown { " (shutdown)" } else { "" }
        );
    }
}

/// `jig run`: cycle until a limit is hit or Ctrl-C is pressed.
pub fn run_cycles(
    cfg: &Config,
    store: &mut dyn SettingsStore,
    limits: RunLimits,
    sim: SimSetup,
    json_mode: bool,
) -> eyre::Result<RunSummary> {
    let settings = store.load().wrap_err("loading settings")?;
    let kill = Arc::new(AtomicBool::new(false));
    {
        let kill = Arc::clone(&kill);
        ctrlc::set_handler(move || kill.store(true, Ordering::SeqCst))
            .wrap_err("installing Ctrl-C handler")?;
    }

    let mut bench = assemble(cfg, settings, kill, sim)?;
    tracing::info!(
        backend = bench.backend,
        max_cycles = ?limits.max_cycles,
        verification = settings.verification_enabled(),
        "run start"
    );
    let summary = run_station(&mut bench.station, store, limits, |report| {
        print_cycle(report, json_mode);
    })?;
    if let Some(sim) = &bench.sim {
        tracing::info!(
            fed = sim.cartridges_fed(),
            triggers = sim.triggers_sent(),
            "simulated bench totals"
        );
    }
    tracing::info!(cycles = summary.cycles, restarts = summary.restarts, "run end");
    print_summary(&summary, bench.backend, json_mode);
    Ok(summary)
}

fn outcome_name(outcome: Rotation) -> &'static str {
    match outcome {
        Rotation::Reached { .. } => "reached",
        Rotation::FullTimeout => "full_timeout",
        Rotation::OutOfWindow { .. } => "out_of_window",
    }
}

fn print_rotation(report: &RotationReport, json_mode: bool) {
    let iteration = match report.outcome {
        Rotation::Reached { iteration } | Rotation::OutOfWindow { iteration } => Some(iteration),
        Rotation::FullTimeout => None,
    };
    let mode = match report.mode {
        RotationMode::Standard => "standard",
        RotationMode::FineTuned => "fine",
    };
    if json_mode {
        let line = json!({
            "valve": report.valve.to_string(),
            "dir": report.direction.to_string(),
            "mode": mode,
            "outcome": outcome_name(report.outcome),
            "code": report.outcome.code(),
            "iteration": iteration,
            "samples": report.samples.len(),
            "counter": report.counter,
        });
        println!("{line}");
    } else {
        let at = iteration.map(|i| format!(" at iteration {i}")).unwrap_or_default();
        println!(
            "valve {} {} ({mode}): {}{at}, {} samples, fault counter {}",
            report.valve,
            report.direction,
            outcome_name(report.outcome),
            report.samples.len(),
            report.counter
        );
    }
}

/// `jig valve`: one diagnostic rotation. A failed check is reported, not an error.
#[allow(clippy::too_many_arguments)]
pub fn diagnose_valve(
    cfg: &Config,
    store: &mut dyn SettingsStore,
    valve: Valve,
    dir: Direction,
    mode: Option<RotationMode>,
    trace: Option<&Path>,
    sim: SimSetup,
    json_mode: bool,
) -> eyre::Result<()> {
    let settings = store.load().wrap_err("loading settings")?;
    let mut bench = assemble(cfg, settings, Arc::new(AtomicBool::new(false)), sim)?;
    let station = &mut bench.station;

    let Some(mode) = mode else {
        let ticks = station.drive_valve_open_loop(valve, dir)?;
        station.park()?;
        if trace.is_some() {
            tracing::warn!("open-loop drive has no feedback samples; no trace written");
        }
        if json_mode {
            let line = json!({
                "valve": valve.to_string(),
                "dir": dir.to_string(),
                "mode": "open_loop",
                "ticks": ticks,
                "tuning": settings.valve_tuning_ticks,
            });
            println!("{line}");
        } else {
            println!(
                "valve {valve} {dir} (open loop): driven {ticks} periods (tuning {})",
                settings.valve_tuning_ticks
            );
        }
        return Ok(());
    };

    let report = station.diagnose_valve(valve, dir, mode)?;
    station.park()?;
    if let Some(path) = trace {
        write_trace(path, &report)
            .wrap_err_with(|| format!("writing trace {}", path.display()))?;
    }
    print_rotation(&report, json_mode);
    Ok(())
}
