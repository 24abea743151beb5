//! Drives a station until a cycle limit, a restart limit or a shutdown.

use eyre::WrapErr;
use jig_config::SettingsStore;

use crate::error::Result;
use crate::station::Station;
use crate::status::{CycleReport, CycleStatus, Decision};

#[derive(Debug, Clone, Copy, Default)]
pub struct RunLimits {
    /// Stop after this many completed cycles.
    pub max_cycles: Option<u64>,
    /// Stop after this many cold restarts.
    pub max_restarts: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub passed: u64,
    pub rejected: u64,
    pub alarms: u64,
    pub restarts: u32,
    /// Ended by the kill switch.
    pub shutdown: bool,
}

/// Step `station` until one of `limits` is hit or the kill switch is honoured.
///
/// Every restart reloads the persisted settings before the station's startup
/// phase runs again. `on_cycle` sees each completed cycle.
pub fn run_station(
    station: &mut Station,
    store: &mut dyn SettingsStore,
    limits: RunLimits,
    mut on_cycle: impl FnMut(&CycleReport),
) -> Result<RunSummary> {
    let mut summary = RunSummary::default();
    loop {
        match station.step()? {
            CycleStatus::Running => {}
            CycleStatus::Alarm(kind) => {
                summary.alarms += 1;
                tracing::debug!(?kind, "alarm");
            }
            CycleStatus::CycleComplete(report) => {
                summary.cycles += 1;
                match report.decision {
                    Decision::Pass => summary.passed += 1,
                    Decision::Reject => summary.rejected += 1,
                }
                on_cycle(&report);
                if limits.max_cycles.is_some_and(|max| summary.cycles >= max) {
                    station.park()?;
                    return Ok(summary);
                }
            }
            CycleStatus::Restart(reason) => {
                summary.restarts += 1;
                tracing::warn!(%reason, restarts = summary.restarts, "station restarted");
                let settings = store.load().wrap_err("reloading settings after restart")?;
                station.set_settings(settings);
                if limits.max_restarts.is_some_and(|max| summary.restarts >= max) {
                    station.park()?;
                    return Ok(summary);
                }
            }
            CycleStatus::Shutdown => {
                summary.shutdown = true;
                return Ok(summary);
            }
        }
    }
}
