//! Operator service flow over the persistent settings.

use eyre::WrapErr;
use jig_config::{Settings, SettingsStore};

use crate::error::{JigError, Result};

/// Largest extra open-loop CW drive the service flow accepts.
pub const MAX_VALVE_TUNING: u8 = 99;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    SetSbcEnabled(bool),
    SetQrEnabled(bool),
    SetValveTuning(u8),
}

/// Apply one action. Returns whether anything changed.
pub fn apply(settings: &mut Settings, action: ServiceAction) -> Result<bool> {
    let before = *settings;
    match action {
        ServiceAction::SetSbcEnabled(on) => settings.sbc_disabled = !on,
        ServiceAction::SetQrEnabled(on) => settings.qr_disabled = !on,
        ServiceAction::SetValveTuning(n) => {
            if n > MAX_VALVE_TUNING {
                return Err(eyre::Report::new(JigError::Config(format!(
                    "valve tuning must be <= {MAX_VALVE_TUNING}, got {n}"
                ))));
            }
            settings.valve_tuning_ticks = n;
        }
    }
    Ok(*settings != before)
}

/// Load, apply every action, and write back once if anything changed.
pub fn run_service(store: &mut dyn SettingsStore, actions: &[ServiceAction]) -> Result<Settings> {
    let mut settings = store.load().wrap_err("loading settings")?;
    let mut changed = false;
    for action in actions {
        changed |= apply(&mut settings, *action)?;
    }
    if changed {
        store.store(&settings).wrap_err("saving settings")?;
        tracing::info!(?settings, "settings saved");
    }
    Ok(settings)
}
