//! `jig settings`: the operator service flow over the persistent store.

use jig_config::{Settings, SettingsStore};
use jig_core::service::{ServiceAction, run_service};
use serde_json::json;

use crate::cli::Toggle;

/// Collect the requested changes in the order the service menu applies them.
pub fn actions(sbc: Option<Toggle>, qr: Option<Toggle>, tuning: Option<u8>) -> Vec<ServiceAction> {
    let mut out = Vec::new();
    if let Some(t) = sbc {
        out.push(ServiceAction::SetSbcEnabled(t.is_on()));
    }
    if let Some(t) = qr {
        out.push(ServiceAction::SetQrEnabled(t.is_on()));
    }
    if let Some(n) = tuning {
        out.push(ServiceAction::SetValveTuning(n));
    }
    out
}

fn on_off(b: bool) -> &'static str {
    if b { "on" } else { "off" }
}

pub fn print_settings(s: &Settings, json_mode: bool) {
    if json_mode {
        let line = json!({
            "sbc": !s.sbc_disabled,
            "qr": !s.qr_disabled,
            "valve_tuning": s.valve_tuning_ticks,
            "verification": s.verification_enabled(),
        });
        println!("{line}");
    } else {
        println!("sbc: {}", on_off(!s.sbc_disabled));
        println!("qr: {}", on_off(!s.qr_disabled));
        println!("valve_tuning: {}", s.valve_tuning_ticks);
    }
}

pub fn show(store: &mut dyn SettingsStore, json_mode: bool) -> eyre::Result<()> {
    let s = run_service(store, &[])?;
    print_settings(&s, json_mode);
    Ok(())
}

pub fn set(
    store: &mut dyn SettingsStore,
    actions: &[ServiceAction],
    json_mode: bool,
) -> eyre::Result<()> {
    if actions.is_empty() {
        eyre::bail!("nothing to change: pass --sbc, --qr or --valve-tuning");
    }
    let s = run_service(store, actions)?;
    print_settings(&s, json_mode);
    Ok(())
}
