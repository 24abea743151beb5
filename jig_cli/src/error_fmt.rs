//! Human-readable error descriptions and structured JSON error formatting.

use jig_core::error::{BuildError, JigError};

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingPanel => {
                "What happened: No panel was provided to the station.\nLikely causes: GPIO pins failed to initialize or the panel was not wired into the builder.\nHow to fix: Check the [pins] section and pass the panel via with_panel(...).".to_string()
            }
            BuildError::MissingLink => {
                "What happened: No SBC link was provided to the station.\nLikely causes: The serial port failed to open or the link was not wired into the builder.\nHow to fix: Check [serial] port/baud and pass the link via with_link(...).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/jig_config.toml for a sample."
            ),
        };
    }

    if let Some(je) = err.downcast_ref::<JigError>() {
        return match je {
            JigError::Timeout => "What happened: Timed out talking to the hardware.\nLikely causes: SBC or ADC not responding, loose serial or SPI wiring.\nHow to fix: Check the cabling and [serial] settings, then rerun.".to_string(),
            JigError::Hardware(m) | JigError::HardwareFault(m) => format!(
                "What happened: Hardware error ({m}).\nLikely causes: Wrong pin numbers, missing GPIO/SPI/UART permissions, or a disconnected device.\nHow to fix: Fix the [pins]/[serial] values and make sure the process may access the devices."
            ),
            JigError::Config(m) => format!(
                "What happened: Rejected setting ({m}).\nLikely causes: Value outside the accepted range.\nHow to fix: Pick a value within range and rerun."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = format!("{err:#}");
    let lower = msg.to_ascii_lowercase();

    if lower.contains("invalid configuration") || lower.contains("parsing config") {
        return format!(
            "What happened: Configuration is invalid or incomplete ({}).\nLikely causes: A typo or an out-of-range value in the TOML.\nHow to fix: Edit the TOML config and try again.",
            err.root_cause()
        );
    }

    if lower.contains("reading config") {
        return format!(
            "What happened: Could not read the config file.\nLikely causes: Wrong --config path.\nHow to fix: Point --config at a readable TOML file. Original: {msg}"
        );
    }

    if lower.contains("settings") {
        return format!(
            "What happened: Could not load or save the operator settings.\nLikely causes: Unwritable --settings path or a hand-edited file.\nHow to fix: Fix or delete the settings file; defaults are used when it is missing. Original: {msg}"
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 2 for configuration problems, 3 for hardware, 1 otherwise.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.downcast_ref::<BuildError>().is_some() {
        return 2;
    }
    match err.downcast_ref::<JigError>() {
        Some(JigError::Config(_)) => 2,
        Some(JigError::Hardware(_) | JigError::HardwareFault(_) | JigError::Timeout) => 3,
        Some(_) => 1,
        None => {
            let lower = format!("{err:#}").to_ascii_lowercase();
            if lower.contains("invalid configuration") || lower.contains("parsing config") {
                2
            } else {
                1
            }
        }
    }
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingPanel => "MissingPanel",
            BuildError::MissingLink => "MissingLink",
            BuildError::InvalidConfig(_) => "InvalidConfig",
        };
    }
    match err.downcast_ref::<JigError>() {
        Some(JigError::Hardware(_)) => "Hardware",
        Some(JigError::HardwareFault(_)) => "HardwareFault",
        Some(JigError::Config(_)) => "Config",
        Some(JigError::Timeout) => "Timeout",
        Some(JigError::State(_)) => "State",
        Some(JigError::Io(_)) => "Io",
        None if exit_code_for_error(err) == 2 => "InvalidConfig",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_rejections_exit_with_two() {
        let e = eyre::Report::new(JigError::Config("valve tuning must be <= 99, got 120".into()));
        assert_eq!(exit_code_for_error(&e), 2);
        assert!(humanize(&e).contains("Rejected setting"));

        let e = eyre::eyre!("valve.poll_ms must be >= 1").wrap_err("invalid configuration");
        assert_eq!(exit_code_for_error(&e), 2);
        assert!(humanize(&e).contains("valve.poll_ms"));
    }

    #[test]
    fn hardware_errors_exit_with_three() {
        let e = eyre::Report::new(JigError::Hardware("gpio error: no such pin".into()))
            .wrap_err("open panel pins");
        assert_eq!(exit_code_for_error(&e), 3);
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&e)).unwrap();
        assert_eq!(v["reason"], "Hardware");
        assert_eq!(v["exit_code"], 3);
    }

    #[test]
    fn unknown_errors_fall_back() {
        let e = eyre::eyre!("boom");
        assert_eq!(exit_code_for_error(&e), 1);
        assert!(humanize(&e).starts_with("Something went wrong."));
    }
}
