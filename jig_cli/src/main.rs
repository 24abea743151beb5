mod bench;
mod cli;
mod error_fmt;
mod run;
mod service;
mod trace_csv;

use std::fs;
use std::path::Path;

use clap::Parser;
use eyre::WrapErr;
use jig_config::{Config, FileSettingsStore, SettingsStore};
use jig_core::runner::RunLimits;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::bench::{SimSetup, assemble};
use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE, SettingsCmd};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    let _ = color_eyre::install();
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(err) = real_main(cli) {
        tracing::error!(error = %format!("{err:#}"), "command failed");
        if JSON_MODE.get().copied().unwrap_or(false) {
            println!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        std::process::exit(exit_code_for_error(&err));
    }
}

fn real_main(cli: Cli) -> eyre::Result<()> {
    let cfg = load_config(&cli.config)?;
    init_tracing(&cli, &cfg)?;
    tracing::debug!(config = %cli.config.display(), settings = %cli.settings.display(), "starting");

    let mut store = FileSettingsStore::new(&cli.settings);
    match cli.cmd {
        Commands::Run {
            cycles,
            max_restarts,
            virtual_time,
            sim_responses,
            sim_jam_every,
            sim_no_sbc,
        } => {
            let sim =
                SimSetup::from_flags(&sim_responses, sim_jam_every, sim_no_sbc, virtual_time)?;
            let limits = RunLimits {
                max_cycles: cycles,
                max_restarts,
            };
            run::run_cycles(&cfg, &mut store, limits, sim, cli.json)?;
        }
        Commands::Valve {
            valve,
            dir,
            mode,
            trace_csv,
            virtual_time,
        } => {
            let sim = SimSetup {
                virtual_time,
                ..SimSetup::default()
            };
            run::diagnose_valve(
                &cfg,
                &mut store,
                valve.into(),
                dir.into(),
                mode.closed_loop(),
                trace_csv.as_deref(),
                sim,
                cli.json,
            )?;
        }
        Commands::Settings { action } => match action {
            SettingsCmd::Show => service::show(&mut store, cli.json)?,
            SettingsCmd::Set {
                sbc,
                qr,
                valve_tuning,
            } => service::set(&mut store, &service::actions(sbc, qr, valve_tuning), cli.json)?,
        },
        Commands::SelfCheck => self_check(&cfg, &mut store, cli.json)?,
    }
    Ok(())
}

fn load_config(path: &Path) -> eyre::Result<Config> {
    let text = fs::read_to_string(path)
        .wrap_err_with(|| format!("reading config {}", path.display()))?;
    let cfg = jig_config::load_toml(&text)
        .wrap_err_with(|| format!("parsing config {}", path.display()))?;
    cfg.validate().wrap_err("invalid configuration")?;
    Ok(cfg)
}

fn init_tracing(cli: &Cli, cfg: &Config) -> eyre::Result<()> {
    // RUST_LOG wins over --log-level
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let console = if cli.json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer().with_writer(std::io::stderr).boxed()
    };

    let file = match cfg.logging.file.as_deref() {
        Some(path) => {
            let path = Path::new(path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path.file_name().ok_or_else(|| {
                eyre::eyre!("invalid configuration: logging.file has no file name")
            })?;
            let appender = match cfg.logging.rotation.as_deref() {
                Some("daily") => tracing_appender::rolling::daily(dir, name),
                Some("hourly") => tracing_appender::rolling::hourly(dir, name),
                _ => tracing_appender::rolling::never(dir, name),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            let level = cfg.logging.level.as_deref().unwrap_or("info");
            Some(
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_filter(EnvFilter::new(level)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console.with_filter(console_filter))
        .with(file)
        .try_init()
        .map_err(|e| eyre::eyre!("installing log subscriber: {e}"))
}

/// Parse config and settings, then bring the bench up and park it.
fn self_check(cfg: &Config, store: &mut dyn SettingsStore, json_mode: bool) -> eyre::Result<()> {
    let settings = store.load().wrap_err("loading settings")?;
    let mut bench = assemble(cfg, settings, Default::default(), SimSetup::default())?;
    bench.station.park()?;
    if json_mode {
        let line = serde_json::json!({
            "ok": true,
            "backend": bench.backend,
            "verification": settings.verification_enabled(),
        });
        println!("{line}");
    } else {
        println!(
            "self-check ok: {} backend, QR verification {}",
            bench.backend,
            if settings.verification_enabled() { "on" } else { "off" }
        );
    }
    Ok(())
}
