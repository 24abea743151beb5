//! Operator settings that persist across power cycles.
//!
//! The service menu edits three values: whether the SBC link is used at all,
//! whether QR verification runs, and the extra drive length applied to
//! open-loop CW valve rotations. They are stored as a small TOML document and
//! rewritten atomically on every change.
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use eyre::WrapErr;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Run without the SBC: no startup handshake, cartridges are never verified.
    pub sbc_disabled: bool,
    /// Extra open-loop CW drive, in valve poll periods.
    pub valve_tuning_ticks: u8,
    /// Skip QR verification while keeping the SBC link up.
    pub qr_disabled: bool,
}

impl Settings {
    /// Verification is attempted only when both the link and QR are enabled.
    pub fn verification_enabled(&self) -> bool {
        !self.sbc_disabled && !self.qr_disabled
    }
}

/// Persistent storage for [`Settings`].
pub trait SettingsStore {
    fn load(&mut self) -> eyre::Result<Settings>;
    fn store(&mut self, settings: &Settings) -> eyre::Result<()>;
}

/// TOML file store. A missing file reads as the defaults.
#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for FileSettingsStore {
    fn load(&mut self) -> eyre::Result<Settings> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Settings::default()),
            Err(e) => {
                return Err(e)
                    .wrap_err_with(|| format!("reading settings {}", self.path.display()));
            }
        };
        toml::from_str(&text).wrap_err_with(|| format!("parsing settings {}", self.path.display()))
    }

    fn store(&mut self, settings: &Settings) -> eyre::Result<()> {
        let text = toml::to_string(settings).wrap_err("serializing settings")?;
        replace_file(&self.path, text.as_bytes())
            .wrap_err_with(|| format!("writing settings {}", self.path.display()))
    }
}

// A power cut mid-write leaves either the old file or the new one, never a torn mix.
fn replace_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let staged = path.with_extension("toml.partial");
    let mut f = fs::File::create(&staged)?;
    f.write_all(bytes)?;
    f.sync_all()?;
    drop(f);
    fs::rename(&staged, path)
}

/// In-memory store for the simulator and tests.
#[derive(Debug, Clone, Default)]
pub struct MemorySettingsStore {
    current: Settings,
    writes: usize,
}

impl MemorySettingsStore {
    pub fn new(initial: Settings) -> Self {
        Self {
            current: initial,
            writes: 0,
        }
    }

    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&mut self) -> eyre::Result<Settings> {
        Ok(self.current)
    }

    fn store(&mut self, settings: &Settings) -> eyre::Result<()> {
        self.current = *settings;
        self.writes += 1;
        Ok(())
    }
}
