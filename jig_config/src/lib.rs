#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and persistent settings for the cartridge jig.
//!
//! - `Config` and its sections are deserialized from TOML and validated.
//!   Every section is optional; missing keys fall back to the shipped
//!   firmware constants.
//! - `Settings` is the small operator-editable record that survives power
//!   cycles (SBC/QR disable flags, valve tuning), see [`settings`].
pub mod settings;

use serde::Deserialize;

pub use settings::{FileSettingsStore, MemorySettingsStore, Settings, SettingsStore};

/// BCM pin numbers for the Raspberry Pi backend. Unused by the simulator.
#[derive(Debug, Deserialize, Clone)]
pub struct Pins {
    pub carrier_fwd_sensor: u8,
    pub carrier_bwd_sensor: u8,
    pub reject_gate_sensor: Option<u8>,
    pub stack_sensor: u8,
    pub sbc_ready: u8,
    pub carrier: u8,
    pub reject_gate: u8,
    pub stopper: u8,
    pub valve1_cw: u8,
    pub valve1_acw: u8,
    pub valve2_cw: u8,
    pub valve2_acw: u8,
    pub buzzer: u8,
    pub tower: Option<u8>,
    pub start: u8,
    pub menu_enter: u8,
    pub menu_alt: u8,
    /// Buttons pull the line low when pressed
    #[serde(default = "default_true")]
    pub buttons_active_low: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MechanismCfg {
    /// Polling tick for every position sensor wait (ms)
    pub tick_ms: u64,
    /// Ticks to wait for the carrier to reach the scan position
    pub forward_ticks: u32,
    /// Ticks to wait for the carrier to return home during stuck recovery
    pub recover_ticks: u32,
    /// Ticks to wait for the carrier to return home at the end of a cycle
    pub retract_ticks: u32,
    /// Ticks to wait for the reject gate sensor
    pub gate_ticks: u32,
    /// Automatic backward-then-forward retries before announcing a stuck carrier
    pub stuck_retries: u8,
    /// Board revision has a reject gate position sensor
    pub gate_sensor: bool,
    /// Pause between mechanical steps of a cycle (ms)
    pub settle_ms: u64,
}

impl Default for MechanismCfg {
    fn default() -> Self {
        Self {
            tick_ms: 1,
            forward_ticks: 5_000,
            recover_ticks: 6_000,
            retract_ticks: 10_000,
            gate_ticks: 6_000,
            stuck_retries: 5,
            gate_sensor: false,
            settle_ms: 500,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ValveCfg {
    /// Delay after energising the motor before feedback polling starts (ms)
    pub settle_ms: u64,
    /// Feedback polling period (ms)
    pub poll_ms: u64,
    /// Polling iterations for a standard rotation check
    pub max_iterations: u32,
    /// Polling iterations for a fine-tuned rotation check
    pub fine_max_iterations: u32,
    /// Inclusive iteration window in which a fine-tuned crossing must land
    pub fine_window: [u32; 2],
    /// ACW succeeds once feedback rises above this reading
    pub acw_threshold: u16,
    /// CW succeeds once feedback falls below this reading
    pub cw_threshold: u16,
    /// Raw conversions averaged per feedback reading
    pub samples: u16,
    /// How long a rotation failure stays announced (ms)
    pub fail_hold_ms: u64,
    /// Open-loop drive length, in poll periods
    pub open_loop_acw_ticks: u32,
    pub open_loop_cw_ticks: u32,
}

impl Default for ValveCfg {
    fn default() -> Self {
        Self {
            settle_ms: 100,
            poll_ms: 50,
            max_iterations: 300,
            fine_max_iterations: 200,
            fine_window: [80, 128],
            acw_threshold: 860,
            cw_threshold: 593,
            samples: 20,
            fail_hold_ms: 3_000,
            open_loop_acw_ticks: 55,
            open_loop_cw_ticks: 45,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct QrCfg {
    /// Polling period for every SBC wait (ms)
    pub poll_ms: u64,
    /// Polls to wait for the verdict byte
    pub response_polls: u32,
    /// Polls to wait for the SBC to acknowledge a trigger
    pub ack_polls: u32,
    /// Polls to wait for the SBC to come up at startup
    pub ready_polls: u32,
    /// Scan requests per cartridge
    pub attempts: u8,
    /// Trigger sends per request before declaring the SBC unresponsive
    pub trigger_sends: u8,
    /// Trigger byte while further attempts remain
    pub trigger_code: u8,
    /// Trigger byte on the last attempt
    pub final_trigger_code: u8,
    /// Byte sent after the verdict to stop recording
    pub stop_code: u8,
}

impl Default for QrCfg {
    fn default() -> Self {
        Self {
            poll_ms: 10,
            response_polls: 12_000,
            ack_polls: 500,
            ready_polls: 26_000,
            attempts: 3,
            trigger_sends: 3,
            trigger_code: 20,
            final_trigger_code: 19,
            stop_code: 0,
        }
    }
}

/// How an escalation policy's verdict is used.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PolicyMode {
    /// Halt and restart when the policy trips
    #[default]
    Enforce,
    /// Log only
    Advisory,
    /// Not evaluated
    Off,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EscalationCfg {
    pub qr_threshold: u8,
    pub qr_mode: PolicyMode,
    pub valve_threshold: u8,
    pub valve_mode: PolicyMode,
    pub leak_threshold: u8,
    /// Final-stage leak counters tolerate more failures
    pub leak3_threshold: u8,
    pub vacuum_mode: PolicyMode,
}

impl Default for EscalationCfg {
    fn default() -> Self {
        Self {
            qr_threshold: 4,
            qr_mode: PolicyMode::Enforce,
            valve_threshold: 4,
            valve_mode: PolicyMode::Advisory,
            leak_threshold: 4,
            leak3_threshold: 9,
            vacuum_mode: PolicyMode::Off,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StackCfg {
    /// Consecutive empty readings tolerated before pausing (0 = pause at once)
    pub skip_count: u32,
    /// Start button must stay pressed this long to resume (ms)
    pub debounce_ms: u64,
}

impl Default for StackCfg {
    fn default() -> Self {
        Self {
            skip_count: 0,
            debounce_ms: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AlarmCfg {
    /// Buzzer / tower toggle period while an alarm waits for the operator (ms)
    pub blink_ms: u64,
    /// Button polling period while waiting at the start prompt (ms)
    pub button_poll_ms: u64,
}

impl Default for AlarmCfg {
    fn default() -> Self {
        Self {
            blink_ms: 500,
            button_poll_ms: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SerialCfg {
    pub port: String,
    pub baud: u32,
    /// SPI chip select of the MCP3008 feedback ADC (hardware backend)
    pub adc_chip_select: u8,
}

impl Default for SerialCfg {
    fn default() -> Self {
        Self {
            port: "/dev/serial0".to_string(),
            baud: 115_200,
            adc_chip_select: 0,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub pins: Option<Pins>,
    pub mechanism: MechanismCfg,
    pub valve: ValveCfg,
    pub qr: QrCfg,
    pub escalation: EscalationCfg,
    pub stack: StackCfg,
    pub alarm: AlarmCfg,
    pub serial: SerialCfg,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Mechanism
        let m = &self.mechanism;
        if m.tick_ms == 0 {
            eyre::bail!("mechanism.tick_ms must be >= 1");
        }
        if m.forward_ticks == 0 || m.recover_ticks == 0 || m.retract_ticks == 0 {
            eyre::bail!("mechanism.*_ticks must be >= 1");
        }
        if m.gate_sensor && m.gate_ticks == 0 {
            eyre::bail!("mechanism.gate_ticks must be >= 1 when gate_sensor is set");
        }
        if m.settle_ms > 60_000 {
            eyre::bail!("mechanism.settle_ms is unreasonably large (>60s)");
        }

        // Valve
        let v = &self.valve;
        if v.poll_ms == 0 {
            eyre::bail!("valve.poll_ms must be >= 1");
        }
        if v.max_iterations == 0 || v.fine_max_iterations == 0 {
            eyre::bail!("valve.max_iterations and valve.fine_max_iterations must be >= 1");
        }
        let [lo, hi] = v.fine_window;
        if lo > hi {
            eyre::bail!("valve.fine_window must be [low, high] with low <= high");
        }
        if hi >= v.fine_max_iterations {
            eyre::bail!("valve.fine_window upper bound must be < valve.fine_max_iterations");
        }
        if v.acw_threshold > 1023 || v.cw_threshold > 1023 {
            eyre::bail!("valve thresholds must be within the 10-bit range 0..=1023");
        }
        if v.cw_threshold >= v.acw_threshold {
            eyre::bail!("valve.cw_threshold must be below valve.acw_threshold");
        }
        if v.samples == 0 {
            eyre::bail!("valve.samples must be >= 1");
        }

        // QR protocol
        let q = &self.qr;
        if q.poll_ms == 0 {
            eyre::bail!("qr.poll_ms must be >= 1");
        }
        if q.response_polls == 0 || q.ack_polls == 0 || q.ready_polls == 0 {
            eyre::bail!("qr.*_polls must be >= 1");
        }
        if q.attempts == 0 {
            eyre::bail!("qr.attempts must be >= 1");
        }
        if q.trigger_sends == 0 {
            eyre::bail!("qr.trigger_sends must be >= 1");
        }
        if q.trigger_code.is_ascii_uppercase() || q.final_trigger_code.is_ascii_uppercase() {
            eyre::bail!("qr trigger codes must not collide with verdict letters");
        }

        // Escalation: counters saturate at 15, so a threshold >= 15 can never trip
        let e = &self.escalation;
        for (name, thr) in [
            ("qr_threshold", e.qr_threshold),
            ("valve_threshold", e.valve_threshold),
            ("leak_threshold", e.leak_threshold),
            ("leak3_threshold", e.leak3_threshold),
        ] {
            if thr >= 15 {
                eyre::bail!("escalation.{name} must be < 15 (counters saturate at 15)");
            }
        }

        // Alarm
        if self.alarm.blink_ms == 0 {
            eyre::bail!("alarm.blink_ms must be >= 1");
        }
        if self.alarm.button_poll_ms == 0 {
            eyre::bail!("alarm.button_poll_ms must be >= 1");
        }

        // Serial
        if self.serial.baud == 0 {
            eyre::bail!("serial.baud must be > 0");
        }

        if let Some(r) = self.logging.rotation.as_deref()
            && !matches!(r, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        Ok(())
    }
}
