//! Runtime configuration for the jig controller.
//!
//! These are the structs the control logic reads. They are separate from the
//! TOML schema in `jig_config`; see `conversions` for the mapping.

use std::ops::RangeInclusive;
use std::time::Duration;

pub use jig_config::PolicyMode;

/// Carrier, stopper and reject gate timing.
#[derive(Debug, Clone)]
pub struct MechanismCfg {
    /// Sensor polling tick.
    pub tick: Duration,
    pub forward_ticks: u32,
    pub recover_ticks: u32,
    pub retract_ticks: u32,
    pub gate_ticks: u32,
    /// Backward-then-forward attempts before a stuck carrier is announced.
    pub stuck_retries: u8,
    /// Board revision has a reject gate position sensor.
    pub gate_sensor: bool,
    /// Pause between mechanical steps of a cycle.
    pub settle: Duration,
}

impl Default for MechanismCfg {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(1),
            forward_ticks: 5_000,
            recover_ticks: 6_000,
            retract_ticks: 10_000,
            gate_ticks: 6_000,
            stuck_retries: 5,
            gate_sensor: false,
            settle: Duration::from_millis(500),
        }
    }
}

/// Valve rotation check parameters.
#[derive(Debug, Clone)]
pub struct ValveCfg {
    pub settle: Duration,
    pub poll: Duration,
    pub max_iterations: u32,
    pub fine_max_iterations: u32,
    /// Iterations at which a fine-tuned crossing counts as a pass.
    pub fine_window: RangeInclusive<u32>,
    /// ACW passes once the reading is strictly above this.
    pub acw_threshold: u16,
    /// CW passes once the reading is strictly below this.
    pub cw_threshold: u16,
    pub samples: u16,
    pub fail_hold: Duration,
    pub open_loop_acw_ticks: u32,
    pub open_loop_cw_ticks: u32,
}

impl Default for ValveCfg {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(100),
            poll: Duration::from_millis(50),
            max_iterations: 300,
            fine_max_iterations: 200,
            fine_window: 80..=128,
            acw_threshold: 860,
            cw_threshold: 593,
            samples: 20,
            fail_hold: Duration::from_secs(3),
            open_loop_acw_ticks: 55,
            open_loop_cw_ticks: 45,
        }
    }
}

/// SBC protocol timing and codes.
#[derive(Debug, Clone)]
pub struct QrCfg {
    pub poll: Duration,
    pub response_polls: u32,
    pub ack_polls: u32,
    pub ready_polls: u32,
    pub attempts: u8,
    pub trigger_sends: u8,
    pub trigger_code: u8,
    pub final_trigger_code: u8,
    pub stop_code: u8,
}

impl Default for QrCfg {
    fn default() -> Self {
        Self {
            poll: Duration::from_millis(10),
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

#[derive(Debug, Clone)]
pub struct EscalationCfg {
    pub qr_threshold: u8,
    pub qr_mode: PolicyMode,
    pub valve_threshold: u8,
    pub valve_mode: PolicyMode,
    pub leak_threshold: u8,
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

#[derive(Debug, Clone)]
pub struct StackCfg {
    /// Consecutive empty readings tolerated before pausing.
    pub skip_count: u32,
    /// Start must stay pressed this long to leave the stack alarm.
    pub debounce: Duration,
}

impl Default for StackCfg {
    fn default() -> Self {
        Self {
            skip_count: 0,
            debounce: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AlarmCfg {
    /// Buzzer/tower toggle period.
    pub blink: Duration,
    /// Button polling period while waiting on the operator.
    pub button_poll: Duration,
}

impl Default for AlarmCfg {
    fn default() -> Self {
        Self {
            blink: Duration::from_millis(500),
            button_poll: Duration::from_millis(10),
        }
    }
}

/// Everything the station needs, grouped.
#[derive(Debug, Clone, Default)]
pub struct JigCfg {
    pub mechanism: MechanismCfg,
    pub valve: ValveCfg,
    pub qr: QrCfg,
    pub escalation: EscalationCfg,
    pub stack: StackCfg,
    pub alarm: AlarmCfg,
}
