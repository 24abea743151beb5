//! `From` implementations bridging `jig_config` types to `jig_core` types.

use std::time::Duration;

use crate::config::{AlarmCfg, EscalationCfg, JigCfg, MechanismCfg, QrCfg, StackCfg, ValveCfg};

impl From<&jig_config::MechanismCfg> for MechanismCfg {
    fn from(c: &jig_config::MechanismCfg) -> Self {
        Self {
            tick: Duration::from_millis(c.tick_ms),
            forward_ticks: c.forward_ticks,
            recover_ticks: c.recover_ticks,
            retract_ticks: c.retract_ticks,
            gate_ticks: c.gate_ticks,
            stuck_retries: c.stuck_retries,
            gate_sensor: c.gate_sensor,
            settle: Duration::from_millis(c.settle_ms),
        }
    }
}

impl From<&jig_config::ValveCfg> for ValveCfg {
    fn from(c: &jig_config::ValveCfg) -> Self {
        let [lo, hi] = c.fine_window;
        Self {
            settle: Duration::from_millis(c.settle_ms),
            poll: Duration::from_millis(c.poll_ms),
            max_iterations: c.max_iterations,
            fine_max_iterations: c.fine_max_iterations,
            fine_window: lo..=hi,
            acw_threshold: c.acw_threshold,
            cw_threshold: c.cw_threshold,
            samples: c.samples,
            fail_hold: Duration::from_millis(c.fail_hold_ms),
            open_loop_acw_ticks: c.open_loop_acw_ticks,
            open_loop_cw_ticks: c.open_loop_cw_ticks,
        }
    }
}

impl From<&jig_config::QrCfg> for QrCfg {
    fn from(c: &jig_config::QrCfg) -> Self {
        Self {
            poll: Duration::from_millis(c.poll_ms),
            response_polls: c.response_polls,
            ack_polls: c.ack_polls,
            ready_polls: c.ready_polls,
            attempts: c.attempts,
            trigger_sends: c.trigger_sends,
            trigger_code: c.trigger_code,
            final_trigger_code: c.final_trigger_code,
            stop_code: c.stop_code,
        }
    }
}

impl From<&jig_config::EscalationCfg> for EscalationCfg {
    fn from(c: &jig_config::EscalationCfg) -> Self {
        Self {
            qr_threshold: c.qr_threshold,
            qr_mode: c.qr_mode,
            valve_threshold: c.valve_threshold,
            valve_mode: c.valve_mode,
            leak_threshold: c.leak_threshold,
            leak3_threshold: c.leak3_threshold,
            vacuum_mode: c.vacuum_mode,
        }
    }
}

impl From<&jig_config::StackCfg> for StackCfg {
    fn from(c: &jig_config::StackCfg) -> Self {
        Self {
            skip_count: c.skip_count,
            debounce: Duration::from_millis(c.debounce_ms),
        }
    }
}

impl From<&jig_config::AlarmCfg> for AlarmCfg {
    fn from(c: &jig_config::AlarmCfg) -> Self {
        Self {
            blink: Duration::from_millis(c.blink_ms),
            button_poll: Duration::from_millis(c.button_poll_ms),
        }
    }
}

impl From<&jig_config::Config> for JigCfg {
    fn from(c: &jig_config::Config) -> Self {
        Self {
            mechanism: (&c.mechanism).into(),
            valve: (&c.valve).into(),
            qr: (&c.qr).into(),
            escalation: (&c.escalation).into(),
            stack: (&c.stack).into(),
            alarm: (&c.alarm).into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_toml_matches_core_defaults() {
        let cfg = jig_config::load_toml("").expect("parse");
        let core = JigCfg::from(&cfg);
        let def = JigCfg::default();
        assert_eq!(core.mechanism.forward_ticks, def.mechanism.forward_ticks);
        assert_eq!(core.mechanism.tick, def.mechanism.tick);
        assert_eq!(core.valve.fine_window, def.valve.fine_window);
        assert_eq!(core.valve.fail_hold, def.valve.fail_hold);
        assert_eq!(core.qr.response_polls, def.qr.response_polls);
        assert_eq!(core.stack.debounce, def.stack.debounce);
        assert_eq!(core.alarm.blink, def.alarm.blink);
        assert_eq!(core.escalation.qr_mode, def.escalation.qr_mode);
    }
}
