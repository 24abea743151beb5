#![allow(dead_code)]
//! Scripted bench for integration tests.
//!
//! All handles share one `BenchState`. Carrier moves follow per-command
//! scripts, the SBC answers triggers from a response queue, and a simple
//! operator presses buttons based on what the display and the alarm outputs
//! show.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::sync::Arc;

use jig_core::rig::Rig;
use jig_core::{JigCfg, Station};
use jig_config::Settings;
use jig_traits::{
    BoxError, Direction, Display, FeedbackAdc, Input, Output, Panel, SbcLink, Screen, SimClock,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Buttons {
    /// Reacts to alarms and prompts.
    Operator,
    /// Fixed levels.
    Held { start: bool, alt: bool },
}

pub struct BenchState {
    pub clock: SimClock,
    pub outputs: HashMap<Output, bool>,
    pub drive_log: Vec<(Output, bool)>,

    /// One entry per forward command: `Some(n)` arrives after `n` extra reads.
    pub forward_plan: VecDeque<Option<u32>>,
    pub forward_default: Option<u32>,
    current_forward: Option<u32>,
    forward_reads: u32,
    pub forward_commands: u32,

    /// One entry per backward command.
    pub backward_plan: VecDeque<Option<u32>>,
    pub backward_default: Option<u32>,
    current_backward: Option<u32>,
    backward_reads: u32,

    pub gate_stuck: bool,
    pub stack_script: VecDeque<bool>,

    pub buttons: Buttons,
    pub lcd: (Option<String>, Option<String>),
    pub screens: Vec<Screen>,

    pub ready_line: bool,
    /// Triggers to ignore (no acknowledgement) before acking again.
    pub ignore_triggers: u32,
    /// One entry per acknowledged trigger; `None` stays silent.
    pub responses: VecDeque<Option<u8>>,
    pub response_delay: u32,
    pending: Option<(u8, u32)>,
    pub rx: VecDeque<u8>,
    pub sent: Vec<Vec<u8>>,

    /// Feedback source: called once per conversion.
    pub adc: Box<dyn FnMut(u8) -> u16>,
}

impl BenchState {
    fn new(clock: SimClock) -> Self {
        Self {
            clock,
            outputs: HashMap::new(),
            drive_log: Vec::new(),
            forward_plan: VecDeque::new(),
            forward_default: Some(3),
            current_forward: None,
            forward_reads: 0,
            forward_commands: 0,
            backward_plan: VecDeque::new(),
            backward_default: Some(2),
            current_backward: Some(0),
            backward_reads: 0,
            gate_stuck: false,
            stack_script: VecDeque::new(),
            buttons: Buttons::Operator,
            lcd: (None, None),
            screens: Vec::new(),
            ready_line: true,
            ignore_triggers: 0,
            responses: VecDeque::new(),
            response_delay: 5,
            pending: None,
            rx: VecDeque::new(),
            sent: Vec::new(),
            adc: Box::new(|_| 727),
        }
    }

    pub fn output(&self, out: Output) -> bool {
        self.outputs.get(&out).copied().unwrap_or(false)
    }

    pub fn all_safe(&self) -> bool {
        Output::ALL.iter().all(|o| !self.output(*o))
    }

    pub fn lcd_text(&self) -> String {
        format!(
            "{}|{}",
            self.lcd.0.as_deref().unwrap_or(""),
            self.lcd.1.as_deref().unwrap_or("")
        )
    }

    /// Every single byte sent on its own (triggers and stop codes).
    pub fn single_bytes(&self) -> Vec<u8> {
        self.sent
            .iter()
            .filter(|b| b.len() == 1)
            .map(|b| b[0])
            .collect()
    }

    /// Everything sent, concatenated as text.
    pub fn sent_text(&self) -> String {
        self.sent
            .iter()
            .filter(|b| b.len() > 1)
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .collect()
    }

    fn button(&self, input: Input) -> bool {
        match self.buttons {
            Buttons::Held { start, alt } => match input {
                Input::Start => start,
                Input::MenuAlt => alt,
                _ => false,
            },
            Buttons::Operator => {
                let text = self.lcd_text();
                if text.contains("PRESS START") || text.contains("STACK") {
                    let ms = self.clock.elapsed().as_millis();
                    input == Input::Start && (ms / 200) % 2 == 0
                } else {
                    (self.output(Output::Buzzer) || self.output(Output::Tower))
                        && matches!(input, Input::Start | Input::MenuAlt)
                }
            }
        }
    }
}

pub type Shared = Rc<RefCell<BenchState>>;

pub struct MockPanel(pub Shared);
pub struct MockLink(pub Shared);
pub struct MockAdc(pub Shared);
pub struct MockDisplay(pub Shared);

impl Panel for MockPanel {
    fn sense(&mut self, input: Input) -> Result<bool, BoxError> {
        let mut s = self.0.borrow_mut();
        let carrier_on = s.output(Output::Carrier);
        Ok(match input {
            Input::CarrierForward => {
                if !carrier_on {
                    return Ok(false);
                }
                s.forward_reads += 1;
                s.current_forward.is_some_and(|n| s.forward_reads > n)
            }
            Input::CarrierBackward => {
                if carrier_on {
                    return Ok(false);
                }
                s.backward_reads += 1;
                s.current_backward.is_some_and(|n| s.backward_reads > n)
            }
            Input::RejectGate => {
                let cmd = s.output(Output::RejectGate);
                if s.gate_stuck { !cmd } else { cmd }
            }
            Input::StackPresent => s.stack_script.pop_front().unwrap_or(true),
            Input::Start | Input::MenuAlt | Input::MenuEnter => s.button(input),
        })
    }

    fn drive(&mut self, output: Output, on: bool) -> Result<(), BoxError> {
        let mut s = self.0.borrow_mut();
        let was = s.output(output);
        s.outputs.insert(output, on);
        s.drive_log.push((output, on));
        if output == Output::Carrier && was != on {
            if on {
                s.forward_commands += 1;
                let next = s.forward_plan.pop_front().unwrap_or(s.forward_default);
                s.current_forward = next;
                s.forward_reads = 0;
            } else {
                let next = s.backward_plan.pop_front().unwrap_or(s.backward_default);
                s.current_backward = next;
                s.backward_reads = 0;
            }
        }
        Ok(())
    }
}

impl SbcLink for MockLink {
    fn send(&mut self, bytes: &[u8]) -> Result<(), BoxError> {
        let mut s = self.0.borrow_mut();
        s.sent.push(bytes.to_vec());
        if let [19 | 20] = bytes {
            if s.ignore_triggers > 0 {
                s.ignore_triggers -= 1;
                return Ok(());
            }
            s.ready_line = false;
            let delay = s.response_delay;
            s.pending = match s.responses.pop_front().flatten() {
                Some(b) => Some((b, delay)),
                None => None,
            };
        }
        Ok(())
    }

    fn try_recv(&mut self) -> Result<Option<u8>, BoxError> {
        let mut s = self.0.borrow_mut();
        if let Some((b, left)) = s.pending {
            if left == 0 {
                s.pending = None;
                s.rx.push_back(b);
                s.ready_line = true;
            } else {
                s.pending = Some((b, left - 1));
            }
        }
        Ok(s.rx.pop_front())
    }

    fn flush_input(&mut self) -> Result<(), BoxError> {
        self.0.borrow_mut().rx.clear();
        Ok(())
    }

    fn ready(&mut self) -> Result<bool, BoxError> {
        Ok(self.0.borrow().ready_line)
    }
}

impl FeedbackAdc for MockAdc {
    fn convert(&mut self, channel: u8) -> Result<u16, BoxError> {
        let mut s = self.0.borrow_mut();
        Ok((s.adc)(channel))
    }
}

impl Display for MockDisplay {
    fn show(&mut self, screen: &Screen) -> Result<(), BoxError> {
        let mut s = self.0.borrow_mut();
        if screen.clear {
            s.lcd = (None, None);
        }
        if let Some(t) = &screen.top {
            s.lcd.0 = Some(t.clone());
        }
        if let Some(b) = &screen.bottom {
            s.lcd.1 = Some(b.clone());
        }
        s.screens.push(screen.clone());
        Ok(())
    }
}

pub struct Bench {
    pub state: Shared,
    pub clock: SimClock,
}

impl Bench {
    pub fn new() -> Self {
        let clock = SimClock::new();
        Self {
            state: Rc::new(RefCell::new(BenchState::new(clock.clone()))),
            clock,
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut BenchState) -> R) -> R {
        f(&mut self.state.borrow_mut())
    }

    pub fn rig(&self) -> Rig {
        Rig::new(
            Box::new(MockPanel(self.state.clone())),
            Box::new(MockAdc(self.state.clone())),
            Box::new(MockLink(self.state.clone())),
            Box::new(MockDisplay(self.state.clone())),
            Arc::new(self.clock.clone()),
        )
    }

    pub fn station(&self, cfg: JigCfg, settings: Settings) -> Station {
        Station::builder()
            .with_panel(MockPanel(self.state.clone()))
            .with_link(MockLink(self.state.clone()))
            .with_adc(MockAdc(self.state.clone()))
            .with_display(MockDisplay(self.state.clone()))
            .with_clock(Arc::new(self.clock.clone()))
            .with_config(cfg)
            .with_settings(settings)
            .build()
            .expect("station builds")
    }

    /// SBC answers with these bytes, one per trigger.
    pub fn respond(&self, bytes: &[u8]) {
        self.with(|s| s.responses.extend(bytes.iter().map(|b| Some(*b))));
    }
}

/// Feedback that crosses the threshold for `dir` from iteration `k` on.
/// `None` never crosses.
pub fn crossing_at(k: Option<u32>, dir: Direction, samples: u32) -> Box<dyn FnMut(u8) -> u16> {
    let mut calls = 0u32;
    let (before, after) = match dir {
        Direction::Acw => (700, 900),
        Direction::Cw => (700, 500),
    };
    Box::new(move |_| {
        let iteration = calls / samples;
        calls += 1;
        match k {
            Some(k) if iteration >= k => after,
            _ => before,
        }
    })
}
