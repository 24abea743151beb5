//! Simulated jig bench.
//!
//! One shared world backs every handle (`SimPanel`, `SimAdc`, `SimLink`,
//! `SimDisplay`). All motion is a function of the injected clock, so the same
//! bench runs in real time or on a `SimClock`.
//!
//! The operator model presses start when the display asks for it, refills the
//! stack when told to, and answers any buzzer or tower alarm with the
//! acknowledge chord after a short reaction time.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use jig_traits::{
    BoxError, Clock, Direction, Display, FeedbackAdc, Input, Output, Panel, SbcLink, Screen, Valve,
};

use crate::error::HwError;

/// Bench behaviour knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct SimOptions {
    /// Time for the carrier to travel between its end positions.
    pub carrier_travel: Duration,
    /// Every Nth forward command jams and never reaches the scan position.
    pub jam_every: Option<u32>,
    /// Cartridges in the input stack; `None` never runs out.
    pub stack_capacity: Option<u32>,
    /// Whether an SBC is wired at all.
    pub sbc_present: bool,
    /// Time before the SBC raises its ready line.
    pub sbc_boot: Duration,
    /// Verdicts returned per trigger, cycled. `None` stays silent.
    pub responses: Vec<Option<u8>>,
    pub response_delay: Duration,
    pub trigger_codes: [u8; 2],
    /// Valve feedback slew while a motor runs, in counts per millisecond.
    pub valve_rate: f32,
    /// Starting feedback reading of both valves.
    pub valve_rest: u16,
    /// Simulated operator presses buttons.
    pub operator: bool,
    /// How long the operator takes to answer an alarm.
    pub reaction: Duration,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            carrier_travel: Duration::from_millis(300),
            jam_every: None,
            stack_capacity: None,
            sbc_present: true,
            sbc_boot: Duration::ZERO,
            responses: vec![Some(b'A')],
            response_delay: Duration::from_millis(400),
            trigger_codes: [20, 19],
            valve_rate: 0.03,
            valve_rest: 727,
            operator: true,
            reaction: Duration::from_millis(300),
        }
    }
}

impl SimOptions {
    /// Parse a verdict script such as `"AAR_"`; `_` is a silent SBC.
    pub fn parse_responses(script: &str) -> Vec<Option<u8>> {
        script
            .bytes()
            .map(|b| if b == b'_' { None } else { Some(b) })
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
struct ValveSim {
    position: f32,
    moving: Option<(Direction, Instant)>,
}

impl ValveSim {
    fn settle(&mut self, now: Instant, rate: f32) {
        if let Some((dir, since)) = self.moving {
            let ms = now.saturating_duration_since(since).as_secs_f32() * 1000.0;
            let delta = rate * ms;
            self.position = match dir {
                Direction::Acw => self.position + delta,
                Direction::Cw => self.position - delta,
            }
            .clamp(0.0, 1023.0);
            self.moving = Some((dir, now));
        }
    }
}

#[derive(Debug, Default)]
struct SbcSim {
    pending: Option<(Option<u8>, Instant)>,
    rx: VecDeque<u8>,
    next_response: usize,
    triggers: u32,
    telemetry_bytes: usize,
}

struct World {
    clock: Arc<dyn Clock + Send + Sync>,
    opts: SimOptions,
    epoch: Instant,
    outputs: HashMap<Output, bool>,
    carrier_changed: Option<Instant>,
    forward_commands: u32,
    jammed: bool,
    stack_left: Option<u32>,
    fed: u32,
    valves: [ValveSim; 2],
    sbc: SbcSim,
    lcd: (String, String),
    alarm_since: Option<Instant>,
}

impl World {
    fn now(&self) -> Instant {
        self.clock.now()
    }

    fn output(&self, out: Output) -> bool {
        self.outputs.get(&out).copied().unwrap_or(false)
    }

    fn sbc_ready(&self, now: Instant) -> bool {
        self.opts.sbc_present
            && now.saturating_duration_since(self.epoch) >= self.opts.sbc_boot
            && self.sbc.pending.is_none()
    }

    fn advance_sbc(&mut self, now: Instant) {
        if let Some((byte, due)) = self.sbc.pending {
            if now >= due {
                self.sbc.pending = None;
                if let Some(b) = byte {
                    self.sbc.rx.push_back(b);
                }
            }
        }
    }

    fn carrier_travelled(&self, now: Instant) -> bool {
        self.carrier_changed
            .is_none_or(|t| now.saturating_duration_since(t) >= self.opts.carrier_travel)
    }

    fn operator_presses(&mut self, input: Input) -> bool {
        if !self.opts.operator {
            return false;
        }
        let now = self.now();
        let chord = matches!(input, Input::Start | Input::MenuAlt);
        let text = format!("{}|{}", self.lcd.0, self.lcd.1);

        if text.contains("INITIALIZING") {
            return !self.opts.sbc_present && chord;
        }
        if text.contains("PRESS START") || text.contains("STACK") {
            let ms = now.saturating_duration_since(self.epoch).as_millis();
            let pressed = input == Input::Start && (ms / 200) % 2 == 0;
            if pressed && text.contains("STACK") && self.stack_left == Some(0) {
                self.stack_left = self.opts.stack_capacity;
                tracing::info!(cartridges = ?self.stack_left, "operator refilled the stack");
            }
            return pressed;
        }
        chord
            && self
                .alarm_since
                .is_some_and(|t| now.saturating_duration_since(t) >= self.opts.reaction)
    }
}

/// Shared simulated bench.
#[derive(Clone)]
pub struct SimBench {
    world: Rc<RefCell<World>>,
}

impl SimBench {
    pub fn new(opts: SimOptions, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        let epoch = clock.now();
        let rest = f32::from(opts.valve_rest.min(1023));
        let valve = ValveSim {
            position: rest,
            moving: None,
        };
        let world = World {
            clock,
            stack_left: opts.stack_capacity,
            opts,
            epoch,
            outputs: HashMap::new(),
            carrier_changed: None,
            forward_commands: 0,
            jammed: false,
            fed: 0,
            valves: [valve; 2],
            sbc: SbcSim::default(),
            lcd: (String::new(), String::new()),
            alarm_since: None,
        };
        Self {
            world: Rc::new(RefCell::new(world)),
        }
    }

    pub fn panel(&self) -> SimPanel {
        SimPanel(self.world.clone())
    }

    pub fn adc(&self) -> SimAdc {
        SimAdc(self.world.clone())
    }

    pub fn link(&self) -> SimLink {
        SimLink(self.world.clone())
    }

    pub fn display(&self) -> SimDisplay {
        SimDisplay(self.world.clone())
    }

    /// Cartridges released by the stopper so far.
    pub fn cartridges_fed(&self) -> u32 {
        self.world.borrow().fed
    }

    pub fn triggers_sent(&self) -> u32 {
        self.world.borrow().sbc.triggers
    }

    pub fn telemetry_bytes(&self) -> usize {
        self.world.borrow().sbc.telemetry_bytes
    }

    pub fn lcd(&self) -> (String, String) {
        self.world.borrow().lcd.clone()
    }

    pub fn output(&self, out: Output) -> bool {
        self.world.borrow().output(out)
    }
}

pub struct SimPanel(Rc<RefCell<World>>);
pub struct SimAdc(Rc<RefCell<World>>);
pub struct SimLink(Rc<RefCell<World>>);
pub struct SimDisplay(Rc<RefCell<World>>);

impl Panel for SimPanel {
    fn sense(&mut self, input: Input) -> Result<bool, BoxError> {
        let mut w = self.0.borrow_mut();
        let now = w.now();
        let carrier_on = w.output(Output::Carrier);
        Ok(match input {
            Input::CarrierForward => carrier_on && !w.jammed && w.carrier_travelled(now),
            Input::CarrierBackward => !carrier_on && w.carrier_travelled(now),
            Input::RejectGate => w.output(Output::RejectGate),
            Input::StackPresent => w.stack_left.is_none_or(|n| n > 0),
            Input::Start | Input::MenuAlt => w.operator_presses(input),
            Input::MenuEnter => false,
        })
    }

    fn drive(&mut self, output: Output, on: bool) -> Result<(), BoxError> {
        let mut w = self.0.borrow_mut();
        let now = w.now();
        let was = w.output(output);
        if let Output::ValveMotor(valve, dir) = output {
            let rate = w.opts.valve_rate;
            let v = &mut w.valves[valve.index()];
            v.settle(now, rate);
            if on {
                v.moving = Some((dir, now));
            } else if v.moving.is_some_and(|(d, _)| d == dir) {
                v.moving = None;
            }
        }
        w.outputs.insert(output, on);
        if was == on {
            return Ok(());
        }

        match output {
            Output::Carrier => {
                w.carrier_changed = Some(now);
                if on {
                    w.forward_commands += 1;
                    let n = w.forward_commands;
                    w.jammed = w.opts.jam_every.is_some_and(|every| every > 0 && n % every == 0);
                    if w.jammed {
                        tracing::debug!(command = n, "sim: carrier jams");
                    }
                }
            }
            Output::Stopper if !on => {
                w.fed += 1;
                if let Some(left) = w.stack_left.as_mut() {
                    *left = left.saturating_sub(1);
                }
            }
            Output::Buzzer | Output::Tower => {
                let any = w.output(Output::Buzzer) || w.output(Output::Tower);
                if !any {
                    w.alarm_since = None;
                } else if w.alarm_since.is_none() {
                    w.alarm_since = Some(now);
                }
            }
            _ => {}
        }
        Ok(())
    }
}

impl FeedbackAdc for SimAdc {
    fn convert(&mut self, channel: u8) -> Result<u16, BoxError> {
        let valve = match channel {
            0 => Valve::One,
            1 => Valve::Two,
            other => return Err(Box::new(HwError::Channel(other))),
        };
        let mut w = self.0.borrow_mut();
        let now = w.now();
        let rate = w.opts.valve_rate;
        let v = &mut w.valves[valve.index()];
        v.settle(now, rate);
        Ok(v.position.round() as u16)
    }
}

impl SbcLink for SimLink {
    fn send(&mut self, bytes: &[u8]) -> Result<(), BoxError> {
        let mut w = self.0.borrow_mut();
        let now = w.now();
        w.advance_sbc(now);
        match bytes {
            [code] if w.opts.trigger_codes.contains(code) => {
                w.sbc.triggers += 1;
                if !w.sbc_ready(now) {
                    tracing::debug!(code, "sim: SBC busy or absent, trigger ignored");
                    return Ok(());
                }
                let verdict = if w.opts.responses.is_empty() {
                    None
                } else {
                    let i = w.sbc.next_response % w.opts.responses.len();
                    w.sbc.next_response += 1;
                    w.opts.responses[i]
                };
                let due = now + w.opts.response_delay;
                w.sbc.pending = Some((verdict, due));
            }
            [_] => {}
            _ => w.sbc.telemetry_bytes += bytes.len(),
        }
        Ok(())
    }

    fn try_recv(&mut self) -> Result<Option<u8>, BoxError> {
        let mut w = self.0.borrow_mut();
        let now = w.now();
        w.advance_sbc(now);
        Ok(w.sbc.rx.pop_front())
    }

    fn flush_input(&mut self) -> Result<(), BoxError> {
        self.0.borrow_mut().sbc.rx.clear();
        Ok(())
    }

    fn ready(&mut self) -> Result<bool, BoxError> {
        let mut w = self.0.borrow_mut();
        let now = w.now();
        w.advance_sbc(now);
        Ok(w.sbc_ready(now))
    }
}

impl Display for SimDisplay {
    fn show(&mut self, screen: &Screen) -> Result<(), BoxError> {
        let mut w = self.0.borrow_mut();
        if screen.clear {
            w.lcd = (String::new(), String::new());
        }
        if let Some(top) = &screen.top {
            w.lcd.0.clone_from(top);
        }
        if let Some(bottom) = &screen.bottom {
            w.lcd.1.clone_from(bottom);
        }
        tracing::debug!(top = %w.lcd.0, bottom = %w.lcd.1, "lcd");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jig_traits::SimClock;

    fn bench(opts: SimOptions) -> (SimBench, SimClock) {
        let clock = SimClock::new();
        (SimBench::new(opts, Arc::new(clock.clone())), clock)
    }

    #[test]
    fn carrier_takes_travel_time() {
        let (b, clock) = bench(SimOptions::default());
        let mut p = b.panel();
        assert!(p.sense(Input::CarrierBackward).unwrap());
        p.drive(Output::Carrier, true).unwrap();
        assert!(!p.sense(Input::CarrierForward).unwrap());
        clock.sleep(Duration::from_millis(300));
        assert!(p.sense(Input::CarrierForward).unwrap());
        assert!(!p.sense(Input::CarrierBackward).unwrap());
    }

    #[test]
    fn jammed_command_never_arrives() {
        let (b, clock) = bench(SimOptions {
            jam_every: Some(1),
            ..SimOptions::default()
        });
        let mut p = b.panel();
        p.drive(Output::Carrier, true).unwrap();
        clock.sleep(Duration::from_secs(5));
        assert!(!p.sense(Input::CarrierForward).unwrap());
    }

    #[test]
    fn trigger_answers_after_delay() {
        let (b, clock) = bench(SimOptions::default());
        let mut l = b.link();
        assert!(l.ready().unwrap());
        l.send(&[20]).unwrap();
        assert!(!l.ready().unwrap());
        assert_eq!(l.try_recv().unwrap(), None);
        clock.sleep(Duration::from_millis(400));
        assert_eq!(l.try_recv().unwrap(), Some(b'A'));
        assert!(l.ready().unwrap());
    }

    #[test]
    fn busy_sbc_ignores_triggers() {
        let (b, _clock) = bench(SimOptions::default());
        let mut l = b.link();
        l.send(&[20]).unwrap();
        l.send(&[20]).unwrap();
        assert_eq!(b.triggers_sent(), 2);
    }

    #[test]
    fn valve_feedback_slews_while_driven() {
        let (b, clock) = bench(SimOptions::default());
        let mut p = b.panel();
        let mut adc = b.adc();
        let start = adc.convert(0).unwrap();
        p.drive(Output::ValveMotor(Valve::One, Direction::Acw), true).unwrap();
        clock.sleep(Duration::from_secs(1));
        let moved = adc.convert(0).unwrap();
        assert_eq!(moved, start + 30);
        p.drive(Output::ValveMotor(Valve::One, Direction::Acw), false).unwrap();
        clock.sleep(Duration::from_secs(1));
        assert_eq!(adc.convert(0).unwrap(), moved);
        assert_eq!(adc.convert(1).unwrap(), start);
        assert!(adc.convert(7).is_err());
    }

    #[test]
    fn stack_runs_out_and_operator_refills() {
        let (b, clock) = bench(SimOptions {
            stack_capacity: Some(1),
            ..SimOptions::default()
        });
        let mut p = b.panel();
        let mut d = b.display();
        p.drive(Output::Stopper, true).unwrap();
        p.drive(Output::Stopper, false).unwrap();
        assert!(!p.sense(Input::StackPresent).unwrap());
        d.show(&Screen::title("STACK EMPTY")).unwrap();
        // First 200 ms window of the press pattern.
        assert!(p.sense(Input::Start).unwrap());
        assert!(p.sense(Input::StackPresent).unwrap());
        clock.sleep(Duration::from_millis(200));
        assert!(!p.sense(Input::Start).unwrap());
    }

    #[test]
    fn operator_answers_alarms_after_reaction_time() {
        let (b, clock) = bench(SimOptions::default());
        let mut p = b.panel();
        p.drive(Output::Buzzer, true).unwrap();
        assert!(!p.sense(Input::MenuAlt).unwrap());
        clock.sleep(Duration::from_millis(300));
        assert!(p.sense(Input::Start).unwrap());
        assert!(p.sense(Input::MenuAlt).unwrap());
        p.drive(Output::Buzzer, false).unwrap();
        assert!(!p.sense(Input::Start).unwrap());
    }

    #[test]
    fn responses_script_parses_silence() {
        assert_eq!(
            SimOptions::parse_responses("A_R"),
            vec![Some(b'A'), None, Some(b'R')]
        );
    }
}
