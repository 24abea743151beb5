//! Raspberry Pi backend: GPIO for the panel, UART plus a ready line for the
//! SBC, MCP3008 over SPI for the valve feedback.

use std::collections::HashMap;
use std::time::Duration;

use rppal::gpio::{Gpio, InputPin, OutputPin};
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};
use rppal::uart::{Parity, Queue, Uart};

use jig_traits::{BoxError, Direction, FeedbackAdc, Input, Output, Panel, SbcLink, Valve};

use crate::error::{HwError, Result};

/// BCM pin numbers.
#[derive(Debug, Clone)]
pub struct PinMap {
    pub carrier_fwd_sensor: u8,
    pub carrier_bwd_sensor: u8,
    pub reject_gate_sensor: Option<u8>,
    pub stack_sensor: u8,
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
    pub buttons_active_low: bool,
}

fn gpio_err(e: rppal::gpio::Error) -> HwError {
    HwError::Gpio(e.to_string())
}

pub struct RpiPanel {
    inputs: HashMap<Input, InputPin>,
    outputs: HashMap<Output, OutputPin>,
    buttons_active_low: bool,
}

impl RpiPanel {
    pub fn new(pins: &PinMap) -> Result<Self> {
        let gpio = Gpio::new().map_err(gpio_err)?;
        let input = |n: u8| -> Result<InputPin> { Ok(gpio.get(n).map_err(gpio_err)?.into_input()) };
        let button = |n: u8| -> Result<InputPin> {
            Ok(gpio.get(n).map_err(gpio_err)?.into_input_pullup())
        };
        let output = |n: u8| -> Result<OutputPin> {
            Ok(gpio.get(n).map_err(gpio_err)?.into_output_low())
        };

        let mut inputs = HashMap::new();
        inputs.insert(Input::CarrierForward, input(pins.carrier_fwd_sensor)?);
        inputs.insert(Input::CarrierBackward, input(pins.carrier_bwd_sensor)?);
        inputs.insert(Input::StackPresent, input(pins.stack_sensor)?);
        if let Some(p) = pins.reject_gate_sensor {
            inputs.insert(Input::RejectGate, input(p)?);
        }
        inputs.insert(Input::Start, button(pins.start)?);
        inputs.insert(Input::MenuEnter, button(pins.menu_enter)?);
        inputs.insert(Input::MenuAlt, button(pins.menu_alt)?);

        let mut outputs = HashMap::new();
        outputs.insert(Output::Carrier, output(pins.carrier)?);
        outputs.insert(Output::RejectGate, output(pins.reject_gate)?);
        outputs.insert(Output::Stopper, output(pins.stopper)?);
        outputs.insert(Output::ValveMotor(Valve::One, Direction::Cw), output(pins.valve1_cw)?);
        outputs.insert(Output::ValveMotor(Valve::One, Direction::Acw), output(pins.valve1_acw)?);
        outputs.insert(Output::ValveMotor(Valve::Two, Direction::Cw), output(pins.valve2_cw)?);
        outputs.insert(Output::ValveMotor(Valve::Two, Direction::Acw), output(pins.valve2_acw)?);
        outputs.insert(Output::Buzzer, output(pins.buzzer)?);
        if let Some(p) = pins.tower {
            outputs.insert(Output::Tower, output(p)?);
        }

        tracing::info!(inputs = inputs.len(), outputs = outputs.len(), "gpio panel ready");
        Ok(Self {
            inputs,
            outputs,
            buttons_active_low: pins.buttons_active_low,
        })
    }
}

impl Panel for RpiPanel {
    fn sense(&mut self, input: Input) -> std::result::Result<bool, BoxError> {
        let pin = self
            .inputs
            .get(&input)
            .ok_or_else(|| HwError::Gpio(format!("{input:?} is not wired")))?;
        let high = pin.is_high();
        Ok(match input {
            Input::Start | Input::MenuEnter | Input::MenuAlt if self.buttons_active_low => !high,
            _ => high,
        })
    }

    fn drive(&mut self, output: Output, on: bool) -> std::result::Result<(), BoxError> {
        // Boards without a tower light simply ignore it.
        let Some(pin) = self.outputs.get_mut(&output) else {
            if output == Output::Tower {
                return Ok(());
            }
            return Err(Box::new(HwError::Gpio(format!("{output:?} is not wired"))));
        };
        if on {
            pin.set_high();
        } else {
            pin.set_low();
        }
        Ok(())
    }
}

/// UART to the SBC plus its ready/busy line.
pub struct RpiLink {
    uart: Uart,
    ready: InputPin,
}

impl RpiLink {
    pub fn new(port: &str, baud: u32, ready_pin: u8) -> Result<Self> {
        let mut uart = Uart::with_path(port, baud, Parity::None, 8, 1)
            .map_err(|e| HwError::Serial(e.to_string()))?;
        uart.set_read_mode(0, Duration::ZERO)
            .map_err(|e| HwError::Serial(e.to_string()))?;
        uart.set_write_mode(true)
            .map_err(|e| HwError::Serial(e.to_string()))?;
        let ready = Gpio::new()
            .map_err(gpio_err)?
            .get(ready_pin)
            .map_err(gpio_err)?
            .into_input();
        tracing::info!(port, baud, "SBC link open");
        Ok(Self { uart, ready })
    }
}

impl SbcLink for RpiLink {
    fn send(&mut self, bytes: &[u8]) -> std::result::Result<(), BoxError> {
        let mut sent = 0;
        while sent < bytes.len() {
            let n = self
                .uart
                .write(&bytes[sent..])
                .map_err(|e| HwError::Serial(e.to_string()))?;
            if n == 0 {
                return Err(Box::new(HwError::Timeout));
            }
            sent += n;
        }
        Ok(())
    }

    fn try_recv(&mut self) -> std::result::Result<Option<u8>, BoxError> {
        let mut buf = [0u8; 1];
        let n = self
            .uart
            .read(&mut buf)
            .map_err(|e| HwError::Serial(e.to_string()))?;
        Ok((n == 1).then_some(buf[0]))
    }

    fn flush_input(&mut self) -> std::result::Result<(), BoxError> {
        self.uart
            .flush(Queue::Input)
            .map_err(|e| HwError::Serial(e.to_string()))?;
        Ok(())
    }

    fn ready(&mut self) -> std::result::Result<bool, BoxError> {
        Ok(self.ready.is_high())
    }
}

/// MCP3008 10-bit ADC on SPI0.
pub struct Mcp3008 {
    spi: Spi,
}

impl Mcp3008 {
    pub fn new(chip_select: u8) -> Result<Self> {
        let ss = match chip_select {
            0 => SlaveSelect::Ss0,
            1 => SlaveSelect::Ss1,
            other => return Err(HwError::Spi(format!("chip select {other} not on SPI0"))),
        };
        let spi = Spi::new(Bus::Spi0, ss, 1_000_000, Mode::Mode0)
            .map_err(|e| HwError::Spi(e.to_string()))?;
        Ok(Self { spi })
    }
}

impl FeedbackAdc for Mcp3008 {
    fn convert(&mut self, channel: u8) -> std::result::Result<u16, BoxError> {
        if channel > 7 {
            return Err(Box::new(HwError::Channel(channel)));
        }
        // Start bit, single-ended mode + channel, then clock out 10 bits.
        let tx = [0x01, (0x08 | channel) << 4, 0x00];
        let mut rx = [0u8; 3];
        self.spi
            .transfer(&mut rx, &tx)
            .map_err(|e| HwError::Spi(e.to_string()))?;
        let raw = (u16::from(rx[1] & 0x03) << 8) | u16::from(rx[2]);
        tracing::trace!(channel, raw, "mcp3008 sample");
        Ok(raw)
    }
}
