//! Bench assembly: wires the simulated or Raspberry Pi backend into a `Station`.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use jig_config::{Config, Settings};
use jig_core::{JigCfg, Station};
use jig_hardware::{SimBench, SimOptions};
use jig_traits::MonotonicClock;

/// Simulated bench knobs coming from the command line.
#[derive(Debug, Clone, Default)]
pub struct SimSetup {
    pub opts: SimOptions,
    pub virtual_time: bool,
}

impl SimSetup {
    /// Build from the `run` flags. `script` is a verdict script such as `"AAR_"`.
    pub fn from_flags(
        script: &str,
        jam_every: Option<u32>,
        no_sbc: bool,
        virtual_time: bool,
    ) -> eyre::Result<Self> {
        let responses = SimOptions::parse_responses(script);
        if responses.is_empty() {
            eyre::bail!("--sim-responses needs at least one verdict");
        }
        Ok(Self {
            opts: SimOptions {
                responses,
                jam_every,
                sbc_present: !no_sbc,
                ..SimOptions::default()
            },
            virtual_time,
        })
    }

    /// Any bench behaviour asked for beyond the stock simulator.
    pub fn customised(&self) -> bool {
        self.opts != SimOptions::default()
    }
}

pub struct Assembled {
    pub station: Station,
    /// Present only on the simulated backend.
    pub sim: Option<SimBench>,
    pub backend: &'static str,
}

pub fn assemble(
    cfg: &Config,
    settings: Settings,
    kill: Arc<AtomicBool>,
    sim: SimSetup,
) -> eyre::Result<Assembled> {
    let core = JigCfg::from(cfg);

    #[cfg(all(feature = "hardware", target_os = "linux"))]
    {
        if sim.virtual_time {
            tracing::warn!("--virtual-time only applies to the simulated bench; ignoring");
        }
        if sim.customised() {
            tracing::warn!("--sim-* options only apply to the simulated bench; ignoring");
        }
        let station = hardware_station(cfg, core, settings, kill)?;
        Ok(Assembled {
            station,
            sim: None,
            backend: "hardware",
        })
    }

    #[cfg(not(all(feature = "hardware", target_os = "linux")))]
    {
        use jig_traits::{Clock, SimClock};

        let clock: Arc<dyn Clock + Send + Sync> = if sim.virtual_time {
            Arc::new(SimClock::new())
        } else {
            Arc::new(MonotonicClock::new())
        };
        let customised = sim.customised();
        let bench = SimBench::new(sim.opts, Arc::clone(&clock));
        let station = Station::builder()
            .with_panel(bench.panel())
            .with_link(bench.link())
            .with_adc(bench.adc())
            .with_display(bench.display())
            .with_clock(clock)
            .with_config(core)
            .with_settings(settings)
            .with_kill_switch(kill)
            .build()?;
        tracing::info!(virtual_time = sim.virtual_time, customised, "simulated bench ready");
        Ok(Assembled {
            station,
            sim: Some(bench),
            backend: "sim",
        })
    }
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn hardware_station(
    cfg: &Config,
    core: JigCfg,
    settings: Settings,
    kill: Arc<AtomicBool>,
) -> eyre::Result<Station> {
    use eyre::WrapErr;
    use jig_core::hw_error::map_hw_error;
    use jig_hardware::LogDisplay;
    use jig_hardware::rpi::{Mcp3008, PinMap, RpiLink, RpiPanel};

    let pins = cfg
        .pins
        .as_ref()
        .ok_or_else(|| eyre::eyre!("invalid configuration: [pins] section is missing"))?;
    let map = PinMap {
        carrier_fwd_sensor: pins.carrier_fwd_sensor,
        carrier_bwd_sensor: pins.carrier_bwd_sensor,
        reject_gate_sensor: pins.reject_gate_sensor,
        stack_sensor: pins.stack_sensor,
        carrier: pins.carrier,
        reject_gate: pins.reject_gate,
        stopper: pins.stopper,
        valve1_cw: pins.valve1_cw,
        valve1_acw: pins.valve1_acw,
        valve2_cw: pins.valve2_cw,
        valve2_acw: pins.valve2_acw,
        buzzer: pins.buzzer,
        tower: pins.tower,
        start: pins.start,
        menu_enter: pins.menu_enter,
        menu_alt: pins.menu_alt,
        buttons_active_low: pins.buttons_active_low,
    };
    let hw = |e: jig_hardware::error::HwError| eyre::Report::new(map_hw_error(&e));
    let panel = RpiPanel::new(&map).map_err(hw).wrap_err("open panel pins")?;
    let link = RpiLink::new(&cfg.serial.port, cfg.serial.baud, pins.sbc_ready)
        .map_err(hw)
        .wrap_err("open SBC link")?;
    let adc = Mcp3008::new(cfg.serial.adc_chip_select)
        .map_err(hw)
        .wrap_err("open feedback ADC")?;

    Station::builder()
        .with_panel(panel)
        .with_link(link)
        .with_adc(adc)
        .with_display(LogDisplay::new())
        .with_clock(Arc::new(MonotonicClock::new()))
        .with_config(core)
        .with_settings(settings)
        .with_kill_switch(kill)
        .build()
}
