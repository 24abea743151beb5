//! Type-state builder for `Station`.
//!
//! The builder enforces at compile time that a panel and an SBC link are
//! provided before `build()` is available. `try_build()` is always available
//! for dynamic checks.

use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use jig_config::Settings;
use jig_traits::{Clock, Display, FeedbackAdc, MonotonicClock, Panel, SbcLink};

use crate::config::JigCfg;
use crate::error::{BuildError, Result};
use crate::mocks::{NoAdc, NullDisplay};
use crate::rig::Rig;
use crate::station::Station;

pub struct Missing;
pub struct Set;

pub struct StationBuilder<P, L> {
    panel: Option<Box<dyn Panel>>,
    link: Option<Box<dyn SbcLink>>,
    adc: Option<Box<dyn FeedbackAdc>>,
    display: Option<Box<dyn Display>>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    cfg: Option<JigCfg>,
    settings: Settings,
    kill: Option<Arc<AtomicBool>>,
    _p: PhantomData<P>,
    _l: PhantomData<L>,
}

impl Default for StationBuilder<Missing, Missing> {
    fn default() -> Self {
        Self {
            panel: None,
            link: None,
            adc: None,
            display: None,
            clock: None,
            cfg: None,
            settings: Settings::default(),
            kill: None,
            _p: PhantomData,
            _l: PhantomData,
        }
    }
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

/// Checks the core config for values that would make the station misbehave.
fn validate(cfg: &JigCfg) -> Result<()> {
    if cfg.mechanism.forward_ticks == 0
        || cfg.mechanism.recover_ticks == 0
        || cfg.mechanism.retract_ticks == 0
    {
        return Err(invalid("carrier wait bounds must be >= 1 tick"));
    }
    if cfg.valve.max_iterations == 0 || cfg.valve.fine_max_iterations == 0 {
        return Err(invalid("valve iteration bounds must be >= 1"));
    }
    if cfg.valve.fine_window.start() > cfg.valve.fine_window.end()
        || *cfg.valve.fine_window.end() >= cfg.valve.fine_max_iterations
    {
        return Err(invalid("fine-tuned window must sit inside the iteration bound"));
    }
    if cfg.valve.cw_threshold >= cfg.valve.acw_threshold {
        return Err(invalid("cw threshold must be below acw threshold"));
    }
    if cfg.qr.attempts == 0 || cfg.qr.trigger_sends == 0 {
        return Err(invalid("qr attempts and trigger sends must be >= 1"));
    }
    if cfg.alarm.blink.is_zero() || cfg.alarm.button_poll.is_zero() {
        return Err(invalid("alarm periods must be non-zero"));
    }
    Ok(())
}

impl<P, L> StationBuilder<P, L> {
    fn retag<P2, L2>(self) -> StationBuilder<P2, L2> {
        StationBuilder {
            panel: self.panel,
            link: self.link,
            adc: self.adc,
            display: self.display,
            clock: self.clock,
            cfg: self.cfg,
            settings: self.settings,
            kill: self.kill,
            _p: PhantomData,
            _l: PhantomData,
        }
    }

    pub fn with_panel(mut self, panel: impl Panel + 'static) -> StationBuilder<Set, L> {
        self.panel = Some(Box::new(panel));
        self.retag()
    }

    pub fn with_link(mut self, link: impl SbcLink + 'static) -> StationBuilder<P, Set> {
        self.link = Some(Box::new(link));
        self.retag()
    }

    /// Without an ADC every valve check fails with a hardware error.
    pub fn with_adc(mut self, adc: impl FeedbackAdc + 'static) -> Self {
        self.adc = Some(Box::new(adc));
        self
    }

    pub fn with_display(mut self, display: impl Display + 'static) -> Self {
        self.display = Some(Box::new(display));
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_config(mut self, cfg: JigCfg) -> Self {
        self.cfg = Some(cfg);
        self
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Flag set asynchronously (signal handler) to request a shutdown.
    pub fn with_kill_switch(mut self, kill: Arc<AtomicBool>) -> Self {
        self.kill = Some(kill);
        self
    }

    pub fn try_build(self) -> Result<Station> {
        let panel = self
            .panel
            .ok_or_else(|| eyre::Report::new(BuildError::MissingPanel))?;
        let link = self
            .link
            .ok_or_else(|| eyre::Report::new(BuildError::MissingLink))?;
        let cfg = self.cfg.unwrap_or_default();
        validate(&cfg)?;

        let rig = Rig::new(
            panel,
            self.adc.unwrap_or_else(|| Box::new(NoAdc)),
            link,
            self.display.unwrap_or_else(|| Box::new(NullDisplay)),
            self.clock.unwrap_or_else(|| Arc::new(MonotonicClock::new())),
        );
        let kill = self.kill.unwrap_or_default();
        Ok(Station::new(rig, cfg, self.settings, kill))
    }
}

impl StationBuilder<Set, Set> {
    pub fn build(self) -> Result<Station> {
        self.try_build()
    }
}
