//! Bounded polling with a fixed period.
//!
//! Every wait in the controller is one of these: probe a condition, and if it
//! is not met, sleep one period on the injected clock. The probe runs once
//! more after the last sleep so a condition that turns true exactly at the
//! bound is still seen.

use std::time::Duration;

use jig_traits::Clock;

use crate::error::Result;

/// What a probe observed on one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Pending,
    Done,
    /// Operator asked to stop waiting.
    Abort,
}

/// How a bounded wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    /// Condition met after this many sleeps.
    Ready(u32),
    TimedOut,
    Aborted,
}

impl Poll {
    pub fn is_ready(self) -> bool {
        matches!(self, Poll::Ready(_))
    }
}

/// Probe up to `max_ticks + 1` times, sleeping `period` between probes.
pub fn poll_until<F>(
    clock: &dyn Clock,
    period: Duration,
    max_ticks: u32,
    mut probe: F,
) -> Result<Poll>
where
    F: FnMut() -> Result<Probe>,
{
    let mut tick = 0u32;
    loop {
        match probe()? {
            Probe::Done => return Ok(Poll::Ready(tick)),
            Probe::Abort => return Ok(Poll::Aborted),
            Probe::Pending => {}
        }
        if tick >= max_ticks {
            return Ok(Poll::TimedOut);
        }
        clock.sleep(period);
        tick += 1;
    }
}
