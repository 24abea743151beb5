//! Input stack monitor.

/// What the stack sensor means for this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackCheck {
    Present,
    /// Empty, but still inside the tolerated run of empty readings.
    Debouncing { remaining: u32 },
    /// Empty for long enough; pause for a refill.
    Empty,
}

/// Tolerates `skip_count` consecutive empty readings before reporting empty.
#[derive(Debug, Clone)]
pub struct StackMonitor {
    skip_count: u32,
    remaining: u32,
}

impl StackMonitor {
    pub fn new(skip_count: u32) -> Self {
        Self {
            skip_count,
            remaining: skip_count,
        }
    }

    pub fn check(&mut self, present: bool) -> StackCheck {
        if present {
            self.rearm();
            return StackCheck::Present;
        }
        if self.remaining == 0 {
            return StackCheck::Empty;
        }
        self.remaining -= 1;
        StackCheck::Debouncing {
            remaining: self.remaining,
        }
    }

    /// Restart the tolerance window, e.g. after a refill.
    pub fn rearm(&mut self) {
        self.remaining = self.skip_count;
    }
}
