//! Password retry guard.

/// Bounded counter of password attempts for one challenge.
///
/// `remaining` only ever goes down between two calls to [`reset`](Self::reset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryGuard {
    remaining: u32,
}

impl RetryGuard {
    pub fn new(limit: u32) -> Self {
        Self { remaining: limit }
    }

    pub fn reset(&mut self, limit: u32) {
        self.remaining = limit;
    }

    /// Record a failed attempt. Returns `true` while attempts remain.
    pub fn fail(&mut self) -> bool {
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining > 0
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }
}
