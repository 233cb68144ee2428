//! Session-count criteria

use crate::criterion::{Decision, DecisionReason};

/// Never reconfigure
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Never;

impl Never {
    /// Always declines
    #[inline]
    #[must_use]
    pub fn evaluate(&self) -> Decision {
        Decision::hold(DecisionReason::Disabled)
    }
}

/// Reconfigure every `interval` sessions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedInterval {
    interval: u32,
    sessions: u32,
}

impl FixedInterval {
    /// Create a criterion firing once `interval` sessions were seen
    #[inline]
    #[must_use]
    pub fn new(interval: u32) -> Self {
        Self {
            interval,
            sessions: 0,
        }
    }

    /// Configured interval
    #[inline]
    #[must_use]
    pub fn interval(&self) -> u32 {
        self.interval
    }

    /// Sessions counted since the last reset
    #[inline]
    #[must_use]
    pub fn sessions(&self) -> u32 {
        self.sessions
    }

    /// Clear the session count
    #[inline]
    pub fn reset(&mut self) {
        self.sessions = 0;
    }

    /// Count one session
    #[inline]
    pub fn update(&mut self) {
        self.sessions = self.sessions.saturating_add(1);
    }

    /// Decide against the interval
    #[must_use]
    pub fn evaluate(&self) -> Decision {
        let reason = DecisionReason::Interval {
            sessions: self.sessions,
            interval: self.interval,
        };
        if self.sessions >= self.interval {
            Decision::reconfigure(reason)
        } else {
            Decision::hold(reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_at_interval_and_after_reset_holds() {
        let mut criterion = FixedInterval::new(3);
        criterion.update();
        criterion.update();
        assert!(!criterion.evaluate().reconfigure);

        criterion.update();
        assert!(criterion.evaluate().reconfigure);

        criterion.reset();
        assert!(!criterion.evaluate().reconfigure);
        assert_eq!(criterion.sessions(), 0);
    }

    #[test]
    fn zero_interval_always_fires() {
        assert!(FixedInterval::new(0).evaluate().reconfigure);
    }

    #[test]
    fn never_holds() {
        assert!(!Never.evaluate().reconfigure);
    }
}
