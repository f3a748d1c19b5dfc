//! Cadence scheduler
//!
//! A modular tick counter, not a cron. Fast roles are due every tick; slow
//! roles are due once every `ticks_per_slow_cycle` ticks. There is no
//! catch-up when a tick runs late, so wall-clock drift accumulates.

use crate::domain::Cadence;
use crate::error::{Result, StatBotError};

/// Which cadences are due on one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueSet {
    pub slow: bool,
}

impl DueSet {
    pub fn includes(&self, cadence: Cadence) -> bool {
        match cadence {
            Cadence::Fast => true,
            Cadence::Slow => self.slow,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CadenceScheduler {
    tick_count: u32,
    ticks_per_slow_cycle: u32,
}

impl CadenceScheduler {
    pub fn new(ticks_per_slow_cycle: u32) -> Result<Self> {
        if ticks_per_slow_cycle == 0 {
            return Err(StatBotError::Validation(
                "ticks_per_slow_cycle must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            tick_count: 0,
            ticks_per_slow_cycle,
        })
    }

    pub fn tick_count(&self) -> u32 {
        self.tick_count
    }

    pub fn ticks_per_slow_cycle(&self) -> u32 {
        self.ticks_per_slow_cycle
    }

    /// Advance by one tick and report what is due.
    ///
    /// The counter is incremented first; the tick on which it reaches
    /// `ticks_per_slow_cycle` has slow roles due and wraps it back to 0.
    pub fn advance(&mut self) -> DueSet {
        self.tick_count += 1;
        let slow = self.tick_count >= self.ticks_per_slow_cycle;
        if slow {
            self.tick_count = 0;
        }
        DueSet { slow }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slow_roles_due_every_third_tick() {
        let mut scheduler = CadenceScheduler::new(3).unwrap();
        let due: Vec<usize> = (1..=7)
            .filter(|_| scheduler.advance().slow)
            .collect();
        assert_eq!(due, vec![3, 6]);
    }

    #[test]
    fn test_counter_stays_in_bounds() {
        let mut scheduler = CadenceScheduler::new(4).unwrap();
        for _ in 0..20 {
            scheduler.advance();
            assert!(scheduler.tick_count() <= scheduler.ticks_per_slow_cycle());
        }
    }

    #[test]
    fn test_single_tick_cycle_is_always_slow() {
        let mut scheduler = CadenceScheduler::new(1).unwrap();
        assert!((0..5).all(|_| scheduler.advance().slow));
        assert_eq!(scheduler.tick_count(), 0);
    }

    #[test]
    fn test_fast_roles_always_due() {
        let mut scheduler = CadenceScheduler::new(96).unwrap();
        let due = scheduler.advance();
        assert!(due.includes(Cadence::Fast));
        assert!(!due.includes(Cadence::Slow));
    }

    #[test]
    fn test_zero_cycle_rejected() {
        assert!(CadenceScheduler::new(0).is_err());
    }
}
