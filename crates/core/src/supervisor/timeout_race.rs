use std::time::{Duration, Instant};

use crate::supervisor::domain::supervisor_event::Generation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// The configured timeout: expiry is a `Timeout` outcome.
    UserTimeout,
    /// Safety bound when no timeout is configured: expiry is a failure.
    HardCeiling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmedTimer {
    pub generation: Generation,
    pub deadline: Instant,
    pub duration: Duration,
    pub kind: TimerKind,
}

/// Deadline for the live request.
///
/// The control loop sleeps until [`TimeoutRace::deadline`]. An event queued
/// before the deadline beats the timer; one queued at or after it does not.
#[derive(Debug, Default)]
pub struct TimeoutRace {
    armed: Option<ArmedTimer>,
}

impl TimeoutRace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms a timer for `generation`, replacing any previous one. A zero
    /// duration arms nothing and returns `false`.
    pub fn arm(
        &mut self,
        generation: Generation,
        duration: Duration,
        kind: TimerKind,
        now: Instant,
    ) -> bool {
        if duration.is_zero() {
            return false;
        }
        self.armed = Some(ArmedTimer {
            generation,
            deadline: now + duration,
            duration,
            kind,
        });
        true
    }

    /// Cancels the pending timer, if any. Safe to call repeatedly.
    pub fn disarm(&mut self) -> Option<ArmedTimer> {
        self.armed.take()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.armed.map(|timer| timer.deadline)
    }

    /// Removes and returns the timer if it has expired at `now`.
    pub fn fire(&mut self, now: Instant) -> Option<ArmedTimer> {
        match self.armed {
            Some(timer) if timer.deadline <= now => self.armed.take(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Duration = Duration::from_secs(1);

    #[test]
    fn test_zero_duration_arms_nothing() {
        let mut race = TimeoutRace::new();
        assert!(!race.arm(1, Duration::ZERO, TimerKind::UserTimeout, Instant::now()));
        assert!(race.deadline().is_none());
    }

    #[test]
    fn test_fire_before_deadline_returns_none() {
        let now = Instant::now();
        let mut race = TimeoutRace::new();
        race.arm(1, 2 * SECOND, TimerKind::UserTimeout, now);

        assert!(race.fire(now + SECOND).is_none());
        assert_eq!(race.deadline(), Some(now + 2 * SECOND));
    }

    #[test]
    fn test_fire_at_deadline_takes_timer_once() {
        let now = Instant::now();
        let mut race = TimeoutRace::new();
        race.arm(7, 2 * SECOND, TimerKind::UserTimeout, now);

        let fired = race.fire(now + 2 * SECOND).unwrap();
        assert_eq!(fired.generation, 7);
        assert_eq!(fired.kind, TimerKind::UserTimeout);
        assert!(race.fire(now + 10 * SECOND).is_none());
    }

    #[test]
    fn test_disarm_is_idempotent() {
        let now = Instant::now();
        let mut race = TimeoutRace::new();
        race.arm(1, SECOND, TimerKind::HardCeiling, now);

        assert!(race.disarm().is_some());
        assert!(race.disarm().is_none());
        assert!(race.fire(now + 5 * SECOND).is_none());
    }

    #[test]
    fn test_rearm_replaces_previous_timer() {
        let now = Instant::now();
        let mut race = TimeoutRace::new();
        race.arm(1, SECOND, TimerKind::UserTimeout, now);
        race.arm(2, 3 * SECOND, TimerKind::UserTimeout, now);

        assert!(race.fire(now + 2 * SECOND).is_none());
        assert_eq!(race.fire(now + 3 * SECOND).unwrap().generation, 2);
    }
}
