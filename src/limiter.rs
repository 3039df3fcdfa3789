//! Per-field attempt limiting and timed lockout

use crate::models::{Field, Session};
use chrono::{DateTime, Duration, Utc};
use tracing::info;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_LOCKOUT_MINUTES: i64 = 30;

/// Result of recording one rejected input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Still below the limit; `attempt` is the 1-based failure count
    Retry { attempt: u32, max_attempts: u32 },
    /// Limit reached; the session is now locked
    Locked { until: DateTime<Utc> },
}

#[derive(Debug, Clone)]
pub struct AttemptLimiter {
    max_attempts: u32,
    lockout: Duration,
}

impl AttemptLimiter {
    pub fn new(max_attempts: u32, lockout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            lockout,
        }
    }

    pub fn lockout(&self) -> Duration {
        self.lockout
    }

    /// Zeroes the field's counter after a successful input.
    pub fn record_success(&self, session: &mut Session, field: Field) {
        session.set_attempts(field, 0);
    }

    /// Counts a rejected input and locks the session once the limit is hit.
    pub fn record_failure(
        &self,
        session: &mut Session,
        field: Field,
        now: DateTime<Utc>,
    ) -> AttemptOutcome {
        let attempt = session.attempts(field).saturating_add(1);
        session.set_attempts(field, attempt);

        if attempt >= self.max_attempts {
            let until = now + self.lockout;
            session.lock(until, now);
            info!(
                session_id = %session.session_id(),
                field = %field,
                attempt,
                locked_until = %until,
                "Attempt limit reached, session locked"
            );
            AttemptOutcome::Locked { until }
        } else {
            AttemptOutcome::Retry {
                attempt,
                max_attempts: self.max_attempts,
            }
        }
    }

    /// Lifts an expired lockout, resetting the counter of the field that caused it.
    pub fn release_expired(&self, session: &mut Session, field: Option<Field>, now: DateTime<Utc>) {
        if let Some(field) = field {
            session.set_attempts(field, 0);
        }
        session.unlock(now);
    }

    /// Whole minutes left on a lockout, rounded up and never below one.
    pub fn remaining_minutes(until: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
        let seconds = (until - now).num_seconds().max(0);
        ((seconds + 59) / 60).max(1)
    }
}

impl Default for AttemptLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, Duration::minutes(DEFAULT_LOCKOUT_MINUTES))
    }
}
