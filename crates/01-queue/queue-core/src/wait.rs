//! Timeout helpers shared by the blocking queue primitives.
//!
//! Every blocking operation accepts an `Option<Duration>`: `None` waits
//! forever, `Some(Duration::ZERO)` makes a single attempt, and any other value
//! bounds the wait. [`Deadline`] converts that into an absolute instant once,
//! so retries after spurious wakeups or `EINTR` never extend the caller's
//! budget.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Absolute deadline derived from a three-valued timeout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Deadline {
    /// Wait indefinitely.
    Never,
    /// Give up once this instant has passed.
    At(Instant),
}

impl Deadline {
    /// Starts the clock for `timeout`.
    pub fn after(timeout: Option<Duration>) -> Self {
        match timeout {
            None => Deadline::Never,
            Some(timeout) => match Instant::now().checked_add(timeout) {
                Some(at) => Deadline::At(at),
                None => Deadline::Never,
            },
        }
    }

    /// Time left before expiry; `None` for [`Deadline::Never`].
    pub fn remaining(&self) -> Option<Duration> {
        match self {
            Deadline::Never => None,
            Deadline::At(at) => Some(at.saturating_duration_since(Instant::now())),
        }
    }

    pub fn expired(&self) -> bool {
        match self {
            Deadline::Never => false,
            Deadline::At(at) => Instant::now() >= *at,
        }
    }

    /// Instant to hand to `Condvar::wait_until`, if bounded.
    pub fn instant(&self) -> Option<Instant> {
        match self {
            Deadline::Never => None,
            Deadline::At(at) => Some(*at),
        }
    }

    /// Absolute wall-clock deadline, as required by the `mq_timed*` calls.
    ///
    /// `CLOCK_REALTIME` is what POSIX message queues measure against, so the
    /// remaining monotonic budget is re-anchored on `SystemTime::now()`.
    pub fn wall_clock(&self) -> Option<Duration> {
        let remaining = self.remaining()?;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        Some(now.saturating_add(remaining))
    }
}

/// Converts a timeout in fractional seconds (the wire representation) into a
/// [`Duration`]. Negative and non-finite values collapse to a single attempt.
pub fn timeout_from_secs(secs: Option<f64>) -> Option<Duration> {
    secs.map(|secs| {
        if secs.is_finite() && secs > 0.0 {
            Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        }
    })
}

/// Inverse of [`timeout_from_secs`].
pub fn timeout_to_secs(timeout: Option<Duration>) -> Option<f64> {
    timeout.map(|timeout| timeout.as_secs_f64())
}
