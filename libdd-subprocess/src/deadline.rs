// Copyright 2026-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::{Duration, Instant};

/// Bound on how long a blocking operation may wait before failing with
/// [`crate::ErrorKind::Timeout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Deadline {
    /// Block until the operation completes.
    #[default]
    Infinite,
    /// Poll once: fail immediately if the operation cannot complete right away.
    Immediate,
    /// Block for at most the given duration.
    After(Duration),
}

impl Deadline {
    pub fn from_millis(millis: u64) -> Self {
        Duration::from_millis(millis).into()
    }

    pub fn from_secs(secs: u64) -> Self {
        Duration::from_secs(secs).into()
    }
}

impl From<Duration> for Deadline {
    fn from(duration: Duration) -> Self {
        if duration.is_zero() {
            Deadline::Immediate
        } else {
            Deadline::After(duration)
        }
    }
}

impl From<Option<Duration>> for Deadline {
    fn from(duration: Option<Duration>) -> Self {
        duration.map_or(Deadline::Infinite, Deadline::from)
    }
}

/// Tracks a [`Deadline`] across several syscalls, so that retries after
/// `EINTR` or partial progress never extend the caller's budget.
pub(crate) struct TimeoutManager {
    start_time: Instant,
    // None when the deadline is infinite (or too far away to represent)
    expires_at: Option<Instant>,
}

impl TimeoutManager {
    pub(crate) fn new(deadline: Deadline) -> Self {
        let start_time = Instant::now();
        let expires_at = match deadline {
            Deadline::Infinite => None,
            Deadline::Immediate => Some(start_time),
            Deadline::After(duration) => start_time.checked_add(duration),
        };
        Self {
            start_time,
            expires_at,
        }
    }

    /// Time left before expiry, `None` if the deadline is infinite.
    pub(crate) fn remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|expires_at| expires_at.saturating_duration_since(Instant::now()))
    }

    pub(crate) fn is_expired(&self) -> bool {
        self.remaining().is_some_and(|remaining| remaining.is_zero())
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// What is left of the budget, expressed as a new deadline for a nested call.
    pub(crate) fn remaining_deadline(&self) -> Deadline {
        match self.remaining() {
            None => Deadline::Infinite,
            Some(remaining) => remaining.into(),
        }
    }

    /// Remaining time in milliseconds as expected by `poll(2)`: `-1` blocks forever.
    ///
    /// Rounds up, a sub-millisecond remainder must not turn into a zero timeout
    /// that would spin until the deadline is reached.
    #[cfg(unix)]
    pub(crate) fn remaining_poll_millis(&self) -> i32 {
        match self.remaining() {
            None => -1,
            Some(remaining) => ceil_millis(remaining).min(i32::MAX as u128) as i32,
        }
    }

    /// Remaining time in milliseconds as expected by `WaitForSingleObject`.
    #[cfg(windows)]
    pub(crate) fn remaining_wait_millis(&self) -> u32 {
        use windows_sys::Win32::System::Threading::INFINITE;
        match self.remaining() {
            None => INFINITE,
            Some(remaining) => ceil_millis(remaining).min((INFINITE - 1) as u128) as u32,
        }
    }
}

fn ceil_millis(duration: Duration) -> u128 {
    let millis = duration.as_millis();
    if duration.subsec_nanos() % 1_000_000 != 0 {
        millis + 1
    } else {
        millis
    }
}

impl std::fmt::Debug for TimeoutManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeoutManager")
            .field("start_time", &self.start_time)
            .field("elapsed", &self.elapsed())
            .field("remaining", &self.remaining())
            .finish()
    }
}
