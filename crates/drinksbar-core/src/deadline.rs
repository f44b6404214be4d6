//! Deadline guard bounding the total time a service run may block.
//!
//! Accept and receive calls on both transports block until a peer shows
//! up. The guard is the only thing that can cut such a wait short: once
//! armed, any future run through [`DeadlineGuard::guard`] is dropped when
//! the deadline passes. Dropping the future drops the channel managers it
//! owns, so sockets are closed on expiry instead of leaking with the
//! process.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

/// Latest deadline the guard will install. Longer durations are clamped so
/// the deadline instant cannot overflow.
pub const MAX_DEADLINE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

/// The guarded work did not finish before the deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("deadline of {}s exceeded", .after.as_secs())]
pub struct DeadlineExceeded {
    /// The duration the guard was armed with.
    pub after: Duration,
}

/// Process-lifetime watchdog for one service run.
#[derive(Debug, Default)]
pub struct DeadlineGuard {
    armed: Option<(Instant, Duration)>,
}

impl DeadlineGuard {
    /// A guard that never fires.
    pub fn disarmed() -> Self {
        Self::default()
    }

    /// Arm the guard `duration` from now.
    ///
    /// A zero duration does nothing. Arming again replaces the previous
    /// deadline. Durations beyond [`MAX_DEADLINE`] fire at `MAX_DEADLINE`.
    pub fn arm(&mut self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        match Instant::now().checked_add(duration.min(MAX_DEADLINE)) {
            Some(at) => {
                debug!(secs = duration.as_secs_f64(), "Deadline guard armed");
                self.armed = Some((at, duration));
            }
            None => warn!(
                secs = duration.as_secs_f64(),
                "Deadline out of clock range, guard not armed"
            ),
        }
    }

    /// Whether a deadline is installed.
    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Time left before the guard fires, `None` when disarmed.
    pub fn remaining(&self) -> Option<Duration> {
        self.armed
            .map(|(at, _)| at.saturating_duration_since(Instant::now()))
    }

    /// Drive `fut` to completion unless the deadline passes first.
    pub async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, DeadlineExceeded> {
        match self.armed {
            None => Ok(fut.await),
            Some((at, after)) => tokio::time::timeout_at(at, fut)
                .await
                .map_err(|_| DeadlineExceeded { after }),
        }
    }
}
