//! Time source and the poll/backoff state shared by every loop.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Wall clock plus sleep. Loops take one of these instead of calling tokio
/// directly so tests can run many cycles without waiting.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Outcome of one step of a polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// Step again right away.
    Poll,
    /// Wait this long, then step again.
    Backoff(Duration),
    /// Nothing left to do.
    Done,
}

impl PollState {
    /// Sleep on `clock` if this is a backoff. Returns `false` once done.
    pub async fn wait(self, clock: &dyn Clock) -> bool {
        match self {
            PollState::Poll => true,
            PollState::Backoff(duration) => {
                clock.sleep(duration).await;
                true
            }
            PollState::Done => false,
        }
    }
}
