//! Injectable time source.
//!
//! The retry controller and the workflow/step timeout enforcers read time
//! only through this trait, never `std::time::Instant::now()` or
//! `chrono::Utc::now()` directly, so tests can fast-forward deterministically
//! (see `crate::testing::FakeClock`).

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// A source of wall-clock time and sleep.
///
/// Uses RPITIT (return-position `impl Trait` in traits) for the async
/// method, matching the collaborator traits throughout this crate.
pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;

    /// Suspend the caller for `duration`.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

/// The default `Clock`, delegating to the system clock and `tokio::time`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
