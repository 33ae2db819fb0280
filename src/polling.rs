//! Bounded readiness polling.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// How often to poll and how long to wait before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(15 * 60),
        }
    }
}

/// Why [`PollPolicy::wait_until`] stopped without a value.
#[derive(Debug)]
pub enum PollError<E> {
    /// The probe itself failed.
    Probe(E),
    /// The probe kept answering "not yet" until the timeout.
    TimedOut { attempts: u32, elapsed: Duration },
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Calls `probe` until it yields `Some`, sleeping `interval` between attempts.
    ///
    /// The probe runs at least once. A probe error stops polling immediately.
    pub async fn wait_until<T, E, F, Fut>(&self, mut probe: F) -> Result<T, PollError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let started = Instant::now();
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            if let Some(value) = probe().await.map_err(PollError::Probe)? {
                return Ok(value);
            }
            let elapsed = started.elapsed();
            if elapsed + self.interval > self.timeout {
                return Err(PollError::TimedOut { attempts, elapsed });
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}
