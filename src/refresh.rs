use crate::error::{DashError, SourceError};
use std::future::Future;
use tokio::time::{Duration, Instant, timeout};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Skipped,
    Updated,
    Failed,
}

/// Polling state for one data class.
///
/// The snapshot is replaced only by a successful fetch. Failures still stamp
/// `last_run_at`, so retries are spaced by the full interval.
#[derive(Debug)]
pub struct PollSession<T> {
    class: &'static str,
    interval: Duration,
    call_timeout: Duration,
    last_run_at: Option<Instant>,
    snapshot: Option<T>,
    consecutive_failures: u32,
    last_error: Option<String>,
}

impl<T> PollSession<T> {
    pub fn new(class: &'static str, interval: Duration, call_timeout: Duration) -> Self {
        Self {
            class,
            interval,
            call_timeout,
            last_run_at: None,
            snapshot: None,
            consecutive_failures: 0,
            last_error: None,
        }
    }

    pub fn class(&self) -> &'static str {
        self.class
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.last_run_at
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval)
    }

    /// Makes the next `run` fetch regardless of the interval.
    pub fn force_due(&mut self) {
        self.last_run_at = None;
    }

    pub fn snapshot(&self) -> Option<&T> {
        self.snapshot.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn record_success(&mut self, now: Instant, value: T) {
        self.last_run_at = Some(now);
        self.snapshot = Some(value);
        if self.consecutive_failures > 0 {
            debug!(class = self.class, "poll recovered");
        }
        self.consecutive_failures = 0;
        self.last_error = None;
    }

    pub fn record_failure(&mut self, now: Instant, error: SourceError) {
        self.last_run_at = Some(now);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let error = DashError::TransientFetch {
            class: self.class,
            source: error,
        };
        warn!(failures = self.consecutive_failures, "{error}");
        self.last_error = Some(error.to_string());
    }

    /// Runs `fetch` if the session is due, bounded by the call timeout.
    pub async fn run<F, Fut>(&mut self, now: Instant, fetch: F) -> PollOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        if !self.is_due(now) {
            return PollOutcome::Skipped;
        }

        match timeout(self.call_timeout, fetch()).await {
            Ok(Ok(value)) => {
                self.record_success(now, value);
                PollOutcome::Updated
            }
            Ok(Err(error)) => {
                self.record_failure(now, error);
                PollOutcome::Failed
            }
            Err(_) => {
                self.record_failure(now, SourceError::Timeout(self.call_timeout));
                PollOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{PollOutcome, PollSession};
    use crate::error::SourceError;
    use std::cell::Cell;
    use tokio::time::{Duration, Instant};

    fn failure() -> SourceError {
        SourceError::Transport {
            endpoint: "vms".to_string(),
            message: "connection refused".to_string(),
        }
    }

    #[tokio::test]
    async fn failed_polls_keep_snapshot_and_wait_an_interval() {
        let interval = Duration::from_secs(1);
        let mut session = PollSession::new("vm status", interval, Duration::from_secs(1));
        let calls = Cell::new(0usize);
        let start = Instant::now();

        let outcome = session
            .run(start, || async {
                calls.set(calls.get() + 1);
                Ok(vec!["web-01"])
            })
            .await;
        assert_eq!(outcome, PollOutcome::Updated);

        let mut now = start;
        for attempt in 1..=3u32 {
            let early = now + interval / 2;
            let outcome = session
                .run(early, || async {
                    calls.set(calls.get() + 1);
                    Err(failure())
                })
                .await;
            assert_eq!(outcome, PollOutcome::Skipped);

            now += interval;
            let outcome = session
                .run(now, || async {
                    calls.set(calls.get() + 1);
                    Err(failure())
                })
                .await;
            assert_eq!(outcome, PollOutcome::Failed);
            assert_eq!(session.consecutive_failures(), attempt);
            assert_eq!(session.snapshot(), Some(&vec!["web-01"]));
        }

        assert_eq!(calls.get(), 4);
        assert!(
            session
                .last_error()
                .is_some_and(|error| error.contains("vm status refresh failed"))
        );
    }

    #[tokio::test]
    async fn success_after_failures_resets_counter() {
        let mut session = PollSession::new("hosts", Duration::from_secs(1), Duration::from_secs(1));
        let start = Instant::now();
        session.run(start, || async { Err::<u8, _>(failure()) }).await;
        assert_eq!(session.snapshot(), None);

        let later = start + Duration::from_secs(1);
        assert_eq!(
            session.run(later, || async { Ok(7u8) }).await,
            PollOutcome::Updated
        );
        assert_eq!(session.consecutive_failures(), 0);
        assert_eq!(session.last_error(), None);
        assert_eq!(session.snapshot(), Some(&7));
    }

    #[tokio::test]
    async fn force_due_bypasses_interval() {
        let mut session =
            PollSession::new("events", Duration::from_secs(60), Duration::from_secs(1));
        let start = Instant::now();
        session.run(start, || async { Ok(1u8) }).await;
        assert!(!session.is_due(start));
        session.force_due();
        assert!(session.is_due(start));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetch_times_out_as_failure() {
        let mut session =
            PollSession::new("hosts", Duration::from_secs(1), Duration::from_millis(200));
        let outcome = session
            .run(Instant::now(), || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(1u8)
            })
            .await;
        assert_eq!(outcome, PollOutcome::Failed);
        assert!(
            session
                .last_error()
                .is_some_and(|error| error.contains("timed out after 200ms"))
        );
    }
}
