//! The resilient upstream client.
//!
//! Every fetch goes breaker first, then retry-with-backoff around the source.
//! The whole retried call counts as one success or one failure for the
//! breaker. Fetches are serialized: at most one is in flight at a time.
//! A fetch that ends without an outcome (the source panicked, or the future
//! was dropped mid-call) is recorded as a failure.

use std::sync::Arc;

use flood_core::DetectionEvent;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::breaker::{BreakerState, CircuitBreaker};
use crate::error::{Result, UpstreamError};
use crate::retry::{RetryPolicy, retry_with_backoff};
use crate::source::EventSource;

/// Reports a failure to the breaker unless the call settled first.
struct PendingOutcome<'a> {
    breaker: &'a CircuitBreaker,
    settled: bool,
}

impl<'a> PendingOutcome<'a> {
    const fn new(breaker: &'a CircuitBreaker) -> Self {
        Self {
            breaker,
            settled: false,
        }
    }

    fn success(mut self) {
        self.settled = true;
        self.breaker.record_success();
    }

    fn failure(mut self) {
        self.settled = true;
        self.breaker.record_failure();
    }
}

impl Drop for PendingOutcome<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!("upstream fetch ended without an outcome, counting it as a failure");
            self.breaker.record_failure();
        }
    }
}

/// Breaker-guarded, retrying access to an [`EventSource`].
#[derive(Debug)]
pub struct UpstreamClient {
    source: Arc<dyn EventSource>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    in_flight: Mutex<()>,
}

impl UpstreamClient {
    /// Creates a client.
    #[must_use]
    pub fn new(source: Arc<dyn EventSource>, breaker: Arc<CircuitBreaker>, retry: RetryPolicy) -> Self {
        Self {
            source,
            breaker,
            retry,
            in_flight: Mutex::new(()),
        }
    }

    /// Returns the breaker.
    #[must_use]
    pub const fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Returns the retry policy.
    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Returns the breaker state.
    #[must_use]
    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }

    /// Fetches active events.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError::BreakerOpen` without touching the network when
    /// the breaker is open, otherwise the error of the last attempt.
    pub async fn fetch_events(&self) -> Result<Vec<DetectionEvent>> {
        let _guard = self.in_flight.lock().await;

        let admission = match self.breaker.try_acquire() {
            Ok(admission) => admission,
            Err(e) => {
                debug!(error = %e, "upstream fetch short-circuited");
                return Err(e);
            }
        };

        let pending = PendingOutcome::new(&self.breaker);
        let source = &*self.source;
        match retry_with_backoff(&self.retry, || source.fetch_active_events()).await {
            Ok(events) => {
                pending.success();
                debug!(count = events.len(), ?admission, "upstream fetch succeeded");
                Ok(events)
            }
            Err(e) => {
                pending.failure();
                warn!(
                    error = %e,
                    retryable = e.is_retryable(),
                    breaker = %self.breaker.state(),
                    "upstream fetch failed"
                );
                Err(e)
            }
        }
    }

    /// Checks the upstream service is reachable.
    ///
    /// Probes bypass the breaker and do not affect it.
    ///
    /// # Errors
    ///
    /// Returns the source's error, or `UpstreamError::Timeout`.
    pub async fn ping(&self) -> Result<()> {
        match timeout(self.retry.attempt_timeout, self.source.ping()).await {
            Ok(result) => result,
            Err(_) => Err(UpstreamError::Timeout {
                timeout_ms: self.retry.attempt_timeout.as_millis() as u64,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerConfig;
    use crate::source::SourceFuture;
    use chrono::Utc;
    use flood_core::ManualClock;
    use parking_lot::Mutex as SyncMutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct ScriptedSource {
        responses: SyncMutex<VecDeque<Result<Vec<DetectionEvent>>>>,
        calls: AtomicU32,
        panic_next: AtomicBool,
    }

    impl ScriptedSource {
        fn push(&self, response: Result<Vec<DetectionEvent>>) {
            self.responses.lock().push_back(response);
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl EventSource for ScriptedSource {
        fn fetch_active_events(&self) -> SourceFuture<'_, Vec<DetectionEvent>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(
                !self.panic_next.swap(false, Ordering::SeqCst),
                "source blew up"
            );
            let response = self.responses.lock().pop_front().unwrap_or_else(|| Ok(Vec::new()));
            Box::pin(async move { response })
        }

        fn ping(&self) -> SourceFuture<'_, ()> {
            Box::pin(async { Ok(()) })
        }
    }

    fn client() -> (UpstreamClient, Arc<ScriptedSource>, ManualClock) {
        let clock = ManualClock::new(Utc::now());
        let source = Arc::new(ScriptedSource::default());
        let breaker = Arc::new(CircuitBreaker::with_clock(
            BreakerConfig::default(),
            Arc::new(clock.clone()),
        ));
        let client = UpstreamClient::new(
            source.clone(),
            breaker,
            RetryPolicy::default().with_base_delay(Duration::from_millis(10)),
        );
        (client, source, clock)
    }

    fn event(id: &str) -> DetectionEvent {
        DetectionEvent::new(id, "203.0.113.5", Utc::now())
    }

    #[tokio::test(start_paused = true)]
    async fn successful_fetch() {
        let (client, source, _) = client();
        source.push(Ok(vec![event("evt-1")]));

        let events = client.fetch_events().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(source.calls(), 1);
        assert_eq!(client.breaker_state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_recovered_within_call_counts_as_success() {
        let (client, source, _) = client();
        source.push(Err(UpstreamError::Status { code: 502 }));
        source.push(Ok(vec![event("evt-1")]));

        assert!(client.fetch_events().await.is_ok());
        assert_eq!(source.calls(), 2);
        assert_eq!(client.breaker().snapshot().consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_counts_once_without_retry() {
        let (client, source, _) = client();
        source.push(Err(UpstreamError::Status { code: 403 }));

        assert!(client.fetch_events().await.is_err());
        assert_eq!(source.calls(), 1);
        assert_eq!(client.breaker().snapshot().consecutive_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_response_is_not_retried() {
        let (client, source, _) = client();
        source.push(Err(UpstreamError::Status { code: 429 }));
        source.push(Ok(vec![event("evt-1")]));

        let err = client.fetch_events().await.unwrap_err();
        assert!(matches!(err, UpstreamError::Status { code: 429 }));
        assert_eq!(source.calls(), 1);
        assert_eq!(client.breaker().snapshot().consecutive_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn breaker_opens_and_blocks_network() {
        let (client, source, clock) = client();
        for _ in 0..5 {
            source.push(Err(UpstreamError::Malformed {
                reason: "truncated".into(),
            }));
        }

        for _ in 0..5 {
            assert!(client.fetch_events().await.is_err());
        }
        assert_eq!(client.breaker_state(), BreakerState::Open);
        assert_eq!(source.calls(), 5);

        clock.advance(chrono::Duration::minutes(1));
        let err = client.fetch_events().await.unwrap_err();
        assert!(err.is_breaker_open());
        assert_eq!(source.calls(), 5);

        clock.advance(chrono::Duration::minutes(4));
        source.push(Ok(vec![event("evt-1")]));
        assert!(client.fetch_events().await.is_ok());
        assert_eq!(source.calls(), 6);
        assert_eq!(client.breaker_state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_trial_reopens_breaker() {
        let (client, source, clock) = client();
        let client = Arc::new(client);
        for _ in 0..5 {
            source.push(Err(UpstreamError::Status { code: 404 }));
            assert!(client.fetch_events().await.is_err());
        }
        assert_eq!(client.breaker_state(), BreakerState::Open);

        clock.advance(chrono::Duration::minutes(5));
        source.panic_next.store(true, Ordering::SeqCst);
        let trial = tokio::spawn({
            let client = client.clone();
            async move { client.fetch_events().await }
        });
        assert!(trial.await.unwrap_err().is_panic());
        assert_eq!(client.breaker_state(), BreakerState::Open);

        clock.advance(chrono::Duration::minutes(5));
        source.push(Ok(vec![event("evt-1")]));
        assert_eq!(client.fetch_events().await.unwrap().len(), 1);
        assert_eq!(client.breaker_state(), BreakerState::Closed);
        assert_eq!(source.calls(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_fetch_counts_as_failure() {
        let (client, source, _) = client();
        source.push(Err(UpstreamError::Status { code: 503 }));

        // The first attempt fails and the retry backoff is pending when the
        // future is dropped.
        let fetch = client.fetch_events();
        assert!(
            tokio::time::timeout(Duration::from_millis(1), fetch)
                .await
                .is_err()
        );

        assert_eq!(client.breaker().snapshot().consecutive_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ping_does_not_touch_breaker() {
        let (client, _, _) = client();
        assert!(client.ping().await.is_ok());
        assert_eq!(client.breaker().snapshot().consecutive_failures, 0);
    }
}
