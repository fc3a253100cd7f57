//! Bounded-deadline retry wrapper around every cluster call.
//!
//! The executor owns the one session to the cluster (connected lazily, once)
//! and runs each operation through a small state machine:
//!
//! ```text
//! Attempting --ok--> Succeeded
//! Attempting --NoHostAvailable, time left--> Waiting(delay) --slept--> Attempting
//! Attempting --NoHostAvailable, deadline hit | other error--> FailedTerminal
//! Waiting / Attempting --cancelled--> FailedTerminal(Cancelled)
//! ```
//!
//! The deadline is measured from the start of each call, and every call
//! draws a fresh backoff schedule from the client's reconnection policy.
//!
//! Cancellation is scoped to the calls in flight when it fires. Cancelling
//! the token from [`ResilientExecutor::cancellation_token`] fails those calls
//! with `Cancelled`; the next call starts under a fresh token. Cancelling the
//! parent token given to [`ResilientExecutor::with_cancellation`] shuts the
//! executor down for good.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::OnceCell;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::{ClusterClient, ClusterSession};
use crate::error::{ClusterError, Result, SessionError};
use crate::reconnection::ReconnectionSchedule;

/// Runs cluster operations against a lazily-connected shared session.
pub struct ResilientExecutor {
    client: Arc<dyn ClusterClient>,
    session: OnceCell<Arc<dyn ClusterSession>>,
    retry_timeout: Duration,
    shutdown: CancellationToken,
    in_flight: Mutex<CancellationToken>,
}

/// Retry loop state for one executor call.
enum RetryState<T> {
    Attempting,
    Waiting(Duration),
    Succeeded(T),
    FailedTerminal(SessionError),
}

impl ResilientExecutor {
    pub fn new(client: Arc<dyn ClusterClient>, retry_timeout: Duration) -> Self {
        Self::with_cancellation(client, retry_timeout, CancellationToken::new())
    }

    /// Builds an executor that stops serving calls once `shutdown` fires.
    pub fn with_cancellation(
        client: Arc<dyn ClusterClient>,
        retry_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        let in_flight = Mutex::new(shutdown.child_token());
        Self {
            client,
            session: OnceCell::new(),
            retry_timeout,
            shutdown,
            in_flight,
        }
    }

    /// Token covering the calls currently in flight. Calls started after it
    /// has been cancelled are not affected.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.call_token()
    }

    /// Returns `true` once the shared session has been established.
    pub fn is_connected(&self) -> bool {
        self.session.initialized()
    }

    /// Returns the shared session, connecting through the retry loop on first
    /// use.
    pub async fn session(&self) -> Result<Arc<dyn ClusterSession>> {
        self.run(|session| async move { Ok(session) }).await
    }

    /// Runs `op` against the shared session, retrying total-unavailability
    /// failures until the per-call deadline.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        T: Send,
        F: FnMut(Arc<dyn ClusterSession>) -> Fut + Send,
        Fut: Future<Output = std::result::Result<T, ClusterError>> + Send,
    {
        let cancel = self.call_token();
        let mut schedule = self.client.reconnection_policy().new_schedule();
        let deadline = Instant::now() + self.retry_timeout;
        let mut state = RetryState::Attempting;
        loop {
            state = match state {
                RetryState::Attempting => {
                    let attempt = async {
                        let session = self.connected_session().await?;
                        op(session).await
                    };
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            RetryState::FailedTerminal(SessionError::Cancelled)
                        }
                        outcome = attempt => next_state(outcome, deadline, schedule.as_mut()),
                    }
                }
                RetryState::Waiting(delay) => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            RetryState::FailedTerminal(SessionError::Cancelled)
                        }
                        _ = tokio::time::sleep(delay) => RetryState::Attempting,
                    }
                }
                RetryState::Succeeded(value) => return Ok(value),
                RetryState::FailedTerminal(err) => return Err(err),
            };
        }
    }

    /// Current in-flight token, replaced by a fresh one once cancelled.
    fn call_token(&self) -> CancellationToken {
        let mut current = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        if current.is_cancelled() && !self.shutdown.is_cancelled() {
            *current = self.shutdown.child_token();
        }
        current.clone()
    }

    async fn connected_session(&self) -> std::result::Result<Arc<dyn ClusterSession>, ClusterError> {
        self.session
            .get_or_try_init(|| async {
                debug!("connecting cluster session");
                self.client.connect().await
            })
            .await
            .map(Arc::clone)
    }
}

/// Classifies one attempt outcome.
fn next_state<T>(
    outcome: std::result::Result<T, ClusterError>,
    deadline: Instant,
    schedule: &mut dyn ReconnectionSchedule,
) -> RetryState<T> {
    match outcome {
        Ok(value) => RetryState::Succeeded(value),
        Err(ClusterError::NoHostAvailable(diagnostic)) => {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return RetryState::FailedTerminal(SessionError::Unavailable(diagnostic));
            }
            let delay = schedule.next_delay().min(remaining);
            warn!(
                error = %diagnostic,
                delay_ms = delay.as_millis() as u64,
                "no cluster host available; reconnecting"
            );
            RetryState::Waiting(delay)
        }
        Err(err) => RetryState::FailedTerminal(SessionError::Cluster(err)),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::memory::InMemoryCluster;
    use crate::reconnection::ConstantReconnectionPolicy;

    fn cluster_with_delay(delay_ms: u64) -> InMemoryCluster {
        InMemoryCluster::new().with_reconnection_policy(Arc::new(
            ConstantReconnectionPolicy::new(Duration::from_millis(delay_ms)),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_fails_at_deadline_after_retrying() {
        let cluster = cluster_with_delay(50);
        let executor = ResilientExecutor::new(Arc::new(cluster), Duration::from_millis(200));
        let attempts = AtomicUsize::new(0);

        let started = Instant::now();
        let err = executor
            .run(|_session| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(ClusterError::NoHostAvailable("all hosts down".into())) }
            })
            .await
            .expect_err("deadline exceeded");

        assert!(matches!(err, SessionError::Unavailable(ref msg) if msg == "all hosts down"));
        assert!(started.elapsed() <= Duration::from_millis(200));
        assert!(attempts.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_unavailability_is_invisible_to_caller() {
        let executor = ResilientExecutor::new(
            Arc::new(cluster_with_delay(10)),
            Duration::from_millis(200),
        );
        let attempts = AtomicUsize::new(0);

        let value = executor
            .run(|_session| {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 {
                        Err(ClusterError::NoHostAvailable("restarting".into()))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await
            .expect("second attempt succeeds");

        assert_eq!(value, 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn other_errors_are_not_retried() {
        let executor = ResilientExecutor::new(
            Arc::new(cluster_with_delay(10)),
            Duration::from_secs(5),
        );
        let attempts = AtomicUsize::new(0);

        let err = executor
            .run(|_session| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(ClusterError::Query("syntax error".into())) }
            })
            .await
            .expect_err("query error");

        assert!(matches!(
            err,
            SessionError::Cluster(ClusterError::Query(ref msg)) if msg == "syntax error"
        ));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_aborts_retry_wait() {
        let executor = Arc::new(ResilientExecutor::new(
            Arc::new(cluster_with_delay(1_000)),
            Duration::from_secs(60),
        ));
        let token = executor.cancellation_token();

        let task = {
            let executor = executor.clone();
            tokio::spawn(async move {
                executor
                    .run(|_session| async {
                        Err::<(), _>(ClusterError::NoHostAvailable("down".into()))
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();

        let err = task.await.expect("join").expect_err("cancelled");
        assert!(matches!(err, SessionError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn calls_after_a_cancellation_run_normally() {
        let executor = ResilientExecutor::new(
            Arc::new(cluster_with_delay(10)),
            Duration::from_secs(1),
        );
        executor.cancellation_token().cancel();

        let partitioner = executor
            .run(|session| async move { session.partitioner().await })
            .await
            .expect("fresh call is not cancelled");
        assert_eq!(partitioner, crate::memory::MURMUR3_PARTITIONER);
        assert!(!executor.cancellation_token().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_token_fails_every_later_call() {
        let shutdown = CancellationToken::new();
        let executor = ResilientExecutor::with_cancellation(
            Arc::new(cluster_with_delay(10)),
            Duration::from_secs(1),
            shutdown.clone(),
        );
        shutdown.cancel();

        for _ in 0..2 {
            let err = executor
                .run(|session| async move { session.partitioner().await })
                .await
                .expect_err("shut down");
            assert!(matches!(err, SessionError::Cancelled));
        }
        assert!(!executor.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn connect_failures_are_retried_like_operations() {
        let cluster = cluster_with_delay(10);
        cluster.fail_next_connects_with_no_host(2);
        let connects = cluster.connect_count_handle();
        let executor = ResilientExecutor::new(Arc::new(cluster), Duration::from_secs(1));

        executor.session().await.expect("connects on third try");
        assert!(executor.is_connected());
        assert_eq!(connects.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn session_is_connected_once_under_concurrent_first_use() {
        let cluster = cluster_with_delay(10);
        let connects = cluster.connect_count_handle();
        let executor = Arc::new(ResilientExecutor::new(
            Arc::new(cluster),
            Duration::from_secs(1),
        ));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let executor = executor.clone();
            tasks.push(tokio::spawn(async move {
                executor
                    .run(|session| async move { session.partitioner().await })
                    .await
            }));
        }
        for task in tasks {
            task.await.expect("join").expect("partitioner");
        }
        assert_eq!(connects.load(Ordering::SeqCst), 1);
    }
}
