//! Reconnection supervisor: keep processors registered until cancelled.

use std::convert::Infallible;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};

use kestrel_rpc::ReactiveClient;

use crate::config::ProcessingConfig;
use crate::connection::connect;
use crate::dispatcher::dispatch;
use crate::error::{FailureClass, ProcessingError};
use crate::processor::Processor;
use crate::registration::ProcessorId;
use crate::retry::RetryPolicy;
use crate::session::{SessionTransition, StreamSession};

const TRANSITION_CAPACITY: usize = 64;

/// Processor runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessorStats {
    pub attempts: u32,
    pub registrations: u32,
    pub requests_handled: u64,
    pub requests_failed: u64,
    pub last_failure: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct SharedStats(Arc<Mutex<ProcessorStats>>);

impl SharedStats {
    pub(crate) fn update(&self, f: impl FnOnce(&mut ProcessorStats)) {
        let mut stats = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut stats);
    }

    pub(crate) fn snapshot(&self) -> ProcessorStats {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Run `attempt` until it succeeds, is cancelled, fails fatally or exhausts
/// the retry policy.
///
/// - `Ok(Some(value))`: an attempt succeeded.
/// - `Ok(None)`: cancelled; not a failure.
/// - `Err(_)`: fatal failure, or the last transient failure once the policy
///   gave up.
///
/// Backoff restarts from the base delay after an attempt that registered.
pub(crate) async fn supervise<T, F, Fut>(
    policy: &RetryPolicy,
    cancellation: &CancellationToken,
    stats: &SharedStats,
    mut attempt: F,
) -> Result<Option<T>, ProcessingError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ProcessingError>>,
{
    let mut failures = 0u32;
    let mut number = 0u32;

    loop {
        if cancellation.is_cancelled() {
            return Ok(None);
        }

        number += 1;
        let registrations_before = stats.snapshot().registrations;
        stats.update(|s| s.attempts += 1);

        let err = match attempt(number).await {
            Ok(value) => return Ok(Some(value)),
            Err(err) => err,
        };

        if stats.snapshot().registrations > registrations_before {
            failures = 0;
        }
        failures += 1;

        match err.class() {
            FailureClass::Cancelled => {
                info!(attempt = number, "stopped");
                return Ok(None);
            }
            FailureClass::Fatal => {
                error!(attempt = number, error = %err, "giving up");
                stats.update(|s| s.last_failure = Some(err.to_string()));
                return Err(err);
            }
            FailureClass::Transient => {
                stats.update(|s| s.last_failure = Some(err.to_string()));
                if !policy.should_retry(failures) {
                    error!(attempt = number, failures, error = %err, "retries exhausted");
                    return Err(err);
                }

                let delay = policy.delay_for_attempt(failures);
                warn!(attempt = number, failures, delay_ms = delay.as_millis() as u64, error = %err, "retrying");

                tokio::select! {
                    _ = cancellation.cancelled() => return Ok(None),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

/// Handle to a running processor.
#[derive(Debug)]
pub struct ProcessorHandle {
    id: ProcessorId,
    cancellation: CancellationToken,
    stats: SharedStats,
    transitions: broadcast::Sender<SessionTransition>,
    join: JoinHandle<Result<(), ProcessingError>>,
}

impl ProcessorHandle {
    pub fn id(&self) -> ProcessorId {
        self.id
    }

    /// Request shutdown. Idempotent.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn stats(&self) -> ProcessorStats {
        self.stats.snapshot()
    }

    /// Session transitions from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionTransition> {
        self.transitions.subscribe()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the processor to stop. `Ok` when it was cancelled.
    pub async fn join(self) -> Result<(), ProcessingError> {
        self.join
            .await
            .map_err(|e| ProcessingError::TaskFailed(e.to_string()))?
    }

    /// Cancel and wait.
    pub async fn shutdown(self) -> Result<(), ProcessingError> {
        self.cancel();
        self.join().await
    }
}

/// Register `processor` and keep it registered until `cancellation` fires.
///
/// Spawns onto the current tokio runtime. The processor gets a child token,
/// so cancelling the handle leaves `cancellation` untouched.
pub fn register_processor<P: Processor>(
    client: ReactiveClient,
    processor: P,
    config: ProcessingConfig,
    cancellation: &CancellationToken,
) -> ProcessorHandle {
    let id = processor.registration().id();
    let cancellation = cancellation.child_token();
    let stats = SharedStats::default();
    let (transitions, _) = broadcast::channel(TRANSITION_CAPACITY);

    let span = info_span!("processor", kind = %id.kind(), processor_id = %id.uuid());
    let join = tokio::spawn(
        run_processor(
            client,
            Arc::new(processor),
            config,
            cancellation.clone(),
            stats.clone(),
            transitions.clone(),
        )
        .instrument(span),
    );

    ProcessorHandle {
        id,
        cancellation,
        stats,
        transitions,
        join,
    }
}

async fn run_processor<P: Processor>(
    client: ReactiveClient,
    processor: Arc<P>,
    config: ProcessingConfig,
    cancellation: CancellationToken,
    stats: SharedStats,
    transitions: broadcast::Sender<SessionTransition>,
) -> Result<(), ProcessingError> {
    let outcome = supervise(&config.retry_policy, &cancellation, &stats, |attempt| {
        let client = client.clone();
        let processor = processor.clone();
        let config = config.clone();
        let cancellation = cancellation.clone();
        let stats = stats.clone();
        let transitions = transitions.clone();

        async move {
            let mut session = StreamSession::new(attempt, transitions);
            let err = match connect(&client, processor.as_ref(), &config, &mut session, &cancellation).await {
                Ok(stream) => {
                    stats.update(|s| s.registrations += 1);
                    dispatch(processor, stream, &mut session, &config, &stats, &cancellation).await
                }
                Err(err) => err,
            };
            session.finish(&err);
            Err::<Infallible, _>(err)
        }
    })
    .await?;

    match outcome {
        None => Ok(()),
        Some(never) => match never {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::fixed(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let stats = SharedStats::default();
        let cancellation = CancellationToken::new();

        let result = supervise(&fast_policy(), &cancellation, &stats, |attempt| async move {
            if attempt < 3 {
                Err(ProcessingError::ConnectionClosed)
            } else {
                Ok(attempt)
            }
        })
        .await;

        assert_eq!(result, Ok(Some(3)));
        assert_eq!(stats.snapshot().attempts, 3);
    }

    #[tokio::test]
    async fn fatal_failures_stop_immediately() {
        let stats = SharedStats::default();

        let result: Result<Option<()>, _> =
            supervise(&fast_policy(), &CancellationToken::new(), &stats, |_| async {
                Err(ProcessingError::protocol("bad frame"))
            })
            .await;

        assert!(matches!(result, Err(ProcessingError::Protocol(_))));
        assert_eq!(stats.snapshot().attempts, 1);
        assert!(stats.snapshot().last_failure.unwrap().contains("bad frame"));
    }

    #[tokio::test]
    async fn exhausted_policies_return_the_last_failure() {
        let stats = SharedStats::default();
        let policy = fast_policy().with_max_attempts(2);

        let result: Result<Option<()>, _> =
            supervise(&policy, &CancellationToken::new(), &stats, |_| async {
                Err(ProcessingError::ConnectionClosed)
            })
            .await;

        assert_eq!(result, Err(ProcessingError::ConnectionClosed));
        assert_eq!(stats.snapshot().attempts, 2);
    }

    #[tokio::test]
    async fn cancellation_is_not_a_failure() {
        let stats = SharedStats::default();
        let cancellation = CancellationToken::new();
        let token = cancellation.clone();

        let result: Result<Option<()>, _> = supervise(&fast_policy(), &cancellation, &stats, |_| {
            let token = token.clone();
            async move {
                token.cancel();
                Err(ProcessingError::Cancelled)
            }
        })
        .await;

        assert_eq!(result, Ok(None));
        assert_eq!(stats.snapshot().last_failure, None);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_sleep_is_interrupted_by_cancellation() {
        let stats = SharedStats::default();
        let cancellation = CancellationToken::new();
        let policy = RetryPolicy::fixed(Duration::from_secs(3600));

        let canceller = {
            let cancellation = cancellation.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                cancellation.cancel();
            })
        };

        let result: Result<Option<()>, _> = supervise(&policy, &cancellation, &stats, |_| async {
            Err(ProcessingError::ConnectionClosed)
        })
        .await;

        assert_eq!(result, Ok(None));
        assert_eq!(stats.snapshot().attempts, 1);
        canceller.await.unwrap();
    }
}
