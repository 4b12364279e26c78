//! Processing dispatcher: serve requests on a registered stream.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, trace, warn};

use crate::config::ProcessingConfig;
use crate::connection::RegisteredStream;
use crate::error::{ProcessingError, RequestFailure};
use crate::processor::{Processor, RequestContext};
use crate::protocol::{
    CallId, ClientMessage, Processed, ProcessingRequest, ProcessorFailure, RuntimeMessage,
};
use crate::session::{SessionState, StreamSession};
use crate::supervisor::SharedStats;

type InFlight<P> = BoxFuture<
    'static,
    (
        CallId,
        Result<<P as Processor>::Outcome, RequestFailure>,
    ),
>;

/// Serve a registered stream until it fails, ends or is cancelled.
///
/// Reading, handling and writing overlap: handler futures run concurrently
/// with the read loop and responses go out as soon as their handler is done,
/// correlated by call id rather than by order.
///
/// Never returns normally; the returned error says why the stream stopped.
#[instrument(
    skip_all,
    fields(
        kind = %processor.registration().kind(),
        processor_id = %processor.registration().id().uuid(),
        attempt = session.attempt(),
    )
)]
pub async fn dispatch<P: Processor>(
    processor: Arc<P>,
    stream: RegisteredStream<P>,
    session: &mut StreamSession,
    config: &ProcessingConfig,
    stats: &SharedStats,
    cancellation: &CancellationToken,
) -> ProcessingError {
    let RegisteredStream {
        outbound,
        mut inbound,
    } = stream;
    session.advance(SessionState::Processing);

    let ping_timeout = config.ping_timeout();
    let mut deadline = Instant::now() + ping_timeout;
    let mut in_flight: FuturesUnordered<InFlight<P>> = FuturesUnordered::new();

    loop {
        tokio::select! {
            biased;

            _ = cancellation.cancelled() => return ProcessingError::Cancelled,

            Some((call_id, result)) = in_flight.next(), if !in_flight.is_empty() => {
                let response = match into_response::<P>(processor.as_ref(), call_id, result) {
                    Ok(response) => response,
                    Err(fatal) => return fatal,
                };
                stats.update(|s| {
                    if response.is_success() {
                        s.requests_handled += 1;
                    } else {
                        s.requests_failed += 1;
                    }
                });
                if let Err(err) = send(&outbound, ClientMessage::Response { call_id, response }) {
                    return err;
                }
            }

            _ = sleep_until(deadline) => {
                warn!(timeout = ?ping_timeout, "runtime went silent");
                return ProcessingError::PingTimeout(ping_timeout);
            }

            message = inbound.next() => {
                deadline = Instant::now() + ping_timeout;

                let request = match message {
                    Some(Ok(RuntimeMessage::Request(request))) => request,
                    Some(Ok(RuntimeMessage::Ping)) => {
                        trace!("ping");
                        if let Err(err) = send(&outbound, ClientMessage::Pong) {
                            return err;
                        }
                        continue;
                    }
                    Some(Ok(RuntimeMessage::Connected(_))) => {
                        return ProcessingError::protocol("registration response after registration");
                    }
                    Some(Err(err)) => return err.into(),
                    None if cancellation.is_cancelled() => return ProcessingError::Cancelled,
                    None => return ProcessingError::ConnectionClosed,
                };

                let sequence = session.next_sequence();
                let ProcessingRequest {
                    call_id,
                    execution_context,
                    request,
                    retry,
                } = request;
                debug!(
                    %call_id,
                    sequence,
                    event_type = ?processor.event_type_of(&request),
                    retry_count = retry.as_ref().map(|r| r.retry_count),
                    "request"
                );

                let context = RequestContext {
                    call_id,
                    execution_context,
                    retry,
                };
                let processor = processor.clone();
                in_flight.push(
                    async move {
                        let result = AssertUnwindSafe(processor.process(request, context))
                            .catch_unwind()
                            .await
                            .unwrap_or_else(|panic| Err(handler_panicked(panic)));
                        (call_id, result)
                    }
                    .boxed(),
                );
            }
        }
    }
}

fn into_response<P: Processor>(
    processor: &P,
    call_id: CallId,
    result: Result<P::Outcome, RequestFailure>,
) -> Result<Processed<P::Outcome>, ProcessingError> {
    match result {
        Ok(outcome) => {
            trace!(%call_id, "request handled");
            Ok(Processed::Success(outcome))
        }
        Err(RequestFailure::Resolution(err)) if processor.resolution_failures_are_fatal() => {
            error!(%call_id, error = %err, "cannot resolve event type");
            Err(err)
        }
        Err(RequestFailure::Resolution(err)) => {
            warn!(%call_id, error = %err, "cannot resolve event type");
            Ok(Processed::Failure(ProcessorFailure::permanent(err.to_string())))
        }
        Err(failure @ RequestFailure::Handler(_)) => {
            warn!(%call_id, error = %failure, "handler failed");
            Ok(Processed::Failure(ProcessorFailure::retryable(failure.to_string())))
        }
    }
}

fn handler_panicked(panic: Box<dyn Any + Send>) -> RequestFailure {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    RequestFailure::Handler(anyhow::anyhow!("handler panicked: {message}"))
}

fn send<T>(outbound: &mpsc::UnboundedSender<ClientMessage<T>>, message: ClientMessage<T>) -> Result<(), ProcessingError> {
    outbound
        .send(message)
        .map_err(|_| ProcessingError::ConnectionClosed)
}
