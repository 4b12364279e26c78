//! Registration protocol: open a processor stream and register on it.

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use kestrel_rpc::{CallShape, CallStream, Method, ReactiveClient};

use crate::config::ProcessingConfig;
use crate::error::ProcessingError;
use crate::processor::Processor;
use crate::protocol::{ClientMessage, ConnectRequest, RegistrationResponse, RuntimeMessage};
use crate::session::{SessionState, StreamSession};

/// Outbound messages of a processor stream.
pub type Outbound<P> = mpsc::UnboundedSender<ClientMessage<<P as Processor>::Outcome>>;

/// Inbound messages of a processor stream.
pub type Inbound<P> = CallStream<RuntimeMessage<<P as Processor>::Request>>;

/// A stream whose registration the runtime confirmed.
pub struct RegisteredStream<P: Processor> {
    pub outbound: Outbound<P>,
    pub inbound: Inbound<P>,
}

impl<P: Processor> core::fmt::Debug for RegisteredStream<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RegisteredStream")
            .field("inbound", &self.inbound)
            .finish_non_exhaustive()
    }
}

/// Duplex method a processor kind registers through.
pub fn connect_method<P: Processor>(
    processor: &P,
) -> Method<ClientMessage<P::Outcome>, RuntimeMessage<P::Request>> {
    Method::new(
        processor.registration().kind().service(),
        "Connect",
        CallShape::Duplex,
    )
}

/// Open the duplex call and perform the registration handshake.
///
/// The registration descriptor is queued before the call is opened, so it is
/// always the first outbound message. On any failure the call is released and
/// no request is read.
#[instrument(
    skip_all,
    fields(
        kind = %processor.registration().kind(),
        processor_id = %processor.registration().id().uuid(),
        attempt = session.attempt(),
    )
)]
pub async fn connect<P: Processor>(
    client: &ReactiveClient,
    processor: &P,
    config: &ProcessingConfig,
    session: &mut StreamSession,
    cancellation: &CancellationToken,
) -> Result<RegisteredStream<P>, ProcessingError> {
    let registration = processor.registration();
    session.advance(SessionState::Connecting);

    let (outbound, rx) = mpsc::unbounded_channel();
    outbound
        .send(ClientMessage::Connect(ConnectRequest {
            registration: registration.clone(),
            execution_context: config.execution_context.clone(),
            ping_interval: config.ping_interval,
        }))
        .map_err(|_| ProcessingError::ConnectionClosed)?;

    let mut inbound = client
        .call_duplex(
            &connect_method(processor),
            UnboundedReceiverStream::new(rx),
            cancellation,
        )
        .await?;
    session.advance(SessionState::AwaitingRegistrationResponse);

    let first = tokio::select! {
        biased;
        _ = cancellation.cancelled() => return Err(ProcessingError::Cancelled),
        first = tokio::time::timeout(config.connect_timeout, inbound.next()) => {
            first.map_err(|_| ProcessingError::RegistrationTimeout {
                kind: registration.kind(),
                processor_id: registration.id().uuid(),
                timeout: config.connect_timeout,
            })?
        }
    };

    let rejected = |failure| ProcessingError::RegistrationFailed {
        kind: registration.kind(),
        processor_id: registration.id().uuid(),
        failure,
    };

    match first {
        Some(Ok(RuntimeMessage::Connected(RegistrationResponse { failure: None }))) => {
            session.confirm();
            info!(alias = registration.alias(), "registered");
            Ok(RegisteredStream { outbound, inbound })
        }
        Some(Ok(RuntimeMessage::Connected(RegistrationResponse {
            failure: Some(failure),
        }))) => {
            session.reject();
            warn!(failure = %failure, "registration rejected");
            Err(rejected(Some(failure)))
        }
        Some(Ok(other)) => {
            session.reject();
            warn!(message = other.name(), "expected a registration response");
            Err(rejected(None))
        }
        Some(Err(err)) => Err(err.into()),
        None if cancellation.is_cancelled() => Err(ProcessingError::Cancelled),
        None => {
            debug!("stream ended before the registration response");
            session.reject();
            Err(rejected(None))
        }
    }
}
