//! Typed, cancellable call shapes over a [`Transport`].

use std::sync::Arc;

use futures::{Stream, StreamExt, future};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::codec;
use crate::error::CallError;
use crate::stream::CallStream;
use crate::transport::{Method, MethodDescriptor, OutboundFrames, Transport};

/// Entry point for making calls against the runtime.
///
/// Cheap to clone; clones share the transport.
#[derive(Clone)]
pub struct ReactiveClient {
    transport: Arc<dyn Transport>,
}

impl ReactiveClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub fn from_transport<T: Transport>(transport: T) -> Self {
        Self::new(Arc::new(transport))
    }

    /// Single request, single response.
    #[instrument(skip_all, fields(method = %method.descriptor()))]
    pub async fn call_unary<Req, Resp>(
        &self,
        method: &Method<Req, Resp>,
        request: &Req,
        cancellation: &CancellationToken,
    ) -> Result<Resp, CallError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let frame = codec::encode(request)?;

        let response = tokio::select! {
            biased;
            _ = cancellation.cancelled() => return Err(CallError::Cancelled),
            response = self.transport.unary(method.descriptor(), frame) => response?,
        };

        codec::decode(&response)
    }

    /// Stream of requests, single response.
    ///
    /// `requests` may be infinite; the call completes when the transport
    /// delivers the response.
    #[instrument(skip_all, fields(method = %method.descriptor()))]
    pub async fn call_client_stream<Req, Resp, S>(
        &self,
        method: &Method<Req, Resp>,
        requests: S,
        cancellation: &CancellationToken,
    ) -> Result<Resp, CallError>
    where
        Req: Serialize + Send + 'static,
        Resp: DeserializeOwned,
        S: Stream<Item = Req> + Send + 'static,
    {
        let call = cancellation.child_token();
        let outbound = encode_outbound(method.descriptor(), requests, call.clone());

        let response = tokio::select! {
            biased;
            _ = call.cancelled() => return Err(CallError::Cancelled),
            response = self.transport.client_streaming(method.descriptor(), outbound) => response,
        };
        // Stop the producer even if the transport answered before consuming it.
        call.cancel();

        codec::decode(&response?)
    }

    /// Single request, lazy stream of responses.
    #[instrument(skip_all, fields(method = %method.descriptor()))]
    pub async fn call_server_stream<Req, Resp>(
        &self,
        method: &Method<Req, Resp>,
        request: &Req,
        cancellation: &CancellationToken,
    ) -> Result<CallStream<Resp>, CallError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let frame = codec::encode(request)?;
        let call = cancellation.child_token();

        let inbound = tokio::select! {
            biased;
            _ = call.cancelled() => return Err(CallError::Cancelled),
            inbound = self.transport.server_streaming(method.descriptor(), frame) => inbound?,
        };

        Ok(CallStream::new(method.descriptor().clone(), inbound, call))
    }

    /// Independent request and response streams over one call.
    ///
    /// No ordering relationship between sent requests and received responses
    /// is assumed.
    #[instrument(skip_all, fields(method = %method.descriptor()))]
    pub async fn call_duplex<Req, Resp, S>(
        &self,
        method: &Method<Req, Resp>,
        requests: S,
        cancellation: &CancellationToken,
    ) -> Result<CallStream<Resp>, CallError>
    where
        Req: Serialize + Send + 'static,
        Resp: DeserializeOwned,
        S: Stream<Item = Req> + Send + 'static,
    {
        let call = cancellation.child_token();
        let outbound = encode_outbound(method.descriptor(), requests, call.clone());

        let inbound = tokio::select! {
            biased;
            _ = call.cancelled() => return Err(CallError::Cancelled),
            inbound = self.transport.duplex(method.descriptor(), outbound) => inbound,
        };

        match inbound {
            Ok(inbound) => {
                debug!("duplex call opened");
                Ok(CallStream::new(method.descriptor().clone(), inbound, call))
            }
            Err(err) => {
                call.cancel();
                Err(err.into())
            }
        }
    }
}

impl core::fmt::Debug for ReactiveClient {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReactiveClient").finish_non_exhaustive()
    }
}

/// Encode requests until the call is cancelled or a message fails to encode.
fn encode_outbound<Req, S>(
    method: &MethodDescriptor,
    requests: S,
    call: CancellationToken,
) -> OutboundFrames
where
    Req: Serialize + Send + 'static,
    S: Stream<Item = Req> + Send + 'static,
{
    let method = method.clone();
    requests
        .take_until(call.cancelled_owned())
        .map(move |request| {
            codec::encode(&request).inspect_err(|err| {
                warn!(method = %method, error = %err, "dropping outbound direction");
            })
        })
        .take_while(|encoded| future::ready(encoded.is_ok()))
        .filter_map(|encoded| future::ready(encoded.ok()))
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::in_memory::InMemoryTransport;
    use crate::transport::CallShape;
    use futures::stream;
    use serde::Deserialize;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Echo {
        text: String,
    }

    fn echo(text: &str) -> Echo {
        Echo {
            text: text.to_string(),
        }
    }

    const UNARY: Method<Echo, Echo> = Method::new("test.Echo", "Say", CallShape::Unary);
    const COLLECT: Method<Echo, Vec<Echo>> =
        Method::new("test.Echo", "Collect", CallShape::ClientStreaming);
    const REPEAT: Method<Echo, Echo> =
        Method::new("test.Echo", "Repeat", CallShape::ServerStreaming);
    const CHAT: Method<Echo, Echo> = Method::new("test.Echo", "Chat", CallShape::Duplex);

    #[tokio::test]
    async fn unary_round_trip() {
        let (transport, mut server) = InMemoryTransport::new();
        let client = ReactiveClient::from_transport(transport);

        let runtime = tokio::spawn(async move {
            let mut call = server.accept().await.unwrap();
            assert_eq!(call.method().path(), "/test.Echo/Say");
            let request: Echo = call.next_request().await.unwrap().unwrap();
            call.send(&echo(&request.text.to_uppercase())).unwrap();
        });

        let response = client
            .call_unary(&UNARY, &echo("hello"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(response, echo("HELLO"));
        runtime.await.unwrap();
    }

    #[tokio::test]
    async fn unary_surfaces_transport_failure() {
        let (transport, mut server) = InMemoryTransport::new();
        let client = ReactiveClient::from_transport(transport);

        let runtime = tokio::spawn(async move {
            let mut call = server.accept().await.unwrap();
            call.fail(TransportError::Status {
                code: 14,
                message: "unavailable".into(),
            })
            .unwrap();
        });

        let err = client
            .call_unary(&UNARY, &echo("hello"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CallError::Transport(TransportError::Status { code: 14, .. })
        ));
        runtime.await.unwrap();
    }

    #[tokio::test]
    async fn calls_fail_when_the_runtime_is_unreachable() {
        let (transport, server) = InMemoryTransport::new();
        drop(server);
        let client = ReactiveClient::from_transport(transport);

        let err = client
            .call_unary(&UNARY, &echo("hello"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, CallError::Transport(TransportError::Unavailable(_))));
    }

    #[tokio::test]
    async fn cancelled_unary_never_reaches_the_transport() {
        let (transport, server) = InMemoryTransport::new();
        let client = ReactiveClient::from_transport(transport);
        let cancellation = CancellationToken::new();
        cancellation.cancel();

        let err = client
            .call_unary(&UNARY, &echo("hello"), &cancellation)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(server.opened_calls(), 0);
    }

    #[tokio::test]
    async fn client_stream_collects_every_request() {
        let (transport, mut server) = InMemoryTransport::new();
        let client = ReactiveClient::from_transport(transport);

        let runtime = tokio::spawn(async move {
            let mut call = server.accept().await.unwrap();
            let mut seen = Vec::new();
            while let Some(request) = call.next_request::<Echo>().await {
                seen.push(request.unwrap());
            }
            call.send(&seen).unwrap();
        });

        let requests = stream::iter(vec![echo("a"), echo("b"), echo("c")]);
        let response = client
            .call_client_stream(&COLLECT, requests, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(response, vec![echo("a"), echo("b"), echo("c")]);
        runtime.await.unwrap();
    }

    #[tokio::test]
    async fn server_stream_is_lazy_and_ends_with_the_call() {
        let (transport, mut server) = InMemoryTransport::new();
        let client = ReactiveClient::from_transport(transport);

        let mut responses = client
            .call_server_stream(&REPEAT, &echo("x"), &CancellationToken::new())
            .await
            .unwrap();

        let mut call = server.accept().await.unwrap();
        let request: Echo = call.next_request().await.unwrap().unwrap();
        for _ in 0..3 {
            call.send(&request).unwrap();
        }
        drop(call);

        let received: Vec<_> = (&mut responses).collect().await;
        assert_eq!(received, vec![Ok(echo("x")), Ok(echo("x")), Ok(echo("x"))]);
        assert!(responses.is_released());
        assert_eq!(server.released_calls(), 1);
    }

    #[tokio::test]
    async fn duplex_directions_are_independent() {
        let (transport, mut server) = InMemoryTransport::new();
        let client = ReactiveClient::from_transport(transport);
        let (tx, rx) = mpsc::unbounded_channel();

        let mut responses = client
            .call_duplex(&CHAT, UnboundedReceiverStream::new(rx), &CancellationToken::new())
            .await
            .unwrap();
        let mut call = server.accept().await.unwrap();

        // The runtime speaks first; nothing has been sent yet.
        call.send(&echo("welcome")).unwrap();
        assert_eq!(responses.next().await, Some(Ok(echo("welcome"))));

        tx.send(echo("one")).unwrap();
        tx.send(echo("two")).unwrap();
        assert_eq!(call.next_request::<Echo>().await.unwrap().unwrap(), echo("one"));
        assert_eq!(call.next_request::<Echo>().await.unwrap().unwrap(), echo("two"));

        call.send(&echo("bye")).unwrap();
        assert_eq!(responses.next().await, Some(Ok(echo("bye"))));
    }

    #[tokio::test]
    async fn cancelling_a_duplex_call_releases_it_once_and_stops_sending() {
        let (transport, mut server) = InMemoryTransport::new();
        let client = ReactiveClient::from_transport(transport);
        let cancellation = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut responses = client
            .call_duplex(&CHAT, UnboundedReceiverStream::new(rx), &cancellation)
            .await
            .unwrap();
        let mut call = server.accept().await.unwrap();

        cancellation.cancel();
        responses.cancel();

        assert_eq!(responses.next().await, None);
        assert_eq!(server.released_calls(), 1);

        // Outbound direction is closed even though the producer is still alive.
        let _ = tx.send(echo("late"));
        let next = tokio::time::timeout(Duration::from_secs(1), call.next_request::<Echo>())
            .await
            .unwrap();
        assert!(next.is_none());

        drop(responses);
        assert_eq!(server.released_calls(), 1);
    }

    #[tokio::test]
    async fn dropping_a_stream_cancels_the_call() {
        let (transport, mut server) = InMemoryTransport::new();
        let client = ReactiveClient::from_transport(transport);

        let responses = client
            .call_server_stream(&REPEAT, &echo("x"), &CancellationToken::new())
            .await
            .unwrap();
        let token = responses.cancellation();
        let call = server.accept().await.unwrap();

        drop(responses);

        assert!(token.is_cancelled());
        assert!(call.is_closed());
        assert_eq!(server.released_calls(), 1);
    }
}
