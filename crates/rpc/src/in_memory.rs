//! In-memory transport for tests/dev.
//!
//! Every call made through [`InMemoryTransport`] shows up on the paired
//! [`InMemoryServer`] as a [`ServerCall`], which test code drives by hand to
//! play the runtime's side of the protocol.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::{Stream, StreamExt, future, stream};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::codec;
use crate::error::{CallError, TransportError};
use crate::transport::{Frame, InboundFrames, MethodDescriptor, OutboundFrames, Transport};

#[derive(Debug, Default)]
struct Counters {
    opened: AtomicUsize,
    released: AtomicUsize,
}

/// Client half: hands every call over to the paired [`InMemoryServer`].
#[derive(Debug, Clone)]
pub struct InMemoryTransport {
    calls: mpsc::UnboundedSender<ServerCall>,
    counters: Arc<Counters>,
}

/// Server half: accepts calls in the order they were opened.
#[derive(Debug)]
pub struct InMemoryServer {
    calls: mpsc::UnboundedReceiver<ServerCall>,
    counters: Arc<Counters>,
}

impl InMemoryTransport {
    pub fn new() -> (InMemoryTransport, InMemoryServer) {
        let (tx, rx) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());
        (
            InMemoryTransport {
                calls: tx,
                counters: counters.clone(),
            },
            InMemoryServer {
                calls: rx,
                counters,
            },
        )
    }

    fn open(
        &self,
        method: &MethodDescriptor,
        requests: OutboundFrames,
        responder: Responder,
    ) -> Result<(), TransportError> {
        let call = ServerCall {
            method: method.clone(),
            requests,
            responder,
        };
        self.calls
            .send(call)
            .map_err(|_| TransportError::unavailable("in-memory server is gone"))?;
        self.counters.opened.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn streaming(&self, method: &MethodDescriptor, requests: OutboundFrames) -> Result<InboundFrames, TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.open(method, requests, Responder::Streaming(tx))?;
        Ok(ReleaseTracked {
            inner: UnboundedReceiverStream::new(rx),
            counters: self.counters.clone(),
        }
        .boxed())
    }

    async fn single(&self, method: &MethodDescriptor, requests: OutboundFrames) -> Result<Frame, TransportError> {
        let (tx, rx) = oneshot::channel();
        self.open(method, requests, Responder::Single(Some(tx)))?;
        rx.await
            .unwrap_or_else(|_| Err(TransportError::aborted("call dropped by server")))
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn unary(&self, method: &MethodDescriptor, request: Frame) -> Result<Frame, TransportError> {
        self.single(method, stream::once(future::ready(request)).boxed())
            .await
    }

    async fn client_streaming(
        &self,
        method: &MethodDescriptor,
        requests: OutboundFrames,
    ) -> Result<Frame, TransportError> {
        self.single(method, requests).await
    }

    async fn server_streaming(
        &self,
        method: &MethodDescriptor,
        request: Frame,
    ) -> Result<InboundFrames, TransportError> {
        self.streaming(method, stream::once(future::ready(request)).boxed())
    }

    async fn duplex(
        &self,
        method: &MethodDescriptor,
        requests: OutboundFrames,
    ) -> Result<InboundFrames, TransportError> {
        self.streaming(method, requests)
    }
}

impl InMemoryServer {
    /// Wait for the next call. `None` once every transport clone is dropped.
    pub async fn accept(&mut self) -> Option<ServerCall> {
        self.calls.recv().await
    }

    pub fn try_accept(&mut self) -> Option<ServerCall> {
        self.calls.try_recv().ok()
    }

    /// Number of calls opened so far.
    pub fn opened_calls(&self) -> usize {
        self.counters.opened.load(Ordering::Acquire)
    }

    /// Number of streaming calls whose client side released its handle.
    pub fn released_calls(&self) -> usize {
        self.counters.released.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
enum Responder {
    Single(Option<oneshot::Sender<Result<Frame, TransportError>>>),
    Streaming(mpsc::UnboundedSender<Result<Frame, TransportError>>),
}

/// The runtime's side of one call.
///
/// Dropping it ends the call: streaming clients observe end-of-stream, unary
/// and client-streaming clients observe an aborted call.
pub struct ServerCall {
    method: MethodDescriptor,
    requests: OutboundFrames,
    responder: Responder,
}

impl ServerCall {
    pub fn method(&self) -> &MethodDescriptor {
        &self.method
    }

    /// Next message sent by the client, `None` once the client stops sending.
    pub async fn next_request<T: DeserializeOwned>(&mut self) -> Option<Result<T, CallError>> {
        let frame = self.requests.next().await?;
        Some(codec::decode(&frame))
    }

    /// Send a message to the client.
    ///
    /// Single-response calls accept exactly one message.
    pub fn send<T: Serialize>(&mut self, message: &T) -> Result<(), CallError> {
        let frame = codec::encode(message)?;
        self.deliver(Ok(frame))
    }

    /// Fail the call with a transport error.
    pub fn fail(&mut self, error: TransportError) -> Result<(), CallError> {
        self.deliver(Err(error))
    }

    /// Whether the client has gone away.
    pub fn is_closed(&self) -> bool {
        match &self.responder {
            Responder::Single(Some(tx)) => tx.is_closed(),
            Responder::Single(None) => true,
            Responder::Streaming(tx) => tx.is_closed(),
        }
    }

    fn deliver(&mut self, item: Result<Frame, TransportError>) -> Result<(), CallError> {
        let closed = || CallError::Transport(TransportError::aborted("client is gone"));
        match &mut self.responder {
            Responder::Single(slot) => slot
                .take()
                .ok_or_else(closed)?
                .send(item)
                .map_err(|_| closed()),
            Responder::Streaming(tx) => tx.send(item).map_err(|_| closed()),
        }
    }
}

impl core::fmt::Debug for ServerCall {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ServerCall")
            .field("method", &self.method)
            .field("responder", &self.responder)
            .finish_non_exhaustive()
    }
}

/// Inbound stream that records when the client releases it.
struct ReleaseTracked {
    inner: UnboundedReceiverStream<Result<Frame, TransportError>>,
    counters: Arc<Counters>,
}

impl Stream for ReleaseTracked {
    type Item = Result<Frame, TransportError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl Drop for ReleaseTracked {
    fn drop(&mut self) {
        self.counters.released.fetch_add(1, Ordering::AcqRel);
    }
}
