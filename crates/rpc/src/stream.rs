//! Lazy, cancellable response streams.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::trace;

use crate::codec;
use crate::error::CallError;
use crate::transport::{InboundFrames, MethodDescriptor};

/// Responses of a server-streaming or duplex call.
///
/// - Yields decoded messages until the runtime closes the call, the call
///   fails (one terminal `Err` item) or the call is cancelled.
/// - Cancelling stops the outbound direction and the inbound direction and
///   releases the transport handle exactly once. Cancelling twice is a no-op.
/// - Dropping the stream cancels the call.
pub struct CallStream<T> {
    method: MethodDescriptor,
    inner: Option<InboundFrames>,
    cancellation: CancellationToken,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    _message: PhantomData<fn() -> T>,
}

impl<T> CallStream<T> {
    /// Wrap `inner`. `cancellation` must be owned by this call alone.
    pub(crate) fn new(
        method: MethodDescriptor,
        inner: InboundFrames,
        cancellation: CancellationToken,
    ) -> Self {
        let cancelled = Box::pin(cancellation.clone().cancelled_owned());
        Self {
            method,
            inner: Some(inner),
            cancellation,
            cancelled,
            _message: PhantomData,
        }
    }

    pub fn method(&self) -> &MethodDescriptor {
        &self.method
    }

    /// Cancel the call. Safe to call from any task through [`Self::cancellation`].
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Token that cancels this call (and only this call).
    pub fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Whether the transport handle has been released.
    pub fn is_released(&self) -> bool {
        self.inner.is_none()
    }

    fn release(&mut self) {
        if self.inner.take().is_some() {
            // The call is over in both directions.
            self.cancellation.cancel();
            trace!(method = %self.method, "released call");
        }
    }
}

impl<T> Stream for CallStream<T>
where
    T: DeserializeOwned,
{
    type Item = Result<T, CallError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.inner.is_none() {
            return Poll::Ready(None);
        }

        if this.cancelled.as_mut().poll(cx).is_ready() {
            this.release();
            return Poll::Ready(None);
        }

        let polled = match this.inner.as_mut() {
            Some(inner) => inner.poll_next_unpin(cx),
            None => return Poll::Ready(None),
        };

        match polled {
            Poll::Pending => Poll::Pending,
            Poll::Ready(None) => {
                this.release();
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(err))) => {
                this.release();
                Poll::Ready(Some(Err(CallError::Transport(err))))
            }
            Poll::Ready(Some(Ok(frame))) => match codec::decode::<T>(&frame) {
                Ok(message) => Poll::Ready(Some(Ok(message))),
                Err(err) => {
                    this.release();
                    Poll::Ready(Some(Err(err)))
                }
            },
        }
    }
}

impl<T> Drop for CallStream<T> {
    fn drop(&mut self) {
        self.cancellation.cancel();
    }
}

impl<T> core::fmt::Debug for CallStream<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CallStream")
            .field("method", &self.method)
            .field("released", &self.inner.is_none())
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::transport::CallShape;
    use futures::stream;

    fn method() -> MethodDescriptor {
        MethodDescriptor::new("test.Service", "Stream", CallShape::ServerStreaming)
    }

    fn frames(items: Vec<Result<&'static str, TransportError>>) -> InboundFrames {
        stream::iter(items.into_iter().map(|r| r.map(|s| s.as_bytes().to_vec()))).boxed()
    }

    #[tokio::test]
    async fn transport_errors_are_terminal() {
        let mut calls: CallStream<u32> = CallStream::new(
            method(),
            frames(vec![
                Ok("1"),
                Err(TransportError::unavailable("reset")),
                Ok("2"),
            ]),
            CancellationToken::new(),
        );

        assert_eq!(calls.next().await, Some(Ok(1)));
        assert!(matches!(
            calls.next().await,
            Some(Err(CallError::Transport(TransportError::Unavailable(_))))
        ));
        assert_eq!(calls.next().await, None);
        assert!(calls.is_released());
    }

    #[tokio::test]
    async fn undecodable_frames_are_terminal() {
        let mut calls: CallStream<u32> = CallStream::new(
            method(),
            frames(vec![Ok("\"nope\""), Ok("2")]),
            CancellationToken::new(),
        );

        assert!(matches!(calls.next().await, Some(Err(CallError::Decode { .. }))));
        assert_eq!(calls.next().await, None);
    }

    #[tokio::test]
    async fn cancellation_ends_the_stream_and_is_idempotent() {
        let token = CancellationToken::new();
        let mut calls: CallStream<u32> =
            CallStream::new(method(), stream::pending().boxed(), token.clone());

        calls.cancel();
        calls.cancel();

        assert_eq!(calls.next().await, None);
        assert!(calls.is_released());
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn end_of_stream_cancels_the_call_token() {
        let token = CancellationToken::new();
        let mut calls: CallStream<u32> =
            CallStream::new(method(), frames(vec![Ok("5")]), token.clone());

        assert_eq!(calls.next().await, Some(Ok(5)));
        assert_eq!(calls.next().await, None);
        assert!(token.is_cancelled());
    }
}
