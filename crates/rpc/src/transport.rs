//! Transport abstraction (mechanics only).
//!
//! A transport knows how to reach the runtime (address, credentials and
//! connection pooling are resolved by its implementor) and moves frames for
//! the four call shapes. It never interprets frames.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::TransportError;

/// One encoded message.
pub type Frame = Vec<u8>;

/// Frames flowing from the client to the runtime.
///
/// The transport must stop sending once this stream ends.
pub type OutboundFrames = BoxStream<'static, Frame>;

/// Frames flowing from the runtime to the client.
///
/// Dropping the stream releases the underlying call.
pub type InboundFrames = BoxStream<'static, Result<Frame, TransportError>>;

/// The four supported call shapes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CallShape {
    Unary,
    ClientStreaming,
    ServerStreaming,
    Duplex,
}

/// Untyped description of a remote method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    service: &'static str,
    method: &'static str,
    shape: CallShape,
}

impl MethodDescriptor {
    pub const fn new(service: &'static str, method: &'static str, shape: CallShape) -> Self {
        Self {
            service,
            method,
            shape,
        }
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    pub fn method(&self) -> &'static str {
        self.method
    }

    pub fn shape(&self) -> CallShape {
        self.shape
    }

    /// `/<service>/<method>`, the conventional RPC path.
    pub fn path(&self) -> String {
        format!("/{}/{}", self.service, self.method)
    }
}

impl core::fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "/{}/{}", self.service, self.method)
    }
}

/// A method descriptor bound to its request and response message types.
pub struct Method<Req, Resp> {
    descriptor: MethodDescriptor,
    _messages: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp> Method<Req, Resp> {
    pub const fn new(service: &'static str, method: &'static str, shape: CallShape) -> Self {
        Self {
            descriptor: MethodDescriptor::new(service, method, shape),
            _messages: PhantomData,
        }
    }

    pub fn descriptor(&self) -> &MethodDescriptor {
        &self.descriptor
    }
}

impl<Req, Resp> Clone for Method<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            descriptor: self.descriptor.clone(),
            _messages: PhantomData,
        }
    }
}

impl<Req, Resp> core::fmt::Debug for Method<Req, Resp> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("Method").field(&self.descriptor).finish()
    }
}

/// Frame transport for the four call shapes.
///
/// ## Contract
///
/// - Errors are reported as `Err`, never as a silently completed stream.
/// - Outbound streams are consumed until they end; the transport then
///   half-closes the call.
/// - Dropping an [`InboundFrames`] stream releases the call.
/// - No retries: a failed call stays failed.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn unary(&self, method: &MethodDescriptor, request: Frame)
        -> Result<Frame, TransportError>;

    async fn client_streaming(
        &self,
        method: &MethodDescriptor,
        requests: OutboundFrames,
    ) -> Result<Frame, TransportError>;

    async fn server_streaming(
        &self,
        method: &MethodDescriptor,
        request: Frame,
    ) -> Result<InboundFrames, TransportError>;

    async fn duplex(
        &self,
        method: &MethodDescriptor,
        requests: OutboundFrames,
    ) -> Result<InboundFrames, TransportError>;
}

#[async_trait]
impl<T> Transport for Arc<T>
where
    T: Transport + ?Sized,
{
    async fn unary(
        &self,
        method: &MethodDescriptor,
        request: Frame,
    ) -> Result<Frame, TransportError> {
        (**self).unary(method, request).await
    }

    async fn client_streaming(
        &self,
        method: &MethodDescriptor,
        requests: OutboundFrames,
    ) -> Result<Frame, TransportError> {
        (**self).client_streaming(method, requests).await
    }

    async fn server_streaming(
        &self,
        method: &MethodDescriptor,
        request: Frame,
    ) -> Result<InboundFrames, TransportError> {
        (**self).server_streaming(method, request).await
    }

    async fn duplex(
        &self,
        method: &MethodDescriptor,
        requests: OutboundFrames,
    ) -> Result<InboundFrames, TransportError> {
        (**self).duplex(method, requests).await
    }
}
