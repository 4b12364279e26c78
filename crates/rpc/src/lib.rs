//! `kestrel-rpc`: reactive call layer over a pluggable RPC transport.
//!
//! The transport moves opaque frames for the four call shapes. This crate adds
//! message framing, cancellation and lazy response streams on top:
//!
//! ```text
//! ReactiveClient ── call_unary / call_client_stream / call_server_stream / call_duplex
//!       │                 (typed messages, CancellationToken, CallStream)
//!       ▼
//! dyn Transport  ── unary / client_streaming / server_streaming / duplex
//!                         (frames)
//! ```
//!
//! No retries happen here; retry policy belongs to the callers.

pub mod client;
pub mod codec;
pub mod error;
pub mod in_memory;
pub mod stream;
pub mod transport;

pub use client::ReactiveClient;
pub use error::{CallError, TransportError};
pub use in_memory::{InMemoryServer, InMemoryTransport, ServerCall};
pub use stream::CallStream;
pub use transport::{CallShape, Frame, InboundFrames, Method, MethodDescriptor, OutboundFrames, Transport};

pub use tokio_util::sync::CancellationToken;
