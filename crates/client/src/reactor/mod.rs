//! The seam between the client core and the non-blocking I/O engine executing exchanges.
//!
//! A [`Reactor`] hands out one [`ReactorClient`] per request. The client accepts exactly one
//! [`submit`](ReactorClient::submit) per request it was created for and reports back twice:
//! protocol events are pushed into the [`ResponseConsumer`] as they happen, and the final
//! [`Outcome`] is passed to the callback, exactly once, on a reactor thread.
//!
//! The consumer's body callback is async. A reactor awaits it before reading more from the
//! network, which is how a slow reader slows the network down instead of growing a buffer.

mod tokio_reactor;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode, Version};
use micro_client_wire::protocol::ResponseHeader;
use tokio_util::sync::CancellationToken;

use crate::descriptor::ExchangeRequest;
use crate::error::TransportError;
use crate::pipe::BodyStream;
use crate::tls::TlsContext;

pub use tokio_reactor::{ReactorConfig, TokioClient, TokioReactor, default_reactor};

/// How an exchange ended, as reported by a reactor.
#[derive(Debug)]
pub enum Outcome<T> {
    Completed(T),
    Failed(TransportError),
    Cancelled,
}

/// Invoked once with the outcome of a submitted exchange.
pub type ExchangeCallback = Box<dyn FnOnce(Outcome<RawResponse>) + Send>;

/// Response as assembled by a [`ResponseConsumer`], before it is shaped for the caller.
#[derive(Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    pub version: Version,
    pub headers: HeaderMap,
    /// `Content-Encoding` of the response, if the body is already decoded its header is removed
    pub content_encoding: Option<String>,
    pub body: RawBody,
}

pub enum RawBody {
    /// The whole body, still content encoded
    Buffered(Bytes),
    /// Read end of a body that is still arriving
    Stream(BodyStream),
    /// The body went out through a stream handed over earlier
    Streamed,
}

impl fmt::Debug for RawBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawBody::Buffered(bytes) => f.debug_tuple("Buffered").field(&bytes.len()).finish(),
            RawBody::Stream(stream) => f.debug_tuple("Stream").field(stream).finish(),
            RawBody::Streamed => f.write_str("Streamed"),
        }
    }
}

/// Receives the protocol events of one exchange.
///
/// Calls arrive in order: [`response_received`](Self::response_received) once, then any
/// number of [`content_received`](Self::content_received), then either
/// [`build_result`](Self::build_result), [`failed`](Self::failed) or
/// [`cancelled`](Self::cancelled). `failed` may also follow a failed `build_result`, and
/// `failed` or `cancelled` may arrive before any head was received.
#[async_trait]
pub trait ResponseConsumer: Send {
    /// Status line and headers are parsed, no body byte has been passed on yet.
    fn response_received(&mut self, head: ResponseHeader) -> Result<(), TransportError>;

    /// A piece of the body. An error stops the exchange.
    async fn content_received(&mut self, chunk: Bytes) -> Result<(), TransportError>;

    /// The body is complete.
    async fn build_result(&mut self) -> Result<RawResponse, TransportError>;

    fn failed(&mut self, cause: &TransportError);

    fn cancelled(&mut self);
}

/// Per request configuration of a reactor client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Trust and credentials, `None` for the defaults of the reactor
    pub tls: Option<TlsContext>,
    pub timeout: Duration,
    pub keep_alive: Duration,
    pub follow_redirects: bool,
    pub max_redirects: u32,
    /// Bound on request body chunks buffered ahead of the socket
    pub pipe_capacity: usize,
}

/// Creates the per request clients.
pub trait Reactor: Send + Sync + 'static {
    type Client: ReactorClient;

    fn create_client(&self, config: ClientConfig) -> Result<Self::Client, TransportError>;
}

/// Executes the exchange of one request.
#[cfg_attr(test, mockall::automock)]
pub trait ReactorClient: Send + Sync + 'static {
    /// Starts the exchange and returns immediately.
    ///
    /// `on_outcome` is called exactly once, even if the handle is cancelled or the client is
    /// closed first.
    fn submit(&self, request: ExchangeRequest, consumer: Box<dyn ResponseConsumer>, on_outcome: ExchangeCallback) -> ExchangeHandle;

    /// Releases the client, abandoning anything still in flight. Closing twice is a no-op.
    fn close(&self) -> Result<(), TransportError>;
}

/// Cancels a submitted exchange.
#[derive(Debug, Clone, Default)]
pub struct ExchangeHandle {
    token: CancellationToken,
}

impl ExchangeHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_token(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Asks the reactor to abandon the exchange; it then reports [`Outcome::Cancelled`]
    /// unless the exchange already finished.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}
