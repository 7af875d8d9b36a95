//! Error types of the client.
//!
//! Every failure a caller can observe ends up as a [`ClientError`], which is `Clone` so the
//! same failure can be handed to every waiter of a [`Promise`](crate::promise::Promise).
//! Underlying sources that are not `Clone` themselves are kept behind an `Arc`.

use std::error::Error;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use micro_client_wire::protocol::{HttpError, ParseError, SendError};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::options::HttpMethod;

/// Boxed error returned by user supplied response handlers.
pub type BoxError = Box<dyn Error + Send + Sync>;

#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("invalid request configuration: {source}")]
    Configuration {
        #[from]
        source: ConfigurationError,
    },

    #[error("tls setup failed: {source}")]
    Tls {
        #[from]
        source: TlsError,
    },

    #[error("request was cancelled")]
    Cancelled,

    #[error("transport failure: {source}")]
    Transport {
        #[from]
        source: TransportError,
    },

    #[error("response handler failed: {source}")]
    Handler { source: Arc<dyn Error + Send + Sync> },

    #[error("can't decode response body: {source}")]
    Decode { source: Arc<io::Error> },

    #[error("waiting for the response failed: {source}")]
    Wait {
        #[from]
        source: PromiseError,
    },
}

impl ClientError {
    pub fn handler<E: Into<BoxError>>(e: E) -> Self {
        Self::Handler { source: Arc::from(e.into()) }
    }

    pub fn decode(e: io::Error) -> Self {
        Self::Decode { source: Arc::new(e) }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport { source: TransportError::Timeout { .. } } | Self::Wait { source: PromiseError::WaitTimeout(_) })
    }
}

/// The request options can't be turned into a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unsupported url scheme {scheme}, only http and https are supported")]
    UnsupportedScheme { scheme: String },

    #[error("invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("can't encode request: {reason}")]
    Encoding { reason: String },

    #[error("a {method} request can't have a body")]
    BodyNotAllowed { method: HttpMethod },

    #[error("incomplete tls credentials: {reason}")]
    IncompleteTlsCredentials { reason: &'static str },
}

impl ConfigurationError {
    pub fn invalid_url<U: ToString, R: ToString>(url: U, reason: R) -> Self {
        Self::InvalidUrl { url: url.to_string(), reason: reason.to_string() }
    }

    pub fn invalid_header<N: ToString, R: ToString>(name: N, reason: R) -> Self {
        Self::InvalidHeader { name: name.to_string(), reason: reason.to_string() }
    }

    pub fn encoding<R: ToString>(reason: R) -> Self {
        Self::Encoding { reason: reason.to_string() }
    }
}

/// Credential material could not be loaded or assembled into a TLS configuration.
#[derive(Debug, Clone, Error)]
pub enum TlsError {
    #[error("can't parse {what}: {reason}")]
    CredentialParse { what: &'static str, reason: String },

    #[error("can't build key or trust store: {source}")]
    KeyStore {
        #[from]
        source: rustls::Error,
    },
}

impl TlsError {
    pub fn credential_parse<R: ToString>(what: &'static str, reason: R) -> Self {
        Self::CredentialParse { what, reason: reason.to_string() }
    }
}

/// Failure reported by a reactor while executing an exchange.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("io error: {source}")]
    Io { source: Arc<io::Error> },

    #[error("protocol error: {reason}")]
    Protocol { reason: String },

    #[error("tls error: {reason}")]
    Tls { reason: String },

    #[error("{step} timed out after {after:?}")]
    Timeout { step: &'static str, after: Duration },

    #[error("response consumer aborted: {reason}")]
    ConsumerAborted { reason: String },

    #[error("client is closed")]
    ClientClosed,
}

impl TransportError {
    pub fn protocol<R: ToString>(reason: R) -> Self {
        Self::Protocol { reason: reason.to_string() }
    }

    pub fn consumer_aborted<R: ToString>(reason: R) -> Self {
        Self::ConsumerAborted { reason: reason.to_string() }
    }

    pub fn timeout(step: &'static str, after: Duration) -> Self {
        Self::Timeout { step, after }
    }
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        Self::Io { source: Arc::new(e) }
    }
}

impl From<ParseError> for TransportError {
    fn from(e: ParseError) -> Self {
        match e {
            ParseError::Io { source } => source.into(),
            e => Self::protocol(e),
        }
    }
}

impl From<SendError> for TransportError {
    fn from(e: SendError) -> Self {
        match e {
            SendError::Io { source } => source.into(),
            e => Self::protocol(e),
        }
    }
}

impl From<HttpError> for TransportError {
    fn from(e: HttpError) -> Self {
        match e {
            HttpError::RequestError { source } => source.into(),
            HttpError::ResponseError { source } => source.into(),
        }
    }
}

/// Misuse of a [`Promise`](crate::promise::Promise).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PromiseError {
    #[error("promise already delivered")]
    AlreadyDelivered,

    #[error("no value delivered within {0:?}")]
    WaitTimeout(Duration),

    #[error("wait was interrupted")]
    InterruptedWait,
}

/// Failure of the response body stream as seen by its reader.
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    #[error("response body ended before it was complete")]
    Truncated,

    #[error("response body failed: {source}")]
    Transport {
        #[from]
        source: TransportError,
    },

    #[error("response body was cancelled")]
    Cancelled,

    #[error("can't decode response body: {source}")]
    Decode { source: Arc<io::Error> },

    #[error("response body reader is closed")]
    Closed,
}

impl StreamError {
    pub fn decode(e: io::Error) -> Self {
        Self::Decode { source: Arc::new(e) }
    }
}

/// Every reader of a body stream is gone; the write was not buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("body stream reader is closed")]
pub struct PipeClosed;

impl<T> From<mpsc::error::SendError<T>> for PipeClosed {
    fn from(_: mpsc::error::SendError<T>) -> Self {
        PipeClosed
    }
}

impl From<StreamError> for io::Error {
    fn from(e: StreamError) -> Self {
        let kind = match &e {
            StreamError::Truncated => io::ErrorKind::UnexpectedEof,
            StreamError::Transport { source: TransportError::Timeout { .. } } => io::ErrorKind::TimedOut,
            StreamError::Cancelled => io::ErrorKind::ConnectionAborted,
            StreamError::Decode { .. } => io::ErrorKind::InvalidData,
            StreamError::Closed => io::ErrorKind::BrokenPipe,
            StreamError::Transport { .. } => io::ErrorKind::Other,
        };
        io::Error::new(kind, e)
    }
}

/// Closing a reactor client failed; logged, never returned to callers.
#[derive(Debug, Error)]
#[error("failed to release reactor client: {source}")]
pub struct ResourceReleaseError {
    #[from]
    pub source: TransportError,
}
