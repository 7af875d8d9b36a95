//! [`Reactor`] on a multi-thread tokio runtime, speaking HTTP/1.1 through `micro-client-wire`.

use std::io;
use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use http::header::CONNECTION;
use http::{HeaderMap, HeaderValue, Request, Uri};
use http_body::Frame;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use micro_client_wire::connection::ClientConnection;
use micro_client_wire::protocol::PayloadItem;
use once_cell::sync::OnceCell;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::mpsc;
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::{ClientConfig, ExchangeCallback, ExchangeHandle, Outcome, RawResponse, Reactor, ReactorClient, ResponseConsumer};
use crate::descriptor::{ExchangeRequest, RequestPayload};
use crate::error::TransportError;
use crate::options::HttpMethod;
use crate::pipe::MAX_CHUNK_SIZE;
use crate::tls::TlsContext;

type RequestBody = UnsyncBoxBody<Bytes, io::Error>;

static DEFAULT_REACTOR: OnceCell<Arc<TokioReactor>> = OnceCell::new();

/// The process wide reactor used by the facades unless they are given another one.
pub fn default_reactor() -> Result<Arc<TokioReactor>, TransportError> {
    DEFAULT_REACTOR.get_or_try_init(|| TokioReactor::new().map(Arc::new)).cloned().map_err(TransportError::from)
}

#[derive(Debug, Clone)]
pub struct ReactorConfig {
    pub worker_threads: usize,
    pub thread_name: String,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self { worker_threads: 2, thread_name: String::from("micro-client-reactor") }
    }
}

/// Runs exchanges as tasks on a tokio runtime.
///
/// The reactor either owns its runtime or borrows one through a [`Handle`]. An owned runtime is
/// shared with every client and exchange started on it, and is shut down without waiting once
/// the last of them is gone, so a streamed body keeps flowing after the reactor is dropped.
#[derive(Debug)]
pub struct TokioReactor {
    runtime: Option<Arc<OwnedRuntime>>,
    handle: Handle,
}

#[derive(Debug)]
struct OwnedRuntime(Option<Runtime>);

impl Drop for OwnedRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.0.take() {
            trace!("shutting down reactor runtime");
            runtime.shutdown_background();
        }
    }
}

impl TokioReactor {
    pub fn new() -> io::Result<Self> {
        Self::with_config(&ReactorConfig::default())
    }

    pub fn with_config(config: &ReactorConfig) -> io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .thread_name(config.thread_name.clone())
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();
        debug!(worker_threads = config.worker_threads, thread_name = %config.thread_name, "started reactor runtime");
        Ok(Self { runtime: Some(Arc::new(OwnedRuntime(Some(runtime)))), handle })
    }

    /// Runs exchanges on an existing runtime.
    pub fn from_handle(handle: Handle) -> Self {
        Self { runtime: None, handle }
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }
}

impl Reactor for TokioReactor {
    type Client = TokioClient;

    fn create_client(&self, config: ClientConfig) -> Result<TokioClient, TransportError> {
        Ok(TokioClient {
            handle: self.handle.clone(),
            runtime: self.runtime.as_ref().map(Arc::clone),
            config,
            scope: CancellationToken::new(),
            closed: AtomicBool::new(false),
        })
    }
}

/// Client for the exchange of a single request.
#[derive(Debug)]
pub struct TokioClient {
    handle: Handle,
    runtime: Option<Arc<OwnedRuntime>>,
    config: ClientConfig,
    scope: CancellationToken,
    closed: AtomicBool,
}

impl ReactorClient for TokioClient {
    fn submit(&self, request: ExchangeRequest, mut consumer: Box<dyn ResponseConsumer>, on_outcome: ExchangeCallback) -> ExchangeHandle {
        let token = self.scope.child_token();
        let exchange_handle = ExchangeHandle::from_token(token.clone());

        if self.closed.load(Ordering::Acquire) {
            let cause = TransportError::ClientClosed;
            consumer.failed(&cause);
            on_outcome(Outcome::Failed(cause));
            return exchange_handle;
        }

        let config = self.config.clone();
        let runtime = self.runtime.as_ref().map(Arc::clone);
        self.handle.spawn(async move {
            let _runtime = runtime;
            let method = request.method;
            let uri = request.uri.clone();
            let outcome = tokio::select! {
                biased;
                () = token.cancelled() => Outcome::Cancelled,
                result = exchange(request, &config, consumer.as_mut()) => match result {
                    Ok(response) => Outcome::Completed(response),
                    Err(e) => Outcome::Failed(e),
                },
            };

            match &outcome {
                Outcome::Completed(response) => debug!(%method, %uri, status = %response.status, "exchange completed"),
                Outcome::Failed(cause) => {
                    debug!(%method, %uri, cause = %cause, "exchange failed");
                    consumer.failed(cause);
                }
                Outcome::Cancelled => {
                    debug!(%method, %uri, "exchange cancelled");
                    consumer.cancelled();
                }
            }
            on_outcome(outcome);
        });
        exchange_handle
    }

    fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            trace!("reactor client already closed");
            return Ok(());
        }
        self.scope.cancel();
        trace!("reactor client closed");
        Ok(())
    }
}

async fn exchange(request: ExchangeRequest, config: &ClientConfig, consumer: &mut dyn ResponseConsumer) -> Result<RawResponse, TransportError> {
    let https = request.uri.scheme_str() == Some("https");
    let host = request
        .uri
        .host()
        .map(|host| host.trim_start_matches('[').trim_end_matches(']').to_owned())
        .ok_or_else(|| TransportError::protocol("request uri has no host"))?;
    let port = request.uri.port_u16().unwrap_or(if https { 443 } else { 80 });

    let stream = timed(config.timeout, "connect", TcpStream::connect((host.as_str(), port))).await?;
    stream.set_nodelay(true)?;
    trace!(%host, port, https, "connected");

    if https {
        let context = match &config.tls {
            Some(context) => context.clone(),
            None => TlsContext::with_default_roots().map_err(|e| TransportError::Tls { reason: e.to_string() })?,
        };
        let server_name = ServerName::try_from(host).map_err(|e| TransportError::Tls { reason: e.to_string() })?;
        let connector = TlsConnector::from(context.client_config());
        let handshake = async move { connector.connect(server_name, stream).await.map_err(|e| TransportError::Tls { reason: e.to_string() }) };
        let stream = timed(config.timeout, "tls handshake", handshake).await?;
        let (reader, writer) = tokio::io::split(stream);
        run(reader, writer, request, config, consumer).await
    } else {
        let (reader, writer) = stream.into_split();
        run(reader, writer, request, config, consumer).await
    }
}

async fn run<R, W>(
    reader: R,
    writer: W,
    request: ExchangeRequest,
    config: &ClientConfig,
    consumer: &mut dyn ResponseConsumer,
) -> Result<RawResponse, TransportError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let ExchangeRequest { uri, method, headers, body } = request;
    let mut connection = ClientConnection::new(reader, writer, &method.into());

    let request = build_request(method, uri, headers, body, config.pipe_capacity);
    timed(config.timeout, "send request", connection.send_request(request)).await?;

    let head = timed(config.timeout, "read response head", connection.read_head()).await?;
    consumer.response_received(head)?;

    loop {
        match timed(config.timeout, "read response body", connection.read_payload()).await? {
            PayloadItem::Chunk(bytes) => consumer.content_received(bytes).await?,
            PayloadItem::Eof => break,
        }
    }
    consumer.build_result().await
}

fn build_request(method: HttpMethod, uri: Uri, headers: HeaderMap, body: Option<RequestPayload>, capacity: usize) -> Request<RequestBody> {
    let body = match body {
        None => Empty::<Bytes>::new().map_err(|never| match never {}).boxed_unsync(),
        Some(RequestPayload::Text(text) | RequestPayload::Form(text)) => full(Bytes::from(text)),
        Some(RequestPayload::Binary(bytes)) => full(bytes),
        Some(RequestPayload::Stream(reader)) => pump(reader, capacity),
    };

    let mut request = Request::new(body);
    *request.method_mut() = method.into();
    *request.uri_mut() = uri;
    *request.headers_mut() = headers;
    // connections are never reused
    request.headers_mut().insert(CONNECTION, HeaderValue::from_static("close"));
    request
}

fn full(bytes: Bytes) -> RequestBody {
    Full::new(bytes).map_err(|never| match never {}).boxed_unsync()
}

/// Reads a blocking body source on the blocking pool, at most `capacity` chunks ahead of the socket.
fn pump(mut reader: Box<dyn Read + Send>, capacity: usize) -> RequestBody {
    let (tx, mut rx) = mpsc::channel::<io::Result<Frame<Bytes>>>(capacity.max(1));
    tokio::task::spawn_blocking(move || {
        let mut buf = vec![0u8; MAX_CHUNK_SIZE];
        loop {
            let item = match reader.read(&mut buf) {
                Ok(0) => return,
                Ok(n) => Ok(Frame::data(Bytes::copy_from_slice(&buf[..n]))),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(cause = %e, "reading request body failed");
                    Err(e)
                }
            };
            let failed = item.is_err();
            if tx.blocking_send(item).is_err() || failed {
                return;
            }
        }
    });
    StreamBody::new(futures::stream::poll_fn(move |cx| rx.poll_recv(cx))).boxed_unsync()
}

async fn timed<T, E, F>(after: Duration, step: &'static str, future: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<TransportError>,
{
    match tokio::time::timeout(after, future).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(TransportError::timeout(step, after)),
    }
}
