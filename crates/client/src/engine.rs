//! Dispatch of resolved requests and delivery of their results.
//!
//! Every request runs through the same lifecycle:
//!
//! 1. a fresh reactor client is created for the request and leased by the engine,
//! 2. the exchange is submitted together with a consumer and an outcome callback,
//! 3. the callback turns the [`Outcome`] into a [`ResponseResult`] and delivers it,
//! 4. the lease closes the client, exactly once, whatever happened before.
//!
//! Nothing that goes wrong after dispatch escapes to the reactor thread: transport failures,
//! cancellation, undecodable bodies and failing or panicking response handlers all end up as
//! the `Err` delivered through the [`Promise`].

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, trace, warn};

use crate::consumer::{BufferingConsumer, StreamingResponseConsumer};
use crate::descriptor::RequestDescriptor;
use crate::error::{BoxError, ClientError, ResourceReleaseError, TransportError};
use crate::options::ResponseBodyType;
use crate::promise::Promise;
use crate::reactor::{ClientConfig, ExchangeHandle, Outcome, RawBody, RawResponse, Reactor, ReactorClient, ResponseConsumer};
use crate::response::{Response, ResponseResult};

/// Post processing applied to every successful response before it is delivered.
pub type ResponseHandler = Arc<dyn Fn(Response) -> Result<Response, BoxError> + Send + Sync>;

/// Executes requests on a [`Reactor`] without blocking the caller.
#[derive(Debug)]
pub struct AsyncExecutor<R> {
    reactor: Arc<R>,
}

impl<R> Clone for AsyncExecutor<R> {
    fn clone(&self) -> Self {
        Self { reactor: Arc::clone(&self.reactor) }
    }
}

impl<R: Reactor> AsyncExecutor<R> {
    pub fn new(reactor: Arc<R>) -> Self {
        Self { reactor }
    }

    pub fn reactor(&self) -> &Arc<R> {
        &self.reactor
    }

    /// Dispatches `descriptor` and returns the promise of its result right away.
    pub fn execute(&self, descriptor: RequestDescriptor, handler: Option<ResponseHandler>) -> Promise<ResponseResult> {
        self.execute_cancellable(descriptor, handler).0
    }

    /// Like [`execute`](Self::execute), also returning a handle that cancels the exchange.
    pub fn execute_cancellable(&self, descriptor: RequestDescriptor, handler: Option<ResponseHandler>) -> (Promise<ResponseResult>, ExchangeHandle) {
        let promise = Promise::new();
        let url = descriptor.url().to_owned();
        let (request, tls, settings) = descriptor.into_parts();
        let method = request.method;

        let config = ClientConfig {
            tls,
            timeout: settings.timeout,
            keep_alive: settings.keep_alive,
            follow_redirects: settings.follow_redirects,
            max_redirects: settings.max_redirects,
            pipe_capacity: settings.pipe_capacity,
        };
        let client = match self.reactor.create_client(config) {
            Ok(client) => client,
            Err(e) => {
                debug!(%method, %url, cause = %e, "can't create reactor client");
                let _ = promise.deliver(Err(e.into()));
                return (promise, ExchangeHandle::new());
            }
        };
        let lease = Arc::new(ClientLease::new(client));

        let delivery = Arc::new(Delivery {
            promise: promise.clone(),
            handler,
            shape: settings.response_type,
            decompress: settings.decompress_body,
        });

        let consumer: Box<dyn ResponseConsumer> = match settings.response_type {
            ResponseBodyType::Stream => {
                let delivery = Arc::clone(&delivery);
                Box::new(StreamingResponseConsumer::new(settings.pipe_capacity, settings.decompress_body, move |raw| delivery.complete(raw)))
            }
            _ => Box::new(BufferingConsumer::new()),
        };

        let on_outcome = {
            let lease = Arc::clone(&lease);
            Box::new(move |outcome: Outcome<RawResponse>| {
                match outcome {
                    Outcome::Completed(RawResponse { body: RawBody::Streamed, status, .. }) => delivery.streamed(status),
                    Outcome::Completed(raw) => delivery.complete(raw),
                    Outcome::Failed(cause) => delivery.deliver(Err(cause.into())),
                    Outcome::Cancelled => delivery.deliver(Err(ClientError::Cancelled)),
                }
                lease.release();
            })
        };

        debug!(%method, %url, "dispatching request");
        let handle = lease.client.submit(request, consumer, on_outcome);
        (promise, handle)
    }
}

/// Exclusive use of one reactor client, closed exactly once.
struct ClientLease<C: ReactorClient> {
    client: C,
    released: AtomicBool,
}

impl<C: ReactorClient> ClientLease<C> {
    fn new(client: C) -> Self {
        Self { client, released: AtomicBool::new(false) }
    }

    fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = self.client.close().map_err(ResourceReleaseError::from) {
            warn!(cause = %e, "failed to close reactor client");
        }
    }
}

impl<C: ReactorClient> Drop for ClientLease<C> {
    fn drop(&mut self) {
        self.release();
    }
}

/// The single place a request's result is delivered from.
struct Delivery {
    promise: Promise<ResponseResult>,
    handler: Option<ResponseHandler>,
    shape: ResponseBodyType,
    decompress: bool,
}

impl Delivery {
    fn deliver(&self, result: ResponseResult) {
        if let Err(rejected) = self.promise.deliver(result) {
            // the streaming path delivers at the head, later failures go to the body stream
            debug!(cause = %rejected, "discarding result of an already delivered request");
        }
    }

    fn complete(&self, raw: RawResponse) {
        let result = Response::from_raw(raw, self.shape, self.decompress).and_then(|response| self.post_process(response));
        self.deliver(result);
    }

    fn streamed(&self, status: http::StatusCode) {
        if self.promise.is_delivered() {
            trace!(%status, "streamed response completed");
        } else {
            self.deliver(Err(TransportError::protocol("streamed response completed without being handed over").into()));
        }
    }

    fn post_process(&self, response: Response) -> ResponseResult {
        let Some(handler) = &self.handler else {
            return Ok(response);
        };
        match catch_unwind(AssertUnwindSafe(|| handler(response))) {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(ClientError::handler(e)),
            Err(panic) => Err(ClientError::handler(format!("response handler panicked: {}", panic_message(panic.as_ref())))),
        }
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if !self.promise.is_delivered() {
            self.deliver(Err(TransportError::protocol("exchange ended without an outcome").into()));
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown cause")
}
