//! Caller facing clients.
//!
//! [`SyncHttpClient`] blocks the calling thread until the result is there and returns failures
//! as `Err`. [`AsyncHttpClient`] hands back the [`Promise`] of the result right after dispatch.
//! Both reject invalid options before anything is sent.

use std::sync::Arc;

use tracing::error;

use crate::descriptor::coerce;
use crate::engine::{AsyncExecutor, ResponseHandler};
use crate::error::ClientError;
use crate::options::{HttpMethod, RequestOptions};
use crate::promise::Promise;
use crate::reactor::{ExchangeHandle, Reactor, TokioReactor, default_reactor};
use crate::response::ResponseResult;

/// Blocking client.
///
/// Must not be used from inside an async task of the runtime driving its reactor, since
/// waiting for the result would block that runtime.
#[derive(Debug)]
pub struct SyncHttpClient<R = TokioReactor> {
    executor: AsyncExecutor<R>,
}

impl SyncHttpClient<TokioReactor> {
    /// Client on the process wide [`default_reactor`].
    pub fn new() -> Result<Self, ClientError> {
        Ok(Self::with_reactor(default_reactor()?))
    }
}

impl<R: Reactor> SyncHttpClient<R> {
    pub fn with_reactor(reactor: Arc<R>) -> Self {
        Self { executor: AsyncExecutor::new(reactor) }
    }

    pub fn request<O: Into<RequestOptions>>(&self, options: O) -> ResponseResult {
        self.request_with_handler(options, None)
    }

    /// Sends the request and waits for it, running `handler` on a successful response.
    pub fn request_with_handler<O: Into<RequestOptions>>(&self, options: O, handler: Option<ResponseHandler>) -> ResponseResult {
        let options = options.into();
        let url = options.url().to_owned();
        let result = coerce(options).and_then(|descriptor| self.executor.execute(descriptor, handler).wait()?);
        result.inspect_err(|e| error!(%url, cause = %e, "request failed"))
    }

    pub fn get<O: Into<RequestOptions>>(&self, options: O) -> ResponseResult {
        self.request(options.into().method(HttpMethod::Get))
    }

    pub fn head<O: Into<RequestOptions>>(&self, options: O) -> ResponseResult {
        self.request(options.into().method(HttpMethod::Head))
    }

    pub fn post<O: Into<RequestOptions>>(&self, options: O) -> ResponseResult {
        self.request(options.into().method(HttpMethod::Post))
    }

    pub fn put<O: Into<RequestOptions>>(&self, options: O) -> ResponseResult {
        self.request(options.into().method(HttpMethod::Put))
    }

    pub fn delete<O: Into<RequestOptions>>(&self, options: O) -> ResponseResult {
        self.request(options.into().method(HttpMethod::Delete))
    }

    pub fn trace<O: Into<RequestOptions>>(&self, options: O) -> ResponseResult {
        self.request(options.into().method(HttpMethod::Trace))
    }

    pub fn options<O: Into<RequestOptions>>(&self, options: O) -> ResponseResult {
        self.request(options.into().method(HttpMethod::Options))
    }

    pub fn patch<O: Into<RequestOptions>>(&self, options: O) -> ResponseResult {
        self.request(options.into().method(HttpMethod::Patch))
    }
}

/// Non-blocking client; results arrive through a [`Promise`].
#[derive(Debug)]
pub struct AsyncHttpClient<R = TokioReactor> {
    executor: AsyncExecutor<R>,
}

impl AsyncHttpClient<TokioReactor> {
    /// Client on the process wide [`default_reactor`].
    pub fn new() -> Result<Self, ClientError> {
        Ok(Self::with_reactor(default_reactor()?))
    }
}

impl<R: Reactor> AsyncHttpClient<R> {
    pub fn with_reactor(reactor: Arc<R>) -> Self {
        Self { executor: AsyncExecutor::new(reactor) }
    }

    /// Dispatches the request. Only invalid options fail here, everything later is in the result.
    pub fn request<O: Into<RequestOptions>>(&self, options: O) -> Result<Promise<ResponseResult>, ClientError> {
        self.request_with_handler(options, None)
    }

    pub fn request_with_handler<O: Into<RequestOptions>>(
        &self,
        options: O,
        handler: Option<ResponseHandler>,
    ) -> Result<Promise<ResponseResult>, ClientError> {
        Ok(self.executor.execute(coerce(options.into())?, handler))
    }

    /// Dispatches the request and returns a handle that cancels it.
    pub fn request_cancellable<O: Into<RequestOptions>>(&self, options: O) -> Result<(Promise<ResponseResult>, ExchangeHandle), ClientError> {
        Ok(self.executor.execute_cancellable(coerce(options.into())?, None))
    }

    /// Dispatches the request and waits for the result without blocking the executor.
    pub async fn send<O: Into<RequestOptions>>(&self, options: O) -> ResponseResult {
        self.request(options)?.wait_async().await?
    }
}

impl<R> Clone for AsyncHttpClient<R> {
    fn clone(&self) -> Self {
        Self { executor: self.executor.clone() }
    }
}

impl<R> Clone for SyncHttpClient<R> {
    fn clone(&self) -> Self {
        Self { executor: self.executor.clone() }
    }
}
