//! An HTTP/1.1 client with blocking and promise based facades over an async reactor.
//!
//! Requests are described with [`RequestOptions`], resolved into an immutable
//! [`RequestDescriptor`](descriptor::RequestDescriptor) and executed on a
//! [`Reactor`](reactor::Reactor), by default a tokio runtime owned by the library. Results are
//! delivered through a single-assignment [`Promise`], which the [`SyncHttpClient`] waits on and
//! the [`AsyncHttpClient`] hands back to the caller.
//!
//! # Features
//!
//! - Query and form parameters, basic and bearer authentication, custom headers
//! - Mutual TLS, custom CA and insecure modes through `rustls`
//! - Responses as text, bytes or a [`BodyStream`] that is readable as soon as the head arrives
//! - Bounded memory and backpressure for streamed bodies
//! - Transparent `gzip` and `deflate` response decoding
//! - Cancellation of in-flight requests
//!
//! # Example
//!
//! ```no_run
//! use std::io::Read;
//!
//! use micro_client::{RequestOptions, ResponseBody, ResponseBodyType, SyncHttpClient};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = SyncHttpClient::new()?;
//!
//!     let response = client.get(RequestOptions::new("https://example.com/").query_param("q", "rust"))?;
//!     println!("{} {:?}", response.status(), response.body().as_text());
//!
//!     let options = RequestOptions::new("https://example.com/large").response_type(ResponseBodyType::Stream);
//!     if let ResponseBody::Stream(mut stream) = client.get(options)?.into_body() {
//!         let mut buf = [0u8; 8192];
//!         while stream.read(&mut buf)? > 0 {}
//!     }
//!     Ok(())
//! }
//! ```

pub mod consumer;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod options;
pub mod pipe;
pub mod promise;
pub mod reactor;
pub mod response;
pub mod tls;

mod client;
mod decoding;

#[cfg(test)]
mod testing;

pub use client::{AsyncHttpClient, SyncHttpClient};
pub use engine::{AsyncExecutor, ResponseHandler};
pub use error::{ClientError, ConfigurationError, PromiseError, StreamError, TlsError, TransportError};
pub use options::{BasicAuth, HttpMethod, RequestBody, RequestOptions, ResponseBodyType, TlsOptions};
pub use pipe::BodyStream;
pub use promise::Promise;
pub use response::{Response, ResponseBody, ResponseResult};
pub use tls::TlsContext;
