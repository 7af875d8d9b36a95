//! HTTP/1.1 client wire protocol for micro-client
//!
//! This crate holds the byte-level half of the client: it turns an outgoing request head plus body
//! into bytes on a socket, and turns the bytes coming back into a response head followed by a
//! stream of payload chunks. It knows nothing about promises, TLS or response shaping; those
//! live in the `micro-client` crate which drives a [`connection::ClientConnection`] per exchange.
//!
//! # Features
//!
//! - Request encoding with automatic `Host`, `Content-Length` and `Transfer-Encoding` handling
//! - Response decoding with `httparse`, including interim `1xx` responses
//! - Content-Length, chunked and read-until-close response bodies
//! - Streaming request bodies through any [`http_body::Body`]
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use http::{Method, Request};
//! use http_body_util::Empty;
//! use micro_client_wire::connection::ClientConnection;
//! use micro_client_wire::protocol::PayloadItem;
//! use tokio::net::TcpStream;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let stream = TcpStream::connect("127.0.0.1:8080").await?;
//!     let (reader, writer) = stream.into_split();
//!     let mut connection = ClientConnection::new(reader, writer, &Method::GET);
//!
//!     let request = Request::get("http://127.0.0.1:8080/").body(Empty::<Bytes>::new())?;
//!     connection.send_request(request).await?;
//!
//!     let head = connection.read_head().await?;
//!     println!("status: {}", head.status());
//!     while let PayloadItem::Chunk(bytes) = connection.read_payload().await? {
//!         println!("read {} bytes", bytes.len());
//!     }
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod connection;
pub mod protocol;

mod utils;
pub(crate) use utils::ensure;
