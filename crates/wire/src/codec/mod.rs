//! Client side HTTP/1.1 codec
//!
//! The codec is split the same way an exchange is:
//!
//! - [`RequestEncoder`] writes a request head followed by its payload, framed either by
//!   `Content-Length` or by chunked transfer encoding
//! - [`ResponseDecoder`] parses the response head and then yields the response payload as a
//!   sequence of [`PayloadItem`](crate::protocol::PayloadItem)s ending with `Eof`
//!
//! Both are plain [`tokio_util::codec`] implementations and are normally driven through
//! [`ClientConnection`](crate::connection::ClientConnection).
//!
//! ```
//! use bytes::BytesMut;
//! use http::Method;
//! use micro_client_wire::codec::ResponseDecoder;
//! use micro_client_wire::protocol::Message;
//! use tokio_util::codec::Decoder;
//!
//! let mut decoder = ResponseDecoder::new(&Method::GET);
//! let mut buffer = BytesMut::from(&b"HTTP/1.1 204 No Content\r\n\r\n"[..]);
//! let message = decoder.decode(&mut buffer).unwrap().unwrap();
//! assert!(matches!(message, Message::Header(_)));
//! ```

mod body;
mod header;
mod request_encoder;
mod response_decoder;

pub use header::{MAX_HEADER_BYTES, MAX_HEADER_NUM};
pub use request_encoder::RequestEncoder;
pub use response_decoder::ResponseDecoder;
