//! Payload framing for both directions of an exchange.
//!
//! ## Decoders (response bodies)
//! - [`LengthDecoder`]: exactly `Content-Length` bytes
//! - [`ChunkedDecoder`]: chunked transfer coding, trailers are read and dropped
//! - [`UntilCloseDecoder`]: everything until the server closes the connection
//! - [`PayloadDecoder`]: picks one of the above from a [`PayloadSize`](crate::protocol::PayloadSize)
//!
//! ## Encoders (request bodies)
//! - [`LengthEncoder`]: raw bytes, checked against the announced length
//! - [`ChunkedEncoder`]: chunked transfer coding
//! - [`PayloadEncoder`]: picks one of the above
//!
//! Decoders also implement `decode_eof` so a connection that closes in the middle of a
//! delimited body is reported as [`ParseError::UnexpectedEof`](crate::protocol::ParseError::UnexpectedEof)
//! instead of a silently short body.

mod chunked_decoder;
mod chunked_encoder;
mod length_decoder;
mod length_encoder;
mod payload_decoder;
mod payload_encoder;
mod until_close_decoder;

pub use chunked_decoder::ChunkedDecoder;
pub use chunked_encoder::ChunkedEncoder;
pub use length_decoder::LengthDecoder;
pub use length_encoder::LengthEncoder;
pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;
pub use until_close_decoder::UntilCloseDecoder;
