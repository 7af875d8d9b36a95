//! Encoding of request heads and decoding of response heads.

mod head_decoder;
mod head_encoder;

pub use head_decoder::HeadDecoder;
pub use head_encoder::HeadEncoder;

/// Maximum number of headers accepted in a response head
pub const MAX_HEADER_NUM: usize = 64;

/// Maximum size in bytes of a response head, status line included
pub const MAX_HEADER_BYTES: usize = 8 * 1024;
