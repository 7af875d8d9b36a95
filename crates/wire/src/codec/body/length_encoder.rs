use bytes::{Buf, BytesMut};
use tokio_util::codec::Encoder;

use crate::ensure;
use crate::protocol::{PayloadItem, SendError};

/// Writes body bytes verbatim while keeping count against the announced `Content-Length`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthEncoder {
    remaining: u64,
    eof: bool,
}

impl LengthEncoder {
    pub fn new(length: u64) -> Self {
        Self { remaining: length, eof: false }
    }

    pub fn is_finish(&self) -> bool {
        self.eof
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for LengthEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            PayloadItem::Chunk(mut bytes) => {
                let len = bytes.remaining() as u64;
                ensure!(len <= self.remaining, SendError::invalid_body("request body is longer than its content-length"));
                self.remaining -= len;
                while bytes.has_remaining() {
                    let chunk = bytes.chunk();
                    let n = chunk.len();
                    dst.extend_from_slice(chunk);
                    bytes.advance(n);
                }
                Ok(())
            }
            PayloadItem::Eof => {
                ensure!(self.remaining == 0, SendError::invalid_body(format!("request body is {} bytes short", self.remaining)));
                self.eof = true;
                Ok(())
            }
        }
    }
}
