use std::io::Write;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::Encoder;

use crate::protocol::{PayloadItem, SendError};

/// Frames each payload item as one chunk and terminates with the zero-size chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkedEncoder {
    eof: bool,
}

impl ChunkedEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finish(&self) -> bool {
        self.eof
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for ChunkedEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if self.eof {
            return Ok(());
        }

        match item {
            // a zero-size chunk would terminate the body early
            PayloadItem::Chunk(bytes) if !bytes.has_remaining() => Ok(()),
            PayloadItem::Chunk(mut bytes) => {
                let size = bytes.remaining();
                write!((&mut *dst).writer(), "{size:X}\r\n")?;
                dst.reserve(size + 2);
                while bytes.has_remaining() {
                    let chunk = bytes.chunk();
                    let n = chunk.len();
                    dst.extend_from_slice(chunk);
                    bytes.advance(n);
                }
                dst.extend_from_slice(b"\r\n");
                Ok(())
            }
            PayloadItem::Eof => {
                self.eof = true;
                dst.extend_from_slice(b"0\r\n\r\n");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn frames_chunks() {
        let mut encoder = ChunkedEncoder::new();
        let mut dst = BytesMut::new();
        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"hello world!")), &mut dst).unwrap();
        encoder.encode(PayloadItem::Chunk(Bytes::new()), &mut dst).unwrap();
        encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).unwrap();
        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"late")), &mut dst).unwrap();

        assert!(encoder.is_finish());
        assert_eq!(&dst[..], b"C\r\nhello world!\r\n0\r\n\r\n");
    }
}
