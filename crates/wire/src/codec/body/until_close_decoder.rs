use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::protocol::{ParseError, PayloadItem};

/// Body of a response with neither `Content-Length` nor chunked coding: it ends when the
/// server closes the connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UntilCloseDecoder {
    eof_sent: bool,
}

impl UntilCloseDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for UntilCloseDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        Ok(Some(PayloadItem::Chunk(src.split().freeze())))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if !src.is_empty() {
            return self.decode(src);
        }
        if self.eof_sent {
            return Ok(None);
        }
        self.eof_sent = true;
        Ok(Some(PayloadItem::Eof))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eof_only_on_close() {
        let mut decoder = UntilCloseDecoder::new();
        let mut buffer = BytesMut::from(&b"streaming"[..]);

        assert_eq!(decoder.decode(&mut buffer).unwrap(), Some(PayloadItem::Chunk("streaming".into())));
        assert_eq!(decoder.decode(&mut buffer).unwrap(), None);

        buffer.extend_from_slice(b"tail");
        assert_eq!(decoder.decode_eof(&mut buffer).unwrap(), Some(PayloadItem::Chunk("tail".into())));
        assert_eq!(decoder.decode_eof(&mut buffer).unwrap(), Some(PayloadItem::Eof));
        assert_eq!(decoder.decode_eof(&mut buffer).unwrap(), None);
    }
}
