//! Chunked transfer coding, see
//! [RFC 9112 Section 7.1](https://www.rfc-editor.org/rfc/rfc9112#section-7.1).
//!
//! ```text
//! chunked-body = *chunk last-chunk trailer-section CRLF
//! chunk        = chunk-size [ chunk-ext ] CRLF chunk-data CRLF
//! last-chunk   = 1*("0") [ chunk-ext ] CRLF
//! ```
//!
//! Chunk extensions and trailer fields are parsed past and discarded. Line endings are
//! accepted as either `CRLF` or a bare `LF`.

use std::cmp;

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;
use crate::protocol::{ParseError, PayloadItem};

/// Longest size line or trailer line accepted before giving up on the body
const MAX_LINE_SIZE: usize = 4 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Size,
    Data { remaining: u64 },
    DataEnd,
    Trailers,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: State,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: State::Size }
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                State::Size => {
                    let Some(line) = take_line(src)? else {
                        return Ok(None);
                    };
                    let size = parse_chunk_size(&line)?;
                    trace!(chunk_size = size, "read chunk size");
                    self.state = if size == 0 { State::Trailers } else { State::Data { remaining: size } };
                }

                State::Data { remaining } => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let len = usize::try_from(cmp::min(remaining, src.len() as u64)).unwrap_or(src.len());
                    let bytes = src.split_to(len).freeze();
                    let remaining = remaining - len as u64;
                    self.state = if remaining == 0 { State::DataEnd } else { State::Data { remaining } };
                    return Ok(Some(PayloadItem::Chunk(bytes)));
                }

                State::DataEnd => {
                    let Some(line) = take_line(src)? else {
                        return Ok(None);
                    };
                    ensure!(line.is_empty(), ParseError::invalid_body("chunk data is longer than its declared size"));
                    self.state = State::Size;
                }

                State::Trailers => {
                    let Some(line) = take_line(src)? else {
                        return Ok(None);
                    };
                    if line.is_empty() {
                        self.state = State::Done;
                    }
                }

                State::Done => return Ok(Some(PayloadItem::Eof)),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(item) => Ok(Some(item)),
            None => Err(ParseError::UnexpectedEof),
        }
    }
}

/// Splits one line off the front of `src`, without its line ending.
fn take_line(src: &mut BytesMut) -> Result<Option<BytesMut>, ParseError> {
    let Some(newline) = src.iter().position(|b| *b == b'\n') else {
        ensure!(src.len() <= MAX_LINE_SIZE, ParseError::invalid_body("chunk line too long"));
        return Ok(None);
    };
    ensure!(newline <= MAX_LINE_SIZE, ParseError::invalid_body("chunk line too long"));

    let mut line = src.split_to(newline);
    src.advance(1);
    if line.last() == Some(&b'\r') {
        line.truncate(line.len() - 1);
    }
    Ok(Some(line))
}

fn parse_chunk_size(line: &[u8]) -> Result<u64, ParseError> {
    let size = line.split(|b| *b == b';').next().unwrap_or_default().trim_ascii();
    ensure!(!size.is_empty(), ParseError::invalid_body("missing chunk size"));

    let size = std::str::from_utf8(size).map_err(|_| ParseError::invalid_body("chunk size is not ascii"))?;
    u64::from_str_radix(size, 16).map_err(|e| ParseError::invalid_body(format!("invalid chunk size {size}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use indoc::indoc;

    fn decode_all(decoder: &mut ChunkedDecoder, buffer: &mut BytesMut) -> Vec<PayloadItem> {
        let mut items = vec![];
        while let Some(item) = decoder.decode(buffer).unwrap() {
            let eof = item.is_eof();
            items.push(item);
            if eof {
                break;
            }
        }
        items
    }

    #[test]
    fn simple_body() {
        let mut buffer = BytesMut::from(&b"5\r\nhello\r\n6\r\n world\r\n0\r\n\r\nHTTP/1.1"[..]);
        let items = decode_all(&mut ChunkedDecoder::new(), &mut buffer);

        assert_eq!(
            items,
            vec![PayloadItem::Chunk(Bytes::from_static(b"hello")), PayloadItem::Chunk(Bytes::from_static(b" world")), PayloadItem::Eof]
        );
        assert_eq!(&buffer[..], b"HTTP/1.1");
    }

    #[test]
    fn extensions_and_trailers_are_dropped() {
        let str = indoc! {"
            4;name=value
            wiki
            0
            Expires: never

            "};
        let mut buffer = BytesMut::from(str);
        let items = decode_all(&mut ChunkedDecoder::new(), &mut buffer);

        assert_eq!(items, vec![PayloadItem::Chunk(Bytes::from_static(b"wiki")), PayloadItem::Eof]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn data_split_across_reads() {
        let mut decoder = ChunkedDecoder::new();
        let mut buffer = BytesMut::from(&b"A\r\n01234"[..]);

        assert_eq!(decoder.decode(&mut buffer).unwrap(), Some(PayloadItem::Chunk(Bytes::from_static(b"01234"))));
        assert_eq!(decoder.decode(&mut buffer).unwrap(), None);

        buffer.extend_from_slice(b"56789\r\n0\r\n\r\n");
        assert_eq!(decoder.decode(&mut buffer).unwrap(), Some(PayloadItem::Chunk(Bytes::from_static(b"56789"))));
        assert_eq!(decoder.decode(&mut buffer).unwrap(), Some(PayloadItem::Eof));
    }

    #[test]
    fn invalid_size_is_rejected() {
        let mut buffer = BytesMut::from(&b"zz\r\n"[..]);
        assert!(matches!(ChunkedDecoder::new().decode(&mut buffer), Err(ParseError::InvalidBody { .. })));
    }

    #[test]
    fn oversized_chunk_data_is_rejected() {
        let mut decoder = ChunkedDecoder::new();
        let mut buffer = BytesMut::from(&b"2\r\nabc\r\n"[..]);
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_chunk());
        assert!(matches!(decoder.decode(&mut buffer), Err(ParseError::InvalidBody { .. })));
    }

    #[test]
    fn truncated_body_on_close() {
        let mut decoder = ChunkedDecoder::new();
        let mut buffer = BytesMut::from(&b"5\r\nhel"[..]);
        assert!(decoder.decode_eof(&mut buffer).unwrap().unwrap().is_chunk());
        assert!(matches!(decoder.decode_eof(&mut buffer), Err(ParseError::UnexpectedEof)));
    }
}
