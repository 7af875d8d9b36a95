//! `Content-Encoding` decoding of response bodies.
//!
//! Decoders are write driven: compressed bytes are pushed in with [`ContentDecoder::write`]
//! as they arrive and whatever has been decompressed so far is pulled out with
//! [`ContentDecoder::take`]. That lets the same decoder serve a fully buffered body and a
//! body streamed chunk by chunk.

use std::fmt;
use std::io;
use std::io::Write;

use bytes::{Bytes, BytesMut};
use flate2::write::{GzDecoder, ZlibDecoder};
use http::HeaderValue;
use tracing::trace;
use zstd::stream::write::Decoder as ZstdDecoder;

/// Value sent in `Accept-Encoding` when the caller has not set one.
pub const ACCEPT_ENCODING: HeaderValue = HeaderValue::from_static("gzip, deflate");

pub(crate) struct Writer {
    buf: BytesMut,
}

impl Writer {
    fn new() -> Self {
        Self { buf: BytesMut::with_capacity(4096) }
    }

    fn take(&mut self) -> Bytes {
        self.buf.split().freeze()
    }
}

impl Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub(crate) enum ContentDecoder {
    Gzip(GzDecoder<Writer>),
    Deflate(ZlibDecoder<Writer>),
    Zstd(ZstdDecoder<'static, Writer>),
    Br(Box<brotli::DecompressorWriter<Writer>>),
}

impl ContentDecoder {
    /// Picks a decoder for a `Content-Encoding` value, `None` for identity or unknown codings.
    pub(crate) fn select(content_encoding: &str) -> Option<Self> {
        match content_encoding.trim().to_ascii_lowercase().as_str() {
            "gzip" | "x-gzip" => Some(Self::Gzip(GzDecoder::new(Writer::new()))),
            "deflate" => Some(Self::Deflate(ZlibDecoder::new(Writer::new()))),
            "zstd" => ZstdDecoder::new(Writer::new()).ok().map(Self::Zstd),
            "br" => Some(Self::Br(Box::new(brotli::DecompressorWriter::new(Writer::new(), 32 * 1024)))),
            _ => None,
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            ContentDecoder::Gzip(_) => "gzip",
            ContentDecoder::Deflate(_) => "deflate",
            ContentDecoder::Zstd(_) => "zstd",
            ContentDecoder::Br(_) => "br",
        }
    }

    pub(crate) fn write(&mut self, data: &[u8]) -> io::Result<()> {
        let result = match self {
            Self::Gzip(decoder) => decoder.write_all(data),
            Self::Deflate(decoder) => decoder.write_all(data),
            Self::Zstd(decoder) => decoder.write_all(data),
            Self::Br(decoder) => decoder.write_all(data),
        };
        result.inspect_err(|e| trace!(encoding = self.name(), cause = %e, "error decoding response body"))
    }

    /// Decoded bytes produced so far.
    pub(crate) fn take(&mut self) -> Bytes {
        match self {
            Self::Gzip(decoder) => decoder.get_mut().take(),
            Self::Deflate(decoder) => decoder.get_mut().take(),
            Self::Zstd(decoder) => decoder.get_mut().take(),
            Self::Br(decoder) => decoder.get_mut().take(),
        }
    }

    /// Ends the input and returns the remaining decoded bytes.
    pub(crate) fn finish(mut self) -> io::Result<Bytes> {
        match &mut self {
            Self::Gzip(decoder) => decoder.try_finish()?,
            Self::Deflate(decoder) => decoder.try_finish()?,
            Self::Zstd(decoder) => decoder.flush()?,
            Self::Br(decoder) => decoder.flush()?,
        }
        Ok(self.take())
    }
}

impl fmt::Debug for ContentDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContentDecoder").field(&self.name()).finish()
    }
}

/// Decodes a complete body in one go.
pub(crate) fn decode_all(mut decoder: ContentDecoder, body: &[u8]) -> io::Result<Bytes> {
    decoder.write(body)?;
    let head = decoder.take();
    let tail = decoder.finish()?;
    if head.is_empty() {
        return Ok(tail);
    }
    let mut decoded = BytesMut::with_capacity(head.len() + tail.len());
    decoded.extend_from_slice(&head);
    decoded.extend_from_slice(&tail);
    Ok(decoded.freeze())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::{GzEncoder, ZlibEncoder};

    pub(crate) fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn gzip_in_one_piece() {
        let decoder = ContentDecoder::select("gzip").unwrap();
        let decoded = decode_all(decoder, &gzip(b"hello gzip")).unwrap();
        assert_eq!(&decoded[..], b"hello gzip");
    }

    #[test]
    fn deflate_chunk_by_chunk() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        let original = "deflate me ".repeat(500);
        encoder.write_all(original.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut decoder = ContentDecoder::select(" Deflate ").unwrap();
        let mut decoded = Vec::new();
        for piece in compressed.chunks(7) {
            decoder.write(piece).unwrap();
            decoded.extend_from_slice(&decoder.take());
        }
        decoded.extend_from_slice(&decoder.finish().unwrap());
        assert_eq!(decoded, original.as_bytes());
    }

    #[test]
    fn zstd_round() {
        let compressed = zstd::encode_all(&b"zstd body"[..], 3).unwrap();
        let decoded = decode_all(ContentDecoder::select("zstd").unwrap(), &compressed).unwrap();
        assert_eq!(&decoded[..], b"zstd body");
    }

    #[test]
    fn brotli_chunk_by_chunk() {
        let original = "brotli body ".repeat(300);
        let mut encoder = brotli::CompressorWriter::new(Vec::new(), 4096, 5, 22);
        encoder.write_all(original.as_bytes()).unwrap();
        let compressed = encoder.into_inner();

        let mut decoder = ContentDecoder::select("br").unwrap();
        assert_eq!(decoder.name(), "br");
        let mut decoded = Vec::new();
        for piece in compressed.chunks(5) {
            decoder.write(piece).unwrap();
            decoded.extend_from_slice(&decoder.take());
        }
        decoded.extend_from_slice(&decoder.finish().unwrap());
        assert_eq!(decoded, original.as_bytes());
    }

    #[test]
    fn unknown_and_identity() {
        assert!(ContentDecoder::select("identity").is_none());
        assert!(ContentDecoder::select("compress").is_none());
    }

    #[test]
    fn corrupt_input_is_an_error() {
        let decoder = ContentDecoder::select("gzip").unwrap();
        assert!(decode_all(decoder, b"definitely not gzip").is_err());
    }
}
