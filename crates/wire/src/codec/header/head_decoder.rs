//! Parses the status line and headers of a response.
//!
//! Parsing is done with `httparse` into a stack-allocated header array, so a head with more
//! than [`MAX_HEADER_NUM`] headers or larger than [`MAX_HEADER_BYTES`] is rejected instead of
//! buffered without bound.
//!
//! Besides the head itself the decoder decides how the body that follows is framed. That
//! depends on the request as well as the response: the answer to a `HEAD` request never has a
//! body, whatever its `Content-Length` says. Interim `1xx` responses (other than `101`) are
//! consumed and skipped.

use bytes::{Buf, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Response, StatusCode, Version, header};
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::trace;

use super::{MAX_HEADER_BYTES, MAX_HEADER_NUM};
use crate::ensure;
use crate::protocol::{ParseError, PayloadSize, ResponseHeader};

#[derive(Debug)]
pub struct HeadDecoder {
    request_method: Method,
}

impl HeadDecoder {
    pub fn new(request_method: &Method) -> Self {
        Self { request_method: request_method.clone() }
    }
}

impl Decoder for HeadDecoder {
    type Item = (ResponseHeader, PayloadSize);
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(header) = parse_head(src)? else {
                return Ok(None);
            };

            if header.is_interim() {
                trace!(status = %header.status(), "skip interim response");
                continue;
            }

            let payload_size = payload_size(&self.request_method, &header)?;
            return Ok(Some((header, payload_size)));
        }
    }
}

fn parse_head(src: &mut BytesMut) -> Result<Option<ResponseHeader>, ParseError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
    let mut parsed = httparse::Response::new(&mut headers);

    let status = parsed.parse(src).map_err(|e| match e {
        Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
        e => ParseError::invalid_header(e.to_string()),
    })?;

    let body_offset = match status {
        Status::Complete(body_offset) => body_offset,
        Status::Partial => {
            ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(src.len(), MAX_HEADER_BYTES));
            return Ok(None);
        }
    };
    ensure!(body_offset <= MAX_HEADER_BYTES, ParseError::too_large_header(body_offset, MAX_HEADER_BYTES));

    let version = match parsed.version {
        Some(0) => Version::HTTP_10,
        Some(1) => Version::HTTP_11,
        v => return Err(ParseError::InvalidVersion(v)),
    };

    let code = parsed.code.ok_or(ParseError::InvalidStatus(None))?;
    let status = StatusCode::from_u16(code).map_err(|_| ParseError::InvalidStatus(Some(code)))?;

    let mut header_map = HeaderMap::with_capacity(parsed.headers.len());
    for header in parsed.headers.iter() {
        let name = HeaderName::from_bytes(header.name.as_bytes()).map_err(ParseError::invalid_header)?;
        let value = HeaderValue::from_bytes(header.value).map_err(ParseError::invalid_header)?;
        header_map.append(name, value);
    }

    src.advance(body_offset);
    trace!(head_size = body_offset, %status, "parsed response head");

    let mut response = Response::new(());
    *response.status_mut() = status;
    *response.version_mut() = version;
    *response.headers_mut() = header_map;
    Ok(Some(ResponseHeader::from(response)))
}

/// Decides how the response body is delimited, following RFC 9112 section 6.3.
fn payload_size(request_method: &Method, header: &ResponseHeader) -> Result<PayloadSize, ParseError> {
    let status = header.status();
    if *request_method == Method::HEAD
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
    {
        return Ok(PayloadSize::Empty);
    }

    if let Some(te_value) = header.headers().get(header::TRANSFER_ENCODING) {
        // transfer-encoding overrides content-length; anything not ending in chunked runs to close
        return Ok(if is_chunked(te_value) { PayloadSize::Chunked } else { PayloadSize::UntilClose });
    }

    let mut lengths = header.headers().get_all(header::CONTENT_LENGTH).iter();
    let Some(first) = lengths.next() else {
        return Ok(PayloadSize::UntilClose);
    };
    ensure!(lengths.all(|other| other == first), ParseError::invalid_content_length("conflicting content-length values"));

    let cl_str = first.to_str().map_err(|_| ParseError::invalid_content_length("value can't to_str"))?;
    let length = cl_str.trim().parse::<u64>().map_err(|_| ParseError::invalid_content_length(format!("value {cl_str} is not u64")))?;

    Ok(match length {
        0 => PayloadSize::Empty,
        n => PayloadSize::Length(n),
    })
}

fn is_chunked(value: &HeaderValue) -> bool {
    value.as_bytes().rsplit(|b| *b == b',').next().is_some_and(|last| last.trim_ascii().eq_ignore_ascii_case(b"chunked"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn decode(method: &Method, raw: &str) -> (ResponseHeader, PayloadSize, BytesMut) {
        let mut buf = BytesMut::from(raw);
        let (header, payload_size) = HeadDecoder::new(method).decode(&mut buf).unwrap().unwrap();
        (header, payload_size, buf)
    }

    #[test]
    fn from_nginx() {
        let str = indoc! {r##"
        HTTP/1.1 200 OK
        Server: nginx/1.25.3
        Date: Tue, 14 May 2024 08:12:31 GMT
        Content-Type: text/html; charset=utf-8
        Content-Length: 5
        Connection: close

        hello"##};

        let (header, payload_size, rest) = decode(&Method::GET, str);

        assert_eq!(header.status(), StatusCode::OK);
        assert_eq!(header.version(), Version::HTTP_11);
        assert_eq!(header.headers().len(), 5);
        assert_eq!(header.headers().get(header::SERVER).unwrap(), "nginx/1.25.3");
        assert_eq!(payload_size, PayloadSize::Length(5));
        assert_eq!(&rest[..], b"hello");
    }

    #[test]
    fn partial_head_needs_more() {
        let mut buf = BytesMut::from("HTTP/1.1 200 OK\r\nContent-Le");
        assert!(HeadDecoder::new(&Method::GET).decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 27);
    }

    #[test]
    fn head_request_has_no_body() {
        let (_, payload_size, _) = decode(&Method::HEAD, "HTTP/1.1 200 OK\r\nContent-Length: 1024\r\n\r\n");
        assert!(payload_size.is_empty());
    }

    #[test]
    fn no_content_and_not_modified_have_no_body() {
        let (_, payload_size, _) = decode(&Method::GET, "HTTP/1.1 204 No Content\r\n\r\n");
        assert!(payload_size.is_empty());
        let (_, payload_size, _) = decode(&Method::GET, "HTTP/1.1 304 Not Modified\r\nContent-Length: 10\r\n\r\n");
        assert!(payload_size.is_empty());
    }

    #[test]
    fn chunked_and_until_close() {
        let (_, payload_size, _) = decode(&Method::GET, "HTTP/1.1 200 OK\r\nTransfer-Encoding: gzip, chunked\r\n\r\n");
        assert!(payload_size.is_chunked());

        let (_, payload_size, _) = decode(&Method::GET, "HTTP/1.1 200 OK\r\nTransfer-Encoding: gzip\r\n\r\n");
        assert_eq!(payload_size, PayloadSize::UntilClose);

        let (_, payload_size, _) = decode(&Method::GET, "HTTP/1.0 200 OK\r\n\r\nbody");
        assert_eq!(payload_size, PayloadSize::UntilClose);
    }

    #[test]
    fn interim_responses_are_skipped() {
        let (header, payload_size, rest) =
            decode(&Method::POST, "HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 201 Created\r\nContent-Length: 2\r\n\r\nok");
        assert_eq!(header.status(), StatusCode::CREATED);
        assert_eq!(payload_size, PayloadSize::Length(2));
        assert_eq!(&rest[..], b"ok");
    }

    #[test]
    fn conflicting_content_length_is_rejected() {
        let mut buf = BytesMut::from("HTTP/1.1 200 OK\r\nContent-Length: 2\r\nContent-Length: 3\r\n\r\n");
        let result = HeadDecoder::new(&Method::GET).decode(&mut buf);
        assert!(matches!(result, Err(ParseError::InvalidContentLength { .. })));
    }

    #[test]
    fn oversized_head_is_rejected() {
        let mut raw = String::from("HTTP/1.1 200 OK\r\nX-Padding: ");
        raw.push_str(&"a".repeat(MAX_HEADER_BYTES));
        let mut buf = BytesMut::from(raw.as_str());
        let result = HeadDecoder::new(&Method::GET).decode(&mut buf);
        assert!(matches!(result, Err(ParseError::TooLargeHeader { .. })));
    }

    #[test]
    fn check_is_chunked() {
        assert!(is_chunked(&HeaderValue::from_static("chunked")));
        assert!(is_chunked(&HeaderValue::from_static("gzip, Chunked")));
        assert!(!is_chunked(&HeaderValue::from_static("chunked, gzip")));
        assert!(!is_chunked(&HeaderValue::from_static("gzip")));
    }
}
