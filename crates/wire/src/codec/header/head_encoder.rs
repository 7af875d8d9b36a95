//! Serializes a request line and headers.
//!
//! The encoder owns the framing headers: whatever the caller put in `Content-Length` or
//! `Transfer-Encoding` is replaced by what the [`PayloadSize`] says, and a missing `Host`
//! header is filled in from the request URI.

use std::io;
use std::io::Write;

use bytes::{BufMut, BytesMut};
use http::uri::PathAndQuery;
use http::{HeaderValue, Version, header};
use tokio_util::codec::Encoder;
use tracing::error;

use crate::protocol::{PayloadSize, RequestHead, SendError, method_permits_empty_length};

const INIT_HEADER_SIZE: usize = 1024;

const CHUNKED: HeaderValue = HeaderValue::from_static("chunked");
const ZERO: HeaderValue = HeaderValue::from_static("0");

#[derive(Debug)]
pub struct HeadEncoder;

impl Encoder<(RequestHead, PayloadSize)> for HeadEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (RequestHead, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut head, payload_size) = item;

        let version = match head.version() {
            Version::HTTP_11 => "HTTP/1.1",
            Version::HTTP_10 => "HTTP/1.0",
            v => {
                error!(http_version = ?v, "unsupported http version");
                return Err(io::Error::from(io::ErrorKind::Unsupported).into());
            }
        };

        let target = head.uri().path_and_query().map_or("/", PathAndQuery::as_str);

        dst.reserve(INIT_HEADER_SIZE);
        write!(FastWrite(dst), "{} {} {}\r\n", head.method(), target, version)?;

        if !head.headers().contains_key(header::HOST) {
            let host = host_value(&head)?;
            head.headers_mut().insert(header::HOST, host);
        }

        let headers = head.headers_mut();
        match payload_size {
            PayloadSize::Length(n) => {
                headers.remove(header::TRANSFER_ENCODING);
                headers.insert(header::CONTENT_LENGTH, n.into());
            }
            PayloadSize::Chunked => {
                headers.remove(header::CONTENT_LENGTH);
                headers.insert(header::TRANSFER_ENCODING, CHUNKED);
            }
            PayloadSize::Empty => {
                headers.remove(header::TRANSFER_ENCODING);
                headers.remove(header::CONTENT_LENGTH);
                if method_permits_empty_length(head.method()) {
                    head.headers_mut().insert(header::CONTENT_LENGTH, ZERO);
                }
            }
            PayloadSize::UntilClose => {
                return Err(SendError::invalid_head("a request body can't be delimited by closing the connection"));
            }
        }

        for (name, value) in head.headers() {
            dst.put_slice(name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(value.as_ref());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

fn host_value(head: &RequestHead) -> Result<HeaderValue, SendError> {
    let uri = head.uri();
    let host = uri.host().ok_or_else(|| SendError::invalid_head(format!("request uri {uri} has no host")))?;
    let value = match uri.port_u16() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    HeaderValue::from_str(&value).map_err(SendError::invalid_head)
}

struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Request;

    fn encode(head: RequestHead, payload_size: PayloadSize) -> String {
        let mut dst = BytesMut::new();
        HeadEncoder.encode((head, payload_size), &mut dst).unwrap();
        String::from_utf8(dst.to_vec()).unwrap().replace("\r\n", "\n")
    }

    #[test]
    fn get_without_body() {
        let head = Request::get("http://example.com/index.html?a=1").header("accept", "*/*").body(()).unwrap();

        let expected = "GET /index.html?a=1 HTTP/1.1\naccept: */*\nhost: example.com\n\n";
        assert_eq!(encode(head, PayloadSize::Empty), expected);
    }

    #[test]
    fn host_keeps_explicit_port() {
        let head = Request::get("http://127.0.0.1:8080").body(()).unwrap();
        let encoded = encode(head, PayloadSize::Empty);
        assert!(encoded.starts_with("GET / HTTP/1.1\n"));
        assert!(encoded.contains("host: 127.0.0.1:8080\n"));
    }

    #[test]
    fn explicit_host_wins() {
        let head = Request::get("http://127.0.0.1:8080/").header("host", "virtual.test").body(()).unwrap();
        let encoded = encode(head, PayloadSize::Empty);
        assert!(encoded.contains("host: virtual.test\n"));
        assert!(!encoded.contains("127.0.0.1"));
    }

    #[test]
    fn framing_headers_follow_payload_size() {
        let head = Request::post("http://example.com/upload").header("content-length", "999").body(()).unwrap();
        let encoded = encode(head, PayloadSize::Chunked);
        assert!(encoded.contains("transfer-encoding: chunked\n"));
        assert!(!encoded.contains("content-length"));

        let head = Request::put("http://example.com/upload").body(()).unwrap();
        assert!(encode(head, PayloadSize::Length(5)).contains("content-length: 5\n"));

        let head = Request::post("http://example.com/upload").body(()).unwrap();
        assert!(encode(head, PayloadSize::Empty).contains("content-length: 0\n"));

        let head = Request::delete("http://example.com/item").body(()).unwrap();
        assert!(!encode(head, PayloadSize::Empty).contains("content-length"));
    }

    #[test]
    fn relative_uri_without_host_is_rejected() {
        let head = Request::get("/relative").body(()).unwrap();
        let mut dst = BytesMut::new();
        let result = HeadEncoder.encode((head, PayloadSize::Empty), &mut dst);
        assert!(matches!(result, Err(SendError::InvalidHead { .. })));
    }
}
