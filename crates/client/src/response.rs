//! The response handed back to callers.

use bytes::Bytes;
use http::header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, StatusCode, Version};
use mime::Mime;
use tracing::trace;

use crate::decoding::{ContentDecoder, decode_all};
use crate::error::{ClientError, TransportError};
use crate::options::ResponseBodyType;
use crate::pipe::BodyStream;
use crate::reactor::{RawBody, RawResponse};

/// Result delivered for every request: a response or the reason there is none.
pub type ResponseResult = Result<Response, ClientError>;

#[derive(Debug, Clone)]
pub enum ResponseBody {
    Text(String),
    Bytes(Bytes),
    /// Body still arriving; clones share the same read end
    Stream(BodyStream),
}

impl ResponseBody {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseBody::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ResponseBody::Text(text) => Some(text.as_bytes()),
            ResponseBody::Bytes(bytes) => Some(bytes),
            ResponseBody::Stream(_) => None,
        }
    }

    pub fn into_stream(self) -> Option<BodyStream> {
        match self {
            ResponseBody::Stream(stream) => Some(stream),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    body: ResponseBody,
    content_encoding: Option<String>,
}

impl Response {
    pub fn new(status: StatusCode, headers: HeaderMap, body: ResponseBody) -> Self {
        Self { status, version: Version::HTTP_11, headers, body, content_encoding: None }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    pub fn into_body(self) -> ResponseBody {
        self.body
    }

    #[must_use]
    pub fn with_body(mut self, body: ResponseBody) -> Self {
        self.body = body;
        self
    }

    /// The `Content-Encoding` the server sent, also when the body was decoded.
    pub fn content_encoding(&self) -> Option<&str> {
        self.content_encoding.as_deref()
    }

    /// Shapes a raw response, decoding a buffered body first when `decompress` is on.
    pub(crate) fn from_raw(raw: RawResponse, shape: ResponseBodyType, decompress: bool) -> Result<Self, ClientError> {
        let RawResponse { status, version, mut headers, content_encoding, body } = raw;

        let body = match body {
            RawBody::Stream(stream) => ResponseBody::Stream(stream),
            RawBody::Buffered(bytes) => {
                let decoder = content_encoding.as_deref().filter(|_| decompress).and_then(ContentDecoder::select);
                let bytes = match decoder {
                    Some(decoder) => {
                        let decoded = decode_all(decoder, &bytes).map_err(ClientError::decode)?;
                        headers.remove(CONTENT_ENCODING);
                        headers.remove(CONTENT_LENGTH);
                        decoded
                    }
                    None => bytes,
                };
                shape_body(bytes, shape, &headers)
            }
            RawBody::Streamed => return Err(TransportError::protocol("streamed response has no body left to shape").into()),
        };

        Ok(Self { status, version, headers, body, content_encoding })
    }
}

fn shape_body(bytes: Bytes, shape: ResponseBodyType, headers: &HeaderMap) -> ResponseBody {
    let mime = headers.get(CONTENT_TYPE).and_then(|value| value.to_str().ok()).and_then(|value| value.parse::<Mime>().ok());
    match shape {
        ResponseBodyType::Text => ResponseBody::Text(decode_text(&bytes, mime.as_ref())),
        ResponseBodyType::Binary => ResponseBody::Bytes(bytes),
        ResponseBodyType::Stream => ResponseBody::Stream(BodyStream::from(bytes)),
        ResponseBodyType::Auto => match &mime {
            Some(mime) if is_textual(mime) => ResponseBody::Text(decode_text(&bytes, Some(mime))),
            _ => ResponseBody::Bytes(bytes),
        },
    }
}

fn is_textual(mime: &Mime) -> bool {
    mime.type_() == mime::TEXT
        || mime.subtype() == mime::JSON
        || mime.subtype() == mime::XML
        || mime.subtype() == mime::JAVASCRIPT
        || mime.suffix().is_some_and(|suffix| suffix == mime::JSON || suffix == mime::XML)
        || mime.essence_str() == mime::APPLICATION_WWW_FORM_URLENCODED.essence_str()
}

fn decode_text(bytes: &[u8], mime: Option<&Mime>) -> String {
    let charset = mime.and_then(|mime| mime.get_param(mime::CHARSET)).map(|charset| charset.as_str().to_ascii_lowercase());
    match charset.as_deref() {
        None | Some("utf-8" | "utf8" | "us-ascii") => String::from_utf8_lossy(bytes).into_owned(),
        Some("iso-8859-1" | "latin1" | "latin-1") => bytes.iter().copied().map(char::from).collect(),
        Some(other) => {
            trace!(charset = other, "unsupported charset, decoding as utf-8");
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoding::tests::gzip;
    use std::io::Read;

    fn raw(headers: &[(&str, &str)], body: &[u8]) -> RawResponse {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.insert(http::HeaderName::from_bytes(name.as_bytes()).unwrap(), value.parse().unwrap());
        }
        let content_encoding = map.get(CONTENT_ENCODING).map(|v| v.to_str().unwrap().to_owned());
        RawResponse {
            status: StatusCode::OK,
            version: Version::HTTP_11,
            headers: map,
            content_encoding,
            body: RawBody::Buffered(Bytes::copy_from_slice(body)),
        }
    }

    #[test]
    fn auto_shape_follows_content_type() {
        let text = Response::from_raw(raw(&[("content-type", "application/json")], b"{}"), ResponseBodyType::Auto, true).unwrap();
        assert_eq!(text.body().as_text(), Some("{}"));

        let vendor = Response::from_raw(raw(&[("content-type", "application/vnd.api+json")], b"[]"), ResponseBodyType::Auto, true).unwrap();
        assert_eq!(vendor.body().as_text(), Some("[]"));

        let binary = Response::from_raw(raw(&[("content-type", "image/png")], b"\x89PNG"), ResponseBodyType::Auto, true).unwrap();
        assert!(matches!(binary.body(), ResponseBody::Bytes(bytes) if &bytes[..] == b"\x89PNG"));

        let untyped = Response::from_raw(raw(&[], b"??"), ResponseBodyType::Auto, true).unwrap();
        assert!(matches!(untyped.body(), ResponseBody::Bytes(_)));
    }

    #[test]
    fn text_honours_latin1() {
        let response =
            Response::from_raw(raw(&[("content-type", "text/plain; charset=ISO-8859-1")], b"caf\xe9"), ResponseBodyType::Text, true).unwrap();
        assert_eq!(response.body().as_text(), Some("café"));
    }

    #[test]
    fn gzip_body_is_decoded() {
        let compressed = gzip(b"<p>compressed</p>");
        let response = Response::from_raw(
            raw(&[("content-type", "text/html"), ("content-encoding", "gzip"), ("content-length", "1")], &compressed),
            ResponseBodyType::Auto,
            true,
        )
        .unwrap();

        assert_eq!(response.body().as_text(), Some("<p>compressed</p>"));
        assert_eq!(response.content_encoding(), Some("gzip"));
        assert!(!response.headers().contains_key(CONTENT_ENCODING));
        assert!(!response.headers().contains_key(CONTENT_LENGTH));
    }

    #[test]
    fn decompression_can_be_turned_off() {
        let compressed = gzip(b"raw");
        let response = Response::from_raw(raw(&[("content-encoding", "gzip")], &compressed), ResponseBodyType::Binary, false).unwrap();
        assert_eq!(response.body().as_bytes(), Some(&compressed[..]));
        assert_eq!(response.headers()[CONTENT_ENCODING], "gzip");
    }

    #[test]
    fn corrupt_body_is_a_decode_failure() {
        let err = Response::from_raw(raw(&[("content-encoding", "gzip")], b"this body is certainly not gzip"), ResponseBodyType::Auto, true).unwrap_err();
        assert!(matches!(err, ClientError::Decode { .. }));
    }

    #[test]
    fn buffered_body_can_be_read_as_a_stream() {
        let response = Response::from_raw(raw(&[], b"as a stream"), ResponseBodyType::Stream, true).unwrap();
        let mut body = String::new();
        response.into_body().into_stream().unwrap().read_to_string(&mut body).unwrap();
        assert_eq!(body, "as a stream");
    }
}
