//! Typed head of an incoming response.

use http::response::Parts;
use http::{HeaderMap, Response, StatusCode, Version};

/// Status line and headers of a response, without its body.
///
/// Produced by the response decoder once the full head has arrived. The body follows as
/// [`super::PayloadItem`]s.
#[derive(Debug)]
pub struct ResponseHeader {
    inner: Response<()>,
}

impl ResponseHeader {
    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    /// Splits into status, version and headers, dropping the placeholder body
    pub fn into_parts(self) -> (StatusCode, Version, HeaderMap) {
        let (parts, ()) = self.inner.into_parts();
        (parts.status, parts.version, parts.headers)
    }

    /// Attaches a body, yielding a complete `http::Response`
    pub fn body<T>(self, body: T) -> Response<T> {
        let (parts, ()) = self.inner.into_parts();
        Response::from_parts(parts, body)
    }

    pub(crate) fn is_interim(&self) -> bool {
        self.status().is_informational() && self.status() != StatusCode::SWITCHING_PROTOCOLS
    }
}

impl From<Parts> for ResponseHeader {
    #[inline]
    fn from(parts: Parts) -> Self {
        Self { inner: Response::from_parts(parts, ()) }
    }
}

impl From<Response<()>> for ResponseHeader {
    #[inline]
    fn from(response: Response<()>) -> Self {
        Self { inner: response }
    }
}

impl From<ResponseHeader> for Response<()> {
    fn from(header: ResponseHeader) -> Self {
        header.inner
    }
}

