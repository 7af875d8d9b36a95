//! Coercion of caller options into a resolved, immutable request.
//!
//! [`coerce`] validates everything that can be validated before a byte is sent: the url and
//! its scheme, header names and values, the body against the method, and the TLS inputs.
//! Whatever it rejects is a [`ConfigurationError`] or a [`TlsError`](crate::error::TlsError)
//! returned to the caller directly, never a failed exchange.
//!
//! Coercion consumes the options and returns a new descriptor; the caller's TLS paths and
//! credentials end up only in the resolved context.

use std::fmt;
use std::io::Read;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use http::header::{ACCEPT_ENCODING, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use http::{HeaderMap, HeaderName, HeaderValue, Uri};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tracing::debug;

use crate::decoding;
use crate::error::{ClientError, ConfigurationError};
use crate::options::{HttpMethod, RequestBody, RequestOptions, ResponseBodyType};
use crate::tls;
use crate::tls::TlsContext;

/// Characters left alone in query keys and values: the RFC 3986 unreserved set.
const QUERY: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

/// Body of a resolved request.
pub enum RequestPayload {
    Text(String),
    Binary(Bytes),
    Stream(Box<dyn Read + Send>),
    /// `application/x-www-form-urlencoded` form parameters
    Form(String),
}

impl RequestPayload {
    pub fn is_empty(&self) -> bool {
        match self {
            RequestPayload::Text(text) | RequestPayload::Form(text) => text.is_empty(),
            RequestPayload::Binary(bytes) => bytes.is_empty(),
            RequestPayload::Stream(_) => false,
        }
    }

    /// Length of the payload, `None` for a stream.
    pub fn len(&self) -> Option<usize> {
        match self {
            RequestPayload::Text(text) | RequestPayload::Form(text) => Some(text.len()),
            RequestPayload::Binary(bytes) => Some(bytes.len()),
            RequestPayload::Stream(_) => None,
        }
    }
}

impl From<RequestBody> for RequestPayload {
    fn from(body: RequestBody) -> Self {
        match body {
            RequestBody::Text(text) => RequestPayload::Text(text),
            RequestBody::Bytes(bytes) => RequestPayload::Binary(bytes),
            RequestBody::Stream(reader) => RequestPayload::Stream(reader),
        }
    }
}

impl fmt::Debug for RequestPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestPayload::Text(text) => f.debug_tuple("Text").field(text).finish(),
            RequestPayload::Binary(bytes) => f.debug_tuple("Binary").field(bytes).finish(),
            RequestPayload::Stream(_) => f.write_str("Stream(..)"),
            RequestPayload::Form(form) => f.debug_tuple("Form").field(form).finish(),
        }
    }
}

/// Per exchange settings carried over from the options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeSettings {
    pub timeout: Duration,
    pub keep_alive: Duration,
    pub follow_redirects: bool,
    pub max_redirects: u32,
    pub response_type: ResponseBodyType,
    pub decompress_body: bool,
    pub pipe_capacity: usize,
}

/// A fully resolved request, ready to hand to a reactor.
#[derive(Debug)]
pub struct RequestDescriptor {
    url: String,
    uri: Uri,
    method: HttpMethod,
    headers: HeaderMap,
    body: Option<RequestPayload>,
    tls: Option<TlsContext>,
    settings: ExchangeSettings,
}

impl RequestDescriptor {
    /// The url with query parameters merged in.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&RequestPayload> {
        self.body.as_ref()
    }

    pub fn tls(&self) -> Option<&TlsContext> {
        self.tls.as_ref()
    }

    pub fn settings(&self) -> &ExchangeSettings {
        &self.settings
    }

    pub fn is_https(&self) -> bool {
        self.uri.scheme_str() == Some("https")
    }

    pub(crate) fn into_parts(self) -> (ExchangeRequest, Option<TlsContext>, ExchangeSettings) {
        let request = ExchangeRequest { uri: self.uri, method: self.method, headers: self.headers, body: self.body };
        (request, self.tls, self.settings)
    }
}

/// What a reactor needs to put a request on the wire.
#[derive(Debug)]
pub struct ExchangeRequest {
    pub uri: Uri,
    pub method: HttpMethod,
    pub headers: HeaderMap,
    pub body: Option<RequestPayload>,
}

/// Resolves `options` into a [`RequestDescriptor`].
pub fn coerce(options: RequestOptions) -> Result<RequestDescriptor, ClientError> {
    let RequestOptions {
        url,
        method,
        headers: explicit_headers,
        query_params,
        form_params,
        body,
        basic_auth,
        oauth_token,
        user_agent,
        tls,
        timeout,
        keep_alive,
        follow_redirects,
        max_redirects,
        response_type,
        decompress_body,
        pipe_capacity,
    } = options;

    let url = merge_query(&url, &query_params);
    let uri = parse_uri(&url)?;
    let method = method.unwrap_or_default();

    let mut headers = HeaderMap::with_capacity(explicit_headers.len() + 4);
    for (name, value) in &explicit_headers {
        headers.insert(header_name(name)?, header_value(name, value)?);
    }

    if !form_params.is_empty() {
        headers.insert(CONTENT_TYPE, header_value(CONTENT_TYPE.as_str(), mime::APPLICATION_WWW_FORM_URLENCODED.as_ref())?);
    }
    if let Some(auth) = basic_auth {
        let credentials = STANDARD.encode(format!("{}:{}", auth.username, auth.password));
        headers.insert(AUTHORIZATION, sensitive(AUTHORIZATION.as_str(), &format!("Basic {credentials}"))?);
    }
    if let Some(token) = oauth_token {
        headers.insert(AUTHORIZATION, sensitive(AUTHORIZATION.as_str(), &format!("Bearer {token}"))?);
    }
    if let Some(user_agent) = user_agent {
        headers.insert(USER_AGENT, header_value(USER_AGENT.as_str(), &user_agent)?);
    }
    if decompress_body && !headers.contains_key(ACCEPT_ENCODING) {
        headers.insert(ACCEPT_ENCODING, decoding::ACCEPT_ENCODING);
    }

    let body = if form_params.is_empty() {
        body.map(RequestPayload::from)
    } else {
        if body.is_some() {
            debug!("form parameters replace the request body");
        }
        let form = serde_urlencoded::to_string(&form_params).map_err(ConfigurationError::encoding)?;
        Some(RequestPayload::Form(form))
    };
    let body = match body {
        Some(body) if !body.is_empty() && !method.permits_body() => {
            return Err(ConfigurationError::BodyNotAllowed { method }.into());
        }
        Some(body) if body.is_empty() && !method.permits_body() => None,
        body => body,
    };

    let tls = tls::resolve(tls)?;

    let settings = ExchangeSettings {
        timeout,
        keep_alive,
        follow_redirects,
        max_redirects,
        response_type,
        decompress_body,
        pipe_capacity,
    };
    Ok(RequestDescriptor { url, uri, method, headers, body, tls, settings })
}

/// Appends percent encoded query parameters to `url`, ahead of any fragment.
fn merge_query(url: &str, params: &[(String, String)]) -> String {
    if params.is_empty() {
        return url.to_owned();
    }

    let (base, fragment) = match url.find('#') {
        Some(index) => url.split_at(index),
        None => (url, ""),
    };
    let separator = match base.find('?') {
        None => "?",
        Some(_) if base.ends_with('?') || base.ends_with('&') => "",
        Some(_) => "&",
    };

    let query = params
        .iter()
        .map(|(key, value)| format!("{}={}", utf8_percent_encode(key, QUERY), utf8_percent_encode(value, QUERY)))
        .collect::<Vec<_>>()
        .join("&");
    format!("{base}{separator}{query}{fragment}")
}

fn parse_uri(url: &str) -> Result<Uri, ConfigurationError> {
    let uri: Uri = url.parse().map_err(|e| ConfigurationError::invalid_url(url, e))?;
    match uri.scheme_str() {
        Some("http" | "https") => {}
        Some(scheme) => return Err(ConfigurationError::UnsupportedScheme { scheme: scheme.to_owned() }),
        None => return Err(ConfigurationError::invalid_url(url, "missing scheme")),
    }
    if uri.host().is_none_or(str::is_empty) {
        return Err(ConfigurationError::invalid_url(url, "missing host"));
    }
    Ok(uri)
}

fn header_name(name: &str) -> Result<HeaderName, ConfigurationError> {
    HeaderName::from_bytes(name.as_bytes()).map_err(|e| ConfigurationError::invalid_header(name, e))
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, ConfigurationError> {
    HeaderValue::from_str(value).map_err(|e| ConfigurationError::invalid_header(name, e))
}

fn sensitive(name: &str, value: &str) -> Result<HeaderValue, ConfigurationError> {
    let mut value = header_value(name, value)?;
    value.set_sensitive(true);
    Ok(value)
}
