//! Caller facing description of a request.
//!
//! [`RequestOptions`] is a plain builder: every setter consumes and returns the options, and
//! nothing is validated until the options are coerced into a
//! [`RequestDescriptor`](crate::descriptor::RequestDescriptor).

use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;

use crate::tls::TlsContext;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(120);
pub const DEFAULT_MAX_REDIRECTS: u32 = 10;

/// The request methods the client can send.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    #[default]
    Get,
    Head,
    Post,
    Put,
    Delete,
    Trace,
    Options,
    Patch,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 8] = [
        HttpMethod::Get,
        HttpMethod::Head,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Delete,
        HttpMethod::Trace,
        HttpMethod::Options,
        HttpMethod::Patch,
    ];

    /// Only `POST`, `PUT` and `PATCH` may carry a request body.
    pub fn permits_body(self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Trace => "TRACE",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Patch => "PATCH",
        }
    }
}

impl Display for HttpMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for http::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => http::Method::GET,
            HttpMethod::Head => http::Method::HEAD,
            HttpMethod::Post => http::Method::POST,
            HttpMethod::Put => http::Method::PUT,
            HttpMethod::Delete => http::Method::DELETE,
            HttpMethod::Trace => http::Method::TRACE,
            HttpMethod::Options => http::Method::OPTIONS,
            HttpMethod::Patch => http::Method::PATCH,
        }
    }
}

/// How the response body should be handed back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseBodyType {
    /// Text for textual content types, bytes for everything else
    #[default]
    Auto,
    Text,
    Binary,
    /// Hand back a readable stream as soon as the headers arrive
    Stream,
}

/// Request body as supplied by the caller.
pub enum RequestBody {
    Text(String),
    Bytes(Bytes),
    /// Read to the end and sent with chunked transfer coding
    Stream(Box<dyn Read + Send>),
}

impl RequestBody {
    pub fn stream<R: Read + Send + 'static>(reader: R) -> Self {
        RequestBody::Stream(Box::new(reader))
    }

    /// A stream is never considered empty, its length is unknown until it is read.
    pub fn is_empty(&self) -> bool {
        match self {
            RequestBody::Text(text) => text.is_empty(),
            RequestBody::Bytes(bytes) => bytes.is_empty(),
            RequestBody::Stream(_) => false,
        }
    }
}

impl Debug for RequestBody {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Text(text) => f.debug_tuple("Text").field(text).finish(),
            RequestBody::Bytes(bytes) => f.debug_tuple("Bytes").field(bytes).finish(),
            RequestBody::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        RequestBody::Text(text)
    }
}

impl From<&str> for RequestBody {
    fn from(text: &str) -> Self {
        RequestBody::Text(text.to_owned())
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        RequestBody::Bytes(bytes)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        RequestBody::Bytes(Bytes::from(bytes))
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl Debug for BasicAuth {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth").field("username", &self.username).field("password", &"***").finish()
    }
}

/// TLS inputs, resolved in order of precedence by [`crate::tls::resolve`].
#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    pub context: Option<TlsContext>,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
    pub ca_cert: Option<PathBuf>,
    pub insecure: bool,
}

#[derive(Debug)]
pub struct RequestOptions {
    pub(crate) url: String,
    pub(crate) method: Option<HttpMethod>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) query_params: Vec<(String, String)>,
    pub(crate) form_params: Vec<(String, String)>,
    pub(crate) body: Option<RequestBody>,
    pub(crate) basic_auth: Option<BasicAuth>,
    pub(crate) oauth_token: Option<String>,
    pub(crate) user_agent: Option<String>,
    pub(crate) tls: TlsOptions,
    pub(crate) timeout: Duration,
    pub(crate) keep_alive: Duration,
    pub(crate) follow_redirects: bool,
    pub(crate) max_redirects: u32,
    pub(crate) response_type: ResponseBodyType,
    pub(crate) decompress_body: bool,
    pub(crate) pipe_capacity: usize,
}

impl RequestOptions {
    pub fn new<U: Into<String>>(url: U) -> Self {
        Self {
            url: url.into(),
            method: None,
            headers: vec![],
            query_params: vec![],
            form_params: vec![],
            body: None,
            basic_auth: None,
            oauth_token: None,
            user_agent: None,
            tls: TlsOptions::default(),
            timeout: DEFAULT_TIMEOUT,
            keep_alive: DEFAULT_KEEP_ALIVE,
            follow_redirects: true,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            response_type: ResponseBodyType::Auto,
            decompress_body: true,
            pipe_capacity: crate::pipe::DEFAULT_PIPE_CAPACITY,
        }
    }

    #[must_use]
    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = Some(method);
        self
    }

    /// Adds a header; a later header with the same name replaces an earlier one.
    #[must_use]
    pub fn header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn query_param<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.query_params.push((name.into(), value.into()));
        self
    }

    /// Adds a form field; any form field makes the body a url-encoded form.
    #[must_use]
    pub fn form_param<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.form_params.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn body<B: Into<RequestBody>>(mut self, body: B) -> Self {
        self.body = Some(body.into());
        self
    }

    #[must_use]
    pub fn basic_auth<U: Into<String>, P: Into<String>>(mut self, username: U, password: P) -> Self {
        self.basic_auth = Some(BasicAuth { username: username.into(), password: password.into() });
        self
    }

    #[must_use]
    pub fn oauth_token<T: Into<String>>(mut self, token: T) -> Self {
        self.oauth_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn user_agent<T: Into<String>>(mut self, user_agent: T) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    #[must_use]
    pub fn tls_context(mut self, context: TlsContext) -> Self {
        self.tls.context = Some(context);
        self
    }

    #[must_use]
    pub fn ssl_cert<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.tls.cert = Some(path.as_ref().to_path_buf());
        self
    }

    #[must_use]
    pub fn ssl_key<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.tls.key = Some(path.as_ref().to_path_buf());
        self
    }

    #[must_use]
    pub fn ssl_ca_cert<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.tls.ca_cert = Some(path.as_ref().to_path_buf());
        self
    }

    /// Accept any server certificate and host name. Only for testing against self-signed servers.
    #[must_use]
    pub fn insecure(mut self, insecure: bool) -> Self {
        self.tls.insecure = insecure;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    #[must_use]
    pub fn follow_redirects(mut self, follow_redirects: bool) -> Self {
        self.follow_redirects = follow_redirects;
        self
    }

    #[must_use]
    pub fn max_redirects(mut self, max_redirects: u32) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    #[must_use]
    pub fn response_type(mut self, response_type: ResponseBodyType) -> Self {
        self.response_type = response_type;
        self
    }

    #[must_use]
    pub fn decompress_body(mut self, decompress_body: bool) -> Self {
        self.decompress_body = decompress_body;
        self
    }

    /// Number of chunks a streamed response body may buffer before the transfer pauses.
    #[must_use]
    pub fn pipe_capacity(mut self, pipe_capacity: usize) -> Self {
        self.pipe_capacity = pipe_capacity.max(1);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl From<&str> for RequestOptions {
    fn from(url: &str) -> Self {
        RequestOptions::new(url)
    }
}

impl From<String> for RequestOptions {
    fn from(url: String) -> Self {
        RequestOptions::new(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = RequestOptions::new("http://localhost");
        assert_eq!(options.method, None);
        assert_eq!(options.timeout, Duration::from_secs(60));
        assert_eq!(options.keep_alive, Duration::from_secs(120));
        assert!(options.follow_redirects);
        assert_eq!(options.max_redirects, 10);
        assert_eq!(options.response_type, ResponseBodyType::Auto);
        assert!(options.decompress_body);
    }

    #[test]
    fn only_post_put_patch_permit_body() {
        let permitted: Vec<_> = HttpMethod::ALL.into_iter().filter(|m| m.permits_body()).collect();
        assert_eq!(permitted, vec![HttpMethod::Post, HttpMethod::Put, HttpMethod::Patch]);
    }

    #[test]
    fn password_is_not_printed() {
        let options = RequestOptions::new("http://localhost").basic_auth("alice", "s3cret");
        assert!(!format!("{options:?}").contains("s3cret"));
    }
}
