//! HTTP request model.
//!
//! A [`Request`] is produced by the [`RequestDecoder`](crate::codec::RequestDecoder) from a
//! raw byte buffer. Besides the generic header map it exposes the headers the server
//! pipeline relies on as typed fields (host, origin, CORS request headers and so on),
//! the decoded query/form/route parameters, multipart parts and the [`Response`] that
//! will eventually be written back.
//!
//! Anything the engine wants to hang off a request (for example the application the
//! request was bound to) goes into [`Request::extensions_mut`].

use std::collections::HashMap;

use bytes::Bytes;
use http::{Extensions, HeaderMap, header};

use super::{ConnectionType, Method, MultipartPart, Params, ParseError, Response, Scheme, mime_type};

/// How the pipeline treats a request once it is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestKind {
    /// The last path element carries a static file extension.
    Static,
    #[default]
    Page,
    /// `OPTIONS` with a `Sec-Fetch-Mode` header.
    Preflight,
}

#[derive(Debug, Default)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) protocol: String,
    pub(crate) complete_path: String,
    pub(crate) path: String,
    pub(crate) segments: Vec<String>,
    pub(crate) params: Params,
    pub(crate) headers: HeaderMap,
    pub(crate) raw_headers: Bytes,
    pub(crate) body: Bytes,
    pub(crate) content_type: String,
    pub(crate) content_length: usize,
    pub(crate) connection: ConnectionType,
    pub(crate) host: String,
    pub(crate) raw_host: String,
    pub(crate) origin: String,
    pub(crate) referer: String,
    pub(crate) user_agent: String,
    pub(crate) accept: String,
    pub(crate) via: String,
    pub(crate) ac_request_method: String,
    pub(crate) ac_request_headers: String,
    pub(crate) sec_fetch_mode: String,
    pub(crate) kind: RequestKind,
    pub(crate) parts: HashMap<String, MultipartPart>,
    pub(crate) scheme: Scheme,
    extensions: Extensions,
    response: Response,
}

impl Request {
    /// An empty request for a connection of the given scheme.
    pub fn new(scheme: Scheme) -> Self {
        Self { scheme, ..Self::default() }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// Protocol token from the request line, e.g. `HTTP/1.1`.
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Path including the query string, as sent.
    pub fn complete_path(&self) -> &str {
        &self.complete_path
    }

    /// Path without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Non-empty path elements in order.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Replaces the path without touching the query or the segments.
    pub fn set_path(&mut self, path: impl Into<String>) {
        self.path = path.into();
    }

    /// Appends a path element; used when a route or default document extends the path.
    pub fn push_segment(&mut self, segment: impl Into<String>) {
        self.segments.push(segment.into());
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut Params {
        &mut self.params
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Header value by name, `None` when absent or not valid text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// The header block as received, without the terminating blank line.
    pub fn raw_headers(&self) -> &Bytes {
        &self.raw_headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Declared `Content-Length`, zero when the header is absent.
    pub fn content_length(&self) -> usize {
        self.content_length
    }

    pub fn connection(&self) -> ConnectionType {
        self.connection
    }

    /// Host name with any port removed.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// `Host` header exactly as sent.
    pub fn raw_host(&self) -> &str {
        &self.raw_host
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn referer(&self) -> &str {
        &self.referer
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn accept(&self) -> &str {
        &self.accept
    }

    pub fn via(&self) -> &str {
        &self.via
    }

    pub fn access_control_request_method(&self) -> &str {
        &self.ac_request_method
    }

    pub fn access_control_request_headers(&self) -> &str {
        &self.ac_request_headers
    }

    pub fn sec_fetch_mode(&self) -> &str {
        &self.sec_fetch_mode
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    /// Multipart parts keyed by field name.
    pub fn parts(&self) -> &HashMap<String, MultipartPart> {
        &self.parts
    }

    pub fn part(&self, name: &str) -> Option<&MultipartPart> {
        self.parts.get(name)
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// `scheme://host[:port]` using the `Host` header as sent.
    pub fn url(&self) -> String {
        format!("{}://{}", self.scheme, self.raw_host)
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    /// Whether the body was sent with a gzip `Content-Encoding`.
    pub fn is_gzip_compressed(&self) -> bool {
        self.header_contains(header::CONTENT_ENCODING, "gzip")
    }

    /// Whether the client advertised gzip in `Accept-Encoding`.
    pub fn accepts_gzip(&self) -> bool {
        self.header_contains(header::ACCEPT_ENCODING, "gzip")
    }

    /// Replaces a gzip encoded body with its decompressed form and re-reads any form
    /// fields from it. Does nothing when the body is not gzip encoded.
    pub fn decompress_body(&mut self) -> Result<(), ParseError> {
        if !self.is_gzip_compressed() || self.body.is_empty() {
            return Ok(());
        }
        let decoded = crate::codec::gunzip(&self.body)?;
        self.content_length = decoded.len();
        self.body = Bytes::from(decoded);
        self.headers.remove(header::CONTENT_ENCODING);
        crate::codec::parse_body_fields(self);
        Ok(())
    }

    fn header_contains(&self, name: header::HeaderName, needle: &str) -> bool {
        self.headers.get_all(name).iter().filter_map(|value| value.to_str().ok()).any(|value| value.contains(needle))
    }

    pub(crate) fn set_host(&mut self, raw_host: &str) {
        self.raw_host = raw_host.to_string();
        self.host = strip_port(raw_host).to_string();
    }

    pub(crate) fn set_complete_path(&mut self, complete_path: &str) {
        self.complete_path = complete_path.to_string();
        let path = complete_path.split_once('?').map_or(complete_path, |(path, _)| path);
        self.path = path.to_string();
        self.segments = path.split('/').filter(|segment| !segment.is_empty()).map(str::to_string).collect();
    }

    pub(crate) fn classify(&mut self) {
        self.kind = if self.method == Method::Options && !self.sec_fetch_mode.is_empty() {
            RequestKind::Preflight
        } else if mime_type::is_static_resource(&self.path) {
            RequestKind::Static
        } else {
            RequestKind::Page
        };
    }
}

/// Removes a trailing `:port` from a host, leaving bracketed IPv6 literals intact.
fn strip_port(host: &str) -> &str {
    if host.ends_with(']') {
        return host;
    }
    match host.rsplit_once(':') {
        Some((name, _port)) => name,
        None => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_port_is_stripped() {
        let mut request = Request::new(Scheme::Http);
        request.set_host("example.com:8080");
        assert_eq!(request.host(), "example.com");
        assert_eq!(request.raw_host(), "example.com:8080");
        assert_eq!(request.url(), "http://example.com:8080");

        request.set_host("[::1]");
        assert_eq!(request.host(), "[::1]");
        request.set_host("[::1]:443");
        assert_eq!(request.host(), "[::1]");
    }

    #[test]
    fn path_segments() {
        let mut request = Request::new(Scheme::Https);
        request.set_complete_path("/api//users/42?x=1");
        assert_eq!(request.path(), "/api//users/42");
        assert_eq!(request.segments(), ["api", "users", "42"]);
        assert_eq!(request.complete_path(), "/api//users/42?x=1");
    }

    #[test]
    fn classification() {
        let mut request = Request::new(Scheme::Http);
        request.method = Method::Get;
        request.set_complete_path("/css/site.css?v=3");
        request.classify();
        assert_eq!(request.kind(), RequestKind::Static);

        request.set_complete_path("/index.html");
        request.classify();
        assert_eq!(request.kind(), RequestKind::Page);

        request.method = Method::Options;
        request.classify();
        assert_eq!(request.kind(), RequestKind::Page);

        request.sec_fetch_mode = "cors".into();
        request.classify();
        assert_eq!(request.kind(), RequestKind::Preflight);
    }
}
