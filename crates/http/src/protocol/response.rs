//! HTTP response model.
//!
//! A [`Response`] is built up while a request travels through the pipeline and is
//! serialized exactly once by [`ResponseEncoder`](crate::codec::ResponseEncoder). The
//! status description is kept separately from the code so canned pages can use
//! their own wording.

use bytes::{BufMut, Bytes, BytesMut};
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use mime::Mime;
use tracing::warn;

use super::ConnectionType;

/// Default `Keep-Alive: timeout=` value in seconds.
pub const DEFAULT_KEEP_ALIVE_TIMEOUT: u32 = 30;

/// Default `Keep-Alive: max=` value.
pub const DEFAULT_KEEP_ALIVE_MAX: u32 = 60;

#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    description: String,
    headers: HeaderMap,
    output: BytesMut,
    mime: Mime,
    compressed: bool,
    connection: ConnectionType,
    keep_alive_timeout: u32,
    keep_alive_max: u32,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            description: String::from("OK"),
            headers: HeaderMap::new(),
            output: BytesMut::new(),
            mime: mime::TEXT_PLAIN,
            compressed: false,
            connection: ConnectionType::Close,
            keep_alive_timeout: DEFAULT_KEEP_ALIVE_TIMEOUT,
            keep_alive_max: DEFAULT_KEEP_ALIVE_MAX,
        }
    }
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Sets the status code together with the description written on the status line.
    pub fn set_status(&mut self, status: StatusCode, description: impl Into<String>) {
        self.status = status;
        self.description = description.into();
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Inserts a header from plain strings, replacing any previous value.
    ///
    /// Returns `false` (and logs) when the name or value is not valid on the wire.
    pub fn set_header(&mut self, name: &str, value: &str) -> bool {
        let name = match HeaderName::from_bytes(name.as_bytes()) {
            Ok(name) => name,
            Err(e) => {
                warn!(header = name, cause = %e, "skip invalid response header name");
                return false;
            }
        };
        let value = match HeaderValue::from_str(value) {
            Ok(value) => value,
            Err(e) => {
                warn!(header = %name, cause = %e, "skip invalid response header value");
                return false;
            }
        };
        self.headers.insert(name, value);
        true
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn write(&mut self, data: &[u8]) {
        self.output.put_slice(data);
    }

    pub fn write_str(&mut self, data: &str) {
        self.write(data.as_bytes());
    }

    /// The body written so far, before any compression.
    pub fn body(&self) -> &[u8] {
        &self.output
    }

    pub fn clear_body(&mut self) {
        self.output.clear();
    }

    pub fn take_body(&mut self) -> Bytes {
        self.output.split().freeze()
    }

    /// Length of the uncompressed body.
    pub fn content_length(&self) -> usize {
        self.output.len()
    }

    pub fn mime(&self) -> &Mime {
        &self.mime
    }

    pub fn set_mime(&mut self, mime: Mime) {
        self.mime = mime;
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    pub fn set_compressed(&mut self, compressed: bool) {
        self.compressed = compressed;
    }

    pub fn connection(&self) -> ConnectionType {
        self.connection
    }

    pub fn set_connection(&mut self, connection: ConnectionType) {
        self.connection = connection;
    }

    pub fn keep_alive_timeout(&self) -> u32 {
        self.keep_alive_timeout
    }

    pub fn keep_alive_max(&self) -> u32 {
        self.keep_alive_max
    }

    pub fn set_keep_alive(&mut self, timeout: u32, max: u32) {
        self.keep_alive_timeout = timeout;
        self.keep_alive_max = max;
    }
}
