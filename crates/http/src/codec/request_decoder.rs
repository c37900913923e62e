//! HTTP request decoder
//!
//! Turns the raw bytes of one inbound message into a [`Request`]. Decoding never fails
//! outright: the result is a [`Decoded`] carrying the request, filled in as far as
//! parsing got, together with a [`DecodeStatus`].
//!
//! # Algorithm
//!
//! 1. Split the buffer at the first `CRLFCRLF`; without one the whole buffer is body
//!    and the request is invalid
//! 2. Parse the head with [`HeaderDecoder`]
//! 3. Read the query string into the request parameters and classify the request
//! 4. If `Content-Length` exceeds the buffered body, report [`DecodeStatus::NeedBody`];
//!    [`RequestDecoder::decode_from`] then completes the body from a [`BodySource`]
//! 5. Parse form-url-encoded and multipart bodies
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use tenant_http::codec::RequestDecoder;
//! use tenant_http::protocol::{Method, Scheme};
//!
//! let decoder = RequestDecoder::new(Scheme::Http);
//! let decoded = decoder.decode(Bytes::from_static(b"GET /users?id=7 HTTP/1.1\r\nHost: example.com\r\n\r\n"));
//!
//! assert!(decoded.is_valid());
//! assert_eq!(decoded.request.method(), Method::Get);
//! assert_eq!(decoded.request.params().get("id"), Some("7"));
//! ```

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::time::Instant;
use tracing::debug;

use crate::codec::body::{
    BodyCompletion, BodySource, DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL, boundary_of, parse_pairs, parse_parts, query_of,
};
use crate::codec::header::{HeaderDecoder, find_head_end, terminator_len};
use crate::protocol::{ParseError, Request, Scheme};

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
const MULTIPART_FORM_DATA: &str = "multipart/form-data";

/// State of a decoded request.
#[derive(Debug)]
pub enum DecodeStatus {
    /// Head and body are complete.
    Complete,
    /// `Content-Length` is larger than the buffered body.
    NeedBody,
    /// The message could not be understood.
    Invalid(ParseError),
}

/// A request together with how far decoding got.
#[derive(Debug)]
pub struct Decoded {
    pub request: Request,
    pub status: DecodeStatus,
}

impl Decoded {
    fn invalid(request: Request, error: ParseError) -> Self {
        Self { request, status: DecodeStatus::Invalid(error) }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self.status, DecodeStatus::Complete)
    }

    /// The reason the request is invalid, if it is.
    pub fn error(&self) -> Option<&ParseError> {
        match &self.status {
            DecodeStatus::Invalid(e) => Some(e),
            _ => None,
        }
    }
}

/// Decoder for inbound requests on a binding of a given scheme.
#[derive(Debug, Clone)]
pub struct RequestDecoder {
    scheme: Scheme,
    max_attempts: u32,
    poll_interval: Duration,
    body_timeout: Option<Duration>,
}

impl RequestDecoder {
    pub fn new(scheme: Scheme) -> Self {
        Self { scheme, max_attempts: DEFAULT_MAX_ATTEMPTS, poll_interval: DEFAULT_POLL_INTERVAL, body_timeout: None }
    }

    /// Number of polls allowed while completing a short body.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Overall time budget for completing a short body.
    #[must_use]
    pub fn with_body_timeout(mut self, body_timeout: Option<Duration>) -> Self {
        self.body_timeout = body_timeout;
        self
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Decodes everything that can be decoded from `data` alone.
    pub fn decode(&self, data: Bytes) -> Decoded {
        let mut request = Request::new(self.scheme);

        let Some(head_end) = find_head_end(&data) else {
            request.body = data;
            return Decoded::invalid(request, ParseError::MissingHeader);
        };
        let body_start = head_end + terminator_len();

        request.raw_headers = data.slice(..head_end);
        request.body = data.slice(body_start..);

        if let Err(e) = HeaderDecoder.decode(&data[..body_start], &mut request) {
            debug!(cause = %e, "invalid request head");
            request.classify();
            return Decoded::invalid(request, e);
        }

        let query = query_of(&request.complete_path).to_string();
        parse_pairs(&query, &mut request.params);
        request.classify();

        if request.content_length > request.body.len() {
            return Decoded { request, status: DecodeStatus::NeedBody };
        }

        request.body.truncate(request.content_length);
        parse_body_fields(&mut request);
        Decoded { request, status: DecodeStatus::Complete }
    }

    /// Decodes `data`, pulling the rest of a short body from `source`.
    pub async fn decode_from<S>(&self, data: Bytes, source: &mut S) -> Decoded
    where
        S: BodySource + ?Sized,
    {
        let mut decoded = self.decode(data);
        if !matches!(decoded.status, DecodeStatus::NeedBody) {
            return decoded;
        }

        let request = &mut decoded.request;
        let mut body = BytesMut::from(&request.body[..]);
        let mut completion = BodyCompletion::new(request.content_length)
            .with_max_attempts(self.max_attempts)
            .with_poll_interval(self.poll_interval)
            .with_deadline(self.body_timeout.map(|timeout| Instant::now() + timeout));

        let result = completion.complete(&mut body, source).await;
        request.body = body.freeze();
        decoded.status = match result {
            Ok(()) => {
                parse_body_fields(request);
                DecodeStatus::Complete
            }
            Err(e) => DecodeStatus::Invalid(e),
        };
        decoded
    }
}

/// Reads form fields and multipart parts out of a complete body.
pub(crate) fn parse_body_fields(request: &mut Request) {
    if request.content_type.contains(FORM_URLENCODED) {
        let body = String::from_utf8_lossy(&request.body).into_owned();
        parse_pairs(&body, &mut request.params);
    }

    if request.content_type.contains(MULTIPART_FORM_DATA) {
        match boundary_of(&request.content_type) {
            Some(boundary) => request.parts = parse_parts(&request.body, &boundary),
            None => debug!(content_type = %request.content_type, "multipart request without boundary"),
        }
    }
}
