//! Request head decoder
//!
//! Parses the request line and header fields of a message into a [`Request`]. The
//! decoder works on a complete head (everything before the first blank line) and fills
//! the request in place, so that a failure part way through still leaves the fields
//! that were understood.
//!
//! # Limits
//!
//! - Maximum number of headers: 64
//! - Only HTTP/1.0 and HTTP/1.1 request lines are accepted
//!
//! # Implementation Details
//!
//! 1. Parse raw bytes using `httparse`
//! 2. Copy header fields into an [`http::HeaderMap`] (case-insensitive)
//! 3. Lift the headers the server pipeline relies on into typed request fields
//! 4. Validate method and `Content-Length`

use http::{HeaderName, HeaderValue, header};
use httparse::{Error, Status};
use tracing::trace;

use crate::ensure;
use crate::protocol::{ConnectionType, Method, ParseError, Request};

/// Maximum number of headers allowed in a request
pub(crate) const MAX_HEADER_NUM: usize = 64;

/// Maximum size in bytes the connection reads while looking for the end of a head
pub(crate) const MAX_HEADER_BYTES: usize = 8 * 1024;

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Position of the first `CRLFCRLF`, which is where the head ends.
pub(crate) fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEAD_TERMINATOR.len()).position(|window| window == HEAD_TERMINATOR)
}

/// Length of the head terminator that follows the position returned by [`find_head_end`].
pub(crate) const fn terminator_len() -> usize {
    HEAD_TERMINATOR.len()
}

/// `Content-Length` declared by a complete `head`, zero when there is none. `None` when
/// the head doesn't parse or the value isn't a number.
pub(crate) fn declared_body_len(head: &[u8]) -> Option<usize> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
    let mut parsed = httparse::Request::new(&mut headers);
    if !matches!(parsed.parse(head), Ok(Status::Complete(_))) {
        return None;
    }

    parsed
        .headers
        .iter()
        .find(|field| field.name.eq_ignore_ascii_case(header::CONTENT_LENGTH.as_str()))
        .map_or(Some(0), |field| std::str::from_utf8(field.value).ok()?.trim().parse().ok())
}

/// Decoder for the head of a request.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderDecoder;

impl HeaderDecoder {
    /// Decodes `head` (request line, header fields and the terminating blank line) into
    /// `request`.
    ///
    /// # Errors
    ///
    /// Returns `ParseError` if:
    /// - The number of headers exceeds `MAX_HEADER_NUM`
    /// - The request line or a header field is malformed
    /// - The method is not one of the known methods
    /// - `Content-Length` is not a non-negative integer
    pub fn decode(&self, head: &[u8], request: &mut Request) -> Result<(), ParseError> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
        let mut parsed = httparse::Request::new(&mut headers);

        let status = parsed.parse(head).map_err(|e| match e {
            Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
            Error::Token if parsed_path_is_empty(head) => ParseError::InvalidUri,
            e => ParseError::invalid_header(e.to_string()),
        })?;

        let Status::Complete(head_len) = status else {
            return Err(ParseError::invalid_header("incomplete request head"));
        };
        trace!(head_len, header_count = parsed.headers.len(), "parsed request head");

        let method = parsed.method.ok_or(ParseError::InvalidMethod)?;
        let path = parsed.path.ok_or(ParseError::InvalidUri)?;
        let version = parsed.version.unwrap_or(1);

        request.method = Method::from(method);
        request.protocol = format!("HTTP/1.{version}");
        request.set_complete_path(path);

        request.headers.reserve(parsed.headers.len());
        for field in parsed.headers.iter() {
            let name = HeaderName::from_bytes(field.name.as_bytes()).map_err(ParseError::invalid_header)?;
            let value = HeaderValue::from_bytes(field.value).map_err(ParseError::invalid_header)?;
            request.headers.append(name, value);
        }

        lift_known_headers(request)?;

        ensure!(!request.method.is_none(), ParseError::InvalidMethod);
        ensure!(!request.path.is_empty(), ParseError::InvalidUri);
        Ok(())
    }
}

fn parsed_path_is_empty(head: &[u8]) -> bool {
    let line_end = head.iter().position(|b| *b == b'\r').unwrap_or(head.len());
    let mut parts = head[..line_end].split(|b| *b == b' ');
    parts.nth(1).is_some_and(<[u8]>::is_empty)
}

fn lift_known_headers(request: &mut Request) -> Result<(), ParseError> {
    let text = |request: &Request, name: HeaderName| request.header(name.as_str()).unwrap_or_default().to_string();

    let host = text(request, header::HOST);
    request.set_host(&host);

    request.content_type = text(request, header::CONTENT_TYPE);
    request.origin = text(request, header::ORIGIN);
    request.referer = text(request, header::REFERER);
    request.user_agent = text(request, header::USER_AGENT);
    request.accept = text(request, header::ACCEPT);
    request.via = text(request, header::VIA);
    request.ac_request_method = text(request, header::ACCESS_CONTROL_REQUEST_METHOD);
    request.ac_request_headers = text(request, header::ACCESS_CONTROL_REQUEST_HEADERS);
    request.sec_fetch_mode = request.header("sec-fetch-mode").unwrap_or_default().to_string();

    if let Some(connection) = request.header(header::CONNECTION.as_str()) {
        request.connection = ConnectionType::from_header(connection);
    }

    if let Some(value) = request.headers.get(header::CONTENT_LENGTH) {
        let value = value.to_str().map_err(|_| ParseError::invalid_content_length("value can't to_str"))?;
        request.content_length = value
            .trim()
            .parse::<usize>()
            .map_err(|_| ParseError::invalid_content_length(format!("value {value} is not usize")))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Scheme;
    use indoc::indoc;

    fn decode(str: &str) -> (Request, Result<(), ParseError>) {
        let mut request = Request::new(Scheme::Http);
        let result = HeaderDecoder.decode(str.as_bytes(), &mut request);
        (request, result)
    }

    #[test]
    fn head_end() {
        assert_eq!(find_head_end(b"GET / HTTP/1.1\r\n\r\nbody"), Some(14));
        assert_eq!(find_head_end(b"GET / HTTP/1.1\r\n"), None);
    }

    #[test]
    fn from_curl() {
        let str = indoc! {r##"
        GET /index.html HTTP/1.1
        Host: 127.0.0.1:8080
        User-Agent: curl/7.79.1
        Accept: */*

        "##}
        .replace('\n', "\r\n");

        let (request, result) = decode(&str);
        assert!(result.is_ok());

        assert_eq!(request.method(), Method::Get);
        assert_eq!(request.protocol(), "HTTP/1.1");
        assert_eq!(request.path(), "/index.html");
        assert_eq!(request.headers().len(), 3);
        assert_eq!(request.host(), "127.0.0.1");
        assert_eq!(request.raw_host(), "127.0.0.1:8080");
        assert_eq!(request.user_agent(), "curl/7.79.1");
        assert_eq!(request.accept(), "*/*");
        assert_eq!(request.connection(), ConnectionType::Close);
    }

    #[test]
    fn from_edge() {
        let str = indoc! {r##"
        OPTIONS /api/users?a=1 HTTP/1.1
        Host: api.example.com
        Connection: keep-alive
        Origin: https://app.example.com
        Access-Control-Request-Method: PUT
        Access-Control-Request-Headers: content-type,x-token
        Sec-Fetch-Mode: cors
        Via: 1.1 proxy
        Referer: https://app.example.com/page

        "##}
        .replace('\n', "\r\n");

        let (request, result) = decode(&str);
        assert!(result.is_ok());

        assert_eq!(request.method(), Method::Options);
        assert_eq!(request.complete_path(), "/api/users?a=1");
        assert_eq!(request.connection(), ConnectionType::KeepAlive);
        assert_eq!(request.origin(), "https://app.example.com");
        assert_eq!(request.access_control_request_method(), "PUT");
        assert_eq!(request.access_control_request_headers(), "content-type,x-token");
        assert_eq!(request.sec_fetch_mode(), "cors");
        assert_eq!(request.via(), "1.1 proxy");
        assert_eq!(request.referer(), "https://app.example.com/page");
        assert_eq!(request.header("ORIGIN"), Some("https://app.example.com"));
    }

    #[test]
    fn unknown_method_is_invalid() {
        let (request, result) = decode("BREW /pot HTTP/1.1\r\nHost: a\r\n\r\n");
        assert!(matches!(result, Err(ParseError::InvalidMethod)));
        // the rest of the head is still available
        assert_eq!(request.host(), "a");
        assert_eq!(request.path(), "/pot");
    }

    #[test]
    fn invalid_content_length() {
        let (_, result) = decode("POST / HTTP/1.1\r\nContent-Length: abc\r\n\r\n");
        assert!(matches!(result, Err(ParseError::InvalidContentLength { .. })));
    }

    #[test]
    fn empty_path_is_invalid() {
        let (_, result) = decode("GET  HTTP/1.1\r\n\r\n");
        assert!(result.is_err());
    }
}
