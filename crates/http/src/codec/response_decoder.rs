//! Parser for serialized responses.
//!
//! Used by clients and tests to read back what the [`ResponseEncoder`](super::ResponseEncoder)
//! produced. A gzip `Content-Encoding` is undone, so [`DecodedResponse::body`] always holds
//! the original bytes.

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use httparse::Status;

use crate::codec::body::gunzip;
use crate::codec::header::MAX_HEADER_NUM;
use crate::protocol::ParseError;

#[derive(Debug, Clone)]
pub struct DecodedResponse {
    pub status: StatusCode,
    pub description: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Parses one complete response.
///
/// # Errors
///
/// Returns `ParseError` when the head is incomplete or malformed, when the body is
/// shorter than its `Content-Length`, or when a gzip body cannot be decompressed.
pub fn decode_response(data: &[u8]) -> Result<DecodedResponse, ParseError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
    let mut parsed = httparse::Response::new(&mut headers);

    let Status::Complete(head_len) = parsed.parse(data).map_err(ParseError::invalid_header)? else {
        return Err(ParseError::MissingHeader);
    };

    let status = parsed
        .code
        .and_then(|code| StatusCode::from_u16(code).ok())
        .ok_or_else(|| ParseError::invalid_header("invalid status code"))?;
    let description = parsed.reason.unwrap_or_default().to_string();

    let mut header_map = HeaderMap::with_capacity(parsed.headers.len());
    for field in parsed.headers.iter() {
        let name = HeaderName::from_bytes(field.name.as_bytes()).map_err(ParseError::invalid_header)?;
        let value = HeaderValue::from_bytes(field.value).map_err(ParseError::invalid_header)?;
        header_map.append(name, value);
    }

    let mut body = &data[head_len..];
    if let Some(length) = header_map.get(header::CONTENT_LENGTH) {
        let length = length
            .to_str()
            .ok()
            .and_then(|value| value.trim().parse::<usize>().ok())
            .ok_or_else(|| ParseError::invalid_content_length("not a number"))?;
        if body.len() < length {
            return Err(ParseError::incomplete_body(length, body.len()));
        }
        body = &body[..length];
    }

    let gzip = header_map
        .get(header::CONTENT_ENCODING)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("gzip"));
    let body = if gzip { Bytes::from(gunzip(body)?) } else { Bytes::copy_from_slice(body) };

    Ok(DecodedResponse { status, description, headers: header_map, body })
}
