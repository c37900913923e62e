//! `multipart/form-data` parsing.
//!
//! The body is split on the `\r\n--<boundary>\r\n` delimiter (the body is prefixed with a
//! `\r\n` so the first delimiter matches too) and the closing `\r\n--<boundary>--`
//! delimiter ends the last part. Every part carries its own small header block that is
//! parsed with `httparse`. A part that cannot be parsed is skipped and the remaining
//! parts are still returned.

use std::collections::HashMap;

use bytes::Bytes;
use tracing::debug;

use crate::codec::header::{MAX_HEADER_NUM, find_head_end, terminator_len};
use crate::protocol::{MultipartPart, ParseError};

/// Boundary parameter of a `multipart/form-data` content type.
pub fn boundary_of(content_type: &str) -> Option<String> {
    let mime: mime::Mime = content_type.parse().ok()?;
    if mime.type_() != mime::MULTIPART || mime.subtype() != mime::FORM_DATA {
        return None;
    }
    mime.get_param(mime::BOUNDARY).map(|boundary| boundary.as_str().trim_matches('"').to_string())
}

/// Parses every part of `body`; the first part for a field name wins.
pub fn parse_parts(body: &Bytes, boundary: &str) -> HashMap<String, MultipartPart> {
    let delimiter = format!("\r\n--{boundary}\r\n").into_bytes();
    let closing = format!("\r\n--{boundary}--").into_bytes();

    let mut content = Vec::with_capacity(body.len() + 2);
    content.extend_from_slice(b"\r\n");
    content.extend_from_slice(body);
    let content = Bytes::from(content);

    let mut parts = HashMap::new();
    for segment in split_on(&content, &delimiter) {
        let segment = match find(&segment, &closing) {
            Some(end) => segment.slice(..end),
            None => segment,
        };
        if segment.is_empty() {
            continue;
        }
        match parse_part(&segment) {
            Ok(part) => {
                parts.entry(part.name.clone()).or_insert(part);
            }
            Err(e) => debug!(cause = %e, "skip multipart part"),
        }
    }
    parts
}

fn parse_part(segment: &Bytes) -> Result<MultipartPart, ParseError> {
    let head_end = find_head_end(segment).ok_or_else(|| ParseError::invalid_multipart("missing part header terminator"))?;
    let body_start = head_end + terminator_len();

    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
    let httparse::Status::Complete((_, headers)) =
        httparse::parse_headers(&segment[..body_start], &mut headers).map_err(ParseError::invalid_multipart)?
    else {
        return Err(ParseError::invalid_multipart("incomplete part header"));
    };

    let mut disposition = None;
    let mut content_type = String::new();
    for header in headers {
        let value = String::from_utf8_lossy(header.value).into_owned();
        if header.name.eq_ignore_ascii_case("content-disposition") {
            disposition = Some(value);
        } else if header.name.eq_ignore_ascii_case("content-type") {
            content_type = value;
        }
    }

    let disposition = disposition.ok_or_else(|| ParseError::invalid_multipart("missing content-disposition"))?;
    let mut fields = disposition.split(';').map(str::trim);
    let content_disposition = fields.next().unwrap_or_default().to_string();

    let mut name = None;
    let mut filename = None;
    for field in fields {
        let Some((key, value)) = field.split_once('=') else { continue };
        let value = value.trim().trim_matches('"').to_string();
        match key.trim().to_ascii_lowercase().as_str() {
            "name" => name = Some(value),
            "filename" => filename = Some(value),
            _ => {}
        }
    }

    let name = name.ok_or_else(|| ParseError::invalid_multipart("missing field name"))?;
    Ok(MultipartPart { content_disposition, content_type, name, filename, data: segment.slice(body_start..) })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

fn split_on(content: &Bytes, delimiter: &[u8]) -> Vec<Bytes> {
    let mut segments = Vec::new();
    let mut rest = content.clone();
    while let Some(index) = find(&rest, delimiter) {
        segments.push(rest.slice(..index));
        rest = rest.slice(index + delimiter.len()..);
    }
    segments.push(rest);
    segments
}
