//! Response head encoder
//!
//! Serializes the status line and header block of a [`Response`]. The order of the
//! block is fixed and clients depend on it:
//!
//! 1. status line
//! 2. every header set on the response, except `Content-Encoding`, `Content-Type`,
//!    `Content-Length` and `Connection`
//! 3. `Content-Encoding` (when the body is compressed, or when the response set one)
//! 4. `Content-Type`, `Content-Length`, `Connection`
//! 5. `Keep-Alive: timeout=.., max=..` for keep-alive responses only
//! 6. the blank line

use std::io;
use std::io::Write;

use bytes::{BufMut, BytesMut};
use http::header;

use crate::protocol::{Response, SendError};

/// Initial buffer size allocated for header serialization
const INIT_HEADER_SIZE: usize = 1024;

/// Headers that are always computed by the encoder and written last.
const COMPUTED_HEADERS: [header::HeaderName; 4] =
    [header::CONTENT_ENCODING, header::CONTENT_TYPE, header::CONTENT_LENGTH, header::CONNECTION];

/// Encoder for the head of a [`Response`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderEncoder;

impl HeaderEncoder {
    /// Writes the head for a body of `content_length` bytes.
    ///
    /// `gzip` tells whether the body that follows was compressed by the encoder.
    pub fn encode(&self, response: &Response, content_length: usize, gzip: bool, dst: &mut BytesMut) -> Result<(), SendError> {
        dst.reserve(INIT_HEADER_SIZE);

        write!(FastWrite(dst), "HTTP/1.1 {} {}\r\n", response.status().as_str(), response.description())?;

        for (name, value) in response.headers() {
            if COMPUTED_HEADERS.contains(name) {
                continue;
            }
            dst.put_slice(name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(value.as_ref());
            dst.put_slice(b"\r\n");
        }

        if gzip {
            dst.put_slice(b"Content-Encoding: gzip\r\n");
        } else if let Some(encoding) = response.headers().get(header::CONTENT_ENCODING) {
            dst.put_slice(b"Content-Encoding: ");
            dst.put_slice(encoding.as_bytes());
            dst.put_slice(b"\r\n");
        }

        write!(FastWrite(dst), "Content-Type: {}\r\n", response.mime())?;
        write!(FastWrite(dst), "Content-Length: {content_length}\r\n")?;
        write!(FastWrite(dst), "Connection: {}\r\n", response.connection().as_str())?;

        if response.connection().is_keep_alive() {
            write!(
                FastWrite(dst),
                "Keep-Alive: timeout={}, max={}\r\n",
                response.keep_alive_timeout(),
                response.keep_alive_max()
            )?;
        }

        dst.put_slice(b"\r\n");
        Ok(())
    }
}

/// Fast writer implementation for writing to `BytesMut`.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ConnectionType;
    use http::StatusCode;

    fn encode(response: &Response, len: usize, gzip: bool) -> String {
        let mut dst = BytesMut::new();
        HeaderEncoder.encode(response, len, gzip, &mut dst).unwrap();
        String::from_utf8(dst.to_vec()).unwrap()
    }

    #[test]
    fn fixed_order() {
        let mut response = Response::new();
        response.set_status(StatusCode::NOT_FOUND, "Not Found");
        response.set_header("Content-Type", "application/json");
        response.set_header("Connection", "upgrade");
        response.set_header("X-Trace", "abc");
        response.set_mime(mime::TEXT_HTML);

        let expected = concat!(
            "HTTP/1.1 404 Not Found\r\n",
            "x-trace: abc\r\n",
            "Content-Type: text/html\r\n",
            "Content-Length: 12\r\n",
            "Connection: Close\r\n",
            "\r\n",
        );

        assert_eq!(encode(&response, 12, false), expected);
    }

    #[test]
    fn keep_alive_and_gzip() {
        let mut response = Response::new();
        response.set_connection(ConnectionType::KeepAlive);

        let head = encode(&response, 20, true);
        assert!(head.starts_with("HTTP/1.1 200 OK\r\nContent-Encoding: gzip\r\nContent-Type: text/plain\r\n"));
        assert!(head.ends_with("Connection: Keep-Alive\r\nKeep-Alive: timeout=30, max=60\r\n\r\n"));
    }

    #[test]
    fn explicit_content_encoding_kept_in_place() {
        let mut response = Response::new();
        response.set_header("Content-Encoding", "br");
        response.set_header("Cache-Control", "no-cache");

        let head = encode(&response, 0, false);
        assert_eq!(
            head,
            "HTTP/1.1 200 OK\r\ncache-control: no-cache\r\nContent-Encoding: br\r\nContent-Type: text/plain\r\nContent-Length: 0\r\nConnection: Close\r\n\r\n"
        );
    }
}
