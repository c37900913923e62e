use bytes::{Bytes, BytesMut};
use http::header;
use tokio_util::codec::Encoder;
use tracing::trace;

use crate::codec::body::gzip;
use crate::codec::header::HeaderEncoder;
use crate::protocol::{Response, SendError};

/// Serializes a [`Response`] into head and body bytes.
///
/// The body is gzip-compressed when the response asks for compression and has no
/// `Content-Encoding` of its own.
#[derive(Debug, Default)]
pub struct ResponseEncoder {
    header_encoder: HeaderEncoder,
}

impl ResponseEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes `response` into a fresh buffer.
    pub fn encode_to_bytes(&mut self, response: &Response) -> Result<Bytes, SendError> {
        let mut dst = BytesMut::with_capacity(response.content_length() + 256);
        self.encode(response, &mut dst)?;
        Ok(dst.freeze())
    }
}

impl Encoder<&Response> for ResponseEncoder {
    type Error = SendError;

    fn encode(&mut self, response: &Response, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let compress = response.is_compressed() && !response.headers().contains_key(header::CONTENT_ENCODING);

        let compressed;
        let body: &[u8] = if compress {
            compressed = gzip(response.body()).map_err(SendError::io)?;
            &compressed
        } else {
            response.body()
        };

        trace!(status = %response.status(), body_size = body.len(), compress, "encode response");
        self.header_encoder.encode(response, body.len(), compress, dst)?;
        dst.extend_from_slice(body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode_response;
    use crate::protocol::ConnectionType;
    use http::StatusCode;

    #[test]
    fn plain_body() {
        let mut response = Response::new();
        response.set_status(StatusCode::CREATED, "Created");
        response.write_str("{\"id\":1}");
        response.set_mime(mime::APPLICATION_JSON);

        let bytes = ResponseEncoder::new().encode_to_bytes(&response).unwrap();
        assert_eq!(
            &bytes[..],
            &b"HTTP/1.1 201 Created\r\nContent-Type: application/json\r\nContent-Length: 8\r\nConnection: Close\r\n\r\n{\"id\":1}"[..]
        );
    }

    #[test]
    fn round_trip_with_gzip() {
        let mut response = Response::new();
        response.set_header("X-Request-Id", "r-1");
        response.set_connection(ConnectionType::KeepAlive);
        response.set_compressed(true);
        response.write_str(&"compressible ".repeat(50));

        let bytes = ResponseEncoder::new().encode_to_bytes(&response).unwrap();
        let decoded = decode_response(&bytes).unwrap();

        assert_eq!(decoded.status, StatusCode::OK);
        assert_eq!(decoded.description, "OK");
        assert_eq!(decoded.headers.get("x-request-id").unwrap(), "r-1");
        assert_eq!(decoded.headers.get("content-encoding").unwrap(), "gzip");
        assert_eq!(decoded.headers.get("keep-alive").unwrap(), "timeout=30, max=60");
        assert_eq!(&decoded.body[..], response.body());
    }

    #[test]
    fn explicit_encoding_disables_compression() {
        let mut response = Response::new();
        response.set_header("Content-Encoding", "identity");
        response.set_compressed(true);
        response.write_str("raw");

        let bytes = ResponseEncoder::new().encode_to_bytes(&response).unwrap();
        assert!(bytes.ends_with(b"\r\n\r\nraw"));
    }
}
