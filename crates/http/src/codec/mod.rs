//! HTTP codec module for decoding requests and encoding responses
//!
//! # Architecture
//!
//! - Request handling:
//!   - [`MessageFramer`]: cuts the connection byte stream into messages (head plus the
//!     body bytes that came with it)
//!   - [`RequestDecoder`]: turns a message into a [`Request`](crate::protocol::Request)
//!   - [`BodyCompletion`]: waits for the rest of a body through a [`BodySource`]
//!   - head parsing in the `header` module, bodies in the `body` helpers
//!
//! - Response handling:
//!   - [`ResponseEncoder`]: writes the fixed-order head and the (optionally gzip
//!     compressed) body
//!   - [`decode_response`]: reads a serialized response back
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use tenant_http::codec::{RequestDecoder, ResponseEncoder, decode_response};
//! use tenant_http::protocol::Scheme;
//!
//! let decoded = RequestDecoder::new(Scheme::Http).decode(Bytes::from_static(b"GET / HTTP/1.1\r\nHost: a\r\n\r\n"));
//! let mut request = decoded.request;
//! request.response_mut().write_str("hello");
//!
//! let bytes = ResponseEncoder::new().encode_to_bytes(request.response()).unwrap();
//! assert_eq!(&decode_response(&bytes).unwrap().body[..], b"hello");
//! ```

mod body;
mod header;
mod message_framer;
mod request_decoder;
mod response_decoder;
mod response_encoder;

pub use body::{BodyCompletion, BodySource, Completion, DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL, NoBody, ReadSource};
pub use body::{gunzip, gzip};
pub use header::{HeaderDecoder, HeaderEncoder};
pub use message_framer::MessageFramer;
pub use request_decoder::{DecodeStatus, Decoded, RequestDecoder};
pub use response_decoder::{DecodedResponse, decode_response};
pub use response_encoder::ResponseEncoder;

pub(crate) use request_decoder::parse_body_fields;
