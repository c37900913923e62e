//! HTTP head processing
//!
//! - [`HeaderDecoder`]: parses a request line and header fields into a
//!   [`Request`](crate::protocol::Request), lifting the well-known headers into typed fields
//! - [`HeaderEncoder`]: writes a response status line and header block in the fixed wire
//!   order

mod header_decoder;
mod header_encoder;

pub use header_decoder::HeaderDecoder;
pub(crate) use header_decoder::{MAX_HEADER_BYTES, MAX_HEADER_NUM, declared_body_len, find_head_end, terminator_len};
pub use header_encoder::HeaderEncoder;
