//! Core HTTP protocol types.
//!
//! This module holds the message model the rest of the crate works with. The types
//! are plain data: decoding lives in [`crate::codec`], connection handling in
//! [`crate::connection`].
//!
//! # Components
//!
//! - **Requests** (`request`): [`Request`] with typed access to the headers the server
//!   pipeline needs, parameters, multipart parts and the attached [`Response`]
//! - **Responses** (`response`): status, headers and an output buffer that is
//!   serialized once by the encoder
//! - **Parameters** (`params`): [`Params`], case-insensitive and first value wins
//! - **Methods and schemes** (`method`, `scheme`)
//! - **Multipart** (`multipart`): [`MultipartPart`]
//! - **MIME lookup** ([`mime_type`]): extension based classification
//! - **Errors** (`error`): [`HttpError`], [`ParseError`] and [`SendError`]

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;

mod method;
pub use method::Method;

mod scheme;
pub use scheme::ConnectionType;
pub use scheme::Scheme;

mod params;
pub use params::Params;

mod multipart;
pub use multipart::MultipartPart;

pub mod mime_type;

mod request;
pub use request::Request;
pub use request::RequestKind;

mod response;
pub use response::DEFAULT_KEEP_ALIVE_MAX;
pub use response::DEFAULT_KEEP_ALIVE_TIMEOUT;
pub use response::Response;
