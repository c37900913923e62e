//! Request and response body handling
//!
//! # Components
//!
//! - [`BodyCompletion`]: bounded retry loop that waits for the rest of a body whose
//!   `Content-Length` exceeds the bytes already read, driven by a [`BodySource`]
//! - form parsing: query strings and `application/x-www-form-urlencoded` bodies
//! - multipart parsing: `multipart/form-data` bodies split into parts
//! - gzip helpers used for request decompression and response compression

mod completion;
mod form;
mod gzip;
mod multipart;

pub use completion::{BodyCompletion, BodySource, Completion, DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL, NoBody, ReadSource};
pub use form::{parse_pairs, query_of};
pub use gzip::{gunzip, gzip};
pub use multipart::{boundary_of, parse_parts};
