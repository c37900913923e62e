//! HTTP connection handling module
//!
//! - [`HttpConnection`]: drives one accepted connection:
//!   - frames inbound bytes into messages
//!   - hands each message to a [`Handler`](crate::handler::Handler) together with a body
//!     source over the same stream
//!   - writes replies and closes when asked to

mod http_connection;

pub use http_connection::HttpConnection;
