//! Raw-buffer HTTP/1.1 protocol layer for the tenant server
//!
//! This crate turns the bytes of an inbound message into a [`protocol::Request`] and a
//! [`protocol::Response`] back into bytes, without going through a general purpose HTTP
//! stack. It is the protocol half of a multi-tenant server: the engine that routes requests
//! to applications plugs in through the [`handler::Handler`] trait.
//!
//! # Features
//!
//! - Request decoding that never fails outright: invalid messages still produce a
//!   best-effort request plus the reason they are invalid
//! - Typed access to the headers a server pipeline relies on (host, CORS, fetch metadata)
//! - Query, form-url-encoded and multipart parameter parsing
//! - Bounded completion of short bodies with a retry budget and deadline
//! - Fixed-order response heads with optional gzip bodies
//! - A small per-connection loop over any `AsyncRead`/`AsyncWrite` pair
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use tokio::net::TcpListener;
//! use tracing::{error, info, warn, Level};
//! use tracing_subscriber::FmtSubscriber;
//! use tenant_http::codec::{RequestDecoder, ResponseEncoder};
//! use tenant_http::connection::HttpConnection;
//! use tenant_http::handler::{ConnectionInfo, Reply, make_handler};
//! use tenant_http::protocol::Scheme;
//!
//! #[tokio::main]
//! async fn main() {
//!     let subscriber = FmtSubscriber::builder()
//!         .with_max_level(Level::INFO)
//!         .finish();
//!     tracing::subscriber::set_global_default(subscriber)
//!         .expect("setting default subscriber failed");
//!
//!     info!(port = 8080, "start listening");
//!     let tcp_listener = match TcpListener::bind("127.0.0.1:8080").await {
//!         Ok(tcp_listener) => tcp_listener,
//!         Err(e) => {
//!             error!(cause = %e, "bind server error");
//!             return;
//!         }
//!     };
//!     let local = tcp_listener.local_addr().unwrap();
//!
//!     let handler = Arc::new(make_handler(hello_world));
//!
//!     loop {
//!         let (tcp_stream, peer) = match tcp_listener.accept().await {
//!             Ok(stream_and_addr) => stream_and_addr,
//!             Err(e) => {
//!                 warn!(cause = %e, "failed to accept");
//!                 continue;
//!             }
//!         };
//!
//!         let handler = handler.clone();
//!
//!         tokio::spawn(async move {
//!             let (reader, writer) = tcp_stream.into_split();
//!             let connection = HttpConnection::new(reader, writer, ConnectionInfo::new(local, peer, Scheme::Http));
//!             if let Err(e) = connection.process(handler).await {
//!                 error!("service has error, cause {}, connection shutdown", e);
//!             }
//!         });
//!     }
//! }
//!
//! async fn hello_world(conn: ConnectionInfo, data: Bytes) -> Reply {
//!     let decoded = RequestDecoder::new(conn.scheme).decode(data);
//!     let mut request = decoded.request;
//!     info!(path = request.path(), "request path");
//!
//!     let close = !request.connection().is_keep_alive();
//!     request.response_mut().write_str("Hello World!\r\n");
//!     let bytes = ResponseEncoder::new().encode_to_bytes(request.response()).unwrap_or_default();
//!     Reply::new(bytes, close)
//! }
//! ```
//!
//! # Architecture
//!
//! - [`connection`]: the per-connection read/handle/write loop
//! - [`protocol`]: request, response and parameter types
//! - [`codec`]: request decoding, body completion, response encoding
//! - [`handler`]: the seam the server engine implements
//!
//! ## Error Handling
//!
//! - [`protocol::HttpError`]: Top-level error type of the connection loop
//! - [`protocol::ParseError`]: Request parsing errors
//! - [`protocol::SendError`]: Response sending errors
//!
//! # Limitations
//!
//! - HTTP/1.0 and HTTP/1.1 only, bodies delimited by `Content-Length`
//! - Maximum header size: 8KB
//! - Maximum number of headers: 64

pub mod codec;
pub mod connection;
pub mod handler;
pub mod protocol;

mod utils;
pub(crate) use utils::ensure;
