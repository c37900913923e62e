//! Multi-tenant virtual host engine for the tenant server
//!
//! One [`Server`] listens on any number of HTTP and HTTPS endpoints and hosts any number
//! of [`Application`]s, each owning a set of host names. Every request is routed to the
//! application serving its `Host` header and goes through a fixed policy pipeline: CORS,
//! HTTPS and HSTS rules, body decompression, then route, page or static file dispatch.
//!
//! # Features
//!
//! - Applications configured from a `WebConfig.json` in their root or built in code
//! - Per client sessions cloned from an application, evicted after a TTL
//! - Route templates with `{name}` placeholders, and webhook relay to route handlers
//! - SNI certificate selection with parent domain fallback and self-signed synthesis
//! - Canned status pages with `<%Name%>` placeholders
//! - Listener interfaces for server and application notifications
//!
//! # Architecture
//!
//! - [`server`]: listeners, the application registry and the request pipeline
//! - [`application`]: configuration snapshot, dispatch and session state of a tenant
//! - [`route`]: route templates and the route table
//! - [`certificate`]: certificate stores and SNI resolution
//! - [`session`]: the session table
//! - [`config`]: server settings and `WebConfig.json`
//!
//! ## Error Handling
//!
//! - [`ServerError`]: registration, listener and TLS errors
//! - [`ConfigError`]: configuration files that can't be read or parsed
//! - [`CertificateError`]: certificate store and PEM errors
//!
//! Errors inside the request pipeline never leave it: they become status pages.

pub mod application;
pub mod certificate;
pub mod config;
pub mod events;
pub mod page;
pub mod route;
pub mod server;
pub mod session;
pub mod status_page;

mod date;
mod error;

pub use application::Application;
pub use application::ApplicationBuilder;
pub use application::PageKind;
pub use date::DateService;
pub use error::CertificateError;
pub use error::ConfigError;
pub use error::HandlerError;
pub use error::ServerError;
pub use events::ApplicationEvents;
pub use events::ServerEvents;
pub use route::RouteHandler;
pub use server::Binding;
pub use server::Server;
pub use server::ServerBuilder;
pub use status_page::StatusPages;
