//! Listener interfaces for server and application notifications.
//!
//! Listeners are registered once, on the builders, and shared by every session cloned
//! from an application. All methods default to doing nothing, so an implementation only
//! overrides what it cares about.

use async_trait::async_trait;
use tenant_http::protocol::Request;

use crate::application::Application;
use crate::error::{HandlerError, ServerError};

/// Server wide notifications, in pipeline order.
#[cfg_attr(test, mockall::automock)]
pub trait ServerEvents: Send + Sync {
    /// Raw bytes of a message, before it is decoded.
    fn before_response_sent(&self, _data: &[u8]) {}

    /// The request with its finished response, before it is encoded.
    fn after_response_ready(&self, _request: &Request) {}

    fn session_created(&self, _session: &Application) {}

    fn session_unloaded(&self, _session: &Application) {}

    /// Runs after the application's own before-request listener.
    fn before_request_processed(&self, _request: &mut Request) {}

    /// Runs after the application's own after-request listener.
    fn after_request_processed(&self, _request: &mut Request) {}

    fn server_error(&self, _error: &ServerError) {}
}

/// Listener that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoServerEvents;

impl ServerEvents for NoServerEvents {}

/// Per application notifications.
#[async_trait]
pub trait ApplicationEvents: Send + Sync {
    fn before_request_processed(&self, _request: &mut Request) {}

    fn after_request_processed(&self, _request: &mut Request) {}

    /// Called for page requests no route or page handler claimed. Output written here is
    /// followed by the requested file, if it exists.
    async fn page_load(&self, _request: &mut Request) -> Result<(), HandlerError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoApplicationEvents;

impl ApplicationEvents for NoApplicationEvents {}
