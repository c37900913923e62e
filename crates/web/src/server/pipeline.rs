//! The per-request policy pipeline.
//!
//! Every failure is turned into a response here; nothing propagates to the connection
//! loop except the decision to close.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use http::header::{self, HeaderValue};
use tenant_http::codec::{BodySource, RequestDecoder, ResponseEncoder};
use tenant_http::handler::{ConnectionInfo, Handler, Reply};
use tenant_http::protocol::{Request, RequestKind, mime_type};
use tokio::time::Instant;
use tracing::{debug, error, warn};

use super::Shared;
use crate::application::{Application, PageKind};
use crate::config::{DEFAULT_CORS_MAX_AGE, DEFAULT_CORS_METHODS};
use crate::date::DateService;
use crate::error::ServerError;
use crate::session::fingerprint;

/// Sent when even the error response can't be encoded.
const FALLBACK_500: &[u8] = b"HTTP/1.1 500 Server Error\r\nContent-Length: 0\r\nConnection: Close\r\n\r\n";

const STATIC_CACHE_CONTROL: &str = "max-age=300, public";

const DEFAULT_HTTPS_PORT: u16 = 443;

const SERVER_ERROR: &str = "Server Error";

/// Whether the pipeline should go on after a step.
enum Flow {
    Continue,
    Done,
}

#[async_trait]
impl Handler for Shared {
    async fn call(&self, conn: &ConnectionInfo, data: Bytes, source: &mut (dyn BodySource + '_)) -> Reply {
        self.events.before_response_sent(&data);

        let request = self.process(conn, data, source).await;
        self.events.after_response_ready(&request);

        let close = !request.response().connection().is_keep_alive();
        match ResponseEncoder::new().encode_to_bytes(request.response()) {
            Ok(bytes) => Reply::new(bytes, close),
            Err(e) => {
                error!(peer = %conn.peer, cause = %e, "can't encode response");
                self.events.server_error(&ServerError::from(e));
                Reply::new(Bytes::from_static(FALLBACK_500), true)
            }
        }
    }
}

impl Shared {
    async fn process(&self, conn: &ConnectionInfo, data: Bytes, source: &mut (dyn BodySource + '_)) -> Request {
        let decoded = RequestDecoder::new(conn.scheme)
            .with_body_timeout(Some(self.request_timeout))
            .decode_from(data, source)
            .await;
        let valid = decoded.is_valid();
        if let Some(e) = decoded.error() {
            debug!(peer = %conn.peer, cause = %e, "invalid request");
        }
        let mut request = decoded.request;

        self.default_headers(&mut request);

        if !valid {
            self.respond_error(&mut request, "The HTTP Request was invalid.");
            return request;
        }

        let Some(application) = self.application_by_host(request.host(), Some(conn.local)) else {
            debug!(host = request.host(), local = %conn.local, "no application for host");
            self.respond_error(&mut request, "There is no web application running with this host name.");
            return request;
        };

        let application = self.bind_session(conn, &request, application);
        application.touch(Instant::now());
        application.attach(&mut request);

        if let Flow::Done = self.apply_policies(&mut request, &application) {
            return request;
        }

        if request.is_gzip_compressed() {
            if let Err(e) = request.decompress_body() {
                warn!(path = request.path(), cause = %e, "can't decompress request body");
                self.respond_error(&mut request, &format!("The request body could not be decompressed: {e}"));
                return request;
            }
        }

        request.response_mut().set_status(StatusCode::OK, "OK");
        application.events().before_request_processed(&mut request);
        self.events.before_request_processed(&mut request);

        if matches!(request.kind(), RequestKind::Static | RequestKind::Page) {
            self.dispatch(&mut request, &application).await;
        }

        application.events().after_request_processed(&mut request);
        self.events.after_request_processed(&mut request);
        request
    }

    fn default_headers(&self, request: &mut Request) {
        let connection = request.connection();
        let server = format!("{} Application Server", self.name);
        let response = request.response_mut();

        DateService::get_global_instance().with_http_date(|date| {
            response.headers_mut().insert(header::DATE, date);
        });
        if let Ok(server) = HeaderValue::from_str(&server) {
            response.headers_mut().insert(header::SERVER, server);
        }
        response.set_connection(connection);
    }

    /// The session for this client when the application keeps sessions, else the
    /// application itself.
    fn bind_session(&self, conn: &ConnectionInfo, request: &Request, application: Arc<Application>) -> Arc<Application> {
        if !application.config().allow_sessions {
            return application;
        }

        let key = fingerprint(conn.peer.ip(), request.user_agent());
        let (session, created) = self.sessions.get_or_create(&key, &application);
        if created {
            self.events.session_created(&session);
        }
        session
    }

    /// Port of the first HTTPS binding `application` answers on, when a redirect has to
    /// spell it out.
    fn https_port(&self, application: &Application) -> Option<u16> {
        self.bindings()
            .into_iter()
            .find(|binding| binding.scheme.is_secure() && application.bindings().contains(&binding.addr))
            .map(|binding| binding.addr.port())
            .filter(|&port| port != DEFAULT_HTTPS_PORT && port != 0)
    }

    /// CORS, HTTPS and HSTS handling. `Done` means the response is final.
    fn apply_policies(&self, request: &mut Request, application: &Application) -> Flow {
        let config = application.config();
        let kind = request.kind();
        let secure = request.scheme().is_secure();

        if kind != RequestKind::Preflight && !request.origin().is_empty() {
            let origin = request.origin().to_string();
            let response = request.response_mut();
            response.set_header("Access-Control-Allow-Origin", &origin);
            response.set_header("Vary", "Origin");
        }

        if secure && !config.allow_https {
            self.respond_error(request, "This web application does not allow HTTPS connections.");
            return Flow::Done;
        }

        if !secure && config.hsts.enabled {
            let host = request.host().to_string();
            let location = match self.https_port(application) {
                Some(port) => format!("https://{host}:{port}{}", request.complete_path()),
                None => format!("https://{host}{}", request.complete_path()),
            };
            debug!(%location, "redirecting to https");

            let response = request.response_mut();
            response.set_status(StatusCode::MOVED_PERMANENTLY, "Moved Permanently");
            response.set_header("Location", &location);
            response.clear_body();
            return Flow::Done;
        }

        if kind == RequestKind::Preflight {
            self.preflight(request, application);
            return Flow::Done;
        }

        if secure && config.hsts.enabled {
            let response = request.response_mut();
            response.set_header("Strict-Transport-Security", &config.hsts.header_value());
            for (name, value) in &config.hsts.security_headers {
                response.set_header(name, value);
            }
        }

        Flow::Continue
    }

    fn preflight(&self, request: &mut Request, application: &Application) {
        let config = application.config();
        let origin = request.origin().to_string();
        let host = request.host().to_string();
        let response = request.response_mut();

        response.set_status(StatusCode::NO_CONTENT, "No Content");
        response.clear_body();

        if self.cors_override {
            response.set_header("Access-Control-Allow-Headers", "*");
            response.set_header("Access-Control-Allow-Methods", &DEFAULT_CORS_METHODS.join(", "));
            response.set_header("Access-Control-Allow-Origin", &origin);
            response.set_header("Access-Control-Max-Age", &DEFAULT_CORS_MAX_AGE.to_string());
        } else if config.cors.enabled {
            let cors = &config.cors;
            response.set_header("Access-Control-Allow-Headers", &cors.allow_headers.join(","));
            response.set_header("Access-Control-Allow-Methods", &cors.allow_methods.join(","));
            if let Some(allow_origin) = cors.allow_origin_for(&host) {
                response.set_header("Access-Control-Allow-Origin", allow_origin);
            }
            response.set_header("Access-Control-Max-Age", &cors.max_age_seconds.to_string());
        }

        response.set_header("Vary", "Origin");
    }

    /// Resolves the resource behind a static or page request and produces its content.
    async fn dispatch(&self, request: &mut Request, application: &Arc<Application>) {
        let resource = resource_path(request, application);
        let file = application.root().map(|root| root.join(resource.trim_start_matches('/')));

        let exists = match &file {
            Some(file) => tokio::fs::metadata(file).await.is_ok_and(|metadata| metadata.is_file()),
            None => false,
        };
        if !application.is_virtual_service() && !exists {
            self.respond_not_found(request, &resource);
            return;
        }

        let accepts_gzip = request.accepts_gzip();
        let response = request.response_mut();
        response.set_compressed(accepts_gzip);
        response.set_mime(mime_type::mime_for_path(&resource));

        if request.kind() == RequestKind::Static {
            request.response_mut().set_header("Cache-Control", STATIC_CACHE_CONTROL);
            if let Some(file) = file.as_deref().filter(|_| !application.is_virtual_service()) {
                self.append_file(request, file).await;
            }
            return;
        }

        let dispatched = tokio::time::timeout(self.request_timeout, application.process(request)).await;
        match dispatched {
            Err(_) => {
                warn!(path = request.path(), timeout = ?self.request_timeout, "request handler timed out");
                self.respond_error(request, "The request handler did not finish in time.");
            }
            Ok(Err(e)) => {
                warn!(path = request.path(), cause = %e, "request handler failed");
                self.respond_error(request, &e.to_string());
            }
            Ok(Ok(PageKind::None)) => {
                if let Some(file) = file.as_deref().filter(|_| !application.is_virtual_service()) {
                    self.append_file(request, file).await;
                }
            }
            Ok(Ok(PageKind::Webhook | PageKind::Script)) => {}
        }
    }

    async fn append_file(&self, request: &mut Request, file: &Path) {
        match tokio::fs::read(file).await {
            Ok(content) => request.response_mut().write(&content),
            Err(e) => {
                warn!(file = %file.display(), cause = %e, "can't read resource");
                self.respond_error(request, &format!("The file could not be read {}.", file.display()));
            }
        }
    }

    fn respond_error(&self, request: &mut Request, message: &str) {
        self.status_pages.respond(request, StatusCode::INTERNAL_SERVER_ERROR, SERVER_ERROR, message);
    }

    fn respond_not_found(&self, request: &mut Request, resource: &str) {
        self.status_pages.respond(request, StatusCode::NOT_FOUND, "Page Not Found", &format!("The file was not found {resource}."));
    }
}

/// Virtual resource path of a request: the route target or the request path, with the
/// default page filled in for directories. The file name is appended to the segments.
fn resource_path(request: &mut Request, application: &Application) -> String {
    let default_page = application.config().default_web_page.clone();

    let mut resource = application.match_route_url(request).unwrap_or_else(|| request.path().to_string());
    if resource == "/" || resource.is_empty() {
        resource = format!("/{default_page}");
        request.set_path(resource.clone());
    }
    if !resource.starts_with('/') {
        resource.insert(0, '/');
    }
    if !resource.contains('.') {
        resource = format!("{}/{default_page}", resource.trim_end_matches('/'));
    }

    if let Some(file_name) = resource.rsplit('/').next().filter(|name| !name.is_empty()) {
        request.push_segment(file_name);
    }
    resource
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(path: &str) -> Request {
        let text = format!("GET {path} HTTP/1.1\r\nHost: a.test\r\n\r\n");
        RequestDecoder::new(tenant_http::protocol::Scheme::Http).decode(Bytes::from(text)).request
    }

    fn application() -> Application {
        Application::builder().host_names(["a.test"]).route("/users/{id}", "/user.html").build().unwrap()
    }

    #[test]
    fn root_uses_default_page() {
        let mut request = request("/");
        assert_eq!(resource_path(&mut request, &application()), "/index.html");
        assert_eq!(request.path(), "/index.html");
        assert_eq!(request.segments().last().map(String::as_str), Some("index.html"));
    }

    #[test]
    fn directory_gets_default_page() {
        let mut request = request("/docs/");
        assert_eq!(resource_path(&mut request, &application()), "/docs/index.html");
    }

    #[test]
    fn route_target_is_the_resource() {
        let mut request = request("/users/42");
        assert_eq!(resource_path(&mut request, &application()), "/user.html");
        assert_eq!(request.params().get("id"), Some("42"));
        assert_eq!(request.segments().last().map(String::as_str), Some("user.html"));
    }
}
