//! The multi-tenant server.
//!
//! A [`Server`] owns the listener bindings, the application registry, the session table
//! and the canned status pages. Each accepted connection runs
//! [`HttpConnection`](tenant_http::connection::HttpConnection) with the server as its
//! handler; TLS bindings pick their certificate per connection from the SNI name.
//!
//! ```no_run
//! use tenant_http::protocol::Scheme;
//! use tenant_web::{Application, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::builder()
//!         .name("Example")
//!         .binding("127.0.0.1:8080".parse()?, Scheme::Http)
//!         .build()?;
//!
//!     server.add_application(Application::builder().root("./www").host_names(["localhost"]).build()?)?;
//!     server.start().await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.stop().await;
//!     Ok(())
//! }
//! ```

mod listener;
mod pipeline;
mod sni;

use std::fmt;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwap;
use bytes::Bytes;
use futures::future::join_all;
use tenant_http::codec::NoBody;
use tenant_http::handler::{ConnectionInfo, Handler, Reply};
use tenant_http::protocol::Scheme;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::Application;
use crate::certificate::{apex_candidates, normalize_name};
use crate::config::{DEFAULT_REQUEST_TIMEOUT_SECONDS, DEFAULT_SERVER_NAME, DEFAULT_SESSION_TTL_SECONDS};
use crate::error::ServerError;
use crate::events::{NoServerEvents, ServerEvents};
use crate::session::{SessionKey, SessionManager};
use crate::status_page::StatusPages;

/// An endpoint the server listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub addr: SocketAddr,
    pub scheme: Scheme,
}

impl Binding {
    pub fn new(addr: SocketAddr, scheme: Scheme) -> Self {
        Self { addr, scheme }
    }
}

#[derive(Debug, Default)]
struct Registry {
    applications: Vec<Arc<Application>>,
}

impl Registry {
    fn by_host(&self, host: &str) -> Option<&Arc<Application>> {
        self.applications.iter().find(|application| application.serves_host(host))
    }

    fn by_id(&self, id: Uuid) -> Option<&Arc<Application>> {
        self.applications.iter().find(|application| application.id() == id)
    }
}

/// Keeps only applications bound to `bound`, when given.
fn bound_to(application: &Arc<Application>, bound: Option<SocketAddr>) -> Option<Arc<Application>> {
    match bound {
        Some(addr) if !application.is_bound_to(addr) => None,
        _ => Some(Arc::clone(application)),
    }
}

/// State shared by the listeners, connections and the session sweep.
pub(crate) struct Shared {
    name: String,
    cors_override: bool,
    request_timeout: Duration,
    status_pages: StatusPages,
    events: Arc<dyn ServerEvents>,
    bindings: Mutex<Vec<Binding>>,
    registry: ArcSwap<Registry>,
    registry_lock: Mutex<()>,
    sessions: SessionManager,
}

impl fmt::Debug for Shared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared")
            .field("name", &self.name)
            .field("cors_override", &self.cors_override)
            .field("request_timeout", &self.request_timeout)
            .field("registry", &self.registry.load())
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}

impl Shared {
    fn bindings(&self) -> Vec<Binding> {
        self.bindings.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(crate) fn application_by_host(&self, host: &str, bound: Option<SocketAddr>) -> Option<Arc<Application>> {
        self.registry.load().by_host(host).and_then(|application| bound_to(application, bound))
    }

    /// Certificate for an SNI name: the application serving the name or, failing that,
    /// its closest parent domain is asked.
    pub(crate) fn certificate_for(&self, sni: &str) -> Option<Arc<rustls::sign::CertifiedKey>> {
        let sni = normalize_name(sni);
        let registry = self.registry.load();
        let application = apex_candidates(&sni).find_map(|candidate| registry.by_host(candidate))?;
        application.assigned_certificate(&sni)
    }

    fn notify_session_unloaded(&self, session: &Application) {
        let notify = AssertUnwindSafe(|| self.events.session_unloaded(session));
        if panic::catch_unwind(notify).is_err() {
            error!(session = %session.id(), "session unloaded listener panicked");
        }
    }

    pub(crate) fn unload_idle_sessions(&self, now: Instant) -> usize {
        let evicted = self.sessions.sweep(now);
        for session in &evicted {
            self.notify_session_unloaded(session);
        }
        evicted.len()
    }

    fn unload_all_sessions(&self) -> usize {
        let drained = self.sessions.drain();
        for session in &drained {
            self.notify_session_unloaded(session);
        }
        drained.len()
    }
}

#[derive(Debug)]
struct Running {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    local_addrs: Vec<(Binding, SocketAddr)>,
}

pub struct Server {
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server").field("shared", &self.shared).field("running", &self.is_running()).finish()
    }
}

pub struct ServerBuilder {
    name: String,
    session_ttl: Duration,
    cors_override: bool,
    request_timeout: Duration,
    status_pages: StatusPages,
    events: Arc<dyn ServerEvents>,
    bindings: Vec<Binding>,
}

impl fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerBuilder")
            .field("name", &self.name)
            .field("session_ttl", &self.session_ttl)
            .field("bindings", &self.bindings)
            .finish_non_exhaustive()
    }
}

impl ServerBuilder {
    fn new() -> Self {
        Self {
            name: DEFAULT_SERVER_NAME.to_string(),
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECONDS),
            cors_override: false,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECONDS),
            status_pages: StatusPages::new(),
            events: Arc::new(NoServerEvents),
            bindings: Vec::new(),
        }
    }

    /// Sent as `Server: <name> Application Server`.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Answer every preflight with allow-all CORS headers, whatever the application says.
    #[must_use]
    pub fn cors_override(mut self, cors_override: bool) -> Self {
        self.cors_override = cors_override;
        self
    }

    /// Budget for completing a short body and for each route or page handler.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn status_pages(mut self, status_pages: StatusPages) -> Self {
        self.status_pages = status_pages;
        self
    }

    #[must_use]
    pub fn events(mut self, events: Arc<dyn ServerEvents>) -> Self {
        self.events = events;
        self
    }

    #[must_use]
    pub fn binding(mut self, addr: SocketAddr, scheme: Scheme) -> Self {
        self.bindings.push(Binding::new(addr, scheme));
        self
    }

    pub fn build(self) -> Result<Server, ServerError> {
        let mut bindings: Vec<Binding> = Vec::with_capacity(self.bindings.len());
        for binding in self.bindings {
            if bindings.iter().any(|existing| existing.addr == binding.addr) {
                return Err(ServerError::DuplicateListener(binding.addr));
            }
            bindings.push(binding);
        }

        let shared = Shared {
            name: self.name,
            cors_override: self.cors_override,
            request_timeout: self.request_timeout,
            status_pages: self.status_pages,
            events: self.events,
            bindings: Mutex::new(bindings),
            registry: ArcSwap::from_pointee(Registry::default()),
            registry_lock: Mutex::new(()),
            sessions: SessionManager::new(self.session_ttl),
        };
        Ok(Server { shared: Arc::new(shared), running: Mutex::new(None) })
    }
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn bindings(&self) -> Vec<Binding> {
        self.shared.bindings()
    }

    /// Adds a listener endpoint. Takes effect on the next [`start`](Self::start).
    pub fn add_binding(&self, addr: SocketAddr, scheme: Scheme) -> Result<(), ServerError> {
        let mut bindings = self.shared.bindings.lock().unwrap_or_else(PoisonError::into_inner);
        if bindings.iter().any(|binding| binding.addr == addr) {
            return Err(ServerError::DuplicateListener(addr));
        }
        bindings.push(Binding::new(addr, scheme));
        Ok(())
    }

    /// Adds several endpoints; failures are logged and skipped.
    pub fn add_bindings(&self, bindings: impl IntoIterator<Item = Binding>) {
        for binding in bindings {
            if let Err(e) = self.add_binding(binding.addr, binding.scheme) {
                warn!(addr = %binding.addr, cause = %e, "skipping binding");
                self.shared.events.server_error(&e);
            }
        }
    }

    /// Registers an application. Host names must be unique across the server; an
    /// application without bindings answers on every server binding.
    pub fn add_application(&self, mut application: Application) -> Result<Arc<Application>, ServerError> {
        let _guard = self.shared.registry_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.shared.registry.load_full();

        for host in application.host_names() {
            if current.by_host(&host).is_some() {
                return Err(ServerError::DuplicateHostName(host));
            }
        }

        if application.bindings().is_empty() {
            application.set_bindings(self.shared.bindings().iter().map(|binding| binding.addr).collect());
        }

        let application = Arc::new(application);
        let mut applications = current.applications.clone();
        applications.push(Arc::clone(&application));
        self.shared.registry.store(Arc::new(Registry { applications }));

        info!(id = %application.id(), hosts = ?application.host_names(), bindings = ?application.bindings(), "application added");
        Ok(application)
    }

    pub fn remove_application(&self, id: Uuid) -> Result<Arc<Application>, ServerError> {
        let _guard = self.shared.registry_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.shared.registry.load_full();

        let removed = current.by_id(id).cloned().ok_or(ServerError::UnknownApplication(id))?;
        let applications = current.applications.iter().filter(|application| application.id() != id).cloned().collect();
        self.shared.registry.store(Arc::new(Registry { applications }));

        info!(id = %id, "application removed");
        Ok(removed)
    }

    /// The application serving `host`, if it is bound to `bound` when given.
    pub fn application_by_host(&self, host: &str, bound: Option<SocketAddr>) -> Option<Arc<Application>> {
        self.shared.application_by_host(host, bound)
    }

    pub fn application_by_id(&self, id: Uuid, bound: Option<SocketAddr>) -> Option<Arc<Application>> {
        self.shared.registry.load().by_id(id).and_then(|application| bound_to(application, bound))
    }

    pub fn applications(&self) -> Vec<Arc<Application>> {
        self.shared.registry.load().applications.clone()
    }

    /// The session a client holds on the registered application `application`.
    pub fn session(&self, application: Uuid, fingerprint: &str) -> Option<Arc<Application>> {
        self.shared.sessions.get(&SessionKey::new(application, fingerprint))
    }

    pub fn session_count(&self) -> usize {
        self.shared.sessions.len()
    }

    /// Removes a session without notifying listeners.
    pub fn remove_session(&self, application: Uuid, fingerprint: &str) -> Option<Arc<Application>> {
        self.shared.sessions.evict(&SessionKey::new(application, fingerprint))
    }

    /// Evicts sessions idle for longer than the TTL at `now`; returns how many.
    pub fn unload_idle_sessions(&self, now: Instant) -> usize {
        self.shared.unload_idle_sessions(now)
    }

    /// Runs one message through the pipeline without a socket. The body must be complete.
    pub async fn handle_bytes(&self, conn: &ConnectionInfo, data: Bytes) -> Reply {
        self.shared.call(conn, data, &mut NoBody).await
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Addresses actually bound, e.g. to find the port picked for `:0`.
    pub fn local_addrs(&self) -> Vec<(Binding, SocketAddr)> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner).as_ref().map(|running| running.local_addrs.clone()).unwrap_or_default()
    }

    /// Binds every listener and starts the session sweep.
    pub async fn start(&self) -> Result<(), ServerError> {
        if self.is_running() {
            return Err(ServerError::AlreadyRunning);
        }

        let token = CancellationToken::new();
        let listeners = match listener::bind_all(&self.shared.bindings(), &self.shared).await {
            Ok(listeners) => listeners,
            Err(e) => {
                error!(cause = %e, "can't start server");
                self.shared.events.server_error(&e);
                return Err(e);
            }
        };

        let mut tasks = Vec::with_capacity(listeners.len() + 1);
        let mut local_addrs = Vec::with_capacity(listeners.len());
        for bound in listeners {
            local_addrs.push((bound.binding, bound.local_addr));
            tasks.push(tokio::spawn(listener::serve(bound, Arc::clone(&self.shared), token.child_token())));
        }
        tasks.push(tokio::spawn(sweep_sessions(Arc::clone(&self.shared), token.child_token())));

        info!(name = %self.shared.name, addrs = ?local_addrs, "server started");
        *self.running.lock().unwrap_or_else(PoisonError::into_inner) = Some(Running { token, tasks, local_addrs });
        Ok(())
    }

    /// Stops the listeners and the sweep, then unloads every session.
    pub async fn stop(&self) {
        let running = self.running.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(running) = running {
            running.token.cancel();
            for result in join_all(running.tasks).await {
                if let Err(e) = result {
                    warn!(cause = %e, "server task ended abnormally");
                }
            }
        }

        let unloaded = self.shared.unload_all_sessions();
        info!(name = %self.shared.name, sessions = unloaded, "server stopped");
    }

    /// Stops the server and drops every application.
    pub async fn shutdown(&self) {
        self.stop().await;
        let _guard = self.shared.registry_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.shared.registry.store(Arc::new(Registry::default()));
    }
}

/// Evicts idle sessions once per TTL until cancelled.
async fn sweep_sessions(shared: Arc<Shared>, token: CancellationToken) {
    let period = shared.sessions.ttl().max(Duration::from_secs(1));
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            () = token.cancelled() => break,
            _ = interval.tick() => {
                let unloaded = shared.unload_idle_sessions(Instant::now());
                if unloaded > 0 {
                    info!(count = unloaded, "session sweep");
                }
            }
        }
    }
}
