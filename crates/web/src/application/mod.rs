//! Applications: one virtual host each.
//!
//! An [`Application`] couples a read-only [`ApplicationConfig`] snapshot with the little
//! state that changes while serving: the last activity clock and session storage. The
//! snapshot sits behind an [`ArcSwap`], so [`Application::reload`] replaces it whole and
//! a concurrent request sees either the old or the new configuration.
//!
//! Sessions are produced with [`Application::clone_session`]: the clone shares the
//! snapshot and listeners but gets its own id, clock and storage.

mod config;

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use rustls::sign::CertifiedKey;
use serde_json::Value;
use tenant_http::protocol::Request;
use thiserror::Error;
use tokio::time::Instant;
use tracing::info;
use uuid::Uuid;

pub use config::ApplicationConfig;
pub use config::CorsPolicy;
pub use config::HSTS_PRELOAD_MIN_AGE;
pub use config::HstsPolicy;

use crate::certificate::{CertificateStore, MemoryCertificateStore, SELF_SIGNED_VALIDITY};
use crate::config::WebConfig;
use crate::error::{HandlerError, ServerError};
use crate::events::{ApplicationEvents, NoApplicationEvents};
use crate::page::{PageCompiler, PageHandler, PageTable};
use crate::route::RouteHandler;
use config::Blueprint;

/// How [`Application::process`] dispatched a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// Relayed to a route handler; nothing else may run.
    Webhook,
    /// Handled by a page handler.
    Script,
    /// Nobody claimed it; the caller serves the file.
    None,
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("route relay failed: {0}")]
    Relay(#[source] HandlerError),

    #[error("{0}")]
    Script(String),

    #[error("page load failed: {0}")]
    PageLoad(#[source] HandlerError),
}

pub struct Application {
    id: Uuid,
    root: Option<PathBuf>,
    virtual_service: bool,
    bindings: Vec<SocketAddr>,
    config: ArcSwap<ApplicationConfig>,
    blueprint: Arc<Blueprint>,
    events: Arc<dyn ApplicationEvents>,
    last_activity: Mutex<Instant>,
    session: DashMap<String, Value>,
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("id", &self.id)
            .field("root", &self.root)
            .field("virtual_service", &self.virtual_service)
            .field("bindings", &self.bindings)
            .field("host_names", &self.config.load().host_names)
            .finish_non_exhaustive()
    }
}

impl Application {
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    /// Loads the application whose `WebConfig.json` lives in `root`.
    pub fn from_root(root: impl Into<PathBuf>, bindings: Vec<SocketAddr>, virtual_service: bool) -> Result<Self, ServerError> {
        Self::builder().root(root).bindings(bindings).virtual_service(virtual_service).build()
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// A virtual service never resolves requests to files.
    pub fn is_virtual_service(&self) -> bool {
        self.virtual_service
    }

    pub fn bindings(&self) -> &[SocketAddr] {
        &self.bindings
    }

    pub fn is_bound_to(&self, addr: SocketAddr) -> bool {
        self.bindings.contains(&addr)
    }

    pub(crate) fn set_bindings(&mut self, bindings: Vec<SocketAddr>) {
        self.bindings = bindings;
    }

    /// The current configuration snapshot.
    pub fn config(&self) -> Arc<ApplicationConfig> {
        self.config.load_full()
    }

    pub fn host_names(&self) -> Vec<String> {
        self.config.load().host_names.clone()
    }

    pub fn serves_host(&self, host: &str) -> bool {
        self.config.load().serves_host(host)
    }

    pub fn events(&self) -> &Arc<dyn ApplicationEvents> {
        &self.events
    }

    pub fn setting(&self, key: &str) -> Option<String> {
        self.config.load().settings.get(key).cloned()
    }

    pub fn session_value(&self, key: &str) -> Option<Value> {
        self.session.get(key).map(|entry| entry.value().clone())
    }

    pub fn set_session_value(&self, key: impl Into<String>, value: Value) {
        self.session.insert(key.into(), value);
    }

    pub fn remove_session_value(&self, key: &str) -> Option<Value> {
        self.session.remove(key).map(|(_, value)| value)
    }

    pub fn last_activity(&self) -> Instant {
        *self.last_activity.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn touch(&self, now: Instant) {
        *self.last_activity.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    /// True once more than `ttl` passed since the last activity.
    pub fn is_idle(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.last_activity()) > ttl
    }

    /// Certificate for an SNI name, falling back to parent domains.
    pub fn assigned_certificate(&self, sni: &str) -> Option<Arc<CertifiedKey>> {
        self.config.load().certificates.resolve(sni).map(|certificate| certificate.certified_key())
    }

    /// Real path of the first route matching the request, binding route parameters.
    pub fn match_route_url(&self, request: &mut Request) -> Option<String> {
        self.config.load().routes.match_url(request)
    }

    /// The application a request was bound to by the server.
    pub fn of(request: &Request) -> Option<&Arc<Application>> {
        request.extensions().get::<Arc<Application>>()
    }

    pub fn attach(self: &Arc<Self>, request: &mut Request) {
        request.extensions_mut().insert(Arc::clone(self));
    }

    /// A session instance: same configuration and listeners, fresh id, clock and storage.
    pub fn clone_session(&self) -> Application {
        Application {
            id: Uuid::new_v4(),
            root: self.root.clone(),
            virtual_service: self.virtual_service,
            bindings: self.bindings.clone(),
            config: ArcSwap::new(self.config.load_full()),
            blueprint: Arc::clone(&self.blueprint),
            events: Arc::clone(&self.events),
            last_activity: Mutex::new(Instant::now()),
            session: DashMap::new(),
        }
    }

    /// Re-reads the configuration and swaps it in; session storage is cleared.
    ///
    /// On error the previous configuration stays in place.
    pub fn reload(&self) -> Result<(), ServerError> {
        let config = self.blueprint.load(self.root.as_deref())?;
        self.config.store(Arc::new(config));
        self.session.clear();
        info!(id = %self.id, "application reloaded");
        Ok(())
    }

    /// Dispatches a page request.
    ///
    /// A webhook route takes the request first and stops everything else. Otherwise a page
    /// handler registered for the last path segment runs, and failing that the generic
    /// page load listener.
    pub async fn process(self: &Arc<Self>, request: &mut Request) -> Result<PageKind, DispatchError> {
        self.touch(Instant::now());
        self.attach(request);
        let config = self.config.load_full();

        if let Some(route) = config.routes.webhook(request.segments()) {
            if let Some(handler) = route.handler() {
                handler.relay(request).await.map_err(DispatchError::Relay)?;
            }
            return Ok(PageKind::Webhook);
        }

        let page = request.segments().last().and_then(|segment| config.pages.get(segment)).cloned();
        if let Some(page) = page {
            page.invoke(request, config.run_time_compile).await.map_err(DispatchError::Script)?;
            return Ok(PageKind::Script);
        }

        self.events.page_load(request).await.map_err(DispatchError::PageLoad)?;
        Ok(PageKind::None)
    }
}

/// Builder for [`Application`].
///
/// Without a root, or with a root holding no `WebConfig.json`, the configuration given
/// here is used as is, so at least one host name is needed.
pub struct ApplicationBuilder {
    root: Option<PathBuf>,
    virtual_service: bool,
    bindings: Vec<SocketAddr>,
    base: WebConfig,
    routes: Vec<(String, String)>,
    route_handlers: HashMap<String, Arc<dyn RouteHandler>>,
    pages: PageTable,
    compiler: Option<Arc<dyn PageCompiler>>,
    store: Option<Arc<dyn CertificateStore>>,
    certificate_validity: Duration,
    events: Arc<dyn ApplicationEvents>,
}

impl fmt::Debug for ApplicationBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationBuilder")
            .field("root", &self.root)
            .field("virtual_service", &self.virtual_service)
            .field("bindings", &self.bindings)
            .field("base", &self.base)
            .field("routes", &self.routes)
            .finish_non_exhaustive()
    }
}

impl ApplicationBuilder {
    fn new() -> Self {
        Self {
            root: None,
            virtual_service: false,
            bindings: Vec::new(),
            base: WebConfig::default(),
            routes: Vec::new(),
            route_handlers: HashMap::new(),
            pages: PageTable::new(),
            compiler: None,
            store: None,
            certificate_validity: SELF_SIGNED_VALIDITY,
            events: Arc::new(NoApplicationEvents),
        }
    }

    #[must_use]
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    #[must_use]
    pub fn virtual_service(mut self, virtual_service: bool) -> Self {
        self.virtual_service = virtual_service;
        self
    }

    /// Endpoints this application answers on; empty means every server binding.
    #[must_use]
    pub fn bindings(mut self, bindings: Vec<SocketAddr>) -> Self {
        self.bindings = bindings;
        self
    }

    #[must_use]
    pub fn config(mut self, config: WebConfig) -> Self {
        self.base = config;
        self
    }

    #[must_use]
    pub fn host_names<I, S>(mut self, host_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.base.host_names = host_names.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a route after the ones from the configuration file.
    #[must_use]
    pub fn route(mut self, requested_path: impl Into<String>, real_path: impl Into<String>) -> Self {
        self.routes.push((requested_path.into(), real_path.into()));
        self
    }

    /// Attaches a relay handler to the route with this requested path.
    #[must_use]
    pub fn route_handler(mut self, requested_path: impl Into<String>, handler: Arc<dyn RouteHandler>) -> Self {
        self.route_handlers.insert(requested_path.into(), handler);
        self
    }

    #[must_use]
    pub fn page(mut self, key: impl Into<String>, handler: Arc<dyn PageHandler>) -> Self {
        self.pages.insert(key, handler);
        self
    }

    #[must_use]
    pub fn page_compiler(mut self, compiler: Arc<dyn PageCompiler>) -> Self {
        self.compiler = Some(compiler);
        self
    }

    #[must_use]
    pub fn certificate_store(mut self, store: Arc<dyn CertificateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Lifetime of self-signed certificates synthesized for unknown names.
    #[must_use]
    pub fn certificate_validity(mut self, validity: Duration) -> Self {
        self.certificate_validity = validity;
        self
    }

    #[must_use]
    pub fn events(mut self, events: Arc<dyn ApplicationEvents>) -> Self {
        self.events = events;
        self
    }

    pub fn build(self) -> Result<Application, ServerError> {
        let blueprint = Blueprint {
            base: self.base,
            routes: self.routes,
            route_handlers: self.route_handlers,
            pages: self.pages,
            compiler: self.compiler,
            store: self.store.unwrap_or_else(|| Arc::new(MemoryCertificateStore::new())),
            certificate_validity: self.certificate_validity,
        };
        let config = blueprint.load(self.root.as_deref())?;

        let application = Application {
            id: Uuid::new_v4(),
            root: self.root,
            virtual_service: self.virtual_service,
            bindings: self.bindings,
            config: ArcSwap::from_pointee(config),
            blueprint: Arc::new(blueprint),
            events: self.events,
            last_activity: Mutex::new(Instant::now()),
            session: DashMap::new(),
        };
        info!(id = %application.id, hosts = ?application.host_names(), "application loaded");
        Ok(application)
    }
}
