use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::certificate::{CertificateSet, CertificateStore};
use crate::config::WebConfig;
use crate::error::ServerError;
use crate::page::{self, PageCompiler, PageTable};
use crate::route::{Route, RouteHandler, RouteTable};

/// Smallest `max-age` for which a `preload` directive is emitted.
pub const HSTS_PRELOAD_MIN_AGE: u64 = 31_536_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsPolicy {
    pub enabled: bool,
    pub allow_origin: Vec<String>,
    pub allow_methods: Vec<String>,
    pub allow_headers: Vec<String>,
    pub max_age_seconds: u32,
}

impl CorsPolicy {
    /// `Access-Control-Allow-Origin` for a preflight against `host`: `*` when the list
    /// allows any origin, else the first entry naming the host.
    pub fn allow_origin_for(&self, host: &str) -> Option<&str> {
        if self.allow_origin.iter().any(|origin| origin == "*") {
            return Some("*");
        }
        if host.is_empty() {
            return None;
        }
        self.allow_origin.iter().find(|origin| origin.contains(host)).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HstsPolicy {
    pub enabled: bool,
    pub max_age: u64,
    pub include_sub_domains: bool,
    pub preload: bool,
    /// Extra security headers sent with the HSTS header, empty values already removed.
    pub security_headers: Vec<(String, String)>,
}

impl HstsPolicy {
    /// Value of `Strict-Transport-Security`. `preload` needs sub domains included and a
    /// max age of at least a year.
    pub fn header_value(&self) -> String {
        let mut value = format!("max-age={}", self.max_age);
        if self.include_sub_domains {
            value.push_str("; includeSubDomains");
        }
        if self.preload && self.include_sub_domains && self.max_age >= HSTS_PRELOAD_MIN_AGE {
            value.push_str("; preload");
        }
        value
    }
}

/// The resolved, read-only configuration of an application.
///
/// Built from `WebConfig` plus whatever was registered programmatically. A reload
/// builds a new one and swaps it in whole.
#[derive(Debug, Clone)]
pub struct ApplicationConfig {
    pub host_names: Vec<String>,
    pub allow_sessions: bool,
    pub default_web_page: String,
    pub allow_https: bool,
    pub cors: CorsPolicy,
    pub hsts: HstsPolicy,
    pub run_time_compile: bool,
    pub routes: RouteTable,
    pub pages: PageTable,
    pub certificates: CertificateSet,
    pub settings: BTreeMap<String, String>,
}

impl ApplicationConfig {
    pub fn serves_host(&self, host: &str) -> bool {
        self.host_names.iter().any(|name| name.eq_ignore_ascii_case(host))
    }
}

/// Everything besides `WebConfig.json` that goes into an [`ApplicationConfig`].
pub(crate) struct Blueprint {
    /// Used when the root holds no `WebConfig.json`.
    pub(crate) base: WebConfig,
    pub(crate) routes: Vec<(String, String)>,
    pub(crate) route_handlers: HashMap<String, Arc<dyn RouteHandler>>,
    pub(crate) pages: PageTable,
    pub(crate) compiler: Option<Arc<dyn PageCompiler>>,
    pub(crate) store: Arc<dyn CertificateStore>,
    pub(crate) certificate_validity: Duration,
}

impl Blueprint {
    pub(crate) fn load(&self, root: Option<&Path>) -> Result<ApplicationConfig, ServerError> {
        let file_config = match root {
            Some(root) => WebConfig::load(root)?,
            None => None,
        };
        let web_config = match file_config {
            Some(config) => config,
            None => {
                self.base.validate()?;
                self.base.clone()
            }
        };

        let mut routes = RouteTable::new();
        for (requested, real) in web_config.routes().into_iter().chain(self.routes.iter().cloned()) {
            match Route::new(requested.as_str(), real) {
                Ok(mut route) => {
                    route.set_handler(self.route_handlers.get(&requested).cloned());
                    routes.insert(route);
                }
                Err(e) => warn!(route = %requested, cause = %e, "skipping route with invalid pattern"),
            }
        }

        let mut pages = self.pages.clone();
        if let (Some(root), Some(compiler)) = (root, self.compiler.as_deref()) {
            let sources =
                page::discover(root, &web_config.code.dot_net_code_extention, &web_config.code.dot_net_resouces_extention);
            debug!(root = %root.display(), count = sources.len(), "discovered pages");
            pages.compile_all(&sources, compiler);
        }

        let certificates =
            CertificateSet::load(&web_config.ssl.certificate_names, self.store.as_ref(), self.certificate_validity)?;

        Ok(ApplicationConfig {
            host_names: web_config.host_names.iter().map(|host| host.trim().to_string()).filter(|host| !host.is_empty()).collect(),
            allow_sessions: web_config.allow_sessions,
            default_web_page: web_config.default_web_page.clone(),
            allow_https: web_config.ssl.allow_https,
            cors: CorsPolicy {
                enabled: web_config.cors.allow_cors,
                allow_origin: web_config.cors.cors_allow_origin.clone(),
                allow_methods: web_config.cors.cors_allow_methods.clone(),
                allow_headers: web_config.cors.cors_allow_headers.clone(),
                max_age_seconds: web_config.cors_max_age_seconds,
            },
            hsts: HstsPolicy {
                enabled: web_config.hsts.enabled,
                max_age: web_config.hsts.max_age,
                include_sub_domains: web_config.hsts.include_sub_domains,
                preload: web_config.hsts.pre_load,
                security_headers: web_config.security_headers(),
            },
            run_time_compile: web_config.code.run_time_compile,
            routes,
            pages,
            certificates,
            settings: web_config.settings(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cors(origins: &[&str]) -> CorsPolicy {
        CorsPolicy {
            enabled: true,
            allow_origin: origins.iter().map(ToString::to_string).collect(),
            allow_methods: vec![],
            allow_headers: vec![],
            max_age_seconds: 300,
        }
    }

    #[test]
    fn cors_origin_wildcard_wins() {
        assert_eq!(cors(&["https://x", "*"]).allow_origin_for("x"), Some("*"));
    }

    #[test]
    fn cors_origin_matches_entry_naming_host() {
        let policy = cors(&["https://a.test", "https://x"]);
        assert_eq!(policy.allow_origin_for("x"), Some("https://x"));
        assert_eq!(policy.allow_origin_for("b.test"), None);
        assert_eq!(policy.allow_origin_for(""), None);
    }

    #[test]
    fn hsts_header_value() {
        let mut policy = HstsPolicy { enabled: true, max_age: 600, ..HstsPolicy::default() };
        assert_eq!(policy.header_value(), "max-age=600");

        policy.preload = true;
        assert_eq!(policy.header_value(), "max-age=600");

        policy.include_sub_domains = true;
        assert_eq!(policy.header_value(), "max-age=600; includeSubDomains");

        policy.max_age = HSTS_PRELOAD_MIN_AGE;
        assert_eq!(policy.header_value(), "max-age=31536000; includeSubDomains; preload");
    }
}
