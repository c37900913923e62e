use std::collections::BTreeMap;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tenant_http::protocol::Scheme;

use crate::error::ConfigError;

pub const DEFAULT_SERVER_NAME: &str = "Tenant";
pub const DEFAULT_SESSION_TTL_SECONDS: u64 = 1200;
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;

/// Process level settings read by the `tenant-server` binary.
///
/// ```json
/// {
///   "name": "Tenant",
///   "sessionTtlSeconds": 1200,
///   "bindings": [ { "address": "0.0.0.0:8080", "scheme": "http" } ],
///   "applications": [ { "root": "/srv/www/example" } ]
/// }
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    pub name: String,
    pub session_ttl_seconds: u64,
    pub cors_override: bool,
    pub request_timeout_seconds: u64,
    pub certificate_dir: Option<PathBuf>,
    pub bindings: Vec<BindingEntry>,
    pub applications: Vec<ApplicationEntry>,
    pub status_pages: Vec<StatusPageEntry>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BindingEntry {
    pub address: SocketAddr,
    #[serde(default)]
    pub scheme: SchemeEntry,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SchemeEntry {
    #[default]
    Http,
    Https,
}

impl From<SchemeEntry> for Scheme {
    fn from(value: SchemeEntry) -> Self {
        match value {
            SchemeEntry::Http => Scheme::Http,
            SchemeEntry::Https => Scheme::Https,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationEntry {
    pub root: PathBuf,
    #[serde(default)]
    pub virtual_service: bool,
    #[serde(default)]
    pub bindings: Vec<SocketAddr>,
}

/// An HTML template served for a status code, with its `<%Name%>` substitutions.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusPageEntry {
    pub code: u16,
    pub template: PathBuf,
    #[serde(default)]
    pub placeholders: BTreeMap<String, String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            name: DEFAULT_SERVER_NAME.to_string(),
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            cors_override: false,
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
            certificate_dir: None,
            bindings: Vec::new(),
            applications: Vec::new(),
            status_pages: Vec::new(),
        }
    }
}

impl ServerSettings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        let mut settings: Self = serde_json::from_str(&text).map_err(|e| ConfigError::json(path, e))?;

        // relative paths are relative to the settings file
        if let Some(base) = path.parent() {
            settings.resolve_paths(base);
        }
        Ok(settings)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    fn resolve_paths(&mut self, base: &Path) {
        for application in &mut self.applications {
            application.root = base.join(&application.root);
        }
        for page in &mut self.status_pages {
            page.template = base.join(&page.template);
        }
        if let Some(dir) = self.certificate_dir.as_mut() {
            *dir = base.join(&*dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn load_settings_relative_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.json");
        fs::write(
            &path,
            indoc! {r#"
                {
                    "name": "Edge",
                    "sessionTtlSeconds": 60,
                    "corsOverride": true,
                    "certificateDir": "certs",
                    "bindings": [
                        { "address": "127.0.0.1:8080" },
                        { "address": "127.0.0.1:8443", "scheme": "https" }
                    ],
                    "applications": [ { "root": "sites/a", "virtualService": true } ],
                    "statusPages": [ { "code": 404, "template": "404.html", "placeholders": { "Title": "Gone" } } ]
                }
            "#},
        )
        .unwrap();

        let settings = ServerSettings::load(&path).unwrap();
        assert_eq!(settings.name, "Edge");
        assert_eq!(settings.session_ttl(), Duration::from_secs(60));
        assert_eq!(settings.request_timeout(), Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECONDS));
        assert!(settings.cors_override);
        assert_eq!(settings.bindings[0].scheme, SchemeEntry::Http);
        assert_eq!(Scheme::from(settings.bindings[1].scheme), Scheme::Https);
        assert_eq!(settings.applications[0].root, dir.path().join("sites/a"));
        assert!(settings.applications[0].virtual_service);
        assert_eq!(settings.status_pages[0].template, dir.path().join("404.html"));
        assert_eq!(settings.certificate_dir, Some(dir.path().join("certs")));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(ServerSettings::load(&dir.path().join("nope.json")), Err(ConfigError::Io { .. })));
    }
}
