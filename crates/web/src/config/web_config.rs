use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ConfigError;

/// Name of the per-application configuration file, looked up in the application root.
pub const WEB_CONFIG_FILE: &str = "WebConfig.json";

pub const DEFAULT_WEB_PAGE: &str = "index.html";
pub const DEFAULT_CORS_MAX_AGE: u32 = 300;
pub const DEFAULT_CORS_METHODS: [&str; 6] = ["POST", "GET", "DELETE", "OPTIONS", "PUT", "PATCH"];

/// The contents of `WebConfig.json`.
///
/// Key names follow the file format exactly, so a configuration written for an existing
/// deployment loads unchanged. Every section is optional; missing values take the
/// defaults of [`WebConfig::default`].
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct WebConfig {
    pub host_names: Vec<String>,
    pub allow_sessions: bool,
    pub default_web_page: String,
    #[serde(rename = "SSL")]
    pub ssl: SslSection,
    #[serde(rename = "CORS")]
    pub cors: CorsSection,
    pub cors_max_age_seconds: u32,
    #[serde(rename = "HSTS")]
    pub hsts: HstsSection,
    #[serde(rename = "CODE")]
    pub code: CodeSection,
    pub application_settings: Vec<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct SslSection {
    pub allow_https: bool,
    pub certificate_names: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct CorsSection {
    pub allow_cors: bool,
    pub cors_allow_origin: Vec<String>,
    pub cors_allow_methods: Vec<String>,
    pub cors_allow_headers: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct HstsSection {
    pub enabled: bool,
    pub max_age: u64,
    pub include_sub_domains: bool,
    pub pre_load: bool,
    #[serde(rename = "CPS")]
    pub cps: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct CodeSection {
    pub run_time_compile: bool,
    pub dot_net_resouces_extention: Vec<String>,
    pub dot_net_code_extention: Vec<String>,
    pub route_table: Vec<Map<String, Value>>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host_names: Vec::new(),
            allow_sessions: false,
            default_web_page: DEFAULT_WEB_PAGE.to_string(),
            ssl: SslSection::default(),
            cors: CorsSection::default(),
            cors_max_age_seconds: DEFAULT_CORS_MAX_AGE,
            hsts: HstsSection::default(),
            code: CodeSection::default(),
            application_settings: Vec::new(),
        }
    }
}

impl Default for CorsSection {
    fn default() -> Self {
        Self {
            allow_cors: false,
            cors_allow_origin: vec!["*".to_string()],
            cors_allow_methods: DEFAULT_CORS_METHODS.iter().map(ToString::to_string).collect(),
            cors_allow_headers: vec!["*".to_string()],
        }
    }
}

impl WebConfig {
    /// Reads `WebConfig.json` from `root`. A missing file is `Ok(None)`.
    pub fn load(root: &Path) -> Result<Option<Self>, ConfigError> {
        let path = root.join(WEB_CONFIG_FILE);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no web configuration file");
                return Ok(None);
            }
            Err(e) => return Err(ConfigError::io(path, e)),
        };

        let config: Self = serde_json::from_str(&text).map_err(|e| ConfigError::json(&path, e))?;
        config.validate()?;
        Ok(Some(config))
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text).map_err(|e| ConfigError::json(WEB_CONFIG_FILE, e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host_names.iter().all(|host| host.trim().is_empty()) {
            return Err(ConfigError::MissingHostNames);
        }
        Ok(())
    }

    /// `RouteTable` entries as `(virtual path, real path)` in file order.
    pub fn routes(&self) -> Vec<(String, String)> {
        self.code.route_table.iter().filter_map(first_entry).collect()
    }

    /// `ApplicationSettings` flattened into one map; the first entry for a key wins.
    pub fn settings(&self) -> BTreeMap<String, String> {
        let mut settings = BTreeMap::new();
        for (key, value) in self.application_settings.iter().filter_map(first_entry) {
            settings.entry(key).or_insert(value);
        }
        settings
    }

    /// `HSTS.CPS` as header name/value pairs, skipping empty values.
    pub fn security_headers(&self) -> Vec<(String, String)> {
        self.hsts
            .cps
            .iter()
            .map(|(name, value)| (name.clone(), value_text(value)))
            .filter(|(_, value)| !value.is_empty())
            .collect()
    }
}

fn first_entry(object: &Map<String, Value>) -> Option<(String, String)> {
    object.iter().next().map(|(key, value)| (key.clone(), value_text(value)))
}

/// Strings as-is, everything else in its JSON form.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    const FULL: &str = indoc! {r#"
        {
            "HostNames": ["example.com", "www.example.com"],
            "AllowSessions": true,
            "DefaultWebPage": "default.htm",
            "SSL": { "AllowHttps": true, "CertificateNames": ["example.com"] },
            "CORS": {
                "AllowCors": true,
                "CorsAllowOrigin": ["https://x"],
                "CorsAllowMethods": ["GET"],
                "CorsAllowHeaders": ["Content-Type"]
            },
            "CorsMaxAgeSeconds": 600,
            "HSTS": {
                "Enabled": true,
                "MaxAge": 31536000,
                "IncludeSubDomains": true,
                "PreLoad": true,
                "CPS": { "X-Frame-Options": "DENY", "X-Empty": "" }
            },
            "CODE": {
                "RunTimeCompile": true,
                "DotNetResoucesExtention": [".aspx"],
                "DotNetCodeExtention": [".cs"],
                "RouteTable": [ { "/users/{id}": "/user.html" }, { "/hooks": "/github" } ]
            },
            "ApplicationSettings": [ { "theme": "dark" }, { "retries": 3 } ]
        }
    "#};

    #[test]
    fn parse_full_config() {
        let config = WebConfig::from_json(FULL).unwrap();

        assert_eq!(config.host_names, vec!["example.com", "www.example.com"]);
        assert!(config.allow_sessions);
        assert_eq!(config.default_web_page, "default.htm");
        assert!(config.ssl.allow_https);
        assert_eq!(config.ssl.certificate_names, vec!["example.com"]);
        assert!(config.cors.allow_cors);
        assert_eq!(config.cors.cors_allow_origin, vec!["https://x"]);
        assert_eq!(config.cors_max_age_seconds, 600);
        assert!(config.hsts.enabled);
        assert_eq!(config.hsts.max_age, 31_536_000);
        assert!(config.code.run_time_compile);
        assert_eq!(config.code.dot_net_code_extention, vec![".cs"]);

        assert_eq!(
            config.routes(),
            vec![("/users/{id}".to_string(), "/user.html".to_string()), ("/hooks".to_string(), "/github".to_string())]
        );
        assert_eq!(config.settings().get("retries").map(String::as_str), Some("3"));
        assert_eq!(config.security_headers(), vec![("X-Frame-Options".to_string(), "DENY".to_string())]);
    }

    #[test]
    fn defaults_fill_missing_sections() {
        let config = WebConfig::from_json(r#"{ "HostNames": ["a.test"] }"#).unwrap();

        assert_eq!(config.default_web_page, DEFAULT_WEB_PAGE);
        assert!(!config.ssl.allow_https);
        assert_eq!(config.cors.cors_allow_origin, vec!["*"]);
        assert_eq!(config.cors.cors_allow_methods, DEFAULT_CORS_METHODS.to_vec());
        assert_eq!(config.cors.cors_allow_headers, vec!["*"]);
        assert_eq!(config.cors_max_age_seconds, DEFAULT_CORS_MAX_AGE);
        assert!(config.routes().is_empty());
    }

    #[test]
    fn host_names_are_required() {
        assert!(matches!(WebConfig::from_json("{}"), Err(ConfigError::MissingHostNames)));
        assert!(matches!(WebConfig::from_json(r#"{ "HostNames": [""] }"#), Err(ConfigError::MissingHostNames)));
    }

    #[test]
    fn load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(WebConfig::load(dir.path()).unwrap().is_none());

        fs::write(dir.path().join(WEB_CONFIG_FILE), FULL).unwrap();
        let config = WebConfig::load(dir.path()).unwrap().unwrap();
        assert_eq!(config.host_names.len(), 2);

        fs::write(dir.path().join(WEB_CONFIG_FILE), "{ not json").unwrap();
        assert!(matches!(WebConfig::load(dir.path()), Err(ConfigError::Json { .. })));
    }
}
