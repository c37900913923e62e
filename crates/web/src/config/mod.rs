//! Configuration model.
//!
//! Two layers: [`WebConfig`] is the per-application `WebConfig.json` found in each
//! application root, [`ServerSettings`] is the process level file the binary starts from.

mod settings;
mod web_config;

pub use settings::ApplicationEntry;
pub use settings::BindingEntry;
pub use settings::DEFAULT_REQUEST_TIMEOUT_SECONDS;
pub use settings::DEFAULT_SERVER_NAME;
pub use settings::DEFAULT_SESSION_TTL_SECONDS;
pub use settings::SchemeEntry;
pub use settings::ServerSettings;
pub use settings::StatusPageEntry;

pub use web_config::CodeSection;
pub use web_config::CorsSection;
pub use web_config::DEFAULT_CORS_MAX_AGE;
pub use web_config::DEFAULT_CORS_METHODS;
pub use web_config::DEFAULT_WEB_PAGE;
pub use web_config::HstsSection;
pub use web_config::SslSection;
pub use web_config::WEB_CONFIG_FILE;
pub use web_config::WebConfig;
