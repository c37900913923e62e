use std::error::Error;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use tenant_http::protocol::SendError;
use thiserror::Error;

/// Error type returned by route relays and page load listeners.
pub type HandlerError = Box<dyn Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("can't read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("at least one host name is required for an application")]
    MissingHostNames,
}

impl ConfigError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json { path: path.into(), source }
    }
}

#[derive(Error, Debug)]
pub enum CertificateError {
    #[error("certificate store io error for {name}: {source}")]
    Store {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("no usable {what} found in PEM data for {name}")]
    Pem { name: String, what: &'static str },

    #[error("unsupported private key type for {name}: {source}")]
    UnsupportedKey {
        name: String,
        #[source]
        source: rustls::Error,
    },

    #[error("can't generate a self-signed certificate for {name}: {source}")]
    SelfSigned {
        name: String,
        #[source]
        source: rcgen::Error,
    },
}

impl CertificateError {
    pub fn store(name: impl Into<String>, source: io::Error) -> Self {
        Self::Store { name: name.into(), source }
    }

    pub fn pem(name: impl Into<String>, what: &'static str) -> Self {
        Self::Pem { name: name.into(), what }
    }
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("host name {0} is already in use on another application")]
    DuplicateHostName(String),

    #[error("there is already a listener on {0}")]
    DuplicateListener(SocketAddr),

    #[error("no application with id {0}")]
    UnknownApplication(uuid::Uuid),

    #[error("can't bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("invalid tls configuration: {0}")]
    Tls(#[from] rustls::Error),

    #[error("server is already running")]
    AlreadyRunning,

    #[error("can't encode response: {0}")]
    Encode(#[from] SendError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Certificate(#[from] CertificateError),
}
