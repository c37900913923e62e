use std::fmt;

/// Scheme of the binding a request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scheme {
    #[default]
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    #[inline]
    pub fn is_secure(&self) -> bool {
        matches!(self, Scheme::Https)
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection preference of a request or response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionType {
    KeepAlive,
    #[default]
    Close,
}

impl ConnectionType {
    /// Anything other than `close` keeps the connection alive.
    pub fn from_header(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("close") { ConnectionType::Close } else { ConnectionType::KeepAlive }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionType::KeepAlive => "Keep-Alive",
            ConnectionType::Close => "Close",
        }
    }

    #[inline]
    pub fn is_keep_alive(&self) -> bool {
        matches!(self, ConnectionType::KeepAlive)
    }
}
