use std::fmt;

/// Request method as seen on the request line.
///
/// Unknown tokens decode to [`Method::None`], which the decoder treats as an
/// invalid request rather than a parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Connect,
    Options,
    Trace,
    Patch,
    #[default]
    None,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Connect => "CONNECT",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Patch => "PATCH",
            Method::None => "NONE",
        }
    }

    #[inline]
    pub fn is_none(&self) -> bool {
        matches!(self, Method::None)
    }
}

impl From<&str> for Method {
    fn from(str: &str) -> Self {
        const KNOWN: [Method; 9] = [
            Method::Get,
            Method::Head,
            Method::Post,
            Method::Put,
            Method::Delete,
            Method::Connect,
            Method::Options,
            Method::Trace,
            Method::Patch,
        ];

        KNOWN.into_iter().find(|method| method.as_str().eq_ignore_ascii_case(str)).unwrap_or(Method::None)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_from() {
        assert_eq!(Method::from("GET"), Method::Get);
        assert_eq!(Method::from("options"), Method::Options);
        assert_eq!(Method::from("Patch"), Method::Patch);
    }

    #[test]
    fn test_method_from_unknown() {
        assert_eq!(Method::from("BREW"), Method::None);
        assert_eq!(Method::from(""), Method::None);
        assert!(Method::from("PROPFIND").is_none());
    }
}
