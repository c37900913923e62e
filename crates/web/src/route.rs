//! Virtual path routing.
//!
//! A [`Route`] maps a requested (virtual) path template to a real path inside the
//! application root. Templates may hold `{name}` placeholders:
//!
//! ```
//! use tenant_web::route::Route;
//!
//! let route = Route::new("/users/{id}", "/user.html").unwrap();
//! assert_eq!(route.match_path("/users/42"), Some(vec![("id".to_string(), "42".to_string())]));
//! assert_eq!(route.match_path("/users/42/extra"), None);
//! ```
//!
//! Routes double as webhooks: a request whose first two path segments spell out
//! `requested + real` is relayed to the route's [`RouteHandler`] instead of being served
//! from disk.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use tenant_http::protocol::Request;

use crate::error::HandlerError;

/// Receives requests relayed through a webhook route.
#[async_trait]
pub trait RouteHandler: Send + Sync {
    async fn relay(&self, request: &mut Request) -> Result<(), HandlerError>;
}

#[derive(Clone)]
pub struct Route {
    requested_path: String,
    real_path: String,
    // one entry per regex group, literal segments included
    parameters: Vec<String>,
    pattern: Regex,
    handler: Option<Arc<dyn RouteHandler>>,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("requested_path", &self.requested_path)
            .field("real_path", &self.real_path)
            .field("parameters", &self.parameters)
            .field("pattern", &self.pattern.as_str())
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

impl Route {
    /// Compiles `requested_path` once. Each literal segment becomes a group matching
    /// itself and each `{name}` segment a `(\w+)` group; the whole path must match.
    pub fn new(requested_path: impl Into<String>, real_path: impl Into<String>) -> Result<Self, regex::Error> {
        let requested_path = requested_path.into();
        let mut parameters = Vec::new();

        let pattern = if requested_path.contains('{') {
            let mut pattern = String::from("^");
            for segment in requested_path.split('/').filter(|segment| !segment.is_empty()) {
                pattern.push('/');
                if is_placeholder(segment) {
                    pattern.push_str(r"(\w+)");
                } else {
                    pattern.push('(');
                    pattern.push_str(&regex::escape(segment));
                    pattern.push(')');
                }
                parameters.push(segment.to_string());
            }
            pattern.push('$');
            pattern
        } else {
            format!("^{}$", regex::escape(&requested_path))
        };

        let pattern = RegexBuilder::new(&pattern).case_insensitive(true).build()?;
        Ok(Self { requested_path, real_path: real_path.into(), parameters, pattern, handler: None })
    }

    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn RouteHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn requested_path(&self) -> &str {
        &self.requested_path
    }

    pub fn real_path(&self) -> &str {
        &self.real_path
    }

    /// Placeholder names, without braces, in template order.
    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().filter(|parameter| is_placeholder(parameter)).map(|parameter| strip_braces(parameter))
    }

    pub fn handler(&self) -> Option<&Arc<dyn RouteHandler>> {
        self.handler.as_ref()
    }

    pub(crate) fn set_handler(&mut self, handler: Option<Arc<dyn RouteHandler>>) {
        self.handler = handler;
    }

    /// Matches `path` and returns the bound parameters.
    ///
    /// A group is bound only when its value differs from its template segment, so literal
    /// segments never show up as parameters.
    pub fn match_path(&self, path: &str) -> Option<Vec<(String, String)>> {
        let mut matches = self.pattern.captures_iter(path);
        let captures = matches.next()?;
        if matches.next().is_some() {
            return None;
        }

        let bound = self
            .parameters
            .iter()
            .zip(captures.iter().skip(1))
            .filter_map(|(parameter, group)| {
                let value = group?.as_str();
                (!value.eq_ignore_ascii_case(parameter)).then(|| (strip_braces(parameter).to_string(), value.to_string()))
            })
            .collect();
        Some(bound)
    }

    /// `requested_path + real_path`, the two-segment path a webhook request carries.
    pub fn merged_path(&self) -> String {
        format!("{}{}", self.requested_path, self.real_path)
    }

    fn first_segment(&self) -> Option<&str> {
        self.requested_path.split('/').find(|segment| !segment.is_empty())
    }
}

fn is_placeholder(segment: &str) -> bool {
    segment.starts_with('{') && segment.ends_with('}')
}

fn strip_braces(segment: &str) -> &str {
    segment.trim_start_matches('{').trim_end_matches('}')
}

/// Routes of one application, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a route; a route with the same requested path replaces the earlier one.
    pub fn insert(&mut self, route: Route) {
        match self.routes.iter_mut().find(|existing| existing.requested_path == route.requested_path) {
            Some(existing) => *existing = route,
            None => self.routes.push(route),
        }
    }

    pub fn get(&self, requested_path: &str) -> Option<&Route> {
        self.routes.iter().find(|route| route.requested_path == requested_path)
    }

    pub fn get_mut(&mut self, requested_path: &str) -> Option<&mut Route> {
        self.routes.iter_mut().find(|route| route.requested_path == requested_path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Real path of the first route matching the request path, binding its parameters
    /// into the request. First value wins for parameters already present.
    pub fn match_url(&self, request: &mut Request) -> Option<String> {
        for route in &self.routes {
            if let Some(bound) = route.match_path(request.path()) {
                let params = request.params_mut();
                for (name, value) in bound {
                    params.insert(name, value);
                }
                return Some(route.real_path.clone());
            }
        }
        None
    }

    /// The route a request is relayed to as a webhook.
    ///
    /// Only the first two segments take part: the route's first segment must equal the
    /// request's first, and `requested + real` must equal `/first/second`. Deeper paths
    /// are compared on those two segments alone.
    pub fn webhook(&self, segments: &[String]) -> Option<&Route> {
        let [first, second, ..] = segments else {
            return None;
        };
        let two_segment_path = format!("/{first}/{second}");

        self.routes
            .iter()
            .find(|route| route.first_segment() == Some(first.as_str()) && route.merged_path() == two_segment_path)
    }
}

impl<'a> IntoIterator for &'a RouteTable {
    type Item = &'a Route;
    type IntoIter = std::slice::Iter<'a, Route>;

    fn into_iter(self) -> Self::IntoIter {
        self.routes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tenant_http::codec::RequestDecoder;
    use tenant_http::protocol::Scheme;

    fn request(path: &str) -> Request {
        let raw = format!("GET {path} HTTP/1.1\r\nHost: a.test\r\n\r\n");
        RequestDecoder::new(Scheme::Http).decode(Bytes::from(raw)).request
    }

    fn segments(path: &str) -> Vec<String> {
        path.split('/').filter(|s| !s.is_empty()).map(str::to_string).collect()
    }

    #[test]
    fn placeholder_binds_value() {
        let route = Route::new("/users/{id}", "/user.html").unwrap();

        assert_eq!(route.match_path("/users/42"), Some(vec![("id".to_string(), "42".to_string())]));
        assert_eq!(route.match_path("/users/42/extra"), None);
        assert_eq!(route.match_path("/people/42"), None);
        assert_eq!(route.parameter_names().collect::<Vec<_>>(), vec!["id"]);
    }

    #[test]
    fn literal_segments_match_case_insensitively_and_are_not_bound() {
        let route = Route::new("/Users/{id}/posts/{post}", "/post.html").unwrap();

        let bound = route.match_path("/users/7/POSTS/abc").unwrap();
        assert_eq!(bound, vec![("id".to_string(), "7".to_string()), ("post".to_string(), "abc".to_string())]);
    }

    #[test]
    fn plain_route_needs_whole_path() {
        let route = Route::new("/about", "/about.html").unwrap();

        assert_eq!(route.match_path("/about"), Some(vec![]));
        assert_eq!(route.match_path("/about/team"), None);
        assert_eq!(route.match_path("/x/about"), None);
    }

    #[test]
    fn regex_characters_in_literals_are_escaped() {
        let route = Route::new("/v1.0/{name}", "/v1.html").unwrap();

        assert!(route.match_path("/v1.0/a").is_some());
        assert!(route.match_path("/v100/a").is_none());
    }

    #[test]
    fn table_match_url_binds_into_request() {
        let mut table = RouteTable::new();
        table.insert(Route::new("/about", "/about.html").unwrap());
        table.insert(Route::new("/users/{id}", "/user.html").unwrap());

        let mut req = request("/users/42?id=query");
        assert_eq!(table.match_url(&mut req).as_deref(), Some("/user.html"));
        // query string value was there first
        assert_eq!(req.params().get("id"), Some("query"));

        let mut req = request("/users/42");
        assert_eq!(table.match_url(&mut req).as_deref(), Some("/user.html"));
        assert_eq!(req.params().get("id"), Some("42"));

        let mut req = request("/missing");
        assert_eq!(table.match_url(&mut req), None);
    }

    #[test]
    fn insert_replaces_same_requested_path() {
        let mut table = RouteTable::new();
        table.insert(Route::new("/a", "/one").unwrap());
        table.insert(Route::new("/a", "/two").unwrap());

        assert_eq!(table.len(), 1);
        assert_eq!(table.get("/a").map(Route::real_path), Some("/two"));
    }

    #[test]
    fn webhook_uses_first_two_segments() {
        let mut table = RouteTable::new();
        table.insert(Route::new("/hooks", "/github").unwrap());

        assert_eq!(table.webhook(&segments("/hooks/github")).map(Route::requested_path), Some("/hooks"));
        assert!(table.webhook(&segments("/hooks/github/push")).is_some());
        assert!(table.webhook(&segments("/hooks/gitlab")).is_none());
        assert!(table.webhook(&segments("/hooks")).is_none());
        assert!(table.webhook(&segments("/other/github")).is_none());
    }
}
