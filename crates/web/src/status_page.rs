//! Canned HTML pages for the statuses the server produces itself.
//!
//! A template may contain `<%Name%>` tokens, filled from the page's placeholder map, and
//! an `<%Exception%>` token that receives the diagnostic message.

use std::collections::{BTreeMap, HashMap};
use std::fs;

use http::StatusCode;
use tenant_http::protocol::Request;
use tracing::debug;

use crate::config::StatusPageEntry;
use crate::error::ConfigError;

const EXCEPTION_TOKEN: &str = "<%Exception%>";

const BUILT_IN: &str = "<!DOCTYPE html>\r\n<html><head><title><%Code%> <%Description%></title></head>\
<body><h1><%Code%> <%Description%></h1><p><%Exception%></p></body></html>";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusPage {
    template: String,
    placeholders: BTreeMap<String, String>,
}

impl StatusPage {
    pub fn new(template: impl Into<String>) -> Self {
        Self { template: template.into(), placeholders: BTreeMap::new() }
    }

    #[must_use]
    pub fn placeholder(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.placeholders.insert(name.into(), value.into());
        self
    }

    /// `content` replaces the configured placeholders when given.
    pub fn render(&self, message: &str, content: Option<&BTreeMap<String, String>>) -> String {
        let mut html = self.template.clone();
        for (name, value) in content.unwrap_or(&self.placeholders) {
            html = html.replace(&format!("<%{name}%>"), value);
        }
        html.replace(EXCEPTION_TOKEN, message)
    }
}

/// Status pages keyed by code.
#[derive(Debug, Clone, Default)]
pub struct StatusPages {
    pages: HashMap<u16, StatusPage>,
}

impl StatusPages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, code: u16, page: StatusPage) {
        self.pages.insert(code, page);
    }

    pub fn get(&self, code: u16) -> Option<&StatusPage> {
        self.pages.get(&code)
    }

    pub fn from_entries(entries: &[StatusPageEntry]) -> Result<Self, ConfigError> {
        let mut pages = Self::new();
        for entry in entries {
            let template = fs::read_to_string(&entry.template).map_err(|e| ConfigError::io(&entry.template, e))?;
            pages.insert(entry.code, StatusPage { template, placeholders: entry.placeholders.clone() });
        }
        Ok(pages)
    }

    /// The HTML body for a status.
    pub fn render(&self, status: StatusCode, description: &str, message: &str) -> String {
        if let Some(page) = self.pages.get(&status.as_u16()) {
            return page.render(message, None);
        }

        let content = BTreeMap::from([
            ("Code".to_string(), status.as_u16().to_string()),
            ("Description".to_string(), escape(description)),
        ]);
        StatusPage::new(BUILT_IN).render(&escape(message), Some(&content))
    }

    /// Sets the status on the request's response and replaces its body with the page.
    pub fn respond(&self, request: &mut Request, status: StatusCode, description: &str, message: &str) {
        debug!(status = status.as_u16(), path = request.path(), message, "serving status page");
        let html = self.render(status, description, message);

        let response = request.response_mut();
        response.set_status(status, description);
        response.clear_body();
        response.set_mime(mime::TEXT_HTML_UTF_8);
        response.write_str(&html);
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
