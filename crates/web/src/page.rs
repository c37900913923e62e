//! Page handlers: code attached to a page name.
//!
//! Pages are registered on the application builder, or discovered in the application
//! root as a code file (extension listed in `CODE.DotNetCodeExtention`) next to a page
//! file with the same stem (extension listed in `CODE.DotNetResoucesExtention`). Turning
//! a discovered pair into a handler is the job of an injected [`PageCompiler`].

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tenant_http::protocol::Request;
use tracing::{debug, warn};

/// Code invoked for a page request. The handler writes into the request's response; an
/// `Err` carries the script error text shown on the 500 page.
#[async_trait]
pub trait PageHandler: Send + Sync {
    async fn invoke(&self, request: &mut Request, allow_recompile: bool) -> Result<(), String>;
}

/// A page file with its code file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSource {
    /// Stem plus page extension, e.g. `index.aspx`; matched against the last path segment.
    pub key: String,
    pub page_path: PathBuf,
    pub code_path: PathBuf,
}

pub trait PageCompiler: Send + Sync {
    fn compile(&self, source: &PageSource) -> Result<Arc<dyn PageHandler>, String>;
}

/// Page handlers keyed by page name.
#[derive(Clone, Default)]
pub struct PageTable {
    pages: HashMap<String, Arc<dyn PageHandler>>,
}

impl fmt::Debug for PageTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.pages.keys()).finish()
    }
}

impl PageTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, handler: Arc<dyn PageHandler>) {
        self.pages.insert(key.into(), handler);
    }

    pub fn get(&self, key: &str) -> Option<&Arc<dyn PageHandler>> {
        self.pages.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.pages.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Compiles every discovered source; failures are logged and skipped.
    pub fn compile_all(&mut self, sources: &[PageSource], compiler: &dyn PageCompiler) {
        for source in sources {
            match compiler.compile(source) {
                Ok(handler) => self.insert(source.key.clone(), handler),
                Err(e) => warn!(page = %source.key, cause = %e, "page failed to compile"),
            }
        }
    }
}

/// Walks `root` for code files with a sibling page file.
pub fn discover(root: &Path, code_extensions: &[String], page_extensions: &[String]) -> Vec<PageSource> {
    let mut sources = Vec::new();
    if code_extensions.is_empty() || page_extensions.is_empty() {
        return sources;
    }
    visit(root, code_extensions, page_extensions, &mut sources);
    sources.sort_by(|a, b| a.code_path.cmp(&b.code_path));
    sources
}

fn visit(dir: &Path, code_extensions: &[String], page_extensions: &[String], sources: &mut Vec<PageSource>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %dir.display(), cause = %e, "can't read directory");
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            visit(&path, code_extensions, page_extensions, sources);
            continue;
        }

        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let Some(dot) = name.rfind('.') else {
            continue;
        };
        if !code_extensions.iter().any(|extension| extension == &name[dot..]) {
            continue;
        }

        let stem = name.split('.').next().unwrap_or(name);
        let found = page_extensions.iter().map(|extension| format!("{stem}{extension}")).find(|page| dir.join(page).is_file());
        if let Some(key) = found {
            sources.push(PageSource { page_path: dir.join(&key), key, code_path: path });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl PageHandler for Echo {
        async fn invoke(&self, request: &mut Request, _allow_recompile: bool) -> Result<(), String> {
            request.response_mut().write_str("echo");
            Ok(())
        }
    }

    struct Compiler;

    impl PageCompiler for Compiler {
        fn compile(&self, source: &PageSource) -> Result<Arc<dyn PageHandler>, String> {
            if source.key.starts_with("broken") { Err("syntax error".to_string()) } else { Ok(Arc::new(Echo)) }
        }
    }

    fn exts(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn discover_pairs_code_with_pages() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("admin")).unwrap();
        fs::write(root.join("index.aspx"), "").unwrap();
        fs::write(root.join("index.aspx.cs"), "").unwrap();
        fs::write(root.join("admin/users.aspx"), "").unwrap();
        fs::write(root.join("admin/users.cs"), "").unwrap();
        fs::write(root.join("orphan.cs"), "").unwrap();
        fs::write(root.join("style.css"), "").unwrap();

        let sources = discover(root, &exts(&[".cs"]), &exts(&[".aspx"]));
        let keys: Vec<_> = sources.iter().map(|source| source.key.as_str()).collect();

        assert_eq!(keys, vec!["users.aspx", "index.aspx"]);
        assert_eq!(sources[0].page_path, root.join("admin/users.aspx"));
        assert_eq!(sources[1].code_path, root.join("index.aspx.cs"));
    }

    #[test]
    fn discover_without_extensions_finds_nothing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.cs"), "").unwrap();
        assert!(discover(dir.path(), &[], &exts(&[".aspx"])).is_empty());
    }

    #[test]
    fn compile_all_skips_failures() {
        let sources = vec![
            PageSource { key: "index.aspx".into(), page_path: "index.aspx".into(), code_path: "index.cs".into() },
            PageSource { key: "broken.aspx".into(), page_path: "broken.aspx".into(), code_path: "broken.cs".into() },
        ];

        let mut table = PageTable::new();
        table.compile_all(&sources, &Compiler);

        assert_eq!(table.len(), 1);
        assert!(table.contains("index.aspx"));
        assert!(!table.contains("broken.aspx"));
    }
}
