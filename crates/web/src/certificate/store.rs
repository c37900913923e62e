use std::fmt::Debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use tracing::debug;

use crate::error::CertificateError;

/// A certificate chain and private key in PEM form, with the host names it is valid for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCertificate {
    /// Subject name first, then alternative names.
    pub names: Vec<String>,
    pub cert_pem: String,
    pub key_pem: String,
}

impl StoredCertificate {
    pub fn subject(&self) -> Option<&str> {
        self.names.first().map(String::as_str)
    }
}

/// Where applications look up the certificates named in `SSL.CertificateNames`.
pub trait CertificateStore: Send + Sync + Debug {
    fn find(&self, name: &str) -> Result<Option<StoredCertificate>, CertificateError>;

    fn save(&self, name: &str, certificate: &StoredCertificate) -> Result<(), CertificateError>;
}

#[derive(Debug, Default)]
pub struct MemoryCertificateStore {
    certificates: DashMap<String, StoredCertificate>,
}

impl MemoryCertificateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }
}

impl CertificateStore for MemoryCertificateStore {
    fn find(&self, name: &str) -> Result<Option<StoredCertificate>, CertificateError> {
        Ok(self.certificates.get(&name.to_ascii_lowercase()).map(|entry| entry.value().clone()))
    }

    fn save(&self, name: &str, certificate: &StoredCertificate) -> Result<(), CertificateError> {
        self.certificates.insert(name.to_ascii_lowercase(), certificate.clone());
        Ok(())
    }
}

/// Certificates kept as `<dir>/<name>.crt` and `<dir>/<name>.key`.
///
/// The lookup name doubles as the certificate's only host name; the files are not
/// inspected for further alternative names.
#[derive(Debug, Clone)]
pub struct PemDirectoryStore {
    dir: PathBuf,
}

impl PemDirectoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn paths(&self, name: &str) -> (PathBuf, PathBuf) {
        let stem = name.to_ascii_lowercase().replace('*', "_");
        (self.dir.join(format!("{stem}.crt")), self.dir.join(format!("{stem}.key")))
    }
}

impl CertificateStore for PemDirectoryStore {
    fn find(&self, name: &str) -> Result<Option<StoredCertificate>, CertificateError> {
        let (cert_path, key_path) = self.paths(name);

        let cert_pem = match fs::read_to_string(&cert_path) {
            Ok(pem) => pem,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %cert_path.display(), "certificate not in store");
                return Ok(None);
            }
            Err(e) => return Err(CertificateError::store(name, e)),
        };
        let key_pem = fs::read_to_string(&key_path).map_err(|e| CertificateError::store(name, e))?;

        Ok(Some(StoredCertificate { names: vec![name.to_ascii_lowercase()], cert_pem, key_pem }))
    }

    fn save(&self, name: &str, certificate: &StoredCertificate) -> Result<(), CertificateError> {
        let (cert_path, key_path) = self.paths(name);
        fs::create_dir_all(&self.dir).map_err(|e| CertificateError::store(name, e))?;
        fs::write(cert_path, &certificate.cert_pem).map_err(|e| CertificateError::store(name, e))?;
        fs::write(key_path, &certificate.key_pem).map_err(|e| CertificateError::store(name, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(name: &str) -> StoredCertificate {
        StoredCertificate { names: vec![name.to_string()], cert_pem: "CERT".to_string(), key_pem: "KEY".to_string() }
    }

    #[test]
    fn memory_store_is_case_insensitive() {
        let store = MemoryCertificateStore::new();
        assert!(store.find("example.com").unwrap().is_none());

        store.save("Example.COM", &stored("example.com")).unwrap();
        assert_eq!(store.find("example.com").unwrap(), Some(stored("example.com")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn directory_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = PemDirectoryStore::new(dir.path().join("certs"));

        assert!(store.find("example.com").unwrap().is_none());

        store.save("example.com", &stored("example.com")).unwrap();
        assert!(dir.path().join("certs/example.com.crt").exists());
        assert!(dir.path().join("certs/example.com.key").exists());

        let found = store.find("EXAMPLE.com").unwrap().unwrap();
        assert_eq!(found.subject(), Some("example.com"));
        assert_eq!(found.cert_pem, "CERT");
        assert_eq!(found.key_pem, "KEY");
    }

    #[test]
    fn directory_store_needs_key_next_to_certificate() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.test.crt"), "CERT").unwrap();

        let store = PemDirectoryStore::new(dir.path());
        assert!(matches!(store.find("a.test"), Err(CertificateError::Store { .. })));
    }
}
