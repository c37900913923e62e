//! Certificates and SNI resolution.
//!
//! Each application owns a [`CertificateSet`] built from the names in
//! `SSL.CertificateNames`. Names are looked up in a [`CertificateStore`]; a name the
//! store doesn't know gets a short-lived self-signed certificate, which is saved back so
//! later loads reuse it.

mod self_signed;
mod store;

use std::collections::HashMap;
use std::fmt;
use std::io::BufReader;
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::sign::CertifiedKey;
use tracing::{info, warn};

pub use self_signed::SELF_SIGNED_VALIDITY;
pub use self_signed::self_signed;
pub use store::CertificateStore;
pub use store::MemoryCertificateStore;
pub use store::PemDirectoryStore;
pub use store::StoredCertificate;

use crate::error::CertificateError;

/// A certificate ready to hand to rustls.
#[derive(Clone)]
pub struct Certificate {
    names: Vec<String>,
    key: Arc<CertifiedKey>,
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate").field("names", &self.names).finish_non_exhaustive()
    }
}

impl Certificate {
    pub fn from_stored(stored: &StoredCertificate) -> Result<Self, CertificateError> {
        let name = stored.subject().unwrap_or_default();

        let chain = rustls_pemfile::certs(&mut BufReader::new(stored.cert_pem.as_bytes()))
            .collect::<Result<Vec<CertificateDer<'static>>, _>>()
            .map_err(|e| CertificateError::store(name, e))?;
        if chain.is_empty() {
            return Err(CertificateError::pem(name, "certificate"));
        }

        let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut BufReader::new(stored.key_pem.as_bytes()))
            .map_err(|e| CertificateError::store(name, e))?
            .ok_or_else(|| CertificateError::pem(name, "private key"))?;

        let signing_key = rustls::crypto::ring::sign::any_supported_type(&key)
            .map_err(|source| CertificateError::UnsupportedKey { name: name.to_string(), source })?;

        Ok(Self { names: stored.names.clone(), key: Arc::new(CertifiedKey::new(chain, signing_key)) })
    }

    /// Subject name first, then alternative names.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn certified_key(&self) -> Arc<CertifiedKey> {
        Arc::clone(&self.key)
    }
}

/// Normalizes a subject or SNI name: lower case, without a `cn=` prefix.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_ascii_lowercase().replace("cn=", "")
}

/// Candidate names for `name`: itself, then each parent domain with the leading label
/// removed, down to the last label.
pub fn apex_candidates(name: &str) -> impl Iterator<Item = &str> {
    std::iter::successors(Some(name), |current| current.split_once('.').map(|(_, rest)| rest))
        .filter(|candidate| !candidate.is_empty())
}

/// The ordered certificates of one application, indexed by name.
#[derive(Debug, Clone, Default)]
pub struct CertificateSet {
    certificates: Vec<Certificate>,
    mapping: HashMap<String, usize>,
}

impl CertificateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every name from `store`, synthesizing and saving a self-signed certificate for
    /// names the store doesn't have.
    pub fn load<S>(names: &[String], store: &S, valid_for: Duration) -> Result<Self, CertificateError>
    where
        S: CertificateStore + ?Sized,
    {
        let mut set = Self::new();
        for name in names {
            let stored = match store.find(name)? {
                Some(stored) => stored,
                None => {
                    let stored = self_signed(name, valid_for)?;
                    info!(name = %name, valid_secs = valid_for.as_secs(), "synthesized self-signed certificate");
                    if let Err(e) = store.save(name, &stored) {
                        warn!(name = %name, cause = %e, "can't save synthesized certificate");
                    }
                    stored
                }
            };
            set.add(Certificate::from_stored(&stored)?);
        }
        Ok(set)
    }

    /// Appends a certificate. The subject always maps to it; an alternative name maps
    /// only if no earlier certificate claimed it. A certificate with an already known
    /// subject is ignored.
    pub fn add(&mut self, certificate: Certificate) {
        let Some(subject) = certificate.names.first().map(|name| normalize_name(name)) else {
            return;
        };
        if self.mapping.get(&subject).is_some_and(|&index| self.certificates[index].names.first() == certificate.names.first()) {
            return;
        }

        let index = self.certificates.len();
        self.mapping.insert(subject, index);
        for name in certificate.names.iter().skip(1) {
            self.mapping.entry(normalize_name(name)).or_insert(index);
        }
        self.certificates.push(certificate);
    }

    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Certificate> {
        self.certificates.iter()
    }

    /// Exact name first, then parent domains: `a.b.example.com` falls back to
    /// `b.example.com`, then `example.com`.
    pub fn resolve(&self, sni: &str) -> Option<&Certificate> {
        let sni = normalize_name(sni);
        apex_candidates(&sni).find_map(|candidate| self.mapping.get(candidate)).map(|&index| &self.certificates[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn certificate(names: &[&str]) -> Certificate {
        let stored = self_signed(names[0], SELF_SIGNED_VALIDITY).unwrap();
        let mut certificate = Certificate::from_stored(&stored).unwrap();
        certificate.names = names.iter().map(ToString::to_string).collect();
        certificate
    }

    #[test]
    fn apex_candidates_walk_to_last_label() {
        let candidates: Vec<_> = apex_candidates("a.b.example.com").collect();
        assert_eq!(candidates, vec!["a.b.example.com", "b.example.com", "example.com", "com"]);
    }

    #[test]
    fn normalize_strips_common_name_prefix() {
        assert_eq!(normalize_name("CN=Example.com"), "example.com");
        assert_eq!(normalize_name(" api.test "), "api.test");
    }

    #[test]
    fn resolve_exact_then_parent_domains() {
        let mut set = CertificateSet::new();
        set.add(certificate(&["example.com", "www.example.com"]));
        set.add(certificate(&["other.test", "www.example.com"]));

        assert_eq!(set.len(), 2);
        assert_eq!(set.resolve("example.com").unwrap().names()[0], "example.com");
        // alternative names keep their first owner
        assert_eq!(set.resolve("WWW.example.com").unwrap().names()[0], "example.com");
        assert_eq!(set.resolve("a.b.example.com").unwrap().names()[0], "example.com");
        assert_eq!(set.resolve("x.other.test").unwrap().names()[0], "other.test");
        assert!(set.resolve("unknown.org").is_none());
    }

    #[test]
    fn duplicate_subject_is_ignored() {
        let mut set = CertificateSet::new();
        set.add(certificate(&["example.com"]));
        set.add(certificate(&["example.com"]));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn load_synthesizes_and_saves_missing_names() {
        let store = MemoryCertificateStore::new();
        let names = vec!["a.test".to_string(), "b.test".to_string()];

        let set = CertificateSet::load(&names, &store, SELF_SIGNED_VALIDITY).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(store.len(), 2);

        let saved = store.find("a.test").unwrap().unwrap();
        assert!(saved.cert_pem.contains("BEGIN CERTIFICATE"));
        assert!(saved.key_pem.contains("PRIVATE KEY"));

        // second load reuses the stored certificate
        let again = CertificateSet::load(&names, &store, SELF_SIGNED_VALIDITY).unwrap();
        assert_eq!(again.len(), 2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn broken_pem_is_rejected() {
        let stored = StoredCertificate {
            names: vec!["bad.test".to_string()],
            cert_pem: "not a pem".to_string(),
            key_pem: String::new(),
        };
        assert!(matches!(Certificate::from_stored(&stored), Err(CertificateError::Pem { .. })));
    }
}
