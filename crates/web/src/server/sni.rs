use std::sync::Arc;

use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use tracing::debug;

use super::Shared;

/// Picks the certificate of the application serving the SNI name of each handshake.
#[derive(Debug)]
pub(crate) struct SniResolver {
    shared: Arc<Shared>,
}

impl SniResolver {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }
}

impl ResolvesServerCert for SniResolver {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        let Some(name) = client_hello.server_name() else {
            debug!("tls handshake without sni, no certificate");
            return None;
        };

        let key = self.shared.certificate_for(name);
        if key.is_none() {
            debug!(sni = name, "no certificate for sni name");
        }
        key
    }
}
