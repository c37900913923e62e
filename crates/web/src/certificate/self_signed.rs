use std::time::Duration;

use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, KeyPair, KeyUsagePurpose,
};
use time::OffsetDateTime;

use crate::certificate::StoredCertificate;
use crate::error::CertificateError;

/// Lifetime of certificates synthesized for names missing from the store.
pub const SELF_SIGNED_VALIDITY: Duration = Duration::from_secs(30 * 60);

/// Generates a certificate for `name` (as CN and SAN) valid from now for `valid_for`.
pub fn self_signed(name: &str, valid_for: Duration) -> Result<StoredCertificate, CertificateError> {
    let error = |source| CertificateError::SelfSigned { name: name.to_string(), source };

    let mut params = CertificateParams::new(vec![name.to_string()]).map_err(error)?;

    let mut distinguished_name = DistinguishedName::new();
    distinguished_name.push(DnType::CommonName, name);
    params.distinguished_name = distinguished_name;

    let now = OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + valid_for;
    params.key_usages = vec![KeyUsagePurpose::DigitalSignature, KeyUsagePurpose::KeyEncipherment];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth, ExtendedKeyUsagePurpose::ClientAuth];

    let key_pair = KeyPair::generate().map_err(error)?;
    let certificate = params.self_signed(&key_pair).map_err(error)?;

    Ok(StoredCertificate {
        names: vec![name.to_ascii_lowercase()],
        cert_pem: certificate.pem(),
        key_pem: key_pair.serialize_pem(),
    })
}
