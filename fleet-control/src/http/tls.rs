//! rustls plumbing: crypto-provider install, FIPS-restricted server and
//! client configurations, and PEM loading helpers.

use crate::selftest::ciphers::{is_approved_curve, is_fips_approved};
use rustls::crypto::CryptoProvider;
use rustls::server::ResolvesServerCert;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use rustls_native_certs::load_native_certs;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

#[derive(thiserror::Error, Debug)]
pub enum TlsConfigBuildingError {
    #[error("error building tls config: `{0}`")]
    BuildingError(String),
    #[error("IO error: `{0}`")]
    IoError(String),
}

/// Install the default rustls crypto provider, this needs to be executed early in the process, check
/// <https://docs.rs/rustls/latest/rustls/crypto/struct.CryptoProvider.html#method.install_default> for details.
pub fn install_rustls_default_crypto_provider() {
    fips_restricted_provider().install_default().unwrap_or_else(|_| {
        warn!("rustls default crypto provider was already installed for this process, this has no effect")
    })
}

/// Builds a crypto provider restricted to the FIPS-approved suites and curves:
/// the ring provider with ChaCha20-Poly1305 and non-approved key-exchange
/// groups removed.
pub fn fips_restricted_provider() -> CryptoProvider {
    let mut provider = rustls::crypto::ring::default_provider();
    provider
        .cipher_suites
        .retain(|suite| is_fips_approved(suite.suite()));
    provider
        .kx_groups
        .retain(|group| is_approved_curve(group.name()));
    provider
}

pub fn root_store_with_native_certs() -> Result<RootCertStore, TlsConfigBuildingError> {
    let mut root_store = rustls::RootCertStore::empty();
    load_native_certs().certs.iter().try_for_each(|cert| {
        root_store.add(cert.to_owned()).map_err(|e| {
            TlsConfigBuildingError::BuildingError(format!("cannot add system certificates: {}", e))
        })
    })?;
    Ok(root_store)
}

/// Builds the gateway's server configuration: FIPS-restricted provider,
/// TLS 1.2+1.3 only, certificates served through the provided resolver so the
/// ClientHello hook observes every handshake.
pub fn build_fips_server_config(
    cert_resolver: Arc<dyn ResolvesServerCert>,
) -> Result<ServerConfig, TlsConfigBuildingError> {
    let config = ServerConfig::builder_with_provider(Arc::new(fips_restricted_provider()))
        .with_protocol_versions(&[&rustls::version::TLS12, &rustls::version::TLS13])
        .map_err(|e| TlsConfigBuildingError::BuildingError(e.to_string()))?
        .with_no_client_auth()
        .with_cert_resolver(cert_resolver);
    Ok(config)
}

/// Builds a FIPS-restricted client configuration with the system trust store.
/// `insecure_skip_verify` disables certificate verification and must only be
/// used against development upstreams.
pub fn build_fips_client_config(
    insecure_skip_verify: bool,
) -> Result<ClientConfig, TlsConfigBuildingError> {
    let provider = Arc::new(fips_restricted_provider());
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(&[&rustls::version::TLS12, &rustls::version::TLS13])
        .map_err(|e| TlsConfigBuildingError::BuildingError(e.to_string()))?;

    let config = if insecure_skip_verify {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(danger::NoVerification::new(provider)))
            .with_no_client_auth()
    } else {
        builder
            .with_root_certificates(root_store_with_native_certs()?)
            .with_no_client_auth()
    };
    Ok(config)
}

/// Reads all certificates bundled in a PEM file.
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsConfigBuildingError> {
    let mut reader = std::io::BufReader::new(std::fs::File::open(path).map_err(|e| {
        TlsConfigBuildingError::IoError(format!(
            "cannot read certificate {}: {}",
            path.to_string_lossy(),
            e
        ))
    })?);
    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| {
            TlsConfigBuildingError::BuildingError(format!(
                "invalid certificate {}: {}",
                path.to_string_lossy(),
                e
            ))
        })
}

/// Reads the first private key found in a PEM file.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsConfigBuildingError> {
    let mut reader = std::io::BufReader::new(std::fs::File::open(path).map_err(|e| {
        TlsConfigBuildingError::IoError(format!(
            "cannot read private key {}: {}",
            path.to_string_lossy(),
            e
        ))
    })?);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| {
            TlsConfigBuildingError::BuildingError(format!(
                "invalid private key {}: {}",
                path.to_string_lossy(),
                e
            ))
        })?
        .ok_or_else(|| {
            TlsConfigBuildingError::BuildingError(format!(
                "no private key found in {}",
                path.to_string_lossy()
            ))
        })
}

mod danger {
    use rustls::DigitallySignedStruct;
    use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
    use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
    use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
    use std::sync::Arc;

    /// Accepts any server certificate. Signatures are still verified with the
    /// FIPS-restricted provider so the handshake itself stays constrained.
    #[derive(Debug)]
    pub(super) struct NoVerification {
        provider: Arc<CryptoProvider>,
    }

    impl NoVerification {
        pub(super) fn new(provider: Arc<CryptoProvider>) -> Self {
            Self { provider }
        }
    }

    impl ServerCertVerifier for NoVerification {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> Result<ServerCertVerified, rustls::Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            verify_tls12_signature(
                message,
                cert,
                dss,
                &self.provider.signature_verification_algorithms,
            )
        }

        fn verify_tls13_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            verify_tls13_signature(
                message,
                cert,
                dss,
                &self.provider.signature_verification_algorithms,
            )
        }

        fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
            self.provider
                .signature_verification_algorithms
                .supported_schemes()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selftest::ciphers::suite_name;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn restricted_provider_has_no_chacha20() {
        let provider = fips_restricted_provider();
        assert!(!provider.cipher_suites.is_empty());
        for suite in &provider.cipher_suites {
            let name = suite_name(suite.suite());
            assert!(
                !name.contains("CHACHA20"),
                "unexpected suite in restricted provider: {name}"
            );
        }
    }

    #[test]
    fn restricted_provider_curves_are_nist_only() {
        let provider = fips_restricted_provider();
        assert!(!provider.kx_groups.is_empty());
        for group in &provider.kx_groups {
            assert!(is_approved_curve(group.name()), "{:?}", group.name());
        }
    }

    #[test]
    fn client_config_builds_with_and_without_verification() {
        assert!(build_fips_client_config(true).is_ok());
        // With verification it loads the native trust store; that may be empty
        // in minimal containers but must not error out with certs present.
        let _ = build_fips_client_config(false);
    }

    #[test]
    fn load_certs_and_key_roundtrip() {
        let rcgen::CertifiedKey { cert, signing_key } =
            rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();

        let dir = tempdir().unwrap();
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("key.pem");
        let mut f = std::fs::File::create(&cert_path).unwrap();
        writeln!(f, "{}", cert.pem()).unwrap();
        let mut f = std::fs::File::create(&key_path).unwrap();
        writeln!(f, "{}", signing_key.serialize_pem()).unwrap();

        let certs = load_certs(&cert_path).unwrap();
        assert_eq!(certs.len(), 1);
        load_private_key(&key_path).unwrap();
    }

    #[test]
    fn load_certs_missing_file_errors() {
        let err = load_certs(Path::new("non-existing.pem")).unwrap_err();
        assert_matches::assert_matches!(err, TlsConfigBuildingError::IoError(_));
    }
}
