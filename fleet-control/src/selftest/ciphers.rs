//! Authoritative FIPS-approved cipher-suite enumeration.
//!
//! Shared by the self-test engine, the compliance checker's cipher audits and
//! the gateway's ClientHello classifier. RC4, DES, 3DES, NULL, EXPORT and
//! anonymous suites are never approved; ChaCha20-Poly1305 is excluded because
//! it is not a FIPS-approved algorithm, in TLS 1.2 or 1.3.

use rustls::{CipherSuite, NamedGroup};

/// FIPS-approved TLS 1.2 suites (NIST SP 800-52r2 §3.3.1).
pub const FIPS_APPROVED_TLS12: &[CipherSuite] = &[
    CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
    CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
    CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
    CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
    CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA256,
    CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA256,
    CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256,
    CipherSuite::TLS_RSA_WITH_AES_256_GCM_SHA384,
];

/// FIPS-approved TLS 1.3 suites. ChaCha20-Poly1305 is only ever negotiated
/// when a client refuses AES-GCM; compliant clients always offer AES-GCM.
pub const FIPS_APPROVED_TLS13: &[CipherSuite] = &[
    CipherSuite::TLS13_AES_128_GCM_SHA256,
    CipherSuite::TLS13_AES_256_GCM_SHA384,
];

/// Key-exchange curves approved for FIPS deployments.
pub const FIPS_APPROVED_CURVES: &[NamedGroup] = &[NamedGroup::secp256r1, NamedGroup::secp384r1];

pub fn is_fips_approved(suite: CipherSuite) -> bool {
    FIPS_APPROVED_TLS12.contains(&suite) || FIPS_APPROVED_TLS13.contains(&suite)
}

pub fn is_approved_curve(group: NamedGroup) -> bool {
    FIPS_APPROVED_CURVES.contains(&group)
}

/// Classifies a ClientHello cipher offer: a client is FIPS-capable when it
/// offers at least one approved suite. An empty offer is non-FIPS.
pub fn is_fips_capable(offered: &[CipherSuite]) -> bool {
    offered.iter().any(|suite| is_fips_approved(*suite))
}

/// Human-readable suite name for reports and client records.
pub fn suite_name(suite: CipherSuite) -> String {
    format!("{suite:?}")
}
