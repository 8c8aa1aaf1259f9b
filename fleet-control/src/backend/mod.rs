//! FIPS backend registry.
//!
//! Identifies which validated cryptographic module is active at runtime and
//! exposes its certificate identity and standard. The variants form a closed
//! set with a uniform capability surface; detection is a linear scan returning
//! the first variant whose probe reports active, and each probe only inspects
//! its own module's evidence.

mod migration;

pub use migration::{MigrationStatus, MigrationUrgency, migration_status};

use crate::build_info;
use crate::selftest::ciphers::is_fips_approved;
use rustls::crypto::CryptoProvider;
use semver::Version;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable probed by the native-FIPS backend, expected to carry a
/// `fips140=on` or `fips140=only` entry.
pub const CRYPTO_DEBUG_ENV: &str = "CRYPTO_DEBUG";

/// Validation status of the native-FIPS module. Flip to `true` and set the
/// certificate id below when the CMVP certificate lands; a single edit
/// promotes every report from "pending" to "certified".
pub const NATIVE_FIPS_VALIDATED: bool = false;
pub const NATIVE_FIPS_CERTIFICATE_ID: &str = "pending (module under CMVP review)";

/// CMVP certificate of the BoringCrypto-derived primitives the restricted
/// provider is built on.
const BORING_CMVP_CERTIFICATE: &str = "4407";

/// Toolchain versions at or above this threshold carry the 140-3 validated
/// module; older ones carry the 140-2 one.
const BORING_140_3_TOOLCHAIN_THRESHOLD: &str = "0.17.12";

/// An upper bound on the size of a FIPS-restricted cipher-suite registry.
/// An unrestricted provider registers more suites than this.
const RESTRICTED_SUITE_COUNT_BOUND: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FipsStandard {
    #[serde(rename = "FIPS 140-2")]
    Fips140_2,
    #[serde(rename = "FIPS 140-3")]
    Fips140_3,
}

impl std::fmt::Display for FipsStandard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FipsStandard::Fips140_2 => write!(f, "FIPS 140-2"),
            FipsStandard::Fips140_3 => write!(f, "FIPS 140-3"),
        }
    }
}

#[derive(Debug, Error)]
pub enum BackendSelfTestError {
    #[error("cipher-suite registry is not restricted: {0}")]
    UnrestrictedRegistry(String),
    #[error("{CRYPTO_DEBUG_ENV} no longer requests FIPS mode")]
    NativeModeDropped,
}

/// The closed set of detectable FIPS backends. "None" is represented by
/// [detect] returning `Option::None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FipsBackend {
    /// BoringCrypto-derived module, detected through the runtime TLS
    /// cipher-suite registry restriction.
    BoringCrypto,
    /// Native FIPS mode requested through the crypto debug environment.
    NativeFips,
    /// OS-provided validated module; requires a dedicated toolchain build.
    SystemCrypto,
}

const ALL_BACKENDS: &[FipsBackend] = &[
    FipsBackend::BoringCrypto,
    FipsBackend::NativeFips,
    FipsBackend::SystemCrypto,
];

/// Wire-format record describing the detected backend (or the absence of one).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendInfo {
    pub name: String,
    pub display_name: String,
    pub cmvp_certificate: String,
    pub fips_standard: String,
    pub validated: bool,
    pub active: bool,
}

impl FipsBackend {
    pub fn name(&self) -> &'static str {
        match self {
            FipsBackend::BoringCrypto => "boringcrypto",
            FipsBackend::NativeFips => "native-fips",
            FipsBackend::SystemCrypto => "system-crypto",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            FipsBackend::BoringCrypto => "BoringCrypto-derived TLS provider",
            FipsBackend::NativeFips => "Native FIPS 140-3 mode",
            FipsBackend::SystemCrypto => "Platform system crypto",
        }
    }

    pub fn cmvp_certificate(&self) -> &'static str {
        match self {
            FipsBackend::BoringCrypto => BORING_CMVP_CERTIFICATE,
            FipsBackend::NativeFips => NATIVE_FIPS_CERTIFICATE_ID,
            FipsBackend::SystemCrypto => "platform-provided",
        }
    }

    pub fn fips_standard(&self) -> FipsStandard {
        match self {
            FipsBackend::BoringCrypto => boring_standard_for_toolchain(build_info::TLS_BACKEND_VERSION),
            FipsBackend::NativeFips => FipsStandard::Fips140_3,
            FipsBackend::SystemCrypto => FipsStandard::Fips140_3,
        }
    }

    pub fn validated(&self) -> bool {
        match self {
            FipsBackend::BoringCrypto => true,
            FipsBackend::NativeFips => NATIVE_FIPS_VALIDATED,
            FipsBackend::SystemCrypto => true,
        }
    }

    /// Whether this module is the one in use. Each probe relies only on its
    /// own module's evidence.
    pub fn active(&self) -> bool {
        match self {
            FipsBackend::BoringCrypto => boring_provider_active(),
            FipsBackend::NativeFips => native_fips_requested(std::env::var(CRYPTO_DEBUG_ENV).ok()),
            FipsBackend::SystemCrypto => cfg!(feature = "system-crypto"),
        }
    }

    /// Backend-specific self-test, re-asserting the evidence the probe is
    /// based on.
    pub fn self_test(&self) -> Result<(), BackendSelfTestError> {
        match self {
            FipsBackend::BoringCrypto => {
                let Some(provider) = CryptoProvider::get_default() else {
                    return Err(BackendSelfTestError::UnrestrictedRegistry(
                        "no process-default crypto provider installed".to_string(),
                    ));
                };
                for suite in &provider.cipher_suites {
                    if !is_fips_approved(suite.suite()) {
                        return Err(BackendSelfTestError::UnrestrictedRegistry(format!(
                            "non-approved suite registered: {:?}",
                            suite.suite()
                        )));
                    }
                }
                Ok(())
            }
            FipsBackend::NativeFips => {
                if native_fips_requested(std::env::var(CRYPTO_DEBUG_ENV).ok()) {
                    Ok(())
                } else {
                    Err(BackendSelfTestError::NativeModeDropped)
                }
            }
            FipsBackend::SystemCrypto => Ok(()),
        }
    }

    pub fn info(&self) -> BackendInfo {
        BackendInfo {
            name: self.name().to_string(),
            display_name: self.display_name().to_string(),
            cmvp_certificate: self.cmvp_certificate().to_string(),
            fips_standard: self.fips_standard().to_string(),
            validated: self.validated(),
            active: self.active(),
        }
    }
}

/// Returns the active backend, if any. At most one is active at runtime; the
/// scan returns the first match.
pub fn detect() -> Option<FipsBackend> {
    ALL_BACKENDS.iter().copied().find(|b| b.active())
}

/// Always returns a record; `active` is false and the identity fields name the
/// absence when no backend is detected.
pub fn detect_info() -> BackendInfo {
    match detect() {
        Some(backend) => backend.info(),
        None => BackendInfo {
            name: "none".to_string(),
            display_name: "No FIPS backend".to_string(),
            cmvp_certificate: String::new(),
            fips_standard: String::new(),
            validated: false,
            active: false,
        },
    }
}

/// The BoringCrypto-style probe: the module is in use when the process-default
/// cipher-suite registry is restricted (every suite approved, no ChaCha20
/// family, bounded count).
fn boring_provider_active() -> bool {
    let Some(provider) = CryptoProvider::get_default() else {
        return false;
    };
    let suites = &provider.cipher_suites;
    !suites.is_empty()
        && suites.len() <= RESTRICTED_SUITE_COUNT_BOUND
        && suites.iter().all(|s| is_fips_approved(s.suite()))
}

fn boring_standard_for_toolchain(toolchain: &str) -> FipsStandard {
    let threshold = Version::parse(BORING_140_3_TOOLCHAIN_THRESHOLD)
        .expect("threshold is a valid semver literal");
    match Version::parse(toolchain) {
        Ok(v) if v >= threshold => FipsStandard::Fips140_3,
        _ => FipsStandard::Fips140_2,
    }
}

fn native_fips_requested(raw: Option<String>) -> bool {
    let Some(raw) = raw else {
        return false;
    };
    raw.split(',')
        .filter_map(|entry| entry.trim().split_once('='))
        .any(|(name, value)| name == "fips140" && matches!(value, "on" | "only"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_fips_env_parsing() {
        assert!(native_fips_requested(Some("fips140=on".to_string())));
        assert!(native_fips_requested(Some("fips140=only".to_string())));
        assert!(native_fips_requested(Some(
            "gctrace=1,fips140=on".to_string()
        )));
        assert!(!native_fips_requested(Some("fips140=off".to_string())));
        assert!(!native_fips_requested(Some("fips141=on".to_string())));
        assert!(!native_fips_requested(Some(String::new())));
        assert!(!native_fips_requested(None));
    }

    #[test]
    fn toolchain_threshold_selects_standard() {
        assert_eq!(
            boring_standard_for_toolchain("0.17.14"),
            FipsStandard::Fips140_3
        );
        assert_eq!(
            boring_standard_for_toolchain("0.17.12"),
            FipsStandard::Fips140_3
        );
        assert_eq!(
            boring_standard_for_toolchain("0.17.11"),
            FipsStandard::Fips140_2
        );
        // Unparseable toolchain tags claim the conservative standard
        assert_eq!(
            boring_standard_for_toolchain("unknown"),
            FipsStandard::Fips140_2
        );
    }

    #[test]
    fn system_crypto_inactive_in_stock_build() {
        assert!(!FipsBackend::SystemCrypto.active());
    }

    #[test]
    fn detect_info_always_returns_record() {
        let info = detect_info();
        // Whatever the environment, the record is well-formed
        assert!(!info.name.is_empty());
    }

    #[test]
    fn backend_identity_surface() {
        let backend = FipsBackend::BoringCrypto;
        assert_eq!(backend.name(), "boringcrypto");
        assert_eq!(backend.cmvp_certificate(), BORING_CMVP_CERTIFICATE);
        assert!(backend.validated());

        let native = FipsBackend::NativeFips;
        assert_eq!(native.validated(), NATIVE_FIPS_VALIDATED);
        assert_eq!(native.fips_standard(), FipsStandard::Fips140_3);
    }

    #[test]
    fn info_serializes_standard_as_display_string() {
        let info = FipsBackend::NativeFips.info();
        assert_eq!(info.fips_standard, "FIPS 140-3");
    }
}
