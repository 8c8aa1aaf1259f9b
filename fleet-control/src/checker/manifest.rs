//! Build manifest: the read-only record produced at build time, referenced by
//! the binary-integrity and supply-chain checks.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("reading build manifest {path}: {err}")]
    Read { path: String, err: String },
    #[error("parsing build manifest {path}: {err}")]
    Parse { path: String, err: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildManifest {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub commit: String,
    #[serde(default)]
    pub build_time: String,
    #[serde(default)]
    pub target_platform: String,
    #[serde(default)]
    pub binary_sha256: String,
    #[serde(default)]
    pub sbom_sha256: String,
    #[serde(default)]
    pub fips_certificates: Vec<String>,
    #[serde(default)]
    pub tunnel_upstream_version: String,
    #[serde(default)]
    pub tunnel_upstream_commit: String,
    #[serde(default)]
    pub crypto_engine: String,
    #[serde(default)]
    pub tls_backend_version: String,
}

impl BuildManifest {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let raw = std::fs::read_to_string(path).map_err(|err| ManifestError::Read {
            path: path.to_string_lossy().into(),
            err: err.to_string(),
        })?;
        serde_json::from_str(&raw).map_err(|err| ManifestError::Parse {
            path: path.to_string_lossy().into(),
            err: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn load_manifest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("build-manifest.json");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(
            f,
            r#"{{
  "version": "0.9.2",
  "commit": "abc123",
  "binary_sha256": "deadbeef",
  "fips_certificates": ["4407"]
}}"#
        )
        .unwrap();

        let manifest = BuildManifest::load(&path).unwrap();
        assert_eq!(manifest.version, "0.9.2");
        assert_eq!(manifest.binary_sha256, "deadbeef");
        assert_eq!(manifest.fips_certificates, vec!["4407".to_string()]);
        // Absent fields default to empty
        assert!(manifest.sbom_sha256.is_empty());
    }

    #[test]
    fn missing_manifest_errors() {
        let err = BuildManifest::load(Path::new("/nonexistent/manifest.json")).unwrap_err();
        assert_matches::assert_matches!(err, ManifestError::Read { .. });
    }

    #[test]
    fn invalid_json_errors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "not-json").unwrap();
        let err = BuildManifest::load(&path).unwrap_err();
        assert_matches::assert_matches!(err, ManifestError::Parse { .. });
    }
}
