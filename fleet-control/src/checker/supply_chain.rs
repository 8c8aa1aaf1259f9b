//! Build supply-chain checks: manifest, SBOM, reproducibility markers,
//! artifact signature, certificate inventory and the 140-2 sunset clock.

use crate::backend::{MigrationUrgency, migration_status};
use crate::build_info;
use crate::checker::manifest::BuildManifest;
use crate::checker::report::{ChecklistItem, Section, Severity, Status, VerificationMethod};
use std::path::{Path, PathBuf};

/// Conventional SBOM file names looked up next to the manifest and the
/// executable.
const SBOM_FILE_NAMES: &[&str] = &["sbom.spdx.json", "sbom.json"];

const SIGNATURE_EXTENSIONS: &[&str] = &["sig", "asc"];

pub struct BuildSupplyChainChecks {
    manifest_path: PathBuf,
}

impl BuildSupplyChainChecks {
    pub fn new(manifest_path: PathBuf) -> Self {
        Self { manifest_path }
    }

    pub fn build_section(&self) -> Section {
        let manifest = BuildManifest::load(&self.manifest_path).ok();
        let exe = std::env::current_exe().ok();
        let items = vec![
            manifest_presence_item(manifest.as_ref(), &self.manifest_path),
            sbom_presence_item(&self.manifest_path, exe.as_deref()),
            reproducible_build_item(build_info::TRIMMED_PATHS, build_info::GIT_COMMIT),
            artifact_signature_item(exe.as_deref()),
            certificate_list_item(manifest.as_ref()),
            upstream_version_item(manifest.as_ref()),
            sunset_item(),
        ];
        Section {
            id: "supply-chain".to_string(),
            name: "Build supply chain".to_string(),
            description: "Provenance and validation lifecycle of the running build".to_string(),
            items,
        }
    }
}

fn manifest_presence_item(manifest: Option<&BuildManifest>, path: &Path) -> ChecklistItem {
    let item = ChecklistItem::new(
        "b-1",
        "Build manifest",
        Severity::High,
        VerificationMethod::Direct,
    )
    .with_why("the manifest anchors every other supply-chain verification");
    match manifest {
        Some(m) => item.with_status(
            Status::Pass,
            format!("manifest present, version {} commit {}", m.version, m.commit),
        ),
        None => item
            .with_status(Status::Fail, format!("no build manifest at {}", path.display()))
            .with_remediation("ship the build-manifest.json produced by the release pipeline"),
    }
}

fn sbom_presence_item(manifest_path: &Path, exe: Option<&Path>) -> ChecklistItem {
    let item = ChecklistItem::new(
        "b-2",
        "SBOM",
        Severity::Medium,
        VerificationMethod::Direct,
    )
    .with_why("a software bill of materials is required for federal supply-chain review")
    .with_nist_ref("EO 14028 / NIST SSDF");
    let mut candidates = Vec::new();
    if let Some(dir) = manifest_path.parent() {
        candidates.extend(SBOM_FILE_NAMES.iter().map(|n| dir.join(n)));
    }
    if let Some(dir) = exe.and_then(Path::parent) {
        candidates.extend(SBOM_FILE_NAMES.iter().map(|n| dir.join(n)));
    }
    match candidates.iter().find(|p| p.exists()) {
        Some(found) => item.with_status(Status::Pass, format!("SBOM at {}", found.display())),
        None => item
            .with_status(Status::Warning, "no SBOM found at the conventional paths")
            .with_remediation("publish the SBOM alongside the binary"),
    }
}

fn reproducible_build_item(trimmed: Option<&str>, commit: Option<&str>) -> ChecklistItem {
    let item = ChecklistItem::new(
        "b-3",
        "Reproducible build",
        Severity::Low,
        VerificationMethod::Direct,
    )
    .with_why("trimmed paths and a pinned revision let third parties rebuild the artifact");
    match (trimmed, commit) {
        (Some("1"), Some(commit)) => item.with_status(
            Status::Pass,
            format!("built with trimmed paths from revision {commit}"),
        ),
        (_, Some(commit)) => item.with_status(
            Status::Warning,
            format!("revision {commit} recorded but paths were not trimmed"),
        ),
        _ => item.with_status(
            Status::Warning,
            "no reproducibility markers recorded in this build",
        ),
    }
}

fn artifact_signature_item(exe: Option<&Path>) -> ChecklistItem {
    let item = ChecklistItem::new(
        "b-4",
        "Artifact signature",
        Severity::Medium,
        VerificationMethod::Direct,
    )
    .with_why("a detached signature proves the artifact came from the release pipeline");
    let Some(exe) = exe else {
        return item.with_status(Status::Unknown, "running executable path unavailable");
    };
    match SIGNATURE_EXTENSIONS
        .iter()
        .map(|ext| exe.with_extension(ext))
        .find(|p| p.exists())
    {
        Some(sig) => item.with_status(Status::Pass, format!("signature at {}", sig.display())),
        None => item
            .with_status(Status::Warning, "no detached signature next to the executable")
            .with_remediation("distribute the .sig produced at release time"),
    }
}

fn certificate_list_item(manifest: Option<&BuildManifest>) -> ChecklistItem {
    let item = ChecklistItem::new(
        "b-5",
        "FIPS certificates listed",
        Severity::Medium,
        VerificationMethod::Inherited,
    )
    .with_why("the manifest must name the CMVP certificates the build inherits");
    match manifest {
        None => item.with_status(Status::Unknown, "no build manifest available"),
        Some(m) if m.fips_certificates.is_empty() => item
            .with_status(Status::Warning, "manifest lists no CMVP certificates")
            .with_remediation("record the module certificate numbers in the manifest"),
        Some(m) => item.with_status(
            Status::Pass,
            format!("CMVP certificates: {}", m.fips_certificates.join(", ")),
        ),
    }
}

fn upstream_version_item(manifest: Option<&BuildManifest>) -> ChecklistItem {
    let item = ChecklistItem::new(
        "b-6",
        "Upstream version",
        Severity::Low,
        VerificationMethod::Inherited,
    )
    .with_why("tracking the upstream tunnel release ties the build to its patch level");
    match manifest {
        None => item.with_status(Status::Unknown, "no build manifest available"),
        Some(m) if m.tunnel_upstream_version.is_empty() => {
            item.with_status(Status::Warning, "manifest records no upstream version")
        }
        Some(m) => item.with_status(
            Status::Pass,
            format!(
                "upstream {} ({})",
                m.tunnel_upstream_version, m.tunnel_upstream_commit
            ),
        ),
    }
}

fn sunset_item() -> ChecklistItem {
    let item = ChecklistItem::new(
        "b-7",
        "FIPS 140-2 sunset",
        Severity::High,
        VerificationMethod::Direct,
    )
    .with_why("140-2 certificates move to the historical list on 2026-09-21")
    .with_nist_ref("CMVP transition notice");
    let status = migration_status();
    if status.migration_urgency == MigrationUrgency::None {
        return item.with_status(Status::Pass, status.recommended_action);
    }
    if status.days_until_sunset <= 0 && status.migration_required {
        return item
            .with_status(Status::Fail, status.recommended_action)
            .with_remediation("migrate to a FIPS 140-3 validated module");
    }
    item.with_status(Status::Warning, status.recommended_action)
        .with_remediation("plan the migration to a FIPS 140-3 validated module")
}
