//! Device posture: the FIPS-relevant endpoint state that is not derivable
//! from the tunnel daemon itself (OS FIPS flag, disk encryption, device
//! management, warp client).
//!
//! The [PostureCollector] holds the latest posture per device id under a
//! read-write lock; probes and report ingestion write, section builders and
//! the dashboard read. Its checklist items are the ones the remediation
//! executor resolves into actions.

use crate::checker::report::{ChecklistItem, Section, Severity, Status, VerificationMethod};
use crate::utils::time::now_rfc3339;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::process::Command;
use std::sync::RwLock;

/// Latest observed posture of one device. `None` means the probe could not
/// produce evidence either way.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DevicePosture {
    pub os_fips: Option<bool>,
    pub disk_encrypted: Option<bool>,
    pub mdm_enrolled: Option<bool>,
    pub warp_installed: Option<bool>,
    pub warp_connected: Option<bool>,
    pub collected_at: String,
}

#[derive(Default)]
pub struct PostureCollector {
    devices: RwLock<HashMap<String, DevicePosture>>,
}

impl PostureCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records (or replaces) the posture for a device.
    pub fn record(&self, device_id: &str, posture: DevicePosture) {
        self.devices
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(device_id.to_string(), posture);
    }

    pub fn get(&self, device_id: &str) -> Option<DevicePosture> {
        self.devices
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(device_id)
            .cloned()
    }

    pub fn device_count(&self) -> usize {
        self.devices
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .len()
    }

    /// Builds the posture section for one device. An unknown device yields
    /// all-unknown items rather than an empty section, so the item ids stay
    /// stable across runs.
    pub fn build_section(&self, device_id: &str) -> Section {
        let posture = self.get(device_id).unwrap_or_default();
        Section {
            id: "posture".to_string(),
            name: "Device posture".to_string(),
            description: format!("Endpoint posture of device {device_id}"),
            items: posture_items(&posture),
        }
    }
}

fn posture_items(posture: &DevicePosture) -> Vec<ChecklistItem> {
    let mut items = Vec::with_capacity(4);

    let disk = ChecklistItem::new(
        "posture-disk-encryption",
        "Disk encryption",
        Severity::High,
        VerificationMethod::Direct,
    )
    .with_why("data at rest on an unencrypted volume is outside the FIPS boundary")
    .with_nist_ref("FIPS 140-3 / SC-28");
    items.push(match posture.disk_encrypted {
        Some(true) => disk.with_status(Status::Pass, "system volume is encrypted"),
        Some(false) => disk
            .with_status(Status::Warning, "system volume is not encrypted")
            .with_remediation("enable full-disk encryption (manual)"),
        None => disk.with_status(Status::Unknown, "no disk-encryption evidence collected"),
    });

    let mdm = ChecklistItem::new(
        "posture-mdm",
        "Device management",
        Severity::Medium,
        VerificationMethod::Inherited,
    )
    .with_why("managed devices inherit their posture attestation from the MDM");
    items.push(match posture.mdm_enrolled {
        Some(true) => mdm.with_status(Status::Pass, "device is MDM-enrolled"),
        Some(false) => mdm
            .with_status(Status::Warning, "device is not MDM-enrolled")
            .with_remediation("enroll the device with the MDM provider (manual)"),
        None => mdm.with_status(
            Status::Unknown,
            "no MDM evidence; enrollment state comes from the external identity source",
        ),
    });

    let installed = ChecklistItem::new(
        "posture-warp-installed",
        "Warp client installed",
        Severity::Medium,
        VerificationMethod::Direct,
    )
    .with_why("the warp client carries endpoint traffic over the FIPS tunnel");
    items.push(match posture.warp_installed {
        Some(true) => installed.with_status(Status::Pass, "warp client present"),
        Some(false) => installed
            .with_status(Status::Warning, "warp client not installed")
            .with_remediation("install the warp client"),
        None => installed.with_status(Status::Unknown, "no warp evidence collected"),
    });

    let connected = ChecklistItem::new(
        "posture-warp-connected",
        "Warp client connected",
        Severity::Medium,
        VerificationMethod::Direct,
    )
    .with_why("an installed but disconnected client leaves traffic outside the tunnel");
    items.push(match (posture.warp_installed, posture.warp_connected) {
        (Some(false), _) => connected.with_status(
            Status::Warning,
            "warp client not installed, nothing to connect",
        ),
        (_, Some(true)) => connected.with_status(Status::Pass, "warp client connected"),
        (_, Some(false)) => connected
            .with_status(Status::Warning, "warp client installed but not connected")
            .with_remediation("connect the warp client"),
        (_, None) => connected.with_status(Status::Unknown, "no warp session evidence collected"),
    });

    items
}

/// Gathers the local device's posture. MDM enrollment stays `None` here: it
/// is attested by the external identity source, not probed locally.
pub fn probe_local_posture() -> DevicePosture {
    DevicePosture {
        os_fips: probe_os_fips(),
        disk_encrypted: probe_disk_encryption(),
        mdm_enrolled: None,
        warp_installed: Some(crate::agent::platform::find_on_path("warp-cli").is_some()),
        warp_connected: probe_warp_connected(),
        collected_at: now_rfc3339(),
    }
}

/// Identifier the local posture is recorded under: the hostname when the
/// environment exposes one.
pub fn local_device_id() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "local".to_string())
}

fn probe_os_fips() -> Option<bool> {
    if !cfg!(target_os = "linux") {
        return None;
    }
    std::fs::read_to_string("/proc/sys/crypto/fips_enabled")
        .ok()
        .map(|contents| contents.trim() == "1")
}

/// Root-volume encryption heuristic: a dm-crypt mapping backing `/`.
fn probe_disk_encryption() -> Option<bool> {
    if !cfg!(target_os = "linux") {
        return None;
    }
    let mounts = std::fs::read_to_string("/proc/mounts").ok()?;
    Some(root_is_dm_crypt(&mounts))
}

fn root_is_dm_crypt(mounts: &str) -> bool {
    mounts.lines().any(|line| {
        let mut fields = line.split_whitespace();
        let device = fields.next().unwrap_or_default();
        let mount_point = fields.next().unwrap_or_default();
        mount_point == "/" && device.starts_with("/dev/mapper/")
    })
}

fn probe_warp_connected() -> Option<bool> {
    let output = Command::new("warp-cli").arg("status").output().ok()?;
    if !output.status.success() {
        return Some(false);
    }
    let stdout = String::from_utf8_lossy(&output.stdout).to_lowercase();
    Some(stdout.contains("connected"))
}
