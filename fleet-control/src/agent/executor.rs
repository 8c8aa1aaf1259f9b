//! Remediation executor: resolves action ids into concrete, per-OS action
//! records and runs them. The core is OS-neutral; execution bodies live
//! behind [PlatformActions].

use crate::agent::platform::{ActionOutcome, PlatformActions};
use crate::checker::report::{Section, Status};
use crate::fleet::types::{
    ActionStatus, RemediationActionResult, RemediationRequest, RemediationResult,
};
use chrono::Utc;
use tracing::{debug, info};

/// A resolved action record: whether it may run unattended on this host, and
/// the operator instructions when it may not.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub id: String,
    pub auto: bool,
    pub description: String,
    pub instructions: String,
}

/// Checklist items that map onto remediation actions: the tunnel section's
/// OS-mode item and the posture section's device items.
const ITEM_ACTION_MAP: &[(&str, &str)] = &[
    ("t-2", "enable_os_fips"),
    ("posture-disk-encryption", "enable_disk_encryption"),
    ("posture-mdm", "enroll_mdm"),
    ("posture-warp-installed", "install_warp"),
    ("posture-warp-connected", "connect_warp"),
];

pub struct Executor<P: PlatformActions> {
    platform: P,
}

impl<P: PlatformActions> Executor<P> {
    pub fn new(platform: P) -> Self {
        Self { platform }
    }

    /// Resolves the action catalog against the current host, ordering actions
    /// whose related checklist items currently fail or warn first.
    pub fn plan(&self, sections: &[Section]) -> Vec<Action> {
        let mut actions = catalog();
        let needs_attention: Vec<&str> = sections
            .iter()
            .flat_map(|section| section.items.iter())
            .filter(|item| matches!(item.status, Status::Fail | Status::Warning))
            .filter_map(|item| {
                ITEM_ACTION_MAP
                    .iter()
                    .find(|(item_id, _)| *item_id == item.id)
                    .map(|(_, action_id)| *action_id)
            })
            .collect();
        actions.sort_by_key(|action| !needs_attention.contains(&action.id.as_str()));
        actions
    }

    /// Runs the requested actions against the plan. Unknown ids are skipped,
    /// manual-only actions report their instructions without shelling out,
    /// dry runs stop short of execution.
    pub fn execute(&self, request: &RemediationRequest, plan: &[Action]) -> RemediationResult {
        let mut results = Vec::with_capacity(request.actions.len());
        for action_id in &request.actions {
            let Some(action) = plan.iter().find(|a| &a.id == action_id) else {
                results.push(RemediationActionResult {
                    id: action_id.clone(),
                    status: ActionStatus::Skipped,
                    output: format!("unknown action id {action_id:?}"),
                });
                continue;
            };
            if !action.auto {
                results.push(RemediationActionResult {
                    id: action.id.clone(),
                    status: ActionStatus::ManualOnly,
                    output: action.instructions.clone(),
                });
                continue;
            }
            if request.dry_run {
                results.push(RemediationActionResult {
                    id: action.id.clone(),
                    status: ActionStatus::Pending,
                    output: format!("would execute: {}", action.description),
                });
                continue;
            }
            debug!(action = %action.id, status = "executing", "running remediation action");
            let outcome = self.dispatch(&action.id);
            info!(action = %action.id, status = ?outcome.status, "remediation action finished");
            results.push(RemediationActionResult {
                id: action.id.clone(),
                status: outcome.status,
                output: outcome.output,
            });
        }
        RemediationResult {
            request_id: request.id.clone(),
            node_id: request.node_id.clone(),
            dry_run: request.dry_run,
            completed_at: Utc::now(),
            actions: results,
        }
    }

    fn dispatch(&self, action_id: &str) -> ActionOutcome {
        match action_id {
            "enable_os_fips" => self.platform.enable_os_fips(),
            "install_warp" => self.platform.install_warp(),
            "connect_warp" => self.platform.connect_warp(),
            other => ActionOutcome::failed(format!("no execution body for {other:?}")),
        }
    }
}

/// True when any auto-executed action failed; drives the remediation CLI exit
/// code.
pub fn any_auto_failure(result: &RemediationResult) -> bool {
    result
        .actions
        .iter()
        .any(|a| a.status == ActionStatus::Failed)
}

fn catalog() -> Vec<Action> {
    vec![
        enable_os_fips_action(),
        Action {
            id: "install_warp".to_string(),
            auto: true,
            description: "install the warp client".to_string(),
            instructions: String::new(),
        },
        Action {
            id: "connect_warp".to_string(),
            auto: true,
            description: "connect the warp client (warp-cli connect)".to_string(),
            instructions: String::new(),
        },
        Action {
            id: "enable_disk_encryption".to_string(),
            auto: false,
            description: "enable full-disk encryption".to_string(),
            instructions: disk_encryption_instructions().to_string(),
        },
        Action {
            id: "enroll_mdm".to_string(),
            auto: false,
            description: "enroll the device in device management".to_string(),
            instructions: "enroll this device with your MDM provider; posture reporting \
                           requires a managed identity"
                .to_string(),
        },
    ]
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        fn enable_os_fips_action() -> Action {
            let tool = ["fips-mode-setup", "ua", "pro"]
                .iter()
                .find(|tool| crate::agent::platform::find_on_path(tool).is_some())
                .copied()
                .unwrap_or("fips-mode-setup");
            Action {
                id: "enable_os_fips".to_string(),
                auto: true,
                description: format!("enable OS FIPS mode ({tool})"),
                instructions: String::new(),
            }
        }
    } else if #[cfg(target_os = "macos")] {
        fn enable_os_fips_action() -> Action {
            Action {
                id: "enable_os_fips".to_string(),
                auto: false,
                description: "enable OS FIPS mode".to_string(),
                instructions: "not applicable: macOS has no system-wide FIPS switch; the \
                               validated corecrypto module is always in use"
                    .to_string(),
            }
        }
    } else {
        fn enable_os_fips_action() -> Action {
            Action {
                id: "enable_os_fips".to_string(),
                auto: false,
                description: "enable OS FIPS mode".to_string(),
                instructions: "OS FIPS mode must be enabled via Group Policy \
                               (System Cryptography: Use FIPS compliant algorithms)"
                    .to_string(),
            }
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "macos")] {
        fn disk_encryption_instructions() -> &'static str {
            "enable FileVault in System Settings > Privacy & Security"
        }
    } else if #[cfg(target_os = "windows")] {
        fn disk_encryption_instructions() -> &'static str {
            "enable BitLocker on the system volume"
        }
    } else {
        fn disk_encryption_instructions() -> &'static str {
            "encrypt the system volume with LUKS; this requires reinstalling or \
             migrating the root filesystem"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::platform::tests::MockPlatform;
    use crate::checker::report::{ChecklistItem, Severity, VerificationMethod};

    fn empty_section() -> Section {
        Section {
            id: "tunnel".to_string(),
            name: "Tunnel".to_string(),
            description: String::new(),
            items: Vec::new(),
        }
    }

    fn request(actions: &[&str], dry_run: bool) -> RemediationRequest {
        RemediationRequest {
            id: "r1".to_string(),
            node_id: "N1".to_string(),
            actions: actions.iter().map(|s| s.to_string()).collect(),
            dry_run,
        }
    }

    #[test]
    fn dry_run_reports_pending_and_manual_only() {
        let executor = Executor::new(MockPlatform::new());
        let plan = executor.plan(&[empty_section()]);

        let result = executor.execute(
            &request(&["enable_os_fips", "enable_disk_encryption"], true),
            &plan,
        );
        assert_eq!(result.actions.len(), 2);
        assert!(result.dry_run);

        let os_fips = &result.actions[0];
        if cfg!(target_os = "linux") {
            assert_eq!(os_fips.status, ActionStatus::Pending);
            assert!(os_fips.output.contains("would execute"));
        } else {
            // Non-Linux hosts resolve the action as manual-only
            assert_eq!(os_fips.status, ActionStatus::ManualOnly);
        }

        let disk = &result.actions[1];
        assert_eq!(disk.status, ActionStatus::ManualOnly);
        assert!(!disk.output.is_empty());
    }

    #[test]
    fn unknown_action_is_skipped() {
        let executor = Executor::new(MockPlatform::new());
        let plan = executor.plan(&[empty_section()]);

        let result = executor.execute(&request(&["defrag_hamster"], false), &plan);
        assert_eq!(result.actions[0].status, ActionStatus::Skipped);
        assert!(result.actions[0].output.contains("unknown action"));
    }

    #[test]
    fn auto_action_outcome_is_translated() {
        let mut platform = MockPlatform::new();
        platform.expect_connect_warp().times(1).returning(|| ActionOutcome {
            status: ActionStatus::Success,
            output: "connected".to_string(),
        });
        let executor = Executor::new(platform);
        let plan = executor.plan(&[empty_section()]);

        let result = executor.execute(&request(&["connect_warp"], false), &plan);
        assert_eq!(result.actions[0].status, ActionStatus::Success);
        assert_eq!(result.actions[0].output, "connected");
        assert!(!any_auto_failure(&result));
    }

    #[test]
    fn failed_auto_action_sets_exit_signal() {
        let mut platform = MockPlatform::new();
        platform
            .expect_install_warp()
            .times(1)
            .returning(|| ActionOutcome::failed("package manager exploded"));
        let executor = Executor::new(platform);
        let plan = executor.plan(&[empty_section()]);

        let result = executor.execute(&request(&["install_warp"], false), &plan);
        assert_eq!(result.actions[0].status, ActionStatus::Failed);
        assert!(result.actions[0].output.contains("exploded"));
        assert!(any_auto_failure(&result));
    }

    #[test]
    fn manual_actions_never_shell_out() {
        // The mock has no expectations: any platform call would panic
        let executor = Executor::new(MockPlatform::new());
        let plan = executor.plan(&[empty_section()]);

        let result = executor.execute(&request(&["enroll_mdm"], false), &plan);
        assert_eq!(result.actions[0].status, ActionStatus::ManualOnly);
    }

    #[test]
    fn plan_orders_failing_items_first() {
        let executor = Executor::new(MockPlatform::new());
        let mut section = empty_section();
        section.items.push(
            ChecklistItem::new("t-2", "OS FIPS mode", Severity::Medium, VerificationMethod::Direct)
                .with_status(Status::Warning, "disabled"),
        );
        let plan = executor.plan(&[section]);
        assert_eq!(plan[0].id, "enable_os_fips");
        assert_eq!(plan.len(), 5);
    }

    #[test]
    fn plan_prioritizes_degraded_posture_items() {
        use crate::checker::posture::{DevicePosture, PostureCollector};

        let collector = PostureCollector::new();
        collector.record(
            "laptop-1",
            DevicePosture {
                disk_encrypted: Some(false),
                warp_installed: Some(true),
                warp_connected: Some(false),
                ..Default::default()
            },
        );
        let sections = vec![empty_section(), collector.build_section("laptop-1")];

        let executor = Executor::new(MockPlatform::new());
        let plan = executor.plan(&sections);
        let flagged: Vec<&str> = plan.iter().take(2).map(|a| a.id.as_str()).collect();
        assert!(flagged.contains(&"enable_disk_encryption"));
        assert!(flagged.contains(&"connect_warp"));
        assert_eq!(plan.len(), 5);
    }
}
