//! Per-platform remediation bodies. The executor core stays OS-neutral and
//! talks to this trait; the host implementation shells out on Linux and
//! reports the platform limitation elsewhere.

use crate::fleet::types::ActionStatus;
use std::path::PathBuf;
use std::process::Command;

/// Outcome of one executed platform action. `output` carries the combined
/// stdout+stderr of whatever ran.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub status: ActionStatus,
    pub output: String,
}

impl ActionOutcome {
    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            status: ActionStatus::Failed,
            output: output.into(),
        }
    }
}

pub trait PlatformActions {
    /// Enables OS-level FIPS mode. Only auto-executable on Linux.
    fn enable_os_fips(&self) -> ActionOutcome;
    fn install_warp(&self) -> ActionOutcome;
    fn connect_warp(&self) -> ActionOutcome;
}

/// The real host: Linux shells out to whichever enablement tool is on PATH.
#[derive(Default)]
pub struct HostPlatform;

/// Enablement tools probed in order on Linux.
#[cfg(target_os = "linux")]
const LINUX_FIPS_TOOLS: &[(&str, &[&str])] = &[
    ("fips-mode-setup", &["--enable"]),
    ("ua", &["enable", "fips"]),
    ("pro", &["enable", "fips"]),
];

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        fn enable_os_fips_impl() -> ActionOutcome {
            let Some((tool, args)) = LINUX_FIPS_TOOLS
                .iter()
                .find(|(tool, _)| find_on_path(tool).is_some())
            else {
                return ActionOutcome::failed(
                    "no FIPS enablement tool found on PATH (fips-mode-setup, ua, pro)",
                );
            };
            match run_capturing(tool, args) {
                // Kernel FIPS mode takes effect after a reboot
                Ok((true, output)) => ActionOutcome {
                    status: ActionStatus::NeedsReboot,
                    output,
                },
                Ok((false, output)) => ActionOutcome::failed(output),
                Err(err) => ActionOutcome::failed(err),
            }
        }
    } else {
        fn enable_os_fips_impl() -> ActionOutcome {
            ActionOutcome::failed(format!("not applicable on {}", std::env::consts::OS))
        }
    }
}

impl PlatformActions for HostPlatform {
    fn enable_os_fips(&self) -> ActionOutcome {
        enable_os_fips_impl()
    }

    fn install_warp(&self) -> ActionOutcome {
        if find_on_path("warp-cli").is_some() {
            return ActionOutcome {
                status: ActionStatus::Success,
                output: "warp client already installed".to_string(),
            };
        }
        let installers: &[(&str, &[&str])] = &[
            ("apt-get", &["install", "-y", "cloudflare-warp"]),
            ("dnf", &["install", "-y", "cloudflare-warp"]),
            ("brew", &["install", "cloudflare-warp"]),
        ];
        let Some((tool, args)) = installers
            .iter()
            .find(|(tool, _)| find_on_path(tool).is_some())
        else {
            return ActionOutcome::failed("no supported package manager found to install warp");
        };
        match run_capturing(tool, args) {
            Ok((true, output)) => ActionOutcome {
                status: ActionStatus::Success,
                output,
            },
            Ok((false, output)) => ActionOutcome::failed(output),
            Err(err) => ActionOutcome::failed(err),
        }
    }

    fn connect_warp(&self) -> ActionOutcome {
        match run_capturing("warp-cli", &["connect"]) {
            Ok((true, output)) => ActionOutcome {
                status: ActionStatus::Success,
                output,
            },
            Ok((false, output)) => ActionOutcome::failed(output),
            Err(err) => ActionOutcome::failed(err),
        }
    }
}

/// Runs a command and captures combined stdout+stderr regardless of outcome.
fn run_capturing(tool: &str, args: &[&str]) -> Result<(bool, String), String> {
    let output = Command::new(tool)
        .args(args)
        .output()
        .map_err(|e| format!("could not run {tool}: {e}"))?;
    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok((output.status.success(), combined))
}

pub(crate) fn find_on_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use mockall::mock;

    mock! {
        pub Platform {}
        impl PlatformActions for Platform {
            fn enable_os_fips(&self) -> ActionOutcome;
            fn install_warp(&self) -> ActionOutcome;
            fn connect_warp(&self) -> ActionOutcome;
        }
    }

    #[test]
    fn find_on_path_locates_common_binaries() {
        // `sh` exists on every unix test host
        if cfg!(unix) {
            assert!(find_on_path("sh").is_some());
        }
        assert!(find_on_path("definitely-not-a-binary-zzz").is_none());
    }

    #[test]
    fn run_capturing_combines_streams() {
        if !cfg!(unix) {
            return;
        }
        let (ok, output) =
            run_capturing("sh", &["-c", "echo to-stdout; echo to-stderr 1>&2"]).unwrap();
        assert!(ok);
        assert!(output.contains("to-stdout"));
        assert!(output.contains("to-stderr"));

        let (ok, _) = run_capturing("sh", &["-c", "exit 3"]).unwrap();
        assert!(!ok);
    }

    #[test]
    fn missing_tool_is_an_error_not_a_panic() {
        let err = run_capturing("definitely-not-a-binary-zzz", &[]).unwrap_err();
        assert!(err.contains("could not run"));
    }
}
