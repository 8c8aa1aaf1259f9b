//! Constants recorded at build time, consumed by the supply-chain checks and
//! the backend registry. The `BUILD_*` values are injected by the release
//! pipeline; local builds fall back to the defaults.

pub const CRATE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// VCS revision recorded by the release pipeline, if any.
pub const GIT_COMMIT: Option<&str> = option_env!("BUILD_GIT_COMMIT");

/// Set to "1" when the release pipeline built with path trimming
/// (`--remap-path-prefix`), the reproducible-build marker.
pub const TRIMMED_PATHS: Option<&str> = option_env!("BUILD_TRIMPATH");

/// Version tag of the TLS crypto backend the binary was built against.
pub const TLS_BACKEND_VERSION: &str = match option_env!("BUILD_TLS_BACKEND_VERSION") {
    Some(v) => v,
    None => "0.17.14",
};
