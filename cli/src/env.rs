//! Environment variables understood by the bridge and its helper.
//!
//! The UI side reads the `TVBRIDGE_*` overrides in [`crate::config`] and
//! exports the helper-facing subset into the backend's environment on
//! spawn. The helper reads the same names back.
//!
//! # Flags
//!
//! Boolean variables accept `1`, `true`, `yes` and `on` (case-insensitive).
//! Anything else, including an unset variable, is `false`.

/// Frame socket path the helper connects to.
pub const FRAME_SOCKET: &str = "TVBRIDGE_FRAME_SOCKET";
/// Enables `debug` lines from the helper.
pub const DEBUG: &str = "TVBRIDGE_DEBUG";
/// Enables HTTP-level `debug` lines from the helper.
pub const HTTP_DEBUG: &str = "TVBRIDGE_HTTP_DEBUG";
/// User agent for network sources.
pub const HTTP_USER_AGENT: &str = "TVBRIDGE_HTTP_USER_AGENT";
/// Referer header for network sources.
pub const HTTP_REFERER: &str = "TVBRIDGE_HTTP_REFERER";
/// Network source timeout in seconds.
pub const HTTP_TIMEOUT: &str = "TVBRIDGE_HTTP_TIMEOUT";

/// Configuration directory override.
pub const CONFIG_DIR: &str = "TVBRIDGE_CONFIG_DIR";
/// Backend selection (`helper` or `player`).
pub const BACKEND: &str = "TVBRIDGE_BACKEND";
/// Explicit helper binary path.
pub const HELPER_PATH: &str = "TVBRIDGE_HELPER_PATH";
/// Explicit player binary path.
pub const PLAYER_PATH: &str = "TVBRIDGE_PLAYER_PATH";
/// Directory for the sockets handed to backends.
pub const RUNTIME_DIR: &str = "TVBRIDGE_RUNTIME_DIR";
/// CLI log file.
pub const LOG_FILE: &str = "TVBRIDGE_LOG_FILE";

/// Test source: comma-separated URL extensions whose `load` fails.
pub const TESTSRC_REJECT: &str = "TVBRIDGE_TESTSRC_REJECT";
/// Test source: milliseconds of simulated buffering after each load.
pub const TESTSRC_BUFFER_MS: &str = "TVBRIDGE_TESTSRC_BUFFER_MS";
/// Test source: media duration in seconds; unset or 0 plays forever.
pub const TESTSRC_DURATION: &str = "TVBRIDGE_TESTSRC_DURATION";

/// Interpret a flag value.
#[must_use]
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Read a boolean flag from the environment.
#[must_use]
pub fn flag(name: &str) -> bool {
    std::env::var(name).map(|v| is_truthy(&v)).unwrap_or(false)
}

/// Read a non-empty string from the environment.
#[must_use]
pub fn non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthy_values() {
        for value in ["1", "true", "TRUE", "Yes", "on", " on "] {
            assert!(is_truthy(value), "{value} should be truthy");
        }
        for value in ["0", "false", "off", "", "2", "enabled"] {
            assert!(!is_truthy(value), "{value} should be falsy");
        }
    }

    #[test]
    fn test_unset_flag_is_false() {
        assert!(!flag("TVBRIDGE_TEST_SURELY_UNSET_FLAG"));
        assert!(non_empty("TVBRIDGE_TEST_SURELY_UNSET_VALUE").is_none());
    }
}
