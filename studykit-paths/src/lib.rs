//! XDG Base Directory paths for studykit.
//!
//! The CLI keeps study configuration, the file-backed preference store and the
//! ping log under XDG paths so simulated runs survive across invocations the
//! same way a real profile does.

use std::path::PathBuf;

const APP_DIR: &str = "studykit";

/// Get the studykit config directory.
///
/// Returns `$XDG_CONFIG_HOME/studykit` if set, otherwise `~/.config/studykit`.
/// The user-level `config.toml` lives here.
///
/// # Examples
///
/// ```
/// use studykit_paths::config_dir;
///
/// let config = config_dir();
/// let file = config.join("config.toml");
/// ```
pub fn config_dir() -> PathBuf {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config).join(APP_DIR)
    } else if let Some(home) = dirs::home_dir() {
        home.join(".config").join(APP_DIR)
    } else {
        PathBuf::from(".config").join(APP_DIR)
    }
}

/// Get the studykit data directory.
///
/// Returns `$XDG_DATA_HOME/studykit` if set, otherwise `~/.local/share/studykit`.
/// Persisted preferences and the ping log are stored here.
pub fn data_dir() -> PathBuf {
    if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
        PathBuf::from(xdg_data).join(APP_DIR)
    } else if let Some(home) = dirs::home_dir() {
        home.join(".local/share").join(APP_DIR)
    } else {
        PathBuf::from(".local/share").join(APP_DIR)
    }
}

/// Default location of the file-backed preference store.
pub fn prefs_file() -> PathBuf {
    data_dir().join("prefs.toml")
}

/// Default location of the persisted ping log.
pub fn ping_log_file() -> PathBuf {
    data_dir().join("pings.jsonl")
}
