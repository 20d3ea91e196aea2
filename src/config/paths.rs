//! XDG-aware path resolution.
//!
//! Widens the teacher's own `storage::paths::HyperforgePaths` (which only
//! ever checked bare `$HOME`) to honor `XDG_CONFIG_HOME`/`XDG_DATA_HOME` as
//! spec.md §6 requires, with `REMOTE_JUGGLER_CONFIG` taking precedence over
//! both for the config file path specifically.

use std::path::PathBuf;

const APP_DIR: &str = "remote-juggler";

fn xdg_config_home() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
}

fn xdg_data_home() -> Option<PathBuf> {
    std::env::var_os("XDG_DATA_HOME")
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|h| h.join(".local").join("share")))
}

/// `${REMOTE_JUGGLER_CONFIG}` if set, else
/// `${XDG_CONFIG_HOME:-$HOME/.config}/remote-juggler/config.json`.
pub fn config_path() -> crate::error::Result<PathBuf> {
    if let Some(path) = std::env::var_os("REMOTE_JUGGLER_CONFIG") {
        return Ok(PathBuf::from(path));
    }
    xdg_config_home()
        .map(|dir| dir.join(APP_DIR).join("config.json"))
        .ok_or_else(|| crate::error::ConfigError::NoHome.into())
}

/// `${XDG_DATA_HOME:-$HOME/.local/share}/remote-juggler`.
pub fn data_dir() -> crate::error::Result<PathBuf> {
    xdg_data_home()
        .map(|dir| dir.join(APP_DIR))
        .ok_or_else(|| crate::error::ConfigError::NoHome.into())
}

pub fn tpm_sealed_dir() -> crate::error::Result<PathBuf> {
    Ok(data_dir()?.join("tpm-sealed"))
}

pub fn stub_hsm_dir() -> crate::error::Result<PathBuf> {
    Ok(data_dir()?.join("stub-sealed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_honors_explicit_override() {
        std::env::set_var("REMOTE_JUGGLER_CONFIG", "/tmp/rj-test-config.json");
        let path = config_path().unwrap();
        assert_eq!(path, PathBuf::from("/tmp/rj-test-config.json"));
        std::env::remove_var("REMOTE_JUGGLER_CONFIG");
    }
}
