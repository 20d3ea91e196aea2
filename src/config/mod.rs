//! Process-wide config document: load/save, schema migration, atomic write.
//!
//! Grounded in `storage::token_storage::TokenStorage` (atomic write via
//! temp-file + rename + chmod 0600) and `storage::config::GlobalConfig`
//! (tilde expansion on read, load-returns-defaults-when-absent).

mod migrate;
mod paths;

pub use paths::{config_path, data_dir};

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

pub const CURRENT_SCHEMA_VERSION: u32 = 1;
pub const SCHEMA_URL: &str = "https://remote-juggler.dev/schema/config.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ForgeProvider {
    Gitlab,
    Github,
    Bitbucket,
    Codeberg,
    Azure,
    Custom,
}

impl std::fmt::Display for ForgeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ForgeProvider::Gitlab => "gitlab",
            ForgeProvider::Github => "github",
            ForgeProvider::Bitbucket => "bitbucket",
            ForgeProvider::Codeberg => "codeberg",
            ForgeProvider::Azure => "azure",
            ForgeProvider::Custom => "custom",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum SecurityMode {
    MaximumSecurity,
    DeveloperWorkflow,
    TrustedWorkstation,
}

impl SecurityMode {
    pub fn all() -> &'static [SecurityMode] {
        &[
            SecurityMode::MaximumSecurity,
            SecurityMode::DeveloperWorkflow,
            SecurityMode::TrustedWorkstation,
        ]
    }

    pub fn from_index(i: usize) -> Option<Self> {
        Self::all().get(i).copied()
    }

    /// Accepts both the kebab-case wire form and its short alias
    /// (`"maximum"`, `"developer"`, `"trusted"`).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_lowercase().as_str() {
            "maximum-security" | "maximum" => Some(SecurityMode::MaximumSecurity),
            "developer-workflow" | "developer" => Some(SecurityMode::DeveloperWorkflow),
            "trusted-workstation" | "trusted" => Some(SecurityMode::TrustedWorkstation),
            _ => None,
        }
    }

    pub fn index(self) -> usize {
        Self::all().iter().position(|m| *m == self).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct GpgConfig {
    #[serde(default)]
    pub key_id: String,
    #[serde(default)]
    pub sign_commits: bool,
    #[serde(default)]
    pub sign_tags: bool,
    #[serde(default)]
    pub touch_policy: Option<String>,
    #[serde(default)]
    pub security_mode: Option<SecurityMode>,
}

impl GpgConfig {
    pub fn has_signing(&self) -> bool {
        !self.key_id.is_empty() && self.sign_commits
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Identity {
    pub provider: ForgeProvider,
    /// Logical SSH host alias, e.g. `gh-work`.
    pub host: String,
    /// Real hostname, e.g. `github.com`.
    pub hostname: String,
    pub user: String,
    pub email: String,
    pub ssh_key_path: String,
    #[serde(default)]
    pub credential_source: Option<String>,
    #[serde(default)]
    pub organizations: Vec<String>,
    #[serde(default)]
    pub gpg: GpgConfig,
    /// Optional `ControlPath` directive emitted into the identity's SSH
    /// `Host` stanza (spec.md §4.2), e.g. for connection multiplexing.
    #[serde(default)]
    pub control_path: Option<String>,
}

impl Identity {
    pub fn display_name(&self) -> String {
        if self.email.is_empty() {
            self.user.clone()
        } else {
            format!("{} <{}>", self.user, self.email)
        }
    }

    /// Detects the host-alias naming convention for hardware-key-bound SSH
    /// entries, e.g. `github.com-sk`.
    pub fn is_security_key(&self) -> bool {
        self.host.ends_with("-sk")
    }

    pub fn has_gpg_signing(&self) -> bool {
        self.gpg.has_signing()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Settings {
    #[serde(default)]
    pub default_provider: Option<ForgeProvider>,
    #[serde(default = "default_true")]
    pub auto_detect: bool,
    #[serde(default = "default_true")]
    pub use_keychain: bool,
    #[serde(default)]
    pub gpg_sign: bool,
    #[serde(default)]
    pub gpg_verify_with_provider: bool,
    #[serde(default = "default_true")]
    pub fallback_to_ssh: bool,
    #[serde(default)]
    pub verbose_logging: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_provider: None,
            auto_detect: true,
            use_keychain: true,
            gpg_sign: false,
            gpg_verify_with_provider: false,
            fallback_to_ssh: true,
            verbose_logging: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct State {
    #[serde(default)]
    pub current_identity: String,
    #[serde(default)]
    pub last_switch: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_detected_repo: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Config {
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default = "current_version_string")]
    pub version: String,
    #[serde(default)]
    pub identities: HashMap<String, Identity>,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub state: State,
    /// Catch-all for fields written by a newer schema version than this
    /// binary understands, so round-tripping never loses data.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

fn current_version_string() -> String {
    "1.0.0".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema: Some(SCHEMA_URL.to_string()),
            version: current_version_string(),
            identities: HashMap::new(),
            settings: Settings::default(),
            state: State::default(),
            extra: HashMap::new(),
        }
    }
}

impl Config {
    /// Sorted, de-duplicated identity names.
    pub fn identity_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.identities.keys().cloned().collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn active_identity(&self) -> Option<&Identity> {
        if self.state.current_identity.is_empty() {
            None
        } else {
            self.identities.get(&self.state.current_identity)
        }
    }

    pub fn validate_identity_name(name: &str) -> Result<()> {
        let ok = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            && !name.starts_with('-')
            && !name.ends_with('-');
        if ok {
            Ok(())
        } else {
            Err(crate::error::IdentityError::MalformedName(name.to_string()).into())
        }
    }
}

/// Loads the config from `path`. Returns populated defaults (without
/// writing) if the file is absent. Tilde-prefixed `ssh_key_path` values are
/// expanded against the current user's home on load.
pub async fn load(path: &Path) -> Result<Config> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Config::default()),
        Err(e) => return Err(ConfigError::Io(e).into()),
    };

    let mut value: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|source| ConfigError::Malformed { path: path.to_path_buf(), source })?;

    let found_version = value
        .get("schemaVersion")
        .or_else(|| value.get("schema_version"))
        .and_then(serde_json::Value::as_u64)
        .unwrap_or(1) as u32;

    if found_version > CURRENT_SCHEMA_VERSION {
        return Err(ConfigError::SchemaTooNew {
            found: found_version,
            supported: CURRENT_SCHEMA_VERSION,
        }
        .into());
    }
    if found_version < CURRENT_SCHEMA_VERSION {
        value = migrate::migrate(value, found_version);
    }

    let mut config: Config = serde_json::from_value(value)
        .map_err(|source| ConfigError::Malformed { path: path.to_path_buf(), source })?;

    for identity in config.identities.values_mut() {
        identity.ssh_key_path = expand_tilde(&identity.ssh_key_path);
    }

    Ok(config)
}

/// Persists the full document via atomic write: write to a sibling `.tmp`
/// file, chmod 0600 on unix, then rename into place.
pub async fn save(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(ConfigError::Io)?;
    }

    let body = serde_json::to_string_pretty(config)
        .expect("Config serialization is infallible for well-formed documents");

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, body.as_bytes()).await.map_err(ConfigError::Io)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms).await.map_err(ConfigError::Io)?;
    }

    tokio::fs::rename(&tmp_path, path).await.map_err(ConfigError::Io)?;
    Ok(())
}

pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest).to_string_lossy().into_owned();
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_identity() -> Identity {
        Identity {
            provider: ForgeProvider::Github,
            host: "gh-work".to_string(),
            hostname: "github.com".to_string(),
            user: "Jane Dev".to_string(),
            email: "jane@example.com".to_string(),
            ssh_key_path: "/home/jane/.ssh/id_work".to_string(),
            credential_source: None,
            organizations: vec!["acme".to_string()],
            gpg: GpgConfig::default(),
            control_path: None,
        }
    }

    #[tokio::test]
    async fn load_missing_file_returns_defaults_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = load(&path).await.unwrap();
        assert!(config.identities.is_empty());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.identities.insert("work".to_string(), sample_identity());
        config.state.current_identity = "work".to_string();

        save(&path, &config).await.unwrap();
        let loaded = load(&path).await.unwrap();

        assert_eq!(loaded.identities.len(), 1);
        assert_eq!(loaded.state.current_identity, "work");
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn malformed_file_is_rejected_and_left_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();

        let result = load(&path).await;
        assert!(result.is_err());

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents, "{ not json");
    }

    #[test]
    fn identity_name_validation() {
        assert!(Config::validate_identity_name("work-gh").is_ok());
        assert!(Config::validate_identity_name("").is_err());
        assert!(Config::validate_identity_name("Work").is_err());
        assert!(Config::validate_identity_name("-work").is_err());
    }

    #[test]
    fn tilde_expansion() {
        let expanded = expand_tilde("~/.ssh/id_rsa");
        assert!(!expanded.starts_with('~'));
    }
}
