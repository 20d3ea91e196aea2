//! Top-level orchestrator (spec.md §4.9): list, detect, switch, status,
//! validate, store-token, seal-pin, clear-pin, sync-config.
//!
//! Grounded in `commands::status::status()`'s orchestration shape
//! (config-exists check → repo check → config load → per-forge comparison
//! → human-readable report) for `status`'s disagreement-as-recommendation
//! philosophy, and in `bridge::git_remote::GitRemoteBridge`'s direct `git`
//! subprocess calls for `switch`'s remote-rewrite and gitconfig-write steps.

mod results;
mod validate;

pub use results::*;
pub use validate::ValidateOutcome;

use std::path::{Path, PathBuf};
use tokio::process::Command;

use crate::config::{self, Config, Identity};
use crate::credential::{broker, sources, OsCredentialStore, Token};
use crate::error::{IdentityError, RemoteError, Result};
use crate::gpg::GpgCoordinator;
use crate::hsm::HsmContext;
use crate::remote_url::RemoteUrl;
use crate::{gitconfig_editor, ssh_editor};

pub struct IdentityEngine {
    pub config_path: PathBuf,
    pub ssh_config_path: PathBuf,
    pub gitconfig_path: PathBuf,
    pub hsm: HsmContext,
    pub credential_store: OsCredentialStore,
    pub gpg: GpgCoordinator,
}

impl IdentityEngine {
    pub async fn load_config(&self) -> Result<Config> {
        config::load(&self.config_path).await
    }

    pub async fn save_config(&self, config: &Config) -> Result<()> {
        config::save(&self.config_path, config).await
    }

    /// list — enumerate identities, annotated with best-effort credential
    /// availability (broker failures never fail the list itself).
    pub async fn list(&self, provider_filter: Option<config::ForgeProvider>) -> Result<Vec<IdentitySummary>> {
        let cfg = self.load_config().await?;
        let mut out = Vec::new();
        for name in cfg.identity_names() {
            let identity = &cfg.identities[&name];
            if let Some(filter) = provider_filter {
                if identity.provider != filter {
                    continue;
                }
            }
            let token_sources: Vec<Box<dyn sources::TokenSource>> = vec![
                Box::new(sources::OsKeychainSource { store: OsCredentialStore::new() }),
                Box::new(sources::IdentityEnvVarSource),
                Box::new(sources::ProviderEnvVarSource),
            ];
            let credential_available = broker::resolve(&token_sources, &name, identity).await.is_some();
            out.push(IdentitySummary {
                name: name.clone(),
                provider: identity.provider,
                credential_available,
                is_active: cfg.state.current_identity == name,
            });
        }
        Ok(out)
    }

    /// detect — read the repo's first remote, find the identity whose host
    /// alias or hostname matches, preferring an exact alias match.
    pub async fn detect(&self, repo_path: &Path) -> Result<Option<String>> {
        let cfg = self.load_config().await?;
        let remote = self.first_remote_url(repo_path).await?;
        let Some(remote) = remote else { return Ok(None) };
        let url = RemoteUrl::parse(&remote)?;
        let host = url.host();

        if let Some((name, _)) = cfg.identities.iter().find(|(_, i)| i.host == host) {
            return Ok(Some(name.clone()));
        }
        if let Some((name, _)) = cfg.identities.iter().find(|(_, i)| i.hostname == host) {
            return Ok(Some(name.clone()));
        }
        Ok(None)
    }

    /// switch — idempotent. Rewrites the repo's remote (if requested), the
    /// repo-local gitconfig identity, synchronizes the managed blocks, and
    /// updates state.
    pub async fn switch(&self, name: &str, options: SwitchOptions) -> Result<SwitchReport> {
        let mut cfg = self.load_config().await?;
        let identity = cfg
            .identities
            .get(name)
            .cloned()
            .ok_or_else(|| IdentityError::NotFound(name.to_string()))?;

        if options.set_remote {
            if let Some(repo_path) = &options.repo_path {
                self.rewrite_remote(repo_path, &identity).await?;
            }
        }

        if let Some(repo_path) = &options.repo_path {
            self.write_repo_identity(repo_path, &identity).await?;
            self.gpg.configure_repo(repo_path, &identity).await?;
        }

        ssh_editor::sync(&self.ssh_config_path, &cfg).await?;
        gitconfig_editor::sync(&self.gitconfig_path, &cfg).await?;

        if options.configure_gpg {
            let _ = self.gpg.reload_agent().await;
        }

        cfg.state.current_identity = name.to_string();
        cfg.state.last_switch = Some(chrono::Utc::now());
        if let Some(repo_path) = &options.repo_path {
            cfg.state.last_detected_repo = Some(repo_path.display().to_string());
        }
        self.save_config(&cfg).await?;

        Ok(SwitchReport { identity: name.to_string(), applied: true })
    }

    async fn rewrite_remote(&self, repo_path: &Path, identity: &Identity) -> Result<()> {
        let Some(raw) = self.first_remote_url(repo_path).await? else {
            return Err(RemoteError::NoRemote.into());
        };
        let url = RemoteUrl::parse(&raw)?;
        let rewritten = url.rewrite_host(&identity.host);

        let output = Command::new("git")
            .args(["remote", "set-url", "origin", &rewritten.to_wire_string()])
            .current_dir(repo_path)
            .output()
            .await
            .map_err(|e| crate::error::AgentError::CommandFailed(e.to_string()))?;
        if !output.status.success() {
            return Err(crate::error::AgentError::CommandFailed(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            )
            .into());
        }
        Ok(())
    }

    async fn write_repo_identity(&self, repo_path: &Path, identity: &Identity) -> Result<()> {
        for (key, value) in [("user.name", identity.user.as_str()), ("user.email", identity.email.as_str())] {
            let output = Command::new("git")
                .args(["config", "--local", key, value])
                .current_dir(repo_path)
                .output()
                .await
                .map_err(|e| crate::error::AgentError::CommandFailed(e.to_string()))?;
            if !output.status.success() {
                return Err(crate::error::AgentError::CommandFailed(
                    String::from_utf8_lossy(&output.stderr).into_owned(),
                )
                .into());
            }
        }
        Ok(())
    }

    async fn first_remote_url(&self, repo_path: &Path) -> Result<Option<String>> {
        let output = Command::new("git")
            .args(["remote", "get-url", "origin"])
            .current_dir(repo_path)
            .output()
            .await
            .map_err(|e| crate::error::AgentError::CommandFailed(e.to_string()))?;
        if !output.status.success() {
            return Ok(None);
        }
        let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if url.is_empty() {
            Ok(None)
        } else {
            Ok(Some(url))
        }
    }

    /// status — current active identity plus the detected identity for the
    /// current repo; disagreement is surfaced as a recommendation, not an
    /// error, mirroring `commands::status::status()`.
    pub async fn status(&self, repo_path: &Path) -> Result<StatusReport> {
        let cfg = self.load_config().await?;
        let detected = self.detect(repo_path).await?;
        let active = if cfg.state.current_identity.is_empty() {
            None
        } else {
            Some(cfg.state.current_identity.clone())
        };
        let recommendation = match (&active, &detected) {
            (Some(a), Some(d)) if a != d => {
                Some(format!("active identity {a:?} does not match detected identity {d:?} for this repo"))
            }
            (None, Some(d)) => Some(format!("no active identity set; this repo looks like {d:?}")),
            _ => None,
        };
        Ok(StatusReport { active_identity: active, detected_identity: detected, recommendation })
    }

    /// validate — SSH handshake + token-bearing API call (conservative
    /// success predicate; genuinely uncertain cases are surfaced distinctly
    /// rather than forced to pass/fail, per spec.md §9's open question).
    pub async fn validate(&self, name: &str) -> Result<ValidateOutcome> {
        let cfg = self.load_config().await?;
        let identity = cfg.identities.get(name).ok_or_else(|| IdentityError::NotFound(name.to_string()))?;
        validate::validate_identity(name, identity).await
    }

    pub async fn store_token(&self, name: &str, token: Token) -> Result<()> {
        let cfg = self.load_config().await?;
        let identity = cfg.identities.get(name).ok_or_else(|| IdentityError::NotFound(name.to_string()))?;
        self.credential_store.set(identity.provider, name, token.expose())
    }

    pub async fn seal_pin(&self, name: &str, pin: &[u8]) -> Result<()> {
        self.hsm.seal_pin(name, pin).await
    }

    pub async fn clear_pin(&self, name: &str) -> Result<()> {
        self.hsm.clear_pin(name).await
    }

    /// sync-config — idempotent regeneration of managed blocks.
    /// `dry_run` returns the rendered files without writing (spec.md §4.9).
    pub async fn sync_config(&self, dry_run: bool) -> Result<SyncReport> {
        let cfg = self.load_config().await?;
        if dry_run {
            let ssh_config = ssh_editor::preview(&self.ssh_config_path, &cfg).await?;
            let gitconfig = gitconfig_editor::preview(&self.gitconfig_path, &cfg).await?;
            return Ok(SyncReport::Preview { ssh_config, gitconfig });
        }
        ssh_editor::sync(&self.ssh_config_path, &cfg).await?;
        gitconfig_editor::sync(&self.gitconfig_path, &cfg).await?;
        Ok(SyncReport::Applied)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SwitchOptions {
    pub set_remote: bool,
    pub configure_gpg: bool,
    pub repo_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ForgeProvider, GpgConfig};
    use std::process::Command as StdCommand;

    fn identity(host: &str, hostname: &str) -> Identity {
        Identity {
            provider: ForgeProvider::Github,
            host: host.to_string(),
            hostname: hostname.to_string(),
            user: "Jane Dev".to_string(),
            email: "jane@example.com".to_string(),
            ssh_key_path: "/home/jane/.ssh/id".to_string(),
            credential_source: None,
            organizations: vec![],
            gpg: GpgConfig::default(),
            control_path: None,
        }
    }

    async fn engine(dir: &std::path::Path) -> IdentityEngine {
        IdentityEngine {
            config_path: dir.join("config.json"),
            ssh_config_path: dir.join("ssh_config"),
            gitconfig_path: dir.join("gitconfig"),
            hsm: HsmContext::stub(dir.join("hsm")),
            credential_store: OsCredentialStore::new(),
            gpg: GpgCoordinator::new(),
        }
    }

    fn init_repo(path: &std::path::Path) {
        StdCommand::new("git").arg("init").arg("-q").current_dir(path).status().unwrap();
        StdCommand::new("git")
            .args(["remote", "add", "origin", "git@github.com:acme/widget.git"])
            .current_dir(path)
            .status()
            .unwrap();
    }

    #[tokio::test]
    async fn switch_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("repo");
        std::fs::create_dir_all(&repo).unwrap();
        init_repo(&repo);

        let engine = engine(dir.path()).await;
        let mut cfg = Config::default();
        cfg.identities.insert("work".to_string(), identity("gh-w", "github.com"));
        config::save(&engine.config_path, &cfg).await.unwrap();

        let options = SwitchOptions { set_remote: true, configure_gpg: false, repo_path: Some(repo.clone()) };
        engine.switch("work", options.clone()).await.unwrap();
        let ssh_after_first = tokio::fs::read_to_string(&engine.ssh_config_path).await.unwrap();

        engine.switch("work", options).await.unwrap();
        let ssh_after_second = tokio::fs::read_to_string(&engine.ssh_config_path).await.unwrap();

        assert_eq!(ssh_after_first, ssh_after_second);
    }

    #[tokio::test]
    async fn detect_prefers_alias_over_hostname_match() {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("repo");
        std::fs::create_dir_all(&repo).unwrap();
        StdCommand::new("git").arg("init").arg("-q").current_dir(&repo).status().unwrap();
        StdCommand::new("git")
            .args(["remote", "add", "origin", "git@github.com:acme/widget.git"])
            .current_dir(&repo)
            .status()
            .unwrap();

        let engine = engine(dir.path()).await;
        let mut cfg = Config::default();
        cfg.identities.insert("generic".to_string(), identity("github.com", "github.com"));
        config::save(&engine.config_path, &cfg).await.unwrap();

        let detected = engine.detect(&repo).await.unwrap();
        assert_eq!(detected, Some("generic".to_string()));
    }
}
