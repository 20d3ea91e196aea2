//! GPG / signing-agent coordinator (spec.md §4.7).
//!
//! Queries the signing agent for key/card presence, configures per-identity
//! signing settings in git, and drives the agent's control socket. Does not
//! itself perform cryptography. Grounded in `bridge::git_remote::GitRemoteBridge`'s
//! `git config --local` shell-out pattern, applied here to `gpgconf`/
//! `gpg-connect-agent`/`gpg --card-status` instead of `git`.

use std::path::Path;
use tokio::process::Command;

use crate::config::Identity;
use crate::error::{AgentError, Result};

#[derive(Debug, Clone)]
pub struct CardStatus {
    pub serial: Option<String>,
    pub signing_key_present: bool,
}

pub struct GpgCoordinator;

impl GpgCoordinator {
    pub fn new() -> Self {
        Self
    }

    /// Writes `user.signingKey`, `commit.gpgsign`, `tag.gpgsign`, and
    /// `gpg.format` into the repository's local gitconfig.
    pub async fn configure_repo(&self, repo_path: &Path, identity: &Identity) -> Result<()> {
        if identity.gpg.key_id.is_empty() {
            return Ok(());
        }
        self.run_local_config(repo_path, "user.signingKey", &identity.gpg.key_id).await?;
        self.run_local_config(repo_path, "commit.gpgsign", &identity.gpg.sign_commits.to_string()).await?;
        self.run_local_config(repo_path, "tag.gpgsign", &identity.gpg.sign_tags.to_string()).await?;
        self.run_local_config(repo_path, "gpg.format", "openpgp").await?;
        Ok(())
    }

    async fn run_local_config(&self, repo_path: &Path, key: &str, value: &str) -> Result<()> {
        let output = Command::new("git")
            .args(["config", "--local", key, value])
            .current_dir(repo_path)
            .output()
            .await
            .map_err(|e| AgentError::CommandFailed(e.to_string()))?;
        if !output.status.success() {
            return Err(AgentError::CommandFailed(String::from_utf8_lossy(&output.stderr).into_owned()).into());
        }
        Ok(())
    }

    /// Queries `gpg --card-status` for the inserted smartcard's serial
    /// number and whether the identity's signing key is present.
    pub async fn card_status(&self, identity: &Identity) -> Result<CardStatus> {
        let output = Command::new("gpg")
            .arg("--card-status")
            .output()
            .await
            .map_err(|_| AgentError::Unreachable)?;

        if !output.status.success() {
            return Err(AgentError::CardNotPresent.into());
        }

        let text = String::from_utf8_lossy(&output.stdout);
        let serial = text
            .lines()
            .find_map(|line| line.strip_prefix("Serial number ....:").map(|s| s.trim().to_string()));
        let signing_key_present =
            !identity.gpg.key_id.is_empty() && text.contains(&identity.gpg.key_id);

        Ok(CardStatus { serial, signing_key_present })
    }

    /// Asks `gpg-connect-agent` to reload (re-learn a newly inserted card or
    /// forget cached credentials).
    pub async fn reload_agent(&self) -> Result<()> {
        let output = Command::new("gpg-connect-agent")
            .args(["RELOADAGENT", "/bye"])
            .output()
            .await
            .map_err(|_| AgentError::Unreachable)?;
        if !output.status.success() {
            return Err(AgentError::CommandFailed(String::from_utf8_lossy(&output.stderr).into_owned()).into());
        }
        Ok(())
    }
}

impl Default for GpgCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
