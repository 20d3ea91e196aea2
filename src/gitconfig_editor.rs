//! Global gitconfig managed-block generation (spec.md §4.2).
//!
//! For each identity, emits a `[url "git@<alias>:"] insteadOf =
//! git@<hostname>:` section so cloning from the real hostname is silently
//! routed to the per-identity host alias (which in turn selects the correct
//! SSH key via the SSH config managed block).

use crate::config::{Config, CURRENT_SCHEMA_VERSION};
use crate::error::Result;
use crate::managed_block;
use std::path::Path;

/// Renders the full file as it would look after a sync, without writing.
/// Used by `sync-config --dry-run` (spec.md §4.9) to surface the pending
/// change.
pub async fn preview(path: &Path, config: &Config) -> Result<String> {
    let current = match tokio::fs::read_to_string(path).await {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(crate::error::SshConfigError::Io(e).into()),
    };
    let body = render_body(config);
    managed_block::rewrite(&current, path, CURRENT_SCHEMA_VERSION, &body)
}

pub async fn sync(path: &Path, config: &Config) -> Result<()> {
    let current = match tokio::fs::read_to_string(path).await {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(crate::error::SshConfigError::Io(e).into()),
    };

    let body = render_body(config);
    let rewritten = managed_block::rewrite(&current, path, CURRENT_SCHEMA_VERSION, &body)?;

    if rewritten != current {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(crate::error::SshConfigError::Io)?;
        }
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, rewritten.as_bytes())
            .await
            .map_err(crate::error::SshConfigError::Io)?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(crate::error::SshConfigError::Io)?;
    }
    Ok(())
}

fn render_body(config: &Config) -> Vec<String> {
    let mut names = config.identity_names();
    names.sort();

    let mut lines = Vec::new();
    for name in names {
        let Some(identity) = config.identities.get(&name) else { continue };
        if identity.host == identity.hostname {
            continue;
        }
        lines.push(format!("[url \"git@{}:\"]", identity.host));
        lines.push(format!("    insteadOf = git@{}:", identity.hostname));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ForgeProvider, GpgConfig, Identity};

    fn identity(host: &str, hostname: &str) -> Identity {
        Identity {
            provider: ForgeProvider::Github,
            host: host.to_string(),
            hostname: hostname.to_string(),
            user: "Jane".to_string(),
            email: "jane@example.com".to_string(),
            ssh_key_path: "/home/jane/.ssh/id".to_string(),
            credential_source: None,
            organizations: vec![],
            gpg: GpgConfig::default(),
            control_path: None,
        }
    }

    #[tokio::test]
    async fn sync_emits_insteadof_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gitconfig");

        let mut config = Config::default();
        config.identities.insert("work".to_string(), identity("gh-w", "github.com"));

        sync(&path, &config).await.unwrap();
        let out = tokio::fs::read_to_string(&path).await.unwrap();

        assert!(out.contains("[url \"git@gh-w:\"]"));
        assert!(out.contains("insteadOf = git@github.com:"));
    }

    #[tokio::test]
    async fn sync_twice_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gitconfig");

        let mut config = Config::default();
        config.identities.insert("work".to_string(), identity("gh-w", "github.com"));

        sync(&path, &config).await.unwrap();
        let once = tokio::fs::read_to_string(&path).await.unwrap();
        sync(&path, &config).await.unwrap();
        let twice = tokio::fs::read_to_string(&path).await.unwrap();

        assert_eq!(once, twice);
    }
}
