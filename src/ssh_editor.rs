//! SSH config managed-block generation (spec.md §4.2).
//!
//! For each identity whose host alias differs from its hostname, emits a
//! `Host <alias>` stanza. Ordering is deterministic by identity name.

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
        lines.push(format!("Host {}", identity.host));
        lines.push(format!("    HostName {}", identity.hostname));
        lines.push("    User git".to_string());
        lines.push(format!("    IdentityFile {}", identity.ssh_key_path));
        lines.push("    IdentitiesOnly yes".to_string());
        if let Some(control_path) = &identity.control_path {
            lines.push(format!("    ControlPath {control_path}"));
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ForgeProvider, GpgConfig, Identity};

    fn identity(host: &str, hostname: &str, key: &str) -> Identity {
        Identity {
            provider: ForgeProvider::Github,
            host: host.to_string(),
            hostname: hostname.to_string(),
            user: "Jane".to_string(),
            email: "jane@example.com".to_string(),
            ssh_key_path: key.to_string(),
            credential_source: None,
            organizations: vec![],
            gpg: GpgConfig::default(),
            control_path: None,
        }
    }

    #[tokio::test]
    async fn sync_emits_control_path_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ssh_config");

        let mut work = identity("gh-w", "github.com", "/home/jane/.ssh/id_w");
        work.control_path = Some("~/.ssh/cm-%r@%h:%p".to_string());

        let mut config = Config::default();
        config.identities.insert("work".to_string(), work);

        sync(&path, &config).await.unwrap();

        let out = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(out.contains("    ControlPath ~/.ssh/cm-%r@%h:%p"));
    }

    #[tokio::test]
    async fn sync_creates_distinct_host_stanzas_per_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ssh_config");

        let mut config = Config::default();
        config
            .identities
            .insert("personal".to_string(), identity("gh-p", "github.com", "/home/jane/.ssh/id_p"));
        config
            .identities
            .insert("work".to_string(), identity("gh-w", "github.com", "/home/jane/.ssh/id_w"));

        sync(&path, &config).await.unwrap();

        let out = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(out.contains("Host gh-p"));
        assert!(out.contains("Host gh-w"));
        assert!(out.contains("IdentityFile /home/jane/.ssh/id_p"));
        assert!(out.contains("IdentityFile /home/jane/.ssh/id_w"));
    }

    #[tokio::test]
    async fn sync_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ssh_config");

        let mut config = Config::default();
        config
            .identities
            .insert("work".to_string(), identity("gh-w", "github.com", "/home/jane/.ssh/id_w"));

        sync(&path, &config).await.unwrap();
        let once = tokio::fs::read_to_string(&path).await.unwrap();
        sync(&path, &config).await.unwrap();
        let twice = tokio::fs::read_to_string(&path).await.unwrap();

        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn sync_preserves_unmanaged_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ssh_config");
        tokio::fs::write(&path, "Host other\n    HostName example.org\n")
            .await
            .unwrap();

        let config = Config::default();
        sync(&path, &config).await.unwrap();

        let out = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(out.contains("Host other\n    HostName example.org"));
    }
}
