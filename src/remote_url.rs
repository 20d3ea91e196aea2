//! Remote URL parsing, host rewriting, and canonicalization (spec.md §4.3).
//!
//! Grounded in `bridge::git_remote::GitRemoteBridge`'s `build_remote_url`
//! (`git@<host>:<owner>/<repo>.git` construction) and `list_remotes`'s
//! fetch/push URL vocabulary, generalized into a parse/rewrite model
//! covering the SSH, `scp`-style, and HTTPS forms.

use crate::error::{RemoteError, Result};
use once_cell_lite::Lazy;
use regex::Regex;

mod once_cell_lite {
    use std::sync::OnceLock;

    /// Minimal lazy-regex helper so each pattern compiles once per process
    /// without pulling in `once_cell` purely for this.
    pub struct Lazy<T> {
        cell: OnceLock<T>,
        init: fn() -> T,
    }

    impl<T> Lazy<T> {
        pub const fn new(init: fn() -> T) -> Self {
            Self { cell: OnceLock::new(), init }
        }
    }

    impl<T> std::ops::Deref for Lazy<T> {
        type Target = T;
        fn deref(&self) -> &T {
            self.cell.get_or_init(self.init)
        }
    }
}

static SCP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:([^@/]+)@)?([^/:]+):(.+?)(\.git)?/?$").unwrap());
static SSH_URI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ssh://(?:([^@/]+)@)?([^/:]+)(?::(\d+))?/(.+?)(\.git)?/?$").unwrap());
static HTTPS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https://([^/]+)/(.+?)(\.git)?/?$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteUrl {
    Ssh { user: String, host: String, path: String },
    SshUri { user: String, host: String, port: Option<u16>, path: String },
    Https { host: String, path: String },
}

impl RemoteUrl {
    pub fn parse(raw: &str) -> Result<Self> {
        if let Some(caps) = HTTPS_RE.captures(raw) {
            return Ok(RemoteUrl::Https {
                host: caps[1].to_string(),
                path: caps[2].to_string(),
            });
        }
        if let Some(caps) = SSH_URI_RE.captures(raw) {
            return Ok(RemoteUrl::SshUri {
                user: caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_else(|| "git".to_string()),
                host: caps[2].to_string(),
                port: caps.get(3).and_then(|m| m.as_str().parse().ok()),
                path: caps[4].to_string(),
            });
        }
        // scp-style: `[user@]host:owner/repo[.git]` — host has no slash and
        // there's no scheme prefix (already ruled out above).
        if let Some(caps) = SCP_RE.captures(raw) {
            return Ok(RemoteUrl::Ssh {
                user: caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_else(|| "git".to_string()),
                host: caps[2].to_string(),
                path: caps[3].to_string(),
            });
        }
        Err(RemoteError::Unparseable(raw.to_string()).into())
    }

    pub fn path(&self) -> &str {
        match self {
            RemoteUrl::Ssh { path, .. } => path,
            RemoteUrl::SshUri { path, .. } => path,
            RemoteUrl::Https { path, .. } => path,
        }
    }

    pub fn host(&self) -> &str {
        match self {
            RemoteUrl::Ssh { host, .. } => host,
            RemoteUrl::SshUri { host, .. } => host,
            RemoteUrl::Https { host, .. } => host,
        }
    }

    /// Rewrites the host, preserving everything else including the
    /// owner/repo path (spec.md §3 invariant).
    pub fn rewrite_host(&self, new_host: &str) -> Self {
        match self {
            RemoteUrl::Ssh { user, path, .. } => {
                RemoteUrl::Ssh { user: user.clone(), host: new_host.to_string(), path: path.clone() }
            }
            RemoteUrl::SshUri { user, port, path, .. } => RemoteUrl::SshUri {
                user: user.clone(),
                host: new_host.to_string(),
                port: *port,
                path: path.clone(),
            },
            RemoteUrl::Https { path, .. } => {
                RemoteUrl::Https { host: new_host.to_string(), path: path.clone() }
            }
        }
    }

    /// Wire format (what's actually written to git config / used to clone).
    pub fn to_wire_string(&self) -> String {
        match self {
            RemoteUrl::Ssh { user, host, path } => format!("{user}@{host}:{path}.git"),
            RemoteUrl::SshUri { user, host, port, path } => match port {
                Some(p) => format!("ssh://{user}@{host}:{p}/{path}.git"),
                None => format!("ssh://{user}@{host}/{path}.git"),
            },
            RemoteUrl::Https { host, path } => format!("https://{host}/{path}.git"),
        }
    }

    /// Display form: strips the trailing `.git` for human-readable output.
    pub fn to_display_string(&self) -> String {
        let wire = self.to_wire_string();
        wire.strip_suffix(".git").unwrap_or(&wire).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scp_style_and_rewrites_host_preserving_path() {
        let url = RemoteUrl::parse("git@gitlab.com:acme/widget.git").unwrap();
        assert_eq!(url.path(), "acme/widget");
        let rewritten = url.rewrite_host("gitlab-work");
        assert_eq!(rewritten.to_wire_string(), "git@gitlab-work:acme/widget.git");
    }

    #[test]
    fn parses_ssh_uri_with_port_and_extracts_path() {
        let url = RemoteUrl::parse("ssh://git@github.com:22/octo/repo.git").unwrap();
        assert_eq!(url.path(), "octo/repo");
    }

    #[test]
    fn parses_https_form() {
        let url = RemoteUrl::parse("https://github.com/octo/repo.git").unwrap();
        assert_eq!(url.path(), "octo/repo");
        assert_eq!(url.to_display_string(), "https://github.com/octo/repo");
    }

    #[test]
    fn invalid_url_is_a_distinct_error() {
        assert!(RemoteUrl::parse("not a url at all").is_err());
    }

    proptest::proptest! {
        #[test]
        fn rewriting_host_never_changes_owner_repo_path(
            owner in "[a-z][a-z0-9-]{0,10}",
            repo in "[a-z][a-z0-9-]{0,10}",
            new_host in "[a-z][a-z0-9.-]{0,10}",
        ) {
            let raw = format!("git@gitlab.com:{owner}/{repo}.git");
            let url = RemoteUrl::parse(&raw).unwrap();
            let rewritten = url.rewrite_host(&new_host);
            proptest::prop_assert_eq!(rewritten.path(), url.path());
        }
    }
}
