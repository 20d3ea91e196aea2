//! Typed result structs for identity-engine operations, rendered both to
//! the CLI's human-readable output and to the agent-protocol server's MCP
//! `content` parts from the same value.

use crate::config::ForgeProvider;

#[derive(Debug, Clone, serde::Serialize)]
pub struct IdentitySummary {
    pub name: String,
    pub provider: ForgeProvider,
    pub credential_available: bool,
    pub is_active: bool,
}

impl IdentitySummary {
    pub fn symbol(&self) -> &'static str {
        if self.is_active {
            "*"
        } else if self.credential_available {
            "+"
        } else {
            "-"
        }
    }

    pub fn format(&self) -> String {
        format!("{} {} ({})", self.symbol(), self.name, self.provider)
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SwitchReport {
    pub identity: String,
    pub applied: bool,
}

impl SwitchReport {
    pub fn format(&self) -> String {
        format!("switched to identity {:?}", self.identity)
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StatusReport {
    pub active_identity: Option<String>,
    pub detected_identity: Option<String>,
    pub recommendation: Option<String>,
}

impl StatusReport {
    pub fn format(&self) -> String {
        let mut lines = Vec::new();
        lines.push(format!(
            "active identity: {}",
            self.active_identity.as_deref().unwrap_or("(none)")
        ));
        lines.push(format!(
            "detected identity: {}",
            self.detected_identity.as_deref().unwrap_or("(no match)")
        ));
        if let Some(note) = &self.recommendation {
            lines.push(format!("recommendation: {note}"));
        }
        lines.join("\n")
    }
}

/// Result of `sync-config`. `--dry-run` produces `Preview` with the
/// rendered files as they would look after the sync, without writing;
/// otherwise `Applied` confirms the write happened.
#[derive(Debug, Clone, serde::Serialize)]
pub enum SyncReport {
    Applied,
    Preview { ssh_config: String, gitconfig: String },
}

impl SyncReport {
    pub fn format(&self) -> String {
        match self {
            SyncReport::Applied => "synced ssh config and gitconfig managed blocks".to_string(),
            SyncReport::Preview { ssh_config, gitconfig } => format!(
                "--- ssh config (dry run, not written) ---\n{ssh_config}\n--- gitconfig (dry run, not written) ---\n{gitconfig}"
            ),
        }
    }
}
