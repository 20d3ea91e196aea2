//! Top-level error taxonomy.
//!
//! Each subsystem owns a narrow error enum; this module aggregates them
//! behind one `RemoteJugglerError` so the CLI and agent-protocol server have
//! a single place to map errors to exit codes / JSON-RPC error objects.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, RemoteJugglerError>;

#[derive(Debug, thiserror::Error)]
pub enum RemoteJugglerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    SshConfig(#[from] SshConfigError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Hsm(#[from] HsmError),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation timed out")]
    Timeout,
}

impl RemoteJugglerError {
    /// Maps to the exit codes documented in spec.md §6.
    pub fn exit_code(&self) -> i32 {
        match self {
            RemoteJugglerError::Config(_) => 3,
            RemoteJugglerError::Credential(_) => 4,
            RemoteJugglerError::Hsm(_) => 5,
            RemoteJugglerError::Cancelled => 130,
            _ => 1,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file at {path} is malformed: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("config schema version {found} is newer than this binary supports ({supported})")]
    SchemaTooNew { found: u32, supported: u32 },
    #[error("config path could not be determined")]
    NoHome,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("path {0} is not accessible")]
    Inaccessible(PathBuf),
    #[error("permission denied for {0}")]
    PermissionDenied(PathBuf),
    #[error("no platform credential store is available on this system")]
    NoPlatformStore,
}

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("remote URL {0:?} could not be parsed")]
    Unparseable(String),
    #[error("repository has no remote configured")]
    NoRemote,
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("no such identity: {0}")]
    NotFound(String),
    #[error("identity already exists: {0}")]
    Duplicate(String),
    #[error("malformed identity name {0:?}: must be lowercase, dash-separated, non-empty")]
    MalformedName(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SshConfigError {
    #[error("managed block in {path} is corrupt: begin sentinel with no matching end sentinel")]
    CorruptManagedBlock { path: PathBuf },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// `CredentialAbsent` is deliberately not a variant here — per spec.md §7 it
/// is an `Ok(None)` result, not an error.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("no credential source produced a usable token")]
    AllSourcesFailed,
    #[error("credential helper {0:?} is not an allowed name")]
    InvalidHelperName(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum HsmError {
    #[error("no HSM backend is available on this platform")]
    Unavailable,
    #[error("failed to seal PIN for identity {identity}: {reason}")]
    SealFailed { identity: String, reason: String },
    #[error("failed to unseal PIN for identity {identity}: {reason}")]
    UnsealFailed { identity: String, reason: String },
    #[error("platform state changed since sealing: PCR policy no longer satisfied")]
    PcrMismatch,
    #[error("HSM authentication failed (biometry / PIN retry exhausted)")]
    AuthFailed,
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("signing agent is unreachable")]
    Unreachable,
    #[error("signing agent command failed: {0}")]
    CommandFailed(String),
    #[error("no smartcard is present")]
    CardNotPresent,
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed agent-protocol request: {0}")]
    Malformed(String),
    #[error("unknown method: {0}")]
    UnknownMethod(String),
    #[error("server has not completed the initialize handshake")]
    NotInitialized,
}
