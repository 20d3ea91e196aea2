//! Command-line surface (spec.md §6): subcommands map 1:1 onto
//! [`crate::identity_engine::IdentityEngine`] operations, plus the three
//! run modes (`cli`, `mcp`, `acp`) the main binary dispatches on.
//!
//! Grounded in the teacher's `bin/hyperforge.rs` `clap::Parser` shape,
//! narrowed from one flat `Args` struct to a `Subcommand` enum since this
//! crate's surface is a set of distinct operations rather than one server
//! with transport flags.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "remote-juggler", version, about = "Per-repository git identity broker")]
pub struct Cli {
    /// Run mode: an interactive/scripted CLI, or a JSON-RPC agent-protocol
    /// server over stdio speaking the MCP or ACP dialect.
    #[arg(long, value_enum, default_value_t = RunMode::Cli)]
    pub mode: RunMode,

    /// Path to config.json. Defaults to XDG_CONFIG_HOME/remote-juggler/config.json.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Verbose (debug-level) logging.
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RunMode {
    Cli,
    Mcp,
    Acp,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List configured identities.
    List {
        #[arg(long)]
        provider: Option<String>,
    },
    /// Detect which identity a repository's remote implies.
    Detect {
        #[arg(default_value = ".")]
        repo_path: PathBuf,
    },
    /// Switch the active identity, optionally rewriting the repo's remote.
    Switch {
        identity: String,
        #[arg(long, default_value = ".")]
        repo_path: PathBuf,
        #[arg(long)]
        set_remote: bool,
        #[arg(long)]
        configure_gpg: bool,
    },
    /// Report the active identity and the one detected for the repo.
    Status {
        #[arg(default_value = ".")]
        repo_path: PathBuf,
    },
    /// Probe SSH reachability for an identity.
    Validate { identity: String },
    /// Store a forge API token in the OS credential store.
    StoreToken {
        identity: String,
        /// Read from stdin if omitted, rather than appear in shell history.
        #[arg(long)]
        token: Option<String>,
    },
    /// Regenerate the managed SSH config / gitconfig blocks.
    SyncConfig {
        #[arg(long)]
        dry_run: bool,
    },
    /// Query the signing agent and card status for an identity.
    GpgStatus { identity: String },
    /// Seal a smartcard PIN into the platform HSM.
    SealPin {
        identity: String,
        #[arg(long)]
        pin: Option<String>,
    },
    /// Unseal and print diagnostics for a sealed PIN (does not print the PIN itself).
    UnsealPin { identity: String },
    /// Clear a sealed PIN.
    ClearPin { identity: String },
    /// Get or set an identity's security mode (stub / keychain-software / TPM / Secure Enclave trust tier).
    SecurityMode {
        identity: String,
        mode: Option<String>,
    },
    /// Report whether an identity's SSH key is a hardware security key (`-sk` suffix).
    Yubikey { identity: String },
    /// Shortcut for `security-mode <identity> trusted-workstation`.
    TrustedWorkstation { identity: String },
    /// Interactive first-run setup.
    Setup,
    /// Print diagnostic information about the HSM backend and config paths.
    Debug,
}
