//! RemoteJuggler - developer-workstation identity broker for git.
//!
//! Resolves and switches git identity, SSH key, GPG signing key, and forge
//! credential as a single unit keyed to a per-host/per-organization
//! identity, and exposes the same operations to coding agents over an
//! MCP/ACP JSON-RPC server on stdio.

pub mod agent_protocol;
pub mod cli;
pub mod config;
pub mod credential;
pub mod error;
pub mod gitconfig_editor;
pub mod gpg;
pub mod hsm;
pub mod identity_engine;
pub mod managed_block;
pub mod pinentry;
pub mod remote_url;
pub mod ssh_editor;

pub use error::{RemoteJugglerError, Result};
pub use identity_engine::IdentityEngine;
