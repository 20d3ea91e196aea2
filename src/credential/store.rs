//! Platform credential store for forge tokens (spec.md §4.5).
//!
//! Service name format: `remote-juggler.<provider>.<identity>`. Generalizes
//! the teacher's macOS-only `security`-CLI-shelling `KeychainBridge`/
//! `KeychainStore` into the cross-platform `keyring` crate so
//! Security.framework, libsecret, and the Windows Credential Manager are
//! all covered from one implementation, per spec.md §4.5's explicit
//! multi-platform requirement.

use crate::config::ForgeProvider;
use crate::error::{PathError, Result};

pub struct OsCredentialStore;

impl OsCredentialStore {
    pub fn new() -> Self {
        Self
    }

    fn service_name(provider: ForgeProvider, identity: &str) -> String {
        format!("remote-juggler.{provider}.{identity}")
    }

    fn entry(provider: ForgeProvider, identity: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&Self::service_name(provider, identity), identity)
            .map_err(|_| PathError::NoPlatformStore.into())
    }

    /// Missing entry is not an error — returns `Ok(None)`.
    pub fn get(&self, provider: ForgeProvider, identity: &str) -> Result<Option<String>> {
        let entry = Self::entry(provider, identity)?;
        match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(_) => Err(PathError::NoPlatformStore.into()),
        }
    }

    pub fn set(&self, provider: ForgeProvider, identity: &str, value: &str) -> Result<()> {
        let entry = Self::entry(provider, identity)?;
        entry.set_password(value).map_err(|_| PathError::NoPlatformStore.into())
    }

    pub fn delete(&self, provider: ForgeProvider, identity: &str) -> Result<()> {
        let entry = Self::entry(provider, identity)?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(_) => Err(PathError::NoPlatformStore.into()),
        }
    }
}

impl Default for OsCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_name_format() {
        assert_eq!(
            OsCredentialStore::service_name(ForgeProvider::Github, "work"),
            "remote-juggler.github.work"
        );
    }
}
