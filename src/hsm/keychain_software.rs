//! Keychain-software fallback backend (spec.md §4.4): stores PIN ciphertext
//! in the platform keychain without hardware binding. Preferred only when
//! no TPM or Secure Enclave is usable.
//!
//! Built on the `keyring` crate, the same cross-platform credential-store
//! abstraction used by [`crate::credential::store`] — here keyed under a
//! distinct service namespace so PIN storage never collides with forge
//! token storage.

use async_trait::async_trait;

use super::{HsmBackend, HsmMethod, HsmStatus, PinCallback};
use crate::error::{HsmError, Result};

const SERVICE_PREFIX: &str = "remote-juggler.pin";

pub struct KeychainSoftwareBackend {
    known_identities: std::sync::Mutex<std::collections::HashSet<String>>,
}

impl KeychainSoftwareBackend {
    pub fn new() -> Result<Self> {
        Ok(Self { known_identities: std::sync::Mutex::new(std::collections::HashSet::new()) })
    }

    fn entry(identity: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(SERVICE_PREFIX, identity).map_err(|_| HsmError::Unavailable.into())
    }
}

#[async_trait]
impl HsmBackend for KeychainSoftwareBackend {
    fn method(&self) -> HsmMethod {
        HsmMethod::KeychainSoftware
    }

    async fn get_status(&self) -> Result<HsmStatus> {
        Ok(HsmStatus::Ready)
    }

    async fn seal_pin(&self, identity: &str, pin: &[u8]) -> Result<()> {
        let entry = Self::entry(identity)?;
        let encoded = hex_encode(pin);
        entry
            .set_password(&encoded)
            .map_err(|e| HsmError::SealFailed { identity: identity.to_string(), reason: e.to_string() })?;
        self.known_identities.lock().unwrap().insert(identity.to_string());
        Ok(())
    }

    async fn unseal_pin(&self, identity: &str, callback: PinCallback<'_>) -> Result<()> {
        let entry = Self::entry(identity)?;
        let encoded = entry
            .get_password()
            .map_err(|e| HsmError::UnsealFailed { identity: identity.to_string(), reason: e.to_string() })?;
        let mut plain = hex_decode(&encoded);
        let result = callback(&plain);
        use zeroize::Zeroize;
        plain.zeroize();
        result
    }

    async fn pin_exists(&self, identity: &str) -> Result<bool> {
        let entry = Self::entry(identity)?;
        Ok(entry.get_password().is_ok())
    }

    async fn clear_pin(&self, identity: &str) -> Result<()> {
        let entry = Self::entry(identity)?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => {
                self.known_identities.lock().unwrap().remove(identity);
                Ok(())
            }
            Err(e) => Err(HsmError::UnsealFailed { identity: identity.to_string(), reason: e.to_string() }.into()),
        }
    }

    async fn clear_all(&self) -> Result<()> {
        let identities: Vec<String> = self.known_identities.lock().unwrap().iter().cloned().collect();
        for identity in identities {
            self.clear_pin(&identity).await?;
        }
        Ok(())
    }

    async fn list_identities(&self) -> Result<Vec<String>> {
        Ok(self.known_identities.lock().unwrap().iter().cloned().collect())
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_decode(s: &str) -> Vec<u8> {
    (0..s.len())
        .step_by(2)
        .filter_map(|i| s.get(i..i + 2).and_then(|chunk| u8::from_str_radix(chunk, 16).ok()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trips() {
        let original = vec![0x31, 0x00, 0xff, 0x0a];
        assert_eq!(hex_decode(&hex_encode(&original)), original);
    }
}
