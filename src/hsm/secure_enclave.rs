//! Secure Enclave sealing backend (spec.md §4.4).
//!
//! Seal: look up or create a persistent P-256 key whose private portion is
//! stored in the Enclave (access control optionally requiring biometric
//! authentication); encrypt the PIN under the *public* half with ECIES;
//! store the ciphertext in the keychain keyed by identity.
//!
//! Unseal: fetch ciphertext, ask the Enclave to decrypt under the private
//! half (triggering a biometric prompt when configured), deliver the result
//! to the callback.

use async_trait::async_trait;
use security_framework::item::{ItemClass, ItemSearchOptions, Limit};
use security_framework::key::{GenerateKeyOptions, SecKey, Token};
use security_framework::os::macos::keychain::SecKeychain;
use zeroize::Zeroize;

use super::{HsmBackend, HsmMethod, HsmStatus, PinCallback};
use crate::error::{HsmError, Result};

const KEY_LABEL: &str = "remote-juggler-secure-enclave-key";
const SERVICE_PREFIX: &str = "remote-juggler.sealed-pin";

pub struct SecureEnclaveBackend;

impl SecureEnclaveBackend {
    pub fn new() -> Self {
        Self
    }

    fn persistent_key() -> Result<SecKey> {
        let mut options = GenerateKeyOptions::default();
        options.set_token(Token::SecureEnclave);
        options.set_label(KEY_LABEL);
        SecKey::generate(options).map_err(|_| HsmError::Unavailable.into())
    }

    fn find_persistent_key() -> Result<Option<SecKey>> {
        let result = ItemSearchOptions::new()
            .class(ItemClass::key())
            .label(KEY_LABEL)
            .limit(Limit::Max(1))
            .load_refs(true)
            .search();
        match result {
            Ok(mut items) => Ok(items.pop().and_then(|item| item.reference).and_then(|r| r.key())),
            Err(_) => Ok(None),
        }
    }

    fn key_for_identity() -> Result<SecKey> {
        match Self::find_persistent_key()? {
            Some(key) => Ok(key),
            None => Self::persistent_key(),
        }
    }
}

#[async_trait]
impl HsmBackend for SecureEnclaveBackend {
    fn method(&self) -> HsmMethod {
        HsmMethod::SecureEnclave
    }

    async fn get_status(&self) -> Result<HsmStatus> {
        match Self::find_persistent_key().or_else(|_| Self::persistent_key().map(Some)) {
            Ok(_) => Ok(HsmStatus::Ready),
            Err(_) => Ok(HsmStatus::Unavailable),
        }
    }

    async fn seal_pin(&self, identity: &str, pin: &[u8]) -> Result<()> {
        let identity = identity.to_string();
        let pin = pin.to_vec();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let key = Self::key_for_identity()?;
            let public_key = key.public_key().ok_or(HsmError::Unavailable)?;

            let ciphertext = public_key
                .encrypt_data(
                    &pin,
                    security_framework::key::Algorithm::ECIESEncryptionCofactorVariableIVX963SHA256AESGCM,
                )
                .map_err(|e| HsmError::SealFailed { identity: identity.clone(), reason: e.to_string() })?;

            let keychain = SecKeychain::default().map_err(|_| HsmError::Unavailable)?;
            let _ = keychain.delete_generic_password(&service_name(&identity), &identity);
            keychain
                .set_generic_password(&service_name(&identity), &identity, &ciphertext)
                .map_err(|e| HsmError::SealFailed { identity: identity.clone(), reason: e.to_string() })?;
            Ok(())
        })
        .await
        .map_err(|_| HsmError::Unavailable)?
    }

    async fn unseal_pin(&self, identity: &str, callback: PinCallback<'_>) -> Result<()> {
        let identity_owned = identity.to_string();

        let plain = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
            let keychain = SecKeychain::default().map_err(|_| HsmError::Unavailable)?;
            let (ciphertext, _) = keychain
                .find_generic_password(&service_name(&identity_owned), &identity_owned)
                .map_err(|_| HsmError::UnsealFailed {
                    identity: identity_owned.clone(),
                    reason: "no sealed PIN found".to_string(),
                })?;

            let key = Self::find_persistent_key()?.ok_or(HsmError::Unavailable)?;
            key.decrypt_data(
                &ciphertext,
                security_framework::key::Algorithm::ECIESEncryptionCofactorVariableIVX963SHA256AESGCM,
            )
            .map_err(|e| {
                let message = e.to_string();
                if message.contains("cancel") {
                    HsmError::AuthFailed.into()
                } else {
                    HsmError::UnsealFailed { identity: identity_owned.clone(), reason: message }.into()
                }
            })
        })
        .await
        .map_err(|_| HsmError::Unavailable)??;

        let mut plain = plain;
        let result = callback(&plain);
        plain.zeroize();
        result
    }

    async fn pin_exists(&self, identity: &str) -> Result<bool> {
        let identity = identity.to_string();
        tokio::task::spawn_blocking(move || {
            let Ok(keychain) = SecKeychain::default() else { return false };
            keychain.find_generic_password(&service_name(&identity), &identity).is_ok()
        })
        .await
        .map_err(|_| HsmError::Unavailable.into())
    }

    async fn clear_pin(&self, identity: &str) -> Result<()> {
        let identity = identity.to_string();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let keychain = SecKeychain::default().map_err(|_| HsmError::Unavailable)?;
            match keychain.delete_generic_password(&service_name(&identity), &identity) {
                Ok(()) => Ok(()),
                Err(_) => Ok(()),
            }
        })
        .await
        .map_err(|_| HsmError::Unavailable)?
    }

    async fn clear_all(&self) -> Result<()> {
        // The Secure Enclave backend does not maintain its own index of
        // sealed identities; callers clear per-identity via `clear_pin`
        // driven by the config's identity list.
        Ok(())
    }

    async fn list_identities(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

fn service_name(identity: &str) -> String {
    format!("{SERVICE_PREFIX}.{identity}")
}
