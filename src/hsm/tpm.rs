//! TPM 2.0 sealing backend (spec.md §4.4) — PCR-bound keyedHash objects.
//!
//! Seal: create a transient RSA primary key in the owner hierarchy, start a
//! trial policy session, apply a PCR policy (default PCR 7, SHA-256 bank),
//! extract the policy digest, create a keyedHash object whose `authPolicy`
//! equals that digest and whose sensitive data is the PIN, persist the
//! `{public, private}` blob pair to disk, flush transient handles.
//!
//! Unseal: reload the blobs, recreate the primary, load the sealed object
//! under it, start a real (non-trial) policy session, apply `PolicyPCR`
//! against current PCR values, invoke `Unseal`, deliver the result to the
//! callback, flush everything, zero the plaintext. A `PolicyPCR` failure on
//! current-state PCRs is the expected "platform state changed" error class,
//! distinct from a generic failure, because the remedy (re-seal after a
//! bootloader/kernel update) is specific.

use async_trait::async_trait;
use std::path::PathBuf;
use tss_esapi::{
    attributes::ObjectAttributesBuilder,
    constants::SessionType,
    handles::PcrHandle,
    interface_types::{
        algorithm::HashingAlgorithm,
        resource_handles::Hierarchy,
        session_handles::PolicySession,
    },
    structures::{
        Auth, CreatePrimaryKeyResult, Digest, KeyedHashScheme, PcrSelectionListBuilder, PcrSlot,
        Private, Public, PublicBuilder, PublicKeyedHashParameters, SensitiveData,
        SymmetricDefinition,
    },
    tcti_ldr::TctiNameConf,
    Context,
};
use zeroize::Zeroize;

use super::{HsmBackend, HsmMethod, HsmStatus, PinCallback};
use crate::error::{HsmError, Result};

const DEFAULT_PCR: PcrSlot = PcrSlot::Slot7;

pub struct TpmBackend {
    sealed_dir: PathBuf,
}

impl TpmBackend {
    pub fn new() -> Self {
        let sealed_dir = crate::config::data_dir()
            .map(|d| d.join("tpm-sealed"))
            .unwrap_or_else(|_| PathBuf::from("/tmp/remote-juggler-tpm-sealed"));
        Self { sealed_dir }
    }

    fn path_for(&self, identity: &str) -> PathBuf {
        self.sealed_dir.join(format!("{identity}.tpm2"))
    }

    fn open_context() -> Result<Context> {
        let tcti = TctiNameConf::from_environment_variable().map_err(|_| HsmError::Unavailable)?;
        Context::new(tcti).map_err(|_| HsmError::Unavailable.into())
    }

    fn pcr_selection() -> tss_esapi::structures::PcrSelectionList {
        PcrSelectionListBuilder::new()
            .with_selection(HashingAlgorithm::Sha256, &[DEFAULT_PCR])
            .build()
            .expect("static PCR selection is always well-formed")
    }

    /// Runs a trial policy session and returns its digest, used as the
    /// sealed object's `authPolicy`.
    fn trial_policy_digest(context: &mut Context) -> Result<Digest> {
        let session = context
            .start_auth_session(
                None,
                None,
                None,
                SessionType::Trial,
                SymmetricDefinition::AES_128_CFB,
                HashingAlgorithm::Sha256,
            )
            .map_err(|_| HsmError::SealFailed {
                identity: String::new(),
                reason: "failed to start trial policy session".to_string(),
            })?
            .ok_or(HsmError::Unavailable)?;
        let policy_session = PolicySession::try_from(session).map_err(|_| HsmError::Unavailable)?;

        context
            .policy_pcr(policy_session, Digest::default(), Self::pcr_selection())
            .map_err(|_| HsmError::SealFailed {
                identity: String::new(),
                reason: "PolicyPCR failed during trial session".to_string(),
            })?;

        let digest = context
            .policy_get_digest(policy_session)
            .map_err(|_| HsmError::Unavailable)?;

        context.flush_context(session.into()).ok();
        Ok(digest)
    }

    fn create_primary(context: &mut Context) -> Result<CreatePrimaryKeyResult> {
        let public = PublicBuilder::new()
            .with_public_algorithm(tss_esapi::interface_types::algorithm::PublicAlgorithm::Rsa)
            .with_name_hashing_algorithm(HashingAlgorithm::Sha256)
            .with_object_attributes(
                ObjectAttributesBuilder::new()
                    .with_fixed_tpm(true)
                    .with_fixed_parent(true)
                    .with_sensitive_data_origin(true)
                    .with_user_with_auth(true)
                    .with_decrypt(true)
                    .with_restricted(true)
                    .build()
                    .map_err(|_| HsmError::Unavailable)?,
            )
            .with_rsa_parameters(tss_esapi::structures::PublicRsaParametersBuilder::new()
                .with_scheme(tss_esapi::structures::RsaScheme::Null)
                .with_key_bits(tss_esapi::interface_types::key_bits::RsaKeyBits::Rsa2048)
                .with_is_decryption_key(true)
                .with_symmetric(SymmetricDefinition::AES_128_CFB)
                .build()
                .map_err(|_| HsmError::Unavailable)?)
            .with_rsa_unique_identifier(tss_esapi::structures::PublicKeyRsa::default())
            .build()
            .map_err(|_| HsmError::Unavailable)?;

        context
            .create_primary(Hierarchy::Owner, public, None, None, None, None)
            .map_err(|_| HsmError::SealFailed {
                identity: String::new(),
                reason: "create_primary failed".to_string(),
            }.into())
    }
}

#[async_trait]
impl HsmBackend for TpmBackend {
    fn method(&self) -> HsmMethod {
        HsmMethod::Tpm
    }

    async fn get_status(&self) -> Result<HsmStatus> {
        match Self::open_context() {
            Ok(_) => Ok(HsmStatus::Ready),
            Err(_) => Ok(HsmStatus::Unavailable),
        }
    }

    async fn seal_pin(&self, identity: &str, pin: &[u8]) -> Result<()> {
        let identity = identity.to_string();
        let pin = pin.to_vec();
        let sealed_dir = self.sealed_dir.clone();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut context = Self::open_context()?;
            let policy_digest = Self::trial_policy_digest(&mut context)?;
            let primary = Self::create_primary(&mut context)?;

            let sensitive_data =
                SensitiveData::try_from(pin.clone()).map_err(|_| HsmError::SealFailed {
                    identity: identity.clone(),
                    reason: "PIN exceeds TPM sensitive-data size".to_string(),
                })?;

            let public = PublicBuilder::new()
                .with_public_algorithm(tss_esapi::interface_types::algorithm::PublicAlgorithm::KeyedHash)
                .with_name_hashing_algorithm(HashingAlgorithm::Sha256)
                .with_object_attributes(
                    ObjectAttributesBuilder::new()
                        .with_fixed_tpm(true)
                        .with_fixed_parent(true)
                        .build()
                        .map_err(|_| HsmError::Unavailable)?,
                )
                .with_auth_policy(policy_digest)
                .with_keyed_hash_parameters(PublicKeyedHashParameters::new(KeyedHashScheme::Null))
                .build()
                .map_err(|_| HsmError::Unavailable)?;

            let created = context
                .create(primary.key_handle, public, None, Some(sensitive_data), None, None)
                .map_err(|_| HsmError::SealFailed {
                    identity: identity.clone(),
                    reason: "create (seal) failed".to_string(),
                })?;

            write_blob_pair(&sealed_dir, &identity, &created.out_public, &created.out_private)?;
            context.flush_context(primary.key_handle.into()).ok();
            Ok(())
        })
        .await
        .map_err(|_| HsmError::Unavailable)?
    }

    async fn unseal_pin(&self, identity: &str, callback: PinCallback<'_>) -> Result<()> {
        let path = self.path_for(identity);
        let (public, private) = read_blob_pair(&path)?;
        let identity_owned = identity.to_string();

        let plain = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
            let mut context = Self::open_context()?;
            let primary = Self::create_primary(&mut context)?;

            let object_handle = context
                .load(primary.key_handle, private, public)
                .map_err(|_| HsmError::UnsealFailed {
                    identity: identity_owned.clone(),
                    reason: "load failed".to_string(),
                })?;

            let session = context
                .start_auth_session(
                    None,
                    None,
                    None,
                    SessionType::Policy,
                    SymmetricDefinition::AES_128_CFB,
                    HashingAlgorithm::Sha256,
                )
                .map_err(|_| HsmError::Unavailable)?
                .ok_or(HsmError::Unavailable)?;
            let policy_session = PolicySession::try_from(session).map_err(|_| HsmError::Unavailable)?;

            context
                .policy_pcr(policy_session, Digest::default(), Self::pcr_selection())
                .map_err(|_| HsmError::PcrMismatch)?;

            let unsealed = context
                .execute_with_session(Some(session), |ctx| ctx.unseal(object_handle.into()))
                .map_err(|_| HsmError::UnsealFailed {
                    identity: identity_owned.clone(),
                    reason: "unseal failed".to_string(),
                })?;

            context.flush_context(primary.key_handle.into()).ok();
            context.flush_context(object_handle).ok();
            context.flush_context(session.into()).ok();

            Ok(unsealed.to_vec())
        })
        .await
        .map_err(|_| HsmError::Unavailable)??;

        let mut plain = plain;
        let result = callback(&plain);
        plain.zeroize();
        result
    }

    async fn pin_exists(&self, identity: &str) -> Result<bool> {
        Ok(self.path_for(identity).exists())
    }

    async fn clear_pin(&self, identity: &str) -> Result<()> {
        let path = self.path_for(identity);
        if let Ok(len) = std::fs::metadata(&path).map(|m| m.len()) {
            let zeros = vec![0u8; len as usize];
            let _ = std::fs::write(&path, &zeros);
        }
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(HsmError::UnsealFailed { identity: identity.to_string(), reason: e.to_string() }.into()),
        }
    }

    async fn clear_all(&self) -> Result<()> {
        for identity in self.list_identities().await? {
            self.clear_pin(&identity).await?;
        }
        Ok(())
    }

    async fn list_identities(&self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        let Ok(mut entries) = std::fs::read_dir(&self.sealed_dir) else {
            return Ok(out);
        };
        while let Some(Ok(entry)) = entries.next() {
            if let Some(name) = entry.file_name().to_str().and_then(|n| n.strip_suffix(".tpm2")) {
                out.push(name.to_string());
            }
        }
        Ok(out)
    }
}

/// Binary layout (spec.md §6): little-endian `u16` size + bytes, repeated
/// for the public then the private blob.
fn write_blob_pair(dir: &std::path::Path, identity: &str, public: &Public, private: &Private) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| HsmError::SealFailed {
        identity: identity.to_string(),
        reason: e.to_string(),
    })?;

    let public_bytes: Vec<u8> = public.marshall().map_err(|_| HsmError::Unavailable)?;
    let private_bytes: Vec<u8> = private.marshall().map_err(|_| HsmError::Unavailable)?;

    let mut out = Vec::new();
    out.extend_from_slice(&(public_bytes.len() as u16).to_le_bytes());
    out.extend_from_slice(&public_bytes);
    out.extend_from_slice(&(private_bytes.len() as u16).to_le_bytes());
    out.extend_from_slice(&private_bytes);

    let path = dir.join(format!("{identity}.tpm2"));
    std::fs::write(&path, &out).map_err(|e| HsmError::SealFailed {
        identity: identity.to_string(),
        reason: e.to_string(),
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        let _ = std::fs::set_permissions(&path, perms);
    }
    Ok(())
}

fn read_blob_pair(path: &std::path::Path) -> Result<(Public, Private)> {
    let data = std::fs::read(path).map_err(|e| HsmError::UnsealFailed {
        identity: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let mut cursor = 0usize;
    let read_len = |cursor: &mut usize| -> Result<usize> {
        let bytes = data
            .get(*cursor..*cursor + 2)
            .ok_or(HsmError::UnsealFailed { identity: String::new(), reason: "truncated blob".to_string() })?;
        *cursor += 2;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]) as usize)
    };

    let public_len = read_len(&mut cursor)?;
    let public_bytes = data
        .get(cursor..cursor + public_len)
        .ok_or(HsmError::UnsealFailed { identity: String::new(), reason: "truncated blob".to_string() })?;
    cursor += public_len;
    let public = Public::unmarshall(public_bytes).map_err(|_| HsmError::Unavailable)?;

    let private_len = read_len(&mut cursor)?;
    let private_bytes = data
        .get(cursor..cursor + private_len)
        .ok_or(HsmError::UnsealFailed { identity: String::new(), reason: "truncated blob".to_string() })?;
    let private = Private::try_from(private_bytes.to_vec()).map_err(|_| HsmError::Unavailable)?;

    Ok((public, private))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_pair_round_trips_through_the_binary_layout() {
        // Exercises the length-prefix framing only; real Public/Private
        // values require a live TPM connection and are covered by the stub
        // backend's round-trip tests instead.
        let mut out = Vec::new();
        let public_bytes = vec![1u8, 2, 3];
        let private_bytes = vec![4u8, 5, 6, 7];
        out.extend_from_slice(&(public_bytes.len() as u16).to_le_bytes());
        out.extend_from_slice(&public_bytes);
        out.extend_from_slice(&(private_bytes.len() as u16).to_le_bytes());
        out.extend_from_slice(&private_bytes);

        let mut cursor = 0usize;
        let plen = u16::from_le_bytes([out[cursor], out[cursor + 1]]) as usize;
        cursor += 2;
        assert_eq!(&out[cursor..cursor + plen], &public_bytes[..]);
        cursor += plen;
        let rlen = u16::from_le_bytes([out[cursor], out[cursor + 1]]) as usize;
        cursor += 2;
        assert_eq!(&out[cursor..cursor + rlen], &private_bytes[..]);
    }
}
