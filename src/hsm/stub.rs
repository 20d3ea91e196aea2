//! Stub HSM backend for tests, CI, and `--dry-run`.
//!
//! Stores PINs XOR-obfuscated under a fixed key in a file under the data
//! dir. Not a real security boundary — emits a stderr warning on every
//! seal, exactly as spec.md §4.4 requires.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use zeroize::Zeroize;

use super::{HsmBackend, HsmMethod, HsmStatus, PinCallback};
use crate::error::{HsmError, Result};

const FIXED_KEY_SEED: &[u8] = b"remote-juggler-stub-hsm-do-not-use-in-production";

pub struct StubBackend {
    data_dir: PathBuf,
}

impl StubBackend {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    fn path_for(&self, identity: &str) -> PathBuf {
        self.data_dir.join(format!("{identity}.stub"))
    }

    fn keystream(len: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(len);
        let mut counter: u32 = 0;
        while out.len() < len {
            let mut hasher = Sha256::new();
            hasher.update(FIXED_KEY_SEED);
            hasher.update(counter.to_le_bytes());
            out.extend_from_slice(&hasher.finalize());
            counter += 1;
        }
        out.truncate(len);
        out
    }

    fn xor(data: &[u8]) -> Vec<u8> {
        let key = Self::keystream(data.len());
        data.iter().zip(key.iter()).map(|(a, b)| a ^ b).collect()
    }
}

#[async_trait]
impl HsmBackend for StubBackend {
    fn method(&self) -> HsmMethod {
        HsmMethod::Stub
    }

    async fn get_status(&self) -> Result<HsmStatus> {
        Ok(HsmStatus::Ready)
    }

    async fn seal_pin(&self, identity: &str, pin: &[u8]) -> Result<()> {
        eprintln!(
            "warning: remote-juggler is using the stub HSM backend for identity {identity:?}; \
             the PIN is only XOR-obfuscated and is NOT protected by real hardware"
        );
        tokio::fs::create_dir_all(&self.data_dir)
            .await
            .map_err(|e| HsmError::SealFailed { identity: identity.to_string(), reason: e.to_string() })?;

        let mut obfuscated = Self::xor(pin);
        let path = self.path_for(identity);
        tokio::fs::write(&path, &obfuscated)
            .await
            .map_err(|e| HsmError::SealFailed { identity: identity.to_string(), reason: e.to_string() })?;
        obfuscated.zeroize();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&path, perms)
                .await
                .map_err(|e| HsmError::SealFailed { identity: identity.to_string(), reason: e.to_string() })?;
        }
        Ok(())
    }

    async fn unseal_pin(&self, identity: &str, callback: PinCallback<'_>) -> Result<()> {
        let path = self.path_for(identity);
        let obfuscated = tokio::fs::read(&path).await.map_err(|e| HsmError::UnsealFailed {
            identity: identity.to_string(),
            reason: e.to_string(),
        })?;

        let mut plain = Self::xor(&obfuscated);
        let result = callback(&plain);
        plain.zeroize();
        result
    }

    async fn pin_exists(&self, identity: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.path_for(identity)).await.unwrap_or(false))
    }

    async fn clear_pin(&self, identity: &str) -> Result<()> {
        let path = self.path_for(identity);
        if let Ok(mut data) = tokio::fs::read(&path).await {
            data.zeroize();
            let zeroed = vec![0u8; data.len()];
            let _ = tokio::fs::write(&path, &zeroed).await;
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(HsmError::UnsealFailed { identity: identity.to_string(), reason: e.to_string() }.into()),
        }
    }

    async fn clear_all(&self) -> Result<()> {
        let identities = self.list_identities().await?;
        for identity in identities {
            self.clear_pin(&identity).await?;
        }
        Ok(())
    }

    async fn list_identities(&self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.data_dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(_) => return Err(HsmError::Unavailable.into()),
        };
        while let Some(entry) = entries.next_entry().await.map_err(|_| HsmError::Unavailable)? {
            if let Some(name) = entry.file_name().to_str().and_then(|n| n.strip_suffix(".stub")) {
                out.push(name.to_string());
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pin_round_trips_for_byte_strings() {
        for len in [1usize, 6, 32, 128] {
            let dir = tempfile::tempdir().unwrap();
            let backend = StubBackend::new(dir.path().to_path_buf());
            let pin: Vec<u8> = (0..len).map(|i| (i % 256) as u8).collect();

            backend.seal_pin("dev", &pin).await.unwrap();

            let mut observed = Vec::new();
            backend
                .unseal_pin(
                    "dev",
                    Box::new(|bytes| {
                        observed.extend_from_slice(bytes);
                        Ok(())
                    }),
                )
                .await
                .unwrap();

            assert_eq!(observed, pin);
        }
    }

    #[tokio::test]
    async fn seal_of_123456_unseals_to_exact_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let backend = StubBackend::new(dir.path().to_path_buf());
        backend.seal_pin("dev", b"123456").await.unwrap();

        let mut observed = Vec::new();
        backend
            .unseal_pin(
                "dev",
                Box::new(|bytes| {
                    observed.extend_from_slice(bytes);
                    Ok(())
                }),
            )
            .await
            .unwrap();

        assert_eq!(observed, vec![0x31, 0x32, 0x33, 0x34, 0x35, 0x36]);
    }

    #[tokio::test]
    async fn pin_exists_iff_file_exists() {
        let dir = tempfile::tempdir().unwrap();
        let backend = StubBackend::new(dir.path().to_path_buf());

        assert!(!backend.pin_exists("dev").await.unwrap());
        backend.seal_pin("dev", b"1234").await.unwrap();
        assert!(backend.pin_exists("dev").await.unwrap());

        let exists_on_disk = dir.path().join("dev.stub").exists();
        assert!(exists_on_disk);
    }

    #[tokio::test]
    async fn clear_pin_leaves_no_readable_ciphertext() {
        let dir = tempfile::tempdir().unwrap();
        let backend = StubBackend::new(dir.path().to_path_buf());
        backend.seal_pin("dev", b"1234").await.unwrap();

        backend.clear_pin("dev").await.unwrap();

        assert!(!backend.pin_exists("dev").await.unwrap());
        assert!(tokio::fs::read(dir.path().join("dev.stub")).await.is_err());
    }
}
