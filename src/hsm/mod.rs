//! Uniform HSM sealing interface over TPM 2.0 / Secure Enclave /
//! keychain-software / stub backends (spec.md §4.4).
//!
//! Grounded in `adapters::forge_port::ForgePort`'s async_trait-plus-factory
//! shape and `bridge::secret_store::create_secret_store`'s "pick a backend
//! from config" pattern. Redesign flag applied: no process-global backend
//! state — callers construct an explicit [`HsmContext`] once and thread it
//! through every operation; it releases its resources on `Drop`.

pub mod keychain_software;
pub mod stub;
#[cfg(target_os = "macos")]
pub mod secure_enclave;
#[cfg(target_os = "linux")]
pub mod tpm;

use async_trait::async_trait;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HsmMethod {
    Tpm,
    SecureEnclave,
    KeychainSoftware,
    Stub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HsmStatus {
    Ready,
    Unavailable,
}

/// Callback invoked with a borrowed, non-copying view of the unsealed PIN.
/// The implementation zeroes its own buffer immediately after this returns;
/// the callback must not retain the slice past its own call.
pub type PinCallback<'a> = Box<dyn FnOnce(&[u8]) -> Result<()> + Send + 'a>;

#[async_trait]
pub trait HsmBackend: Send + Sync {
    fn method(&self) -> HsmMethod;
    async fn get_status(&self) -> Result<HsmStatus>;
    async fn seal_pin(&self, identity: &str, pin: &[u8]) -> Result<()>;
    async fn unseal_pin(&self, identity: &str, callback: PinCallback<'_>) -> Result<()>;
    async fn pin_exists(&self, identity: &str) -> Result<bool>;
    async fn clear_pin(&self, identity: &str) -> Result<()>;
    async fn clear_all(&self) -> Result<()>;
    async fn list_identities(&self) -> Result<Vec<String>>;
}

/// Explicit, owned HSM resource handle. Constructed once at process start
/// (or lazily on first HSM operation) and dropped at process exit.
pub struct HsmContext {
    backend: Box<dyn HsmBackend>,
}

impl HsmContext {
    pub fn new(backend: Box<dyn HsmBackend>) -> Self {
        Self { backend }
    }

    /// Picks the best available backend for this platform: TPM on Linux if
    /// reachable, Secure Enclave on macOS if reachable, else
    /// keychain-software, falling back to the stub only when explicitly
    /// requested (tests, CI, `--dry-run`).
    pub async fn autodetect() -> Result<Self> {
        #[cfg(target_os = "linux")]
        {
            let candidate = tpm::TpmBackend::new();
            if candidate.get_status().await.unwrap_or(HsmStatus::Unavailable) == HsmStatus::Ready {
                return Ok(Self::new(Box::new(candidate)));
            }
        }
        #[cfg(target_os = "macos")]
        {
            let candidate = secure_enclave::SecureEnclaveBackend::new();
            if candidate.get_status().await.unwrap_or(HsmStatus::Unavailable) == HsmStatus::Ready {
                return Ok(Self::new(Box::new(candidate)));
            }
        }
        let fallback = keychain_software::KeychainSoftwareBackend::new()?;
        Ok(Self::new(Box::new(fallback)))
    }

    pub fn stub(data_dir: std::path::PathBuf) -> Self {
        Self::new(Box::new(stub::StubBackend::new(data_dir)))
    }

    pub fn method(&self) -> HsmMethod {
        self.backend.method()
    }

    pub async fn get_status(&self) -> Result<HsmStatus> {
        self.backend.get_status().await
    }

    pub async fn seal_pin(&self, identity: &str, pin: &[u8]) -> Result<()> {
        self.backend.seal_pin(identity, pin).await
    }

    pub async fn unseal_pin(&self, identity: &str, callback: PinCallback<'_>) -> Result<()> {
        self.backend.unseal_pin(identity, callback).await
    }

    pub async fn pin_exists(&self, identity: &str) -> Result<bool> {
        self.backend.pin_exists(identity).await
    }

    pub async fn clear_pin(&self, identity: &str) -> Result<()> {
        self.backend.clear_pin(identity).await
    }

    pub async fn clear_all(&self) -> Result<()> {
        self.backend.clear_all().await
    }

    pub async fn list_identities(&self) -> Result<Vec<String>> {
        self.backend.list_identities().await
    }
}
