//! OS credential store and credential broker (spec.md §4.5, §4.6).

pub mod broker;
pub mod sources;
pub mod store;

pub use broker::{resolve, CredentialBroker};
pub use sources::TokenSource;
pub use store::OsCredentialStore;

use secrecy::{ExposeSecret, SecretString};

/// A forge API token, tagged with the source it was resolved from so
/// callers can display provenance. Wraps the value in `secrecy::SecretString`
/// so it can never appear in a `{:?}` or log line — grounded in the
/// `git-proxy-mcp` `PatCredential` redacted-Debug pattern.
#[derive(Clone)]
pub struct Token {
    secret: SecretString,
    pub source: TokenSourceKind,
}

impl Token {
    pub fn new(value: impl Into<String>, source: TokenSourceKind) -> Self {
        Self { secret: SecretString::new(value.into()), source }
    }

    pub fn expose(&self) -> &str {
        self.secret.expose_secret()
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token").field("secret", &"[REDACTED]").field("source", &self.source).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSourceKind {
    SealedStore,
    OsKeychain,
    IdentityEnvVar,
    ProviderEnvVar,
    ForgeCli,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_debug_never_leaks_the_secret() {
        let token = Token::new("super-secret-value", TokenSourceKind::OsKeychain);
        let rendered = format!("{token:?}");
        assert!(!rendered.contains("super-secret-value"));
        assert!(rendered.contains("REDACTED"));
    }
}
