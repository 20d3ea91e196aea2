//! Credential broker: pure resolution function over a precedence-ordered
//! list of [`TokenSource`]s (spec.md §4.6).

use super::{sources::TokenSource, Token};
use crate::config::Identity;
use crate::error::Result;

pub struct CredentialBroker {
    sources: Vec<Box<dyn TokenSource>>,
}

impl CredentialBroker {
    pub fn new(sources: Vec<Box<dyn TokenSource>>) -> Self {
        Self { sources }
    }

    /// Returns the first source that produces a token, tagged with its
    /// provenance. A single source's own failure is logged at debug level
    /// and resolution proceeds to the next source — the broker itself never
    /// hard-fails on a source error (`CredentialAbsent` — i.e. `Ok(None)` —
    /// is a result, not an error).
    pub async fn resolve(&self, name: &str, identity: &Identity) -> Option<Token> {
        resolve(&self.sources, name, identity).await
    }
}

pub async fn resolve(
    sources: &[Box<dyn TokenSource>],
    name: &str,
    identity: &Identity,
) -> Option<Token> {
    for source in sources {
        match source.lookup(name, identity).await {
            Ok(Some(token)) => return Some(token),
            Ok(None) => continue,
            Err(err) => {
                tracing::debug!(source = ?source.kind(), error = %err, "credential source failed, trying next");
                continue;
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ForgeProvider, GpgConfig};
    use crate::credential::TokenSourceKind;
    use async_trait::async_trait;

    fn identity() -> Identity {
        Identity {
            provider: ForgeProvider::Github,
            host: "gh-w".to_string(),
            hostname: "github.com".to_string(),
            user: "jane".to_string(),
            email: "jane@example.com".to_string(),
            ssh_key_path: "/home/jane/.ssh/id".to_string(),
            credential_source: None,
            organizations: vec![],
            gpg: GpgConfig::default(),
            control_path: None,
        }
    }

    struct Absent;
    #[async_trait]
    impl TokenSource for Absent {
        fn kind(&self) -> TokenSourceKind {
            TokenSourceKind::OsKeychain
        }
        async fn lookup(&self, _name: &str, _identity: &Identity) -> Result<Option<Token>> {
            Ok(None)
        }
    }

    struct Failing;
    #[async_trait]
    impl TokenSource for Failing {
        fn kind(&self) -> TokenSourceKind {
            TokenSourceKind::IdentityEnvVar
        }
        async fn lookup(&self, _name: &str, _identity: &Identity) -> Result<Option<Token>> {
            Err(crate::error::CredentialError::AllSourcesFailed.into())
        }
    }

    struct Present(&'static str);
    #[async_trait]
    impl TokenSource for Present {
        fn kind(&self) -> TokenSourceKind {
            TokenSourceKind::ProviderEnvVar
        }
        async fn lookup(&self, _name: &str, _identity: &Identity) -> Result<Option<Token>> {
            Ok(Some(Token::new(self.0, TokenSourceKind::ProviderEnvVar)))
        }
    }

    #[tokio::test]
    async fn resolves_first_present_source_in_precedence_order() {
        let sources: Vec<Box<dyn TokenSource>> =
            vec![Box::new(Absent), Box::new(Present("token-a")), Box::new(Present("token-b"))];
        let token = resolve(&sources, "work", &identity()).await.unwrap();
        assert_eq!(token.expose(), "token-a");
    }

    #[tokio::test]
    async fn a_failing_source_does_not_abort_resolution() {
        let sources: Vec<Box<dyn TokenSource>> = vec![Box::new(Failing), Box::new(Present("token-c"))];
        let token = resolve(&sources, "work", &identity()).await.unwrap();
        assert_eq!(token.expose(), "token-c");
    }

    #[tokio::test]
    async fn no_source_present_yields_none_not_an_error() {
        let sources: Vec<Box<dyn TokenSource>> = vec![Box::new(Absent)];
        assert!(resolve(&sources, "work", &identity()).await.is_none());
    }
}
