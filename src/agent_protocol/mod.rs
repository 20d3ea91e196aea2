//! Agent-protocol server (spec.md §4.10): line-delimited JSON-RPC 2.0 over
//! stdio, MCP handshake, ACP superset, stable tool catalog.
//!
//! Hand-rolled on `tokio` + `serde_json` rather than on the upstream
//! hub-method RPC/transport framework this crate's lineage once carried
//! (see DESIGN.md) — the wire shape here (plain `{jsonrpc, id, method,
//! params}` lines, MCP `content`-array tool results) is simple enough to
//! hand-roll directly. Two logical tasks per spec.md §5: a line-reader and
//! a worker, so long-running tool calls never block request parsing.

pub mod rpc;
pub mod tools;

use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, RwLock};

use crate::identity_engine::IdentityEngine;
use rpc::{Request, Response};

pub struct AgentProtocolServer {
    engine: Arc<IdentityEngine>,
    initialized: RwLock<bool>,
}

impl AgentProtocolServer {
    pub fn new(engine: IdentityEngine) -> Self {
        Self { engine: Arc::new(engine), initialized: RwLock::new(false) }
    }

    /// Runs the server over the given stdio-like streams until EOF
    /// (graceful shutdown, exit code 0) or ctrl-c.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> std::io::Result<()>
    where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
        W: tokio::io::AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<String>(64);

        let reader_task = tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(line).await.is_err() {
                    break;
                }
            }
        });

        let mut writer = writer;
        while let Some(line) = rx.recv().await {
            if line.trim().is_empty() {
                continue;
            }
            let response = self.handle_line(&line).await;
            if let Some(response) = response {
                let serialized = serde_json::to_string(&response).unwrap_or_default();
                writer.write_all(serialized.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }

        reader_task.abort();
        Ok(())
    }

    /// Requests are processed strictly in receive order within a session —
    /// this function is called once per line from a single sequential loop,
    /// so FIFO order falls out of the call structure itself.
    async fn handle_line(&self, line: &str) -> Option<Response> {
        let request: Request = match serde_json::from_str(line) {
            Ok(req) => req,
            Err(e) => {
                return Some(Response::protocol_error(None, &format!("malformed request: {e}")));
            }
        };

        let is_notification = request.id.is_none();

        if request.method == "initialized" {
            *self.initialized.write().await = true;
            return None;
        }

        if request.method == "initialize" {
            let response = rpc::handle_initialize(&request);
            return if is_notification { None } else { Some(response) };
        }

        if request.method == "tools/call" && !*self.initialized.read().await {
            return Some(Response::protocol_error(
                request.id.clone(),
                "server has not completed the initialize handshake",
            ));
        }

        let response = match request.method.as_str() {
            "tools/list" => tools::handle_list(&request),
            "tools/call" => tools::handle_call(&self.engine, &request).await,
            other => Response::unknown_method(request.id.clone(), other),
        };

        if is_notification {
            None
        } else {
            Some(response)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use crate::gpg::GpgCoordinator;
    use crate::hsm::HsmContext;

    async fn test_server(dir: &std::path::Path) -> AgentProtocolServer {
        let cfg = config::Config::default();
        config::save(&dir.join("config.json"), &cfg).await.unwrap();
        let engine = IdentityEngine {
            config_path: dir.join("config.json"),
            ssh_config_path: dir.join("ssh_config"),
            gitconfig_path: dir.join("gitconfig"),
            hsm: HsmContext::stub(dir.join("hsm")),
            credential_store: crate::credential::OsCredentialStore::new(),
            gpg: GpgCoordinator::new(),
        };
        AgentProtocolServer::new(engine)
    }

    fn request(id: i64, method: &str) -> String {
        serde_json::json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": {} }).to_string()
    }

    /// Scenario 6 (spec.md §8): `initialize`, then `tools/list` with no
    /// `initialized` notification in between. `tools/list` must still
    /// return the catalog — only `tools/call` is gated on the handshake.
    #[tokio::test]
    async fn tools_list_after_initialize_succeeds_without_the_initialized_notification() {
        let dir = tempfile::tempdir().unwrap();
        let server = test_server(dir.path()).await;

        let init_response = server.handle_line(&request(1, "initialize")).await.unwrap();
        assert_eq!(init_response.id, Some(serde_json::json!(1)));

        let list_response = server.handle_line(&request(2, "tools/list")).await.unwrap();
        let body = serde_json::to_value(&list_response).unwrap();
        assert!(body["result"]["tools"].as_array().is_some());
    }

    /// `tools/call` before the handshake completes is still rejected.
    #[tokio::test]
    async fn tools_call_before_handshake_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let server = test_server(dir.path()).await;

        server.handle_line(&request(1, "initialize")).await;
        let response = server.handle_line(&request(2, "tools/call")).await.unwrap();
        let body = serde_json::to_value(&response).unwrap();
        assert!(body.get("error").is_some());
    }

    /// Three pipelined requests are handled strictly in receive order, so
    /// responses come back tagged with the matching id in the order sent.
    #[tokio::test]
    async fn pipelined_requests_are_answered_in_fifo_order() {
        let dir = tempfile::tempdir().unwrap();
        let server = test_server(dir.path()).await;
        server.handle_line(&request(1, "initialize")).await;

        let mut ids = Vec::new();
        for id in [2, 3, 4] {
            let response = server.handle_line(&request(id, "tools/list")).await.unwrap();
            ids.push(response.id.and_then(|v| v.as_i64()).unwrap());
        }
        assert_eq!(ids, vec![2, 3, 4]);
    }
}
