//! Stable tool catalog (spec.md §4.10) — one entry per identity-engine
//! operation. Tool names use the `juggler_` prefix with underscore-joined
//! words (`juggler_switch`, `juggler_list_identities`,
//! `juggler_detect_identity`, ...) to satisfy the concrete naming asserted
//! by the agent-protocol testable-property scenario in spec.md §8 while
//! keeping the catalog internally consistent; see DESIGN.md.
//!
//! JSON schemas are derived with `schemars` from each operation's parameter
//! struct so the advertised schema and the actual deserialization target
//! can never drift apart.

use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::rpc::{Request, Response};
use crate::identity_engine::{IdentityEngine, SwitchOptions};

pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub schema: fn() -> Value,
}

macro_rules! schema_of {
    ($ty:ty) => {
        || serde_json::to_value(schemars::schema_for!($ty)).unwrap_or(json!({}))
    };
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ListIdentitiesParams {
    #[serde(default)]
    provider: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct DetectIdentityParams {
    #[serde(default)]
    repo_path: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct SwitchParams {
    identity: String,
    #[serde(default)]
    repo_path: Option<String>,
    #[serde(default)]
    set_remote: bool,
    #[serde(default)]
    configure_gpg: bool,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct StatusParams {
    #[serde(default)]
    repo_path: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ValidateParams {
    identity: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct StoreTokenParams {
    identity: String,
    token: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct SyncConfigParams {
    #[serde(default)]
    dry_run: bool,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct PinParams {
    identity: String,
    #[serde(default)]
    pin: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct SecurityModeParams {
    identity: String,
    #[serde(default)]
    mode: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct SetupParams {}

pub const CATALOG: &[ToolSpec] = &[
    ToolSpec { name: "juggler_list_identities", description: "Enumerate configured identities", schema: schema_of!(ListIdentitiesParams) },
    ToolSpec { name: "juggler_detect_identity", description: "Detect the intended identity for a repository", schema: schema_of!(DetectIdentityParams) },
    ToolSpec { name: "juggler_switch", description: "Switch the active identity", schema: schema_of!(SwitchParams) },
    ToolSpec { name: "juggler_status", description: "Report the active and detected identity", schema: schema_of!(StatusParams) },
    ToolSpec { name: "juggler_validate", description: "Validate SSH and credential reachability for an identity", schema: schema_of!(ValidateParams) },
    ToolSpec { name: "juggler_store_token", description: "Store a forge API token for an identity", schema: schema_of!(StoreTokenParams) },
    ToolSpec { name: "juggler_sync_config", description: "Regenerate managed SSH/gitconfig blocks", schema: schema_of!(SyncConfigParams) },
    ToolSpec { name: "juggler_gpg_status", description: "Query signing-agent and card status", schema: schema_of!(ValidateParams) },
    ToolSpec { name: "juggler_pin_store", description: "Seal a smartcard PIN into the HSM", schema: schema_of!(PinParams) },
    ToolSpec { name: "juggler_pin_clear", description: "Clear a sealed PIN", schema: schema_of!(PinParams) },
    ToolSpec { name: "juggler_pin_status", description: "Check whether a sealed PIN exists", schema: schema_of!(PinParams) },
    ToolSpec { name: "juggler_security_mode", description: "Get or set an identity's security mode", schema: schema_of!(SecurityModeParams) },
    ToolSpec { name: "juggler_setup", description: "Interactive first-run setup", schema: schema_of!(SetupParams) },
];

pub fn handle_list(request: &Request) -> Response {
    let tools: Vec<Value> = CATALOG
        .iter()
        .map(|tool| json!({ "name": tool.name, "description": tool.description, "inputSchema": (tool.schema)() }))
        .collect();
    Response::success(request.id.clone(), json!({ "tools": tools }))
}

fn text_content(text: String) -> Value {
    json!({ "content": [{ "type": "text", "text": text }] })
}

fn error_content(text: String) -> Value {
    json!({ "content": [{ "type": "text", "text": text }], "isError": true })
}

pub async fn handle_call(engine: &Arc<IdentityEngine>, request: &Request) -> Response {
    let name = request.params.get("name").and_then(Value::as_str).unwrap_or_default();
    let arguments = request.params.get("arguments").cloned().unwrap_or(json!({}));

    let result = dispatch(engine, name, arguments).await;
    match result {
        Ok(text) => Response::success(request.id.clone(), text_content(text)),
        Err(e) => Response::success(request.id.clone(), error_content(e.to_string())),
    }
}

async fn dispatch(engine: &Arc<IdentityEngine>, name: &str, arguments: Value) -> crate::error::Result<String> {
    match name {
        "juggler_list_identities" => {
            let params: ListIdentitiesParams = serde_json::from_value(arguments).unwrap_or(ListIdentitiesParams { provider: None });
            let provider = params.provider.and_then(|p| parse_provider(&p));
            let identities = engine.list(provider).await?;
            Ok(identities.iter().map(|i| i.format()).collect::<Vec<_>>().join("\n"))
        }
        "juggler_detect_identity" => {
            let params: DetectIdentityParams = serde_json::from_value(arguments).unwrap_or(DetectIdentityParams { repo_path: None });
            let path = repo_path_or_cwd(params.repo_path);
            let detected = engine.detect(&path).await?;
            Ok(detected.unwrap_or_else(|| "(no match)".to_string()))
        }
        "juggler_switch" => {
            let params: SwitchParams = serde_json::from_value(arguments)
                .map_err(|e| crate::error::ProtocolError::Malformed(e.to_string()))?;
            let options = SwitchOptions {
                set_remote: params.set_remote,
                configure_gpg: params.configure_gpg,
                repo_path: params.repo_path.map(std::path::PathBuf::from),
            };
            let report = engine.switch(&params.identity, options).await?;
            Ok(report.format())
        }
        "juggler_status" => {
            let params: StatusParams = serde_json::from_value(arguments).unwrap_or(StatusParams { repo_path: None });
            let path = repo_path_or_cwd(params.repo_path);
            let report = engine.status(&path).await?;
            Ok(report.format())
        }
        "juggler_validate" => {
            let params: ValidateParams = serde_json::from_value(arguments)
                .map_err(|e| crate::error::ProtocolError::Malformed(e.to_string()))?;
            let outcome = engine.validate(&params.identity).await?;
            Ok(format!("{outcome:?}"))
        }
        "juggler_gpg_status" => {
            let params: ValidateParams = serde_json::from_value(arguments)
                .map_err(|e| crate::error::ProtocolError::Malformed(e.to_string()))?;
            let cfg = engine.load_config().await?;
            let identity = cfg
                .identities
                .get(&params.identity)
                .ok_or_else(|| crate::error::IdentityError::NotFound(params.identity.clone()))?;
            let status = engine.gpg.card_status(identity).await?;
            Ok(format!("{status:?}"))
        }
        "juggler_store_token" => {
            let params: StoreTokenParams = serde_json::from_value(arguments)
                .map_err(|e| crate::error::ProtocolError::Malformed(e.to_string()))?;
            let token = crate::credential::Token::new(params.token, crate::credential::TokenSourceKind::OsKeychain);
            engine.store_token(&params.identity, token).await?;
            Ok(format!("stored token for {:?}", params.identity))
        }
        "juggler_sync_config" => {
            let params: SyncConfigParams = serde_json::from_value(arguments).unwrap_or(SyncConfigParams { dry_run: false });
            let report = engine.sync_config(params.dry_run).await?;
            Ok(report.format())
        }
        "juggler_pin_store" => {
            let params: PinParams = serde_json::from_value(arguments)
                .map_err(|e| crate::error::ProtocolError::Malformed(e.to_string()))?;
            let pin = params.pin.unwrap_or_default();
            engine.seal_pin(&params.identity, pin.as_bytes()).await?;
            Ok(format!("sealed PIN for {:?}", params.identity))
        }
        "juggler_pin_clear" => {
            let params: PinParams = serde_json::from_value(arguments)
                .map_err(|e| crate::error::ProtocolError::Malformed(e.to_string()))?;
            engine.clear_pin(&params.identity).await?;
            Ok(format!("cleared PIN for {:?}", params.identity))
        }
        "juggler_pin_status" => {
            let params: PinParams = serde_json::from_value(arguments)
                .map_err(|e| crate::error::ProtocolError::Malformed(e.to_string()))?;
            let exists = engine.hsm.pin_exists(&params.identity).await?;
            Ok(exists.to_string())
        }
        "juggler_security_mode" => {
            let params: SecurityModeParams = serde_json::from_value(arguments)
                .map_err(|e| crate::error::ProtocolError::Malformed(e.to_string()))?;
            let mut cfg = engine.load_config().await?;
            let entry = cfg
                .identities
                .get_mut(&params.identity)
                .ok_or_else(|| crate::error::IdentityError::NotFound(params.identity.clone()))?;
            match params.mode {
                Some(mode) => {
                    let parsed = crate::config::SecurityMode::parse(&mode).ok_or_else(|| {
                        crate::error::ProtocolError::Malformed(format!("unrecognized security mode {mode:?}"))
                    })?;
                    entry.gpg.security_mode = Some(parsed);
                    engine.save_config(&cfg).await?;
                    Ok(format!("set security mode for {:?} to {mode}", params.identity))
                }
                None => Ok(format!("{:?}", entry.gpg.security_mode)),
            }
        }
        "juggler_setup" => {
            let _: SetupParams = serde_json::from_value(arguments).unwrap_or(SetupParams {});
            Ok("interactive setup is not implemented in this release; edit the config file directly".to_string())
        }
        other => return Err(crate::error::ProtocolError::UnknownMethod(other.to_string()).into()),
    }
}

fn parse_provider(raw: &str) -> Option<crate::config::ForgeProvider> {
    use crate::config::ForgeProvider::*;
    match raw.to_lowercase().as_str() {
        "gitlab" => Some(Gitlab),
        "github" => Some(Github),
        "bitbucket" => Some(Bitbucket),
        "codeberg" => Some(Codeberg),
        "azure" => Some(Azure),
        "custom" => Some(Custom),
        _ => None,
    }
}

fn repo_path_or_cwd(raw: Option<String>) -> std::path::PathBuf {
    raw.map(std::path::PathBuf::from).unwrap_or_else(|| std::env::current_dir().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_contains_the_documented_stable_names() {
        let names: Vec<&str> = CATALOG.iter().map(|t| t.name).collect();
        for expected in ["juggler_switch", "juggler_list_identities", "juggler_detect_identity"] {
            assert!(names.contains(&expected), "missing {expected}");
        }
    }
}
