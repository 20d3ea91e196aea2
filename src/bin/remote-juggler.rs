//! `remote-juggler` — CLI entry point, also doubling as the MCP/ACP
//! agent-protocol server when invoked with `--mode mcp` or `--mode acp`.
//!
//! Logging setup is carried over from the teacher's `bin/hyperforge.rs`:
//! `tracing-subscriber` with an `EnvFilter`, routed to stderr whenever
//! stdout is the protocol wire (here: both server modes, not just one).

use clap::Parser;
use std::io::Read;
use std::sync::Arc;

use remote_juggler::agent_protocol::AgentProtocolServer;
use remote_juggler::cli::{Cli, Command, RunMode};
use remote_juggler::config;
use remote_juggler::credential::OsCredentialStore;
use remote_juggler::error::Result;
use remote_juggler::gpg::GpgCoordinator;
use remote_juggler::hsm::HsmContext;
use remote_juggler::identity_engine::{IdentityEngine, SwitchOptions};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let is_server_mode = matches!(cli.mode, RunMode::Mcp | RunMode::Acp);
    let default_filter = if cli.verbose { "debug,remote_juggler=trace" } else { "warn,remote_juggler=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => config::config_path()?,
    };
    let data_dir = config::data_dir()?;

    let hsm = HsmContext::autodetect().await.unwrap_or_else(|_| HsmContext::stub(data_dir.join("stub-sealed")));
    let engine = IdentityEngine {
        config_path,
        ssh_config_path: dirs::home_dir().unwrap_or_default().join(".ssh").join("config"),
        gitconfig_path: dirs::home_dir().unwrap_or_default().join(".gitconfig"),
        hsm,
        credential_store: OsCredentialStore::new(),
        gpg: GpgCoordinator::new(),
    };

    match cli.mode {
        RunMode::Cli => run_cli(engine, cli.command).await,
        RunMode::Mcp | RunMode::Acp => run_server(engine).await,
    }
}

async fn run_server(engine: IdentityEngine) -> anyhow::Result<()> {
    tracing::info!("remote-juggler agent-protocol server starting on stdio");
    let server = AgentProtocolServer::new(engine);
    let server = Arc::new(server);

    tokio::select! {
        result = server.serve(tokio::io::stdin(), tokio::io::stdout()) => result.map_err(anyhow::Error::from),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
            Ok(())
        }
    }
}

async fn run_cli(engine: IdentityEngine, command: Option<Command>) -> anyhow::Result<()> {
    let Some(command) = command else {
        eprintln!("no subcommand given; try `remote-juggler --help`");
        std::process::exit(1);
    };

    let result: Result<()> = async {
        match command {
            Command::List { provider } => {
                let filter = provider.as_deref().and_then(parse_provider);
                for identity in engine.list(filter).await? {
                    println!("{}", identity.format());
                }
                Ok(())
            }
            Command::Detect { repo_path } => {
                match engine.detect(&repo_path).await? {
                    Some(name) => println!("{name}"),
                    None => println!("(no match)"),
                }
                Ok(())
            }
            Command::Switch { identity, repo_path, set_remote, configure_gpg } => {
                let options = SwitchOptions { set_remote, configure_gpg, repo_path: Some(repo_path) };
                let report = engine.switch(&identity, options).await?;
                println!("{}", report.format());
                Ok(())
            }
            Command::Status { repo_path } => {
                let report = engine.status(&repo_path).await?;
                println!("{}", report.format());
                Ok(())
            }
            Command::Validate { identity } => {
                let outcome = engine.validate(&identity).await?;
                println!("{outcome:?}");
                Ok(())
            }
            Command::StoreToken { identity, token } => {
                let token = token.unwrap_or_else(read_token_from_stdin);
                let token = remote_juggler::credential::Token::new(
                    token,
                    remote_juggler::credential::TokenSourceKind::OsKeychain,
                );
                engine.store_token(&identity, token).await?;
                println!("stored token for {identity:?}");
                Ok(())
            }
            Command::SyncConfig { dry_run } => {
                let report = engine.sync_config(dry_run).await?;
                println!("{}", report.format());
                Ok(())
            }
            Command::GpgStatus { identity } => {
                let cfg = engine.load_config().await?;
                let Some(identity) = cfg.identities.get(&identity) else {
                    println!("no such identity: {identity:?}");
                    return Ok(());
                };
                match engine.gpg.card_status(identity).await {
                    Ok(status) => println!("{status:?}"),
                    Err(e) => println!("card status unavailable: {e}"),
                }
                Ok(())
            }
            Command::SealPin { identity, pin } => {
                let pin = pin.unwrap_or_else(read_token_from_stdin);
                engine.seal_pin(&identity, pin.as_bytes()).await?;
                println!("sealed PIN for {identity:?}");
                Ok(())
            }
            Command::UnsealPin { identity } => {
                let exists = engine.hsm.pin_exists(&identity).await?;
                println!("sealed PIN present: {exists}");
                Ok(())
            }
            Command::ClearPin { identity } => {
                engine.clear_pin(&identity).await?;
                println!("cleared PIN for {identity:?}");
                Ok(())
            }
            Command::SecurityMode { identity, mode } => {
                let mut cfg = engine.load_config().await?;
                let Some(entry) = cfg.identities.get_mut(&identity) else {
                    println!("no such identity: {identity:?}");
                    return Ok(());
                };
                if let Some(mode) = mode {
                    entry.gpg.security_mode = parse_security_mode(&mode);
                    config::save(&engine.config_path, &cfg).await?;
                    println!("set security mode for {identity:?} to {mode}");
                } else {
                    println!("{:?}", entry.gpg.security_mode);
                }
                Ok(())
            }
            Command::Yubikey { identity } => {
                let cfg = engine.load_config().await?;
                let Some(identity) = cfg.identities.get(&identity) else {
                    println!("no such identity: {identity:?}");
                    return Ok(());
                };
                println!("hardware security key: {}", identity.is_security_key());
                Ok(())
            }
            Command::TrustedWorkstation { identity } => {
                let mut cfg = engine.load_config().await?;
                let Some(entry) = cfg.identities.get_mut(&identity) else {
                    println!("no such identity: {identity:?}");
                    return Ok(());
                };
                entry.gpg.security_mode = Some(remote_juggler::config::SecurityMode::TrustedWorkstation);
                config::save(&engine.config_path, &cfg).await?;
                println!("set security mode for {identity:?} to trusted-workstation");
                Ok(())
            }
            Command::Setup => {
                println!("interactive setup is not implemented in this release; edit the config file directly");
                Ok(())
            }
            Command::Debug => {
                println!("config path:  {}", engine.config_path.display());
                println!("ssh config:   {}", engine.ssh_config_path.display());
                println!("gitconfig:    {}", engine.gitconfig_path.display());
                println!("hsm method:   {:?}", engine.hsm.method());
                Ok(())
            }
        }
    }
    .await;

    match result {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(e.exit_code());
        }
    }
}

fn read_token_from_stdin() -> String {
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf).unwrap_or_default();
    buf.trim().to_string()
}

fn parse_provider(raw: &str) -> Option<remote_juggler::config::ForgeProvider> {
    use remote_juggler::config::ForgeProvider::*;
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

fn parse_security_mode(raw: &str) -> Option<remote_juggler::config::SecurityMode> {
    remote_juggler::config::SecurityMode::parse(raw)
}
