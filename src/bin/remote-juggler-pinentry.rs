//! `remote-juggler-pinentry` — standalone Assuan pinentry program, invoked
//! by `gpg-agent` via its `pinentry-program` setting instead of the
//! system's default pinentry.

use remote_juggler::config;
use remote_juggler::hsm::HsmContext;
use remote_juggler::pinentry::PinentryPeer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("warn"))
        .with_writer(std::io::stderr)
        .init();

    let config_path = config::config_path()?;
    let cfg = config::load(&config_path).await?;
    let data_dir = config::data_dir()?;
    let hsm = HsmContext::autodetect().await.unwrap_or_else(|_| HsmContext::stub(data_dir.join("stub-sealed")));

    let mut peer = PinentryPeer::new(cfg, hsm);
    peer.run(tokio::io::stdin(), tokio::io::stdout()).await?;
    Ok(())
}
