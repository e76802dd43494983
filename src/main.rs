mod bucket;
mod config;
mod event;
mod filter;
mod index;
mod pool;
mod proto;
mod relay;
mod replaceable;
mod repo;
mod server;
mod ws;

use std::sync::Arc;

use clap::Parser;

use config::Settings;
use relay::Relay;

/// Command line interface entry point.
#[derive(Parser)]
#[command(
    name = "strtr",
    author,
    version,
    about = "In-memory Nostr relay",
    disable_help_flag = true
)]
struct Cli {
    /// Address to bind.
    #[arg(long, short = 'h')]
    host: Option<String>,
    /// TCP port to listen on.
    #[arg(long, short = 'p')]
    port: Option<u16>,
    /// Print help.
    #[arg(long, action = clap::ArgAction::Help)]
    help: Option<bool>,
}

/// Resolve settings and run the relay until shutdown.
async fn run(cli: Cli) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cfg = Settings::resolve(cli.host, cli.port)?;
    let addr = cfg.bind_addr()?;
    let relay = Arc::new(Relay::new(cfg.verify_sig));
    server::serve(addr, relay, std::future::pending()).await
}

#[cfg(not(test))]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    run(Cli::parse()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::ENV_MUTEX;
    use std::time::Duration;
    use tokio::{net::TcpListener, task};

    #[tokio::test]
    async fn run_serves_health_endpoint() {
        let _g = ENV_MUTEX.lock().unwrap();
        for v in ["STRTR_HOST", "STRTR_PORT", "STRTR_VERIFY_SIG"] {
            std::env::remove_var(v);
        }
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let handle = task::spawn(run(Cli {
            host: Some("127.0.0.1".into()),
            port: Some(port),
            help: None,
        }));
        tokio::time::sleep(Duration::from_millis(200)).await;
        let url = format!("http://127.0.0.1:{}/healthz", port);
        let resp = reqwest::get(url).await.unwrap();
        assert!(resp.status().is_success());
        handle.abort();
    }

    #[tokio::test]
    async fn run_rejects_bad_port_env() {
        let _g = ENV_MUTEX.lock().unwrap();
        std::env::set_var("STRTR_PORT", "nope");
        let res = run(Cli {
            host: None,
            port: None,
            help: None,
        })
        .await;
        std::env::remove_var("STRTR_PORT");
        assert!(res.is_err());
    }
}
