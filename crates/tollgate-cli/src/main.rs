//! Tollgate Gateway - multi-tenant API front door

use clap::Parser;
use std::path::PathBuf;
use tollgate_cli::{run_server_with_shutdown, GatewayConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "tollgate-gateway")]
#[command(about = "Multi-tenant API gateway with token auth, CORS and rate limiting")]
#[command(version)]
struct Args {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, env = "TOLLGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(short = 'H', long, env = "TOLLGATE_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "TOLLGATE_PORT")]
    port: Option<u16>,

    /// JWT signing secret
    #[arg(long, env = "JWT_SECRET")]
    jwt_secret: Option<String>,

    /// JSON file of tenant records
    #[arg(long, env = "TOLLGATE_TENANTS_FILE")]
    tenants_file: Option<String>,

    /// Key per-IP limits on the first X-Forwarded-For address
    #[arg(long, env = "TOLLGATE_TRUST_FORWARDED_FOR")]
    trust_forwarded_for: bool,

    /// Enable debug logging
    #[arg(short, long, env = "TOLLGATE_DEBUG")]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "TOLLGATE_JSON_LOGS")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("tollgate_cli={log_level},tollgate_core={log_level},tower_http=info").into()
    });
    let registry = tracing_subscriber::registry().with(filter);
    if args.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    let mut config = GatewayConfig::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if args.jwt_secret.is_some() {
        config.jwt_secret = args.jwt_secret;
    }
    if args.tenants_file.is_some() {
        config.tenants_file = args.tenants_file;
    }
    config.trust_forwarded_for |= args.trust_forwarded_for;

    tracing::info!("Starting Tollgate on {}", config.bind_addr());
    if config.trust_forwarded_for {
        tracing::warn!("Trusting X-Forwarded-For; run only behind a proxy that sets it");
    }

    run_server_with_shutdown(config, async {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
        }
    })
    .await
}
