use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::anyhow;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use convrelay::core::tools::{CurrentTimeTool, ToolRegistry};
use convrelay::{AppState, ServerConfig, routes};

/// convrelay - real-time call relay bridging telephony media streams to a
/// realtime conversational AI service
#[derive(Parser, Debug)]
#[command(name = "convrelay")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Override the listen port
    #[arg(short = 'p', long = "port")]
    port: Option<u16>,

    /// Override the listen host
    #[arg(long = "host")]
    host: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "convrelay=info,tower_http=info".parse().expect("valid filter")),
        )
        .init();

    // Install the crypto provider for the outbound TLS connection to the AI
    // service. Must happen before any TLS connection is attempted.
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let mut config = ServerConfig::from_env().map_err(|e| anyhow!(e.to_string()))?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(host) = cli.host {
        config.host = host;
    }

    if config.openai_api_key.is_none() {
        warn!("OPENAI_API_KEY not set; calls will fail to open the AI link");
    }
    if !config.has_telephony_credentials() {
        warn!("TWILIO_ACCOUNT_SID / TWILIO_AUTH_TOKEN not set; telephony features will be limited");
    }

    // Tools advertised to the AI at session configuration. External
    // capabilities register here.
    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(CurrentTimeTool));
    let tools = Arc::new(tools);

    let address = config.address();
    let public_url = config.public_url.clone();
    let webhook_url = config.voice_webhook_url();

    let app_state = Arc::new(AppState::new(config, tools));
    let supervisor = app_state.supervisor.clone();

    let app = routes::api::create_api_router()
        .merge(routes::relay::create_relay_router())
        .with_state(app_state);

    let socket_addr: SocketAddr = address
        .parse()
        .map_err(|e| anyhow!("Invalid server address '{}': {}", address, e))?;

    info!("convrelay listening on http://{socket_addr}");
    info!("Public URL: {public_url}");
    info!("Configure your phone number's voice webhook: {webhook_url}");

    let listener = TcpListener::bind(&socket_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Drive every active session through teardown before exiting.
    supervisor.shutdown().await;
    info!("Server stopped");

    Ok(())
}

/// Resolves on SIGTERM or ctrl-c.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("ctrl-c received, shutting down"),
        _ = terminate => info!("SIGTERM received, shutting down"),
    }
}
