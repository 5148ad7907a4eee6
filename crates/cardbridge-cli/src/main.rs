//! `cardbridge` binary.
//!
//! Runs the card reader bridge, or exercises the backend with a known test
//! card (`cardbridge test`). Every option falls back to the environment
//! variable of the same name, then to the built-in default.

use std::net::IpAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cardbridge_backend::{BackendClient, HttpBackendClient, PaymentRequest};
use cardbridge_core::{Amount, BridgeConfig, CardId, Pin};
use cardbridge_hardware::{AnyLineSource, MockLineSource, SerialConfig, SerialLineSource};
use cardbridge_network::{Broadcaster, LogSubscriber, PeerForwarder, ServerConfig, server};
use cardbridge_service::BridgeService;
use cardbridge_storage::{Database, DatabaseConfig, SqliteReadingLogRepository};

#[derive(Parser, Debug)]
#[command(name = "cardbridge")]
#[command(about = "RFID card reader and keypad bridge", long_about = None)]
#[command(version)]
struct Cli {
    /// Serial device path of the reader
    #[arg(long, env = "SERIAL_PORT", global = true)]
    serial_port: Option<String>,

    /// Serial baud rate
    #[arg(long, env = "BAUD_RATE", global = true)]
    baud_rate: Option<u32>,

    /// Backend base URL
    #[arg(long, env = "API_BASE_URL", global = true)]
    api_base_url: Option<String>,

    /// Bearer token for backend requests
    #[arg(long, env = "API_TOKEN", global = true, hide_env_values = true)]
    api_token: Option<String>,

    /// Bind address of the real-time server
    #[arg(long, env = "WS_BIND", global = true)]
    ws_bind: Option<IpAddr>,

    /// Port of the real-time server
    #[arg(long, env = "WS_PORT", global = true)]
    ws_port: Option<u16>,

    /// Upstream WebSocket peer that receives every notification
    #[arg(long, env = "PEER_URL", global = true)]
    peer_url: Option<String>,

    /// SQLite file for the reading log
    #[arg(long, env = "READINGS_DB", global = true)]
    readings_db: Option<String>,

    /// Lifetime of a verified session, in seconds
    #[arg(long, env = "SESSION_TTL_SECS", global = true)]
    session_ttl_secs: Option<u64>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the bridge (default)
    Run {
        /// Log every notification to the console
        #[arg(long)]
        console: bool,

        /// Read device lines from stdin instead of the serial port
        #[arg(long)]
        stdin: bool,
    },

    /// Verify a test card and make a small payment against the backend
    Test {
        /// Card to verify
        #[arg(long, default_value = "RF001234")]
        card_id: String,

        /// PIN of the test card
        #[arg(long, default_value = "123456")]
        pin: String,

        /// Amount to charge
        #[arg(long, default_value_t = 1000)]
        amount: u64,
    },
}

impl Cli {
    /// Environment configuration with command line overrides applied.
    fn bridge_config(&self) -> Result<BridgeConfig> {
        let mut config = BridgeConfig::from_env().context("Invalid environment configuration")?;

        if let Some(port) = &self.serial_port {
            config.serial_port = port.clone();
        }
        if let Some(baud) = self.baud_rate {
            config.baud_rate = baud;
        }
        if let Some(url) = &self.api_base_url {
            config.api_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(token) = self.api_token.as_ref().filter(|t| !t.is_empty()) {
            config.api_token = Some(token.clone());
        }
        if let Some(bind) = self.ws_bind {
            config.ws_bind = bind;
        }
        if let Some(port) = self.ws_port {
            config.ws_port = port;
        }
        if let Some(url) = &self.peer_url {
            config.peer_url = Some(url.clone());
        }
        if let Some(path) = &self.readings_db {
            config.readings_db = Some(path.clone());
        }
        if let Some(secs) = self.session_ttl_secs {
            config.session_ttl = std::time::Duration::from_secs(secs);
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = cli.bridge_config()?;

    match cli.command {
        None => run(config, false, false).await,
        Some(Command::Run { console, stdin }) => run(config, console, stdin).await,
        Some(Command::Test {
            card_id,
            pin,
            amount,
        }) => smoke_test(&config, CardId::new(card_id), Pin::new(pin), amount).await,
    }
}

async fn run(config: BridgeConfig, console: bool, stdin: bool) -> Result<()> {
    info!(
        version = cardbridge_core::VERSION,
        api = %config.api_base_url,
        "Starting card bridge"
    );

    let source: AnyLineSource = if stdin {
        let (source, handle) = MockLineSource::new();
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if handle.send_line(line).await.is_err() {
                    break;
                }
            }
        });
        info!("Reading device lines from stdin");
        source.into()
    } else {
        SerialLineSource::open(SerialConfig::from(&config))
            .with_context(|| format!("Failed to open serial port {}", config.serial_port))?
            .into()
    };

    let backend = HttpBackendClient::from_config(&config).context("Failed to build backend client")?;
    check_backend(&backend).await;

    let broadcaster = Arc::new(Broadcaster::new());
    if console {
        broadcaster.subscribe(LogSubscriber);
    }

    let mut service =
        BridgeService::new(backend, Arc::clone(&broadcaster)).with_session_ttl(config.session_ttl);

    let database = match &config.readings_db {
        Some(path) => {
            let db = Database::new(DatabaseConfig::new(path.as_str()))
                .await
                .with_context(|| format!("Failed to open reading log {path}"))?;
            service = service.with_reading_log(SqliteReadingLogRepository::new(db.pool().clone()));
            info!(path = %path, "Reading log enabled");
            Some(db)
        }
        None => None,
    };

    let (handle, mut actor) = service.spawn(source);

    let server = server::start(
        ServerConfig::from_config(&config),
        Arc::clone(&broadcaster),
        handle.clone(),
    )
    .await
    .context("Failed to start real-time server")?;

    let peer = config.peer_url.as_ref().map(|url| {
        info!(url = %url, "Forwarding notifications to peer");
        PeerForwarder::new(url.as_str()).spawn(&broadcaster)
    });

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            info!("Shutting down");
        }
        _ = &mut actor => {
            warn!("Bridge service stopped");
        }
    }

    if let Some((id, task)) = peer {
        broadcaster.unsubscribe(id);
        task.abort();
    }
    server.shutdown();
    actor.abort();
    drop(handle);
    if let Some(db) = database {
        db.close().await;
    }

    Ok(())
}

/// Check the backend once. The bridge starts either way.
async fn check_backend(backend: &HttpBackendClient) -> bool {
    match backend.health_check().await {
        Ok(()) => {
            info!(api = %backend.base_url(), "Backend reachable");
            true
        }
        Err(e) => {
            warn!(api = %backend.base_url(), error = %e, "Backend health check failed");
            false
        }
    }
}

async fn smoke_test(config: &BridgeConfig, card_id: CardId, pin: Pin, amount: u64) -> Result<()> {
    let amount = Amount::new(amount).context("Invalid test amount")?;
    let backend = HttpBackendClient::from_config(config).context("Failed to build backend client")?;

    println!("Backend: {}", backend.base_url());
    if !check_backend(&backend).await {
        println!("Backend health check failed, trying anyway");
    }
    println!();

    println!("Verifying card {card_id} with PIN {}", pin.masked());
    let verify = backend.verify(&card_id, &pin).await;
    print_response(&verify)?;
    if !verify.success {
        println!("Verification failed, skipping payment");
        return Ok(());
    }

    println!();
    println!("Charging {amount} to card {card_id}");
    let payment = backend
        .pay(&PaymentRequest {
            card_id,
            pin,
            amount,
            description: "Bridge smoke test".to_string(),
        })
        .await;
    print_response(&payment)?;

    Ok(())
}

fn print_response(response: &cardbridge_core::ApiResponse) -> Result<()> {
    let status = if response.success { "OK" } else { "FAILED" };
    println!("  Result:  {status}");
    if let Some(message) = &response.message {
        println!("  Message: {message}");
    }
    if let Some(data) = &response.data {
        println!("  Data:    {}", serde_json::to_string_pretty(data)?);
    }
    Ok(())
}
