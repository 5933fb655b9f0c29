use std::{net::SocketAddr, path::Path, sync::Arc, time::Duration};

use backfire::{
    adapters::{
        HttpClientAdapter, HttpHandler, LogAlertDispatcher, MemoryStore, StoreIncidentRecorder,
        StoreMaintenance, WebhookAlertDispatcher, router,
    },
    config::{ServerConfig, ServerConfigValidator, load_config},
    core::{DeceptionService, settings::seed_settings},
    ports::{alert_dispatcher::AlertDispatcher, http_client::HttpClient},
    tracing_setup,
    utils::GracefulShutdown,
};
use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};

/// How often expired store entries are swept
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "config.toml")]
    config: String,

    /// Human-readable logs instead of JSON
    #[clap(long)]
    console_logs: bool,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Start the deception proxy (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    let config_path = match args.command {
        Some(Commands::Validate { config }) => return validate_config_command(&config).await,
        Some(Commands::Init { config }) => return init_config_command(&config).await,
        Some(Commands::Serve { config }) => config,
        None => args.config,
    };

    if args.console_logs {
        tracing_setup::init_console_tracing()
    } else {
        tracing_setup::init_tracing()
    }
    .map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;

    tracing::info!("Loading configuration from {config_path}");
    let config = load_config(&config_path)
        .await
        .with_context(|| format!("Failed to load config from {config_path}"))?;
    ServerConfigValidator::validate(&config).context("Invalid configuration")?;
    let config = Arc::new(config);

    let store = Arc::new(MemoryStore::new());
    if let Some(seed) = &config.security {
        let seeded = seed_settings(store.as_ref(), seed)
            .await
            .context("Failed to seed security settings")?;
        tracing::info!(seeded, "Security settings seed applied");
    } else {
        tracing::warn!("No [security] section configured; all countermeasures start disabled");
    }

    let alerts: Arc<dyn AlertDispatcher> = match &config.alerts.webhook_url {
        Some(url) => Arc::new(
            WebhookAlertDispatcher::new(url, Duration::from_secs(config.alerts.timeout_secs))
                .context("Failed to create webhook alert dispatcher")?,
        ),
        None => Arc::new(LogAlertDispatcher),
    };
    let incidents = Arc::new(StoreIncidentRecorder::new(
        store.clone(),
        config.alerts.incident_capacity,
    ));

    let service = Arc::new(DeceptionService::new(
        config.clone(),
        store.clone(),
        alerts,
        incidents,
    ));

    let http_client: Option<Arc<dyn HttpClient>> = match &config.upstream {
        Some(upstream) => {
            tracing::info!("Forwarding non-deceptive traffic to {upstream}");
            let timeout_secs = config.upstream_timeout_secs.unwrap_or(30);
            Some(Arc::new(
                HttpClientAdapter::new(timeout_secs)
                    .context("Failed to create upstream HTTP client")?,
            ))
        }
        None => {
            tracing::info!("No upstream configured; non-deceptive requests receive 404");
            None
        }
    };

    let graceful_shutdown = Arc::new(GracefulShutdown::new());
    let signal_handler_shutdown = graceful_shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signal_handler_shutdown.run_signal_handler().await {
            tracing::error!("Signal handler error: {}", e);
        }
    });

    let maintenance = StoreMaintenance::new(
        store.clone(),
        service.rate_limiter().cloned(),
        MAINTENANCE_INTERVAL,
    );
    let maintenance_token = graceful_shutdown.shutdown_token();
    let maintenance_handle = tokio::spawn(async move { maintenance.run(maintenance_token).await });

    let http_handler = Arc::new(HttpHandler::new(service, http_client));
    let app = router(http_handler);

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .context("Failed to parse listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    tracing::info!(
        "Backfire listening on {} (callback path: {}, upstream: {})",
        addr,
        config.canary.callback_path,
        config.upstream.as_deref().unwrap_or("none")
    );

    let shutdown_signal = graceful_shutdown.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let reason = shutdown_signal.wait_for_shutdown_signal().await;
        tracing::info!("Shutdown signal received: {:?}", reason);
    })
    .await
    .context("Server error")?;

    if let Err(e) = maintenance_handle.await {
        tracing::warn!("Store maintenance task ended abnormally: {}", e);
    }
    tracing::info!("Graceful shutdown completed");
    Ok(())
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config: ServerConfig = match load_config(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e}");
            std::process::exit(1);
        }
    };

    match ServerConfigValidator::validate(&config) {
        Ok(()) => {
            let settings = config.security.unwrap_or_default();
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Listen Address: {}", config.listen_addr);
            println!(
                "   • Upstream: {}",
                config.upstream.as_deref().unwrap_or("none (404)")
            );
            println!("   • Canary Callback: {}", config.canary.callback_path);
            println!("   • SQL Backfire: {}", settings.sql_backfire_enabled);
            println!("   • Canary Documents: {}", settings.canary_documents_enabled);
            println!("   • Log Poisoning: {}", settings.log_poisoning_enabled);
            println!(
                "   • Alert Webhook: {}",
                config.alerts.webhook_url.is_some()
            );
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Ensure upstream and webhook URLs start with http:// or https://");
            println!("   • Verify listen address format (e.g., '127.0.0.1:3000')");
            println!("   • Ensure the canary callback path starts with '/'");
            println!("   • Ensure rate limit periods use valid units (s, m, h)");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# Backfire Configuration

# The address to listen on
listen_addr = "127.0.0.1:8080"

# Application receiving non-deceptive traffic (omit to answer 404)
# upstream = "http://127.0.0.1:3000"

[identity]
# Change this: client IPs are only ever stored as salted hashes
ip_hash_salt = "change-me"
# Set when running behind a proxy that sets X-Forwarded-For
trust_forwarded_headers = false

[canary]
token_ttl_secs = 2592000
callback_path = "/api/canary-callback"

[alerts]
log_capacity = 500
# webhook_url = "https://hooks.slack.com/services/..."

[threat]
flag_ttl_secs = 604800

# [rate_limit]
# requests = 100
# period = "1m"

# Written to the settings store at first start; later edits go to the store
[security]
sql_backfire_enabled = true
sql_backfire_on_scanner_detection = true
sql_backfire_on_honeytoken_access = true
canary_documents_enabled = true
canary_phone_home_on_open = true
canary_collect_fingerprint = true
canary_alert_on_callback = true
log_poisoning_enabled = true
log_poison_fake_headers = true
log_poison_terminal_escape = false
log_poison_fake_paths = true
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'backfire serve --config {config_path}' to start the server");
    Ok(())
}
