use anyhow::Result;
use std::path::PathBuf;
use tracing::{error, info};

use suiren::{config::Config, PointsApp};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first so the configured log level can seed the
    // subscriber; RUST_LOG still wins when set.
    let (config, config_source) = load_config().await?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .init();

    info!("Starting suiren server...");
    match &config_source {
        Some(path) => info!("Loaded configuration from: {}", path.display()),
        None => info!("No configuration file found, using defaults"),
    }

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    // Create and run the application
    let app = PointsApp::new(config).await?;

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    // Handle shutdown signals
    let app_clone = app.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal, initiating graceful shutdown...");
                let _ = shutdown_tx.send(());
                if let Err(e) = app_clone.shutdown().await {
                    error!("Error during shutdown: {}", e);
                }
            }
            Err(e) => {
                error!("Failed to listen for shutdown signal: {}", e);
            }
        }
    });

    // Run the application with shutdown handler
    app.run_with_shutdown(shutdown_rx).await?;

    info!("suiren server stopped gracefully");
    Ok(())
}

/// Load configuration from file or use defaults
async fn load_config() -> Result<(Config, Option<PathBuf>)> {
    // Look for config in standard locations
    let config_paths = vec![
        PathBuf::from("./suiren.toml"),
        PathBuf::from("/etc/suiren/suiren.toml"),
        dirs::config_dir()
            .map(|d| d.join("suiren/suiren.toml"))
            .unwrap_or_default(),
    ];

    for path in config_paths {
        if path.exists() {
            let content = tokio::fs::read_to_string(&path).await?;
            let config: Config = toml::from_str(&content)?;
            return Ok((config, Some(path)));
        }
    }

    Ok((Config::default(), None))
}
