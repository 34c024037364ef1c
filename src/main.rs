use anyhow::{Context, Result};
use hass_bridge::bridge::Bridge;
use hass_bridge::config::{default_config_path, load_config, BridgeConfig};
use hass_bridge::host::HostIdentity;
use hass_bridge::integrations::start_integrations;
use hass_bridge::mqtt::{ConnectionState, MemoryOutbound, MqttDriver, Transport};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hass_bridge=info".into()),
        )
        .init();

    info!("hass-bridge starting...");

    let config_path = default_config_path();
    let mut config = if config_path.exists() {
        load_config(&config_path)?
    } else {
        warn!(path = %config_path.display(), "Config file not found, using defaults");
        BridgeConfig::default()
    };
    config.apply_env();

    let host = HostIdentity::resolve(&config.host);
    info!(
        hostname = %host.hostname(),
        discovery_prefix = %host.discovery_prefix(),
        broker = %format!("{}:{}", config.mqtt.host, config.mqtt.port),
        dry_run = config.mqtt.dry_run,
        scripts = config.scripts.len(),
        "Configuration loaded"
    );

    // Transport: a real broker connection, or a logging stand-in for dry runs
    let (transport, driver) = if config.mqtt.dry_run {
        let transport = Transport::new(Arc::new(MemoryOutbound::log_only()));
        (transport, None)
    } else {
        let (transport, driver) = MqttDriver::connect(&config.mqtt, &host);
        (transport, Some(driver))
    };

    let bridge = Arc::new(Bridge::new(host, transport.clone()));
    let integrations = start_integrations(bridge.context(), &config);

    let lifecycle = Arc::clone(&bridge);
    let lifecycle_handle = tokio::spawn(async move { lifecycle.run().await });

    let (shutdown, driver_handle) = match driver {
        Some(driver) => {
            let shutdown = driver.shutdown_handle();
            let handle = tokio::spawn(async move {
                if let Err(e) = driver.run().await {
                    tracing::error!(error = %e, "MQTT driver error");
                }
            });
            (Some(shutdown), Some(handle))
        }
        None => {
            info!("Dry run: publishes are logged, no broker connection");
            transport.set_state(ConnectionState::Connected);
            (None, None)
        }
    };

    // Wait for shutdown, handling reconnect requests meanwhile
    let mut reconnect = signal(SignalKind::user_defined1())
        .context("Failed to listen for SIGUSR1")?;
    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?;

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for ctrl_c signal")?;
                break;
            }
            _ = terminate.recv() => break,
            _ = reconnect.recv() => {
                transport.request_reconnect();
            }
        }
    }

    info!("Shutdown signal received");

    // Graceful shutdown
    for integration in &integrations {
        integration.shutdown();
    }

    if let (Some(shutdown), Some(handle)) = (shutdown, driver_handle) {
        shutdown.shutdown();
        if let Err(e) = handle.await {
            warn!(error = %e, "MQTT driver task failed");
        }
    }

    lifecycle_handle.abort();
    drop(integrations);
    info!("hass-bridge stopped");

    Ok(())
}
