//! pulsed: heartbeat service registry daemon.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use pulse_core::config::{PulseConfig, TransportSelection};
use pulse_services::{ConnectionManager, LivenessEvaluator, RecordStore, SystemClock};
use pulse_transport::{
    MutualTlsTransport, PlainTransport, RegistryServer, ServerOptions, SetupPolicy, TlsMaterial,
    Transport,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = PulseConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = PulseConfig::load().context("failed to load config")?;
    config.validate().context("invalid configuration")?;

    let make_server_throw = config.registry.make_server_throw();
    let policy_source = match config.registry.make_server_throw {
        Some(_) => "config",
        None => {
            tracing::warn!(
                make_server_throw,
                "registry.make_server_throw is not set, listener setup failures will be fatal"
            );
            "default"
        }
    };

    tracing::info!(
        port = config.registry.port,
        grace_period_secs = config.liveness.grace_period_secs,
        make_server_throw,
        policy_source,
        "pulsed starting"
    );

    // Shared state
    let store = RecordStore::new();
    let manager = ConnectionManager::new(
        store,
        LivenessEvaluator::new(config.liveness.grace_period_secs),
        Arc::new(SystemClock),
    );

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Registry listener ────────────────────────────────────────────────────

    let registry = start_registry(&config, manager.clone(), shutdown_tx.subscribe()).await?;
    let transport = registry.as_ref().map(|(name, _)| *name);

    // ── HTTP API ─────────────────────────────────────────────────────────────

    let api_task = if config.api.enabled {
        let state = pulse_api::ApiState {
            manager: manager.clone(),
            transport,
        };
        let port = config.api.port;
        Some(tokio::spawn(async move {
            if let Err(e) = pulse_api::serve(state, port).await {
                tracing::error!(error = %e, "API server failed");
            }
        }))
    } else {
        None
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    let registry_task = async move {
        match registry {
            Some((_, handle)) => handle.await,
            None => std::future::pending().await,
        }
    };
    let api_task = async move {
        match api_task {
            Some(handle) => handle.await,
            None => std::future::pending().await,
        }
    };

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv() => tracing::info!("shutting down"),
        r = registry_task      => tracing::error!("registry listener exited: {:?}", r),
        r = api_task           => tracing::error!("API server exited: {:?}", r),
    }

    tracing::info!(
        completed_connections = manager.completed_connections(),
        "pulsed stopped"
    );
    Ok(())
}

type RegistryTask = (&'static str, JoinHandle<()>);

/// Build the configured transport, bind it and start accepting.
///
/// `Ok(None)` means setup failed and `make_server_throw` is off: the daemon
/// keeps running without a registry listener.
async fn start_registry(
    config: &PulseConfig,
    manager: ConnectionManager,
    shutdown: broadcast::Receiver<()>,
) -> Result<Option<RegistryTask>> {
    let policy = SetupPolicy::from_make_server_throw(config.registry.make_server_throw());

    let Some(options) = policy
        .resolve(ServerOptions::from_config(&config.registry))
        .context("registry listener setup failed")?
    else {
        return Ok(None);
    };

    match config.transport()? {
        TransportSelection::Plain => {
            spawn_server(PlainTransport, manager, &options, policy, shutdown).await
        }
        TransportSelection::MutualTls {
            cert_file,
            cert_key_file,
            ca,
        } => {
            let transport = TlsMaterial::from_files(&cert_file, &cert_key_file, &ca)
                .and_then(|material| MutualTlsTransport::new(&material));
            match policy
                .resolve(transport)
                .context("registry listener setup failed")?
            {
                Some(transport) => {
                    spawn_server(transport, manager, &options, policy, shutdown).await
                }
                None => Ok(None),
            }
        }
    }
}

async fn spawn_server<T: Transport>(
    transport: T,
    manager: ConnectionManager,
    options: &ServerOptions,
    policy: SetupPolicy,
    shutdown: broadcast::Receiver<()>,
) -> Result<Option<RegistryTask>> {
    let bound = RegistryServer::bind(transport, manager, options).await;
    let Some(server) = policy
        .resolve(bound)
        .context("registry listener setup failed")?
    else {
        return Ok(None);
    };

    let name = server.transport_name();
    Ok(Some((name, tokio::spawn(server.run(shutdown)))))
}
