use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;

use lib_common::connections::EventLog;
use lib_common::ingestors::StompWssIngestor;
use lib_common::{EventSink, SensorState};

mod sensor_logic;
use sensor_logic::{config, downstream, logger};

/// Builds the event log pool. An unusable URL is fatal; an unreachable database is not.
async fn open_event_log(settings: &config::Settings) -> Result<Option<Arc<dyn EventSink>>> {
    let Some(url) = settings.database_url.as_deref() else {
        log::warn!("DATABASE_URL is not set, readings will not be persisted.");
        return Ok(None);
    };

    let event_log = EventLog::connect(url, &settings.event_log)
        .context("Invalid database configuration")?;
    match event_log.ensure_schema().await {
        Ok(()) => log::info!("Event log ready."),
        Err(e) => log::error!("Failed to prepare the event log table: {}", e),
    }
    Ok(Some(Arc::new(event_log)))
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term_signal) => {
                tokio::select! {
                    _ = signal::ctrl_c() => log::info!("Ctrl-C received, initiating shutdown."),
                    _ = term_signal.recv() => log::info!("SIGTERM received, initiating shutdown."),
                }
            }
            Err(e) => {
                log::warn!("Cannot listen for SIGTERM: {}", e);
                let _ = signal::ctrl_c().await;
                log::info!("Ctrl-C received, initiating shutdown.");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
        log::info!("Ctrl-C received, initiating shutdown.");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = config::load_config();
    logger::setup_logging(&settings.log_dir, &settings.log_level)?;
    log::info!("Starting sensor relay on port {}", settings.port);

    let sink = open_event_log(&settings).await?;
    let state = Arc::new(SensorState::new(sink, settings.state));

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);

    let ingestor = StompWssIngestor::new(settings.upstream.clone(), state.clone());
    let upstream_rx = shutdown_tx.subscribe();
    let upstream_handle = tokio::spawn(async move { ingestor.run(upstream_rx).await });

    let mut downstream_handle = tokio::spawn(downstream::run(settings.port, state.clone(), shutdown_tx.subscribe()));

    // A downstream that fails to bind ends the process instead of idling on the signal
    tokio::select! {
        _ = wait_for_signal() => {}
        res = &mut downstream_handle => {
            let _ = shutdown_tx.send(());
            let _ = upstream_handle.await;
            return match res {
                Ok(inner) => inner,
                Err(e) => Err(e.into()),
            };
        }
    }

    // Send shutdown signal to all components
    let _ = shutdown_tx.send(());

    // Wait for components to shut down
    let (upstream_res, downstream_res) = tokio::join!(upstream_handle, downstream_handle);
    if let Err(e) = upstream_res {
        log::error!("Upstream task failed: {}", e);
    }
    match downstream_res {
        Ok(Err(e)) => log::error!("Downstream server failed: {}", e),
        Err(e) => log::error!("Downstream task failed: {}", e),
        Ok(Ok(())) => {}
    }

    log::info!("Shutdown complete.");
    Ok(())
}
