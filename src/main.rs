//! trip-billing-daemon: dry-run host for the billing controller
//!
//! Reads newline-delimited JSON trip events from stdin, for example
//! `{"type":"mode_changed","mode":"active_guidance"}`, applies them to a
//! billing controller backed by the in-memory gateway, and logs every
//! billing decision. Stops on EOF, SIGINT or SIGTERM, stopping any
//! session that is still open.

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use trip_billing::lifecycle::ShutdownSignal;
use trip_billing::{
    BillingController, BillingError, BillingEvent, BillingHandle, Config, EnvCredential,
    InMemoryGateway, SessionStateMachine, TripEvent,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "trip-billing-daemon starting"
    );

    // Load configuration
    let config = Config::load()?;
    info!(?config.billing, credential_var = %config.credential_var, "configuration loaded");

    let shutdown = ShutdownSignal::new();

    // State machine -> log (billing explanations)
    let (event_tx, mut event_rx) = broadcast::channel::<BillingEvent>(config.billing.event_capacity);

    let gateway = InMemoryGateway::new();
    let credentials = EnvCredential::new(&config.credential_var);
    let (machine, reports) =
        SessionStateMachine::new(gateway.clone(), credentials, config.billing.clone(), event_tx);
    let (handle, controller) = BillingController::attach(machine, reports)
        .context("failed to attach billing controller")?;

    info!("daemon initialized, reading trip events from stdin");

    tokio::select! {
        result = forward_stdin(&handle) => {
            match result {
                Ok(()) => info!("stdin closed"),
                Err(e) => error!(?e, "trip event stream failed"),
            }
        }

        _ = async {
            loop {
                match event_rx.recv().await {
                    Ok(event) => info!(?event, "billing event"),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "billing event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        } => {
            info!("billing event stream closed");
        }

        result = shutdown.wait() => {
            match result {
                Ok(signal) => info!(signal, "shutdown signal received"),
                Err(e) => error!(?e, "failed to wait for shutdown signal"),
            }
        }
    }

    // Cleanup
    info!("shutting down...");

    match handle.shutdown().await {
        Ok(()) | Err(BillingError::ControllerClosed) => {}
        Err(e) => warn!(%e, "final shutdown failed"),
    }
    controller
        .await
        .context("billing controller task panicked")?
        .context("billing controller failed")?;

    info!(calls = gateway.calls().len(), "trip-billing-daemon stopped");

    Ok(())
}

/// Apply each stdin line as a trip event until EOF
async fn forward_stdin(handle: &BillingHandle) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let event: TripEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                warn!(%e, line, "skipping malformed trip event");
                continue;
            }
        };

        match handle.send(event.into()).await {
            Ok(()) => {}
            Err(BillingError::ControllerClosed) => {
                return Err(BillingError::ControllerClosed.into());
            }
            Err(e) => error!(%e, "trip event rejected"),
        }
    }

    Ok(())
}
