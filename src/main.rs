//! Troupe stdio bridge
//!
//! Reads backend callbacks and UI requests as JSON lines on stdin and writes
//! backend commands and notifications as JSON lines on stdout. Logs go to
//! stderr.

use tokio::io::BufReader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use troupe::bridge::{self, LineWriter};
use troupe::config::{AppConfig, SessionParams};
use troupe::runtime;
use troupe::state_machine::{Event, Session};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging; stdout is the protocol channel
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "troupe=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = AppConfig::from_env();
    tracing::info!(
        params = ?config.params_path,
        snapshot = ?config.snapshot_path,
        event_buffer = config.event_buffer,
        "Starting troupe"
    );

    let writer = LineWriter::new(tokio::io::stdout());
    let session = Session::new();
    tracing::info!(session_id = %session.id(), "Session created");

    let handle = runtime::spawn(session, writer.clone(), config.event_buffer);
    let forwarder = tokio::spawn(bridge::forward_notifications(
        handle.subscribe(),
        writer,
    ));

    if let Some(path) = &config.params_path {
        let params = SessionParams::load(path)?;
        tracing::info!(path = %path.display(), participants = params.n_chars, "Delivering initial params");
        handle
            .send(Event::ParamsDelivered {
                params,
                show_settings: false,
            })
            .await?;
    }

    let stdin = BufReader::new(tokio::io::stdin());
    let interrupted = tokio::select! {
        result = bridge::read_events(stdin, handle.event_sender()) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Input stream failed");
            }
            tracing::info!("Input closed");
            false
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted");
            true
        }
    };

    // Input already read is still processed unless interrupted
    let session = if interrupted {
        handle.cancel().await?
    } else {
        handle.shutdown().await?
    };
    if let Err(e) = forwarder.await? {
        tracing::warn!(error = %e, "Notification output failed");
    }

    if let Some(path) = &config.snapshot_path {
        bridge::write_snapshot(path, &session.store().snapshot())?;
        tracing::info!(path = %path.display(), lines = session.store().len(), "Snapshot written");
    }

    Ok(())
}
