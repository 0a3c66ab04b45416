use std::time::Duration;

use tokio::sync::watch;

/// Upper bound on connection draining once a signal arrived.
pub(crate) const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum ShutdownEvent {
    Interrupt,
    Terminate,
    SignalUnavailable,
}

/// Resolves on the first of Ctrl+C or SIGTERM.
pub(crate) async fn shutdown_signal() -> ShutdownEvent {
    tokio::select! {
        event = interrupt() => event,
        event = terminate() => event,
    }
}

async fn interrupt() -> ShutdownEvent {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(%error, "Ctrl+C handler unavailable");
        return ShutdownEvent::SignalUnavailable;
    }
    ShutdownEvent::Interrupt
}

#[cfg(unix)]
async fn terminate() -> ShutdownEvent {
    use tokio::signal::unix::{SignalKind, signal};

    let mut stream = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(error) => {
            tracing::warn!(%error, "SIGTERM handler unavailable");
            return ShutdownEvent::SignalUnavailable;
        }
    };
    match stream.recv().await {
        Some(()) => ShutdownEvent::Terminate,
        None => ShutdownEvent::SignalUnavailable,
    }
}

#[cfg(not(unix))]
async fn terminate() -> ShutdownEvent {
    std::future::pending().await
}

/// Publishes the received signal so the drain timer can start.
pub(crate) async fn announce(tx: watch::Sender<Option<ShutdownEvent>>) {
    let event = shutdown_signal().await;
    tracing::info!(?event, "shutdown requested; draining connections");
    if tx.send(Some(event)).is_err() {
        tracing::debug!(?event, "nobody waiting on shutdown event");
    }
}

/// Completes `DRAIN_TIMEOUT` after a signal has been announced.
pub(crate) async fn drain_deadline(mut rx: watch::Receiver<Option<ShutdownEvent>>) {
    let announced = rx.wait_for(Option::is_some).await.is_ok();
    if !announced {
        // Sender gone without a signal: the server stopped on its own.
        std::future::pending::<()>().await;
    }
    tokio::time::sleep(DRAIN_TIMEOUT).await;
}
