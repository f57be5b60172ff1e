use tracing::{info, warn};

pub async fn shutdown_signal() {
    match signal::wait_for_stop_signal().await {
        Ok(signal) => info!("Received signal: {}", signal),
        Err(e) => {
            warn!("signal handler unavailable ({}), falling back to ctrl-c", e);
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("ctrl-c handler failed: {}", e);
            }
        }
    }
}
