use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::{CycleResult, Event, EventHook, StreamEventType};

/// Writes every lifecycle event to the `recorder::event` log target, so
/// operators can follow stream history separately from the runtime logs.
#[derive(Debug, Default)]
pub struct LogHook;

#[async_trait]
impl EventHook for LogHook {
    async fn hook(&self, mut event_receiver: broadcast::Receiver<Event>) {
        loop {
            match event_receiver.recv().await {
                Ok(event) => log_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(target: "recorder::event", "event log lagged, {} events dropped", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

fn log_event(event: &Event) {
    match event {
        Event::Stream(event) => match event.r#type {
            StreamEventType::Rejected => {
                warn!(target: "recorder::event", stream = %event.stream, "stream rejected")
            }
            _ => info!(target: "recorder::event", stream = %event.stream, kind = ?event.r#type, "stream event"),
        },
        Event::Cycle(event) => match &event.result {
            CycleResult::Success => {
                debug!(target: "recorder::event", stream = %event.stream, epoch = event.epoch, "cycle finished")
            }
            CycleResult::Transient(reason) | CycleResult::Fatal(reason) => {
                warn!(target: "recorder::event", stream = %event.stream, epoch = event.epoch, reason = %reason, "cycle failed")
            }
        },
    }
}
