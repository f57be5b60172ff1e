use async_trait::async_trait;
use tokio::sync::broadcast;

use std::fmt::Debug;

pub mod log;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Stream(StreamEvent),
    Cycle(CycleEvent),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamEvent {
    pub r#type: StreamEventType,
    pub stream: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEventType {
    /// A new recording session became active
    Published,
    /// A publish was refused because the stream is already recording
    Rejected,
    /// The publisher left, the session is draining
    Unpublished,
    /// The session left the registry
    Stopped,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CycleEvent {
    pub stream: String,
    pub epoch: i64,
    pub result: CycleResult,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleResult {
    Success,
    Transient(String),
    Fatal(String),
}

#[async_trait]
pub trait EventHook: Debug {
    async fn hook(&self, mut event_receiver: broadcast::Receiver<Event>);
}
