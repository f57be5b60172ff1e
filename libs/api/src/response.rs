use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub stream_id: String,
    pub source: String,
    /// Ingest connection that published the stream
    #[serde(default)]
    pub publisher: Option<String>,
    pub status: SessionStatus,
    /// Epoch seconds of the newest started cycle, 0 before the first one.
    pub last_cycle_epoch: i64,
    pub consecutive_failures: u32,
    pub cycles: u64,
    pub created_at: i64,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    Active,
    Stopping,
    Stopped,
}
