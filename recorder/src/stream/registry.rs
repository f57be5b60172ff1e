use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use crate::config::DuplicatePolicy;
use crate::hook::{CycleEvent, CycleResult, Event, StreamEvent, StreamEventType};
use crate::new_broadcast_channel;
use crate::segment::CycleOutcome;

use super::session::{RecordingSession, SessionHandle, SessionStatus, Successor};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("stream {0} is already recording")]
    AlreadyActive(String),
    /// Under [`DuplicatePolicy::Replace`]: the running session is draining and
    /// the new publish takes over once it has stopped.
    #[error("stream {0} is draining, the new publish starts after it")]
    ReplacePending(String),
    #[error("stream {0} is not recording")]
    NotFound(String),
    /// An unpublish from a connection that does not own the recording.
    #[error("stream {0} is recording from another publisher")]
    NotPublisher(String),
}

/// The set of streams that are currently recording.
///
/// The only source of truth for "is this stream recording". A stream id
/// maps to at most one session, and that session is either `Active` or
/// `Stopping`; stopped sessions are removed under the same write lock that
/// stopped them.
pub struct Registry {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    duplicate_policy: DuplicatePolicy,
    fatal_threshold: u32,
    event_sender: broadcast::Sender<Event>,
}

impl Registry {
    pub fn new(duplicate_policy: DuplicatePolicy, fatal_threshold: u32) -> Self {
        Self {
            sessions: Default::default(),
            duplicate_policy,
            fatal_threshold: fatal_threshold.max(1),
            event_sender: new_broadcast_channel!(64),
        }
    }

    pub fn subscribe_event(&self) -> broadcast::Receiver<Event> {
        self.event_sender.subscribe()
    }

    pub async fn register(
        &self,
        stream_id: String,
        source: String,
    ) -> Result<SessionHandle, RegistryError> {
        self.register_publisher(stream_id, source, None).await
    }

    /// Like [`Registry::register`], remembering which ingest connection
    /// published the stream so that only its unpublish stops the recording.
    pub async fn register_publisher(
        &self,
        stream_id: String,
        source: String,
        publisher: Option<String>,
    ) -> Result<SessionHandle, RegistryError> {
        let mut sessions = self.sessions.write().await;
        if let Some(existing) = sessions.get(&stream_id).cloned() {
            match self.duplicate_policy {
                DuplicatePolicy::Reject => {
                    warn!(
                        "[registry] stream {} already recording ({:?}), rejecting new publish. Recording: {}",
                        stream_id,
                        existing.status(),
                        join_keys(&sessions)
                    );
                    self.emit_stream(StreamEventType::Rejected, &stream_id);
                    return Err(RegistryError::AlreadyActive(stream_id));
                }
                DuplicatePolicy::Replace => {
                    let successor = Successor {
                        source: source.clone(),
                        publisher: publisher.clone(),
                    };
                    if existing.replace_with(successor) == SessionStatus::Stopping {
                        info!(
                            "[registry] stream {} replaced, waiting for its running cycle",
                            stream_id
                        );
                        self.emit_stream(StreamEventType::Unpublished, &stream_id);
                        return Err(RegistryError::ReplacePending(stream_id));
                    }
                    existing.take_successor();
                    sessions.remove(&stream_id);
                    info!("[registry] stream {} replaced", stream_id);
                    self.emit_stream(StreamEventType::Stopped, &stream_id);
                }
            }
        }

        let session =
            Arc::new(RecordingSession::new(stream_id.clone(), source).with_publisher(publisher));
        sessions.insert(stream_id.clone(), session.clone());
        info!(
            "[registry] stream {} recording from {}",
            stream_id,
            session.source()
        );
        self.emit_stream(StreamEventType::Published, &stream_id);
        Ok(session)
    }

    /// Stop recording `stream_id`.
    ///
    /// Returns `Stopping` when a cycle is still running for it; the session
    /// then leaves the registry when that cycle completes. Never waits for
    /// the segmenter.
    pub async fn unregister(&self, stream_id: &str) -> Result<SessionStatus, RegistryError> {
        self.unregister_publisher(stream_id, None).await
    }

    /// Stop recording `stream_id` because `publisher` left.
    ///
    /// A named publisher only stops the session it published. While a
    /// replacement is pending, the replaced publisher leaving changes
    /// nothing and the replacing one leaving cancels the replacement.
    /// Without a name the session is stopped unconditionally.
    pub async fn unregister_publisher(
        &self,
        stream_id: &str,
        publisher: Option<&str>,
    ) -> Result<SessionStatus, RegistryError> {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get(stream_id).cloned() else {
            info!("[registry] unpublish for unknown stream {}, ignored", stream_id);
            return Err(RegistryError::NotFound(stream_id.to_string()));
        };

        if let Some(publisher) = publisher {
            if session.has_successor() {
                if session.cancel_successor(publisher) {
                    info!(
                        "[registry] stream {} replacement from {} left before it started",
                        stream_id, publisher
                    );
                } else {
                    debug!(
                        "[registry] stream {} replaced publisher {} left",
                        stream_id, publisher
                    );
                }
                return Ok(session.status());
            }
            if session.publisher().is_some_and(|owner| owner != publisher) {
                info!(
                    "[registry] unpublish of stream {} from {} which does not own it, ignored",
                    stream_id, publisher
                );
                return Err(RegistryError::NotPublisher(stream_id.to_string()));
            }
        }

        let status = session.stop();
        self.emit_stream(StreamEventType::Unpublished, stream_id);
        if status == SessionStatus::Stopped {
            sessions.remove(stream_id);
            info!("[registry] stream {} stopped", stream_id);
            self.emit_stream(StreamEventType::Stopped, stream_id);
        } else {
            info!(
                "[registry] stream {} stopping, waiting for its running cycle",
                stream_id
            );
        }
        Ok(status)
    }

    /// Active sessions ordered by stream id, taken under one read lock.
    pub async fn snapshot(&self) -> Vec<SessionHandle> {
        let sessions = self.sessions.read().await;
        let mut active: Vec<SessionHandle> = sessions
            .values()
            .filter(|session| session.status() == SessionStatus::Active)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.stream_id().cmp(b.stream_id()));
        active
    }

    /// Apply the outcome of a cycle started with [`RecordingSession::begin_cycle`].
    pub async fn complete_cycle(&self, session: &SessionHandle, outcome: &CycleOutcome) -> SessionStatus {
        let mut sessions = self.sessions.write().await;
        let epoch = session.last_cycle_epoch();
        let stream_id = session.stream_id();

        let result = match outcome {
            CycleOutcome::Success(report) => {
                info!(
                    "[registry] stream {} cycle {} saved to {}",
                    stream_id,
                    report.epoch,
                    report.manifest.display()
                );
                CycleResult::Success
            }
            CycleOutcome::Transient(e) => {
                warn!("[registry] stream {} cycle {} failed: {}", stream_id, epoch, e);
                CycleResult::Transient(e.to_string())
            }
            CycleOutcome::Fatal(e) => {
                warn!(
                    "[registry] stream {} cycle {} failed fatally: {}",
                    stream_id, epoch, e
                );
                CycleResult::Fatal(e.to_string())
            }
        };
        let _ = self.event_sender.send(Event::Cycle(CycleEvent {
            stream: stream_id.to_string(),
            epoch,
            result,
        }));

        let was_active = session.status() == SessionStatus::Active;
        let status = session.finish_cycle(outcome, self.fatal_threshold);
        if status != SessionStatus::Stopped {
            return status;
        }

        if was_active {
            match outcome {
                CycleOutcome::Fatal(e) => {
                    warn!("[registry] stream {} torn down: {}", stream_id, e)
                }
                _ => warn!(
                    "[registry] stream {} torn down after {} consecutive failed cycles",
                    stream_id,
                    session.consecutive_failures()
                ),
            }
        }

        let owned = sessions
            .get(stream_id)
            .is_some_and(|current| Arc::ptr_eq(current, session));
        if !owned {
            debug!("[registry] stream {} already left the registry", stream_id);
            return status;
        }
        sessions.remove(stream_id);
        info!("[registry] stream {} stopped", stream_id);
        self.emit_stream(StreamEventType::Stopped, stream_id);

        if let Some(successor) = session.take_successor() {
            let next = Arc::new(
                RecordingSession::new(stream_id.to_string(), successor.source)
                    .with_publisher(successor.publisher),
            );
            info!(
                "[registry] stream {} recording from {} (replacement)",
                stream_id,
                next.source()
            );
            sessions.insert(stream_id.to_string(), next);
            self.emit_stream(StreamEventType::Published, stream_id);
        }
        status
    }

    pub async fn get(&self, stream_id: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(stream_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn infos(&self) -> Vec<api::response::Session> {
        let sessions = self.sessions.read().await;
        let mut infos: Vec<_> = sessions.values().map(|session| session.info()).collect();
        infos.sort_by(|a, b| a.stream_id.cmp(&b.stream_id));
        infos
    }

    fn emit_stream(&self, r#type: StreamEventType, stream: &str) {
        let _ = self.event_sender.send(Event::Stream(StreamEvent {
            r#type,
            stream: stream.to_string(),
        }));
    }
}

fn join_keys(sessions: &HashMap<String, SessionHandle>) -> String {
    let mut keys: Vec<&str> = sessions.keys().map(String::as_str).collect();
    keys.sort_unstable();
    keys.join(", ")
}
