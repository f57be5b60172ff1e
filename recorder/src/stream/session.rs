use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::segment::CycleOutcome;

pub type SessionHandle = Arc<RecordingSession>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Stopping,
    Stopped,
}

impl From<SessionStatus> for api::response::SessionStatus {
    fn from(value: SessionStatus) -> Self {
        match value {
            SessionStatus::Active => api::response::SessionStatus::Active,
            SessionStatus::Stopping => api::response::SessionStatus::Stopping,
            SessionStatus::Stopped => api::response::SessionStatus::Stopped,
        }
    }
}

/// The recording lifecycle of one published stream.
///
/// Identity and source never change after creation. Everything else sits
/// behind one mutex so that the status and the in-flight flag are always
/// read and written together.
#[derive(Debug)]
pub struct RecordingSession {
    stream_id: String,
    source: String,
    /// Ingest connection that published the stream, when the server names it
    publisher: Option<String>,
    created_at: DateTime<Utc>,
    state: Mutex<SessionState>,
}

#[derive(Debug)]
struct SessionState {
    status: SessionStatus,
    in_flight: bool,
    last_cycle_epoch: i64,
    consecutive_failures: u32,
    cycles: u64,
    /// Replacing publish, installed once this session is stopped
    successor: Option<Successor>,
}

/// A publish waiting for the session it replaces to stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Successor {
    pub source: String,
    pub publisher: Option<String>,
}

impl RecordingSession {
    pub fn new(stream_id: String, source: String) -> Self {
        Self {
            stream_id,
            source,
            publisher: None,
            created_at: Utc::now(),
            state: Mutex::new(SessionState {
                status: SessionStatus::Active,
                in_flight: false,
                last_cycle_epoch: 0,
                consecutive_failures: 0,
                cycles: 0,
                successor: None,
            }),
        }
    }

    pub fn with_publisher(mut self, publisher: Option<String>) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn publisher(&self) -> Option<&str> {
        self.publisher.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> SessionStatus {
        self.state().status
    }

    pub fn is_cycle_in_flight(&self) -> bool {
        self.state().in_flight
    }

    pub fn last_cycle_epoch(&self) -> i64 {
        self.state().last_cycle_epoch
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.state().consecutive_failures
    }

    pub fn cycles(&self) -> u64 {
        self.state().cycles
    }

    /// Claim the cycle slot of this session.
    ///
    /// Returns the epoch the cycle must be named after, or `None` when the
    /// session is not active or a cycle is still running. Epochs are
    /// strictly increasing per session so two cycles never share a name.
    pub fn begin_cycle(&self, now_epoch: i64) -> Option<i64> {
        let mut state = self.state();
        if state.status != SessionStatus::Active || state.in_flight {
            return None;
        }
        let epoch = now_epoch.max(state.last_cycle_epoch + 1);
        state.in_flight = true;
        state.last_cycle_epoch = epoch;
        Some(epoch)
    }

    /// Record the end of the running cycle and return the resulting status.
    pub(crate) fn finish_cycle(&self, outcome: &CycleOutcome, fatal_threshold: u32) -> SessionStatus {
        let mut state = self.state();
        state.in_flight = false;
        match outcome {
            CycleOutcome::Success(_) => {
                state.consecutive_failures = 0;
                state.cycles += 1;
            }
            CycleOutcome::Transient(_) => {
                state.consecutive_failures += 1;
                if state.consecutive_failures >= fatal_threshold
                    && state.status == SessionStatus::Active
                {
                    state.status = SessionStatus::Stopping;
                }
            }
            CycleOutcome::Fatal(_) => {
                state.consecutive_failures += 1;
                if state.status == SessionStatus::Active {
                    state.status = SessionStatus::Stopping;
                }
            }
        }
        if state.status == SessionStatus::Stopping {
            state.status = SessionStatus::Stopped;
        }
        state.status
    }

    /// Move to `Stopping`, or straight to `Stopped` when no cycle is running.
    /// A pending successor is dropped, its publisher left before it started.
    pub(crate) fn stop(&self) -> SessionStatus {
        let mut state = self.state();
        state.successor = None;
        state.status = if state.in_flight {
            SessionStatus::Stopping
        } else {
            SessionStatus::Stopped
        };
        state.status
    }

    /// Stop this session in favour of a new publish.
    pub(crate) fn replace_with(&self, successor: Successor) -> SessionStatus {
        let mut state = self.state();
        state.successor = Some(successor);
        state.status = if state.in_flight {
            SessionStatus::Stopping
        } else {
            SessionStatus::Stopped
        };
        state.status
    }

    pub(crate) fn take_successor(&self) -> Option<Successor> {
        self.state().successor.take()
    }

    pub(crate) fn has_successor(&self) -> bool {
        self.state().successor.is_some()
    }

    /// Drop the pending replacement if `publisher` is the one that sent it.
    pub(crate) fn cancel_successor(&self, publisher: &str) -> bool {
        let mut state = self.state();
        let owned = state
            .successor
            .as_ref()
            .is_some_and(|successor| successor.publisher.as_deref() == Some(publisher));
        if owned {
            state.successor = None;
        }
        owned
    }

    pub fn info(&self) -> api::response::Session {
        let state = self.state();
        api::response::Session {
            stream_id: self.stream_id.clone(),
            source: self.source.clone(),
            publisher: self.publisher.clone(),
            status: state.status.into(),
            last_cycle_epoch: state.last_cycle_epoch,
            consecutive_failures: state.consecutive_failures,
            cycles: state.cycles,
            created_at: self.created_at.timestamp_millis(),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        // The critical sections never panic halfway, a poisoned state is still consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{CycleError, CycleOutcome, CycleReport};
    use std::path::PathBuf;
    use std::time::Duration;

    fn session() -> RecordingSession {
        RecordingSession::new(
            "cam01".to_string(),
            "rtmp://127.0.0.1:1935/live/cam01".to_string(),
        )
    }

    fn success(epoch: i64) -> CycleOutcome {
        CycleOutcome::Success(CycleReport {
            epoch,
            output_dir: PathBuf::from("/tmp"),
            manifest: PathBuf::from("/tmp/index.m3u8"),
            elapsed: Duration::from_secs(1),
        })
    }

    fn transient() -> CycleOutcome {
        CycleOutcome::Transient(CycleError::Aborted("test".to_string()))
    }

    #[test]
    fn test_begin_cycle_is_exclusive() {
        let s = session();
        assert_eq!(s.begin_cycle(100), Some(100));
        assert!(s.is_cycle_in_flight());
        assert_eq!(s.begin_cycle(130), None);

        assert_eq!(s.finish_cycle(&success(100), 3), SessionStatus::Active);
        assert_eq!(s.begin_cycle(130), Some(130));
    }

    #[test]
    fn test_cycle_epoch_strictly_increases() {
        let s = session();
        assert_eq!(s.begin_cycle(100), Some(100));
        s.finish_cycle(&success(100), 3);
        // Clock did not move, or moved backwards.
        assert_eq!(s.begin_cycle(100), Some(101));
        s.finish_cycle(&success(101), 3);
        assert_eq!(s.begin_cycle(50), Some(102));
        assert_eq!(s.last_cycle_epoch(), 102);
    }

    #[test]
    fn test_stop_waits_for_in_flight_cycle() {
        let s = session();
        s.begin_cycle(100);
        assert_eq!(s.stop(), SessionStatus::Stopping);
        assert_eq!(s.begin_cycle(130), None);
        assert_eq!(s.finish_cycle(&success(100), 3), SessionStatus::Stopped);
    }

    #[test]
    fn test_stop_idle_session_is_immediate() {
        let s = session();
        assert_eq!(s.stop(), SessionStatus::Stopped);
        assert_eq!(s.begin_cycle(100), None);
    }

    #[test]
    fn test_transient_failures_escalate_at_threshold() {
        let s = session();
        for epoch in 0..2 {
            s.begin_cycle(epoch);
            assert_eq!(s.finish_cycle(&transient(), 3), SessionStatus::Active);
        }
        assert_eq!(s.consecutive_failures(), 2);

        s.begin_cycle(10);
        assert_eq!(s.finish_cycle(&transient(), 3), SessionStatus::Stopped);
    }

    #[test]
    fn test_success_resets_failure_count() {
        let s = session();
        s.begin_cycle(1);
        s.finish_cycle(&transient(), 3);
        s.begin_cycle(2);
        s.finish_cycle(&transient(), 3);
        s.begin_cycle(3);
        s.finish_cycle(&success(3), 3);
        assert_eq!(s.consecutive_failures(), 0);
        assert_eq!(s.cycles(), 1);
        assert_eq!(s.status(), SessionStatus::Active);
    }

    #[test]
    fn test_fatal_stops_immediately() {
        let s = session();
        s.begin_cycle(1);
        let fatal = CycleOutcome::Fatal(CycleError::Aborted("gone".to_string()));
        assert_eq!(s.finish_cycle(&fatal, 3), SessionStatus::Stopped);
    }

    fn successor(publisher: &str) -> Successor {
        Successor {
            source: "rtmp://127.0.0.1:1935/live/cam01?b".to_string(),
            publisher: Some(publisher.to_string()),
        }
    }

    #[test]
    fn test_replace_keeps_successor_until_taken() {
        let s = session();
        s.begin_cycle(1);
        assert_eq!(s.replace_with(successor("2")), SessionStatus::Stopping);
        assert_eq!(s.finish_cycle(&success(1), 3), SessionStatus::Stopped);
        assert_eq!(s.take_successor(), Some(successor("2")));
        assert_eq!(s.take_successor(), None);
    }

    #[test]
    fn test_stop_cancels_pending_successor() {
        let s = session();
        s.begin_cycle(1);
        s.replace_with(successor("2"));
        s.stop();
        assert_eq!(s.take_successor(), None);
    }

    #[test]
    fn test_only_its_publisher_cancels_successor() {
        let s = session().with_publisher(Some("1".to_string()));
        assert_eq!(s.publisher(), Some("1"));
        s.begin_cycle(1);
        s.replace_with(successor("2"));

        assert!(!s.cancel_successor("1"));
        assert!(s.has_successor());
        assert!(s.cancel_successor("2"));
        assert!(!s.has_successor());
    }
}
