use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::config::{Config, Ingest};
use crate::error::AppError;
use crate::result::Result;
use crate::segment::{Executor, Scheduler, Segmenter};
use crate::stream::{self, Registry, RegistryError, SessionStatus};

/// Entry point for the ingest server's lifecycle callbacks.
///
/// Owns the registry and the scheduler; the HTTP layer only talks to this.
pub struct Orchestrator {
    registry: Arc<Registry>,
    scheduler: Arc<Scheduler>,
    ingest: Ingest,
    output_root: PathBuf,
}

impl Orchestrator {
    pub fn new(cfg: &Config, segmenter: Arc<dyn Segmenter>) -> Self {
        let registry = Arc::new(Registry::new(
            cfg.recorder.duplicate_policy,
            cfg.recorder.fatal_threshold,
        ));
        let executor = Arc::new(Executor::new(cfg, segmenter));
        let scheduler = Arc::new(Scheduler::new(
            registry.clone(),
            executor,
            cfg.recorder.interval(),
        ));
        Self {
            registry,
            scheduler,
            ingest: cfg.ingest.clone(),
            output_root: cfg.recorder.output_root.clone(),
        }
    }

    /// Make sure the output root exists before any stream is accepted.
    pub async fn prepare(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.output_root)
            .await
            .with_context(|| {
                format!("create output root {}", self.output_root.display())
            })?;
        info!("[orchestrator] recording into {}", self.output_root.display());
        Ok(())
    }

    pub fn start(&self) {
        self.scheduler.start();
    }

    /// Stop ticking and wait for the cycles that are still running.
    pub async fn shutdown(&self) {
        self.scheduler.stop().await;
        let in_flight = self.scheduler.in_flight();
        if in_flight > 0 {
            info!("[orchestrator] waiting for {} running cycles", in_flight);
        }
        self.scheduler.wait_idle().await;
        info!(
            "[orchestrator] shut down, {} streams were recording",
            self.registry.len().await
        );
    }

    /// A publisher started pushing `path`. Returns the stream id now recording.
    pub async fn on_publish(&self, path: &str, params: &HashMap<String, String>) -> Result<String> {
        let Some(stream_id) = stream::stream_id_from_path(path) else {
            warn!("[orchestrator] publish with invalid path {:?}, ignored", path);
            return Err(AppError::invalid_stream_path(path));
        };
        debug!("[orchestrator] publish {} params {:?}", path, params);

        let source = stream::source_locator(&self.ingest.source_base, path);
        match self
            .registry
            .register_publisher(stream_id.to_string(), source, publisher(params))
            .await
        {
            Ok(_) => Ok(stream_id.to_string()),
            Err(RegistryError::ReplacePending(stream_id)) => Ok(stream_id),
            Err(RegistryError::AlreadyActive(stream_id)) => {
                Err(AppError::stream_already_exists(stream_id))
            }
            Err(e) => Err(AppError::throw(e)),
        }
    }

    /// A publisher left `path`. Unknown or invalid paths are a logged no-op.
    pub async fn on_unpublish(&self, path: &str, params: &HashMap<String, String>) -> Result<()> {
        let Some(stream_id) = stream::stream_id_from_path(path) else {
            warn!("[orchestrator] unpublish with invalid path {:?}, ignored", path);
            return Ok(());
        };
        debug!("[orchestrator] unpublish {} params {:?}", path, params);

        // Refusals are already logged by the registry.
        let _ = self
            .registry
            .unregister_publisher(stream_id, publisher(params).as_deref())
            .await;
        Ok(())
    }

    /// Stop recording a stream on operator request.
    pub async fn stop_stream(&self, stream_id: &str) -> Result<SessionStatus> {
        self.registry
            .unregister(stream_id)
            .await
            .map_err(|_| AppError::stream_not_found(stream_id))
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }
}

/// The ingest connection behind a callback: its client id, else its address.
fn publisher(params: &HashMap<String, String>) -> Option<String> {
    params
        .get("clientid")
        .or_else(|| params.get("addr"))
        .filter(|id| !id.is_empty())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DuplicatePolicy;
    use crate::segment::{SegmentError, SegmentJob, SegmentReport};
    use async_trait::async_trait;
    use std::time::Duration;

    #[derive(Debug)]
    struct NoopSegmenter;

    #[async_trait]
    impl Segmenter for NoopSegmenter {
        async fn segment(&self, _job: &SegmentJob) -> std::result::Result<SegmentReport, SegmentError> {
            Ok(SegmentReport::default())
        }
    }

    fn orchestrator(root: &std::path::Path, policy: DuplicatePolicy) -> Orchestrator {
        let mut cfg = Config::default();
        cfg.recorder.output_root = root.join("Recordings");
        cfg.recorder.duplicate_policy = policy;
        cfg.recorder.interval_secs = 3600;
        Orchestrator::new(&cfg, Arc::new(NoopSegmenter))
    }

    fn params() -> HashMap<String, String> {
        HashMap::from([("addr".to_string(), "10.0.0.7".to_string())])
    }

    #[tokio::test]
    async fn test_publish_and_unpublish() {
        let tmp = tempfile::tempdir().unwrap();
        let o = orchestrator(tmp.path(), DuplicatePolicy::Reject);
        o.prepare().await.unwrap();
        assert!(tmp.path().join("Recordings").is_dir());

        assert_eq!(o.on_publish("/live/cam01", &params()).await.unwrap(), "cam01");
        let session = o.registry().get("cam01").await.unwrap();
        assert_eq!(session.source(), "rtmp://127.0.0.1:1935/live/cam01");

        o.on_unpublish("/live/cam01", &params()).await.unwrap();
        assert!(o.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_duplicate_publish_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let o = orchestrator(tmp.path(), DuplicatePolicy::Reject);

        o.on_publish("/live/cam01", &params()).await.unwrap();
        let err = o.on_publish("/live/cam01", &params()).await.unwrap_err();
        assert!(matches!(err, AppError::StreamAlreadyExists(ref s) if s == "cam01"));
        assert_eq!(o.registry().len().await, 1);
    }

    #[tokio::test]
    async fn test_duplicate_publish_replaces() {
        let tmp = tempfile::tempdir().unwrap();
        let o = orchestrator(tmp.path(), DuplicatePolicy::Replace);

        o.on_publish("/live/cam01", &params()).await.unwrap();
        let first = o.registry().get("cam01").await.unwrap();
        o.on_publish("/other/cam01", &params()).await.unwrap();
        let second = o.registry().get("cam01").await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.source(), "rtmp://127.0.0.1:1935/other/cam01");
        assert_eq!(o.registry().len().await, 1);
    }

    fn publisher_at(addr: &str) -> HashMap<String, String> {
        HashMap::from([("addr".to_string(), addr.to_string())])
    }

    #[tokio::test]
    async fn test_replaced_publisher_unpublish_keeps_new_session() {
        let tmp = tempfile::tempdir().unwrap();
        let o = orchestrator(tmp.path(), DuplicatePolicy::Replace);

        o.on_publish("/live/cam01", &publisher_at("10.0.0.1")).await.unwrap();
        o.on_publish("/live/cam01", &publisher_at("10.0.0.2")).await.unwrap();
        o.on_unpublish("/live/cam01", &publisher_at("10.0.0.1")).await.unwrap();

        assert_eq!(o.registry().len().await, 1);
        let session = o.registry().get("cam01").await.unwrap();
        assert_eq!(session.publisher(), Some("10.0.0.2"));

        o.on_unpublish("/live/cam01", &publisher_at("10.0.0.2")).await.unwrap();
        assert!(o.registry().is_empty().await);
    }

    #[test]
    fn test_publisher_prefers_client_id() {
        let mut params = publisher_at("10.0.0.1");
        assert_eq!(publisher(&params).as_deref(), Some("10.0.0.1"));
        params.insert("clientid".to_string(), "42".to_string());
        assert_eq!(publisher(&params).as_deref(), Some("42"));
        assert_eq!(publisher(&HashMap::new()), None);
    }

    #[tokio::test]
    async fn test_invalid_path() {
        let tmp = tempfile::tempdir().unwrap();
        let o = orchestrator(tmp.path(), DuplicatePolicy::Reject);

        for path in ["/live", "/live/..", ""] {
            assert!(matches!(
                o.on_publish(path, &params()).await,
                Err(AppError::InvalidStreamPath(_))
            ));
            assert!(o.on_unpublish(path, &params()).await.is_ok());
        }
        assert!(o.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_unpublish_unknown_and_twice() {
        let tmp = tempfile::tempdir().unwrap();
        let o = orchestrator(tmp.path(), DuplicatePolicy::Reject);

        assert!(o.on_unpublish("/live/ghost", &params()).await.is_ok());
        o.on_publish("/live/cam01", &params()).await.unwrap();
        assert!(o.on_unpublish("/live/cam01", &params()).await.is_ok());
        assert!(o.on_unpublish("/live/cam01", &params()).await.is_ok());
        assert!(matches!(
            o.stop_stream("cam01").await,
            Err(AppError::StreamNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_prepare_fails_when_root_is_a_file() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("Recordings"), b"x").unwrap();
        let o = orchestrator(tmp.path(), DuplicatePolicy::Reject);
        assert!(o.prepare().await.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_cycles() {
        let tmp = tempfile::tempdir().unwrap();
        let o = orchestrator(tmp.path(), DuplicatePolicy::Reject);
        o.prepare().await.unwrap();
        o.start();
        o.on_publish("/live/cam01", &params()).await.unwrap();

        assert_eq!(o.scheduler().tick().await, 1);
        tokio::time::timeout(Duration::from_secs(5), o.shutdown())
            .await
            .unwrap();

        assert!(!o.scheduler().is_running());
        assert_eq!(o.registry().get("cam01").await.unwrap().cycles(), 1);
    }
}
