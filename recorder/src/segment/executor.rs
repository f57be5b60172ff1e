use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::Config;

use super::layout::{manifest_path, segment_pattern, OutputLayout};
use super::{CycleError, CycleOutcome, CycleReport, SegmentJob, Segmenter};

/// Runs one segmentation cycle for one stream.
///
/// Never fails: every error ends up classified in the returned
/// [`CycleOutcome`].
#[derive(Debug)]
pub struct Executor {
    segmenter: Arc<dyn Segmenter>,
    layout: OutputLayout,
    input_format: String,
    capture: Duration,
    segment_secs: u64,
    list_size: u32,
    timeout: Duration,
}

impl Executor {
    pub fn new(cfg: &Config, segmenter: Arc<dyn Segmenter>) -> Self {
        Self {
            segmenter,
            layout: OutputLayout::new(
                cfg.recorder.output_root.clone(),
                cfg.recorder.date_policy,
            ),
            input_format: cfg.ingest.input_format.clone(),
            capture: cfg.recorder.capture_window(),
            segment_secs: cfg.recorder.segment_secs,
            list_size: cfg.recorder.list_size,
            timeout: cfg.recorder.cycle_timeout(),
        }
    }

    /// The job of the cycle that starts at `epoch`; its directory is taken
    /// from the calendar date of `epoch`.
    pub fn job(&self, stream_id: &str, source: &str, epoch: i64) -> SegmentJob {
        let at = DateTime::<Utc>::from_timestamp(epoch, 0).unwrap_or_else(Utc::now);
        let output_dir = self.layout.stream_dir(stream_id, at);
        SegmentJob {
            stream_id: stream_id.to_string(),
            source: source.to_string(),
            input_format: self.input_format.clone(),
            manifest: manifest_path(&output_dir),
            segment_pattern: output_dir.join(segment_pattern(
                epoch,
                self.capture.as_secs(),
                self.segment_secs,
            )),
            output_dir,
            segment_secs: self.segment_secs,
            list_size: self.list_size,
            capture: self.capture,
            timeout: self.timeout,
        }
    }

    pub async fn run_cycle(&self, stream_id: &str, source: &str, epoch: i64) -> CycleOutcome {
        let job = self.job(stream_id, source, epoch);

        if let Err(err) = tokio::fs::create_dir_all(&job.output_dir).await {
            return CycleOutcome::Transient(CycleError::CreateDir {
                path: job.output_dir,
                err,
            });
        }

        info!(
            "[executor] stream {} cycle {} capturing {:?} into {}",
            stream_id,
            epoch,
            self.capture,
            job.output_dir.display()
        );
        let started = Instant::now();
        match self.segmenter.segment(&job).await {
            Ok(report) => {
                if !report.stderr.trim().is_empty() {
                    debug!(
                        "[executor] stream {} segmenter stderr: {}",
                        stream_id,
                        report.stderr.trim_end()
                    );
                }
                CycleOutcome::Success(CycleReport {
                    epoch,
                    output_dir: job.output_dir,
                    manifest: job.manifest,
                    elapsed: started.elapsed(),
                })
            }
            Err(e) if e.is_fatal() => CycleOutcome::Fatal(e.into()),
            Err(e) => CycleOutcome::Transient(e.into()),
        }
    }
}
