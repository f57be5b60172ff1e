#![allow(dead_code)]

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use recorder::segment::{SegmentError, SegmentJob, SegmentReport, Segmenter};
use tokio::sync::oneshot;

pub fn shutdown_channel() -> (oneshot::Sender<()>, impl std::future::Future<Output = ()>) {
    let (tx, rx) = oneshot::channel::<()>();
    (tx, async move {
        let _ = rx.await;
    })
}

/// Stands in for ffmpeg: writes one segment per run and appends it to the
/// stream's playlist, the way `-hls_flags append_list` does.
#[derive(Debug, Default)]
pub struct PlaylistSegmenter {
    pub jobs: Mutex<Vec<SegmentJob>>,
}

#[async_trait]
impl Segmenter for PlaylistSegmenter {
    async fn segment(&self, job: &SegmentJob) -> Result<SegmentReport, SegmentError> {
        self.jobs.lock().unwrap().push(job.clone());

        let segment = job.segment_pattern.clone();
        tokio::fs::write(&segment, b"ts").await.map_err(SegmentError::Wait)?;

        let mut playlist = match tokio::fs::read_to_string(&job.manifest).await {
            Ok(playlist) => playlist,
            Err(_) => format!(
                "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:{}\n",
                job.segment_secs
            ),
        };
        playlist.push_str(&format!(
            "#EXTINF:{}.000000,\n{}\n",
            job.segment_secs,
            file_name(&segment)
        ));
        tokio::fs::write(&job.manifest, playlist)
            .await
            .map_err(SegmentError::Wait)?;
        Ok(SegmentReport::default())
    }
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
