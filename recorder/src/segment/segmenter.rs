use std::ffi::OsString;
use std::fmt::Debug;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::config::RecorderConfig;

/// Everything the segmenter needs for one bounded run.
#[derive(Debug, Clone)]
pub struct SegmentJob {
    pub stream_id: String,
    pub source: String,
    pub input_format: String,
    pub output_dir: PathBuf,
    pub manifest: PathBuf,
    /// Full path pattern of the segment files, embeds the cycle epoch
    pub segment_pattern: PathBuf,
    pub segment_secs: u64,
    pub list_size: u32,
    pub capture: Duration,
    /// The process is killed when it runs longer than this
    pub timeout: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct SegmentReport {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("spawn {program}: {err}")]
    Spawn {
        program: String,
        #[source]
        err: io::Error,
    },
    #[error("wait for segmenter: {0}")]
    Wait(#[source] io::Error),
    #[error("segmenter timed out after {0:?}")]
    Timeout(Duration),
    #[error("segmenter exited with {}: {}", exit_code(.code), tail(.stderr))]
    Exited {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    #[error("source {locator} unreachable: {reason}")]
    SourceUnreachable { locator: String, reason: String },
}

impl SegmentError {
    /// Whether retrying on the next tick is pointless.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SegmentError::SourceUnreachable { .. })
    }
}

fn exit_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "signal".to_string(),
    }
}

const STDERR_TAIL: usize = 512;

fn tail(s: &str) -> &str {
    let s = s.trim_end();
    if s.len() <= STDERR_TAIL {
        return s;
    }
    let mut start = s.len() - STDERR_TAIL;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

/// Converts a live source into a manifest plus segments.
#[async_trait]
pub trait Segmenter: Send + Sync + Debug {
    async fn segment(&self, job: &SegmentJob) -> Result<SegmentReport, SegmentError>;
}

/// ffmpeg stderr lines that mean the source is gone for good.
const UNREACHABLE_MARKERS: &[&str] = &[
    "Connection refused",
    "Specified stream not found",
    "No such file or directory",
    "Protocol not found",
    "Name or service not known",
];

/// Prefixes of stderr lines written by the input side of ffmpeg.
const INPUT_MARKERS: &[&str] = &["rtmp://", "rtmps://", "[tcp @", "[tls @", "[rtmp @"];

fn has_sequence_number(pattern: &Path) -> bool {
    let name = pattern
        .file_name()
        .map(|name| name.to_string_lossy())
        .unwrap_or_default();
    let Some((_, spec)) = name.split_once('%') else {
        return false;
    };
    spec.trim_start_matches(|c: char| c.is_ascii_digit())
        .starts_with('d')
}

#[derive(Debug, Clone)]
pub struct FfmpegSegmenter {
    program: String,
    log_level: String,
    codec_args: Vec<String>,
}

impl FfmpegSegmenter {
    pub fn new(cfg: &RecorderConfig) -> Self {
        Self {
            program: cfg.ffmpeg.clone(),
            log_level: cfg.ffmpeg_log_level.clone(),
            codec_args: cfg.codec_args.clone(),
        }
    }

    pub fn args(&self, job: &SegmentJob) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            self.log_level.as_str().into(),
            "-y".into(),
            "-f".into(),
            job.input_format.as_str().into(),
            "-i".into(),
            job.source.as_str().into(),
        ];
        args.extend(self.codec_args.iter().map(OsString::from));
        args.extend(["-t".into(), job.capture.as_secs().max(1).to_string().into()]);
        // The hls muxer refuses a segment name without a sequence number
        // unless it is told to expand the name as a strftime template.
        if !has_sequence_number(&job.segment_pattern) {
            args.extend(["-strftime".into(), "1".into()]);
        }
        args.extend([
            "-f".into(),
            "hls".into(),
            "-hls_time".into(),
            job.segment_secs.to_string().into(),
            "-hls_list_size".into(),
            job.list_size.to_string().into(),
            "-hls_flags".into(),
            "append_list".into(),
            "-hls_segment_filename".into(),
            job.segment_pattern.clone().into_os_string(),
            job.manifest.clone().into_os_string(),
        ]);
        args
    }
}

#[async_trait]
impl Segmenter for FfmpegSegmenter {
    async fn segment(&self, job: &SegmentJob) -> Result<SegmentReport, SegmentError> {
        let args = self.args(job);
        debug!(
            "[segmenter] {} {}",
            self.program,
            args.iter()
                .map(|arg| arg.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| SegmentError::Spawn {
                program: self.program.clone(),
                err,
            })?;

        // Dropping the future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(job.timeout, child.wait_with_output()).await {
            Ok(output) => output.map_err(SegmentError::Wait)?,
            Err(_) => return Err(SegmentError::Timeout(job.timeout)),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if output.status.success() {
            return Ok(SegmentReport { stdout, stderr });
        }

        if let Some(reason) = unreachable_reason(&stderr, &job.source) {
            return Err(SegmentError::SourceUnreachable {
                locator: job.source.clone(),
                reason: reason.to_string(),
            });
        }
        Err(SegmentError::Exited {
            code: output.status.code(),
            stdout,
            stderr,
        })
    }
}

/// The first stderr line reporting that `source` cannot be read. Lines about
/// the output files are not considered.
fn unreachable_reason<'a>(stderr: &'a str, source: &str) -> Option<&'a str> {
    stderr
        .lines()
        .filter(|line| {
            line.contains(source) || INPUT_MARKERS.iter().any(|marker| line.contains(marker))
        })
        .find(|line| UNREACHABLE_MARKERS.iter().any(|marker| line.contains(marker)))
        .map(str::trim)
}
