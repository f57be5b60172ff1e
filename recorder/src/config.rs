use std::{env, net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub http: Http,
    #[serde(default)]
    pub ingest: Ingest,
    #[serde(default)]
    pub recorder: RecorderConfig,
    #[serde(default)]
    pub log: Log,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Http {
    /// Address the ingest server calls back on
    #[serde(default = "default_http_listen")]
    pub listen: SocketAddr,
    #[serde(default)]
    pub cors: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Ingest {
    /// Base URL the segmenter pulls published streams from
    #[serde(default = "default_source_base")]
    pub source_base: String,
    /// Container format of the pulled stream
    #[serde(default = "default_input_format")]
    pub input_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Log {
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatePolicy {
    #[default]
    Utc,
    Local,
}

/// What to do with a publish for a stream that is already recording.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Refuse the new publish and keep the running recording
    #[default]
    Reject,
    /// Stop the running recording and start over once it has drained
    Replace,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Root of the `<stream>/<date>/` tree
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,

    /// Seconds between two segmentation passes
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Seconds of live input captured by one cycle
    #[serde(default = "default_capture_secs")]
    pub capture_secs: u64,

    /// Target duration of one HLS segment
    #[serde(default = "default_segment_secs")]
    pub segment_secs: u64,

    /// Entries kept in the playlist, older ones age out (files stay on disk)
    #[serde(default = "default_list_size")]
    pub list_size: u32,

    /// Consecutive failed cycles after which a stream is torn down
    #[serde(default = "default_fatal_threshold")]
    pub fatal_threshold: u32,

    /// Extra seconds a cycle may run past its capture window before it is killed
    #[serde(default = "default_timeout_grace_secs")]
    pub timeout_grace_secs: u64,

    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,

    #[serde(default = "default_ffmpeg_log_level")]
    pub ffmpeg_log_level: String,

    /// Codec arguments placed between input and output, e.g. ["-c", "copy"]
    #[serde(default = "default_codec_args")]
    pub codec_args: Vec<String>,

    #[serde(default)]
    pub date_policy: DatePolicy,

    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
}

fn default_http_listen() -> SocketAddr {
    SocketAddr::from_str(&format!(
        "0.0.0.0:{}",
        env::var("PORT").unwrap_or(String::from("8000"))
    ))
    .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 8000)))
}

fn default_source_base() -> String {
    "rtmp://127.0.0.1:1935".to_string()
}

fn default_input_format() -> String {
    "flv".to_string()
}

fn default_log_level() -> String {
    env::var("LOG_LEVEL").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "debug".to_string()
        } else {
            "info".to_string()
        }
    })
}

fn default_output_root() -> PathBuf {
    PathBuf::from("./Recordings")
}

fn default_interval_secs() -> u64 {
    30
}

fn default_capture_secs() -> u64 {
    30
}

fn default_segment_secs() -> u64 {
    30
}

fn default_list_size() -> u32 {
    5
}

fn default_fatal_threshold() -> u32 {
    3
}

fn default_timeout_grace_secs() -> u64 {
    15
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_ffmpeg_log_level() -> String {
    "warning".to_string()
}

fn default_codec_args() -> Vec<String> {
    vec!["-c".to_string(), "copy".to_string()]
}

impl Default for Http {
    fn default() -> Self {
        Self {
            listen: default_http_listen(),
            cors: Default::default(),
        }
    }
}

impl Default for Ingest {
    fn default() -> Self {
        Self {
            source_base: default_source_base(),
            input_format: default_input_format(),
        }
    }
}

impl Default for Log {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            output_root: default_output_root(),
            interval_secs: default_interval_secs(),
            capture_secs: default_capture_secs(),
            segment_secs: default_segment_secs(),
            list_size: default_list_size(),
            fatal_threshold: default_fatal_threshold(),
            timeout_grace_secs: default_timeout_grace_secs(),
            ffmpeg: default_ffmpeg(),
            ffmpeg_log_level: default_ffmpeg_log_level(),
            codec_args: default_codec_args(),
            date_policy: Default::default(),
            duplicate_policy: Default::default(),
        }
    }
}

impl RecorderConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn capture_window(&self) -> Duration {
        Duration::from_secs(self.capture_secs)
    }

    /// Hard upper bound of one segmenter run.
    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.capture_secs + self.timeout_grace_secs)
    }
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        let source_base = self.ingest.source_base.to_lowercase();
        if !source_base.starts_with("rtmp://") && !source_base.starts_with("rtmps://") {
            anyhow::bail!(
                "Invalid ingest source_base: {}. Must be rtmp:// or rtmps://",
                self.ingest.source_base
            );
        }

        let recorder = &self.recorder;
        // Cycle names have second resolution, a sub-second interval would reuse them.
        if recorder.interval_secs == 0 {
            anyhow::bail!("recorder.interval_secs must be at least 1");
        }
        if recorder.capture_secs == 0 {
            anyhow::bail!("recorder.capture_secs must be at least 1");
        }
        if recorder.segment_secs == 0 {
            anyhow::bail!("recorder.segment_secs must be at least 1");
        }
        if recorder.list_size == 0 {
            anyhow::bail!("recorder.list_size must be at least 1");
        }
        if recorder.fatal_threshold == 0 {
            anyhow::bail!("recorder.fatal_threshold must be at least 1");
        }
        if recorder.ffmpeg.trim().is_empty() {
            anyhow::bail!("recorder.ffmpeg cannot be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.recorder.interval(), Duration::from_secs(30));
        assert_eq!(cfg.recorder.capture_window(), Duration::from_secs(30));
        assert_eq!(cfg.recorder.list_size, 5);
        assert_eq!(cfg.recorder.date_policy, DatePolicy::Utc);
        assert_eq!(cfg.recorder.duplicate_policy, DuplicatePolicy::Reject);
    }

    #[test]
    fn test_parse_partial_toml() {
        let cfg: Config = toml::from_str(
            r#"
            [ingest]
            source_base = "rtmp://10.0.0.2:1935"

            [recorder]
            output_root = "/var/lib/liverec"
            interval_secs = 10
            date_policy = "local"
            duplicate_policy = "replace"
            "#,
        )
        .unwrap();

        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.ingest.source_base, "rtmp://10.0.0.2:1935");
        assert_eq!(cfg.ingest.input_format, "flv");
        assert_eq!(cfg.recorder.output_root, PathBuf::from("/var/lib/liverec"));
        assert_eq!(cfg.recorder.interval_secs, 10);
        assert_eq!(cfg.recorder.capture_secs, 30);
        assert_eq!(cfg.recorder.date_policy, DatePolicy::Local);
        assert_eq!(cfg.recorder.duplicate_policy, DuplicatePolicy::Replace);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut cfg = Config::default();
        cfg.recorder.interval_secs = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.ingest.source_base = "http://127.0.0.1:8080".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.recorder.fatal_threshold = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.recorder.ffmpeg = " ".to_string();
        assert!(cfg.validate().is_err());
    }
}
