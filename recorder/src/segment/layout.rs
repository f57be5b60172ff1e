use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};

use crate::config::DatePolicy;

pub const MANIFEST_NAME: &str = "index.m3u8";
pub const SEGMENT_EXT: &str = "ts";

/// Directory layout of the recordings:
/// `{root}/{stream}/{YYYY-MM-DD}/index.m3u8` plus `{epoch}.ts` segments.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
    date_policy: DatePolicy,
}

impl OutputLayout {
    pub fn new(root: PathBuf, date_policy: DatePolicy) -> Self {
        Self { root, date_policy }
    }

    /// Calendar date of `at` under the configured policy, `YYYY-MM-DD`.
    pub fn date_dir_name(&self, at: DateTime<Utc>) -> String {
        match self.date_policy {
            DatePolicy::Utc => at.format("%Y-%m-%d").to_string(),
            DatePolicy::Local => at.with_timezone(&Local).format("%Y-%m-%d").to_string(),
        }
    }

    pub fn stream_dir(&self, stream_id: &str, at: DateTime<Utc>) -> PathBuf {
        self.root.join(stream_id).join(self.date_dir_name(at))
    }
}

pub fn manifest_path(dir: &Path) -> PathBuf {
    dir.join(MANIFEST_NAME)
}

/// File name pattern of the segments written by the cycle started at `epoch`.
///
/// A capture window that fits in one segment produces exactly `{epoch}.ts`;
/// longer windows number their segments `{epoch}_000.ts`, `{epoch}_001.ts`...
pub fn segment_pattern(epoch: i64, capture_secs: u64, segment_secs: u64) -> String {
    if capture_secs <= segment_secs {
        format!("{epoch}.{SEGMENT_EXT}")
    } else {
        format!("{epoch}_%03d.{SEGMENT_EXT}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_stream_dir_utc() {
        let layout = OutputLayout::new(PathBuf::from("/data/rec"), DatePolicy::Utc);
        // 2024-01-15 12:00:00 UTC
        let at = Utc.timestamp_opt(1_705_320_000, 0).unwrap();
        assert_eq!(
            layout.stream_dir("cam01", at),
            PathBuf::from("/data/rec/cam01/2024-01-15")
        );
    }

    #[test]
    fn test_directory_rollover_at_midnight() {
        let layout = OutputLayout::new(PathBuf::from("rec"), DatePolicy::Utc);
        let before = Utc.with_ymd_and_hms(2024, 1, 15, 23, 59, 50).unwrap();
        let after = Utc.with_ymd_and_hms(2024, 1, 16, 0, 0, 20).unwrap();
        let a = layout.stream_dir("cam01", before);
        let b = layout.stream_dir("cam01", after);
        assert_ne!(a, b);
        assert_eq!(b, PathBuf::from("rec/cam01/2024-01-16"));
    }

    #[test]
    fn test_local_policy_uses_local_calendar() {
        let layout = OutputLayout::new(PathBuf::from("rec"), DatePolicy::Local);
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let expected = at.with_timezone(&Local).format("%Y-%m-%d").to_string();
        assert_eq!(layout.date_dir_name(at), expected);
    }

    #[test]
    fn test_segment_pattern() {
        assert_eq!(segment_pattern(1_705_320_000, 30, 30), "1705320000.ts");
        assert_eq!(segment_pattern(1_705_320_000, 60, 10), "1705320000_%03d.ts");
        assert_ne!(segment_pattern(100, 30, 30), segment_pattern(101, 30, 30));
    }

    #[test]
    fn test_manifest_path() {
        assert_eq!(
            manifest_path(Path::new("rec/cam01/2024-01-15")),
            PathBuf::from("rec/cam01/2024-01-15/index.m3u8")
        );
    }
}
