pub mod registry;
pub mod session;

pub use registry::{Registry, RegistryError};
pub use session::{RecordingSession, SessionHandle, SessionStatus};

/// Extract the stream id from a publish path such as `/live/cam01`.
///
/// The id is the second path component; `None` when the path has no such
/// component or the component cannot name a directory.
pub fn stream_id_from_path(path: &str) -> Option<&str> {
    let stream_id = path.trim_start_matches('/').split('/').nth(1)?;
    if is_valid_stream_id(stream_id) {
        Some(stream_id)
    } else {
        None
    }
}

/// A stream id becomes a directory name under the output root.
pub fn is_valid_stream_id(stream_id: &str) -> bool {
    !stream_id.is_empty()
        && stream_id != "."
        && stream_id != ".."
        && !stream_id.contains(['/', '\\', '\0'])
}

/// The URL the segmenter pulls a published path from.
pub fn source_locator(source_base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        source_base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
