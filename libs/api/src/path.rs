/// Called by the ingest server when a publisher starts pushing.
pub const HOOK_PUBLISH: &str = "/api/hooks/on_publish";
/// Called by the ingest server when a publisher goes away.
pub const HOOK_PUBLISH_DONE: &str = "/api/hooks/on_publish_done";

pub const STREAMS: &str = "/api/streams/";

pub fn streams(stream: &str) -> String {
    format!("/api/streams/{}", stream)
}
