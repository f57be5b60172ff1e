use serde::{Deserialize, Serialize};

/// Form body of the nginx-rtmp style `on_publish` / `on_publish_done`
/// callbacks. Unknown fields are ignored.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct PublishHook {
    pub app: String,
    pub name: String,
    #[serde(default)]
    pub addr: Option<String>,
    #[serde(default)]
    pub call: Option<String>,
    /// Connection id assigned by the ingest server
    #[serde(default)]
    pub clientid: Option<String>,
    #[serde(default, rename = "tcurl")]
    pub tc_url: Option<String>,
}

impl PublishHook {
    /// The publish path as the ingest server sees it, `/<app>/<name>`.
    pub fn path(&self) -> String {
        format!(
            "/{}/{}",
            self.app.trim_matches('/'),
            self.name.trim_start_matches('/')
        )
    }
}
