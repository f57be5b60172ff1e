use std::fs::read_to_string;
use std::path::Path;

use anyhow::Context;
use serde::de::DeserializeOwned;
use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins over the filter derived from the config file.
pub fn set_log(env_filter: String) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new(env_filter)))
        .compact()
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(true)
        .init();
}

/// Load `<name>.toml`.
///
/// An explicit `path` must exist. Without one, `./<name>.toml` and then
/// `/etc/<name>/<name>.toml` are tried, and the defaults are used when
/// neither is present. A file that exists but does not parse is an error.
pub fn load<T>(name: &str, path: Option<String>) -> anyhow::Result<T>
where
    T: DeserializeOwned + Default,
{
    let content = match path {
        Some(path) => Some(
            read_to_string(&path).with_context(|| format!("read config file {path}"))?,
        ),
        None => [format!("{name}.toml"), format!("/etc/{name}/{name}.toml")]
            .iter()
            .find(|candidate| Path::new(candidate).is_file())
            .map(|candidate| {
                read_to_string(candidate).with_context(|| format!("read config file {candidate}"))
            })
            .transpose()?,
    };

    match content {
        Some(content) => toml::from_str(&content).context("parse config"),
        None => {
            tracing::debug!("no {name}.toml found, using defaults");
            Ok(T::default())
        }
    }
}
