//! Byte sources for meshes, buffers and textures.
//!
//! Everything the loaders read goes through an [`AssetSource`], so a run can
//! be pointed at the network, the file system, or an in-memory fixture.

use std::path::Path;

use anyhow::{Context, anyhow, bail};
use base64::Engine;
use futures::future::BoxFuture;

pub trait AssetSource: Send + Sync {
    /// Fetch the raw bytes behind `uri`.
    fn fetch<'a>(&'a self, uri: &'a str) -> BoxFuture<'a, anyhow::Result<Vec<u8>>>;
}

/// Reads `http(s)://` URIs over the network, `data:` URIs inline, and
/// everything else (plain paths or `file://`) from disk.
#[derive(Clone, Debug, Default)]
pub struct DefaultSource {
    client: reqwest::Client,
}

impl DefaultSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AssetSource for DefaultSource {
    fn fetch<'a>(&'a self, uri: &'a str) -> BoxFuture<'a, anyhow::Result<Vec<u8>>> {
        Box::pin(async move {
            if is_data_uri(uri) {
                return decode_data_uri(uri);
            }
            if is_remote(uri) {
                let response = self
                    .client
                    .get(uri)
                    .send()
                    .await
                    .with_context(|| format!("requesting {uri}"))?
                    .error_for_status()?;
                return Ok(response.bytes().await?.to_vec());
            }
            let path = uri.strip_prefix("file://").unwrap_or(uri);
            tokio::fs::read(path)
                .await
                .with_context(|| format!("reading {path}"))
        })
    }
}

pub fn is_remote(uri: &str) -> bool {
    uri.starts_with("http://") || uri.starts_with("https://")
}

pub fn is_data_uri(uri: &str) -> bool {
    uri.starts_with("data:")
}

/// Decode a `data:[<mime>][;base64],<payload>` URI.
pub fn decode_data_uri(uri: &str) -> anyhow::Result<Vec<u8>> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| anyhow!("not a data uri"))?;
    let Some((header, payload)) = rest.split_once(',') else {
        bail!("data uri without payload");
    };
    if header.ends_with(";base64") {
        Ok(base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .context("decoding base64 data uri")?)
    } else {
        Ok(payload.as_bytes().to_vec())
    }
}

/// Resolve `uri` against the location of the asset that referenced it.
///
/// Absolute URIs (any scheme, `data:`, or rooted paths) are returned
/// unchanged.
pub fn resolve_relative(base: &str, uri: &str) -> String {
    if is_data_uri(uri) || uri.contains("://") || Path::new(uri).is_absolute() {
        return uri.to_string();
    }
    if is_remote(base) {
        if let Ok(joined) = reqwest::Url::parse(base).and_then(|b| b.join(uri)) {
            return joined.to_string();
        }
    }
    let (prefix, path) = match base.strip_prefix("file://") {
        Some(path) => ("file://", path),
        None => ("", base),
    };
    let parent = Path::new(path).parent().unwrap_or(Path::new(""));
    format!("{prefix}{}", parent.join(uri).display())
}
