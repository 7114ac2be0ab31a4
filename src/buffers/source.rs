//! Where encoded asset bytes come from.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use base64::Engine as _;
use parking_lot::Mutex;

use crate::error::{EngineError, Result};

pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send + 'a>>;

/// Resolves a URL to encoded bytes. Decoding happens in the buffer manager.
pub trait AssetSource: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a>;
}

/// Decode an RFC 2397 `data:` URL. Returns `None` for any other URL.
pub fn parse_data_url(url: &str) -> Option<Result<Vec<u8>>> {
    let rest = url.strip_prefix("data:")?;
    let Some((meta, payload)) = rest.split_once(',') else {
        return Some(Err(EngineError::Fetch {
            url: truncate(url),
            reason: "data url has no payload".into(),
        }));
    };
    if meta.ends_with(";base64") {
        Some(
            base64::engine::general_purpose::STANDARD
                .decode(payload.trim())
                .map_err(|e| EngineError::Fetch {
                    url: truncate(url),
                    reason: e.to_string(),
                }),
        )
    } else {
        Some(Ok(payload.as_bytes().to_vec()))
    }
}

fn truncate(url: &str) -> String {
    url.chars().take(48).collect()
}

/// Assets on the local filesystem, relative to a root directory.
#[derive(Debug, Clone)]
pub struct FileSource {
    root: PathBuf,
}

impl FileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileSource { root: root.into() }
    }
}

impl AssetSource for FileSource {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a> {
        Box::pin(async move {
            if let Some(data) = parse_data_url(url) {
                return data;
            }
            let path = self.root.join(url.trim_start_matches("file://"));
            tokio::fs::read(&path).await.map_err(|e| EngineError::Fetch {
                url: url.to_string(),
                reason: e.to_string(),
            })
        })
    }
}

/// Embedded assets, keyed by URL. Counts fetches and can simulate latency.
#[derive(Debug, Default)]
pub struct MemorySource {
    assets: Mutex<HashMap<String, Vec<u8>>>,
    fetches: AtomicUsize,
    latency: Option<Duration>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_asset(self, url: &str, bytes: Vec<u8>) -> Self {
        self.insert(url, bytes);
        self
    }

    pub fn insert(&self, url: &str, bytes: Vec<u8>) {
        self.assets.lock().insert(url.to_string(), bytes);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl AssetSource for MemorySource {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a> {
        Box::pin(async move {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            if let Some(data) = parse_data_url(url) {
                return data;
            }
            self.assets.lock().get(url).cloned().ok_or_else(|| EngineError::Fetch {
                url: url.to_string(),
                reason: "not found".into(),
            })
        })
    }
}

/// Assets over HTTP(S), optionally relative to a base URL.
#[cfg(feature = "http")]
#[derive(Debug, Clone, Default)]
pub struct HttpSource {
    client: reqwest::Client,
    base: Option<String>,
}

#[cfg(feature = "http")]
impl HttpSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base(base: impl Into<String>) -> Self {
        HttpSource {
            client: reqwest::Client::new(),
            base: Some(base.into()),
        }
    }

    fn resolve(&self, url: &str) -> String {
        match &self.base {
            Some(base) if !url.contains("://") => {
                format!("{}/{}", base.trim_end_matches('/'), url.trim_start_matches('/'))
            }
            _ => url.to_string(),
        }
    }
}

#[cfg(feature = "http")]
impl AssetSource for HttpSource {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a> {
        Box::pin(async move {
            if let Some(data) = parse_data_url(url) {
                return data;
            }
            let resolved = self.resolve(url);
            let response = self.client.get(&resolved).send().await?;
            if !response.status().is_success() {
                return Err(EngineError::Fetch {
                    url: resolved,
                    reason: format!("HTTP {}", response.status()),
                });
            }
            Ok(response.bytes().await?.to_vec())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_data_url() {
        let bytes = parse_data_url("data:audio/wav;base64,UklGRg==").unwrap().unwrap();
        assert_eq!(bytes, b"RIFF");
    }

    #[test]
    fn plain_data_url_and_other_urls() {
        assert_eq!(parse_data_url("data:,hello").unwrap().unwrap(), b"hello");
        assert!(parse_data_url("sfx/laser.wav").is_none());
        assert!(parse_data_url("data:nope").unwrap().is_err());
    }

    #[tokio::test]
    async fn memory_source_counts_fetches() {
        let source = MemorySource::new().with_asset("a.wav", vec![1, 2, 3]);
        assert_eq!(source.fetch("a.wav").await.unwrap(), vec![1, 2, 3]);
        assert!(matches!(source.fetch("b.wav").await, Err(EngineError::Fetch { .. })));
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn file_source_reads_relative_paths() {
        let dir = std::env::temp_dir().join(format!("nebula_audio_assets_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("blip.bin"), b"blip").unwrap();
        let source = FileSource::new(&dir);
        assert_eq!(source.fetch("blip.bin").await.unwrap(), b"blip");
        assert!(source.fetch("missing.bin").await.is_err());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
