//! Decoded sample cache.
//!
//! Buffers are keyed by logical id, decoded once, and shared as `Arc`s with
//! every voice that plays them. Concurrent loads of one id share a single
//! in-flight decode. Eviction drops the cache's reference only; a voice that
//! still plays an evicted buffer keeps it alive until the voice is disposed.

pub mod decode;
pub mod source;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;
use tokio::task::JoinSet;

pub use decode::decode_audio;
pub use source::{AssetSource, FileSource, MemorySource};
#[cfg(feature = "http")]
pub use source::HttpSource;

use crate::config::ManifestEntry;
use crate::error::{EngineError, Result};

/// Planar `f32` PCM.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        let channels = if channels.is_empty() { vec![Vec::new()] } else { channels };
        AudioBuffer {
            channels,
            sample_rate: sample_rate.max(1),
        }
    }

    pub fn mono(data: Vec<f32>, sample_rate: u32) -> Self {
        Self::new(vec![data], sample_rate)
    }

    /// Shortest channel length.
    pub fn frames(&self) -> usize {
        self.channels.iter().map(Vec::len).min().unwrap_or(0)
    }

    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        self.channels.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn byte_size(&self) -> usize {
        self.channels.iter().map(|c| c.len() * std::mem::size_of::<f32>()).sum()
    }

    /// Linear interpolation at a fractional frame position.
    #[inline]
    pub fn read_interpolated(&self, channel: usize, position: f64) -> f32 {
        let data = self.channel(channel);
        if position < 0.0 || data.is_empty() {
            return 0.0;
        }
        let idx = position as usize;
        let frac = (position - idx as f64) as f32;
        if idx + 1 < data.len() {
            data[idx] + (data[idx + 1] - data[idx]) * frac
        } else if idx < data.len() {
            data[idx]
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone)]
pub struct BufferEntry {
    pub id: String,
    pub buffer: Arc<AudioBuffer>,
    pub essential: bool,
}

impl BufferEntry {
    pub fn duration_seconds(&self) -> f64 {
        self.buffer.duration()
    }
}

/// Outcome of [`BufferManager::preload_essentials`] when no critical asset failed.
#[derive(Debug, Default)]
pub struct PreloadReport {
    pub loaded: Vec<String>,
    pub failed: Vec<(String, EngineError)>,
}

impl PreloadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub evicted: usize,
    /// Evicted buffers a live voice still holds; freed when that voice goes.
    pub still_referenced: usize,
    pub freed_bytes: usize,
}

type InFlight = Arc<OnceCell<Arc<AudioBuffer>>>;

pub struct BufferManager {
    source: Arc<dyn AssetSource>,
    cache: Mutex<HashMap<String, BufferEntry>>,
    in_flight: Mutex<HashMap<String, InFlight>>,
    decodes: AtomicUsize,
}

impl std::fmt::Debug for BufferManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferManager")
            .field("cached", &self.cache.lock().len())
            .field("in_flight", &self.in_flight.lock().len())
            .field("decodes", &self.decode_count())
            .finish()
    }
}

impl BufferManager {
    pub fn new(source: Arc<dyn AssetSource>) -> Self {
        BufferManager {
            source,
            cache: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            decodes: AtomicUsize::new(0),
        }
    }

    /// Fetch and decode `url` under `id`, once per id.
    pub async fn load_sample(&self, url: &str, id: &str, essential: bool) -> Result<Arc<AudioBuffer>> {
        self.load_with_digest(url, id, essential, None).await
    }

    /// Like [`load_sample`](Self::load_sample), rejecting bytes whose SHA-256
    /// does not match `sha256` (hex).
    pub async fn load_with_digest(
        &self,
        url: &str,
        id: &str,
        essential: bool,
        sha256: Option<&str>,
    ) -> Result<Arc<AudioBuffer>> {
        if let Some(entry) = self.cache.lock().get_mut(id) {
            // A later essential load pins an entry that was loaded as evictable.
            entry.essential |= essential;
            return Ok(entry.buffer.clone());
        }

        let cell = {
            let mut in_flight = self.in_flight.lock();
            // A decode may have landed between the lookup above and this lock.
            if let Some(entry) = self.cache.lock().get(id) {
                return Ok(entry.buffer.clone());
            }
            in_flight
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let result = cell
            .get_or_try_init(|| async {
                let bytes = self.source.fetch(url).await?;
                if let Some(expected) = sha256 {
                    let actual = format!("{:x}", Sha256::digest(&bytes));
                    if !actual.eq_ignore_ascii_case(expected) {
                        return Err(EngineError::Integrity {
                            id: id.to_string(),
                            expected: expected.to_string(),
                            actual,
                        });
                    }
                }
                let buffer = decode_audio(&bytes)?;
                self.decodes.fetch_add(1, Ordering::SeqCst);
                tracing::debug!(id, url, frames = buffer.frames(), "decoded");
                Ok(Arc::new(buffer))
            })
            .await
            .cloned();

        let buffer = match result {
            Ok(buffer) => {
                let mut cache = self.cache.lock();
                let entry = cache.entry(id.to_string()).or_insert_with(|| BufferEntry {
                    id: id.to_string(),
                    buffer: buffer.clone(),
                    essential,
                });
                entry.essential |= essential;
                Ok(entry.buffer.clone())
            }
            Err(e) => Err(e),
        };

        let mut in_flight = self.in_flight.lock();
        if in_flight.get(id).is_some_and(|c| Arc::ptr_eq(c, &cell)) {
            in_flight.remove(id);
        }
        buffer
    }

    /// Load every manifest entry concurrently. Non-critical failures are
    /// collected in the report; a critical failure aborts the rest.
    pub async fn preload_essentials(self: &Arc<Self>, manifest: &[ManifestEntry]) -> Result<PreloadReport> {
        let mut set = JoinSet::new();
        for entry in manifest.iter().cloned() {
            let manager = Arc::clone(self);
            set.spawn(async move {
                let result = manager
                    .load_with_digest(&entry.url, &entry.id, true, entry.sha256.as_deref())
                    .await;
                (entry, result)
            });
        }

        let mut report = PreloadReport::default();
        while let Some(joined) = set.join_next().await {
            let (entry, result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    tracing::warn!(error = %e, "preload task failed");
                    continue;
                }
            };
            match result {
                Ok(_) => report.loaded.push(entry.id),
                Err(e) if entry.critical => {
                    tracing::warn!(id = %entry.id, error = %e, "critical asset failed to load");
                    return Err(EngineError::CriticalAsset {
                        id: entry.id,
                        source: Box::new(e),
                    });
                }
                Err(e) => {
                    tracing::warn!(id = %entry.id, error = %e, "asset failed to load");
                    report.failed.push((entry.id, e));
                }
            }
        }
        tracing::info!(loaded = report.loaded.len(), failed = report.failed.len(), "preload finished");
        Ok(report)
    }

    pub fn get_buffer(&self, id: &str) -> Option<Arc<AudioBuffer>> {
        self.cache.lock().get(id).map(|e| e.buffer.clone())
    }

    pub fn has_buffer(&self, id: &str) -> bool {
        self.cache.lock().contains_key(id)
    }

    pub fn entry(&self, id: &str) -> Option<BufferEntry> {
        self.cache.lock().get(id).cloned()
    }

    /// Register already-decoded audio, replacing any entry under `id`.
    pub fn insert(&self, id: &str, buffer: AudioBuffer, essential: bool) -> Arc<AudioBuffer> {
        let buffer = Arc::new(buffer);
        self.cache.lock().insert(
            id.to_string(),
            BufferEntry {
                id: id.to_string(),
                buffer: buffer.clone(),
                essential,
            },
        );
        buffer
    }

    pub fn remove(&self, id: &str) -> bool {
        self.cache.lock().remove(id).is_some()
    }

    /// Evict every entry (only non-essential ones when `preserve_essential`).
    pub fn cleanup_unused(&self, preserve_essential: bool) -> CleanupReport {
        let mut report = CleanupReport::default();
        self.cache.lock().retain(|id, entry| {
            if preserve_essential && entry.essential {
                return true;
            }
            report.evicted += 1;
            if Arc::strong_count(&entry.buffer) > 1 {
                report.still_referenced += 1;
            } else {
                report.freed_bytes += entry.buffer.byte_size();
            }
            tracing::debug!(id = %id, "evicted");
            false
        });
        report
    }

    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.cache.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Successful decodes since construction.
    pub fn decode_count(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::decode::tests::wav_bytes;
    use super::*;
    use std::time::Duration;

    fn manager_with(assets: &[(&str, Vec<u8>)]) -> (Arc<BufferManager>, Arc<MemorySource>) {
        let source = Arc::new(MemorySource::new().with_latency(Duration::from_millis(5)));
        for (url, bytes) in assets {
            source.insert(url, bytes.clone());
        }
        (Arc::new(BufferManager::new(source.clone())), source)
    }

    #[test]
    fn interpolation_edges() {
        let buf = AudioBuffer::mono(vec![0.0, 1.0, 3.0], 10);
        assert_eq!(buf.read_interpolated(0, 0.5), 0.5);
        assert_eq!(buf.read_interpolated(0, 1.5), 2.0);
        assert_eq!(buf.read_interpolated(0, 2.0), 3.0);
        assert_eq!(buf.read_interpolated(0, 3.0), 0.0);
        assert_eq!(buf.read_interpolated(5, 0.0), 0.0);
        assert_eq!(buf.duration(), 0.3);
    }

    #[tokio::test]
    async fn load_caches_by_id() {
        let (mgr, source) = manager_with(&[("a.wav", wav_bytes(1, 8000, 80, 0.2))]);
        let first = mgr.load_sample("a.wav", "a", false).await.unwrap();
        let second = mgr.load_sample("a.wav", "a", false).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(source.fetch_count(), 1);
        assert_eq!(mgr.entry("a").unwrap().duration_seconds(), 0.01);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_loads_share_one_decode() {
        let (mgr, source) = manager_with(&[("music.wav", wav_bytes(2, 8000, 400, 0.1))]);
        let mut set = JoinSet::new();
        for _ in 0..8 {
            let mgr = mgr.clone();
            set.spawn(async move { mgr.load_sample("music.wav", "music", false).await });
        }
        let mut buffers = Vec::new();
        while let Some(r) = set.join_next().await {
            buffers.push(r.unwrap().unwrap());
        }
        assert!(buffers.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(mgr.decode_count(), 1);
        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test]
    async fn failed_load_is_an_error_and_not_cached() {
        let (mgr, _) = manager_with(&[("bad.wav", b"RIFF....WAVEjunk".to_vec())]);
        assert!(matches!(
            mgr.load_sample("missing.wav", "m", false).await,
            Err(EngineError::Fetch { .. })
        ));
        assert!(matches!(
            mgr.load_sample("bad.wav", "bad", false).await,
            Err(EngineError::Decode { .. })
        ));
        assert!(!mgr.has_buffer("m"));
        assert!(!mgr.has_buffer("bad"));
    }

    #[tokio::test]
    async fn digest_mismatch_is_rejected() {
        let bytes = wav_bytes(1, 8000, 10, 0.0);
        let good = format!("{:x}", Sha256::digest(&bytes));
        let (mgr, _) = manager_with(&[("x.wav", bytes)]);
        let err = mgr.load_with_digest("x.wav", "x", false, Some("00ff")).await.unwrap_err();
        assert!(matches!(err, EngineError::Integrity { .. }));
        assert!(mgr.load_with_digest("x.wav", "x", false, Some(&good)).await.is_ok());
    }

    #[test]
    fn cleanup_preserves_essentials_and_counts_references() {
        let mgr = BufferManager::new(Arc::new(MemorySource::new()));
        mgr.insert("a", AudioBuffer::mono(vec![0.0; 100], 100), true);
        mgr.insert("b", AudioBuffer::mono(vec![0.0; 100], 100), false);
        let held = mgr.insert("c", AudioBuffer::mono(vec![0.0; 10], 100), false);

        let report = mgr.cleanup_unused(true);
        assert!(mgr.has_buffer("a"));
        assert!(!mgr.has_buffer("b"));
        assert!(!mgr.has_buffer("c"));
        assert_eq!(report.evicted, 2);
        assert_eq!(report.still_referenced, 1);
        assert_eq!(report.freed_bytes, 400);
        assert_eq!(held.frames(), 10);

        mgr.cleanup_unused(false);
        assert!(mgr.is_empty());
    }

    #[tokio::test]
    async fn essential_reload_pins_entry() {
        let (mgr, _) = manager_with(&[("s.wav", wav_bytes(1, 8000, 10, 0.0))]);
        mgr.load_sample("s.wav", "s", false).await.unwrap();
        mgr.load_sample("s.wav", "s", true).await.unwrap();
        mgr.cleanup_unused(true);
        assert!(mgr.has_buffer("s"));
    }

    #[tokio::test]
    async fn preload_aggregates_non_critical_failures() {
        let (mgr, _) = manager_with(&[
            ("ui.wav", wav_bytes(1, 8000, 10, 0.0)),
            ("menu.wav", wav_bytes(2, 8000, 10, 0.0)),
        ]);
        let manifest = vec![
            ManifestEntry::new("menu", "menu.wav").critical(),
            ManifestEntry::new("ui", "ui.wav"),
            ManifestEntry::new("gone", "gone.wav"),
        ];
        let report = mgr.preload_essentials(&manifest).await.unwrap();
        assert_eq!(report.loaded.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "gone");
        assert!(mgr.entry("menu").unwrap().essential);
    }

    #[tokio::test]
    async fn critical_failure_fails_preload() {
        let (mgr, _) = manager_with(&[("ui.wav", wav_bytes(1, 8000, 10, 0.0))]);
        let manifest = vec![ManifestEntry::new("menu", "menu.wav").critical()];
        let err = mgr.preload_essentials(&manifest).await.unwrap_err();
        assert!(matches!(err, EngineError::CriticalAsset { ref id, .. } if id == "menu"));
    }
}
