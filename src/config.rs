//! Runtime defaults and DB-backed overrides for the catalog engine.
//!
//! This is intentionally not a configuration-file layering system — there is
//! no search path, no env-var precedence chain. Defaults live here; the only
//! override mechanism is the `app_settings` key-value table on the Store
//! itself, mirrored through `load_config`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::store::Store;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Background hashing worker count. 0 means auto-detect.
    pub hash_worker_count: usize,
    /// Bounded mpsc channel capacity between scanner and hash workers.
    pub hash_channel_capacity: usize,
    /// SQLite busy-timeout applied to every connection.
    pub busy_timeout: Duration,
    /// Hamming-distance threshold (bits, out of 64) for duplicate matching.
    pub duplicate_threshold: u32,
    /// Files above this size are skipped by the scanner.
    pub max_file_size_mb: u64,
    /// Whether dot-prefixed files/directories are skipped during scan.
    pub skip_hidden: bool,
    /// Filenames ignored outright regardless of extension.
    pub ignore_patterns: Vec<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            hash_worker_count: 0, // 0 = auto-detect
            hash_channel_capacity: 100,
            busy_timeout: Duration::from_secs(5),
            duplicate_threshold: 5,
            max_file_size_mb: 100,
            skip_hidden: true,
            ignore_patterns: vec!["Thumbs.db".to_string(), ".DS_Store".to_string()],
        }
    }
}

/// Loads defaults, then applies any overrides persisted in `app_settings`,
/// auto-detecting the hash worker count when left at 0.
pub async fn load_config(store: &Store) -> CatalogConfig {
    let mut config = CatalogConfig::default();

    if let Ok(Some(val)) = store.get_setting("hash_worker_count").await {
        if let Some(v) = val.as_u64() {
            config.hash_worker_count = v as usize;
        }
    }
    if let Ok(Some(val)) = store.get_setting("duplicate_threshold").await {
        if let Some(v) = val.as_u64() {
            config.duplicate_threshold = v as u32;
        }
    }

    if config.hash_worker_count == 0 {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2);
        config.hash_worker_count = std::cmp::max(1, std::cmp::min(available, 2));
        tracing::info!(
            available_parallelism = available,
            chosen = config.hash_worker_count,
            "auto-detected hash worker count"
        );
    }

    config
}
