//! Tunables threaded through the scheduler, caches and search executor.
//!
//! Every field has the default named somewhere in the component design; there
//! is no global mutable config, only instances passed in via [`crate::services::Services`].

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for the KV store's `<key>.json` files and the index
    /// store's `<key>.<shard>.idx` files.
    pub cache_dir: PathBuf,
    /// Directory for per-failure text logs (`error <timestamp> <name>.txt`).
    pub errors_dir: PathBuf,

    /// Delay between cooperative-scheduler heat-ups (§4.D).
    pub delay_between_heat_ups: Duration,
    /// CPU usage percentage above which the resource monitor reports insufficient (§4.C).
    pub cpu_busy_threshold_pct: f64,
    /// Byte ceiling used to derive the 70%/90% memory-pressure thresholds (§4.C).
    pub memory_high_load_bytes: u64,

    /// Progress/notification throttle interval (§4.E).
    pub throttle_interval: Duration,
    /// Caption full-text cache inactivity eviction timer (§4.H).
    pub caption_cache_idle_timeout: Duration,
    /// Channel alias map debounce window before a dirty map is flushed (§4.M).
    pub alias_map_debounce: Duration,

    /// Concurrent video downloads within a shard's un-indexed branch (§5).
    pub unindexed_download_concurrency: usize,
    /// Batch channel capacity for the un-indexed producer/consumer pipeline (§4.J).
    pub unindexed_batch_capacity: usize,
    /// Number of trailing no-change insertions that trigger playlist early-return (§4.F).
    pub playlist_early_return_window: usize,
    /// Video count per contiguous shard window (§3 Playlist invariant).
    pub shard_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("cache"),
            errors_dir: PathBuf::from("errors"),
            delay_between_heat_ups: Duration::from_millis(200),
            cpu_busy_threshold_pct: 80.0,
            memory_high_load_bytes: 2 * 1024 * 1024 * 1024,
            throttle_interval: Duration::from_millis(300),
            caption_cache_idle_timeout: Duration::from_secs(1),
            alias_map_debounce: Duration::from_secs(5),
            unindexed_download_concurrency: 10,
            unindexed_batch_capacity: 10,
            playlist_early_return_window: 10,
            shard_size: 50,
        }
    }
}
