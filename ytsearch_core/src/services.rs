//! Services (§4.N, §9): the explicit dependency bundle that replaces ambient
//! "current task scheduler" / static service locators. Executors take a
//! `&Services` instead of reaching for globals.

use crate::alias_map::ChannelAliasMap;
use crate::caption_text::CaptionTextCache;
use crate::clock::SharedClock;
use crate::config::Config;
use crate::index_store::IndexStore;
use crate::kv_store::KvStore;
use crate::playlist_cache::PlaylistCache;
use crate::remote::Remote;
use crate::resource_monitor::ResourceMonitor;
use crate::scheduler::Scheduler;
use crate::text_index::TantivyTextIndex;
use crate::video_cache::VideoCache;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct Services {
    pub config: Config,
    pub clock: SharedClock,
    pub remote: Arc<dyn Remote>,
    pub kv_store: KvStore,
    pub index_store: Arc<IndexStore>,
    pub resource_monitor: Arc<ResourceMonitor>,
    pub scheduler: Scheduler,
    pub playlist_cache: PlaylistCache,
    pub video_cache: VideoCache,
    pub caption_text_cache: Arc<CaptionTextCache>,
    pub alias_map: Arc<ChannelAliasMap>,
    /// Cancels the alias-map debounce loop and the caption cache's eviction
    /// loop, spawned by `build`. The CLI cancels this on exit; it does not
    /// itself guarantee a final flush (process exit can outrace the spawned
    /// task), so callers needing a guaranteed flush should call
    /// `alias_map.flush_now()` directly.
    pub shutdown: CancellationToken,
}

impl Services {
    /// Wires every component against one cache root, using the default
    /// backends (`YoutubeRemote`, `TantivyTextIndex`, the system clock).
    pub fn build(cache_root: impl AsRef<Path>, config: Config) -> crate::error::Result<Self> {
        let cache_root = cache_root.as_ref();
        let clock = crate::clock::system_clock();
        let kv_store = KvStore::new(cache_root.join("kv"))?;
        let index_backend = Arc::new(TantivyTextIndex::new(cache_root.join("indexes"))?);
        let index_store = Arc::new(IndexStore::new(index_backend));
        let resource_monitor = Arc::new(ResourceMonitor::new(config.memory_high_load_bytes));
        let scheduler = Scheduler::new(resource_monitor.clone(), config.delay_between_heat_ups);
        let playlist_cache = PlaylistCache::new(kv_store.clone(), clock.clone(), config.clone());
        let video_cache = VideoCache::new(kv_store.clone());
        let caption_text_cache = Arc::new(CaptionTextCache::new(config.caption_cache_idle_timeout, clock.clone()));
        let alias_map = Arc::new(ChannelAliasMap::new(kv_store.clone(), config.alias_map_debounce, clock.clone()));
        let shutdown = CancellationToken::new();

        {
            let alias_map = alias_map.clone();
            let cancel = shutdown.child_token();
            tokio::spawn(async move { alias_map.run_debounce_loop(cancel).await });
        }
        {
            let caption_text_cache = caption_text_cache.clone();
            let cancel = shutdown.child_token();
            tokio::spawn(async move { caption_text_cache.run_eviction_loop(cancel).await });
        }

        Ok(Self {
            config,
            clock,
            remote: Arc::new(crate::remote::YoutubeRemote::new()),
            kv_store,
            index_store,
            resource_monitor,
            scheduler,
            playlist_cache,
            video_cache,
            caption_text_cache,
            alias_map,
            shutdown,
        })
    }
}
