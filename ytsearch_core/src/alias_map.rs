//! Channel Alias Map (§4.M): caches `(type, value) -> channel_id?` with
//! debounced, dirty-flag-gated persistence.

use crate::clock::SharedClock;
use crate::kv_store::KvStore;
use crate::error::Result;
use crate::model::{ChannelAliasKey, ChannelAliasType};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;

const STORAGE_KEY: &str = "known channel alias maps";

/// `entries` is a `Vec` rather than a `HashMap` because `ChannelAliasKey` is a
/// compound struct key, which JSON object maps can't represent directly.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredMap {
    entries: Vec<(ChannelAliasKey, Option<String>)>,
}

impl StoredMap {
    fn get(&self, key: &ChannelAliasKey) -> Option<Option<String>> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    fn insert(&mut self, key: ChannelAliasKey, value: Option<String>) {
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    fn remove(&mut self, key: &ChannelAliasKey) {
        self.entries.retain(|(k, _)| k != key);
    }
}

struct State {
    map: Option<StoredMap>,
    dirty: bool,
    last_write: std::time::Instant,
}

/// Process-wide, mutex-guarded, debounced alias cache. Every mutation marks
/// the map dirty; a background task calls `flush_if_idle` periodically and
/// drops the in-memory map once persisted, so the map is rebuilt lazily from
/// disk on next use (§4.M).
pub struct ChannelAliasMap {
    kv: KvStore,
    debounce: Duration,
    state: Mutex<State>,
    _clock: SharedClock,
}

impl ChannelAliasMap {
    pub fn new(kv: KvStore, debounce: Duration, clock: SharedClock) -> Self {
        Self {
            kv,
            debounce,
            state: Mutex::new(State {
                map: None,
                dirty: false,
                last_write: std::time::Instant::now(),
            }),
            _clock: clock,
        }
    }

    fn load_list(&self, state: &mut State) -> Result<()> {
        if state.map.is_none() {
            let loaded: Option<StoredMap> = self.kv.get(STORAGE_KEY)?;
            state.map = Some(loaded.unwrap_or_default());
        }
        Ok(())
    }

    pub fn lookup(&self, alias_type: ChannelAliasType, value: &str) -> Result<Option<Option<String>>> {
        let mut state = self.state.lock().unwrap();
        self.load_list(&mut state)?;
        let key = ChannelAliasKey::new(alias_type, value);
        Ok(state.map.as_ref().unwrap().get(&key))
    }

    /// `channel_id = None` records a confirmed "not found" (§3 invariant).
    pub fn add_entry(&self, alias_type: ChannelAliasType, value: &str, channel_id: Option<String>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        self.load_list(&mut state)?;
        let key = ChannelAliasKey::new(alias_type, value);
        state.map.as_mut().unwrap().insert(key, channel_id);
        state.dirty = true;
        state.last_write = std::time::Instant::now();
        Ok(())
    }

    pub fn remove_entry(&self, alias_type: ChannelAliasType, value: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        self.load_list(&mut state)?;
        let key = ChannelAliasKey::new(alias_type, value);
        state.map.as_mut().unwrap().remove(&key);
        state.dirty = true;
        state.last_write = std::time::Instant::now();
        Ok(())
    }

    /// If dirty and idle for at least `debounce`, persists and drops the
    /// in-memory map to free memory. Intended to be driven by a periodic
    /// background task; idempotent when called repeatedly.
    pub fn flush_if_idle(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.dirty {
            return Ok(());
        }
        if state.last_write.elapsed() < self.debounce {
            return Ok(());
        }
        if let Some(map) = state.map.take() {
            self.kv.set(STORAGE_KEY, Some(&map))?;
        }
        state.dirty = false;
        Ok(())
    }

    /// Persists immediately regardless of the debounce window, if dirty.
    /// Intended for an explicit shutdown path, where waiting out the debounce
    /// isn't safe.
    pub fn flush_now(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.dirty {
            return Ok(());
        }
        if let Some(map) = state.map.take() {
            self.kv.set(STORAGE_KEY, Some(&map))?;
        }
        state.dirty = false;
        Ok(())
    }

    pub async fn run_debounce_loop(&self, cancel: tokio_util::sync::CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = self.flush_if_idle();
                    break;
                }
                _ = tokio::time::sleep(self.debounce) => {
                    let _ = self.flush_if_idle();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::system_clock;

    #[test]
    fn case_insensitive_lookup_finds_mixed_case_entry() {
        let dir = tempfile::tempdir().unwrap();
        let map = ChannelAliasMap::new(
            KvStore::new(dir.path()).unwrap(),
            Duration::from_millis(1),
            system_clock(),
        );
        map.add_entry(ChannelAliasType::Handle, "SomeHandle", Some("UC123".into()))
            .unwrap();
        let found = map.lookup(ChannelAliasType::Handle, "somehandle").unwrap();
        assert_eq!(found, Some(Some("UC123".to_string())));
    }

    #[test]
    fn not_found_is_a_valid_cached_result() {
        let dir = tempfile::tempdir().unwrap();
        let map = ChannelAliasMap::new(
            KvStore::new(dir.path()).unwrap(),
            Duration::from_millis(1),
            system_clock(),
        );
        map.add_entry(ChannelAliasType::Slug, "missing", None).unwrap();
        let found = map.lookup(ChannelAliasType::Slug, "missing").unwrap();
        assert_eq!(found, Some(None));
    }

    #[test]
    fn flush_persists_and_clears_dirty_flag() {
        let dir = tempfile::tempdir().unwrap();
        let map = ChannelAliasMap::new(
            KvStore::new(dir.path()).unwrap(),
            Duration::from_millis(0),
            system_clock(),
        );
        map.add_entry(ChannelAliasType::Id, "UC1", Some("UC1".into())).unwrap();
        std::thread::sleep(Duration::from_millis(2));
        map.flush_if_idle().unwrap();

        let reloaded = map.lookup(ChannelAliasType::Id, "UC1").unwrap();
        assert_eq!(reloaded, Some(Some("UC1".to_string())));
    }
}
