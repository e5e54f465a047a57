//! Index Store (§4.B): loads, builds, persists, and deletes per-shard text
//! indexes, enforcing "at most one live index per shard_key".

use crate::error::{Error, Result};
use crate::text_index::{TextIndex, TextIndexShard};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

pub struct IndexStore {
    backend: Arc<dyn TextIndex>,
    live: Mutex<HashSet<String>>,
}

impl IndexStore {
    pub fn new(backend: Arc<dyn TextIndex>) -> Self {
        Self {
            backend,
            live: Mutex::new(HashSet::new()),
        }
    }

    /// Loads an existing shard, or `None` if it has never been built.
    pub async fn get(self: &Arc<Self>, shard_key: &str) -> Result<Option<ShardHandleSimple>> {
        self.acquire(shard_key)?;
        match self.backend.open(shard_key).await {
            Ok(Some(shard)) => Ok(Some(ShardHandleSimple {
                store: self.clone(),
                key: shard_key.to_string(),
                shard,
            })),
            Ok(None) => {
                self.release(shard_key);
                Ok(None)
            }
            Err(e) => {
                self.release(shard_key);
                Err(e)
            }
        }
    }

    /// Creates a fresh, empty shard (registering it as live immediately).
    pub async fn build(self: &Arc<Self>, shard_key: &str) -> Result<ShardHandleSimple> {
        self.acquire(shard_key)?;
        match self.backend.create(shard_key).await {
            Ok(shard) => Ok(ShardHandleSimple {
                store: self.clone(),
                key: shard_key.to_string(),
                shard,
            }),
            Err(e) => {
                self.release(shard_key);
                Err(e)
            }
        }
    }

    pub async fn save(&self, shard_key: &str, shard: &dyn TextIndexShard) -> Result<()> {
        self.backend.save(shard_key, shard).await
    }

    pub async fn delete(&self, shard_key: &str) -> Result<()> {
        self.backend.delete(shard_key).await
    }

    fn acquire(&self, shard_key: &str) -> Result<()> {
        let mut live = self.live.lock().unwrap();
        if !live.insert(shard_key.to_string()) {
            return Err(Error::storage(format!(
                "shard '{shard_key}' already has a live handle"
            )));
        }
        Ok(())
    }

    fn release(&self, shard_key: &str) {
        self.live.lock().unwrap().remove(shard_key);
    }
}

/// A live shard handle over the `IndexStore`'s own liveness set (an `Arc<Self>`
/// is simpler to thread through than a separate registry type).
pub struct ShardHandleSimple {
    store: Arc<IndexStore>,
    key: String,
    pub shard: Box<dyn TextIndexShard>,
}

impl Drop for ShardHandleSimple {
    fn drop(&mut self) {
        self.store.release(&self.key);
    }
}

impl ShardHandleSimple {
    /// Persists this shard's current state through the owning store.
    pub async fn save(&self) -> Result<()> {
        self.store.save(&self.key, self.shard.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Video, VideoId};
    use crate::text_index::TantivyTextIndex;

    fn video(id: &str) -> Video {
        Video::new(VideoId::new(id), "title", "description")
    }

    #[tokio::test]
    async fn build_then_save_then_reopen_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(TantivyTextIndex::new(dir.path()).unwrap());
        let store = Arc::new(IndexStore::new(backend));

        {
            let mut handle = store.build("scope.0").await.unwrap();
            handle.shard.add(&video("abc")).unwrap();
            handle.save().await.unwrap();
        }

        let reopened = store.get("scope.0").await.unwrap().expect("shard exists");
        assert!(reopened.shard.contains(&VideoId::new("abc")));
    }

    #[tokio::test]
    async fn second_live_handle_for_same_shard_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(TantivyTextIndex::new(dir.path()).unwrap());
        let store = Arc::new(IndexStore::new(backend));

        let _first = store.build("scope.0").await.unwrap();
        let second = store.build("scope.0").await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn dropping_a_handle_frees_the_shard_key() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(TantivyTextIndex::new(dir.path()).unwrap());
        let store = Arc::new(IndexStore::new(backend));

        {
            let _first = store.build("scope.0").await.unwrap();
        }
        let second = store.build("scope.0").await;
        assert!(second.is_ok());
    }
}
