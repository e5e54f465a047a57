//! TextIndex (§6, §4.I, §4.P): the injected full-text search capability.
//!
//! `TextIndex` is the factory/backend (open, save, delete a shard's on-disk
//! snapshot); `TextIndexShard` is a live, addressable index over `Video`
//! documents with dynamic per-language caption fields. The default
//! implementation (`TantivyTextIndex`, in `tantivy_backend`) is grounded on the
//! `tantivy` crate; tests exercise the trait directly so the search executor
//! never depends on tantivy's concrete types.

pub mod tantivy_backend;

use crate::error::Result;
use crate::model::{Video, VideoId};
use std::collections::HashSet;

pub use tantivy_backend::TantivyTextIndex;

/// A single match within one field of one document, as reported by `search`.
#[derive(Debug, Clone)]
pub struct FieldHit {
    pub field: IndexField,
    /// Byte offset ranges into the field's source text (title, description, a
    /// keyword, or a caption track's `full_text`).
    pub ranges: Vec<(usize, usize)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexField {
    Title,
    Description,
    Keywords,
    /// Dynamic per-language caption field (§4.I), named by language.
    Caption(String),
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub video_id: VideoId,
    /// Index-local relevance score; replaced by a cross-shard proxy when the
    /// search executor touches more than one shard (§4.J step 4).
    pub score: f32,
    pub fields: Vec<FieldHit>,
}

/// Fuzzy-search parameters derived from the documented formulas in §4.I, already
/// narrowed to whatever the concrete backend can express (§9 Open Question 1).
#[derive(Debug, Clone, Copy)]
pub struct FuzzyParams {
    pub max_edit_distance: u8,
    pub transposition_cost_one: bool,
}

impl FuzzyParams {
    /// `max_edit_distance = term_len / 3`; `max_sequential_edits = 1 if term_len < 6
    /// else term_len / 6` (floor, guaranteed >= 1). Tantivy's `FuzzyTermQuery` only
    /// accepts a single edit-distance in `[0, 2]` and a transposition flag, so the
    /// edit distance is clamped and sequential-edit tolerance collapses to that flag.
    pub fn for_term(term_len: usize) -> Self {
        let max_edit_distance = (term_len / 3).min(2) as u8;
        let max_sequential_edits = if term_len < 6 {
            1
        } else {
            (term_len / 6).max(1)
        };
        Self {
            max_edit_distance,
            transposition_cost_one: max_sequential_edits <= 1,
        }
    }
}

/// Factory/backend for shard persistence (§4.B/§6 `open`/`save`/`delete`).
#[async_trait::async_trait]
pub trait TextIndex: Send + Sync {
    async fn open(&self, shard_key: &str) -> Result<Option<Box<dyn TextIndexShard>>>;
    async fn create(&self, shard_key: &str) -> Result<Box<dyn TextIndexShard>>;
    async fn save(&self, shard_key: &str, shard: &dyn TextIndexShard) -> Result<()>;
    async fn delete(&self, shard_key: &str) -> Result<()>;
}

/// A live shard: an index over `Video` documents with dynamic per-language
/// caption fields (§4.I).
pub trait TextIndexShard: Send + Sync {
    /// Atomic upsert; clears the video's `unindexed_flag` conceptually (the
    /// caller, not the shard, owns that bit on `Video`).
    fn add(&mut self, video: &Video) -> Result<()>;
    fn remove(&mut self, id: &VideoId) -> Result<()>;

    /// Starts amortised-persistence mode; paired with `commit_batch`.
    fn begin_batch(&mut self);
    /// Ends amortised-persistence mode, flushing pending writes.
    fn commit_batch(&mut self) -> Result<()>;

    fn search(&self, query: &str, restrict: Option<&HashSet<VideoId>>) -> Result<Vec<SearchHit>>;

    fn contains(&self, id: &VideoId) -> bool;
    fn documents(&self) -> Vec<VideoId>;

    /// `true` if this shard has unsaved modifications since the last `save`.
    fn dirty(&self) -> bool;
}
