//! Core data model (§3): videos, caption tracks, playlists and scope validation results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Opaque 11-character YouTube video identifier. Total-ordered so it can key
/// canonical sets (e.g. shard membership, candidate dedup).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VideoId(pub String);

impl VideoId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VideoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caption {
    /// Seconds from the start of the track. Non-negative.
    pub at: u32,
    /// Non-empty after trim.
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptionTrack {
    pub language_name: String,
    pub source_url: String,
    /// Sorted by `at`, deduplicated. Absent if never downloaded.
    pub captions: Option<Vec<Caption>>,
    pub error: Option<String>,
    pub error_message: Option<String>,
}

impl CaptionTrack {
    pub fn new(language_name: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            language_name: language_name.into(),
            source_url: source_url.into(),
            captions: None,
            error: None,
            error_message: None,
        }
    }

    /// Sorts by `at` and removes consecutive duplicates, matching the Video Cache's
    /// "sanitising to distinct-and-sorted" contract (§4.G).
    pub fn set_captions(&mut self, mut captions: Vec<Caption>) {
        captions.sort_by(|a, b| a.at.cmp(&b.at).then_with(|| a.text.cmp(&b.text)));
        captions.dedup_by(|a, b| a.at == b.at && a.text == b.text);
        self.captions = Some(captions);
    }

    pub fn has_usable_captions(&self) -> bool {
        self.error.is_none() && self.captions.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Video {
    pub id: VideoId,
    pub title: String,
    pub description: String,
    pub channel: Option<String>,
    pub thumbnail_url: Option<String>,
    /// Ordered, as returned by the remote.
    pub keywords: Vec<String>,
    pub uploaded_utc: Option<DateTime<Utc>>,
    /// `None` ⇒ never indexed (§3 invariant).
    pub caption_tracks: Option<Vec<CaptionTrack>>,
    /// Forces re-indexing before this video's search results are trusted.
    pub unindexed_flag: bool,
}

impl Video {
    pub fn new(id: VideoId, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            description: description.into(),
            channel: None,
            thumbnail_url: None,
            keywords: Vec::new(),
            uploaded_utc: None,
            caption_tracks: None,
            unindexed_flag: true,
        }
    }

    /// Every caption track with successfully downloaded captions, keyed by language.
    pub fn usable_caption_tracks(&self) -> impl Iterator<Item = &CaptionTrack> {
        self.caption_tracks
            .iter()
            .flatten()
            .filter(|t| t.has_usable_captions())
    }
}

/// A partition of a playlist's videos, addressed by `<scope_key>.<shard_number>` (§4.I).
pub type ShardNumber = u32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playlist {
    pub title: String,
    pub thumbnail_url: Option<String>,
    pub channel: Option<String>,
    pub loaded_utc: DateTime<Utc>,
    /// Order reflects YouTube playlist order at last refresh; remotely-deleted
    /// videos are retained (§4.F invariant).
    pub videos: Vec<VideoId>,
    pub upload_dates: BTreeMap<VideoId, DateTime<Utc>>,
    pub shard_numbers: BTreeMap<VideoId, ShardNumber>,
}

impl Playlist {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            thumbnail_url: None,
            channel: None,
            loaded_utc: Utc::now(),
            videos: Vec::new(),
            upload_dates: BTreeMap::new(),
            shard_numbers: BTreeMap::new(),
        }
    }

    /// Deterministic contiguous-window shard assignment over insertion order (§3, §8 property 2).
    pub fn assign_shard_numbers(&mut self, shard_size: usize) {
        for (idx, id) in self.videos.iter().enumerate() {
            let shard = (idx / shard_size.max(1)) as ShardNumber;
            self.shard_numbers.insert(id.clone(), shard);
        }
    }

    pub fn shard_of(&self, id: &VideoId) -> Option<ShardNumber> {
        self.shard_numbers.get(id).copied()
    }

    /// Returns `true` if the video id was newly inserted (used by the refresh
    /// pager's "added" flag, §4.F).
    pub fn insert_if_absent(&mut self, id: VideoId) -> bool {
        if self.videos.contains(&id) {
            false
        } else {
            self.videos.push(id);
            true
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelAliasType {
    Id,
    Handle,
    Slug,
    User,
}

/// `(type, value)` key into the [`crate::alias_map::ChannelAliasMap`]; value
/// comparison is case-insensitive (§3 invariant, §8 property 9).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChannelAliasKey {
    pub alias_type: AliasTypeOrd,
    pub value_lower: String,
}

/// `ChannelAliasType` wrapper that derives `Ord`/`Hash` for use as a map key component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AliasTypeOrd {
    Id,
    Handle,
    Slug,
    User,
}

impl From<ChannelAliasType> for AliasTypeOrd {
    fn from(t: ChannelAliasType) -> Self {
        match t {
            ChannelAliasType::Id => AliasTypeOrd::Id,
            ChannelAliasType::Handle => AliasTypeOrd::Handle,
            ChannelAliasType::Slug => AliasTypeOrd::Slug,
            ChannelAliasType::User => AliasTypeOrd::User,
        }
    }
}

impl ChannelAliasKey {
    pub fn new(alias_type: ChannelAliasType, value: &str) -> Self {
        Self {
            alias_type: alias_type.into(),
            value_lower: value.to_lowercase(),
        }
    }
}

/// Ordering used across several aggregations (keyword lister, caption match sort).
pub fn cmp_by_key<T, K: Ord>(a: &T, b: &T, key: impl Fn(&T) -> K) -> Ordering {
    key(a).cmp(&key(b))
}
