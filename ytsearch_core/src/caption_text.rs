//! Caption Full-Text (§4.H): aggregates a caption track into one text, maps
//! text offsets back to the originating caption, and caches both with a
//! timed, inactivity-based drop.

use crate::clock::SharedClock;
use crate::model::{Caption, CaptionTrack};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

/// `full_text` = captions' texts normalised to single internal spaces, joined
/// by a single space, skipping empties (§4.H).
pub fn full_text(track: &CaptionTrack) -> String {
    track
        .captions
        .iter()
        .flatten()
        .map(|c| normalize(&c.text))
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Offset (into `full_text`) -> originating caption, keyed by each caption's
/// starting byte offset. `caption_at_index(i)` is "the greatest key <= i"
/// (§4.H invariant), exposed via `CaptionIndex::at`.
pub fn caption_at_index(track: &CaptionTrack) -> CaptionIndex {
    let mut map = BTreeMap::new();
    let mut offset = 0usize;
    for caption in track.captions.iter().flatten() {
        let normalized = normalize(&caption.text);
        if normalized.is_empty() {
            continue;
        }
        map.insert(offset, caption.clone());
        offset += normalized.len() + 1; // +1 for the joining space
    }
    CaptionIndex(map)
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub struct CaptionIndex(BTreeMap<usize, Caption>);

impl CaptionIndex {
    /// The caption that originated the character at `offset`, per the §4.H
    /// invariant: the greatest key `<= offset`.
    pub fn at(&self, offset: usize) -> Option<&Caption> {
        self.0.range(..=offset).next_back().map(|(_, c)| c)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Every caption whose originating span overlaps `[start, end]`, ordered
    /// by `at`. Used to bridge a padded text match back to caption timing
    /// (§4.J "caption_track_matches").
    pub fn captions_in_range(&self, start: usize, end: usize) -> Vec<&Caption> {
        let first_key = self
            .0
            .range(..=start)
            .next_back()
            .map(|(k, _)| *k)
            .unwrap_or(start);
        self.0.range(first_key..=end).map(|(_, c)| c).collect()
    }
}

struct Entry {
    full_text: String,
    index: CaptionIndex,
    last_touched: std::time::Instant,
}

/// Lazily-built, thread-safe cache of `(full_text, caption_at_index)` per
/// track, evicted after `inactivity_timeout` of quiescence (§4.H). Cache
/// rebuild is idempotent: a rebuild after eviction reproduces the same
/// `full_text`/index for an unchanged track.
pub struct CaptionTextCache {
    entries: Mutex<std::collections::HashMap<String, Entry>>,
    inactivity_timeout: Duration,
    clock: SharedClock,
    notify: Notify,
}

impl CaptionTextCache {
    pub fn new(inactivity_timeout: Duration, clock: SharedClock) -> Self {
        Self {
            entries: Mutex::new(std::collections::HashMap::new()),
            inactivity_timeout,
            clock,
            notify: Notify::new(),
        }
    }

    fn key(video_id: &str, language_name: &str) -> String {
        format!("{video_id}\0{language_name}")
    }

    /// Returns the cached (or freshly built) full text for a track, touching
    /// its last-accessed time.
    pub fn full_text(&self, video_id: &str, track: &CaptionTrack) -> String {
        let key = Self::key(video_id, &track.language_name);
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(key).or_insert_with(|| Entry {
            full_text: full_text(track),
            index: caption_at_index(track),
            last_touched: std::time::Instant::now(),
        });
        entry.last_touched = std::time::Instant::now();
        entry.full_text.clone()
    }

    pub fn caption_at(&self, video_id: &str, track: &CaptionTrack, offset: usize) -> Option<Caption> {
        let key = Self::key(video_id, &track.language_name);
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(key).or_insert_with(|| Entry {
            full_text: full_text(track),
            index: caption_at_index(track),
            last_touched: std::time::Instant::now(),
        });
        entry.last_touched = std::time::Instant::now();
        entry.index.at(offset).cloned()
    }

    /// Every cached caption whose originating span overlaps `[start, end]`,
    /// ordered by `at` (§4.J "caption_track_matches"), reusing the same
    /// lazily-built entry as `full_text`/`caption_at`.
    pub fn captions_in_range(
        &self,
        video_id: &str,
        track: &CaptionTrack,
        start: usize,
        end: usize,
    ) -> Vec<Caption> {
        let key = Self::key(video_id, &track.language_name);
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(key).or_insert_with(|| Entry {
            full_text: full_text(track),
            index: caption_at_index(track),
            last_touched: std::time::Instant::now(),
        });
        entry.last_touched = std::time::Instant::now();
        entry
            .index
            .captions_in_range(start, end)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Drops entries idle for longer than `inactivity_timeout`; intended to be
    /// driven by a small periodic background task.
    pub fn evict_idle(&self) {
        let mut entries = self.entries.lock().unwrap();
        let timeout = self.inactivity_timeout;
        entries.retain(|_, e| e.last_touched.elapsed() < timeout);
    }

    pub async fn run_eviction_loop(&self, cancel: tokio_util::sync::CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.inactivity_timeout) => {
                    self.evict_idle();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_support::FixedClock;
    use crate::model::Caption;

    fn track_with(captions: Vec<(u32, &str)>) -> CaptionTrack {
        let mut t = CaptionTrack::new("en", "https://example.invalid/en.vtt");
        t.set_captions(
            captions
                .into_iter()
                .map(|(at, text)| Caption {
                    at,
                    text: text.to_string(),
                })
                .collect(),
        );
        t
    }

    #[test]
    fn full_text_joins_normalised_nonempty_captions() {
        let track = track_with(vec![(0, "hello   world"), (1, ""), (2, "again")]);
        assert_eq!(full_text(&track), "hello world again");
    }

    #[test]
    fn offset_lookup_is_floor_of_starts() {
        let track = track_with(vec![(0, "hello"), (2, "world")]);
        let index = caption_at_index(&track);
        // "hello world": h=0..5, space, world=6..11
        assert_eq!(index.at(0).unwrap().at, 0);
        assert_eq!(index.at(4).unwrap().at, 0);
        assert_eq!(index.at(6).unwrap().at, 2);
        assert_eq!(index.at(10).unwrap().at, 2);
    }

    #[test]
    fn cache_rebuild_is_idempotent() {
        let clock = FixedClock::new(chrono::Utc::now());
        let cache = CaptionTextCache::new(Duration::from_millis(1), clock);
        let track = track_with(vec![(0, "hello"), (2, "world")]);
        let first = cache.full_text("v1", &track);
        cache.evict_idle();
        std::thread::sleep(Duration::from_millis(5));
        cache.evict_idle();
        let second = cache.full_text("v1", &track);
        assert_eq!(first, second);
    }
}
