//! Search Executor (§4.J): orchestrates indexed + un-indexed search, merges
//! across shards, re-scores, orders, and builds padded/highlighted matches.

use crate::caption_text::CaptionTextCache;
use crate::error::{Error, Result};
use crate::matched_text::{merge_padded_matches, IncludedMatch, MatchedText, PaddedMatch};
use crate::model::{ShardNumber, Video, VideoId};
use crate::services::Services;
use crate::text_index::{FieldHit, IndexField, TextIndexShard};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderBy {
    Score,
    Uploaded,
    Asc,
}

#[derive(Debug, Clone)]
pub struct SearchCommand {
    pub query: String,
    pub padding: usize,
    pub order_by: Vec<OrderBy>,
}

/// `uploaded` and `score` are mutually exclusive (§4.J step 5); caught at
/// pre-validation, not mid-search.
pub fn validate_order_by(order_by: &[OrderBy]) -> Result<()> {
    if order_by.contains(&OrderBy::Uploaded) && order_by.contains(&OrderBy::Score) {
        return Err(Error::input("order_by cannot combine 'uploaded' and 'score'"));
    }
    Ok(())
}

/// Rejects queries that are empty or contain only the reserved control
/// characters (§7 InputError, scenario S2).
pub fn validate_query(query: &str) -> Result<()> {
    if query.trim().is_empty() {
        return Err(Error::input("query is empty"));
    }
    const CONTROL_CHARS: &str = "*%|&\"~>?()=,";
    if query.chars().all(|c| CONTROL_CHARS.contains(c)) {
        return Err(Error::input("query contains only control characters"));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct CaptionTrackMatch {
    pub language_name: String,
    /// Playback offset, from the first caption in the matched span.
    pub at: u32,
    pub text: MatchedText,
}

#[derive(Debug, Clone)]
pub struct SearchResultItem {
    pub video_id: VideoId,
    pub score: f32,
    pub title_matches: Option<MatchedText>,
    pub description_matches: Vec<MatchedText>,
    pub keyword_matches: Vec<MatchedText>,
    pub caption_track_matches: Vec<CaptionTrackMatch>,
    pub uploaded_utc: Option<DateTime<Utc>>,
}

/// Runs a search over one shard's worth of candidates: the indexed branch
/// searches immediately; the un-indexed branch fetches through a bounded
/// producer-consumer pipeline, committing and searching in batches. The
/// caller groups candidates by shard and invokes this once per shard, via the
/// Cooperative Scheduler (§4.J step 3).
pub async fn search_shard(
    shard_key: &str,
    candidates: &[VideoId],
    command: &SearchCommand,
    services: &Services,
    cancel: CancellationToken,
) -> Result<Vec<SearchResultItem>> {
    let mut handle = match services.index_store.get(shard_key).await? {
        Some(h) => h,
        None => services.index_store.build(shard_key).await?,
    };

    let mut videos: HashMap<VideoId, Video> = HashMap::new();
    let mut indexed: HashSet<VideoId> = HashSet::new();

    for id in candidates {
        if handle.shard.contains(id) {
            if let Some(cached) = services.video_cache.get_cached(id)? {
                if !cached.unindexed_flag {
                    indexed.insert(id.clone());
                    videos.insert(id.clone(), cached);
                }
            }
        }
    }

    let mut results = Vec::new();

    if !indexed.is_empty() {
        let hits = handle.shard.search(&command.query, Some(&indexed))?;
        for hit in hits {
            let Some(video) = videos.get(&hit.video_id) else {
                continue;
            };
            results.push(build_result_item(
                video,
                &hit.fields,
                hit.score,
                command.padding,
                &services.caption_text_cache,
            ));
        }
    }

    let unindexed: Vec<VideoId> = candidates
        .iter()
        .filter(|id| !indexed.contains(*id))
        .cloned()
        .collect();

    if !unindexed.is_empty() {
        let concurrency = services.config.unindexed_download_concurrency.max(1);
        let batch_capacity = services.config.unindexed_batch_capacity.max(1);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let (tx, mut rx) = mpsc::channel(batch_capacity);

        for id in unindexed {
            let semaphore = semaphore.clone();
            let tx = tx.clone();
            let remote = services.remote.clone();
            let video_cache = services.video_cache.clone();
            tokio::spawn(async move {
                let permit = semaphore.acquire_owned().await.expect("semaphore never closed");
                let fetched = video_cache.get_video(&id, true, remote.as_ref()).await;
                drop(permit);
                let _ = tx.send((id, fetched)).await;
            });
        }
        drop(tx);

        handle.shard.begin_batch();
        let mut uncommitted: HashSet<VideoId> = HashSet::new();

        while let Some((id, fetched)) = rx.recv().await {
            if cancel.is_cancelled() {
                break;
            }
            let (mut video, notes) = fetched?;
            for note in notes {
                info!(target: "ytsearch.search_executor", video_id = %id, title = %note.title, "caption download notice");
            }
            handle.shard.add(&video)?;
            services.video_cache.mark_indexed(&mut video)?;
            videos.insert(id.clone(), video);
            uncommitted.insert(id);

            if uncommitted.len() >= batch_capacity {
                handle.shard.commit_batch()?;
                handle.save().await?;
                let hits = handle.shard.search(&command.query, Some(&uncommitted))?;
                for hit in hits {
                    let Some(video) = videos.get(&hit.video_id) else {
                        continue;
                    };
                    results.push(build_result_item(
                        video,
                        &hit.fields,
                        hit.score,
                        command.padding,
                        &services.caption_text_cache,
                    ));
                }
                handle.shard.begin_batch();
                uncommitted.clear();
            }
        }

        handle.shard.commit_batch()?;
        handle.save().await?;
        if !uncommitted.is_empty() {
            let hits = handle.shard.search(&command.query, Some(&uncommitted))?;
            for hit in hits {
                let Some(video) = videos.get(&hit.video_id) else {
                    continue;
                };
                results.push(build_result_item(
                    video,
                    &hit.fields,
                    hit.score,
                    command.padding,
                    &services.caption_text_cache,
                ));
            }
        }
    }

    Ok(results)
}

fn build_result_item(
    video: &Video,
    fields: &[FieldHit],
    score: f32,
    padding: usize,
    caption_cache: &CaptionTextCache,
) -> SearchResultItem {
    let mut title_matches = None;
    let mut description_matches = Vec::new();
    let mut keyword_matches = Vec::new();
    let mut caption_track_matches = Vec::new();

    for hit in fields {
        match &hit.field {
            IndexField::Title => {
                let matches = hit
                    .ranges
                    .iter()
                    .map(|&(s, e)| IncludedMatch { start: s, length: e - s })
                    .collect();
                title_matches = Some(MatchedText::new(video.title.clone(), matches));
            }
            IndexField::Description => {
                let padded: Vec<PaddedMatch> = hit
                    .ranges
                    .iter()
                    .map(|&(s, e)| {
                        PaddedMatch::from_absolute(s, e - s, padding, video.description.len())
                    })
                    .collect();
                for m in merge_padded_matches(padded) {
                    if video.description.is_empty() {
                        continue;
                    }
                    let text = video.description[m.start..=m.end].to_string();
                    description_matches.push(MatchedText::new(text, m.included));
                }
            }
            IndexField::Keywords => {
                keyword_matches.extend(keyword_matches_from_ranges(&video.keywords, &hit.ranges));
            }
            IndexField::Caption(language) => {
                if let Some(track) = video
                    .caption_tracks
                    .iter()
                    .flatten()
                    .find(|t| &t.language_name == language)
                {
                    caption_track_matches.extend(caption_matches_from_ranges(
                        video.id.as_str(),
                        track,
                        &hit.ranges,
                        padding,
                        caption_cache,
                    ));
                }
            }
        }
    }

    caption_track_matches.sort_by_key(|m| m.at);

    SearchResultItem {
        video_id: video.id.clone(),
        score,
        title_matches,
        description_matches,
        keyword_matches,
        caption_track_matches,
        uploaded_utc: video.uploaded_utc,
    }
}

/// Recovers which keyword a synthetic `keywords.join(" ")` offset belongs to,
/// and builds a location-relative `MatchedText` per matched keyword (§4.J).
fn keyword_matches_from_ranges(keywords: &[String], ranges: &[(usize, usize)]) -> Vec<MatchedText> {
    let mut boundaries = Vec::with_capacity(keywords.len());
    let mut offset = 0usize;
    for kw in keywords {
        boundaries.push((offset, offset + kw.len(), kw));
        offset += kw.len() + 1;
    }

    let mut by_keyword: HashMap<String, Vec<IncludedMatch>> = HashMap::new();
    for &(start, end) in ranges {
        if let Some((b_start, _, kw)) = boundaries.iter().find(|(bs, be, _)| start >= *bs && start < *be) {
            by_keyword.entry((*kw).clone()).or_default().push(IncludedMatch {
                start: start - b_start,
                length: end - start,
            });
        }
    }
    by_keyword
        .into_iter()
        .map(|(kw, matches)| MatchedText::new(kw, matches))
        .collect()
}

/// Builds caption-track matches (§4.J): pads and merges hit ranges into the
/// track's cached `full_text`, then maps each merged span back onto the
/// captions that produced it, via the Caption Full-Text cache (§4.H) rather
/// than recomputing from scratch on every match.
fn caption_matches_from_ranges(
    video_id: &str,
    track: &crate::model::CaptionTrack,
    ranges: &[(usize, usize)],
    padding: usize,
    caption_cache: &CaptionTextCache,
) -> Vec<CaptionTrackMatch> {
    let full_text = caption_cache.full_text(video_id, track);

    let padded: Vec<PaddedMatch> = ranges
        .iter()
        .map(|&(s, e)| PaddedMatch::from_absolute(s, e - s, padding, full_text.len()))
        .collect();

    let mut out = Vec::new();
    for m in merge_padded_matches(padded) {
        let spanning = caption_cache.captions_in_range(video_id, track, m.start, m.end);
        let Some(first) = spanning.first() else {
            continue;
        };
        let joined = spanning
            .iter()
            .map(|c| c.text.split_whitespace().collect::<Vec<_>>().join(" "))
            .collect::<Vec<_>>()
            .join(" ");
        out.push(CaptionTrackMatch {
            language_name: track.language_name.clone(),
            at: first.at,
            text: MatchedText::new(joined, m.included),
        });
    }
    out
}

/// Cross-shard re-score (§4.J step 4): replaces index-local scores with a
/// count-based proxy once more than one shard contributed results.
pub fn rescore_if_multi_shard(
    results_by_shard: Vec<Vec<SearchResultItem>>,
) -> Vec<SearchResultItem> {
    let touched = results_by_shard.iter().filter(|r| !r.is_empty()).count();
    let mut flat: Vec<SearchResultItem> = results_by_shard.into_iter().flatten().collect();
    if touched > 1 {
        for item in flat.iter_mut() {
            let title = item.title_matches.as_ref().map(|m| m.matches.len()).unwrap_or(0);
            let description = item.description_matches.iter().map(|m| m.matches.len()).sum::<usize>();
            let keywords = item.keyword_matches.iter().map(|m| m.matches.len()).sum::<usize>();
            let captions = item
                .caption_track_matches
                .iter()
                .map(|m| m.text.matches.len())
                .sum::<usize>();
            item.score = (title + description + keywords + captions) as f32;
        }
    }
    flat
}

/// Orders buffered results per §4.J step 5. `order_by` containing `uploaded`
/// or `score` triggers descending sort unless `asc` is also present;
/// otherwise completion order (the caller's existing order) is preserved.
pub fn order_results(mut results: Vec<SearchResultItem>, order_by: &[OrderBy]) -> Vec<SearchResultItem> {
    let descending = !order_by.contains(&OrderBy::Asc);
    if order_by.contains(&OrderBy::Score) {
        results.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal));
    } else if order_by.contains(&OrderBy::Uploaded) {
        results.sort_by_key(|r| r.uploaded_utc);
    } else {
        return results;
    }
    if descending {
        results.reverse();
    }
    results
}

/// Groups candidates by shard number (VideosScope candidates without a
/// playlist get shard `0`, per §4.J step 2).
pub fn group_by_shard(
    candidates: &[VideoId],
    shard_of: impl Fn(&VideoId) -> Option<ShardNumber>,
) -> HashMap<ShardNumber, Vec<VideoId>> {
    let mut groups: HashMap<ShardNumber, Vec<VideoId>> = HashMap::new();
    for id in candidates {
        let shard = shard_of(id).unwrap_or(0);
        groups.entry(shard).or_default().push(id.clone());
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_validation_rejects_empty_and_control_only() {
        assert!(validate_query("").is_err());
        assert!(validate_query("   ").is_err());
        assert!(validate_query("*|&").is_err());
        assert!(validate_query("rust").is_ok());
    }

    #[test]
    fn order_by_rejects_score_and_uploaded_together() {
        assert!(validate_order_by(&[OrderBy::Score, OrderBy::Uploaded]).is_err());
        assert!(validate_order_by(&[OrderBy::Score]).is_ok());
    }

    #[test]
    fn keyword_matches_recover_the_source_keyword() {
        let keywords = vec!["rust".to_string(), "async".to_string(), "tokio".to_string()];
        // "rust async tokio": rust=0..4, async=5..10, tokio=11..16
        let matches = keyword_matches_from_ranges(&keywords, &[(5, 10)]);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].text, "async");
    }

    #[test]
    fn rescore_applies_only_across_multiple_shards() {
        let single_shard = vec![vec![SearchResultItem {
            video_id: VideoId::new("a"),
            score: 99.0,
            title_matches: None,
            description_matches: Vec::new(),
            keyword_matches: Vec::new(),
            caption_track_matches: Vec::new(),
            uploaded_utc: None,
        }]];
        let result = rescore_if_multi_shard(single_shard);
        assert_eq!(result[0].score, 99.0);
    }
}
