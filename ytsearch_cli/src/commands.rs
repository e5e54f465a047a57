use owo_colors::OwoColorize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use ytsearch_core::error::Result;
use ytsearch_core::model::VideoId;
use ytsearch_core::scheduler::ColdTask;
use ytsearch_core::scope::{validate_channel_alias, PlaylistLikeKind};
use ytsearch_core::search::{
    group_by_shard, order_results, rescore_if_multi_shard, search_shard, validate_order_by,
    validate_query, OrderBy, SearchCommand, SearchResultItem,
};
use ytsearch_core::Services;

pub fn parse_order_by(order_by: Option<&str>, asc: bool) -> Vec<OrderBy> {
    let mut out = Vec::new();
    match order_by {
        Some("score") => out.push(OrderBy::Score),
        Some("uploaded") => out.push(OrderBy::Uploaded),
        _ => {}
    }
    if asc {
        out.push(OrderBy::Asc);
    }
    out
}

/// Resolves `alias`/`kind` to a `(scope_key, candidate video ids, shard lookup)`
/// triple, refreshing the playlist cache as needed.
async fn resolve_scope(
    services: &Arc<Services>,
    alias: &str,
    kind: &str,
    skip: usize,
    take: usize,
    cache_hours: i64,
) -> Result<(String, Vec<VideoId>, ytsearch_core::model::Playlist)> {
    let cancel = CancellationToken::new();
    let (scope_key, playlist_kind) = if kind == "playlist" {
        (alias.to_string(), PlaylistLikeKind::Playlist)
    } else {
        let (channel_id, _stub) =
            validate_channel_alias(alias, services.remote.as_ref(), &services.alias_map).await?;
        (channel_id, PlaylistLikeKind::Channel)
    };

    let outcome = services
        .playlist_cache
        .refresh(
            &scope_key,
            playlist_kind,
            skip,
            take,
            cache_hours as f64,
            services.remote.clone(),
            cancel,
            None,
        )
        .await?;

    let playlist = outcome.playlist;
    let end = (skip + take).min(playlist.videos.len());
    let candidates = if skip >= playlist.videos.len() {
        Vec::new()
    } else {
        playlist.videos[skip..end].to_vec()
    };
    Ok((scope_key, candidates, playlist))
}

#[allow(clippy::too_many_arguments)]
pub async fn run_search(
    services: &Arc<Services>,
    alias: &str,
    query: &str,
    kind: &str,
    skip: usize,
    take: usize,
    cache_hours: i64,
    padding: usize,
    order_by: Vec<OrderBy>,
) -> Result<()> {
    validate_query(query)?;
    validate_order_by(&order_by)?;

    let (scope_key, candidates, playlist) =
        resolve_scope(services, alias, kind, skip, take, cache_hours).await?;

    let groups = group_by_shard(&candidates, |id| playlist.shard_of(id));
    let command = SearchCommand {
        query: query.to_string(),
        padding,
        order_by: order_by.clone(),
    };

    let tasks: Vec<ColdTask<Vec<SearchResultItem>>> = groups
        .into_iter()
        .map(|(shard_number, ids)| {
            let shard_key = format!("{scope_key}.{shard_number}");
            let services = services.clone();
            let command = command.clone();
            ColdTask::new(shard_key.clone(), move |token| async move {
                search_shard(&shard_key, &ids, &command, &services, token).await
            })
        })
        .collect();

    let cancel = CancellationToken::new();
    let results_by_shard = services.scheduler.run_all(tasks, cancel).await?;

    let flat = rescore_if_multi_shard(results_by_shard);
    let ordered = order_results(flat, &order_by);

    if ordered.is_empty() {
        println!("{}", "No matches.".dimmed());
        return Ok(());
    }

    for item in &ordered {
        println!(
            "{}  {}",
            item.video_id.as_str().cyan().bold(),
            format!("score {:.1}", item.score).dimmed()
        );
        if let Some(title) = &item.title_matches {
            println!("  title: {}", highlight(title));
        }
        for d in &item.description_matches {
            println!("  desc:  {}", highlight(d));
        }
        for k in &item.keyword_matches {
            println!("  keyword: {}", highlight(k));
        }
        for c in &item.caption_track_matches {
            println!(
                "  [{}] @{}s: {}",
                c.language_name,
                c.at,
                highlight(&c.text)
            );
        }
    }
    Ok(())
}

fn highlight(matched: &ytsearch_core::matched_text::MatchedText) -> String {
    let mut out = String::new();
    let mut cursor = 0usize;
    for m in &matched.matches {
        let (start, end) = (m.start, m.start + m.length);
        if start < cursor || end > matched.text.len() {
            continue;
        }
        out.push_str(&matched.text[cursor..start]);
        out.push_str(&matched.text[start..end].yellow().bold().to_string());
        cursor = end;
    }
    out.push_str(&matched.text[cursor..]);
    out
}

pub async fn run_list_keywords(
    services: &Arc<Services>,
    alias: &str,
    kind: &str,
    skip: usize,
    take: usize,
    cache_hours: i64,
) -> Result<()> {
    let (_scope_key, candidates, _playlist) =
        resolve_scope(services, alias, kind, skip, take, cache_hours).await?;

    let mut aggregator = ytsearch_core::keyword_lister::KeywordAggregator::new();
    for id in &candidates {
        let (video, _) = services
            .video_cache
            .get_video(id, false, services.remote.as_ref())
            .await?;
        aggregator.add(&video.keywords, id);
    }

    for (keyword, count) in aggregator.ordered_counts() {
        println!("{:>5}  {}", count.to_string().green().bold(), keyword);
    }
    Ok(())
}
