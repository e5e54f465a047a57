//! Default `Remote` implementation over `rusty_ytdl` and `yt-transcript-rs`.
//!
//! Grounded on the prior YouTube connector's `get_video_details`/`search_videos`
//! handlers: `rusty_ytdl` panics on some malformed upstream responses, so every
//! call into it is wrapped in `catch_unwind` and turned into a `TransportError`.

use crate::error::{Error, Result};
use crate::model::{Caption, CaptionTrack, Video, VideoId};
use crate::remote::{
    CaptionManifestEntry, Remote, RemoteCaption, RemoteChannel, RemotePlaylist,
    RemotePlaylistVideo,
};
use async_trait::async_trait;
use futures::FutureExt;
use rusty_ytdl::search::{Playlist as SearchPlaylist, PlaylistSearchOptions, SearchOptions, SearchResult, SearchType, YouTube};
use rusty_ytdl::{RequestOptions, Video as YtdlVideo, VideoOptions};
use std::panic::AssertUnwindSafe;
use yt_transcript_rs::YouTubeTranscriptApi;

pub struct YoutubeRemote {
    video_options: VideoOptions,
}

impl Default for YoutubeRemote {
    fn default() -> Self {
        Self {
            video_options: VideoOptions {
                request_options: RequestOptions::default(),
                ..Default::default()
            },
        }
    }
}

impl YoutubeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn watch_url(id: &VideoId) -> String {
        format!("https://www.youtube.com/watch?v={}", id.as_str())
    }
}

#[async_trait]
impl Remote for YoutubeRemote {
    async fn get_video(&self, id: &VideoId) -> Result<Option<Video>> {
        let video = match YtdlVideo::new_with_options(&Self::watch_url(id), self.video_options.clone())
        {
            Ok(v) => v,
            Err(e) => return Err(Error::transport(e.to_string())),
        };

        let info = AssertUnwindSafe(video.get_info())
            .catch_unwind()
            .await
            .map_err(|_| Error::transport("get_info panicked"))?;
        let info = match info {
            Ok(i) => i,
            Err(e) if e.to_string().to_lowercase().contains("not found") => return Ok(None),
            Err(e) => return Err(Error::transport(e.to_string())),
        };

        let details = info.video_details;
        let mut out = Video::new(id.clone(), details.title, details.description);
        out.channel = Some(details.author.map(|a| a.name).unwrap_or_default());
        out.thumbnail_url = details
            .thumbnails
            .first()
            .map(|t| t.url.clone());
        out.keywords = details.keywords;
        out.uploaded_utc = details
            .publish_date
            .and_then(|d| chrono::DateTime::parse_from_rfc3339(&d).ok())
            .map(|d| d.with_timezone(&chrono::Utc));
        Ok(Some(out))
    }

    async fn get_channel_by_id(&self, id: &str) -> Result<Option<RemoteChannel>> {
        self.search_channel(id).await
    }

    async fn get_channel_by_handle(&self, handle: &str) -> Result<Option<RemoteChannel>> {
        self.search_channel(handle).await
    }

    async fn get_channel_by_slug(&self, slug: &str) -> Result<Option<RemoteChannel>> {
        self.search_channel(slug).await
    }

    async fn get_channel_by_user(&self, user: &str) -> Result<Option<RemoteChannel>> {
        self.search_channel(user).await
    }

    async fn get_playlist(&self, id: &str) -> Result<Option<RemotePlaylist>> {
        let playlist = AssertUnwindSafe(SearchPlaylist::get(id.to_string(), None))
            .catch_unwind()
            .await
            .map_err(|_| Error::transport("playlist fetch panicked"))?;
        let playlist = match playlist {
            Ok(p) => p,
            Err(e) if e.to_string().to_lowercase().contains("not found") => return Ok(None),
            Err(e) => return Err(Error::transport(e.to_string())),
        };
        Ok(Some(RemotePlaylist {
            title: playlist.title,
            thumbnail_url: playlist.thumbnails.first().map(|t| t.url.clone()),
            channel: Some(playlist.channel.name),
        }))
    }

    async fn get_playlist_videos(
        &self,
        id: &str,
        skip: usize,
        take: usize,
    ) -> Result<Vec<RemotePlaylistVideo>> {
        let playlist = AssertUnwindSafe(SearchPlaylist::get(
            id.to_string(),
            Some(&PlaylistSearchOptions {
                limit: (skip + take) as u64,
                ..Default::default()
            }),
        ))
        .catch_unwind()
        .await
        .map_err(|_| Error::transport("playlist fetch panicked"))?
        .map_err(|e| Error::transport(e.to_string()))?;

        Ok(playlist
            .videos
            .into_iter()
            .skip(skip)
            .take(take)
            .map(|v| RemotePlaylistVideo {
                id: VideoId::new(v.id),
                uploaded_utc: None,
            })
            .collect())
    }

    async fn get_channel_uploads(
        &self,
        channel_id: &str,
        skip: usize,
        take: usize,
    ) -> Result<Vec<RemotePlaylistVideo>> {
        // The uploads playlist id is the channel id with its second character
        // swapped from 'C' to 'U', a long-standing YouTube convention.
        let uploads_id = if let Some(rest) = channel_id.strip_prefix("UC") {
            format!("UU{rest}")
        } else {
            channel_id.to_string()
        };
        self.get_playlist_videos(&uploads_id, skip, take).await
    }

    async fn get_caption_manifest(&self, video_id: &VideoId) -> Result<Vec<CaptionManifestEntry>> {
        let video = YtdlVideo::new_with_options(&Self::watch_url(video_id), self.video_options.clone())
            .map_err(|e| Error::transport(e.to_string()))?;
        let info = AssertUnwindSafe(video.get_info())
            .catch_unwind()
            .await
            .map_err(|_| Error::transport("get_info panicked"))?
            .map_err(|e| Error::transport(e.to_string()))?;

        Ok(info
            .video_details
            .subtitles
            .into_iter()
            .map(|t| CaptionManifestEntry {
                language_name: t.language_name,
                source_url: t.base_url,
            })
            .collect())
    }

    async fn get_caption_track(
        &self,
        video_id: &VideoId,
        entry: &CaptionManifestEntry,
    ) -> Result<Vec<RemoteCaption>> {
        let api = YouTubeTranscriptApi::new(None, None, None)
            .map_err(|e| Error::transport(e.to_string()))?;
        let fetched = AssertUnwindSafe(api.fetch_transcript(
            video_id.as_str(),
            &[entry.language_name.as_str()],
            false,
        ))
        .catch_unwind()
        .await
        .map_err(|_| Error::transport("fetch_transcript panicked"))?
        .map_err(|e| Error::transport(e.to_string()))?;

        Ok(fetched
            .parts()
            .iter()
            .map(|p| RemoteCaption {
                at: p.start as u32,
                text: p.text.clone(),
            })
            .collect())
    }
}

impl YoutubeRemote {
    async fn search_channel(&self, query: &str) -> Result<Option<RemoteChannel>> {
        let youtube = YouTube::new().map_err(|e| Error::transport(e.to_string()))?;
        let options = SearchOptions {
            limit: 1,
            search_type: SearchType::Channel,
            ..Default::default()
        };
        let results: Vec<SearchResult> = AssertUnwindSafe(youtube.search(query, Some(&options)))
            .catch_unwind()
            .await
            .map_err(|_| Error::transport("channel search panicked"))?
            .map_err(|e| Error::transport(e.to_string()))?;

        Ok(results.into_iter().find_map(|r| match r {
            SearchResult::Channel(c) => Some(RemoteChannel {
                id: c.id,
                title: c.name,
                thumbnail_url: c.icon.first().map(|t| t.url.clone()),
            }),
            _ => None,
        }))
    }
}

/// Translates a caption track fetched from the manifest + captions into the
/// data-model `CaptionTrack` (§4.G), sorting and deduplicating per §3.
pub fn build_caption_track(entry: &CaptionManifestEntry, captions: Vec<RemoteCaption>) -> CaptionTrack {
    let mut track = CaptionTrack::new(entry.language_name.clone(), entry.source_url.clone());
    track.set_captions(
        captions
            .into_iter()
            .map(|c| Caption { at: c.at, text: c.text })
            .collect(),
    );
    track
}
