//! Remote (§6): the injected YouTube data source. Kept as a trait so the
//! search/index pipeline never depends on a concrete HTTP client or on
//! `rusty_ytdl`'s types directly; `youtube` holds the default implementation.

pub mod youtube;

use crate::error::Result;
use crate::model::{ChannelAliasType, Video, VideoId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use youtube::YoutubeRemote;

/// A resolved channel: id plus the handful of display fields Scope validation needs.
#[derive(Debug, Clone)]
pub struct RemoteChannel {
    pub id: String,
    pub title: String,
    pub thumbnail_url: Option<String>,
}

/// One page of a playlist-like sequence, as seen during refresh paging (§4.F).
#[derive(Debug, Clone)]
pub struct RemotePlaylistVideo {
    pub id: VideoId,
    pub uploaded_utc: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct RemotePlaylist {
    pub title: String,
    pub thumbnail_url: Option<String>,
    pub channel: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CaptionManifestEntry {
    pub language_name: String,
    pub source_url: String,
}

#[derive(Debug, Clone)]
pub struct RemoteCaption {
    pub at: u32,
    pub text: String,
}

/// Minimal contract for reaching YouTube (§6). `not_found` is distinguished from
/// transport failure by returning `Ok(None)` rather than `Err`.
#[async_trait]
pub trait Remote: Send + Sync {
    async fn get_video(&self, id: &VideoId) -> Result<Option<Video>>;

    async fn get_channel_by_id(&self, id: &str) -> Result<Option<RemoteChannel>>;
    async fn get_channel_by_handle(&self, handle: &str) -> Result<Option<RemoteChannel>>;
    async fn get_channel_by_slug(&self, slug: &str) -> Result<Option<RemoteChannel>>;
    async fn get_channel_by_user(&self, user: &str) -> Result<Option<RemoteChannel>>;

    async fn get_playlist(&self, id: &str) -> Result<Option<RemotePlaylist>>;

    /// Lazily enumerates playlist membership, in remote order.
    async fn get_playlist_videos(
        &self,
        id: &str,
        skip: usize,
        take: usize,
    ) -> Result<Vec<RemotePlaylistVideo>>;

    /// Lazily enumerates a channel's uploads (treated as transient content, not a
    /// user-supplied playlist; §9 Open Question 3).
    async fn get_channel_uploads(
        &self,
        channel_id: &str,
        skip: usize,
        take: usize,
    ) -> Result<Vec<RemotePlaylistVideo>>;

    async fn get_caption_manifest(&self, video_id: &VideoId) -> Result<Vec<CaptionManifestEntry>>;
    async fn get_caption_track(
        &self,
        video_id: &VideoId,
        entry: &CaptionManifestEntry,
    ) -> Result<Vec<RemoteCaption>>;
}

/// Helper used by Scope pre-validation to know which channel-lookup methods to
/// try for a given well-structured alias interpretation (§4.E).
pub fn channel_alias_types() -> [ChannelAliasType; 4] {
    [
        ChannelAliasType::Id,
        ChannelAliasType::Handle,
        ChannelAliasType::Slug,
        ChannelAliasType::User,
    ]
}
