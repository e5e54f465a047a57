//! Video Cache (§4.G): fetches, persists, and re-hydrates video metadata and
//! caption tracks.

use crate::error::Result;
use crate::kv_store::KvStore;
use crate::model::{CaptionTrack, Video, VideoId};
use crate::remote::Remote;
use crate::scope::{Notification, NotificationLevel};
use tracing::warn;

#[derive(Clone)]
pub struct VideoCache {
    kv: KvStore,
}

impl VideoCache {
    pub fn new(kv: KvStore) -> Self {
        Self { kv }
    }

    fn key(id: &VideoId) -> String {
        format!("video {}", id.as_str())
    }

    pub fn get_cached(&self, id: &VideoId) -> Result<Option<Video>> {
        self.kv.get(&Self::key(id))
    }

    fn save(&self, video: &Video) -> Result<()> {
        self.kv.set(&Self::key(&video.id), Some(video))
    }

    /// Cache miss triggers a remote fetch; `download_captions` additionally
    /// fetches every track's captions, capturing per-track errors without
    /// failing the whole video (§4.G). Returns the video plus any per-track
    /// download notifications.
    pub async fn get_video(
        &self,
        id: &VideoId,
        download_captions: bool,
        remote: &dyn Remote,
    ) -> Result<(Video, Vec<Notification>)> {
        let mut notifications = Vec::new();

        let mut video = match self.get_cached(id)? {
            Some(v) => v,
            None => {
                let fetched = remote
                    .get_video(id)
                    .await?
                    .ok_or_else(|| crate::error::Error::NotFound {
                        resource: format!("video {}", id.as_str()),
                    })?;
                fetched
            }
        };

        if download_captions && video.caption_tracks.is_none() {
            let manifest = remote.get_caption_manifest(id).await.unwrap_or_default();
            let mut tracks = Vec::with_capacity(manifest.len());
            for entry in &manifest {
                let mut track = CaptionTrack::new(entry.language_name.clone(), entry.source_url.clone());
                match remote.get_caption_track(id, entry).await {
                    Ok(captions) => {
                        track.set_captions(
                            captions
                                .into_iter()
                                .map(|c| crate::model::Caption { at: c.at, text: c.text })
                                .collect(),
                        );
                    }
                    Err(e) => {
                        warn!(target: "ytsearch.video_cache", video_id = %id, language = %entry.language_name, error = %e, "caption track download failed");
                        track.error = Some("download_failed".to_string());
                        track.error_message = Some(e.to_string());
                        notifications.push(Notification {
                            title: format!("Caption track '{}' failed", entry.language_name),
                            message: Some(e.to_string()),
                            errors: vec![e.to_string()],
                            video: Some(id.clone()),
                            level: NotificationLevel::Warning,
                        });
                    }
                }
                tracks.push(track);
            }
            video.caption_tracks = Some(tracks);
        }

        self.save(&video)?;
        Ok((video, notifications))
    }

    /// Persists a video after it has been added to an index, clearing the
    /// staleness flag (§3 invariant; §8 property 8).
    pub fn mark_indexed(&self, video: &mut Video) -> Result<()> {
        video.unindexed_flag = false;
        self.save(video)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{CaptionManifestEntry, RemoteCaption, RemoteChannel, RemotePlaylist, RemotePlaylistVideo};
    use async_trait::async_trait;

    struct FakeRemote;

    #[async_trait]
    impl Remote for FakeRemote {
        async fn get_video(&self, id: &VideoId) -> Result<Option<Video>> {
            Ok(Some(Video::new(id.clone(), "title", "description")))
        }
        async fn get_channel_by_id(&self, _id: &str) -> Result<Option<RemoteChannel>> {
            Ok(None)
        }
        async fn get_channel_by_handle(&self, _h: &str) -> Result<Option<RemoteChannel>> {
            Ok(None)
        }
        async fn get_channel_by_slug(&self, _s: &str) -> Result<Option<RemoteChannel>> {
            Ok(None)
        }
        async fn get_channel_by_user(&self, _u: &str) -> Result<Option<RemoteChannel>> {
            Ok(None)
        }
        async fn get_playlist(&self, _id: &str) -> Result<Option<RemotePlaylist>> {
            Ok(None)
        }
        async fn get_playlist_videos(&self, _id: &str, _skip: usize, _take: usize) -> Result<Vec<RemotePlaylistVideo>> {
            Ok(Vec::new())
        }
        async fn get_channel_uploads(&self, _channel_id: &str, _skip: usize, _take: usize) -> Result<Vec<RemotePlaylistVideo>> {
            Ok(Vec::new())
        }
        async fn get_caption_manifest(&self, _id: &VideoId) -> Result<Vec<CaptionManifestEntry>> {
            Ok(vec![
                CaptionManifestEntry { language_name: "en".into(), source_url: "https://example.invalid/en".into() },
                CaptionManifestEntry { language_name: "broken".into(), source_url: "https://example.invalid/broken".into() },
            ])
        }
        async fn get_caption_track(&self, _id: &VideoId, entry: &CaptionManifestEntry) -> Result<Vec<RemoteCaption>> {
            if entry.language_name == "broken" {
                Err(crate::error::Error::transport("track unavailable"))
            } else {
                Ok(vec![RemoteCaption { at: 0, text: "hello".into() }])
            }
        }
    }

    #[tokio::test]
    async fn fetch_miss_downloads_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let cache = VideoCache::new(KvStore::new(dir.path()).unwrap());
        let (video, notifications) = cache
            .get_video(&VideoId::new("abc"), true, &FakeRemote)
            .await
            .unwrap();
        assert_eq!(video.caption_tracks.as_ref().unwrap().len(), 2);
        assert_eq!(notifications.len(), 1);
        assert!(cache.get_cached(&VideoId::new("abc")).unwrap().is_some());
    }

    #[tokio::test]
    async fn per_track_error_does_not_fail_whole_video() {
        let dir = tempfile::tempdir().unwrap();
        let cache = VideoCache::new(KvStore::new(dir.path()).unwrap());
        let (video, _) = cache
            .get_video(&VideoId::new("abc"), true, &FakeRemote)
            .await
            .unwrap();
        let broken = video
            .caption_tracks
            .unwrap()
            .into_iter()
            .find(|t| t.language_name == "broken")
            .unwrap();
        assert!(broken.error.is_some());
    }
}
