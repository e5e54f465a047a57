//! Scope Model & Validation (§4.E): `CommandScope` as a tagged variant (no
//! inheritance), pre-validation, remote validation, and the progress/
//! notification channels with their dispatch throttle.

use crate::alias_map::ChannelAliasMap;
use crate::error::{Error, Result};
use crate::model::{ChannelAliasType, Playlist, Video, VideoId};
use crate::remote::Remote;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressState {
    Queued,
    PreValidated,
    Loading,
    Downloading,
    Validated,
    Refreshing,
    Indexing,
    Searching,
    IndexingAndSearching,
    Searched,
    Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub title: String,
    pub message: Option<String>,
    pub errors: Vec<String>,
    pub video: Option<VideoId>,
    pub level: NotificationLevel,
}

impl Notification {
    pub fn info(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: None,
            errors: Vec::new(),
            video: None,
            level: NotificationLevel::Info,
        }
    }
}

/// Multi-producer single-consumer channel that collapses emissions to at most
/// one dispatch per `interval`, latest-value-wins (§4.E, §5).
pub struct Throttle<T> {
    tx: watch::Sender<Option<T>>,
}

impl<T: Clone + Send + Sync> Throttle<T> {
    pub fn new(interval: Duration) -> (Self, ThrottledReceiver<T>) {
        let (tx, rx) = watch::channel(None);
        (Self { tx }, ThrottledReceiver { rx, interval })
    }

    pub fn emit(&self, value: T) {
        let _ = self.tx.send(Some(value));
    }
}

pub struct ThrottledReceiver<T> {
    rx: watch::Receiver<Option<T>>,
    interval: Duration,
}

impl<T: Clone> ThrottledReceiver<T> {
    /// Waits at least `interval` since the last dispatch, then returns the
    /// latest emitted value, if any arrived since.
    pub async fn recv(&mut self) -> Option<T> {
        tokio::time::sleep(self.interval).await;
        if self.rx.changed().await.is_err() {
            return None;
        }
        self.rx.borrow_and_update().clone()
    }
}

#[derive(Debug, Clone)]
pub struct WellStructuredAlias {
    pub alias_type: ChannelAliasType,
    pub value: String,
    pub url: String,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub id: String,
    pub url: Option<String>,
    pub well_structured_aliases: Option<Vec<WellStructuredAlias>>,
    pub playlist: Option<Playlist>,
    pub video: Option<Video>,
}

impl ValidationResult {
    pub fn is_remote_validated(&self) -> bool {
        self.playlist.is_some() || self.video.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct VideosScope {
    pub ids: Vec<VideoId>,
    pub validated: ValidationResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistLikeKind {
    Playlist,
    Channel,
}

#[derive(Debug, Clone)]
pub struct PlaylistLikeScope {
    pub alias: String,
    pub kind: PlaylistLikeKind,
    pub skip: usize,
    pub take: usize,
    pub cache_hours: f64,
    pub validated: ValidationResult,
}

#[derive(Debug, Clone)]
pub enum CommandScope {
    Videos(VideosScope),
    PlaylistLike(PlaylistLikeScope),
}

impl CommandScope {
    pub fn storage_key_prefix(&self) -> &str {
        match self {
            CommandScope::Videos(s) => &s.validated.id,
            CommandScope::PlaylistLike(s) => &s.validated.id,
        }
    }
}

static CHANNEL_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^UC[0-9A-Za-z_-]{22}$").unwrap());
static HANDLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^@[0-9A-Za-z_.-]{3,30}$").unwrap());
static URL_CHANNEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)youtube\.com/channel/([0-9A-Za-z_-]{24})").unwrap());
static URL_HANDLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)youtube\.com/(@[0-9A-Za-z_.-]+)").unwrap());
static URL_SLUG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)youtube\.com/c/([0-9A-Za-z_-]+)").unwrap());
static URL_USER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)youtube\.com/user/([0-9A-Za-z_-]+)").unwrap());

/// Pure syntactic pre-validation (§4.E): yields zero or more well-structured
/// interpretations of a channel alias (handle / slug / user / id).
pub fn pre_validate_channel_alias(input: &str) -> Vec<WellStructuredAlias> {
    let trimmed = input.trim();
    let mut out = Vec::new();

    if CHANNEL_ID_RE.is_match(trimmed) {
        out.push(WellStructuredAlias {
            alias_type: ChannelAliasType::Id,
            value: trimmed.to_string(),
            url: format!("https://www.youtube.com/channel/{trimmed}"),
        });
    }
    if HANDLE_RE.is_match(trimmed) {
        out.push(WellStructuredAlias {
            alias_type: ChannelAliasType::Handle,
            value: trimmed.to_string(),
            url: format!("https://www.youtube.com/{trimmed}"),
        });
    }
    if let Some(c) = URL_CHANNEL_RE.captures(trimmed) {
        out.push(WellStructuredAlias {
            alias_type: ChannelAliasType::Id,
            value: c[1].to_string(),
            url: format!("https://www.youtube.com/channel/{}", &c[1]),
        });
    }
    if let Some(c) = URL_HANDLE_RE.captures(trimmed) {
        out.push(WellStructuredAlias {
            alias_type: ChannelAliasType::Handle,
            value: c[1].to_string(),
            url: format!("https://www.youtube.com/{}", &c[1]),
        });
    }
    if let Some(c) = URL_SLUG_RE.captures(trimmed) {
        out.push(WellStructuredAlias {
            alias_type: ChannelAliasType::Slug,
            value: c[1].to_string(),
            url: format!("https://www.youtube.com/c/{}", &c[1]),
        });
    }
    if let Some(c) = URL_USER_RE.captures(trimmed) {
        out.push(WellStructuredAlias {
            alias_type: ChannelAliasType::User,
            value: c[1].to_string(),
            url: format!("https://www.youtube.com/user/{}", &c[1]),
        });
    }
    if out.is_empty() && !trimmed.is_empty() && !trimmed.contains('/') {
        // A bare name with no recognisable shape is still tried as a slug,
        // matching how channel URLs degrade to `/c/<name>` lookups.
        out.push(WellStructuredAlias {
            alias_type: ChannelAliasType::Slug,
            value: trimmed.to_string(),
            url: format!("https://www.youtube.com/c/{trimmed}"),
        });
    }
    out
}

/// Remote-validates a channel alias against each well-structured interpretation,
/// consulting the alias map first. Ambiguity across *distinct* channel ids is
/// an `InputError` listing each candidate (§4.E, scenario S3).
pub async fn validate_channel_alias(
    alias: &str,
    remote: &dyn Remote,
    alias_map: &ChannelAliasMap,
) -> Result<(String, Playlist)> {
    let candidates = pre_validate_channel_alias(alias);
    if candidates.is_empty() {
        return Err(Error::input(format!("'{alias}' is not a valid channel alias")));
    }

    let mut resolved: Vec<(WellStructuredAlias, String)> = Vec::new();
    for candidate in &candidates {
        if let Some(cached) = alias_map.lookup(candidate.alias_type, &candidate.value)? {
            if let Some(id) = cached {
                resolved.push((candidate.clone(), id));
            }
            continue;
        }
        let found = match candidate.alias_type {
            ChannelAliasType::Id => remote.get_channel_by_id(&candidate.value).await?,
            ChannelAliasType::Handle => remote.get_channel_by_handle(&candidate.value).await?,
            ChannelAliasType::Slug => remote.get_channel_by_slug(&candidate.value).await?,
            ChannelAliasType::User => remote.get_channel_by_user(&candidate.value).await?,
        };
        alias_map.add_entry(
            candidate.alias_type,
            &candidate.value,
            found.as_ref().map(|c| c.id.clone()),
        )?;
        if let Some(channel) = found {
            resolved.push((candidate.clone(), channel.id));
        }
    }

    let mut distinct_ids: Vec<&str> = resolved.iter().map(|(_, id)| id.as_str()).collect();
    distinct_ids.sort_unstable();
    distinct_ids.dedup();

    match distinct_ids.len() {
        0 => Err(Error::input(format!("Channel alias '{alias}' could not be resolved"))),
        1 => {
            let channel_id = distinct_ids[0].to_string();
            let mut playlist = Playlist::new(format!("Uploads from {channel_id}"));
            playlist.channel = Some(channel_id.clone());
            Ok((channel_id, playlist))
        }
        _ => {
            let mut message = format!("Channel alias '{alias}' is ambiguous:");
            for (candidate, id) in &resolved {
                message.push_str(&format!(
                    "\n  {} -> https://www.youtube.com/channel/{}",
                    candidate.url, id
                ));
            }
            Err(Error::input(message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_id_shape_is_recognised() {
        let candidates = pre_validate_channel_alias("UC1234567890123456789012");
        assert!(candidates.iter().any(|c| c.alias_type == ChannelAliasType::Id));
    }

    #[test]
    fn handle_shape_is_recognised() {
        let candidates = pre_validate_channel_alias("@some_handle");
        assert!(candidates.iter().any(|c| c.alias_type == ChannelAliasType::Handle));
    }

    #[test]
    fn bare_name_falls_back_to_slug() {
        let candidates = pre_validate_channel_alias("plainname");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].alias_type, ChannelAliasType::Slug);
    }
}
