use async_trait::async_trait;
use serenity::model::id::GuildId;
use std::sync::Arc;
use std::time::Duration;
use crate::{
    error::PlayerError,
    model::{
        descriptor::MediaDescriptor,
        locator::Locator,
        playback::NowPlaying,
    },
};

#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Event that triggers when a track starts streaming.
    async fn track_started(&self, _update: NowPlaying) {}
    /// Periodic event carrying the current playback position, throttled by
    /// the progress loop.
    async fn now_playing_changed(&self, _update: NowPlaying) {}
    /// Event that triggers when a track finishes playing.
    async fn track_finished(&self, _guild: GuildId, _descriptor: MediaDescriptor) {}
    /// Event that triggers when a track could not be resolved or the voice
    /// channel could not be joined. The queue is not advanced.
    async fn track_failed(&self, _guild: GuildId, _locator: Locator, _error: PlayerError) {}
    /// Event that triggers when playback fails mid-stream. The track counts
    /// as finished and the queue advances.
    async fn stream_errored(&self, _guild: GuildId, _reason: String) {}
    /// Event that triggers when the playback position stops advancing while
    /// nominally playing.
    async fn playback_stalled(&self, _guild: GuildId, _position: Duration) {}
}

pub(crate) fn process(handler: Arc<dyn EventHandler>, event_type: EventType) {
    match event_type {
        EventType::TrackStarted(e) => {
            tokio::spawn(async move {
                handler.track_started(e).await;
            });
        },
        EventType::NowPlayingChanged(e) => {
            tokio::spawn(async move {
                handler.now_playing_changed(e).await;
            });
        },
        EventType::TrackFinished(guild, descriptor) => {
            tokio::spawn(async move {
                handler.track_finished(guild, descriptor).await;
            });
        },
        EventType::TrackFailed(guild, locator, error) => {
            tokio::spawn(async move {
                handler.track_failed(guild, locator, error).await;
            });
        },
        EventType::StreamErrored(guild, reason) => {
            tokio::spawn(async move {
                handler.stream_errored(guild, reason).await;
            });
        },
        EventType::PlaybackStalled(guild, position) => {
            tokio::spawn(async move {
                handler.playback_stalled(guild, position).await;
            });
        }
    }
}

pub(crate) enum EventType {
    TrackStarted(NowPlaying),
    NowPlayingChanged(NowPlaying),
    TrackFinished(GuildId, MediaDescriptor),
    TrackFailed(GuildId, Locator, PlayerError),
    StreamErrored(GuildId, String),
    PlaybackStalled(GuildId, Duration),
}
