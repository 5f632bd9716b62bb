use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use songbird::Songbird;
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;
use tracing::{error, info};
use typemap_rev::TypeMap;
use crate::{
    builder::{PlayerConfig, RegistryBuilder},
    error::{PlayerError, PlayerResult},
    events::EventHandler,
    model::{locator::Locator, playback::{LoopMode, NowPlaying}},
    player::{GuildPlayer, PlayAck, PlayerContext},
    resolver::Resolver,
    voice::VoiceSessions,
};

/// Process-wide map of guild id to playback state. Entries are created
/// lazily on the first play request and removed on explicit stop or idle
/// expiry; every mutation of an entry happens on that guild's own task.
pub struct PlayerRegistry {
    players: DashMap<GuildId, GuildPlayer>,
    voice: Arc<VoiceSessions>,
    resolver: Arc<Resolver>,
    event_handler: Arc<dyn EventHandler>,
    http: reqwest::Client,
    config: Arc<PlayerConfig>,
    pub shared_data: Arc<RwLock<TypeMap>>,
    self_weak: Weak<PlayerRegistry>,
}

impl PlayerRegistry {
    pub fn builder<H: EventHandler + 'static>(handler: H) -> RegistryBuilder {
        RegistryBuilder::new(handler)
    }

    pub(crate) fn new(builder: RegistryBuilder, manager: Arc<Songbird>) -> Arc<Self> {
        let RegistryBuilder {
            event_handler,
            data,
            queue_limit,
            connect_timeout,
            idle_grace,
            progress_interval,
            max_search_duration,
            search_limit,
            bitrate,
            cookies,
            backend,
        } = builder;

        let voice = Arc::new(VoiceSessions::new(manager, connect_timeout));
        let resolver = Arc::new(Resolver::new(
            backend,
            cookies,
            search_limit,
            max_search_duration,
        ));
        let config = Arc::new(PlayerConfig {
            queue_limit,
            idle_grace,
            progress_interval,
            bitrate,
        });

        Arc::new_cyclic(|weak| Self {
            players: DashMap::new(),
            voice,
            resolver,
            event_handler,
            http: reqwest::Client::new(),
            config,
            shared_data: Arc::new(RwLock::new(data)),
            self_weak: weak.clone(),
        })
    }

    /// Requests playback of a URL or search query in the given voice
    /// channel. Creates the guild's player on first use.
    pub async fn play(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        input: impl Into<String>,
    ) -> PlayerResult<PlayAck> {
        let locator = Locator::parse(input);

        match self.obtain(guild_id).play(channel_id, locator.clone()).await {
            // Raced a teardown; retry once on a fresh player.
            Err(PlayerError::Terminated) => {
                self.players.remove_if(&guild_id, |_, player| !player.is_alive());

                self.obtain(guild_id).play(channel_id, locator).await
            }
            other => other,
        }
    }

    pub async fn skip(&self, guild_id: GuildId) -> PlayerResult<()> {
        self.player(guild_id)
            .ok_or(PlayerError::PlayerNotFound)?
            .skip()
            .await
    }

    pub async fn stop(&self, guild_id: GuildId) -> PlayerResult<()> {
        self.player(guild_id)
            .ok_or(PlayerError::PlayerNotFound)?
            .stop()
            .await
    }

    pub async fn toggle_pause(&self, guild_id: GuildId) -> PlayerResult<bool> {
        self.player(guild_id)
            .ok_or(PlayerError::PlayerNotFound)?
            .toggle_pause()
            .await
    }

    pub async fn cycle_loop_mode(&self, guild_id: GuildId) -> PlayerResult<LoopMode> {
        self.player(guild_id)
            .ok_or(PlayerError::PlayerNotFound)?
            .cycle_loop_mode()
            .await
    }

    /// Current track snapshot for on-demand rendering; `None` while nothing
    /// is streaming.
    pub async fn now_playing(&self, guild_id: GuildId) -> Option<NowPlaying> {
        self.player(guild_id)?.now_playing().await
    }

    /// Entry point for the gateway layer when the bot is force-disconnected
    /// from voice; reconciles the guild's state with reality.
    pub fn handle_voice_disconnect(&self, guild_id: GuildId) {
        if let Some(player) = self.player(guild_id) {
            player.notify_voice_disconnected();
        }
    }

    fn player(&self, guild_id: GuildId) -> Option<GuildPlayer> {
        self.players
            .get(&guild_id)
            .map(|entry| entry.value().clone())
            .filter(GuildPlayer::is_alive)
    }

    fn obtain(&self, guild_id: GuildId) -> GuildPlayer {
        let mut entry = self
            .players
            .entry(guild_id)
            .or_insert_with(|| self.spawn_player(guild_id));

        if !entry.value().is_alive() {
            // Normal teardown removes its own entry, so a dead one still in
            // the map means the task died without winding down.
            error!("Guild {} player task is gone, spawning a replacement", guild_id);

            *entry.value_mut() = self.spawn_player(guild_id);
        }

        entry.value().clone()
    }

    fn spawn_player(&self, guild_id: GuildId) -> GuildPlayer {
        info!("Creating player for guild {}", guild_id);

        GuildPlayer::spawn(PlayerContext {
            guild_id,
            config: Arc::clone(&self.config),
            resolver: Arc::clone(&self.resolver),
            voice: Arc::clone(&self.voice),
            handler: Arc::clone(&self.event_handler),
            http: self.http.clone(),
            registry: self.self_weak.clone(),
        })
    }

    /// Called by a guild task as it winds down. Only removes the entry if it
    /// still refers to the dead player, a replacement stays untouched.
    pub(crate) fn release(&self, guild_id: GuildId) {
        self.players.remove_if(&guild_id, |_, player| !player.is_alive());
    }
}

impl typemap_rev::TypeMapKey for PlayerRegistry {
    type Value = Arc<PlayerRegistry>;
}
