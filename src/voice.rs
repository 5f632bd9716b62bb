use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{error::JoinError, Songbird};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};
use crate::{error::ConnectError, types::SharedCall};

/// Owns the live voice connections for every guild: connect with a bounded
/// timeout, reuse, idempotent disconnect.
pub struct VoiceSessions {
    manager: Arc<Songbird>,
    connect_timeout: Duration,
    guild_locks: DashMap<GuildId, Arc<Mutex<()>>>,
}

impl VoiceSessions {
    pub fn new(manager: Arc<Songbird>, connect_timeout: Duration) -> Self {
        Self {
            manager,
            connect_timeout,
            guild_locks: DashMap::new(),
        }
    }

    /// Serializes connects and disconnects for one guild against each other.
    fn guild_lock(&self, guild_id: GuildId) -> Arc<Mutex<()>> {
        let entry = self
            .guild_locks
            .entry(guild_id)
            .or_insert_with(|| Arc::new(Mutex::new(())));

        Arc::clone(entry.value())
    }

    /// Returns the guild's existing call if connected to any channel,
    /// otherwise attempts one join bounded by the connect timeout.
    /// Concurrent attempts for the same guild are serialized, the second
    /// caller sees the first one's session.
    pub async fn ensure_connected(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<SharedCall, ConnectError> {
        let lock = self.guild_lock(guild_id);
        let _guard = lock.lock().await;

        if let Some(call) = self.manager.get(guild_id) {
            return Ok(call);
        }

        info!("Joining voice channel {} in guild {}", channel_id, guild_id);

        match tokio::time::timeout(self.connect_timeout, self.manager.join(guild_id, channel_id)).await {
            Err(_) => {
                warn!("Voice join for guild {} timed out after {:?}", guild_id, self.connect_timeout);

                // A join abandoned midway leaves a half-open call behind.
                let _ = self.manager.remove(guild_id).await;

                Err(ConnectError::Timeout)
            }
            Ok(Err(why)) => {
                warn!("Voice join for guild {} failed: {}", guild_id, why);

                let _ = self.manager.remove(guild_id).await;

                Err(why.into())
            }
            Ok(Ok(call)) => {
                info!("Connected to voice in guild {}", guild_id);

                Ok(call)
            }
        }
    }

    pub fn is_connected(&self, guild_id: GuildId) -> bool {
        self.manager.get(guild_id).is_some()
    }

    /// Disconnects the guild's session. Disconnecting an already
    /// disconnected guild is a no-op. A join in flight for the guild
    /// completes before the call is removed.
    pub async fn disconnect(&self, guild_id: GuildId) {
        let lock = self.guild_lock(guild_id);
        let _guard = lock.lock().await;

        if self.manager.get(guild_id).is_some() {
            match self.manager.remove(guild_id).await {
                Ok(()) => info!("Disconnected voice session for guild {}", guild_id),
                Err(JoinError::NoCall) => {}
                Err(why) => warn!("Error disconnecting guild {}: {}", guild_id, why),
            }
        }
    }
}
