use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    driver::Bitrate,
    events::{Event, EventContext, EventHandler as VoiceEventHandler, TrackEvent},
    input::HttpRequest,
    tracks::{PlayMode, TrackHandle},
};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use crate::{
    builder::PlayerConfig,
    error::{ConnectError, PlayerError, PlayerResult, ResolveError},
    events::{process, EventHandler, EventType},
    model::{
        descriptor::MediaDescriptor,
        locator::Locator,
        playback::{LoopMode, NowPlaying, PlaybackClock},
    },
    progress::{delta, spawn_tracker, SharedPlayback, TrackerContext, DRIFT_THRESHOLD},
    queue::TrackQueue,
    registry::PlayerRegistry,
    resolver::Resolver,
    types::{Generation, SharedCall},
    voice::VoiceSessions,
};

/// Immediate acknowledgement of a play request; the heavy lifting continues
/// asynchronously and is reported through the event handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayAck {
    /// The track was taken as the current one and resolution started.
    Resolving,
    /// Another track is active, the locator was queued at this position.
    Queued(usize),
}

pub(crate) enum Command {
    Play {
        locator: Locator,
        channel: ChannelId,
        reply: oneshot::Sender<PlayerResult<PlayAck>>,
    },
    Skip {
        reply: oneshot::Sender<PlayerResult<()>>,
    },
    Stop {
        reply: oneshot::Sender<PlayerResult<()>>,
    },
    TogglePause {
        reply: oneshot::Sender<PlayerResult<bool>>,
    },
    CycleLoopMode {
        reply: oneshot::Sender<PlayerResult<LoopMode>>,
    },
    Snapshot {
        reply: oneshot::Sender<Option<NowPlaying>>,
    },
    VoiceDisconnected,
    Resolved {
        generation: Generation,
        result: Result<MediaDescriptor, ResolveError>,
    },
    Connected {
        generation: Generation,
        result: Result<SharedCall, ConnectError>,
    },
    Finished {
        generation: Generation,
        errored: Option<String>,
    },
}

/// Everything a guild player needs from the surrounding process.
pub(crate) struct PlayerContext {
    pub guild_id: GuildId,
    pub config: Arc<PlayerConfig>,
    pub resolver: Arc<Resolver>,
    pub voice: Arc<VoiceSessions>,
    pub handler: Arc<dyn EventHandler>,
    pub http: reqwest::Client,
    pub registry: Weak<PlayerRegistry>,
}

/// Handle to one guild's playback task. All commands are funneled through
/// the task's mailbox, so transitions stay strictly sequential per guild.
#[derive(Clone)]
pub struct GuildPlayer {
    guild_id: GuildId,
    tx: mpsc::UnboundedSender<Command>,
}

impl GuildPlayer {
    pub(crate) fn spawn(ctx: PlayerContext) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let guild_id = ctx.guild_id;

        let state = PlayerState {
            queue: TrackQueue::new(ctx.config.queue_limit),
            loop_mode: LoopMode::Off,
            phase: Phase::Idle,
            generation: 0,
            shared: SharedPlayback::new(),
            channel: None,
            idle_deadline: None,
            ctx,
        };

        tokio::spawn(run(state, rx, tx.clone()));

        Self { guild_id, tx }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Requests playback of a locator. Returns right away with either the
    /// resolution kickoff or the queue position.
    pub async fn play(&self, channel: ChannelId, locator: Locator) -> PlayerResult<PlayAck> {
        let (reply, rx) = oneshot::channel();

        self.tx
            .send(Command::Play { locator, channel, reply })
            .map_err(|_| PlayerError::Terminated)?;

        rx.await.map_err(|_| PlayerError::Terminated)?
    }

    /// Ends the current track early; the normal completion path advances the
    /// queue.
    pub async fn skip(&self) -> PlayerResult<()> {
        let (reply, rx) = oneshot::channel();

        self.tx
            .send(Command::Skip { reply })
            .map_err(|_| PlayerError::Terminated)?;

        rx.await.map_err(|_| PlayerError::Terminated)?
    }

    /// Clears the queue, disconnects and releases the guild state.
    pub async fn stop(&self) -> PlayerResult<()> {
        let (reply, rx) = oneshot::channel();

        self.tx
            .send(Command::Stop { reply })
            .map_err(|_| PlayerError::Terminated)?;

        rx.await.map_err(|_| PlayerError::Terminated)?
    }

    /// Toggles pause. Returns `true` when the track is now paused.
    pub async fn toggle_pause(&self) -> PlayerResult<bool> {
        let (reply, rx) = oneshot::channel();

        self.tx
            .send(Command::TogglePause { reply })
            .map_err(|_| PlayerError::Terminated)?;

        rx.await.map_err(|_| PlayerError::Terminated)?
    }

    pub async fn cycle_loop_mode(&self) -> PlayerResult<LoopMode> {
        let (reply, rx) = oneshot::channel();

        self.tx
            .send(Command::CycleLoopMode { reply })
            .map_err(|_| PlayerError::Terminated)?;

        rx.await.map_err(|_| PlayerError::Terminated)?
    }

    pub async fn now_playing(&self) -> Option<NowPlaying> {
        let (reply, rx) = oneshot::channel();

        self.tx.send(Command::Snapshot { reply }).ok()?;

        rx.await.ok().flatten()
    }

    pub(crate) fn notify_voice_disconnected(&self) {
        let _ = self.tx.send(Command::VoiceDisconnected);
    }

    pub(crate) fn is_alive(&self) -> bool {
        !self.tx.is_closed()
    }
}

enum Phase {
    Idle,
    Resolving {
        locator: Locator,
    },
    Connecting {
        locator: Locator,
        descriptor: MediaDescriptor,
    },
    Streaming {
        locator: Locator,
        descriptor: MediaDescriptor,
        handle: TrackHandle,
        tracker: JoinHandle<()>,
    },
}

enum Flow {
    Continue,
    Shutdown,
}

struct PlayerState {
    ctx: PlayerContext,
    queue: TrackQueue,
    loop_mode: LoopMode,
    phase: Phase,
    generation: Generation,
    shared: Arc<SharedPlayback>,
    channel: Option<ChannelId>,
    idle_deadline: Option<Instant>,
}

async fn run(
    mut state: PlayerState,
    mut rx: mpsc::UnboundedReceiver<Command>,
    tx: mpsc::UnboundedSender<Command>,
) {
    // Created lazily on a play request; if that request never follows through,
    // the grace timer reclaims the state.
    state.arm_idle_grace();

    loop {
        let command = if let Some(deadline) = state.idle_deadline {
            tokio::select! {
                maybe = rx.recv() => match maybe {
                    Some(command) => command,
                    None => break,
                },
                _ = tokio::time::sleep_until(deadline.into()) => {
                    info!("Guild {} idle grace elapsed, releasing player", state.ctx.guild_id);

                    rx.close();
                    state.teardown().await;

                    break;
                }
            }
        } else {
            match rx.recv().await {
                Some(command) => command,
                None => break,
            }
        };

        if let Flow::Shutdown = state.handle_command(command, &tx).await {
            rx.close();
            state.teardown().await;

            break;
        }
    }
}

impl PlayerState {
    async fn handle_command(&mut self, command: Command, tx: &mpsc::UnboundedSender<Command>) -> Flow {
        match command {
            Command::Play { locator, channel, reply } => {
                self.channel = Some(channel);
                let _ = reply.send(self.accept_play(locator, tx));

                Flow::Continue
            }
            Command::Skip { reply } => self.skip(reply, tx),
            Command::Stop { reply } => {
                info!("Guild {} stopping playback and clearing the queue", self.ctx.guild_id);

                self.generation += 1;

                if let Phase::Streaming { handle, tracker, .. } =
                    std::mem::replace(&mut self.phase, Phase::Idle)
                {
                    tracker.abort();
                    let _ = handle.stop();
                }

                self.queue.clear();
                self.sync_queue_len();
                let _ = reply.send(Ok(()));

                Flow::Shutdown
            }
            Command::TogglePause { reply } => {
                let result = if let Phase::Streaming { handle, .. } = &self.phase {
                    let mut clock = self.shared.clock.lock();

                    if clock.is_paused() {
                        let _ = handle.play();
                        clock.resume();

                        info!("Guild {} resumed playback", self.ctx.guild_id);

                        Ok(false)
                    } else {
                        let _ = handle.pause();
                        clock.pause();

                        info!("Guild {} paused playback", self.ctx.guild_id);

                        Ok(true)
                    }
                } else {
                    Err(PlayerError::NothingPlaying)
                };

                let _ = reply.send(result);

                Flow::Continue
            }
            Command::CycleLoopMode { reply } => {
                self.loop_mode = self.loop_mode.cycle();
                *self.shared.loop_mode.lock() = self.loop_mode;

                info!("Guild {} loop mode set to {}", self.ctx.guild_id, self.loop_mode);

                let _ = reply.send(Ok(self.loop_mode));

                Flow::Continue
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());

                Flow::Continue
            }
            Command::VoiceDisconnected => {
                warn!("Guild {} voice transport dropped externally", self.ctx.guild_id);

                self.generation += 1;

                if let Phase::Streaming { tracker, .. } =
                    std::mem::replace(&mut self.phase, Phase::Idle)
                {
                    tracker.abort();
                }

                if self.queue.is_empty() {
                    self.arm_idle_grace();
                }

                Flow::Continue
            }
            Command::Resolved { generation, result } => self.on_resolved(generation, result, tx),
            Command::Connected { generation, result } => self.on_connected(generation, result, tx).await,
            Command::Finished { generation, errored } => self.on_finished(generation, errored, tx),
        }
    }

    /// One resolution in flight per guild: a play request while busy becomes
    /// an enqueue, never a second concurrent track.
    fn accept_play(&mut self, locator: Locator, tx: &mpsc::UnboundedSender<Command>) -> PlayerResult<PlayAck> {
        if let Phase::Idle = self.phase {
            self.idle_deadline = None;
            self.start_resolving(locator, tx);

            Ok(PlayAck::Resolving)
        } else {
            let position = self.queue.enqueue(locator)?;
            self.sync_queue_len();

            Ok(PlayAck::Queued(position))
        }
    }

    fn skip(&mut self, reply: oneshot::Sender<PlayerResult<()>>, tx: &mpsc::UnboundedSender<Command>) -> Flow {
        match &self.phase {
            Phase::Streaming { handle, .. } => {
                info!("Guild {} skipping the current track", self.ctx.guild_id);

                // The stop surfaces through the completion path, which does
                // the requeue and advance.
                let _ = handle.stop();
                let _ = reply.send(Ok(()));
            }
            Phase::Idle => {
                let _ = reply.send(Err(PlayerError::NothingPlaying));
            }
            Phase::Resolving { .. } | Phase::Connecting { .. } => {
                info!("Guild {} abandoning the in-flight track", self.ctx.guild_id);

                self.generation += 1;
                self.phase = Phase::Idle;
                self.advance(tx);
                let _ = reply.send(Ok(()));
            }
        }

        Flow::Continue
    }

    fn start_resolving(&mut self, locator: Locator, tx: &mpsc::UnboundedSender<Command>) {
        self.generation += 1;

        let generation = self.generation;
        let resolver = Arc::clone(&self.ctx.resolver);
        let tx = tx.clone();
        let task_locator = locator.clone();

        info!("Guild {} resolving {}", self.ctx.guild_id, locator.as_str());

        tokio::spawn(async move {
            let result = resolver.resolve(&task_locator).await;
            let _ = tx.send(Command::Resolved { generation, result });
        });

        self.phase = Phase::Resolving { locator };
    }

    fn on_resolved(
        &mut self,
        generation: Generation,
        result: Result<MediaDescriptor, ResolveError>,
        tx: &mpsc::UnboundedSender<Command>,
    ) -> Flow {
        if generation != self.generation {
            debug!("Guild {} dropping stale resolution result", self.ctx.guild_id);

            return Flow::Continue;
        }

        let locator = match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Resolving { locator } => locator,
            other => {
                self.phase = other;

                return Flow::Continue;
            }
        };

        match result {
            Err(why) => {
                warn!("Guild {} failed to resolve {}: {}", self.ctx.guild_id, locator.as_str(), why);

                process(
                    Arc::clone(&self.ctx.handler),
                    EventType::TrackFailed(self.ctx.guild_id, locator, why.into()),
                );
                self.after_abandon();
            }
            Ok(descriptor) => {
                // The voice channel is only acquired once a stream is in hand.
                let channel = match self.channel {
                    Some(channel) => channel,
                    None => {
                        warn!("Guild {} has no target voice channel, abandoning track", self.ctx.guild_id);
                        self.after_abandon();

                        return Flow::Continue;
                    }
                };

                self.start_connecting(locator, descriptor, channel, tx);
            }
        }

        Flow::Continue
    }

    fn start_connecting(
        &mut self,
        locator: Locator,
        descriptor: MediaDescriptor,
        channel: ChannelId,
        tx: &mpsc::UnboundedSender<Command>,
    ) {
        let generation = self.generation;
        let voice = Arc::clone(&self.ctx.voice);
        let guild_id = self.ctx.guild_id;
        let tx = tx.clone();

        tokio::spawn(async move {
            let result = voice.ensure_connected(guild_id, channel).await;
            let connected = result.is_ok();

            if tx.send(Command::Connected { generation, result }).is_err() && connected {
                // The player shut down while the join was in flight.
                voice.disconnect(guild_id).await;
            }
        });

        self.phase = Phase::Connecting { locator, descriptor };
    }

    async fn on_connected(
        &mut self,
        generation: Generation,
        result: Result<SharedCall, ConnectError>,
        tx: &mpsc::UnboundedSender<Command>,
    ) -> Flow {
        if generation != self.generation {
            debug!("Guild {} dropping stale connection result", self.ctx.guild_id);

            // A connect won by a cancelled track attempt would leak the call.
            if let Ok(_) = result {
                if !matches!(self.phase, Phase::Streaming { .. } | Phase::Connecting { .. }) {
                    self.ctx.voice.disconnect(self.ctx.guild_id).await;
                }
            }

            return Flow::Continue;
        }

        let (locator, descriptor) = match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Connecting { locator, descriptor } => (locator, descriptor),
            other => {
                self.phase = other;

                return Flow::Continue;
            }
        };

        match result {
            Err(why) => {
                warn!("Guild {} failed to join voice: {}", self.ctx.guild_id, why);

                process(
                    Arc::clone(&self.ctx.handler),
                    EventType::TrackFailed(self.ctx.guild_id, locator, why.into()),
                );
                self.after_abandon();
            }
            Ok(call) => self.start_streaming(locator, descriptor, call, tx).await,
        }

        Flow::Continue
    }

    async fn start_streaming(
        &mut self,
        locator: Locator,
        descriptor: MediaDescriptor,
        call: SharedCall,
        tx: &mpsc::UnboundedSender<Command>,
    ) {
        // The stream URL is only served with the header profile the
        // extractor negotiated.
        let mut headers = HeaderMap::new();

        for (name, value) in &descriptor.http_headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }

        let request = HttpRequest::new_with_headers(
            self.ctx.http.clone(),
            descriptor.stream_url.clone(),
            headers,
        );

        let handle = {
            let mut call = call.lock().await;

            call.set_bitrate(Bitrate::BitsPerSecond(self.ctx.config.bitrate as i32));
            call.play_input(request.into())
        };

        let notifier = PlaybackFinished {
            tx: tx.clone(),
            generation: self.generation,
        };
        let _ = handle.add_event(Event::Track(TrackEvent::End), notifier.clone());
        let _ = handle.add_event(Event::Track(TrackEvent::Error), notifier);

        *self.shared.clock.lock() = PlaybackClock::start();
        *self.shared.live.lock() = None;
        *self.shared.loop_mode.lock() = self.loop_mode;
        self.sync_queue_len();

        let tracker = spawn_tracker(TrackerContext {
            guild_id: self.ctx.guild_id,
            descriptor: descriptor.clone(),
            shared: Arc::clone(&self.shared),
            handle: handle.clone(),
            handler: Arc::clone(&self.ctx.handler),
            interval: self.ctx.config.progress_interval,
        });

        info!("Guild {} streaming \"{}\"", self.ctx.guild_id, descriptor.title);

        process(
            Arc::clone(&self.ctx.handler),
            EventType::TrackStarted(NowPlaying {
                guild_id: self.ctx.guild_id,
                descriptor: descriptor.clone(),
                position: std::time::Duration::ZERO,
                duration: descriptor.duration,
                queue_len: self.queue.len(),
                loop_mode: self.loop_mode,
            }),
        );

        self.idle_deadline = None;
        self.phase = Phase::Streaming {
            locator,
            descriptor,
            handle,
            tracker,
        };
    }

    fn on_finished(
        &mut self,
        generation: Generation,
        errored: Option<String>,
        tx: &mpsc::UnboundedSender<Command>,
    ) -> Flow {
        if generation != self.generation {
            debug!("Guild {} dropping stale completion", self.ctx.guild_id);

            return Flow::Continue;
        }

        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Streaming {
                locator,
                descriptor,
                tracker,
                ..
            } => {
                tracker.abort();

                // A mid-stream failure means "this track is over", it never
                // blocks the advance.
                if let Some(reason) = errored {
                    warn!("Guild {} track ended with a stream error: {}", self.ctx.guild_id, reason);

                    process(
                        Arc::clone(&self.ctx.handler),
                        EventType::StreamErrored(self.ctx.guild_id, reason),
                    );
                }

                info!("Guild {} finished \"{}\"", self.ctx.guild_id, descriptor.title);

                process(
                    Arc::clone(&self.ctx.handler),
                    EventType::TrackFinished(self.ctx.guild_id, descriptor),
                );

                self.queue.requeue_on_completion(locator, self.loop_mode);
                self.advance(tx);
            }
            other => self.phase = other,
        }

        Flow::Continue
    }

    fn advance(&mut self, tx: &mpsc::UnboundedSender<Command>) {
        self.sync_queue_len();

        match self.queue.dequeue_next() {
            Some(next) => {
                self.sync_queue_len();
                self.start_resolving(next, tx);
            }
            None => self.arm_idle_grace(),
        }
    }

    /// A resolution or connection failure abandons the track without
    /// advancing the queue; the caller may retry manually.
    fn after_abandon(&mut self) {
        if self.queue.is_empty() {
            self.arm_idle_grace();
        }
    }

    fn snapshot(&self) -> Option<NowPlaying> {
        if let Phase::Streaming { descriptor, .. } = &self.phase {
            let now = Instant::now();
            let mut position = {
                let clock = self.shared.clock.lock();
                let mut estimate = clock.elapsed_at(now);

                if !clock.is_paused() {
                    // Snapshots land between ticks; a fresh transport report
                    // that disagrees with the clock wins, as in the tracker.
                    if let Some(live) = *self.shared.live.lock() {
                        let age = now.saturating_duration_since(live.observed_at);
                        let projected = live.position + age;

                        if age <= self.ctx.config.progress_interval
                            && delta(estimate, projected) > DRIFT_THRESHOLD
                        {
                            estimate = projected;
                        }
                    }
                }

                estimate
            };

            if !descriptor.duration.is_zero() && position > descriptor.duration {
                position = descriptor.duration;
            }

            Some(NowPlaying {
                guild_id: self.ctx.guild_id,
                descriptor: descriptor.clone(),
                position,
                duration: descriptor.duration,
                queue_len: self.queue.len(),
                loop_mode: self.loop_mode,
            })
        } else {
            None
        }
    }

    fn arm_idle_grace(&mut self) {
        self.idle_deadline = Some(Instant::now() + self.ctx.config.idle_grace);
    }

    fn sync_queue_len(&self) {
        self.shared.queue_len.store(self.queue.len(), Ordering::SeqCst);
    }

    async fn teardown(&mut self) {
        if let Phase::Streaming { handle, tracker, .. } =
            std::mem::replace(&mut self.phase, Phase::Idle)
        {
            tracker.abort();
            let _ = handle.stop();
        }

        self.ctx.voice.disconnect(self.ctx.guild_id).await;

        if let Some(registry) = self.ctx.registry.upgrade() {
            registry.release(self.ctx.guild_id);
        }

        info!("Guild {} player state released", self.ctx.guild_id);
    }
}

/// Bridges the transport's end-of-track events into the player mailbox, so
/// completion is handled on the player task instead of a re-entrant callback.
#[derive(Clone)]
struct PlaybackFinished {
    tx: mpsc::UnboundedSender<Command>,
    generation: Generation,
}

#[async_trait]
impl VoiceEventHandler for PlaybackFinished {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let errored = if let EventContext::Track(tracks) = ctx {
            tracks.iter().find_map(|(state, _)| match &state.playing {
                PlayMode::Errored(why) => Some(why.to_string()),
                _ => None,
            })
        } else {
            None
        };

        let _ = self.tx.send(Command::Finished {
            generation: self.generation,
            errored,
        });

        Some(Event::Cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cookies::NoCookies,
        resolver::{ExtractionBackend, Outcome},
        strategy::Strategy,
    };
    use songbird::Songbird;
    use std::path::Path;
    use std::time::Duration;

    struct NullHandler;

    #[async_trait]
    impl EventHandler for NullHandler {}

    /// Backend whose resolution never completes; keeps the player in the
    /// resolving phase for as long as a test needs.
    struct HangingBackend;

    #[async_trait]
    impl ExtractionBackend for HangingBackend {
        async fn extract(&self, _strategy: &Strategy, _url: &str, _cookies: Option<&Path>) -> Outcome {
            std::future::pending::<()>().await;
            unreachable!()
        }

        async fn search(
            &self,
            _query: &str,
            _limit: usize,
            _cookies: Option<&Path>,
        ) -> Result<Vec<crate::model::descriptor::SearchCandidate>, ResolveError> {
            std::future::pending::<()>().await;
            unreachable!()
        }
    }

    /// Backend that fails every attempt with a hard error right away.
    struct DeadEndBackend;

    #[async_trait]
    impl ExtractionBackend for DeadEndBackend {
        async fn extract(&self, _strategy: &Strategy, _url: &str, _cookies: Option<&Path>) -> Outcome {
            Outcome::Hard(ResolveError::Unavailable("gone".to_string()))
        }

        async fn search(
            &self,
            _query: &str,
            _limit: usize,
            _cookies: Option<&Path>,
        ) -> Result<Vec<crate::model::descriptor::SearchCandidate>, ResolveError> {
            Ok(Vec::new())
        }
    }

    fn player_with_backend(backend: Arc<dyn ExtractionBackend>, queue_limit: usize) -> GuildPlayer {
        let config = Arc::new(PlayerConfig {
            queue_limit,
            idle_grace: Duration::from_secs(300),
            progress_interval: Duration::from_secs(5),
            bitrate: 192_000,
        });
        let resolver = Arc::new(Resolver::new(
            backend,
            Arc::new(NoCookies),
            5,
            Duration::from_secs(600),
        ));
        let voice = Arc::new(VoiceSessions::new(
            Songbird::serenity(),
            Duration::from_secs(10),
        ));

        GuildPlayer::spawn(PlayerContext {
            guild_id: GuildId::new(1),
            config,
            resolver,
            voice,
            handler: Arc::new(NullHandler),
            http: reqwest::Client::new(),
            registry: Weak::new(),
        })
    }

    fn channel() -> ChannelId {
        ChannelId::new(10)
    }

    #[tokio::test]
    async fn second_play_while_resolving_is_queued() {
        let player = player_with_backend(Arc::new(HangingBackend), 50);

        let first = player
            .play(channel(), Locator::Search("song a".to_string()))
            .await
            .unwrap();
        let second = player
            .play(channel(), Locator::Search("song b".to_string()))
            .await
            .unwrap();
        let third = player
            .play(channel(), Locator::Search("song c".to_string()))
            .await
            .unwrap();

        assert_eq!(first, PlayAck::Resolving);
        assert_eq!(second, PlayAck::Queued(1));
        assert_eq!(third, PlayAck::Queued(2));
    }

    #[tokio::test]
    async fn the_queue_bound_is_reported_synchronously() {
        let player = player_with_backend(Arc::new(HangingBackend), 1);

        player
            .play(channel(), Locator::Search("current".to_string()))
            .await
            .unwrap();
        player
            .play(channel(), Locator::Search("queued".to_string()))
            .await
            .unwrap();

        match player
            .play(channel(), Locator::Search("overflow".to_string()))
            .await
        {
            Err(PlayerError::QueueFull(1)) => {}
            other => panic!("expected QueueFull, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn resolution_failure_returns_to_idle_without_advancing() {
        let player = player_with_backend(Arc::new(DeadEndBackend), 50);

        player
            .play(channel(), Locator::Url("https://youtu.be/abc".to_string()))
            .await
            .unwrap();
        let queued = player
            .play(channel(), Locator::Search("queued".to_string()))
            .await
            .unwrap();
        assert_eq!(queued, PlayAck::Queued(1));

        // Let the failing resolution come back.
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(player.now_playing().await.is_none());

        // The player is idle again: a new play starts resolving immediately
        // instead of queueing, and the queued track was left untouched.
        let ack = player
            .play(channel(), Locator::Url("https://youtu.be/def".to_string()))
            .await
            .unwrap();
        assert_eq!(ack, PlayAck::Resolving);
    }

    #[tokio::test]
    async fn commands_without_a_track_are_rejected() {
        let player = player_with_backend(Arc::new(HangingBackend), 50);

        match player.skip().await {
            Err(PlayerError::NothingPlaying) => {}
            other => panic!("expected NothingPlaying, got {:?}", other),
        }
        match player.toggle_pause().await {
            Err(PlayerError::NothingPlaying) => {}
            other => panic!("expected NothingPlaying, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn skip_while_resolving_advances_to_the_next_entry() {
        let player = player_with_backend(Arc::new(HangingBackend), 50);

        player
            .play(channel(), Locator::Search("first".to_string()))
            .await
            .unwrap();
        player
            .play(channel(), Locator::Search("second".to_string()))
            .await
            .unwrap();

        player.skip().await.unwrap();

        // "second" was dequeued into the resolving slot, so a new play gets
        // queue position 1 again.
        let ack = player
            .play(channel(), Locator::Search("third".to_string()))
            .await
            .unwrap();
        assert_eq!(ack, PlayAck::Queued(1));
    }

    #[tokio::test]
    async fn loop_mode_cycles_in_order() {
        let player = player_with_backend(Arc::new(HangingBackend), 50);

        assert_eq!(player.cycle_loop_mode().await.unwrap(), LoopMode::RepeatTrack);
        assert_eq!(player.cycle_loop_mode().await.unwrap(), LoopMode::RepeatQueue);
        assert_eq!(player.cycle_loop_mode().await.unwrap(), LoopMode::Off);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_releases_the_player() {
        let player = player_with_backend(Arc::new(HangingBackend), 50);

        player
            .play(channel(), Locator::Search("song".to_string()))
            .await
            .unwrap();
        player.stop().await.unwrap();

        // Give the task a beat to wind down.
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!player.is_alive());
        match player.play(channel(), Locator::Search("again".to_string())).await {
            Err(PlayerError::Terminated) => {}
            other => panic!("expected Terminated, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn idle_players_expire_after_the_grace_period() {
        let config = Arc::new(PlayerConfig {
            queue_limit: 50,
            idle_grace: Duration::from_millis(50),
            progress_interval: Duration::from_secs(5),
            bitrate: 192_000,
        });
        let resolver = Arc::new(Resolver::new(
            Arc::new(HangingBackend),
            Arc::new(NoCookies),
            5,
            Duration::from_secs(600),
        ));
        let voice = Arc::new(VoiceSessions::new(
            Songbird::serenity(),
            Duration::from_secs(10),
        ));
        let player = GuildPlayer::spawn(PlayerContext {
            guild_id: GuildId::new(1),
            config,
            resolver,
            voice,
            handler: Arc::new(NullHandler),
            http: reqwest::Client::new(),
            registry: Weak::new(),
        });

        assert!(player.is_alive());

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(!player.is_alive());
    }

    #[tokio::test(start_paused = true)]
    async fn a_play_request_cancels_the_pending_teardown() {
        let config = Arc::new(PlayerConfig {
            queue_limit: 50,
            idle_grace: Duration::from_millis(150),
            progress_interval: Duration::from_secs(5),
            bitrate: 192_000,
        });
        let resolver = Arc::new(Resolver::new(
            Arc::new(HangingBackend),
            Arc::new(NoCookies),
            5,
            Duration::from_secs(600),
        ));
        let voice = Arc::new(VoiceSessions::new(
            Songbird::serenity(),
            Duration::from_secs(10),
        ));
        let player = GuildPlayer::spawn(PlayerContext {
            guild_id: GuildId::new(1),
            config,
            resolver,
            voice,
            handler: Arc::new(NullHandler),
            http: reqwest::Client::new(),
            registry: Weak::new(),
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        player
            .play(channel(), Locator::Search("song".to_string()))
            .await
            .unwrap();

        // Well past the original deadline; the resolving player must survive.
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(player.is_alive());
    }
}
