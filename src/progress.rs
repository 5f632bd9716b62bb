use parking_lot::Mutex;
use serenity::model::id::GuildId;
use songbird::tracks::{PlayMode, TrackHandle};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use crate::{
    events::{process, EventHandler, EventType},
    model::{
        descriptor::MediaDescriptor,
        playback::{LivePosition, LoopMode, NowPlaying, PlaybackClock},
    },
};

/// A transport report further from the clock estimate than this is adopted
/// as the new baseline.
pub(crate) const DRIFT_THRESHOLD: Duration = Duration::from_secs(2);
/// Movement below this across a tick counts as no progress.
const STALL_EPSILON: Duration = Duration::from_millis(500);
/// Consecutive no-progress ticks before corrective action.
const STALL_TICKS: u32 = 3;
/// Updates closer together than this are dropped as duplicates.
const DISPATCH_STEP: Duration = Duration::from_secs(1);

/// Playback state shared between a guild's player task and its progress
/// loop. The player owns every transition, the loop only reads and rebases.
pub(crate) struct SharedPlayback {
    pub clock: Mutex<PlaybackClock>,
    pub live: Mutex<Option<LivePosition>>,
    pub queue_len: AtomicUsize,
    pub loop_mode: Mutex<LoopMode>,
}

impl SharedPlayback {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            clock: Mutex::new(PlaybackClock::start()),
            live: Mutex::new(None),
            queue_len: AtomicUsize::new(0),
            loop_mode: Mutex::new(LoopMode::Off),
        })
    }
}

pub(crate) struct TrackerContext {
    pub guild_id: GuildId,
    pub descriptor: MediaDescriptor,
    pub shared: Arc<SharedPlayback>,
    pub handle: TrackHandle,
    pub handler: Arc<dyn EventHandler>,
    pub interval: Duration,
}

pub(crate) enum StallAction {
    None,
    /// Adopt the transport position as the new clock baseline.
    Resync,
    /// The resync did not help, surface the stall.
    Report,
}

/// Counts consecutive no-progress ticks while nominally playing. One
/// corrective resync is attempted before the stall is reported; any forward
/// movement resets the whole cycle. Completion stays the transport's call,
/// a stall is never fatal here.
pub(crate) struct StallMonitor {
    last_position: Duration,
    stalled_ticks: u32,
    resynced: bool,
    reported: bool,
}

impl StallMonitor {
    pub fn new() -> Self {
        Self {
            last_position: Duration::ZERO,
            stalled_ticks: 0,
            resynced: false,
            reported: false,
        }
    }

    pub fn observe(&mut self, position: Duration, playing: bool) -> StallAction {
        let moved = position > self.last_position + STALL_EPSILON;
        self.last_position = position;

        if !playing {
            return StallAction::None;
        }

        if moved {
            self.stalled_ticks = 0;
            self.resynced = false;
            self.reported = false;

            return StallAction::None;
        }

        self.stalled_ticks += 1;

        if self.stalled_ticks < STALL_TICKS {
            StallAction::None
        } else if !self.resynced {
            self.resynced = true;
            self.stalled_ticks = 0;

            StallAction::Resync
        } else if !self.reported {
            self.reported = true;

            StallAction::Report
        } else {
            StallAction::None
        }
    }
}

/// Spawns the periodic progress loop for one streaming track. The loop ends
/// on its own once the transport reports the track done; the player aborts
/// it on skip, stop and teardown.
pub(crate) fn spawn_tracker(ctx: TrackerContext) -> JoinHandle<()> {
    tokio::spawn(async move {
        let TrackerContext {
            guild_id,
            descriptor,
            shared,
            handle,
            handler,
            interval,
        } = ctx;

        let duration = descriptor.duration;
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut last_dispatched: Option<Duration> = None;
        let mut stall = StallMonitor::new();

        loop {
            ticker.tick().await;

            let info = match handle.get_info().await {
                Ok(info) => info,
                Err(_) => break,
            };

            let nominally_playing = match info.playing {
                PlayMode::Play => true,
                PlayMode::Pause => false,
                _ => break,
            };

            let now = Instant::now();

            *shared.live.lock() = Some(LivePosition {
                position: info.position,
                observed_at: now,
            });

            let mut position = {
                let mut clock = shared.clock.lock();
                let estimate = clock.elapsed_at(now);

                if nominally_playing && !clock.is_paused() && delta(estimate, info.position) > DRIFT_THRESHOLD {
                    debug!(
                        "Guild {} clock drifted ({:?} vs live {:?}), rebasing",
                        guild_id, estimate, info.position
                    );
                    clock.rebase_at(info.position, now);

                    info.position
                } else {
                    estimate
                }
            };

            if !duration.is_zero() && position > duration {
                position = duration;
            }

            match stall.observe(position, nominally_playing) {
                StallAction::None => {}
                StallAction::Resync => {
                    info!("Guild {} playback looks stuck at {:?}, resyncing to transport", guild_id, position);
                    shared.clock.lock().rebase_at(info.position, now);
                }
                StallAction::Report => {
                    warn!("Guild {} playback still stuck at {:?} after resync", guild_id, position);
                    process(Arc::clone(&handler), EventType::PlaybackStalled(guild_id, position));
                }
            }

            let should_dispatch = match last_dispatched {
                None => true,
                Some(previous) => delta(position, previous) >= DISPATCH_STEP,
            };

            if should_dispatch {
                last_dispatched = Some(position);

                process(
                    Arc::clone(&handler),
                    EventType::NowPlayingChanged(NowPlaying {
                        guild_id,
                        descriptor: descriptor.clone(),
                        position,
                        duration,
                        queue_len: shared.queue_len.load(Ordering::SeqCst),
                        loop_mode: *shared.loop_mode.lock(),
                    }),
                );
            }
        }
    })
}

pub(crate) fn delta(a: Duration, b: Duration) -> Duration {
    if a > b {
        a - b
    } else {
        b - a
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn delta_is_symmetric() {
        let a = Duration::from_secs(10);
        let b = Duration::from_secs(13);

        assert_eq!(delta(a, b), Duration::from_secs(3));
        assert_eq!(delta(b, a), Duration::from_secs(3));
    }

    #[test]
    fn advancing_playback_never_triggers_a_stall() {
        let mut stall = StallMonitor::new();

        for tick in 1..=10 {
            assert!(matches!(stall.observe(secs(tick * 5), true), StallAction::None));
        }
    }

    #[test]
    fn three_stuck_ticks_trigger_one_resync() {
        let mut stall = StallMonitor::new();
        stall.observe(secs(30), true);

        assert!(matches!(stall.observe(secs(30), true), StallAction::None));
        assert!(matches!(stall.observe(secs(30), true), StallAction::None));
        assert!(matches!(stall.observe(secs(30), true), StallAction::Resync));
    }

    #[test]
    fn a_stall_surviving_the_resync_is_reported_once() {
        let mut stall = StallMonitor::new();
        stall.observe(secs(30), true);

        while !matches!(stall.observe(secs(30), true), StallAction::Resync) {}

        assert!(matches!(stall.observe(secs(30), true), StallAction::None));
        assert!(matches!(stall.observe(secs(30), true), StallAction::None));
        assert!(matches!(stall.observe(secs(30), true), StallAction::Report));
        // Nothing further while the position stays put.
        assert!(matches!(stall.observe(secs(30), true), StallAction::None));
        assert!(matches!(stall.observe(secs(30), true), StallAction::None));
        assert!(matches!(stall.observe(secs(30), true), StallAction::None));
    }

    #[test]
    fn forward_movement_resets_the_cycle() {
        let mut stall = StallMonitor::new();
        stall.observe(secs(30), true);
        stall.observe(secs(30), true);
        stall.observe(secs(30), true);

        assert!(matches!(stall.observe(secs(35), true), StallAction::None));

        // The counter starts over, including the resync allowance.
        stall.observe(secs(35), true);
        stall.observe(secs(35), true);
        assert!(matches!(stall.observe(secs(35), true), StallAction::Resync));
    }

    #[test]
    fn paused_ticks_do_not_count_as_stuck() {
        let mut stall = StallMonitor::new();
        stall.observe(secs(30), true);

        for _ in 0..10 {
            assert!(matches!(stall.observe(secs(30), false), StallAction::None));
        }

        // Still takes the full run of playing ticks once resumed.
        assert!(matches!(stall.observe(secs(30), true), StallAction::None));
        assert!(matches!(stall.observe(secs(30), true), StallAction::None));
        assert!(matches!(stall.observe(secs(30), true), StallAction::Resync));
    }

    #[test]
    fn sub_epsilon_movement_still_counts_as_stuck() {
        let mut stall = StallMonitor::new();
        stall.observe(secs(30), true);

        assert!(matches!(stall.observe(secs(30) + Duration::from_millis(100), true), StallAction::None));
        assert!(matches!(stall.observe(secs(30) + Duration::from_millis(200), true), StallAction::None));
        assert!(matches!(stall.observe(secs(30) + Duration::from_millis(300), true), StallAction::Resync));
    }
}
