use serenity::model::id::GuildId;
use std::time::{Duration, Instant};
use super::descriptor::MediaDescriptor;

/// Loop behavior applied when the current track completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    Off,
    RepeatTrack,
    RepeatQueue,
}

impl LoopMode {
    /// Advances to the next mode: off, current track, whole queue.
    pub fn cycle(self) -> Self {
        match self {
            Self::Off => Self::RepeatTrack,
            Self::RepeatTrack => Self::RepeatQueue,
            Self::RepeatQueue => Self::Off,
        }
    }
}

impl Default for LoopMode {
    fn default() -> Self {
        Self::Off
    }
}

impl std::fmt::Display for LoopMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            Self::RepeatTrack => write!(f, "track"),
            Self::RepeatQueue => write!(f, "queue"),
        }
    }
}

/// Monotonic playback clock: a start anchor plus accumulated pause time.
/// Elapsed position is computed on demand, no periodic wall-clock polling.
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    started_at: Instant,
    paused_total: Duration,
    paused_since: Option<Instant>,
}

impl PlaybackClock {
    pub fn start() -> Self {
        Self::started(Instant::now())
    }

    pub fn started(at: Instant) -> Self {
        Self {
            started_at: at,
            paused_total: Duration::ZERO,
            paused_since: None,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused_since.is_some()
    }

    pub fn pause(&mut self) {
        self.pause_at(Instant::now());
    }

    pub fn pause_at(&mut self, now: Instant) {
        if self.paused_since.is_none() {
            self.paused_since = Some(now);
        }
    }

    pub fn resume(&mut self) {
        self.resume_at(Instant::now());
    }

    /// Folds the pause interval into the accumulated pause time.
    pub fn resume_at(&mut self, now: Instant) {
        if let Some(since) = self.paused_since.take() {
            self.paused_total += now.saturating_duration_since(since);
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed_at(Instant::now())
    }

    /// Elapsed playback position. While paused the position is frozen at the
    /// pause instant.
    pub fn elapsed_at(&self, now: Instant) -> Duration {
        let reference = self.paused_since.unwrap_or(now);

        reference
            .saturating_duration_since(self.started_at)
            .saturating_sub(self.paused_total)
    }

    pub fn rebase(&mut self, position: Duration) {
        self.rebase_at(position, Instant::now());
    }

    /// Adopts a transport-reported position as the new baseline, correcting
    /// clock drift without touching the pause bookkeeping.
    pub fn rebase_at(&mut self, position: Duration, now: Instant) {
        let reference = self.paused_since.unwrap_or(now);

        if let Some(anchor) = reference.checked_sub(position + self.paused_total) {
            self.started_at = anchor;
        }
    }
}

/// Most recent position reported directly by the voice transport.
#[derive(Debug, Clone, Copy)]
pub struct LivePosition {
    pub position: Duration,
    pub observed_at: Instant,
}

/// Snapshot handed to display consumers on track start and progress ticks.
#[derive(Debug, Clone)]
pub struct NowPlaying {
    pub guild_id: GuildId,
    pub descriptor: MediaDescriptor,
    pub position: Duration,
    pub duration: Duration,
    pub queue_len: usize,
    pub loop_mode: LoopMode,
}

/// Formats a duration as `M:SS`, or `H:MM:SS` past the hour mark.
pub fn format_timestamp(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

/// Fixed-width textual progress bar. An unknown total renders as full.
pub fn progress_bar(position: Duration, duration: Duration, width: usize) -> String {
    if duration.is_zero() {
        return "█".repeat(width);
    }

    let progress = (position.as_secs_f64() / duration.as_secs_f64()).min(1.0);
    let filled = (width as f64 * progress) as usize;

    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_advances_while_playing() {
        let t0 = Instant::now();
        let clock = PlaybackClock::started(t0);

        let a = clock.elapsed_at(t0 + Duration::from_secs(5));
        let b = clock.elapsed_at(t0 + Duration::from_secs(9));

        assert_eq!(a, Duration::from_secs(5));
        assert!(b >= a);
    }

    #[test]
    fn pause_freezes_the_position() {
        let t0 = Instant::now();
        let mut clock = PlaybackClock::started(t0);

        clock.pause_at(t0 + Duration::from_secs(30));

        assert_eq!(clock.elapsed_at(t0 + Duration::from_secs(90)), Duration::from_secs(30));
    }

    #[test]
    fn pause_resume_conserves_position() {
        let t0 = Instant::now();
        let mut clock = PlaybackClock::started(t0);

        let before = clock.elapsed_at(t0 + Duration::from_secs(30));
        clock.pause_at(t0 + Duration::from_secs(30));
        clock.resume_at(t0 + Duration::from_secs(75));
        let after = clock.elapsed_at(t0 + Duration::from_secs(75));

        assert_eq!(before, after);
        // The clock keeps counting from where it left off.
        assert_eq!(clock.elapsed_at(t0 + Duration::from_secs(80)), Duration::from_secs(35));
    }

    #[test]
    fn double_pause_is_a_noop() {
        let t0 = Instant::now();
        let mut clock = PlaybackClock::started(t0);

        clock.pause_at(t0 + Duration::from_secs(10));
        clock.pause_at(t0 + Duration::from_secs(20));
        clock.resume_at(t0 + Duration::from_secs(30));

        assert_eq!(clock.elapsed_at(t0 + Duration::from_secs(35)), Duration::from_secs(15));
    }

    #[test]
    fn rebase_adopts_the_live_position() {
        let t0 = Instant::now();
        let mut clock = PlaybackClock::started(t0);

        let now = t0 + Duration::from_secs(60);
        clock.rebase_at(Duration::from_secs(55), now);

        assert_eq!(clock.elapsed_at(now), Duration::from_secs(55));
        assert_eq!(clock.elapsed_at(now + Duration::from_secs(5)), Duration::from_secs(60));
    }

    #[test]
    fn rebase_while_paused_keeps_the_clock_frozen() {
        let t0 = Instant::now();
        let mut clock = PlaybackClock::started(t0);

        clock.pause_at(t0 + Duration::from_secs(40));
        clock.rebase_at(Duration::from_secs(38), t0 + Duration::from_secs(50));

        assert!(clock.is_paused());
        assert_eq!(clock.elapsed_at(t0 + Duration::from_secs(120)), Duration::from_secs(38));
    }

    #[test]
    fn loop_mode_cycles_through_all_modes() {
        let mode = LoopMode::Off;
        assert_eq!(mode.cycle(), LoopMode::RepeatTrack);
        assert_eq!(mode.cycle().cycle(), LoopMode::RepeatQueue);
        assert_eq!(mode.cycle().cycle().cycle(), LoopMode::Off);
    }

    #[test]
    fn timestamps_render_like_a_player() {
        assert_eq!(format_timestamp(Duration::from_secs(0)), "0:00");
        assert_eq!(format_timestamp(Duration::from_secs(185)), "3:05");
        assert_eq!(format_timestamp(Duration::from_secs(3725)), "1:02:05");
    }

    #[test]
    fn progress_bar_fills_proportionally() {
        let bar = progress_bar(Duration::from_secs(90), Duration::from_secs(180), 20);
        assert_eq!(bar.chars().filter(|c| *c == '█').count(), 10);

        // Past the end stays clamped.
        let bar = progress_bar(Duration::from_secs(400), Duration::from_secs(180), 20);
        assert_eq!(bar.chars().filter(|c| *c == '█').count(), 20);

        // Live streams render as a full bar.
        assert_eq!(progress_bar(Duration::from_secs(5), Duration::ZERO, 8), "█".repeat(8));
    }
}
