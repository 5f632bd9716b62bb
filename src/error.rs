use std::{
    error::Error,
    fmt::{
        Display,
        Formatter,
        Result,
    },
};
use songbird::error::JoinError;

pub type PlayerResult<T> = ::std::result::Result<T, PlayerError>;

/// Failure raised while turning a locator into a playable media descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The content is private, removed or otherwise explicitly unavailable.
    Unavailable(String),
    /// The locator itself is malformed or points at something unsupported.
    BadLocator(String),
    /// A search query produced no playable candidates.
    NoResults,
    /// Every strategy in the catalog was tried; carries the last observed reason.
    AllStrategiesFailed(String),
    /// The extraction backend could not be executed at all.
    Backend(String),
}

impl Error for ResolveError {}

impl Display for ResolveError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            ResolveError::Unavailable(why) => write!(f, "Content is unavailable: {}", why),
            ResolveError::BadLocator(why) => write!(f, "Locator cannot be resolved: {}", why),
            ResolveError::NoResults => write!(f, "Search returned no playable results."),
            ResolveError::AllStrategiesFailed(why) => write!(f, "All extraction strategies failed, last error: {}", why),
            ResolveError::Backend(why) => write!(f, "Extraction backend failed to run: {}", why),
        }
    }
}

/// Failure raised while joining a guild voice channel.
#[derive(Debug)]
pub enum ConnectError {
    /// The join did not complete within the configured timeout.
    Timeout,
    /// The transport rejected the join.
    Join(JoinError),
}

impl Error for ConnectError {}

impl Display for ConnectError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            ConnectError::Timeout => write!(f, "Timed out joining the voice channel."),
            ConnectError::Join(why) => write!(f, "Failed to join the voice channel: {}", why),
        }
    }
}

impl From<JoinError> for ConnectError {
    fn from(e: JoinError) -> ConnectError {
        match e {
            JoinError::TimedOut => ConnectError::Timeout,
            other => ConnectError::Join(other),
        }
    }
}

#[derive(Debug)]
pub enum PlayerError {
    Resolve(ResolveError),
    Connect(ConnectError),
    /// Failure after streaming started; the track counts as finished.
    Stream(String),
    QueueFull(usize),
    PlayerNotFound,
    NothingPlaying,
    /// The guild's player task is gone.
    Terminated,
}

impl Error for PlayerError {}

impl Display for PlayerError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            PlayerError::Resolve(why) => why.fmt(f),
            PlayerError::Connect(why) => why.fmt(f),
            PlayerError::Stream(why) => write!(f, "Playback failed mid-stream: {}", why),
            PlayerError::QueueFull(limit) => write!(f, "The queue is full ({} tracks).", limit),
            PlayerError::PlayerNotFound => write!(f, "Player not found"),
            PlayerError::NothingPlaying => write!(f, "Nothing is playing."),
            PlayerError::Terminated => write!(f, "The player for this guild has shut down."),
        }
    }
}

impl From<ResolveError> for PlayerError {
    fn from(e: ResolveError) -> PlayerError {
        PlayerError::Resolve(e)
    }
}

impl From<ConnectError> for PlayerError {
    fn from(e: ConnectError) -> PlayerError {
        PlayerError::Connect(e)
    }
}
