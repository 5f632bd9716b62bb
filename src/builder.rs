use songbird::Songbird;
use std::sync::Arc;
use std::time::Duration;
use typemap_rev::TypeMap;
use crate::{
    cookies::{CookieProvider, NoCookies},
    events::EventHandler,
    registry::PlayerRegistry,
    resolver::{ExtractionBackend, YtDlpBackend},
};

/// Per-guild playback settings resolved at build time.
pub(crate) struct PlayerConfig {
    pub queue_limit: usize,
    pub idle_grace: Duration,
    pub progress_interval: Duration,
    pub bitrate: u32,
}

pub struct RegistryBuilder {
    pub event_handler: Arc<dyn EventHandler>,
    pub data: TypeMap,
    pub(crate) queue_limit: usize,
    pub(crate) connect_timeout: Duration,
    pub(crate) idle_grace: Duration,
    pub(crate) progress_interval: Duration,
    pub(crate) max_search_duration: Duration,
    pub(crate) search_limit: usize,
    pub(crate) bitrate: u32,
    pub(crate) cookies: Arc<dyn CookieProvider>,
    pub(crate) backend: Arc<dyn ExtractionBackend>,
}

impl RegistryBuilder {
    pub fn new<H: EventHandler + 'static>(handler: H) -> Self {
        Self {
            event_handler: Arc::new(handler),
            data: TypeMap::new(),
            queue_limit: 50,
            connect_timeout: Duration::from_secs(10),
            idle_grace: Duration::from_secs(300),
            progress_interval: Duration::from_secs(5),
            max_search_duration: Duration::from_secs(600),
            search_limit: 5,
            bitrate: 192_000,
            cookies: Arc::new(NoCookies),
            backend: Arc::new(YtDlpBackend::new()),
        }
    }

    /// Maximum number of pending tracks per guild.
    pub fn set_queue_limit(&mut self, limit: usize) -> &mut Self {
        self.queue_limit = limit;

        self
    }

    pub fn set_connect_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.connect_timeout = timeout;

        self
    }

    /// How long an idle guild keeps its voice session before teardown.
    pub fn set_idle_grace(&mut self, grace: Duration) -> &mut Self {
        self.idle_grace = grace;

        self
    }

    pub fn set_progress_interval(&mut self, interval: Duration) -> &mut Self {
        self.progress_interval = interval;

        self
    }

    /// Search results longer than this never become candidates.
    pub fn set_max_search_duration(&mut self, ceiling: Duration) -> &mut Self {
        self.max_search_duration = ceiling;

        self
    }

    pub fn set_search_limit(&mut self, limit: usize) -> &mut Self {
        self.search_limit = limit;

        self
    }

    /// Constant output bitrate of the voice encoder, in bits per second.
    pub fn set_bitrate(&mut self, bitrate: u32) -> &mut Self {
        self.bitrate = bitrate;

        self
    }

    pub fn set_cookie_provider<P: CookieProvider>(&mut self, provider: P) -> &mut Self {
        self.cookies = Arc::new(provider);

        self
    }

    pub fn set_backend<B: ExtractionBackend>(&mut self, backend: B) -> &mut Self {
        self.backend = Arc::new(backend);

        self
    }

    pub fn data_ref(&self) -> &TypeMap {
        &self.data
    }

    pub fn build(self, manager: Arc<Songbird>) -> Arc<PlayerRegistry> {
        PlayerRegistry::new(self, manager)
    }
}
