use async_trait::async_trait;
use std::path::PathBuf;

/// Source of the authentication cookies handed to the extractor. The handle
/// is an opaque cookies file path; how it is acquired or refreshed is the
/// embedder's concern.
#[async_trait]
pub trait CookieProvider: Send + Sync + 'static {
    async fn cookie_file(&self) -> Option<PathBuf>;
}

/// Provider used when no authentication cookies are configured.
pub struct NoCookies;

#[async_trait]
impl CookieProvider for NoCookies {
    async fn cookie_file(&self) -> Option<PathBuf> {
        None
    }
}

/// Serves a fixed cookies file maintained by an external refresher.
pub struct StaticCookieFile(pub PathBuf);

#[async_trait]
impl CookieProvider for StaticCookieFile {
    async fn cookie_file(&self) -> Option<PathBuf> {
        if self.0.exists() {
            Some(self.0.clone())
        } else {
            None
        }
    }
}
