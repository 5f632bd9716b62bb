use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};
use crate::{
    cookies::CookieProvider,
    error::ResolveError,
    model::{
        descriptor::{MediaDescriptor, RawExtraction, SearchCandidate},
        locator::Locator,
    },
    strategy::{self, Strategy, SOCKET_TIMEOUT_SECS},
};

// Margin on top of the extractor's own socket timeout before the attempt is
// abandoned from the outside.
const ATTEMPT_TIMEOUT_MARGIN_SECS: u64 = 15;

/// Outcome of one extraction attempt with one strategy.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// The attempt produced a playable descriptor; remaining strategies are skipped.
    Success(MediaDescriptor),
    /// The attempt failed in a way another strategy might get past.
    Soft(String),
    /// The attempt failed in a way no other strategy will change.
    Hard(ResolveError),
}

/// Issues the actual extraction calls. The production backend drives the
/// yt-dlp binary; tests substitute their own.
#[async_trait]
pub trait ExtractionBackend: Send + Sync + 'static {
    /// One resolution attempt for a direct URL using the given strategy profile.
    async fn extract(&self, strategy: &Strategy, url: &str, cookies: Option<&Path>) -> Outcome;

    /// Flat search returning lightweight candidate entries in result order.
    async fn search(
        &self,
        query: &str,
        limit: usize,
        cookies: Option<&Path>,
    ) -> Result<Vec<SearchCandidate>, ResolveError>;
}

/// Backend invoking the yt-dlp binary and classifying its stderr.
pub struct YtDlpBackend {
    binary: PathBuf,
}

impl YtDlpBackend {
    pub fn new() -> Self {
        Self::at("yt-dlp")
    }

    pub fn at(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }

    async fn run(&self, args: Vec<String>) -> Result<std::process::Output, String> {
        let attempt_timeout = Duration::from_secs(SOCKET_TIMEOUT_SECS + ATTEMPT_TIMEOUT_MARGIN_SECS);

        let mut command = Command::new(&self.binary);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match tokio::time::timeout(attempt_timeout, command.output()).await {
            Err(_) => Err(format!("extractor gave no answer within {}s", attempt_timeout.as_secs())),
            Ok(Err(why)) => Err(format!("failed to spawn {}: {}", self.binary.display(), why)),
            Ok(Ok(output)) => Ok(output),
        }
    }
}

impl Default for YtDlpBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExtractionBackend for YtDlpBackend {
    async fn extract(&self, strategy: &Strategy, url: &str, cookies: Option<&Path>) -> Outcome {
        let output = match self.run(strategy.extractor_args(url, cookies)).await {
            Ok(output) => output,
            // A missing or broken binary fails every strategy the same way.
            Err(why) if why.starts_with("failed to spawn") => {
                return Outcome::Hard(ResolveError::Backend(why));
            }
            Err(why) => return Outcome::Soft(why),
        };

        if !output.status.success() {
            return classify_failure(&String::from_utf8_lossy(&output.stderr));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let payload = match stdout.lines().find(|line| line.trim_start().starts_with('{')) {
            Some(line) => line,
            None => return Outcome::Soft("extractor produced no payload".to_string()),
        };

        match serde_json::from_str::<RawExtraction>(payload) {
            Ok(raw) => match raw.into_descriptor() {
                Some(descriptor) => Outcome::Success(descriptor),
                None => Outcome::Soft("extractor payload had no usable stream".to_string()),
            },
            Err(why) => Outcome::Soft(format!("unreadable extractor payload: {}", why)),
        }
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
        cookies: Option<&Path>,
    ) -> Result<Vec<SearchCandidate>, ResolveError> {
        let output = self
            .run(strategy::search_args(query, limit, cookies))
            .await
            .map_err(ResolveError::Backend)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);

            return match classify_failure(&stderr) {
                Outcome::Hard(e) => Err(e),
                _ => Err(ResolveError::Backend(first_error_line(&stderr))),
            };
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let entries = stdout
            .lines()
            .filter_map(|line| serde_json::from_str::<SearchCandidate>(line).ok())
            .collect();

        Ok(entries)
    }
}

/// Maps an extractor stderr dump onto the soft/hard failure taxonomy.
/// Hard failures abort the remaining strategies, soft ones continue.
pub(crate) fn classify_failure(stderr: &str) -> Outcome {
    let lower = stderr.to_lowercase();
    let reason = first_error_line(stderr);

    // Content that no header profile will make appear.
    if lower.contains("private video")
        || lower.contains("video is private")
        || lower.contains("video unavailable")
        || lower.contains("has been removed")
        || lower.contains("no longer available")
        || lower.contains("members only")
        || lower.contains("not available in your country")
        || lower.contains("blocked in your country")
    {
        return Outcome::Hard(ResolveError::Unavailable(reason));
    }

    if lower.contains("unsupported url")
        || lower.contains("is not a valid url")
        || lower.contains("invalid url")
    {
        return Outcome::Hard(ResolveError::BadLocator(reason));
    }

    // Everything else is worth another profile: bot challenges, rate limits,
    // format gaps and plain network trouble.
    Outcome::Soft(reason)
}

fn first_error_line(stderr: &str) -> String {
    stderr
        .lines()
        .find(|line| line.trim_start().to_lowercase().starts_with("error"))
        .or_else(|| stderr.lines().find(|line| !line.trim().is_empty()))
        .unwrap_or("extractor failed without output")
        .trim()
        .to_string()
}

/// Filters and orders search candidates, returning the winner's page URL.
/// Candidates above the duration ceiling never reach the ordering step.
pub(crate) fn select_candidate(
    entries: Vec<SearchCandidate>,
    max_duration: Duration,
) -> Option<String> {
    let ceiling = max_duration.as_secs_f64();

    entries
        .into_iter()
        .filter(SearchCandidate::is_playable)
        .filter(|candidate| candidate.duration.map(|d| d <= ceiling).unwrap_or(true))
        .max_by_key(|candidate| {
            (
                candidate.view_count.unwrap_or(0),
                candidate.like_count.unwrap_or(0),
                candidate.duration.unwrap_or(0.0) as u64,
            )
        })
        .and_then(|winner| winner.page_url())
}

/// Turns a locator into a playable media descriptor by walking the strategy
/// catalog in priority order. First success wins; a hard failure aborts the
/// walk.
pub struct Resolver {
    backend: Arc<dyn ExtractionBackend>,
    cookies: Arc<dyn CookieProvider>,
    search_limit: usize,
    max_search_duration: Duration,
}

impl Resolver {
    pub fn new(
        backend: Arc<dyn ExtractionBackend>,
        cookies: Arc<dyn CookieProvider>,
        search_limit: usize,
        max_search_duration: Duration,
    ) -> Self {
        Self {
            backend,
            cookies,
            search_limit,
            max_search_duration,
        }
    }

    pub async fn resolve(&self, locator: &Locator) -> Result<MediaDescriptor, ResolveError> {
        match locator {
            Locator::Url(url) => self.resolve_url(url).await,
            Locator::Search(query) => {
                let url = self.pick_candidate(query).await?;

                info!("Search \"{}\" resolved to {}", query, url);

                self.resolve_url(&url).await
            }
        }
    }

    async fn resolve_url(&self, url: &str) -> Result<MediaDescriptor, ResolveError> {
        let cookies = self.cookies.cookie_file().await;
        let catalog = strategy::catalog();
        let mut last_soft: Option<String> = None;

        for (index, strategy) in catalog.iter().enumerate() {
            info!("Trying extraction strategy {}/{}: {}", index + 1, catalog.len(), strategy.name);

            match self.backend.extract(strategy, url, cookies.as_deref()).await {
                Outcome::Success(descriptor) => {
                    info!("Strategy {} resolved \"{}\"", strategy.name, descriptor.title);

                    return Ok(descriptor);
                }
                Outcome::Soft(reason) => {
                    warn!("Strategy {} failed: {}", strategy.name, reason);

                    last_soft = Some(reason);
                }
                Outcome::Hard(error) => {
                    warn!("Strategy {} hit a dead end, aborting: {}", strategy.name, error);

                    return Err(error);
                }
            }
        }

        Err(ResolveError::AllStrategiesFailed(
            last_soft.unwrap_or_else(|| "no strategy produced a result".to_string()),
        ))
    }

    async fn pick_candidate(&self, query: &str) -> Result<String, ResolveError> {
        let cookies = self.cookies.cookie_file().await;
        let entries = self
            .backend
            .search(query, self.search_limit, cookies.as_deref())
            .await?;

        select_candidate(entries, self.max_search_duration).ok_or(ResolveError::NoResults)
    }
}
