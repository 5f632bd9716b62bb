use lazy_static::lazy_static;
use regex::Regex;

lazy_static!(
    static ref TRACK_URL_REGEX: Regex = Regex::new(
        r"^https?://(?:www\.)?(?:youtube\.com/watch\?v=[\w-]+|youtu\.be/[\w-]+|music\.youtube\.com/watch\?v=[\w-]+|(?:open\.)?spotify\.com/track/\w+|soundcloud\.com/[\w/-]+)"
    ).unwrap();
);

/// A URL or free-text search query identifying a candidate track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Url(String),
    Search(String),
}

impl Locator {
    /// Classifies raw user input as a direct URL or a search query.
    pub fn parse(input: impl Into<String>) -> Self {
        let input = input.into();

        if TRACK_URL_REGEX.is_match(&input) {
            Self::Url(input)
        } else {
            Self::Search(input)
        }
    }

    pub fn is_search(&self) -> bool {
        matches!(self, Self::Search(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Url(s) => s,
            Self::Search(s) => s,
        }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Url(url) => write!(f, "{}", url),
            Self::Search(query) => write!(f, "ytsearch:{}", query),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_links_are_urls() {
        assert!(!Locator::parse("https://www.youtube.com/watch?v=dQw4w9WgXcQ").is_search());
        assert!(!Locator::parse("https://youtu.be/dQw4w9WgXcQ").is_search());
        assert!(!Locator::parse("https://soundcloud.com/artist/track-name").is_search());
    }

    #[test]
    fn free_text_is_a_search() {
        assert!(Locator::parse("never gonna give you up").is_search());
        assert!(Locator::parse("https on the radio").is_search());
    }

    #[test]
    fn bare_domains_are_searches() {
        // No video id, nothing to resolve directly.
        assert!(Locator::parse("youtube.com").is_search());
    }
}
