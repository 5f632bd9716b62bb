use serde::Deserialize;
use serde_aux::field_attributes::deserialize_option_number_from_string;
use std::collections::HashMap;
use std::time::Duration;

/// Resolved, playable track metadata. Immutable once produced, dropped when
/// the track ends.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaDescriptor {
    pub title: String,
    /// Zero means live or unknown length.
    pub duration: Duration,
    pub stream_url: String,
    pub page_url: String,
    pub uploader: Option<String>,
    pub view_count: Option<u64>,
    pub like_count: Option<u64>,
    pub thumbnail: Option<String>,
    /// Request headers the extractor used; the stream URL is only valid with these.
    pub http_headers: HashMap<String, String>,
}

impl MediaDescriptor {
    pub fn is_live(&self) -> bool {
        self.duration.is_zero()
    }
}

/// Raw extractor payload for a single resolved video.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawExtraction {
    pub id: Option<String>,
    pub title: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    pub url: Option<String>,
    pub webpage_url: Option<String>,
    pub uploader: Option<String>,
    #[serde(default, deserialize_with = "deserialize_option_number_from_string")]
    pub view_count: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_option_number_from_string")]
    pub like_count: Option<u64>,
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub http_headers: HashMap<String, String>,
}

impl RawExtraction {
    /// Validates the payload into a descriptor; `None` when no direct stream
    /// URL or title was produced.
    pub fn into_descriptor(self) -> Option<MediaDescriptor> {
        let title = self.title?;
        let stream_url = self.url?;
        let page_url = self
            .webpage_url
            .or_else(|| self.id.map(|id| format!("https://www.youtube.com/watch?v={}", id)))
            .unwrap_or_else(|| stream_url.clone());

        Some(MediaDescriptor {
            title,
            duration: Duration::from_secs_f64(self.duration.unwrap_or(0.0).max(0.0)),
            stream_url,
            page_url,
            uploader: self.uploader,
            view_count: self.view_count,
            like_count: self.like_count,
            thumbnail: self.thumbnail,
            http_headers: self.http_headers,
        })
    }
}

/// Lightweight entry returned by a flat search pass.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SearchCandidate {
    pub id: Option<String>,
    pub title: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    pub url: Option<String>,
    #[serde(default, deserialize_with = "deserialize_option_number_from_string")]
    pub view_count: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_option_number_from_string")]
    pub like_count: Option<u64>,
}

impl SearchCandidate {
    /// Entries without an identifier or title cannot be resolved further.
    pub fn is_playable(&self) -> bool {
        (self.id.is_some() || self.url.is_some()) && self.title.is_some()
    }

    /// Full page URL for the second, non-flat resolution pass.
    pub fn page_url(&self) -> Option<String> {
        self.url
            .clone()
            .or_else(|| self.id.as_ref().map(|id| format!("https://www.youtube.com/watch?v={}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_requires_stream_url_and_title() {
        let raw = RawExtraction {
            title: Some("song".into()),
            ..Default::default()
        };
        assert!(raw.into_descriptor().is_none());

        let raw = RawExtraction {
            title: Some("song".into()),
            url: Some("https://cdn.example/a.webm".into()),
            duration: Some(180.0),
            ..Default::default()
        };
        let descriptor = raw.into_descriptor().unwrap();
        assert_eq!(descriptor.duration, Duration::from_secs(180));
        assert!(!descriptor.is_live());
    }

    #[test]
    fn missing_duration_means_live() {
        let raw = RawExtraction {
            title: Some("radio".into()),
            url: Some("https://cdn.example/live".into()),
            ..Default::default()
        };
        assert!(raw.into_descriptor().unwrap().is_live());
    }

    #[test]
    fn page_url_falls_back_to_id() {
        let raw = RawExtraction {
            title: Some("song".into()),
            url: Some("https://cdn.example/a.webm".into()),
            id: Some("abc123".into()),
            ..Default::default()
        };
        let descriptor = raw.into_descriptor().unwrap();
        assert_eq!(descriptor.page_url, "https://www.youtube.com/watch?v=abc123");
    }

    #[test]
    fn stringy_counters_still_parse() {
        let raw: RawExtraction = serde_json::from_str(
            r#"{"title": "song", "url": "https://cdn.example/a", "view_count": "12345"}"#,
        )
        .unwrap();
        assert_eq!(raw.view_count, Some(12345));
    }
}
