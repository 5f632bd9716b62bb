use lazy_static::lazy_static;
use std::path::Path;

/// Socket timeout handed to the extractor per attempt, in seconds.
pub const SOCKET_TIMEOUT_SECS: u64 = 60;
/// Extractor-internal retry count per attempt.
pub const EXTRACTOR_RETRIES: u32 = 5;

const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const PLAIN_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const ANDROID_UA: &str = "com.google.android.youtube/17.31.35 (Linux; U; Android 11) gzip";
const IOS_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 14_7_1 like Mac OS X) AppleWebKit/605.1.15";

const CAPPED_FORMAT: &str = "best[height<=720]/best";

/// One extraction configuration: request-header profile, player-client hints
/// and format preference. Tried in catalog order, most broadly compatible
/// first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Strategy {
    pub name: &'static str,
    pub user_agent: &'static str,
    pub headers: &'static [(&'static str, &'static str)],
    pub player_clients: &'static [&'static str],
    pub player_skip: &'static [&'static str],
    pub skip_auth_check: bool,
    pub format: &'static str,
}

lazy_static!(
    static ref CATALOG: Vec<Strategy> = vec![
        Strategy {
            name: "enhanced-web",
            user_agent: BROWSER_UA,
            headers: &[
                ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8"),
                ("Accept-Language", "en-US,en;q=0.9"),
                ("DNT", "1"),
                ("Upgrade-Insecure-Requests", "1"),
                ("Sec-Fetch-Dest", "document"),
                ("Sec-Fetch-Mode", "navigate"),
                ("Sec-Fetch-Site", "none"),
                ("Sec-Fetch-User", "?1"),
                ("Cache-Control", "max-age=0"),
                ("Referer", "https://www.youtube.com/"),
                ("Origin", "https://www.youtube.com"),
            ],
            player_clients: &["web"],
            player_skip: &["js", "configs"],
            skip_auth_check: false,
            format: CAPPED_FORMAT,
        },
        Strategy {
            name: "android-client",
            user_agent: ANDROID_UA,
            headers: &[
                ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
                ("Accept-Language", "en-US,en;q=0.5"),
            ],
            player_clients: &["android"],
            player_skip: &["js"],
            skip_auth_check: false,
            format: CAPPED_FORMAT,
        },
        Strategy {
            name: "minimal-headers",
            user_agent: PLAIN_UA,
            headers: &[
                ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
                ("Accept-Language", "en-US,en;q=0.5"),
            ],
            player_clients: &[],
            player_skip: &[],
            skip_auth_check: false,
            format: CAPPED_FORMAT,
        },
        Strategy {
            name: "mobile-client",
            user_agent: IOS_UA,
            headers: &[
                ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
                ("Accept-Language", "en-US,en;q=0.5"),
            ],
            player_clients: &[],
            player_skip: &[],
            skip_auth_check: false,
            format: CAPPED_FORMAT,
        },
        Strategy {
            name: "skip-auth-check",
            user_agent: PLAIN_UA,
            headers: &[
                ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
                ("Accept-Language", "en-US,en;q=0.5"),
            ],
            player_clients: &["web"],
            player_skip: &["js"],
            skip_auth_check: true,
            format: CAPPED_FORMAT,
        },
        Strategy {
            name: "no-format-restriction",
            user_agent: PLAIN_UA,
            headers: &[
                ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
                ("Accept-Language", "en-US,en;q=0.5"),
            ],
            player_clients: &[],
            player_skip: &[],
            skip_auth_check: false,
            format: "best",
        },
    ];
);

/// The full catalog in priority order.
pub fn catalog() -> &'static [Strategy] {
    &CATALOG
}

/// Renders the flat search invocation. The search pass uses one fixed
/// low-profile header set; strategy fallback only applies to full resolution.
pub fn search_args(query: &str, limit: usize, cookies: Option<&Path>) -> Vec<String> {
    let mut args = vec![
        "--dump-json".to_string(),
        "--flat-playlist".to_string(),
        "--no-warnings".to_string(),
        "--socket-timeout".to_string(),
        SOCKET_TIMEOUT_SECS.to_string(),
        "--retries".to_string(),
        EXTRACTOR_RETRIES.to_string(),
        "--user-agent".to_string(),
        PLAIN_UA.to_string(),
    ];

    if let Some(path) = cookies {
        args.push("--cookies".to_string());
        args.push(path.to_string_lossy().into_owned());
    }

    args.push(format!("ytsearch{}:{}", limit, query));
    args
}

impl Strategy {
    /// Renders the extractor invocation for one resolution attempt.
    pub fn extractor_args(&self, url: &str, cookies: Option<&Path>) -> Vec<String> {
        let mut args = vec![
            "--dump-json".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--socket-timeout".to_string(),
            SOCKET_TIMEOUT_SECS.to_string(),
            "--retries".to_string(),
            EXTRACTOR_RETRIES.to_string(),
            "-f".to_string(),
            self.format.to_string(),
            "--user-agent".to_string(),
            self.user_agent.to_string(),
        ];

        for (name, value) in self.headers {
            args.push("--add-header".to_string());
            args.push(format!("{}:{}", name, value));
        }

        if !self.player_clients.is_empty() || !self.player_skip.is_empty() {
            let mut parts = Vec::new();

            if !self.player_clients.is_empty() {
                parts.push(format!("player_client={}", self.player_clients.join(",")));
            }

            if !self.player_skip.is_empty() {
                parts.push(format!("player_skip={}", self.player_skip.join(",")));
            }

            args.push("--extractor-args".to_string());
            args.push(format!("youtube:{}", parts.join(";")));
        }

        if self.skip_auth_check {
            args.push("--extractor-args".to_string());
            args.push("youtubetab:skip=authcheck".to_string());
        }

        if let Some(path) = cookies {
            args.push("--cookies".to_string());
            args.push(path.to_string_lossy().into_owned());
        }

        args.push(url.to_string());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_order_is_fixed() {
        let names = catalog().iter().map(|s| s.name).collect::<Vec<_>>();

        assert_eq!(
            names,
            vec![
                "enhanced-web",
                "android-client",
                "minimal-headers",
                "mobile-client",
                "skip-auth-check",
                "no-format-restriction",
            ]
        );
    }

    #[test]
    fn only_the_last_strategy_lifts_the_format_cap() {
        let unrestricted = catalog().iter().filter(|s| s.format == "best").count();
        assert_eq!(unrestricted, 1);
        assert_eq!(catalog().last().unwrap().format, "best");
    }

    #[test]
    fn args_carry_client_hints_and_cookies() {
        let strategy = &catalog()[0];
        let args = strategy.extractor_args(
            "https://youtu.be/abc",
            Some(Path::new("/tmp/cookies.txt")),
        );

        assert!(args.contains(&"youtube:player_client=web;player_skip=js,configs".to_string()));
        assert!(args.contains(&"--cookies".to_string()));
        assert!(args.contains(&"/tmp/cookies.txt".to_string()));
        assert_eq!(args.last().unwrap(), "https://youtu.be/abc");
    }

    #[test]
    fn plain_profiles_skip_the_extractor_args() {
        let strategy = catalog().iter().find(|s| s.name == "minimal-headers").unwrap();
        let args = strategy.extractor_args("https://youtu.be/abc", None);

        assert!(!args.contains(&"--extractor-args".to_string()));
        assert!(!args.contains(&"--cookies".to_string()));
    }

    #[test]
    fn auth_check_skip_renders_the_tab_args() {
        let strategy = catalog().iter().find(|s| s.name == "skip-auth-check").unwrap();
        let args = strategy.extractor_args("https://youtu.be/abc", None);

        assert!(args.contains(&"youtubetab:skip=authcheck".to_string()));
    }
}
