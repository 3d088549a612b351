// cSpell:ignore atype powertype ustate fztiow autoscout dotenvy
use std::time::Duration;

use tracing::debug;

pub const BOT_NAME: &str = "AutoScout Bot";

/// Pause between two scraping cycles.
pub const SCRAPE_INTERVAL: Duration = Duration::from_secs(60);

/// Shared bound for browser navigation, interaction and the endpoint wait.
pub const BROWSER_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-request bound for data endpoint fetches.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Listings not re-seen for this many days are purged from the store.
pub const RETENTION_DAYS: i64 = 7;

pub const BASE_URL: &str = "https://www.autoscout24.de";

pub const SORT_DROPDOWN_SELECTOR: &str = "#sort-dropdown-select";
pub const SORT_OPTION: &str = "age-descending";

/// Result pages fetched from the discovered endpoint on every cycle.
pub const PAGES_TO_SCRAPE: &[u32] = &[1, 2];

/// Response URLs containing this substring identify the data endpoint.
pub const JSON_ENDPOINT_MARKER: &str = "lst.json";

pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/58.0.3029.110 Safari/537.3",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.0.3 Safari/605.1.15",
    "Mozilla/5.0 (Linux; Android 10; SM-G973F) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/89.0.4389.90 Mobile Safari/537.36",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 14_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.0 Mobile/15E148 Safari/604.1",
];

#[macro_export]
macro_rules! url {
    ($url:literal) => {{
        static URL: once_cell::sync::OnceCell<reqwest::Url> = once_cell::sync::OnceCell::new();
        URL.get_or_init(|| <reqwest::Url as std::str::FromStr>::from_str($url).unwrap())
    }};
}

pub fn search_url() -> &'static reqwest::Url {
    crate::url!("https://www.autoscout24.de/lst?atype=C&cy=D&damaged_listing=exclude&desc=0&ocs_listing=include&powertype=kw&search_id=26fztiow6l9&sort=leasing_rate&source=homepage_search-mask&ustate=N%2CU")
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub api_key: String,
    pub chat_id: String,
}

/// Settings read from the environment at process start. Everything else
/// is a fixed constant above.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub telegram: Option<TelegramConfig>,
    /// DevTools websocket URL of an already running browser, if any.
    pub browser_ws: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        let telegram = match (
            std::env::var("TELEGRAM_API_KEY"),
            std::env::var("TELEGRAM_CHAT_ID"),
        ) {
            (Ok(api_key), Ok(chat_id)) if !api_key.is_empty() && !chat_id.is_empty() => {
                Some(TelegramConfig { api_key, chat_id })
            }
            _ => None,
        };

        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:autoscout.db".to_string());
        debug!("using database at {database_url}");

        Self {
            database_url,
            telegram,
            browser_ws: std::env::var("BROWSER").ok(),
        }
    }
}
