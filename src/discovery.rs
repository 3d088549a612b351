use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use headless_chrome::{Browser, LaunchOptions, Tab};
use tracing::{debug, info};

use crate::config;
use crate::error::DiscoveryError;

const CAPTURE_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Finds the JSON data endpoint backing the search page by rendering it
/// in a browser and watching which URLs the page fetches.
pub struct EndpointDiscovery {
    browser_ws: Option<String>,
}

impl EndpointDiscovery {
    pub fn new(browser_ws: Option<String>) -> Self {
        Self { browser_ws }
    }

    /// Runs one isolated browser session: load the search page, apply the
    /// sort option, and capture the first response whose URL contains the
    /// endpoint marker. The session is torn down on every path.
    pub async fn discover(&self) -> Result<reqwest::Url, DiscoveryError> {
        let browser_ws = self.browser_ws.clone();
        tokio::task::spawn_blocking(move || discover_blocking(browser_ws))
            .await
            .map_err(|e| DiscoveryError::Browser(anyhow::anyhow!("join error - {e:?}")))?
    }
}

fn open_browser(browser_ws: Option<String>) -> anyhow::Result<Browser> {
    if let Some(browser) = browser_ws {
        Browser::connect(browser)
    } else {
        Browser::new(LaunchOptions {
            headless: true,
            sandbox: false,
            idle_browser_timeout: config::BROWSER_TIMEOUT,
            ..Default::default()
        })
    }
}

fn discover_blocking(browser_ws: Option<String>) -> Result<reqwest::Url, DiscoveryError> {
    let browser = open_browser(browser_ws).map_err(DiscoveryError::Browser)?;
    let tab = browser.new_tab().map_err(DiscoveryError::Browser)?;
    tab.set_default_timeout(config::BROWSER_TIMEOUT);

    let captured = Arc::new(Mutex::new(None));
    tab.register_response_handling("endpoint-capture", {
        let captured = captured.clone();
        Box::new(move |params, _fetch_body| {
            capture_first(&captured, &params.response.url);
        })
    })
    .map_err(DiscoveryError::Browser)?;

    info!("Loading AutoScout24 search page...");
    tab.navigate_to(config::search_url().as_str())
        .and_then(|tab| tab.wait_until_navigated())
        .map_err(DiscoveryError::Navigation)?;

    info!("Selecting sort option...");
    select_sort_option(&tab).map_err(DiscoveryError::Interaction)?;

    let endpoint = wait_for_capture(&captured, config::BROWSER_TIMEOUT)
        .ok_or(DiscoveryError::EndpointNotObserved)?;
    let endpoint = reqwest::Url::parse(&endpoint)
        .map_err(|e| DiscoveryError::Browser(anyhow::anyhow!("captured an invalid URL - {e}")))?;

    info!("JSON endpoint found successfully");
    Ok(endpoint)
}

/// Sets the sort dropdown to the configured option and fires a bubbling
/// change event so the page issues the re-sorted listing request.
fn select_sort_option(tab: &Tab) -> anyhow::Result<()> {
    let script = format!(
        r#"(() => {{
            const control = document.querySelector("{selector}");
            if (control === null) {{
                return false;
            }}
            control.value = "{option}";
            control.dispatchEvent(new Event("change", {{ bubbles: true }}));
            return true;
        }})()"#,
        selector = config::SORT_DROPDOWN_SELECTOR,
        option = config::SORT_OPTION,
    );

    let result = tab.evaluate(&script, false)?;
    match result.value {
        Some(serde_json::Value::Bool(true)) => Ok(()),
        _ => Err(anyhow::anyhow!(
            "sort control {} not found on the page",
            config::SORT_DROPDOWN_SELECTOR
        )),
    }
}

/// First marker match wins; later matches are ignored.
fn capture_first(slot: &Mutex<Option<String>>, url: &str) {
    if !url.contains(config::JSON_ENDPOINT_MARKER) {
        return;
    }
    let mut slot = slot.lock().unwrap();
    if slot.is_none() {
        debug!("Found JSON endpoint: {url}");
        *slot = Some(url.to_string());
    }
}

fn wait_for_capture(slot: &Mutex<Option<String>>, timeout: Duration) -> Option<String> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(url) = slot.lock().unwrap().take() {
            return Some(url);
        }
        if Instant::now() >= deadline {
            return None;
        }
        std::thread::sleep(CAPTURE_POLL_INTERVAL);
    }
}
