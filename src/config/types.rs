use serde::Deserialize;

/// Main configuration structure for Shelf-Scout
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub browser: BrowserConfig,
    pub discovery: DiscoveryConfig,
    pub scrape: ScrapeConfig,
    pub output: OutputConfig,

    /// Sellers this installation works on. Empty means every registered seller.
    #[serde(default)]
    pub sellers: Vec<String>,
}

/// Browser session configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    /// Run Chrome without a visible window
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// User-agent string sent by every session
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    /// Viewport width in pixels
    #[serde(rename = "window-width", default = "default_window_width")]
    pub window_width: u32,

    /// Viewport height in pixels
    #[serde(rename = "window-height", default = "default_window_height")]
    pub window_height: u32,
}

/// Navigation-driven URL discovery configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    /// Click an unvisited menu item every this many iterations
    #[serde(rename = "click-every")]
    pub click_every: u32,

    /// Flush discovered URLs to the database every this many iterations
    #[serde(rename = "flush-every")]
    pub flush_every: u32,

    /// Pause between page snapshots (milliseconds)
    #[serde(rename = "poll-interval-ms")]
    pub poll_interval_ms: u64,

    /// Pause before retrying after a stale or off-screen element (milliseconds)
    #[serde(rename = "transient-retry-pause-ms")]
    pub transient_retry_pause_ms: u64,

    /// Stop after this many iterations; 0 runs until interrupted
    #[serde(rename = "max-iterations", default)]
    pub max_iterations: u64,
}

/// Product scrape batch configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ScrapeConfig {
    /// A URL is due again once its last scrape is older than this
    #[serde(rename = "freshness-days")]
    pub freshness_days: u32,

    /// Maximum time to wait for the product payload to render (seconds)
    #[serde(rename = "wait-timeout-secs")]
    pub wait_timeout_secs: u64,

    /// Interval between payload presence checks (milliseconds)
    #[serde(rename = "poll-interval-ms")]
    pub poll_interval_ms: u64,

    /// Number of independent browser sessions scraping in parallel
    #[serde(default = "default_sessions")]
    pub sessions: u32,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

fn default_headless() -> bool {
    true
}

fn default_window_width() -> u32 {
    1366
}

fn default_window_height() -> u32 {
    900
}

fn default_sessions() -> u32 {
    1
}
