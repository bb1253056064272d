use crate::config::types::{BrowserConfig, Config, DiscoveryConfig, OutputConfig, ScrapeConfig};
use crate::seller::SellerRegistry;
use crate::ConfigError;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_browser_config(&config.browser)?;
    validate_discovery_config(&config.discovery)?;
    validate_scrape_config(&config.scrape)?;
    validate_output_config(&config.output)?;
    validate_sellers(&config.sellers)?;
    Ok(())
}

fn validate_browser_config(config: &BrowserConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if config.window_width < 320 || config.window_height < 240 {
        return Err(ConfigError::Validation(format!(
            "window must be at least 320x240, got {}x{}",
            config.window_width, config.window_height
        )));
    }

    Ok(())
}

fn validate_discovery_config(config: &DiscoveryConfig) -> Result<(), ConfigError> {
    if config.click_every < 1 {
        return Err(ConfigError::Validation(format!(
            "click-every must be >= 1, got {}",
            config.click_every
        )));
    }

    if config.flush_every < 1 {
        return Err(ConfigError::Validation(format!(
            "flush-every must be >= 1, got {}",
            config.flush_every
        )));
    }

    if config.poll_interval_ms < 50 {
        return Err(ConfigError::Validation(format!(
            "discovery poll-interval-ms must be >= 50ms, got {}ms",
            config.poll_interval_ms
        )));
    }

    Ok(())
}

fn validate_scrape_config(config: &ScrapeConfig) -> Result<(), ConfigError> {
    if config.freshness_days < 1 {
        return Err(ConfigError::Validation(format!(
            "freshness-days must be >= 1, got {}",
            config.freshness_days
        )));
    }

    if config.wait_timeout_secs < 1 || config.wait_timeout_secs > 300 {
        return Err(ConfigError::Validation(format!(
            "wait-timeout-secs must be between 1 and 300, got {}",
            config.wait_timeout_secs
        )));
    }

    if config.poll_interval_ms < 50 {
        return Err(ConfigError::Validation(format!(
            "scrape poll-interval-ms must be >= 50ms, got {}ms",
            config.poll_interval_ms
        )));
    }

    if config.sessions < 1 || config.sessions > 8 {
        return Err(ConfigError::Validation(format!(
            "sessions must be between 1 and 8, got {}",
            config.sessions
        )));
    }

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Every seller named in the config must exist in the built-in registry
fn validate_sellers(sellers: &[String]) -> Result<(), ConfigError> {
    let registry = SellerRegistry::builtin()?;
    for name in sellers {
        registry.get(name)?;
    }
    Ok(())
}
