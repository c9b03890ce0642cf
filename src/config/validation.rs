use crate::config::types::{
    Config, CrawlStrategy, DomainStrategy, FetchConfig, OutputConfig, ProxyConfig, RelayKind,
    SessionConfig,
};
use crate::extract::{ExtractionSchema, SchemaField};
use crate::ConfigError;
use scraper::Selector;
use url::Url;

/// Upper bound on workers per session
pub const MAX_CONCURRENCY: usize = 10;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_fetch_config(&config.fetch)?;
    validate_output_config(&config.output)?;
    validate_proxy_config(&config.proxy)?;
    validate_session_config(&config.session.config)?;
    if !config.session.seeds.is_empty() {
        validate_seeds(&config.session.seeds)?;
    }
    Ok(())
}

/// Validates a session configuration
///
/// Called by the config loader and again whenever a session is created from
/// caller-supplied values.
pub fn validate_session_config(config: &SessionConfig) -> Result<(), ConfigError> {
    if config.max_concurrent < 1 || config.max_concurrent > MAX_CONCURRENCY {
        return Err(ConfigError::Validation(format!(
            "max_concurrent must be between 1 and {}, got {}",
            MAX_CONCURRENCY, config.max_concurrent
        )));
    }

    if config.max_urls < 1 {
        return Err(ConfigError::Validation(
            "max_urls must be >= 1".to_string(),
        ));
    }

    if config.domain_strategy == DomainStrategy::Whitelist && config.domain_whitelist.is_empty() {
        return Err(ConfigError::Validation(
            "domain_strategy 'whitelist' requires a non-empty domain_whitelist".to_string(),
        ));
    }

    for domain in &config.domain_whitelist {
        validate_domain_string(domain)?;
    }

    if config.pagination.max_pages < 1 {
        return Err(ConfigError::Validation(
            "pagination.max_pages must be >= 1".to_string(),
        ));
    }

    if let Some(selector) = &config.pagination.selector {
        parse_selector(selector, "pagination.selector")?;
    }

    if config.extraction.text_limit == 0 {
        return Err(ConfigError::Validation(
            "extraction.text_limit must be > 0".to_string(),
        ));
    }

    match (&config.strategy, &config.extraction_schema) {
        (CrawlStrategy::Schema, None) => {
            return Err(ConfigError::Validation(
                "strategy 'schema' requires an extraction_schema".to_string(),
            ));
        }
        (_, Some(schema)) => validate_schema(schema)?,
        _ => {}
    }

    Ok(())
}

/// Validates seed URLs: at least one, all absolute http(s)
pub fn validate_seeds(seeds: &[String]) -> Result<(), ConfigError> {
    if seeds.is_empty() {
        return Err(ConfigError::Validation(
            "At least one seed URL is required".to_string(),
        ));
    }

    for seed in seeds {
        let url = Url::parse(seed)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "Seed URL '{}' must use http or https",
                seed
            )));
        }

        if url.host_str().is_none() {
            return Err(ConfigError::InvalidUrl(format!(
                "Seed URL '{}' has no host",
                seed
            )));
        }
    }

    Ok(())
}

/// Validates an extraction schema: names, selectors, container
pub fn validate_schema(schema: &ExtractionSchema) -> Result<(), ConfigError> {
    if schema.fields.is_empty() && schema.container.is_none() {
        return Err(ConfigError::Validation(
            "extraction_schema must define fields or a container".to_string(),
        ));
    }

    validate_fields(&schema.fields, "extraction_schema")?;

    if let Some(container) = &schema.container {
        parse_selector(&container.selector, "extraction_schema.container")?;
        if container.fields.is_empty() {
            return Err(ConfigError::Validation(
                "extraction_schema.container must define at least one field".to_string(),
            ));
        }
        validate_fields(&container.fields, "extraction_schema.container")?;
    }

    Ok(())
}

fn validate_fields(fields: &[SchemaField], context: &str) -> Result<(), ConfigError> {
    for field in fields {
        if field.name.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "{} has a field with an empty name",
                context
            )));
        }
        parse_selector(&field.selector, &format!("{}.{}", context, field.name))?;
    }
    Ok(())
}

fn parse_selector(selector: &str, context: &str) -> Result<(), ConfigError> {
    Selector::parse(selector)
        .map(|_| ())
        .map_err(|_| ConfigError::InvalidSelector {
            selector: selector.to_string(),
            context: context.to_string(),
        })
}

/// Validates fetch configuration
fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.direct_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "direct_timeout_secs must be > 0".to_string(),
        ));
    }

    if config.relay_timeout_secs == 0 || config.relay_timeout_secs >= config.direct_timeout_secs {
        return Err(ConfigError::Validation(format!(
            "relay_timeout_secs must be > 0 and shorter than direct_timeout_secs ({}), got {}",
            config.direct_timeout_secs, config.relay_timeout_secs
        )));
    }

    if config.user_agents.is_empty() {
        return Err(ConfigError::Validation(
            "user_agents cannot be empty".to_string(),
        ));
    }

    for relay in &config.relays {
        if relay.name.is_empty() {
            return Err(ConfigError::Validation(
                "relay name cannot be empty".to_string(),
            ));
        }

        let endpoint = Url::parse(&relay.endpoint).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid relay endpoint '{}': {}", relay.endpoint, e))
        })?;

        if relay.kind == RelayKind::Proxy
            && crate::state::ProxyType::from_scheme(endpoint.scheme()).is_none()
        {
            return Err(ConfigError::Validation(format!(
                "Proxy relay '{}' has unsupported scheme '{}'",
                relay.name,
                endpoint.scheme()
            )));
        }
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates proxy monitor configuration
fn validate_proxy_config(config: &ProxyConfig) -> Result<(), ConfigError> {
    Url::parse(&config.probe_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid probe_url: {}", e)))?;

    if config.batch_concurrency < 1 {
        return Err(ConfigError::Validation(
            "batch_concurrency must be >= 1".to_string(),
        ));
    }

    if !(0.0..=100.0).contains(&config.min_score) {
        return Err(ConfigError::Validation(format!(
            "min_score must be within 0-100, got {}",
            config.min_score
        )));
    }

    for proxy in &config.proxies {
        let url = Url::parse(proxy)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy '{}': {}", proxy, e)))?;
        if crate::state::ProxyType::from_scheme(url.scheme()).is_none() {
            return Err(ConfigError::Validation(format!(
                "Proxy '{}' has unsupported scheme '{}'",
                proxy,
                url.scheme()
            )));
        }
    }

    Ok(())
}

/// Validates a domain string used in the whitelist
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::Validation(
            "Whitelisted domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.') || domain.ends_with('.') || domain.contains("..") {
        return Err(ConfigError::Validation(format!(
            "Domain '{}' is malformed",
            domain
        )));
    }

    Ok(())
}
