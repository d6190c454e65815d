//! Coordinator configuration and environment overrides.
//!
//! Values are taken from `RADIOVIS_*` environment variables, falling back to
//! defaults. The proxy comes from the conventional `http_proxy` /
//! `HTTP_PROXY` variables.

use std::time::Duration;

use log::{debug, warn};
use url::Url;

use radiovis_protocol::{ProxySettings, ServiceDescriptor};

use crate::client::http::DEFAULT_HTTP_PORT;
use crate::client::{CoalescePolicy, FetchConfig};

/// Coordinator configuration.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Applications looked up by `resolve`, in order.
    pub services: Vec<ServiceDescriptor>,
    /// Shared proxy, used only where a caller opts in.
    pub proxy: Option<ProxySettings>,
    /// Route SHOW-triggered image fetches through `proxy`.
    pub use_http_proxy: bool,
    /// Session connect timeout.
    pub connect_timeout: Duration,
    pub login: Option<String>,
    pub passcode: Option<String>,
    pub fetch: FetchConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            services: vec![ServiceDescriptor::radiovis()],
            proxy: None,
            use_http_proxy: false,
            connect_timeout: Duration::from_secs(10),
            login: None,
            passcode: None,
            fetch: FetchConfig::default(),
        }
    }
}

/// Load configuration from the process environment.
pub fn load_from_env() -> CoordinatorConfig {
    load_from_vars(|name| std::env::var(name).ok())
}

/// Load configuration through `var`, which looks up one variable.
pub fn load_from_vars<F>(var: F) -> CoordinatorConfig
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = CoordinatorConfig::default();

    let proxy = var("http_proxy")
        .or_else(|| var("HTTP_PROXY"))
        .and_then(|value| {
            let proxy = parse_proxy_url(&value);
            if proxy.is_none() {
                warn!("Ignoring unparsable proxy {:?}", value);
            }
            proxy
        });

    let use_http_proxy = var("RADIOVIS_IMAGE_PROXY")
        .map(|s| parse_bool(&s))
        .unwrap_or(defaults.use_http_proxy);

    let connect_timeout = var("RADIOVIS_CONNECT_TIMEOUT")
        .and_then(|s| s.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(defaults.connect_timeout);

    let fetch_timeout = var("RADIOVIS_FETCH_TIMEOUT")
        .and_then(|s| s.parse().ok())
        .map(Duration::from_millis)
        .or(defaults.fetch.response_timeout);

    let policy = match var("RADIOVIS_FETCH_POLICY").as_deref() {
        Some("latest") | Some("keep-latest") => CoalescePolicy::KeepLatest,
        _ => defaults.fetch.policy,
    };

    let config = CoordinatorConfig {
        proxy,
        use_http_proxy,
        connect_timeout,
        login: var("RADIOVIS_LOGIN"),
        passcode: var("RADIOVIS_PASSCODE"),
        fetch: FetchConfig {
            response_timeout: fetch_timeout,
            policy,
            ..defaults.fetch
        },
        ..defaults
    };

    debug!(
        "Using environment/default config: proxy={:?}, image_proxy={}",
        config.proxy.as_ref().map(ToString::to_string),
        config.use_http_proxy
    );
    config
}

/// Parse `http://host:port/` or bare `host:port`. Port defaults to 80.
pub fn parse_proxy_url(value: &str) -> Option<ProxySettings> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let url = if value.contains("://") {
        Url::parse(value).ok()?
    } else {
        Url::parse(&format!("http://{}", value)).ok()?
    };

    let host = url.host_str()?.to_string();
    let port = url.port().unwrap_or(DEFAULT_HTTP_PORT);
    Some(ProxySettings::http(host, port))
}

fn parse_bool(value: &str) -> bool {
    let lower = value.to_lowercase();
    lower == "1" || lower == "true" || lower == "yes" || lower == "on"
}
