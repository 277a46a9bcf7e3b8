//! Service configuration.
//!
//! Values come from `ServiceConfig::default()`, a JSON document, or
//! `OSC_*` environment variables layered over the defaults.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

const DEFAULT_BASE_URL: &str = "http://openstreetcam.org";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Host root; matched tracks and photo files live here.
    pub base_url: String,
    /// Versioned API root used for photo and sequence listings.
    pub service_url: String,
    pub user_agent: String,
    /// Page size for matched-track queries; more items trigger a fan-out.
    pub tracks_max_items: u32,
    /// Upper bound on concurrent workers fetching extra track pages.
    pub tracks_max_workers: usize,
    pub nearby_photos_max_items: u32,
    /// Zoom level from which a data set shows photos instead of segments.
    pub map_photo_zoom: u32,
    pub closest_photos_max_items: usize,
    /// Seconds.
    pub connect_timeout: u64,
    /// Seconds.
    pub request_timeout: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            service_url: format!("{DEFAULT_BASE_URL}/1.0"),
            user_agent: format!("osc-core/{}", env!("CARGO_PKG_VERSION")),
            tracks_max_items: 1000,
            tracks_max_workers: 8,
            nearby_photos_max_items: 1000,
            map_photo_zoom: 15,
            closest_photos_max_items: 10,
            connect_timeout: 10,
            request_timeout: 30,
        }
    }
}

impl ServiceConfig {
    /// Build a config pointing at another host; `service_url` becomes
    /// `{base_url}/1.0`.
    pub fn with_base_url(base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            service_url: format!("{base_url}/1.0"),
            base_url,
            ..Self::default()
        }
    }

    /// Parse a (possibly partial) JSON document; missing keys keep their
    /// defaults.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: ServiceConfig = serde_json::from_str(raw)?;
        Ok(config.normalized())
    }

    /// Defaults overridden by `OSC_BASE_URL`, `OSC_SERVICE_URL`,
    /// `OSC_USER_AGENT` and `OSC_TRACKS_MAX_ITEMS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match lookup("OSC_BASE_URL") {
            Some(base_url) => Self::with_base_url(&base_url),
            None => Self::default(),
        };
        if let Some(service_url) = lookup("OSC_SERVICE_URL") {
            config.service_url = service_url;
        }
        if let Some(user_agent) = lookup("OSC_USER_AGENT") {
            config.user_agent = user_agent;
        }
        if let Some(value) = lookup("OSC_TRACKS_MAX_ITEMS") {
            config.tracks_max_items = value
                .parse::<u32>()
                .ok()
                .filter(|items| *items > 0)
                .ok_or(ConfigError::InvalidVar {
                    name: "OSC_TRACKS_MAX_ITEMS",
                    value,
                })?;
        }
        Ok(config.normalized())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    fn normalized(mut self) -> Self {
        self.base_url = self.base_url.trim_end_matches('/').to_string();
        self.service_url = self.service_url.trim_end_matches('/').to_string();
        self.tracks_max_items = self.tracks_max_items.max(1);
        self.tracks_max_workers = self.tracks_max_workers.max(1);
        self.nearby_photos_max_items = self.nearby_photos_max_items.max(1);
        self
    }
}
