//! Configuration management module
//!
//! Caller options are merged over defaults into an immutable [`TrackerConfig`].
//! Resolution never fails; unknown keys are ignored.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::{TrackerError, TrackerResult};

pub const DEFAULT_COLLECTOR_URL: &str = "https://collector.onedollarstats.com/events";

/// Options as supplied by a framework adapter. Every field is optional.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackerOptions {
    pub collector_url: Option<String>,
    pub track_localhost_as: Option<String>,
    pub hash_routing: Option<bool>,
    pub autocollect: Option<bool>,
    pub exclude_pages: Option<Vec<String>>,
    pub include_pages: Option<Vec<String>>,
    pub path_markers: Option<bool>,
}

impl TrackerOptions {
    pub fn from_json_str(raw: &str) -> TrackerResult<Self> {
        if raw.trim().is_empty() || raw.trim() == "null" {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(raw)?)
    }

    /// Later values win, mirroring `{...self, ...other}`.
    pub fn merge(mut self, other: TrackerOptions) -> Self {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() { self.$field = other.$field; })*
            };
        }
        take!(
            collector_url,
            track_localhost_as,
            hash_routing,
            autocollect,
            exclude_pages,
            include_pages,
            path_markers
        );
        self
    }
}

/// Fully populated, immutable per-session configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerConfig {
    pub collector_url: String,
    pub track_localhost_as: Option<String>,
    pub hash_routing: bool,
    pub autocollect: bool,
    pub exclude_pages: Vec<String>,
    pub include_pages: Vec<String>,
    /// Resolve page paths from `data-s-path` / `stonks-path` markers.
    pub path_markers: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            collector_url: DEFAULT_COLLECTOR_URL.to_string(),
            track_localhost_as: None,
            hash_routing: false,
            autocollect: true,
            exclude_pages: Vec::new(),
            include_pages: Vec::new(),
            path_markers: false,
        }
    }
}

impl TrackerConfig {
    pub fn resolve(options: TrackerOptions) -> Self {
        let defaults = Self::default();
        Self {
            collector_url: options.collector_url.unwrap_or(defaults.collector_url),
            track_localhost_as: options.track_localhost_as.or(defaults.track_localhost_as),
            hash_routing: options.hash_routing.unwrap_or(defaults.hash_routing),
            autocollect: options.autocollect.unwrap_or(defaults.autocollect),
            exclude_pages: options.exclude_pages.unwrap_or(defaults.exclude_pages),
            include_pages: options.include_pages.unwrap_or(defaults.include_pages),
            path_markers: options.path_markers.unwrap_or(defaults.path_markers),
        }
    }

    /// Stand-in hostname for localhost traffic; an empty value counts as unset.
    pub fn localhost_override(&self) -> Option<&str> {
        self.track_localhost_as
            .as_deref()
            .filter(|host| !host.is_empty())
    }
}

/// Reads options from a JSON file (if given and present) and applies
/// `STONKS_*` environment overrides on top.
pub fn load_options(config_file: Option<&Path>) -> TrackerResult<TrackerOptions> {
    let mut options = TrackerOptions::default();

    if let Some(path) = config_file {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            options = options.merge(TrackerOptions::from_json_str(&content)?);
        } else {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
        }
    }

    Ok(options.merge(env_overrides(|key| std::env::var(key).ok())?))
}

fn env_overrides(lookup: impl Fn(&str) -> Option<String>) -> TrackerResult<TrackerOptions> {
    let flag = |key: &str| -> TrackerResult<Option<bool>> {
        lookup(key)
            .map(|raw| {
                raw.trim()
                    .parse::<bool>()
                    .map_err(|_| TrackerError::Config(format!("{key} must be true or false, got '{raw}'")))
            })
            .transpose()
    };

    Ok(TrackerOptions {
        collector_url: lookup("STONKS_COLLECTOR_URL"),
        track_localhost_as: lookup("STONKS_TRACK_LOCALHOST_AS"),
        hash_routing: flag("STONKS_HASH_ROUTING")?,
        autocollect: flag("STONKS_AUTOCOLLECT")?,
        ..TrackerOptions::default()
    })
}
