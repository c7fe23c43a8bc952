//! Per-task configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// In-memory tuple count at which a spillable list writes a segment.
    pub spill_threshold_tuples: usize,

    /// Optional estimated-bytes threshold; whichever limit is hit first spills.
    pub spill_threshold_bytes: Option<usize>,

    /// Directory for spill files (local-path configuration).
    pub spill_dir: String,

    /// Optional fully-qualified spill URI (`file:///...` or `memory://`).
    pub spill_uri: Option<String>,

    /// Segment compression: "none", "zstd" or "lz4".
    pub spill_codec: String,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            spill_threshold_tuples: 10_000,
            spill_threshold_bytes: None,
            spill_dir: "/tmp/flowstack-spill".to_string(),
            spill_uri: None,
            spill_codec: "none".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub uri: Option<String>,
    pub root: String,
}

impl StorageConfig {
    pub fn scheme(&self) -> Option<&str> {
        self.uri
            .as_deref()
            .and_then(|uri| uri.split("://").next())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }
}

impl TaskConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `FLOWSTACK_SPILL_THRESHOLD`: in-memory tuple count before spilling
    /// - `FLOWSTACK_SPILL_THRESHOLD_BYTES`: estimated bytes before spilling
    /// - `FLOWSTACK_SPILL_DIR`: local spill directory
    /// - `FLOWSTACK_SPILL_URI`: spill URI, overrides the directory
    /// - `FLOWSTACK_SPILL_CODEC`: segment compression
    ///
    /// Unparseable numbers are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`TaskConfig::from_env`] but reads through `lookup`, so callers
    /// (and tests) need not touch the process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(s) = lookup("FLOWSTACK_SPILL_THRESHOLD") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.spill_threshold_tuples = v.max(1);
            }
        }

        if let Some(s) = lookup("FLOWSTACK_SPILL_THRESHOLD_BYTES") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.spill_threshold_bytes = Some(v);
            }
        }

        if let Some(s) = lookup("FLOWSTACK_SPILL_DIR") {
            cfg.spill_dir = s;
        }

        if let Some(s) = lookup("FLOWSTACK_SPILL_URI") {
            cfg.spill_uri = Some(s);
        }

        if let Some(s) = lookup("FLOWSTACK_SPILL_CODEC") {
            cfg.spill_codec = s.to_ascii_lowercase();
        }

        cfg
    }

    /// Produce a storage configuration snapshot used by the IO layer.
    pub fn storage_config(&self) -> StorageConfig {
        let scheme = self
            .spill_uri
            .as_deref()
            .and_then(|uri| uri.split("://").next())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty());

        let root = match (scheme, self.spill_uri.as_ref()) {
            (Some("file"), Some(uri)) => {
                file_uri_to_path(uri).unwrap_or_else(|| self.spill_dir.clone())
            }
            (Some(_), Some(uri)) => uri.trim_end_matches('/').to_string(),
            _ => self.spill_dir.clone(),
        };

        StorageConfig {
            uri: self.spill_uri.clone(),
            root,
        }
    }
}

fn file_uri_to_path(uri: &str) -> Option<String> {
    let stripped = uri.strip_prefix("file://")?;
    if stripped.starts_with('/') {
        Some(stripped.to_string())
    } else {
        Some(format!("/{stripped}"))
    }
}
