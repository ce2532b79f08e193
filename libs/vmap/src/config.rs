use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::Error;

pub const CONFIG_ENV: &str = "VMAP_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "./vmap.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the tile store.
    pub base_path: PathBuf,
    /// Byte budget for decoded tiles.
    pub max_cache_bytes: u64,
    pub cache_enabled: bool,
    /// Decode threads; zero decodes on the calling thread.
    pub worker_count: usize,
    /// Jobs that may wait for a decode thread before `submit` blocks.
    pub queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        let base_path = directories::ProjectDirs::from("", "", "vmap")
            .map(|dirs| dirs.data_dir().join("tiles"))
            .unwrap_or_else(|| PathBuf::from("./vmaps"));
        let worker_count = std::thread::available_parallelism()
            .map(|n| n.get().min(4))
            .unwrap_or(2);
        Self {
            base_path,
            max_cache_bytes: 256 * 1024 * 1024,
            cache_enabled: true,
            worker_count,
            queue_capacity: 64,
        }
    }
}

impl Config {
    pub fn from_toml(contents: &str) -> Result<Self, Error> {
        Ok(toml::from_str(contents)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                Error::ConfigNotFound(path.to_path_buf())
            } else {
                Error::io(path, err)
            }
        })?;
        Self::from_toml(&contents)
    }

    /// Load from `path` when given (it must exist), else from `$VMAP_CONFIG` or
    /// `./vmap.toml` when present, else defaults. Environment overrides apply last.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let fallback = std::env::var(CONFIG_ENV)
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
                if fallback.exists() {
                    Self::from_file(&fallback)?
                } else {
                    info!(path = ?fallback, "config file not found, using defaults");
                    Self::default()
                }
            }
        };
        Ok(config.with_env_overrides(|name| std::env::var(name).ok()))
    }

    /// Apply `VMAP_*` overrides read through `lookup`. Unparseable values are ignored.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(path) = lookup("VMAP_BASE_PATH") {
            self.base_path = PathBuf::from(path);
        }
        if let Some(bytes) = env_parse(&lookup, "VMAP_MAX_CACHE_BYTES") {
            self.max_cache_bytes = bytes;
        }
        if let Some(enabled) = env_flag(&lookup, "VMAP_CACHE_ENABLED") {
            self.cache_enabled = enabled;
        }
        if let Some(workers) = env_parse(&lookup, "VMAP_WORKER_COUNT") {
            self.worker_count = workers;
        }
        if let Some(capacity) = env_parse(&lookup, "VMAP_QUEUE_CAPACITY") {
            self.queue_capacity = capacity;
        }
        self
    }
}

fn env_parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    lookup(name).and_then(|value| value.trim().parse().ok())
}

fn env_flag(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<bool> {
    lookup(name).and_then(|value| match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    })
}
