//! Pipeline configuration.
//!
//! All tunables live in an explicitly constructed [`PipelineConfig`] that
//! is passed to the service at start; there is no process-wide settings
//! object. An INI config file can supply the same values for the CLI.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

/// Default number of retrieval workers.
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Default HTTP connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default HTTP read timeout in seconds.
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 30;

/// Default memory tile cache capacity (256 MiB).
pub const DEFAULT_MEMORY_CACHE_BYTES: u64 = 256 * 1024 * 1024;

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid INI.
    #[error("failed to parse config: {0}")]
    Parse(String),

    /// A value is present but unusable.
    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Configuration for one tile pipeline instance.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of concurrent retrieval workers.
    pub workers: usize,

    /// HTTP connect timeout.
    pub connect_timeout: Duration,

    /// HTTP read timeout (whole-response deadline).
    pub read_timeout: Duration,

    /// Memory tile cache capacity in bytes.
    pub memory_cache_bytes: u64,

    /// Root directory for the disk cache; each layer stores tiles under
    /// its descriptor's `cache_prefix` below this.
    pub cache_root: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKER_COUNT,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
            memory_cache_bytes: DEFAULT_MEMORY_CACHE_BYTES,
            cache_root: default_cache_root(),
        }
    }
}

impl PipelineConfig {
    /// Set the worker count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set both HTTP timeouts.
    pub fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }

    /// Set the memory cache capacity.
    pub fn with_memory_cache_bytes(mut self, bytes: u64) -> Self {
        self.memory_cache_bytes = bytes;
        self
    }

    /// Set the disk cache root.
    pub fn with_cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.cache_root = root.into();
        self
    }

    /// Check the configuration for unusable values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.connect_timeout.is_zero() || self.read_timeout.is_zero() {
            return Err(ConfigError::Invalid("timeouts must be non-zero".into()));
        }
        Ok(())
    }
}

/// Default disk cache root: the platform cache directory, or the working
/// directory if none is known.
pub fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("terratile")
}

/// Default config file location: `<config dir>/terratile/terratile.ini`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("terratile")
        .join("terratile.ini")
}

/// Load a [`PipelineConfig`] from an INI file.
///
/// Recognized keys, all optional:
///
/// ```ini
/// [service]
/// workers = 4
///
/// [network]
/// connect_timeout_secs = 10
/// read_timeout_secs = 30
///
/// [cache]
/// directory = /var/cache/terratile
/// memory_size_bytes = 268435456
/// ```
pub fn load_config(path: &Path) -> Result<PipelineConfig, ConfigError> {
    let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Parse(e.to_string()))?;
    let mut config = PipelineConfig::default();

    if let Some(section) = ini.section(Some("service")) {
        if let Some(workers) = section.get("workers") {
            config.workers = parse_key("service.workers", workers)?;
        }
    }
    if let Some(section) = ini.section(Some("network")) {
        if let Some(secs) = section.get("connect_timeout_secs") {
            config.connect_timeout =
                Duration::from_secs(parse_key("network.connect_timeout_secs", secs)?);
        }
        if let Some(secs) = section.get("read_timeout_secs") {
            config.read_timeout =
                Duration::from_secs(parse_key("network.read_timeout_secs", secs)?);
        }
    }
    if let Some(section) = ini.section(Some("cache")) {
        if let Some(dir) = section.get("directory") {
            config.cache_root = PathBuf::from(dir);
        }
        if let Some(bytes) = section.get("memory_size_bytes") {
            config.memory_cache_bytes = parse_key("cache.memory_size_bytes", bytes)?;
        }
    }

    config.validate()?;
    Ok(config)
}

/// Write a config file populated with the default values.
pub fn write_default_config(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let defaults = PipelineConfig::default();

    let mut ini = Ini::new();
    ini.with_section(Some("service"))
        .set("workers", defaults.workers.to_string());
    ini.with_section(Some("network"))
        .set(
            "connect_timeout_secs",
            defaults.connect_timeout.as_secs().to_string(),
        )
        .set(
            "read_timeout_secs",
            defaults.read_timeout.as_secs().to_string(),
        );
    ini.with_section(Some("cache"))
        .set("directory", defaults.cache_root.display().to_string())
        .set("memory_size_bytes", defaults.memory_cache_bytes.to_string());
    ini.write_to_file(path)?;
    Ok(())
}

fn parse_key<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{} = {:?}", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.workers, DEFAULT_WORKER_COUNT);
        assert_eq!(
            config.connect_timeout,
            Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS)
        );
        assert_eq!(
            config.read_timeout,
            Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS)
        );
        assert_eq!(config.memory_cache_bytes, DEFAULT_MEMORY_CACHE_BYTES);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builders() {
        let config = PipelineConfig::default()
            .with_workers(8)
            .with_timeouts(Duration::from_secs(5), Duration::from_secs(15))
            .with_memory_cache_bytes(1024)
            .with_cache_root("/tmp/tiles");
        assert_eq!(config.workers, 8);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.read_timeout, Duration::from_secs(15));
        assert_eq!(config.memory_cache_bytes, 1024);
        assert_eq!(config.cache_root, PathBuf::from("/tmp/tiles"));
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config = PipelineConfig::default().with_workers(0);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_config_full() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("terratile.ini");
        std::fs::write(
            &path,
            "[service]\nworkers = 6\n\n[network]\nconnect_timeout_secs = 3\nread_timeout_secs = 9\n\n[cache]\ndirectory = /data/tiles\nmemory_size_bytes = 1048576\n",
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.workers, 6);
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.read_timeout, Duration::from_secs(9));
        assert_eq!(config.cache_root, PathBuf::from("/data/tiles"));
        assert_eq!(config.memory_cache_bytes, 1_048_576);
    }

    #[test]
    fn test_load_config_partial_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("terratile.ini");
        std::fs::write(&path, "[service]\nworkers = 2\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.workers, 2);
        assert_eq!(config.memory_cache_bytes, DEFAULT_MEMORY_CACHE_BYTES);
    }

    #[test]
    fn test_load_config_rejects_bad_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("terratile.ini");
        std::fs::write(&path, "[service]\nworkers = many\n").unwrap();

        assert!(matches!(
            load_config(&path),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_write_default_config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("terratile.ini");
        write_default_config(&path).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.workers, DEFAULT_WORKER_COUNT);
    }
}
