use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root application configuration. Loaded from an optional TOML file and
/// environment variables with the prefix `SPLITLINE__`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Prefix for every key the engine writes to the store.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Register the sample experiments on startup when they are absent.
    #[serde(default)]
    pub seed_sample_data: bool,
    /// Fixed visitor id; when unset the id is read from or generated into the store.
    #[serde(default)]
    pub visitor_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    File,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_backend")]
    pub backend: StorageBackend,
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default = "default_analytics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_analytics_output")]
    pub output_path: PathBuf,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

// Default functions
fn default_namespace() -> String {
    "splitline".to_string()
}
fn default_storage_backend() -> StorageBackend {
    StorageBackend::File
}
fn default_storage_path() -> PathBuf {
    PathBuf::from(".splitline/store.json")
}
fn default_analytics_enabled() -> bool {
    true
}
fn default_analytics_output() -> PathBuf {
    PathBuf::from(".splitline/events.jsonl")
}
fn default_batch_size() -> usize {
    100
}
fn default_flush_interval_ms() -> u64 {
    1000
}
fn default_channel_capacity() -> usize {
    10_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            seed_sample_data: false,
            visitor_id: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            path: default_storage_path(),
        }
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            enabled: default_analytics_enabled(),
            output_path: default_analytics_output(),
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional config file and environment variables.
    /// Environment variables take precedence over the file.
    pub fn load(file: Option<&Path>) -> Result<Self, config::ConfigError> {
        Self::load_with_env(file, config::Environment::with_prefix("SPLITLINE"))
    }

    /// `SPLITLINE__ENGINE__NAMESPACE=site-b` overrides `engine.namespace`.
    /// No field is a list, so values are never split.
    fn load_with_env(
        file: Option<&Path>,
        env: config::Environment,
    ) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let builder = builder.add_source(env.separator("__").try_parsing(true));

        let config = builder.build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.engine.namespace, "splitline");
        assert!(!config.engine.seed_sample_data);
        assert_eq!(config.storage.backend, StorageBackend::File);
        assert_eq!(config.analytics.batch_size, 100);
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("splitline.toml");
        std::fs::write(
            &path,
            "[engine]\nnamespace = \"site-a\"\nseed_sample_data = true\n\n[storage]\nbackend = \"memory\"\n",
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.engine.namespace, "site-a");
        assert!(config.engine.seed_sample_data);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert!(config.analytics.enabled);
    }

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let source: config::Map<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        config::Environment::with_prefix("SPLITLINE").source(Some(source))
    }

    #[test]
    fn test_env_overrides_string_fields() {
        let config = AppConfig::load_with_env(
            None,
            env(&[
                ("SPLITLINE__ENGINE__NAMESPACE", "site-b"),
                ("SPLITLINE__STORAGE__BACKEND", "memory"),
                ("SPLITLINE__ANALYTICS__OUTPUT_PATH", "/tmp/site-b/events.jsonl"),
                ("SPLITLINE__ANALYTICS__BATCH_SIZE", "25"),
                ("SPLITLINE__ANALYTICS__ENABLED", "false"),
            ]),
        )
        .unwrap();

        assert_eq!(config.engine.namespace, "site-b");
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(
            config.analytics.output_path,
            PathBuf::from("/tmp/site-b/events.jsonl")
        );
        assert_eq!(config.analytics.batch_size, 25);
        assert!(!config.analytics.enabled);
        assert_eq!(config.analytics.flush_interval_ms, 1000);
    }

    #[test]
    fn test_env_takes_precedence_over_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("splitline.toml");
        std::fs::write(
            &path,
            "[engine]\nnamespace = \"site-a\"\nseed_sample_data = true\n",
        )
        .unwrap();

        let config = AppConfig::load_with_env(
            Some(&path),
            env(&[("SPLITLINE__ENGINE__NAMESPACE", "site-b")]),
        )
        .unwrap();
        assert_eq!(config.engine.namespace, "site-b");
        assert!(config.engine.seed_sample_data);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = AppConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.analytics.flush_interval_ms, 1000);
    }
}
