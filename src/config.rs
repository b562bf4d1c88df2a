//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MBOXMD_CONFIG` (environment variable)
//! 2. `~/.config/mboxmd/config.toml` (Linux/macOS)
//!    `%APPDATA%\mboxmd\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::convert::{ConvertOptions, ErrorPolicy, DEFAULT_BATCH_SIZE, DEFAULT_MAX_SUBJECT_LEN};
use crate::export::document::WritePolicy;
use crate::parser::body::BodyMode;
use crate::parser::header::{DatePolicy, HeaderMode};
use crate::parser::mbox::{MAX_MESSAGE_SIZE, READ_BUFFER_SIZE};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Conversion defaults.
    pub convert: ConvertConfig,
    /// Performance tuning.
    pub performance: PerformanceConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Conversion defaults. Command-line flags take precedence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
    /// Default output directory.
    pub output_dir: Option<PathBuf>,
    pub write_policy: WritePolicy,
    pub date_policy: DatePolicy,
    pub header_mode: HeaderMode,
    pub body_mode: BodyMode,
    pub on_parse_error: ErrorPolicy,
    /// Worker threads (1 = sequential).
    pub jobs: usize,
    /// Maximum characters of the subject kept in a filename.
    pub max_subject_len: usize,
}

/// Performance tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Read buffer size in bytes (default: 1048576 = 1 MB).
    pub read_buffer_size: usize,
    /// Maximum message size in bytes (default: 268435456 = 256 MB).
    pub max_message_size: usize,
    /// Records handed to the worker pool at once when `jobs > 1`.
    pub batch_size: usize,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            write_policy: WritePolicy::default(),
            date_policy: DatePolicy::default(),
            header_mode: HeaderMode::default(),
            body_mode: BodyMode::default(),
            on_parse_error: ErrorPolicy::default(),
            jobs: 1,
            max_subject_len: DEFAULT_MAX_SUBJECT_LEN,
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: READ_BUFFER_SIZE,
            max_message_size: MAX_MESSAGE_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl Config {
    /// Conversion options built from the config file values alone.
    pub fn convert_options(&self) -> ConvertOptions {
        ConvertOptions {
            header_mode: self.convert.header_mode,
            body_mode: self.convert.body_mode,
            date_policy: self.convert.date_policy,
            write_policy: self.convert.write_policy,
            on_parse_error: self.convert.on_parse_error,
            jobs: self.convert.jobs.max(1),
            max_subject_len: self.convert.max_subject_len,
            batch_size: self.performance.batch_size,
            read_buffer_size: self.performance.read_buffer_size,
            max_message_size: self.performance.max_message_size,
        }
    }
}

// ── Load ────────────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    match config_file_path() {
        Some(path) if path.exists() => load_config_from(&path),
        _ => Config::default(),
    }
}

/// Load configuration from an explicit path, falling back to defaults.
pub fn load_config_from(path: &Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str::<Config>(&contents) {
            Ok(cfg) => {
                tracing::info!(path = %path.display(), "Loaded config");
                cfg
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to parse config, using defaults"
                );
                Config::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to read config file, using defaults"
            );
            Config::default()
        }
    }
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    // 1. Environment variable override
    if let Ok(env_path) = std::env::var("MBOXMD_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    // 2. Standard config directory
    dirs::config_dir().map(|d| d.join("mboxmd").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mboxmd")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.general.log_level, "warn");
        assert_eq!(cfg.convert.write_policy, WritePolicy::Overwrite);
        assert_eq!(cfg.convert.date_policy, DatePolicy::Lenient);
        assert_eq!(cfg.convert.jobs, 1);
        assert_eq!(cfg.convert_options(), ConvertOptions::default());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let partial = r#"
[convert]
write_policy = "rename"
date_policy = "strict"
header_mode = "first-segment"
jobs = 4
"#;
        let cfg: Config = toml::from_str(partial).expect("parse partial");
        assert_eq!(cfg.convert.write_policy, WritePolicy::Rename);
        assert_eq!(cfg.convert.date_policy, DatePolicy::Strict);
        assert_eq!(cfg.convert.header_mode, HeaderMode::FirstSegment);
        // Other fields use defaults
        assert_eq!(cfg.convert.body_mode, BodyMode::Declared);
        assert_eq!(cfg.convert.on_parse_error, ErrorPolicy::Skip);
        assert_eq!(cfg.performance.batch_size, DEFAULT_BATCH_SIZE);

        let options = cfg.convert_options();
        assert_eq!(options.jobs, 4);
        assert_eq!(options.write_policy, WritePolicy::Rename);
    }

    #[test]
    fn test_invalid_config_falls_back_to_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[convert]\nwrite_policy = \"explode\"\n").unwrap();
        let cfg = load_config_from(&path);
        assert_eq!(cfg.convert.write_policy, WritePolicy::Overwrite);
    }

    #[test]
    fn test_serialize_deserialize_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let parsed: Config = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.convert_options(), cfg.convert_options());
    }
}
