//! # Ledger Configuration
//!
//! Configuration for the mutation coordinator.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     STOCKROOM_ACTOR=warehouse-admin                                    │
//! │     STOCKROOM_MAX_IMAGES=3                                             │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/stockroom/ledger.toml (Linux)                            │
//! │     ~/Library/Application Support/com.stockroom.ledger/ledger.toml     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # ledger.toml
//! [images]
//! max_images = 5                      # never above 5
//! accepted_types = ["image/png", "image/jpeg", "image/webp"]
//!
//! [identity]
//! default_actor = "admin"
//!
//! [logs]
//! fetch_limit = 200
//!
//! [logging]
//! level = "info"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use stockroom_core::images::ImagePolicy;
use stockroom_core::MAX_VARIANT_IMAGES;
use tracing::{debug, info, warn};

use crate::error::{LedgerError, LedgerResult};

// =============================================================================
// Sections
// =============================================================================

/// Upload rules for variant images.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSettings {
    /// Images a variant may hold. Capped at 5.
    #[serde(default = "default_max_images")]
    pub max_images: usize,

    /// Content-type prefixes accepted by the upload control.
    #[serde(default = "default_accepted_types")]
    pub accepted_types: Vec<String>,
}

fn default_max_images() -> usize {
    MAX_VARIANT_IMAGES
}

fn default_accepted_types() -> Vec<String> {
    vec!["image/".to_string()]
}

impl Default for ImageSettings {
    fn default() -> Self {
        ImageSettings {
            max_images: default_max_images(),
            accepted_types: default_accepted_types(),
        }
    }
}

/// Attribution used when no signed-in identity is available.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentitySettings {
    #[serde(default = "default_actor")]
    pub default_actor: String,
}

fn default_actor() -> String {
    "admin".to_string()
}

impl Default for IdentitySettings {
    fn default() -> Self {
        IdentitySettings {
            default_actor: default_actor(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    /// Most recent stock log entries returned per variant.
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: usize,
}

fn default_fetch_limit() -> usize {
    200
}

impl Default for LogSettings {
    fn default() -> Self {
        LogSettings {
            fetch_limit: default_fetch_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            level: default_level(),
        }
    }
}

// =============================================================================
// Ledger Config
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub images: ImageSettings,

    #[serde(default)]
    pub identity: IdentitySettings,

    #[serde(default)]
    pub logs: LogSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl LedgerConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (ledger.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> LedgerResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading ledger config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = Self::from_toml(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load ledger config: {}. Using defaults.", e);
            Self::default()
        })
    }

    pub fn from_toml(contents: &str) -> LedgerResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn validate(&self) -> LedgerResult<()> {
        if self.images.max_images == 0 || self.images.max_images > MAX_VARIANT_IMAGES {
            return Err(LedgerError::Config(format!(
                "images.max_images must be between 1 and {}, got {}",
                MAX_VARIANT_IMAGES, self.images.max_images
            )));
        }

        if self.images.accepted_types.is_empty() {
            return Err(LedgerError::Config(
                "images.accepted_types must not be empty".into(),
            ));
        }

        if let Some(bad) = self
            .images
            .accepted_types
            .iter()
            .find(|t| !t.trim().to_ascii_lowercase().starts_with("image/"))
        {
            return Err(LedgerError::Config(format!(
                "images.accepted_types entries must start with image/, got: {}",
                bad
            )));
        }

        if self.identity.default_actor.trim().is_empty() {
            return Err(LedgerError::Config(
                "identity.default_actor must not be empty".into(),
            ));
        }

        if self.logs.fetch_limit == 0 {
            return Err(LedgerError::Config(
                "logs.fetch_limit must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(actor) = std::env::var("STOCKROOM_ACTOR") {
            debug!(actor = %actor, "Overriding default actor from environment");
            self.identity.default_actor = actor;
        }

        if let Ok(max) = std::env::var("STOCKROOM_MAX_IMAGES") {
            match max.parse::<usize>() {
                Ok(n) => self.images.max_images = n,
                Err(_) => warn!(value = %max, "Ignoring non-numeric STOCKROOM_MAX_IMAGES"),
            }
        }

        if let Ok(limit) = std::env::var("STOCKROOM_LOG_FETCH_LIMIT") {
            if let Ok(n) = limit.parse::<usize>() {
                self.logs.fetch_limit = n;
            }
        }

        if let Ok(level) = std::env::var("STOCKROOM_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "stockroom", "ledger")
            .map(|dirs| dirs.config_dir().join("ledger.toml"))
    }

    /// Image rules for edit sessions.
    pub fn image_policy(&self) -> ImagePolicy {
        ImagePolicy {
            max_images: self.images.max_images,
            accepted_prefixes: self.images.accepted_types.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LedgerConfig::default();
        assert_eq!(config.images.max_images, 5);
        assert_eq!(config.identity.default_actor, "admin");
        assert_eq!(config.logs.fetch_limit, 200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = LedgerConfig::from_toml(
            r#"
            [images]
            max_images = 3

            [identity]
            default_actor = "warehouse"
            "#,
        )
        .unwrap();
        assert_eq!(config.images.max_images, 3);
        assert_eq!(config.images.accepted_types, vec!["image/".to_string()]);
        assert_eq!(config.identity.default_actor, "warehouse");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_validation() {
        let mut config = LedgerConfig::default();

        config.images.max_images = 6;
        assert!(config.validate().is_err());

        config.images.max_images = 5;
        config.images.accepted_types = vec!["application/pdf".to_string()];
        assert!(config.validate().is_err());

        config.images.accepted_types = vec!["image/png".to_string()];
        config.identity.default_actor = "  ".to_string();
        assert!(config.validate().is_err());

        config.identity.default_actor = "ops".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        assert!(matches!(
            LedgerConfig::from_toml("[images]\nmax_images = \"five\""),
            Err(LedgerError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("stockroom-does-not-exist/ledger.toml");
        let config = LedgerConfig::load_or_default(Some(path));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_image_policy_from_config() {
        let mut config = LedgerConfig::default();
        config.images.max_images = 2;
        let policy = config.image_policy();
        assert_eq!(policy.max_images, 2);
        assert_eq!(policy.accepted_prefixes, vec!["image/".to_string()]);
    }
}
