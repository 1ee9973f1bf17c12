//! Daemon configuration loading

use std::path::{Path, PathBuf};

use drydock_api::SubmittedDeliveryConfig;
use drydock_core::EngineConfig;
use eyre::WrapErr;
use serde::{Deserialize, Serialize};

/// Top-level configuration for the drydock daemon
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    /// Delivery config documents upserted at startup, JSON or TOML
    #[serde(default)]
    pub delivery_configs: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Process settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Used when `RUST_LOG` is unset (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("reading {}", path.display()))?;
        let mut config: Config =
            toml::from_str(&content).wrap_err_with(|| format!("parsing {}", path.display()))?;

        // delivery config paths are relative to the file naming them
        if let Some(dir) = path.parent() {
            for config_path in &mut config.delivery_configs {
                if config_path.is_relative() {
                    *config_path = dir.join(&*config_path);
                }
            }
        }
        Ok(config)
    }

    /// Load from the flag, `DRYDOCK_CONFIG`, or the first default path that exists
    ///
    /// # Errors
    /// Returns error if an explicitly named file cannot be loaded
    pub fn load_default(flag: Option<&Path>) -> eyre::Result<Self> {
        if let Some(path) = flag {
            return Self::load(path);
        }

        if let Ok(path) = std::env::var("DRYDOCK_CONFIG") {
            return Self::load(&PathBuf::from(path));
        }

        let paths = [
            Some(PathBuf::from("drydock.toml")),
            Some(PathBuf::from("/etc/drydock/drydock.toml")),
            dirs::config_dir().map(|p| p.join("drydock/drydock.toml")),
        ];

        for path in paths.into_iter().flatten() {
            if path.exists() {
                return Self::load(&path);
            }
        }

        tracing::warn!("no config file found, using defaults");
        Ok(Config::default())
    }
}

/// Read one submitted delivery config, JSON by extension and TOML otherwise
///
/// # Errors
/// Returns error if the file cannot be read or parsed
pub fn load_delivery_config(path: &Path) -> eyre::Result<SubmittedDeliveryConfig> {
    let content = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("reading {}", path.display()))?;
    let submitted = if path.extension().is_some_and(|ext| ext == "json") {
        serde_json::from_str(&content).wrap_err_with(|| format!("parsing {}", path.display()))?
    } else {
        toml::from_str(&content).wrap_err_with(|| format!("parsing {}", path.display()))?
    };
    Ok(submitted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.daemon.log_level, "info");
        assert_eq!(config.daemon.log_format, LogFormat::Pretty);
        assert_eq!(config.engine.resource_check.batch_size, 100);
        assert!(config.delivery_configs.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let config: Config = toml::from_str(
            r#"
            delivery_configs = ["fnord.toml"]

            [daemon]
            log_level = "debug"
            log_format = "json"

            [engine.scheduler]
            enabled = true

            [engine.resource_check]
            batch_size = 10

            [engine.constraints]
            manual_judgement_timeout_secs = 3600
            "#,
        )
        .unwrap();

        assert_eq!(config.daemon.log_format, LogFormat::Json);
        assert!(config.engine.scheduler.enabled);
        assert_eq!(config.engine.resource_check.batch_size, 10);
        assert_eq!(config.engine.resource_check.min_age_secs, 60);
        assert_eq!(
            config.engine.constraints.manual_judgement_timeout_secs,
            Some(3600)
        );
    }

    #[test]
    fn test_load_resolves_relative_delivery_configs() {
        let dir = std::env::temp_dir().join(format!("drydock-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("drydock.toml");
        std::fs::write(&path, "delivery_configs = [\"fnord.json\", \"/abs/other.toml\"]\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(
            config.delivery_configs,
            vec![dir.join("fnord.json"), PathBuf::from("/abs/other.toml")]
        );

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_delivery_config_formats() {
        let dir = std::env::temp_dir().join(format!("drydock-delivery-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let json = dir.join("fnord.json");
        std::fs::write(
            &json,
            r#"{"application": "fnord", "serviceAccount": "keel@spinnaker", "environments": [{"name": "test"}]}"#,
        )
        .unwrap();
        let submitted = load_delivery_config(&json).unwrap();
        assert_eq!(submitted.safe_name(), "fnord-manifest");
        assert_eq!(submitted.environments.len(), 1);

        let toml_path = dir.join("fnord.toml");
        std::fs::write(
            &toml_path,
            "name = \"fnord-config\"\napplication = \"fnord\"\n\n[[environments]]\nname = \"prod\"\n",
        )
        .unwrap();
        let submitted = load_delivery_config(&toml_path).unwrap();
        assert_eq!(submitted.safe_name(), "fnord-config");
        assert!(submitted.service_account.is_none());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
