// src/config.rs
use directories::ProjectDirs;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

fn default_refresh_interval() -> u64 {
    1
}

fn default_bar_length() -> usize {
    crate::display::DEFAULT_BAR_LENGTH
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    /// Overrides the default store document location when set.
    pub store_path: Option<PathBuf>,
    /// Tick interval of the real-time code display, in seconds.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_seconds: u64,
    /// Number of segments in the countdown progress bar.
    #[serde(default = "default_bar_length")]
    pub progress_bar_length: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            store_path: None,
            refresh_interval_seconds: default_refresh_interval(),
            progress_bar_length: default_bar_length(),
        }
    }
}

impl Config {
    /// The store document location: the configured override, or the
    /// platform data directory, or `data/accounts.json` relative to the
    /// working directory when no home is resolvable.
    pub fn resolved_store_path(&self) -> PathBuf {
        if let Some(path) = &self.store_path {
            return path.clone();
        }
        match project_dirs() {
            Some(dirs) => dirs.data_dir().join("accounts.json"),
            None => PathBuf::from("data/accounts.json"),
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "OtpVault", "OtpVault")
}

fn get_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("otpvault_config.toml"))
}

fn save_default_config(config_path: &Path, config: &Config) -> Result<(), String> {
    info!("Attempting to save default config to {:?}", config_path);
    if let Some(parent_dir) = config_path.parent() {
        if !parent_dir.exists() {
            fs::create_dir_all(parent_dir)
                .map_err(|e| format!("Failed to create config directory {:?}: {}", parent_dir, e))?;
            info!("Created config directory: {:?}", parent_dir);
        }
    }

    let toml_string = toml::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize default config to TOML: {}", e))?;

    let mut file = fs::File::create(config_path)
        .map_err(|e| format!("Failed to create default config file {:?}: {}", config_path, e))?;
    file.write_all(toml_string.as_bytes())
        .map_err(|e| format!("Failed to write default config to {:?}: {}", config_path, e))?;

    info!("Saved default configuration to {:?}", config_path);
    Ok(())
}

pub fn load_config() -> Config {
    if let Some(config_path) = get_config_path() {
        if config_path.exists() {
            info!("Loading configuration from {:?}", config_path);
            match fs::read_to_string(&config_path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(loaded_config) => {
                        info!("Configuration loaded successfully.");
                        return loaded_config;
                    }
                    Err(e) => {
                        warn!(
                            "Failed to parse config file at {:?}: {}. Using default configuration.",
                            config_path, e
                        );
                    }
                },
                Err(e) => {
                    warn!(
                        "Failed to read config file at {:?}: {}. Using default configuration.",
                        config_path, e
                    );
                }
            }
        } else {
            info!(
                "Config file not found at {:?}. Creating and using default configuration.",
                config_path
            );
            let default_config = Config::default();
            if let Err(e) = save_default_config(&config_path, &default_config) {
                warn!("Failed to save default configuration: {}", e);
            }
            return default_config;
        }
    } else {
        warn!("Could not determine config directory. Using default configuration.");
    }
    Config::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.refresh_interval_seconds, 1);
        assert_eq!(config.progress_bar_length, 20);
        assert!(config.store_path.is_none());
    }

    #[test]
    fn test_save_and_reload_config() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("otpvault_config.toml");

        let default_config = Config::default();
        save_default_config(&config_path, &default_config).unwrap();
        assert!(config_path.exists());

        let content = fs::read_to_string(&config_path).unwrap();
        let loaded: Config = toml::from_str(&content).unwrap();
        assert_eq!(loaded.refresh_interval_seconds, default_config.refresh_interval_seconds);
        assert_eq!(loaded.progress_bar_length, default_config.progress_bar_length);
    }

    #[test]
    fn test_partial_config_uses_serde_defaults() {
        let partial = r#"
store_path = "/tmp/custom-accounts.json"
"#;
        let config: Config = toml::from_str(partial).unwrap();
        assert_eq!(config.store_path, Some(PathBuf::from("/tmp/custom-accounts.json")));
        assert_eq!(config.refresh_interval_seconds, 1);
        assert_eq!(config.progress_bar_length, 20);
    }

    #[test]
    fn test_resolved_store_path_honors_override() {
        let config = Config {
            store_path: Some(PathBuf::from("/tmp/elsewhere.json")),
            ..Default::default()
        };
        assert_eq!(config.resolved_store_path(), PathBuf::from("/tmp/elsewhere.json"));
    }
}
