use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Environment-based path configuration
#[derive(Debug, Clone)]
pub struct EnvPaths {
    pub data_path: PathBuf,
    pub configuration_path: PathBuf,
}

impl EnvPaths {
    /// Load paths from environment variables with defaults
    pub fn load() -> Result<Self> {
        Self::load_with_base(None)
    }

    /// Load paths from environment variables with an optional base directory
    /// This is primarily for testing purposes
    pub fn load_with_base(base_dir: Option<PathBuf>) -> Result<Self> {
        let base = if let Some(base) = base_dir {
            base
        } else {
            // Try to load .env file if it exists in current directory
            if let Ok(env_path) = env::current_dir() {
                let env_file = env_path.join(".env");
                if env_file.exists() {
                    dotenv::from_path(&env_file).ok();
                }
            }
            env::current_dir().context("Failed to get current directory")?
        };

        Ok(Self {
            data_path: Self::get_path_from_env("DATA_PATH", "./data", &base),
            configuration_path: Self::get_path_from_env("CONFIGURATION_PATH", "./config", &base),
        })
    }

    /// Get a path from environment variable or use default
    fn get_path_from_env(var_name: &str, default: &str, base_dir: &Path) -> PathBuf {
        let path_str = env::var(var_name).unwrap_or_else(|_| default.to_string());
        let path = PathBuf::from(path_str);

        // If the path is relative, make it relative to the base directory
        if path.is_relative() {
            base_dir.join(path)
        } else {
            path
        }
    }

    /// Get the server configuration file path
    pub fn server_config_path(&self) -> PathBuf {
        self.configuration_path.join("server.yaml")
    }

    /// Get the logs directory path
    pub fn logs_path(&self) -> PathBuf {
        self.data_path.join("logs")
    }

    /// Resolves a configured file path against `base` unless it is absolute.
    pub fn resolve(base: &Path, path: &Path) -> PathBuf {
        if path.is_relative() {
            base.join(path)
        } else {
            path.to_path_buf()
        }
    }
}
