use crate::utils::env_paths::EnvPaths;
use anyhow::{Context, Result};
use authz::AuthzEngine;
use colored::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use user::{ConfigMapRolesGetter, InMemoryUserStore, UserManager};

/// Server configuration, read from `<configuration>/server.yaml`
///
/// ```yaml
/// port: 3030
/// admin_routes:
///   - /api/v1/namespaces
/// roles_path: roles.yaml   # relative to the configuration directory
/// users_path: users.yaml   # relative to the data directory
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub port: u16,
    /// Request paths only admins may call.
    pub admin_routes: Vec<String>,
    pub roles_path: PathBuf,
    pub users_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3030,
            admin_routes: Vec::new(),
            roles_path: PathBuf::from("roles.yaml"),
            users_path: PathBuf::from("users.yaml"),
        }
    }
}

impl ServerConfig {
    /// Loads the configuration file, falling back to defaults if it is absent.
    pub fn load(env_paths: &EnvPaths) -> Result<Self> {
        let path = env_paths.server_config_path();
        if !path.exists() {
            debug!("No server configuration at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let yaml = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&yaml)
            .with_context(|| format!("Invalid server configuration in {}", path.display()))?;
        Ok(config)
    }

    pub fn roles_file(&self, env_paths: &EnvPaths) -> PathBuf {
        EnvPaths::resolve(&env_paths.configuration_path, &self.roles_path)
    }

    pub fn users_file(&self, env_paths: &EnvPaths) -> PathBuf {
        EnvPaths::resolve(&env_paths.data_path, &self.users_path)
    }
}

/// Builds the authorization engine from the API route table and the roles file.
pub async fn load_engine(env_paths: &EnvPaths, config: &ServerConfig) -> Result<AuthzEngine> {
    let roles_file = config.roles_file(env_paths);
    let getter = if roles_file.exists() {
        ConfigMapRolesGetter::from_file(&roles_file)
    } else {
        warn!("Roles file {:?} not found, only the admin role is available", roles_file);
        ConfigMapRolesGetter::from_yaml("")
    };

    api::routes::init_engine(&getter)
        .await
        .context("Failed to initialize authorization")
}

/// Opens the user store and wraps it in a [`UserManager`].
pub async fn load_user_manager(
    env_paths: &EnvPaths,
    config: &ServerConfig,
    engine: Arc<AuthzEngine>,
) -> Result<UserManager> {
    let users_file = config.users_file(env_paths);
    let store = if users_file.exists() {
        InMemoryUserStore::from_file(&users_file)
            .await
            .with_context(|| format!("Failed to load users from {}", users_file.display()))?
    } else {
        warn!("Users file {:?} not found, starting without users", users_file);
        InMemoryUserStore::new()
    };

    info!("User store ready");
    Ok(UserManager::new(Arc::new(store), engine))
}

#[derive(Serialize)]
struct ConfigReport<'a> {
    configuration_path: &'a Path,
    data_path: &'a Path,
    roles_file: PathBuf,
    users_file: PathBuf,
    server: &'a ServerConfig,
}

/// Show the effective configuration
pub async fn show(format: String) -> Result<()> {
    let env_paths = EnvPaths::load()?;
    let config = ServerConfig::load(&env_paths)?;

    let report = ConfigReport {
        configuration_path: &env_paths.configuration_path,
        data_path: &env_paths.data_path,
        roles_file: config.roles_file(&env_paths),
        users_file: config.users_file(&env_paths),
        server: &config,
    };

    match format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        "yaml" => println!("{}", serde_yaml::to_string(&report)?),
        _ => print_config_text(&report),
    }

    Ok(())
}

fn print_config_text(report: &ConfigReport<'_>) {
    println!("{}", "=== PaaS API Configuration ===".bold());
    println!();
    println!("  {}: {}", "Configuration".cyan(), report.configuration_path.display());
    println!("  {}: {}", "Data".cyan(), report.data_path.display());
    println!("  {}: {}", "Roles file".cyan(), report.roles_file.display());
    println!("  {}: {}", "Users file".cyan(), report.users_file.display());
    println!("  {}: {}", "Port".cyan(), report.server.port);

    if report.server.admin_routes.is_empty() {
        println!("  {}: {}", "Admin routes".cyan(), "none".dimmed());
    } else {
        println!("  {}:", "Admin routes".cyan());
        for route in &report.server.admin_routes {
            println!("    - {}", route);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn env_paths(dir: &TempDir) -> EnvPaths {
        EnvPaths {
            data_path: dir.path().join("data"),
            configuration_path: dir.path().join("config"),
        }
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ServerConfig::load(&env_paths(&dir)).unwrap();
        assert_eq!(config.port, 3030);
        assert!(config.admin_routes.is_empty());
        assert_eq!(
            config.roles_file(&env_paths(&dir)),
            dir.path().join("config/roles.yaml")
        );
        assert_eq!(
            config.users_file(&env_paths(&dir)),
            dir.path().join("data/users.yaml")
        );
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("config")).unwrap();
        std::fs::write(
            dir.path().join("config/server.yaml"),
            "port: 8080\nadmin_routes: [/api/v1/namespaces]\n",
        )
        .unwrap();

        let config = ServerConfig::load(&env_paths(&dir)).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.admin_routes, ["/api/v1/namespaces"]);
        assert_eq!(config.roles_path, PathBuf::from("roles.yaml"));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("config")).unwrap();
        std::fs::write(dir.path().join("config/server.yaml"), "prot: 8080\n").unwrap();

        assert!(ServerConfig::load(&env_paths(&dir)).is_err());
    }

    #[tokio::test]
    async fn test_engine_without_roles_file() {
        let dir = TempDir::new().unwrap();
        let engine = load_engine(&env_paths(&dir), &ServerConfig::default())
            .await
            .unwrap();
        assert_eq!(engine.roles().ids(), ["admin"]);
    }
}
