use crate::commands::config::{load_engine, load_user_manager, ServerConfig};
use crate::utils::env_paths::EnvPaths;
use anyhow::{anyhow, Result};
use api::ApiConfig;
use std::sync::Arc;
use tracing::info;

/// Start the API server
pub async fn execute(env_paths: &EnvPaths, port: Option<u16>) -> Result<()> {
    let config = ServerConfig::load(env_paths)?;
    let engine = Arc::new(load_engine(env_paths, &config).await?);
    let users = Arc::new(load_user_manager(env_paths, &config, Arc::clone(&engine)).await?);

    let api_config = ApiConfig::new()
        .with_port(port.unwrap_or(config.port))
        .with_admin_routes(config.admin_routes.clone());

    info!(
        "Starting API server with {} roles and {} admin routes",
        engine.roles().len(),
        api_config.admin_routes.len()
    );

    api::start_server_with_config(engine, users, api_config)
        .await
        .map_err(|e| anyhow!("API server error: {}", e))
}
