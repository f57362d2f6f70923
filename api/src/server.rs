use crate::{create_router, AppState};
use authz::AuthzEngine;
use std::sync::Arc;
use tracing::info;

/// API server configuration
pub struct ApiConfig {
    /// Port to listen on
    pub port: u16,
    /// Request paths reserved to admins
    pub admin_routes: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: 3030,
            admin_routes: Vec::new(),
        }
    }
}

impl ApiConfig {
    /// Create a new API configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the admin-only request paths
    pub fn with_admin_routes(mut self, admin_routes: Vec<String>) -> Self {
        self.admin_routes = admin_routes;
        self
    }
}

/// Start the API server with the given configuration
pub async fn start_server_with_config(
    engine: Arc<AuthzEngine>,
    users: Arc<user::UserManager>,
    config: ApiConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = AppState::new(engine, users).with_admin_routes(config.admin_routes);
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("API server listening on {}", addr);
    info!("OpenAPI document available at http://localhost:{}/api/v1/openapi.json", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Start the API server with default configuration
pub async fn start_server(
    engine: Arc<AuthzEngine>,
    users: Arc<user::UserManager>,
) -> Result<(), Box<dyn std::error::Error>> {
    start_server_with_config(engine, users, ApiConfig::default()).await
}
