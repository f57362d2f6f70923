use authz::{AuthzEngine, Role, User};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Health check response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub authorization: AuthzSummary,
}

/// Sizes of the loaded authorization catalogs
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthzSummary {
    pub routes: usize,
    pub ws_routes: usize,
    pub actions: usize,
    pub roles: usize,
}

impl From<&AuthzEngine> for AuthzSummary {
    fn from(engine: &AuthzEngine) -> Self {
        Self {
            routes: engine.routes().len(),
            ws_routes: engine.ws_routes().len(),
            actions: engine.actions().len(),
            roles: engine.roles().len(),
        }
    }
}

/// A role as seen by its user
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RoleResponse {
    pub id: String,
    pub name: String,
    /// Empty for a global role.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// Reachable endpoints as `METHOD /full/path`.
    pub endpoints: Vec<String>,
}

impl RoleResponse {
    pub fn new(role: &Role, engine: &AuthzEngine) -> Self {
        Self {
            id: role.id.clone(),
            name: role.name.clone(),
            namespace: role.namespace.clone(),
            endpoints: engine
                .allowed_endpoints(role)
                .iter()
                .map(|endpoint| format!("{} {}", endpoint.method.as_str(), endpoint.full_path()))
                .collect(),
        }
    }
}

/// The authenticated user
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MeResponse {
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub roles: Vec<RoleResponse>,
    pub namespaces: Vec<String>,
    pub gitconfigs: Vec<String>,
}

impl MeResponse {
    pub fn new(user: &User, engine: &AuthzEngine) -> Self {
        Self {
            username: user.username.clone(),
            created_at: user.created_at,
            roles: user
                .roles
                .iter()
                .map(|role| RoleResponse::new(role, engine))
                .collect(),
            namespaces: user.namespaces.clone(),
            gitconfigs: user.gitconfigs.clone(),
        }
    }
}
