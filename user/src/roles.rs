//! Roles declared as ConfigMap-shaped records in a YAML file.
//!
//! ```yaml
//! - name: paas-role-viewer
//!   data:
//!     id: viewer
//!     name: Viewer
//!     default: "true"
//!     actions: |
//!       namespace_read
//!       app_read
//! ```

use async_trait::async_trait;
use authz::{ActionCatalog, AuthzError, Role, Roles, RolesGetter};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info};

/// A ConfigMap-shaped role record.
#[derive(Debug, Clone, Deserialize)]
pub struct RoleConfigMap {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl RoleConfigMap {
    fn field(&self, key: &str) -> &str {
        self.data.get(key).map(String::as_str).unwrap_or_default()
    }

    /// Builds the role, with `actions` split one id per line.
    pub fn to_role(&self, actions: &ActionCatalog) -> authz::Result<Role> {
        let action_ids: Vec<String> = self
            .field("actions")
            .split('\n')
            .map(str::to_string)
            .collect();

        Role::from_declaration(
            self.field("id"),
            self.field("name"),
            self.field("default"),
            &action_ids,
            actions,
        )
    }
}

#[derive(Debug, Clone)]
enum Source {
    File(PathBuf),
    Inline(String),
}

/// [`RolesGetter`] reading role records from YAML.
#[derive(Debug, Clone)]
pub struct ConfigMapRolesGetter {
    source: Source,
}

impl ConfigMapRolesGetter {
    /// Reads the records from `path` when roles are requested.
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            source: Source::File(path.into()),
        }
    }

    pub fn from_yaml(yaml: impl Into<String>) -> Self {
        Self {
            source: Source::Inline(yaml.into()),
        }
    }

    async fn read(&self) -> authz::Result<String> {
        match &self.source {
            Source::Inline(yaml) => Ok(yaml.clone()),
            Source::File(path) => tokio::fs::read_to_string(path).await.map_err(|e| {
                AuthzError::RolesSource(format!("reading {}: {}", path.display(), e))
            }),
        }
    }
}

#[async_trait]
impl RolesGetter for ConfigMapRolesGetter {
    async fn get_roles(&self, actions: &ActionCatalog) -> authz::Result<Roles> {
        let yaml = self.read().await?;
        if yaml.trim().is_empty() {
            info!("No roles configured");
            return Ok(Roles::new());
        }

        let records: Vec<RoleConfigMap> = serde_yaml::from_str(&yaml)
            .map_err(|e| AuthzError::RolesSource(format!("parsing roles: {}", e)))?;

        let mut roles = Roles::new();
        for record in &records {
            let role = record.to_role(actions)?;
            debug!(configmap = %record.name, role = %role.id, "role declared");
            roles.push(role);
        }

        info!("Loaded {} roles", roles.len());
        Ok(roles)
    }
}
