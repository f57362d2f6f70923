//! User model and the request-time authorization decision.

use crate::role::Roles;
use crate::types::{AccessRequest, Authorizable};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::debug;

/// An API user as loaded from the user store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct User {
    pub username: String,
    /// Password hash in PHC string format.
    pub password: String,
    pub created_at: DateTime<Utc>,
    pub roles: Roles,
    /// Namespaces the user created, and therefore has access to.
    pub namespaces: Vec<String>,
    /// Gitconfigs the user created, and therefore has access to.
    pub gitconfigs: Vec<String>,
    /// Role ids as they were persisted, used to detect drift on reload.
    pub role_ids: Vec<String>,
    /// Name of the backing record in the user store.
    pub secret_name: String,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            created_at: Utc::now(),
            ..Self::default()
        }
    }

    /// Decides whether one of the user's roles permits the request.
    ///
    /// - no roles: deny
    /// - global admin: allow
    /// - namespaced admin: allow iff the `namespace` param equals its namespace
    /// - any other role: its actions must permit the request, and a scoped role
    ///   also requires the `namespace` param to equal its namespace
    pub fn is_allowed(&self, method: &str, full_path: &str, params: &HashMap<String, String>) -> bool {
        if self.roles.is_empty() {
            return false;
        }

        let namespace = params.get("namespace").map(String::as_str);

        self.roles.iter().any(|role| {
            let in_scope = role.is_global() || namespace == Some(role.namespace.as_str());

            let allowed = if role.super_admin {
                in_scope
            } else {
                in_scope && role.is_allowed(method, full_path)
            };

            if allowed {
                debug!(user = %self.username, role = %role.scoped_id(), "role grants request");
            }
            allowed
        })
    }

    /// True if the user holds the global admin role.
    pub fn is_admin(&self) -> bool {
        self.roles
            .iter()
            .any(|role| role.super_admin && role.is_global())
    }

    /// Adds a namespace if not already present. Empty names are ignored.
    pub fn add_namespace(&mut self, namespace: &str) {
        add_unique(&mut self.namespaces, namespace);
    }

    /// Removes a namespace and every role scoped to it.
    ///
    /// Returns false if neither the namespace nor a scoped role was present.
    pub fn remove_namespace(&mut self, namespace: &str) -> bool {
        let namespaces_before = self.namespaces.len();
        let roles_before = self.roles.len();

        self.namespaces.retain(|ns| ns != namespace);
        self.roles.retain(|role| role.namespace != namespace);

        namespaces_before != self.namespaces.len() || roles_before != self.roles.len()
    }

    /// Adds a gitconfig if not already present. Empty names are ignored.
    pub fn add_gitconfig(&mut self, gitconfig: &str) {
        add_unique(&mut self.gitconfigs, gitconfig);
    }

    /// Removes a gitconfig. Returns false if it was not there.
    pub fn remove_gitconfig(&mut self, gitconfig: &str) -> bool {
        let before = self.gitconfigs.len();
        self.gitconfigs.retain(|gc| gc != gitconfig);
        before != self.gitconfigs.len()
    }
}

impl Authorizable for User {
    fn is_allowed(&self, request: &AccessRequest<'_>) -> bool {
        User::is_allowed(self, request.method, request.full_path, request.params)
    }
}

fn add_unique(list: &mut Vec<String>, value: &str) {
    if value.is_empty() || list.iter().any(|v| v == value) {
        return;
    }
    list.push(value.to_string());
}

/// Resource-name check used for namespace and gitconfig scoped routes.
///
/// An empty resource name is always permitted: the route carries no resource
/// parameter. Otherwise the name must be in `allowed` (exact, case-sensitive).
pub fn authorize_resource(resource: &str, allowed: &[String]) -> bool {
    resource.is_empty() || allowed.iter().any(|name| name == resource)
}

/// A resource living in a namespace.
pub trait NamespacedResource {
    fn namespace(&self) -> &str;
}

/// A resource tied to a gitconfig.
pub trait GitconfigResource {
    fn gitconfig(&self) -> &str;
}

/// Keeps the resources in namespaces the user has access to. Admins see all.
pub fn filter_namespaced<T: NamespacedResource>(user: &User, resources: Vec<T>) -> Vec<T> {
    if user.is_admin() {
        return resources;
    }

    resources
        .into_iter()
        .filter(|resource| user.namespaces.iter().any(|ns| ns == resource.namespace()))
        .collect()
}

/// Keeps the resources whose gitconfig the user has access to. Admins see all.
pub fn filter_gitconfig<T: GitconfigResource>(user: &User, resources: Vec<T>) -> Vec<T> {
    if user.is_admin() {
        return resources;
    }

    resources
        .into_iter()
        .filter(|resource| user.gitconfigs.iter().any(|gc| gc == resource.gitconfig()))
        .collect()
}
