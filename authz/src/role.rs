//! Role model.
//!
//! A role is an ordered list of actions, optionally scoped to a namespace. The
//! same role id can be assigned globally and once per namespace; these are
//! distinct roles for matching purposes and are written `id` and
//! `id:namespace` respectively.

use crate::action::{Action, ActionCatalog, DEFAULT_ACTION_ID};
use crate::error::{AuthzError, Result};
use crate::types::{AccessRequest, Authorizable, Endpoint};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Id of the built-in role that permits everything.
pub const ADMIN_ROLE_ID: &str = "admin";

/// Separator between role ids in a flat role list (`admin,viewer:ws`).
pub const ROLES_DELIMITER: char = ',';

/// Separator between a role id and its namespace (`admin:workspace`).
pub const ROLE_NAMESPACE_DELIMITER: char = ':';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: String,
    /// Friendly name.
    pub name: String,
    /// Namespace the role applies to; empty for a global role.
    pub namespace: String,
    pub actions: Vec<Arc<Action>>,
    /// Fallback role for users without explicit roles.
    pub default: bool,
    /// Bypasses the action check entirely. Only the built-in admin role sets it.
    pub super_admin: bool,
}

impl Role {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            namespace: String::new(),
            actions: Vec::new(),
            default: false,
            super_admin: false,
        }
    }

    /// The built-in admin role.
    pub fn admin() -> Self {
        Self {
            super_admin: true,
            ..Self::new(ADMIN_ROLE_ID, "Admin Role")
        }
    }

    pub fn with_actions(mut self, actions: Vec<Arc<Action>>) -> Self {
        self.actions = actions;
        self
    }

    /// A copy of this role applied to `namespace`.
    pub fn scoped(&self, namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..self.clone()
        }
    }

    pub fn is_global(&self) -> bool {
        self.namespace.is_empty()
    }

    /// `id` for a global role, `id:namespace` for a scoped one.
    pub fn scoped_id(&self) -> String {
        if self.is_global() {
            self.id.clone()
        } else {
            format!("{}{}{}", self.id, ROLE_NAMESPACE_DELIMITER, self.namespace)
        }
    }

    /// Builds a role from its declarative form.
    ///
    /// The `default` action is always prepended, then each listed action is
    /// looked up in the catalog. Blank action ids are skipped. `default_flag`
    /// is a boolean string; empty means `false`.
    pub fn from_declaration(
        id: &str,
        name: &str,
        default_flag: &str,
        action_ids: &[String],
        catalog: &ActionCatalog,
    ) -> Result<Self> {
        let missing = |action: &str| AuthzError::UnknownAction {
            role: id.to_string(),
            action: action.to_string(),
        };

        let mut actions = vec![catalog
            .get(DEFAULT_ACTION_ID)
            .cloned()
            .ok_or_else(|| missing(DEFAULT_ACTION_ID))?];

        for action_id in action_ids.iter().map(|a| a.trim()).filter(|a| !a.is_empty()) {
            let action = catalog.get(action_id).ok_or_else(|| missing(action_id))?;
            actions.push(Arc::clone(action));
        }

        let default = if default_flag.is_empty() {
            false
        } else {
            parse_bool(default_flag).ok_or_else(|| AuthzError::InvalidRoleDefault {
                role: id.to_string(),
                value: default_flag.to_string(),
            })?
        };

        Ok(Self {
            default,
            ..Self::new(id, name).with_actions(actions)
        })
    }

    /// Admin permits everything; otherwise any action must permit the request.
    ///
    /// Namespace scoping is not checked here, see [`crate::user::User::is_allowed`].
    pub fn is_allowed(&self, method: &str, full_path: &str) -> bool {
        if self.super_admin {
            return true;
        }

        self.actions
            .iter()
            .any(|action| action.is_allowed(method, full_path))
    }

    /// Endpoints reachable through the role's actions, sorted and deduplicated.
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.actions
            .iter()
            .flat_map(|action| action.endpoints.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

impl Authorizable for Role {
    fn is_allowed(&self, request: &AccessRequest<'_>) -> bool {
        Role::is_allowed(self, request.method, request.full_path)
    }
}

/// `1`, `t`, `true` and `0`, `f`, `false`, in lower, upper or title case.
fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// Splits `id:namespace` on the first colon; no colon means global scope.
pub fn parse_role_id(role_id: &str) -> (String, String) {
    match role_id.split_once(ROLE_NAMESPACE_DELIMITER) {
        Some((id, namespace)) => (id.to_string(), namespace.to_string()),
        None => (role_id.to_string(), String::new()),
    }
}

/// An ordered set of roles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roles(Vec<Role>);

impl Roles {
    pub fn new() -> Self {
        Self::default()
    }

    /// The catalog every deployment starts from: just the admin role.
    pub fn builtin() -> Self {
        Self(vec![Role::admin()])
    }

    pub fn push(&mut self, role: Role) {
        self.0.push(role);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Role> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn retain(&mut self, keep: impl FnMut(&Role) -> bool) {
        self.0.retain(keep);
    }

    /// True iff any role permits the request.
    pub fn is_allowed(&self, method: &str, full_path: &str) -> bool {
        self.0.iter().any(|role| role.is_allowed(method, full_path))
    }

    /// The first role flagged as default.
    pub fn default_role(&self) -> Option<&Role> {
        self.0.iter().find(|role| role.default)
    }

    /// The global role with this id.
    pub fn find_by_id(&self, id: &str) -> Option<&Role> {
        self.find_by_id_and_namespace(id, "")
    }

    /// Exact match on id and namespace. An empty namespace only matches global roles.
    pub fn find_by_id_and_namespace(&self, id: &str, namespace: &str) -> Option<&Role> {
        self.0
            .iter()
            .find(|role| role.id == id && role.namespace == namespace)
    }

    /// Scoped ids of every role, in order.
    pub fn ids(&self) -> Vec<String> {
        self.0.iter().map(Role::scoped_id).collect()
    }
}

impl Authorizable for Roles {
    fn is_allowed(&self, request: &AccessRequest<'_>) -> bool {
        Roles::is_allowed(self, request.method, request.full_path)
    }
}

impl From<Vec<Role>> for Roles {
    fn from(roles: Vec<Role>) -> Self {
        Self(roles)
    }
}

impl FromIterator<Role> for Roles {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<Role> for Roles {
    fn extend<I: IntoIterator<Item = Role>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl IntoIterator for Roles {
    type Item = Role;
    type IntoIter = std::vec::IntoIter<Role>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Roles {
    type Item = &'a Role;
    type IntoIter = std::slice::Iter<'a, Role>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Source of the roles configured for a deployment.
///
/// Implementations own their I/O policy; the engine only awaits the result
/// once at startup.
#[async_trait]
pub trait RolesGetter: Send + Sync {
    async fn get_roles(&self, actions: &ActionCatalog) -> Result<Roles>;
}
