//! Error types for the authorization system.
//!
//! # Security Note
//! These errors are raised while the route table, the action catalog and the
//! role catalog are being loaded. They never describe a request-time decision:
//! a denied request is a plain `false`, and the HTTP layer turns it into a
//! generic 403 without exposing which rule failed.

use thiserror::Error;

/// Errors that can occur while building the authorization catalogs.
///
/// Every variant is fatal for initialization: the catalog is either fully
/// built or not built at all.
#[derive(Debug, Error)]
pub enum AuthzError {
    /// The declarative action data could not be parsed.
    #[error("Action catalog parsing failed: {0}")]
    ActionParse(String),

    /// The same action id was declared twice.
    #[error("Action '{0}' is declared more than once")]
    DuplicateAction(String),

    /// An action depends on an action id that is not declared.
    #[error("Action dependency '{dependency}' of action '{action}' not found")]
    UnknownDependency { action: String, dependency: String },

    /// The `dependsOn` edges form a cycle.
    ///
    /// The payload is the cycle rendered as `a -> b -> a`.
    #[error("Action dependency cycle detected: {0}")]
    DependencyCycle(String),

    /// An action references a route name missing from the route registry.
    #[error("Route '{route}' referenced by action '{action}' is not registered")]
    UnknownActionRoute { action: String, route: String },

    /// A registered route is not assigned to any action and can never be reached.
    #[error("Route '{0}' is unreachable, not assigned to any action")]
    UnreachableRoute(String),

    /// A route name was registered twice.
    #[error("Route '{0}' is already registered")]
    DuplicateRoute(String),

    /// A route name was looked up but never registered.
    #[error("Route '{0}' is not registered")]
    UnknownRoute(String),

    /// A role references an action id missing from the action catalog.
    #[error("Action '{action}' in role '{role}' does not exist")]
    UnknownAction { role: String, action: String },

    /// The `default` flag of a role is not a boolean string.
    #[error("Invalid default flag '{value}' for role '{role}'")]
    InvalidRoleDefault { role: String, value: String },

    /// A role loaded from configuration tried to use a built-in role id.
    #[error("Role id '{0}' is reserved")]
    ReservedRole(String),

    /// The external roles source failed.
    #[error("Loading roles failed: {0}")]
    RolesSource(String),
}

/// A specialized Result type for authorization operations.
pub type Result<T> = std::result::Result<T, AuthzError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthzError::UnknownDependency {
            action: "app_write".into(),
            dependency: "app_read".into(),
        };
        assert_eq!(
            err.to_string(),
            "Action dependency 'app_read' of action 'app_write' not found"
        );

        let err = AuthzError::UnreachableRoute("AppShow".into());
        assert_eq!(
            err.to_string(),
            "Route 'AppShow' is unreachable, not assigned to any action"
        );

        let err = AuthzError::UnknownAction {
            role: "viewer".into(),
            action: "app_nope".into(),
        };
        assert_eq!(
            err.to_string(),
            "Action 'app_nope' in role 'viewer' does not exist"
        );
    }
}
