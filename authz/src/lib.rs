//! Role-based authorization engine for the PaaS API.
//!
//! This crate decides whether an authenticated user may call an API endpoint.
//! It is built from three declarative layers:
//!
//! 1. **Routes**: every endpoint the API serves, registered under a stable name
//! 2. **Actions**: named groups of routes, with `dependsOn` inheritance
//! 3. **Roles**: ordered lists of actions, global or scoped to a namespace
//!
//! Users carry roles. A request is allowed when one of the user's roles grants
//! the exact verb and route template, within the namespace the role applies to.
//!
//! # Lifecycle
//!
//! All catalogs are built once by [`AuthzEngine::init`] and never change
//! afterwards. The engine is shared read-only (`Arc<AuthzEngine>`), so the
//! request path takes no locks.
//!
//! # Security Architecture
//!
//! See `types.rs` for the matching rules. In short:
//! - deny by default, at every level
//! - exact verb and template matching, no wildcards
//! - only the built-in `admin` role bypasses action checks
//! - a scoped role never applies outside its namespace

pub mod action;
pub mod error;
pub mod role;
pub mod routes;
pub mod types;
pub mod user;

pub use action::{Action, ActionCatalog, DEFAULT_ACTION_ID};
pub use error::{AuthzError, Result};
pub use role::{
    parse_role_id, Role, Roles, RolesGetter, ADMIN_ROLE_ID, ROLES_DELIMITER, ROLE_NAMESPACE_DELIMITER,
};
pub use routes::{Route, RouteRegistry};
pub use types::{AccessRequest, Authorizable, Endpoint, HttpVerb, API_BASE_PATH, WS_BASE_PATH};
pub use user::{authorize_resource, User};

use std::collections::HashMap;
use tracing::{debug, info};

/// The immutable authorization catalog.
///
/// Owns the REST and websocket route registries, the resolved action catalog
/// and the role catalog (built-in admin first, then configured roles).
///
/// # Example
///
/// ```rust,ignore
/// let engine = AuthzEngine::init(routes, ws_routes, ACTIONS_YAML, &roles_getter).await?;
/// let allowed = engine.is_allowed(&user, "GET", "/api/v1/namespaces", &params);
/// ```
#[derive(Debug)]
pub struct AuthzEngine {
    routes: RouteRegistry,
    ws_routes: RouteRegistry,
    actions: ActionCatalog,
    roles: Roles,
}

impl AuthzEngine {
    /// Builds every catalog, in dependency order.
    ///
    /// # Errors
    ///
    /// Any malformed action, unknown route, unreachable route, unknown action in
    /// a role, or failure of the roles source aborts initialization. A
    /// configured role reusing the `admin` id is rejected with
    /// [`AuthzError::ReservedRole`].
    pub async fn init(
        routes: RouteRegistry,
        ws_routes: RouteRegistry,
        actions_yaml: &str,
        roles_getter: &dyn RolesGetter,
    ) -> Result<Self> {
        let actions = ActionCatalog::load(actions_yaml, &routes, &ws_routes)?;
        actions.validate_coverage(&routes, &ws_routes)?;

        let configured = roles_getter.get_roles(&actions).await?;

        let mut roles = Roles::builtin();
        for role in configured {
            if role.id == ADMIN_ROLE_ID || role.super_admin {
                return Err(AuthzError::ReservedRole(role.id));
            }
            debug!(role = %role.id, actions = role.actions.len(), "role loaded");
            roles.push(role);
        }

        info!(
            "Authorization initialized: {} routes, {} websocket routes, {} actions, {} roles",
            routes.len(),
            ws_routes.len(),
            actions.len(),
            roles.len()
        );

        Ok(Self {
            routes,
            ws_routes,
            actions,
            roles,
        })
    }

    pub fn routes(&self) -> &RouteRegistry {
        &self.routes
    }

    pub fn ws_routes(&self) -> &RouteRegistry {
        &self.ws_routes
    }

    pub fn actions(&self) -> &ActionCatalog {
        &self.actions
    }

    /// Built-in admin first, then configured roles in source order.
    pub fn roles(&self) -> &Roles {
        &self.roles
    }

    /// The role flagged as default, handed to users without explicit roles.
    pub fn default_role(&self) -> Option<&Role> {
        self.roles.default_role()
    }

    /// Decides a request for `user`. Denial is `false`, never an error.
    pub fn is_allowed(
        &self,
        user: &User,
        method: &str,
        full_path: &str,
        params: &HashMap<String, String>,
    ) -> bool {
        let allowed = user.is_allowed(method, full_path, params);
        debug!(
            user = %user.username,
            roles = ?user.roles.ids(),
            method,
            path = full_path,
            allowed,
            "authorization decision"
        );
        allowed
    }

    /// Endpoints reachable through `role`.
    ///
    /// The admin role reaches every registered endpoint, whether or not an
    /// action lists it.
    pub fn allowed_endpoints(&self, role: &Role) -> Vec<Endpoint> {
        if !role.super_admin {
            return role.endpoints();
        }

        let rest = self
            .routes
            .iter()
            .map(|route| Endpoint::api(route.method, route.path.clone()));
        let ws = self
            .ws_routes
            .iter()
            .map(|route| Endpoint::ws(route.method, route.path.clone()));

        let mut endpoints: Vec<Endpoint> = rest.chain(ws).collect();
        endpoints.sort();
        endpoints.dedup();
        endpoints
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    const ACTIONS: &str = r#"
- id: default
  name: Default
  routes: [Info]
- id: namespace_read
  name: Read Namespaces
  routes: [Namespaces, NamespaceShow]
- id: app_read
  name: Read Applications
  dependsOn: [namespace_read]
  routes: [AppShow]
  wsRoutes: [AppLogs]
- id: app_write
  name: Write Applications
  dependsOn: [app_read]
  routes: [AppDelete]
"#;

    fn registries() -> (RouteRegistry, RouteRegistry) {
        let mut routes = RouteRegistry::new();
        routes.register("Info", HttpVerb::Get, "/info").unwrap();
        routes.register("Namespaces", HttpVerb::Get, "/namespaces").unwrap();
        routes
            .register("NamespaceShow", HttpVerb::Get, "/namespaces/:namespace")
            .unwrap();
        routes
            .register("AppShow", HttpVerb::Get, "/namespaces/:namespace/applications/:app")
            .unwrap();
        routes
            .register(
                "AppDelete",
                HttpVerb::Delete,
                "/namespaces/:namespace/applications/:app",
            )
            .unwrap();

        let mut ws_routes = RouteRegistry::new();
        ws_routes
            .register(
                "AppLogs",
                HttpVerb::Get,
                "/namespaces/:namespace/applications/:app/logs",
            )
            .unwrap();

        (routes, ws_routes)
    }

    /// Builds roles from `(id, default, actions)` triples
    struct StaticRoles(Vec<(&'static str, &'static str, Vec<&'static str>)>);

    #[async_trait]
    impl RolesGetter for StaticRoles {
        async fn get_roles(&self, actions: &ActionCatalog) -> Result<Roles> {
            self.0
                .iter()
                .map(|(id, default, ids)| {
                    let ids: Vec<String> = ids.iter().map(|s| s.to_string()).collect();
                    Role::from_declaration(id, id, default, &ids, actions)
                })
                .collect()
        }
    }

    struct FailingRoles;

    #[async_trait]
    impl RolesGetter for FailingRoles {
        async fn get_roles(&self, _actions: &ActionCatalog) -> Result<Roles> {
            Err(AuthzError::RolesSource("configmap unavailable".into()))
        }
    }

    async fn engine() -> AuthzEngine {
        let (routes, ws_routes) = registries();
        let getter = StaticRoles(vec![
            ("viewer", "true", vec!["app_read"]),
            ("editor", "", vec!["app_write"]),
        ]);
        AuthzEngine::init(routes, ws_routes, ACTIONS, &getter)
            .await
            .unwrap()
    }

    fn ns(namespace: &str) -> HashMap<String, String> {
        HashMap::from([("namespace".to_string(), namespace.to_string())])
    }

    /// Test that the admin role comes first, followed by configured roles
    #[tokio::test]
    async fn test_init_builds_role_catalog() {
        let engine = engine().await;

        assert_eq!(engine.roles().ids(), ["admin", "viewer", "editor"]);
        assert!(engine.roles().iter().next().unwrap().super_admin);
        assert_eq!(engine.default_role().map(|r| r.id.as_str()), Some("viewer"));
        assert_eq!(engine.actions().len(), 4);
        assert_eq!(engine.routes().len(), 5);
        assert_eq!(engine.ws_routes().len(), 1);
    }

    /// Test the viewer flow from catalog to decision
    #[tokio::test]
    async fn test_viewer_scoped_to_namespace() {
        let engine = engine().await;
        let viewer = engine.roles().find_by_id("viewer").unwrap().scoped("workspace");
        let user = User {
            roles: vec![viewer].into(),
            ..User::new("alice")
        };

        let show = "/api/v1/namespaces/:namespace/applications/:app";
        assert!(engine.is_allowed(&user, "GET", show, &ns("workspace")));
        assert!(engine.is_allowed(
            &user,
            "GET",
            "/wapi/v1/namespaces/:namespace/applications/:app/logs",
            &ns("workspace")
        ));
        assert!(!engine.is_allowed(&user, "DELETE", show, &ns("workspace")));
        assert!(!engine.is_allowed(&user, "GET", show, &ns("other")));
    }

    /// Test that unknown dependencies abort initialization
    #[tokio::test]
    async fn test_init_fails_on_unknown_dependency() {
        let (routes, ws_routes) = registries();
        let yaml = format!("{}\n- {{id: broken, name: Broken, dependsOn: [nope]}}", ACTIONS);
        let err = AuthzEngine::init(routes, ws_routes, &yaml, &StaticRoles(vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::UnknownDependency { .. }));
    }

    /// Test that a route without an action aborts initialization
    #[tokio::test]
    async fn test_init_fails_on_unreachable_route() {
        let (mut routes, ws_routes) = registries();
        routes.register("Orphan", HttpVerb::Get, "/orphan").unwrap();
        let err = AuthzEngine::init(routes, ws_routes, ACTIONS, &StaticRoles(vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::UnreachableRoute(name) if name == "Orphan"));
    }

    /// Test that configured roles cannot take over the admin id
    #[tokio::test]
    async fn test_init_rejects_reserved_role_id() {
        let (routes, ws_routes) = registries();
        let getter = StaticRoles(vec![("admin", "", vec![])]);
        let err = AuthzEngine::init(routes, ws_routes, ACTIONS, &getter)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::ReservedRole(id) if id == "admin"));
    }

    /// Test that a failing roles source aborts initialization
    #[tokio::test]
    async fn test_init_propagates_roles_source_error() {
        let (routes, ws_routes) = registries();
        let err = AuthzEngine::init(routes, ws_routes, ACTIONS, &FailingRoles)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::RolesSource(_)));
    }

    /// Test the endpoints reported per role
    #[tokio::test]
    async fn test_allowed_endpoints() {
        let engine = engine().await;

        let admin = engine.allowed_endpoints(&Role::admin());
        assert_eq!(admin.len(), 6);

        let viewer = engine.roles().find_by_id("viewer").unwrap();
        let paths: Vec<String> = engine
            .allowed_endpoints(viewer)
            .iter()
            .map(|e| format!("{} {}", e.method, e.full_path()))
            .collect();
        assert_eq!(
            paths,
            [
                "GET /api/v1/info",
                "GET /api/v1/namespaces",
                "GET /api/v1/namespaces/:namespace",
                "GET /api/v1/namespaces/:namespace/applications/:app",
                "GET /wapi/v1/namespaces/:namespace/applications/:app/logs",
            ]
        );

        let editor = engine.roles().find_by_id("editor").unwrap();
        assert_eq!(engine.allowed_endpoints(editor).len(), 6);
    }
}
