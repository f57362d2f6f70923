//! Action catalog.
//!
//! An action is a named group of endpoints ("read applications", "manage
//! namespaces"). Actions are declared in YAML, may depend on other actions and
//! inherit their routes. Roles are built out of actions.
//!
//! ```yaml
//! - id: app_read
//!   name: Read Applications
//!   dependsOn: [namespace_read]
//!   routes: [Apps, AppShow]
//!   wsRoutes: [AppLogs]
//! ```

use crate::error::{AuthzError, Result};
use crate::routes::RouteRegistry;
use crate::types::{AccessRequest, Authorizable, Endpoint};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Id of the action every role implicitly carries.
pub const DEFAULT_ACTION_ID: &str = "default";

/// An action as written in the declarative catalog.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ActionDeclaration {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub routes: Vec<String>,
    #[serde(default)]
    pub ws_routes: Vec<String>,
}

/// A resolved action with its materialized endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub id: String,
    pub name: String,
    pub depends_on: Vec<String>,
    /// Own and inherited route names, sorted and deduplicated.
    pub routes: Vec<String>,
    /// Own and inherited websocket route names, sorted and deduplicated.
    pub ws_routes: Vec<String>,
    pub endpoints: Vec<Endpoint>,
}

impl Action {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            depends_on: Vec::new(),
            routes: Vec::new(),
            ws_routes: Vec::new(),
            endpoints: Vec::new(),
        }
    }

    pub fn with_endpoints(mut self, endpoints: Vec<Endpoint>) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// True iff one of the endpoints matches the verb and full path exactly.
    pub fn is_allowed(&self, method: &str, full_path: &str) -> bool {
        self.endpoints
            .iter()
            .any(|endpoint| endpoint.matches(method, full_path))
    }

    /// Adds the routes of `dependency` to this action.
    ///
    /// Idempotent: merging the same dependency again changes nothing.
    pub fn merge(&mut self, dependency: &Action) {
        self.routes = merge_and_sort(&self.routes, &dependency.routes);
        self.ws_routes = merge_and_sort(&self.ws_routes, &dependency.ws_routes);
    }
}

impl Authorizable for Action {
    fn is_allowed(&self, request: &AccessRequest<'_>) -> bool {
        Action::is_allowed(self, request.method, request.full_path)
    }
}

/// Union of both lists, deduplicated and sorted.
fn merge_and_sort(first: &[String], second: &[String]) -> Vec<String> {
    first
        .iter()
        .chain(second)
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    Pending,
    InProgress,
    Done,
}

/// Depth-first resolution of `dependsOn` edges, independent of declaration order.
struct DependencyResolver<'a> {
    declarations: &'a [ActionDeclaration],
    index: HashMap<&'a str, usize>,
    state: Vec<Visit>,
    resolved: Vec<Option<Action>>,
    stack: Vec<usize>,
}

impl<'a> DependencyResolver<'a> {
    fn new(declarations: &'a [ActionDeclaration]) -> Result<Self> {
        let mut index = HashMap::with_capacity(declarations.len());
        for (position, declaration) in declarations.iter().enumerate() {
            if index.insert(declaration.id.as_str(), position).is_some() {
                return Err(AuthzError::DuplicateAction(declaration.id.clone()));
            }
        }

        Ok(Self {
            declarations,
            index,
            state: vec![Visit::Pending; declarations.len()],
            resolved: vec![None; declarations.len()],
            stack: Vec::new(),
        })
    }

    fn resolve_all(mut self) -> Result<Vec<Action>> {
        for position in 0..self.declarations.len() {
            self.visit(position)?;
        }

        Ok(self.resolved.into_iter().flatten().collect())
    }

    fn visit(&mut self, position: usize) -> Result<()> {
        match self.state[position] {
            Visit::Done => return Ok(()),
            Visit::InProgress => return Err(self.cycle_error(position)),
            Visit::Pending => {}
        }

        self.state[position] = Visit::InProgress;
        self.stack.push(position);

        let declarations = self.declarations;
        let declaration = &declarations[position];
        let mut action = Action {
            id: declaration.id.clone(),
            name: declaration.name.clone(),
            depends_on: declaration.depends_on.clone(),
            routes: merge_and_sort(&declaration.routes, &[]),
            ws_routes: merge_and_sort(&declaration.ws_routes, &[]),
            endpoints: Vec::new(),
        };

        for dependency_id in &declaration.depends_on {
            let dependency_position = *self.index.get(dependency_id.as_str()).ok_or_else(|| {
                AuthzError::UnknownDependency {
                    action: declaration.id.clone(),
                    dependency: dependency_id.clone(),
                }
            })?;

            self.visit(dependency_position)?;

            if let Some(dependency) = &self.resolved[dependency_position] {
                action.merge(dependency);
            }
        }

        self.stack.pop();
        self.state[position] = Visit::Done;
        self.resolved[position] = Some(action);
        Ok(())
    }

    fn cycle_error(&self, position: usize) -> AuthzError {
        let start = self
            .stack
            .iter()
            .position(|&p| p == position)
            .unwrap_or(0);
        let mut cycle: Vec<&str> = self.stack[start..]
            .iter()
            .map(|&p| self.declarations[p].id.as_str())
            .collect();
        cycle.push(self.declarations[position].id.as_str());
        AuthzError::DependencyCycle(cycle.join(" -> "))
    }
}

/// The immutable set of resolved actions, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ActionCatalog {
    actions: Vec<Arc<Action>>,
    index: HashMap<String, usize>,
}

impl ActionCatalog {
    /// Parses the YAML action list and resolves it against the route registries.
    ///
    /// `routes` materializes REST endpoints, `ws_routes` websocket endpoints.
    pub fn load(yaml: &str, routes: &RouteRegistry, ws_routes: &RouteRegistry) -> Result<Self> {
        let declarations: Vec<ActionDeclaration> = serde_yaml::from_str(yaml)
            .map_err(|e| AuthzError::ActionParse(format!("loading actions from yaml: {}", e)))?;

        Self::from_declarations(&declarations, routes, ws_routes)
    }

    pub fn from_declarations(
        declarations: &[ActionDeclaration],
        routes: &RouteRegistry,
        ws_routes: &RouteRegistry,
    ) -> Result<Self> {
        let resolved = DependencyResolver::new(declarations)?.resolve_all()?;

        let mut catalog = Self::default();
        for mut action in resolved {
            action.endpoints = materialize_endpoints(&action, routes, ws_routes)?;
            debug!(
                action = %action.id,
                routes = action.routes.len(),
                ws_routes = action.ws_routes.len(),
                "action resolved"
            );
            catalog.index.insert(action.id.clone(), catalog.actions.len());
            catalog.actions.push(Arc::new(action));
        }

        info!("Loaded {} actions", catalog.actions.len());
        Ok(catalog)
    }

    /// Checks that every registered route belongs to at least one action.
    ///
    /// A route outside every action is reachable by admins only.
    pub fn validate_coverage(&self, routes: &RouteRegistry, ws_routes: &RouteRegistry) -> Result<()> {
        let assigned: HashSet<&str> = self
            .actions
            .iter()
            .flat_map(|action| action.routes.iter())
            .map(String::as_str)
            .collect();
        let assigned_ws: HashSet<&str> = self
            .actions
            .iter()
            .flat_map(|action| action.ws_routes.iter())
            .map(String::as_str)
            .collect();

        if let Some(name) = routes.names().find(|name| !assigned.contains(name)) {
            return Err(AuthzError::UnreachableRoute(name.to_string()));
        }
        if let Some(name) = ws_routes.names().find(|name| !assigned_ws.contains(name)) {
            return Err(AuthzError::UnreachableRoute(name.to_string()));
        }

        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Action>> {
        self.index.get(id).map(|&position| &self.actions[position])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Action>> {
        self.actions.iter()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Every endpoint of every action, sorted and deduplicated.
    pub fn all_endpoints(&self) -> Vec<Endpoint> {
        self.actions
            .iter()
            .flat_map(|action| action.endpoints.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

fn materialize_endpoints(
    action: &Action,
    routes: &RouteRegistry,
    ws_routes: &RouteRegistry,
) -> Result<Vec<Endpoint>> {
    let unknown = |route: &str| AuthzError::UnknownActionRoute {
        action: action.id.clone(),
        route: route.to_string(),
    };

    let mut endpoints = Vec::with_capacity(action.routes.len() + action.ws_routes.len());
    for name in &action.routes {
        let route = routes.get(name).ok_or_else(|| unknown(name))?;
        endpoints.push(Endpoint::api(route.method, route.path.clone()));
    }
    for name in &action.ws_routes {
        let route = ws_routes.get(name).ok_or_else(|| unknown(name))?;
        endpoints.push(Endpoint::ws(route.method, route.path.clone()));
    }

    Ok(endpoints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HttpVerb;

    fn registries() -> (RouteRegistry, RouteRegistry) {
        let mut routes = RouteRegistry::new();
        for (name, method, path) in [
            ("r1", HttpVerb::Get, "/r1"),
            ("r2", HttpVerb::Get, "/r2"),
            ("r3", HttpVerb::Post, "/r3"),
            ("health", HttpVerb::Get, "/health"),
            ("AppShow", HttpVerb::Get, "/namespaces/:namespace/applications/:app"),
        ] {
            routes.register(name, method, path).unwrap();
        }

        let mut ws_routes = RouteRegistry::new();
        ws_routes
            .register("AppLogs", HttpVerb::Get, "/namespaces/:namespace/applications/:app/logs")
            .unwrap();

        (routes, ws_routes)
    }

    fn load(yaml: &str) -> Result<ActionCatalog> {
        let (routes, ws_routes) = registries();
        ActionCatalog::load(yaml, &routes, &ws_routes)
    }

    #[test]
    fn test_dependency_merge_is_sorted_set_union() {
        let catalog = load(
            r#"
- id: B
  name: B
  routes: [r3, r2]
- id: A
  name: A
  dependsOn: [B]
  routes: [r2, r1]
"#,
        )
        .unwrap();

        assert_eq!(catalog.get("A").unwrap().routes, ["r1", "r2", "r3"]);
        assert_eq!(catalog.get("B").unwrap().routes, ["r2", "r3"]);
    }

    #[test]
    fn test_resolution_does_not_depend_on_declaration_order() {
        let catalog = load(
            r#"
- id: A
  name: A
  dependsOn: [B]
  routes: [r1]
- id: B
  name: B
  dependsOn: [C]
  routes: [r2]
- id: C
  name: C
  routes: [r3]
  wsRoutes: [AppLogs]
"#,
        )
        .unwrap();

        let a = catalog.get("A").unwrap();
        assert_eq!(a.routes, ["r1", "r2", "r3"]);
        assert_eq!(a.ws_routes, ["AppLogs"]);
        assert_eq!(a.endpoints.len(), 4);

        let ids: Vec<&str> = catalog.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["A", "B", "C"]);
    }

    #[test]
    fn test_unknown_dependency_is_fatal() {
        let err = load(
            r#"
- id: A
  name: A
  dependsOn: [missing]
"#,
        )
        .unwrap_err();

        match err {
            AuthzError::UnknownDependency { action, dependency } => {
                assert_eq!(action, "A");
                assert_eq!(dependency, "missing");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_dependency_cycle_is_fatal() {
        let err = load(
            r#"
- id: A
  name: A
  dependsOn: [B]
- id: B
  name: B
  dependsOn: [A]
"#,
        )
        .unwrap_err();

        match err {
            AuthzError::DependencyCycle(cycle) => assert_eq!(cycle, "A -> B -> A"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let err = load("- {id: A, name: A, dependsOn: [A]}").unwrap_err();
        assert!(matches!(err, AuthzError::DependencyCycle(_)));
    }

    #[test]
    fn test_duplicate_action_is_fatal() {
        let err = load("- {id: A, name: A}\n- {id: A, name: Again}").unwrap_err();
        assert!(matches!(err, AuthzError::DuplicateAction(id) if id == "A"));
    }

    #[test]
    fn test_malformed_yaml_is_fatal() {
        assert!(matches!(
            load("- id: A\n  nmae: typo").unwrap_err(),
            AuthzError::ActionParse(_)
        ));
        assert!(matches!(
            load("not: a list").unwrap_err(),
            AuthzError::ActionParse(_)
        ));
    }

    #[test]
    fn test_unknown_route_is_fatal() {
        let err = load("- {id: A, name: A, routes: [nope]}").unwrap_err();
        assert!(matches!(
            err,
            AuthzError::UnknownActionRoute { action, route } if action == "A" && route == "nope"
        ));

        // websocket names are looked up in the websocket registry only
        let err = load("- {id: A, name: A, wsRoutes: [r1]}").unwrap_err();
        assert!(matches!(err, AuthzError::UnknownActionRoute { .. }));
    }

    #[test]
    fn test_endpoints_use_base_paths() {
        let catalog = load("- {id: A, name: A, routes: [AppShow], wsRoutes: [AppLogs]}").unwrap();
        let action = catalog.get("A").unwrap();

        assert!(action.is_allowed("GET", "/api/v1/namespaces/:namespace/applications/:app"));
        assert!(action.is_allowed(
            "GET",
            "/wapi/v1/namespaces/:namespace/applications/:app/logs"
        ));
        assert!(!action.is_allowed("GET", "/api/v1/namespaces/:namespace/applications/:app/logs"));
        assert!(!action.is_allowed("DELETE", "/api/v1/namespaces/:namespace/applications/:app"));
        assert!(!action.is_allowed("GET", "/api/v1/namespaces/ws/applications/myapp"));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut a = Action::new("A", "A");
        a.routes = vec!["r1".into(), "r2".into()];
        let mut b = Action::new("B", "B");
        b.routes = vec!["r2".into(), "r3".into()];

        a.merge(&b);
        let once = a.routes.clone();
        a.merge(&b);
        assert_eq!(a.routes, once);
        assert_eq!(once, ["r1", "r2", "r3"]);
    }

    #[test]
    fn test_validate_coverage() {
        let (routes, ws_routes) = registries();
        let catalog = ActionCatalog::load(
            "- {id: A, name: A, routes: [r1, r2, r3, health], wsRoutes: [AppLogs]}",
            &routes,
            &ws_routes,
        )
        .unwrap();

        let err = catalog.validate_coverage(&routes, &ws_routes).unwrap_err();
        assert!(matches!(err, AuthzError::UnreachableRoute(name) if name == "AppShow"));

        let catalog = ActionCatalog::load(
            "- {id: A, name: A, routes: [r1, r2, r3, health, AppShow], wsRoutes: [AppLogs]}",
            &routes,
            &ws_routes,
        )
        .unwrap();
        assert!(catalog.validate_coverage(&routes, &ws_routes).is_ok());
    }

    #[test]
    fn test_all_endpoints_are_deduplicated() {
        let catalog = load(
            r#"
- {id: A, name: A, routes: [r1, r2]}
- {id: B, name: B, dependsOn: [A], routes: [r3]}
"#,
        )
        .unwrap();

        assert_eq!(catalog.all_endpoints().len(), 3);
    }
}
