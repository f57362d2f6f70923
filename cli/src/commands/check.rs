use crate::commands::config::{load_engine, load_user_manager, ServerConfig};
use crate::utils::env_paths::EnvPaths;
use anyhow::{anyhow, Context, Result};
use api::middleware_hooks::authorize_resources;
use authz::{AuthzEngine, User, API_BASE_PATH, WS_BASE_PATH};
use colored::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Outcome of evaluating one request through the authorization chain
#[derive(Debug, Serialize)]
pub struct Decision {
    pub user: String,
    pub method: String,
    pub path: String,
    pub route: Option<String>,
    pub template: Option<String>,
    pub params: BTreeMap<String, String>,
    pub roles: Vec<String>,
    pub allowed: bool,
    pub reason: String,
}

/// The request the server would see, split into path and query.
struct CheckedRequest<'a> {
    method: String,
    path: &'a str,
    query: &'a str,
}

impl<'a> CheckedRequest<'a> {
    fn parse(method: &str, target: &'a str) -> Self {
        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        Self {
            method: method.to_uppercase(),
            path,
            query,
        }
    }
}

/// Evaluates `method target` for `user` the way the API server would.
pub fn evaluate(
    engine: &AuthzEngine,
    admin_routes: &HashSet<String>,
    user: &User,
    method: &str,
    target: &str,
) -> Decision {
    let request = CheckedRequest::parse(method, target);
    let mut decision = Decision {
        user: user.username.clone(),
        method: request.method.clone(),
        path: request.path.to_string(),
        route: None,
        template: None,
        params: BTreeMap::new(),
        roles: user.roles.ids(),
        allowed: false,
        reason: "no matching route".to_string(),
    };

    let (registry, base, rest) = if let Some(rest) = request.path.strip_prefix(WS_BASE_PATH) {
        (engine.ws_routes(), WS_BASE_PATH, rest)
    } else if let Some(rest) = request.path.strip_prefix(API_BASE_PATH) {
        (engine.routes(), API_BASE_PATH, rest)
    } else {
        return decision;
    };

    let Some((route, params)) = registry.match_request(&request.method, rest) else {
        return decision;
    };
    let template = format!("{}{}", base, route.path);
    decision.route = Some(route.name.clone());
    decision.template = Some(template.clone());
    decision.params = params.iter().map(|(k, v)| (k.clone(), v.clone())).collect();

    if !engine.is_allowed(user, &request.method, &template, &params) {
        decision.reason = "user unauthorized".to_string();
        return decision;
    }

    let checks = [
        ("namespace", &user.namespaces),
        ("gitconfig", &user.gitconfigs),
    ];
    for (label, allowed) in checks {
        let query = (!request.query.is_empty()).then_some(request.query);
        if let Err(denied) =
            authorize_resources(user, admin_routes, request.path, query, &params, label, allowed)
        {
            decision.reason = denied.to_string();
            return decision;
        }
    }

    decision.allowed = true;
    decision.reason = "allowed".to_string();
    decision
}

/// Evaluate a request for a user from the users file
///
/// Returns whether the request is allowed.
pub async fn execute(username: String, method: String, target: String, format: String) -> Result<bool> {
    let env_paths = EnvPaths::load()?;
    let config = ServerConfig::load(&env_paths)?;
    let engine = Arc::new(load_engine(&env_paths, &config).await?);
    let users = load_user_manager(&env_paths, &config, Arc::clone(&engine)).await?;

    let user = users
        .get_user_by_username(&username)
        .await
        .with_context(|| format!("Cannot check access for '{}'", username))?;
    if !target.starts_with('/') {
        return Err(anyhow!("Request path must be absolute, got '{}'", target));
    }

    let admin_routes: HashSet<String> = config.admin_routes.iter().cloned().collect();
    let decision = evaluate(&engine, &admin_routes, &user, &method, &target);

    match format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&decision)?),
        "yaml" => println!("{}", serde_yaml::to_string(&decision)?),
        _ => print_decision_text(&decision),
    }

    Ok(decision.allowed)
}

fn print_decision_text(decision: &Decision) {
    println!("{}", "=== Access Check ===".bold());
    println!();
    println!("  {}: {}", "User".cyan(), decision.user);
    println!("  {}: {}", "Roles".cyan(), decision.roles.join(", "));
    println!("  {}: {} {}", "Request".cyan(), decision.method, decision.path);
    if let (Some(route), Some(template)) = (&decision.route, &decision.template) {
        println!("  {}: {} ({})", "Route".cyan(), route, template);
    }
    for (name, value) in &decision.params {
        println!("    {} = {}", name, value);
    }
    println!();

    if decision.allowed {
        println!("{} {}", "Decision:".bold(), "ALLOWED".green().bold());
    } else {
        println!(
            "{} {} ({})",
            "Decision:".bold(),
            "DENIED".red().bold(),
            decision.reason
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use authz::{Role, Roles};
    use user::ConfigMapRolesGetter;

    const ROLES: &str = r#"
- name: paas-role-viewer
  data:
    id: viewer
    name: Viewer
    actions: |
      app_read
"#;

    async fn engine() -> AuthzEngine {
        api::routes::init_engine(&ConfigMapRolesGetter::from_yaml(ROLES))
            .await
            .unwrap()
    }

    fn viewer(engine: &AuthzEngine) -> User {
        let roles: Roles = vec![engine.roles().find_by_id("viewer").cloned().unwrap()].into();
        User {
            roles,
            namespaces: vec!["ws1".to_string()],
            ..User::new("viewer")
        }
    }

    #[tokio::test]
    async fn test_evaluate_allows_own_namespace() {
        let engine = engine().await;
        let decision = evaluate(
            &engine,
            &HashSet::new(),
            &viewer(&engine),
            "get",
            "/api/v1/namespaces/ws1/applications/app",
        );

        assert!(decision.allowed, "{}", decision.reason);
        assert_eq!(decision.route.as_deref(), Some("AppShow"));
        assert_eq!(
            decision.template.as_deref(),
            Some("/api/v1/namespaces/:namespace/applications/:app")
        );
        assert_eq!(decision.params["app"], "app");
    }

    #[tokio::test]
    async fn test_evaluate_denials() {
        let engine = engine().await;
        let user = viewer(&engine);
        let none = HashSet::new();

        let decision = evaluate(&engine, &none, &user, "GET", "/api/v1/namespaces/ws2/applications");
        assert_eq!(decision.reason, "user unauthorized for namespace");

        let decision = evaluate(&engine, &none, &user, "DELETE", "/api/v1/namespaces/ws1/applications/app");
        assert_eq!(decision.reason, "user unauthorized");

        let decision = evaluate(&engine, &none, &user, "GET", "/elsewhere");
        assert_eq!(decision.reason, "no matching route");
        assert!(!decision.allowed);
    }

    #[tokio::test]
    async fn test_evaluate_admin_routes_and_query_arrays() {
        let engine = engine().await;
        let user = viewer(&engine);
        let admin_routes: HashSet<String> = ["/api/v1/namespaces".to_string()].into();

        let decision = evaluate(&engine, &admin_routes, &user, "GET", "/api/v1/namespaces");
        assert_eq!(decision.reason, "user unauthorized");

        let admin = User {
            roles: vec![Role::admin()].into(),
            ..User::new("admin")
        };
        let decision = evaluate(
            &engine,
            &admin_routes,
            &admin,
            "DELETE",
            "/api/v1/namespaces?namespaces[]=ws1&namespaces[]=ws2",
        );
        assert!(decision.allowed);

        let decision = evaluate(
            &engine,
            &HashSet::new(),
            &user,
            "GET",
            "/api/v1/namespaces/ws1/applications?namespaces[]=ws2",
        );
        assert_eq!(decision.reason, "user unauthorized for namespace");
    }

    #[tokio::test]
    async fn test_evaluate_websocket_route() {
        let engine = engine().await;
        let decision = evaluate(
            &engine,
            &HashSet::new(),
            &viewer(&engine),
            "GET",
            "/wapi/v1/namespaces/ws1/applications/app/logs",
        );
        assert_eq!(decision.route.as_deref(), Some("AppLogs"));
        assert!(!decision.allowed);
    }
}
