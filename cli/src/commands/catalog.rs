use crate::commands::config::{load_engine, ServerConfig};
use crate::utils::env_paths::EnvPaths;
use anyhow::{Context, Result};
use authz::{ActionCatalog, Endpoint, Route, RouteRegistry, API_BASE_PATH, WS_BASE_PATH};
use colored::*;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct RouteRow {
    name: String,
    method: String,
    path: String,
    websocket: bool,
}

#[derive(Debug, Serialize)]
struct RoleRow {
    id: String,
    name: String,
    default: bool,
    actions: Vec<String>,
    endpoints: Vec<String>,
}

fn print_serialized<T: Serialize>(format: &str, value: &T) -> Result<bool> {
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(value)?),
        "yaml" => println!("{}", serde_yaml::to_string(value)?),
        _ => return Ok(false),
    }
    Ok(true)
}

fn endpoint_label(endpoint: &Endpoint) -> String {
    format!("{} {}", endpoint.method.as_str(), endpoint.full_path())
}

fn route_row(route: &Route, base_path: &str, websocket: bool) -> RouteRow {
    RouteRow {
        name: route.name.clone(),
        method: route.method.as_str().to_string(),
        path: format!("{}{}", base_path, route.path),
        websocket,
    }
}

fn registries() -> Result<(RouteRegistry, RouteRegistry)> {
    let routes = api::routes::api_routes().context("Invalid route table")?;
    let ws_routes = api::routes::ws_routes().context("Invalid websocket route table")?;
    Ok((routes, ws_routes))
}

/// List every registered route
pub async fn routes(format: String) -> Result<()> {
    let (routes, ws_routes) = registries()?;

    let rows: Vec<RouteRow> = routes
        .iter()
        .map(|route| route_row(route, API_BASE_PATH, false))
        .chain(ws_routes.iter().map(|route| route_row(route, WS_BASE_PATH, true)))
        .collect();

    if print_serialized(&format, &rows)? {
        return Ok(());
    }

    println!("{}", "=== Routes ===".bold());
    println!();
    for row in &rows {
        let kind = if row.websocket { " (ws)" } else { "" };
        println!(
            "  {:<7} {} {}{}",
            row.method.green(),
            row.path,
            row.name.cyan(),
            kind.dimmed()
        );
    }
    println!();
    println!("Total routes: {}", rows.len());

    Ok(())
}

/// List the resolved action catalog
pub async fn actions(format: String) -> Result<()> {
    let (routes, ws_routes) = registries()?;
    let catalog = ActionCatalog::load(api::routes::ACTIONS_YAML, &routes, &ws_routes)
        .context("Invalid action catalog")?;
    catalog
        .validate_coverage(&routes, &ws_routes)
        .context("Invalid action catalog")?;

    let actions: Vec<&authz::Action> = catalog.iter().map(|action| action.as_ref()).collect();
    if print_serialized(&format, &actions)? {
        return Ok(());
    }

    println!("{}", "=== Actions ===".bold());
    println!();
    for action in &actions {
        println!("{} ({})", action.id.cyan().bold(), action.name);
        if !action.depends_on.is_empty() {
            println!("  {}: {}", "depends on".yellow(), action.depends_on.join(", "));
        }
        for endpoint in &action.endpoints {
            println!("  {}", endpoint_label(endpoint));
        }
        println!();
    }
    println!("Total actions: {}", actions.len());

    Ok(())
}

/// List the role catalog and the endpoints each role reaches
pub async fn roles(format: String) -> Result<()> {
    let env_paths = EnvPaths::load()?;
    let config = ServerConfig::load(&env_paths)?;
    let engine = load_engine(&env_paths, &config).await?;

    let rows: Vec<RoleRow> = engine
        .roles()
        .iter()
        .map(|role| RoleRow {
            id: role.id.clone(),
            name: role.name.clone(),
            default: role.default,
            actions: role.actions.iter().map(|action| action.id.clone()).collect(),
            endpoints: engine
                .allowed_endpoints(role)
                .iter()
                .map(endpoint_label)
                .collect(),
        })
        .collect();

    if print_serialized(&format, &rows)? {
        return Ok(());
    }

    println!("{}", "=== Roles ===".bold());
    println!();
    for row in &rows {
        let marker = if row.default { " [default]" } else { "" };
        println!("{} ({}){}", row.id.cyan().bold(), row.name, marker.yellow());
        if !row.actions.is_empty() {
            println!("  {}: {}", "actions".yellow(), row.actions.join(", "));
        }
        println!("  {}: {}", "endpoints".yellow(), row.endpoints.len());
        println!();
    }
    println!("Total roles: {}", rows.len());

    Ok(())
}
