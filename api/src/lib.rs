use authz::{AuthzEngine, HttpVerb, RouteRegistry};
use axum::{
    middleware,
    routing::{get, MethodFilter, MethodRouter},
    Json, Router,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;

pub mod error;
pub mod handlers;
pub mod middleware_hooks;
pub mod models;
pub mod routes;
pub mod server;


// Re-export server functions for convenience
pub use server::{start_server, start_server_with_config, ApiConfig};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AuthzEngine>,
    pub users: Arc<user::UserManager>,
    /// Request paths only admins may call, whatever their roles grant.
    pub admin_routes: Arc<HashSet<String>>,
}

impl AppState {
    pub fn new(engine: Arc<AuthzEngine>, users: Arc<user::UserManager>) -> Self {
        Self {
            engine,
            users,
            admin_routes: Arc::new(HashSet::new()),
        }
    }

    pub fn with_admin_routes<I, S>(mut self, routes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.admin_routes = Arc::new(routes.into_iter().map(Into::into).collect());
        self
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health_check,
        handlers::me::me,
    ),
    components(
        schemas(
            models::HealthResponse,
            models::AuthzSummary,
            models::MeResponse,
            models::RoleResponse,
            error::ApiErrorResponse,
            error::ErrorDetail,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "users", description = "Authenticated user information"),
    ),
    info(
        title = "PaaS API",
        version = "1.0.0",
        description = "Role based access control for the PaaS API",
    ),
)]
pub struct ApiDoc;

fn method_filter(method: HttpVerb) -> MethodFilter {
    match method {
        HttpVerb::Get => MethodFilter::GET,
        HttpVerb::Post => MethodFilter::POST,
        HttpVerb::Put => MethodFilter::PUT,
        HttpVerb::Patch => MethodFilter::PATCH,
        HttpVerb::Delete => MethodFilter::DELETE,
    }
}

/// Mounts every route of `registry` under `base_path`, methods grouped per path.
fn mount_registry(
    mut router: Router<AppState>,
    registry: &RouteRegistry,
    base_path: &str,
) -> Router<AppState> {
    let mut paths: BTreeMap<String, MethodRouter<AppState>> = BTreeMap::new();
    for route in registry.iter() {
        let full_path = format!("{}{}", base_path, route.path);
        let method_router = paths.remove(&full_path).unwrap_or_else(MethodRouter::new);
        paths.insert(
            full_path,
            method_router.on(method_filter(route.method), handlers::resource::not_implemented),
        );
    }

    for (path, method_router) in paths {
        router = router.route(&path, method_router);
    }
    router
}

/// Create the main API router with all routes and middleware
///
/// Every registered PaaS route passes, in order, through authentication, role
/// authorization, namespace authorization and gitconfig authorization.
pub fn create_router(state: AppState) -> Router {
    let resources = mount_registry(Router::new(), state.engine.routes(), authz::API_BASE_PATH);
    let resources = mount_registry(resources, state.engine.ws_routes(), authz::WS_BASE_PATH)
        // route_layer: last added runs first
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            middleware_hooks::gitconfig_authorization,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            middleware_hooks::namespace_authorization,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            middleware_hooks::role_authorization,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            middleware_hooks::authentication,
        ));

    let account = Router::new()
        .route("/api/v1/me", get(handlers::me::me))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            middleware_hooks::authentication,
        ));

    Router::new()
        .merge(resources)
        .merge(account)
        .route("/api/v1/health", get(handlers::health::health_check))
        .route(
            "/api/v1/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .layer(middleware::from_fn(middleware_hooks::response_middleware))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
