use authz::{authorize_resource, User};
use axum::{
    body::Body,
    extract::{MatchedPath, RawPathParams, State},
    http::{header, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::AppState;

/// Authentication middleware using HTTP Basic credentials
///
/// Verifies the credentials against the user store and stores the resolved
/// [`User`] in the request extensions for the authorization middlewares and
/// handlers that follow.
///
/// # Security Notes
///
/// - Unknown users and wrong passwords produce the same 401 response
/// - The password is never logged
pub async fn authentication(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let (username, password) = basic_credentials(&request).ok_or_else(|| {
        debug!("AUTHN MIDDLEWARE: missing or malformed credentials");
        ApiError::Unauthorized
    })?;

    let user = state.users.authenticate(&username, &password).await?;
    debug!("AUTHN MIDDLEWARE: authenticated user {}", user.username);

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Extracts `(username, password)` from an `Authorization: Basic` header.
pub fn basic_credentials(request: &Request<Body>) -> Option<(String, String)> {
    let value = request.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

fn authenticated_user(request: &Request<Body>) -> Result<&User, ApiError> {
    request.extensions().get::<User>().ok_or_else(|| {
        warn!("AUTHZ MIDDLEWARE: no authenticated user on request");
        ApiError::Unauthorized
    })
}

/// Path parameters by name.
pub fn collect_params(params: Option<&RawPathParams>) -> HashMap<String, String> {
    params
        .map(|params| {
            params
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

/// Role authorization middleware
///
/// Checks the user's roles against the matched route template (including the
/// `/api/v1` or `/wapi/v1` base path) and the path parameters.
///
/// # Authorization Flow
///
/// 1. Take the user stored by [`authentication`]
/// 2. Take the route template the request matched
/// 3. Collect the path parameters by name
/// 4. Ask the engine for a decision
/// 5. Return 403 "user unauthorized" on deny, pass through on allow
///
/// # Security Notes
///
/// - Deny-by-default: a request without a matched route is denied
/// - The response never says which rule failed
pub async fn role_authorization(
    State(state): State<AppState>,
    matched_path: Option<MatchedPath>,
    params: Option<RawPathParams>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let method = request.method().as_str().to_string();
    let user = authenticated_user(&request)?;

    let Some(matched_path) = matched_path else {
        warn!("AUTHZ MIDDLEWARE: no matched route for {} {}", method, request.uri());
        return Err(ApiError::unauthorized_user());
    };

    let params = collect_params(params.as_ref());
    info!(
        "AUTHZ MIDDLEWARE: Processing {} request to {} for {}",
        method,
        matched_path.as_str(),
        user.username
    );

    if state
        .engine
        .is_allowed(user, &method, matched_path.as_str(), &params)
    {
        info!(
            "AUTHZ MIDDLEWARE: Access ALLOWED for {} {} {}",
            user.username,
            method,
            matched_path.as_str()
        );
        Ok(next.run(request).await)
    } else {
        warn!(
            "AUTHZ MIDDLEWARE: Access DENIED for {} {} {}",
            user.username,
            method,
            matched_path.as_str()
        );
        Err(ApiError::unauthorized_user())
    }
}

/// Namespace authorization middleware
///
/// The requested namespaces, from the `namespace` path parameter or the
/// `namespaces[]` query array, must all be namespaces of the user.
pub async fn namespace_authorization(
    State(state): State<AppState>,
    params: Option<RawPathParams>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let user = authenticated_user(&request)?;
    let params = collect_params(params.as_ref());
    check_resources(&state, user, &request, &params, "namespace", &user.namespaces)?;
    Ok(next.run(request).await)
}

/// Gitconfig authorization middleware
///
/// Same rules as [`namespace_authorization`], for the `gitconfig` path
/// parameter and the `gitconfigs[]` query array.
pub async fn gitconfig_authorization(
    State(state): State<AppState>,
    params: Option<RawPathParams>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let user = authenticated_user(&request)?;
    let params = collect_params(params.as_ref());
    check_resources(&state, user, &request, &params, "gitconfig", &user.gitconfigs)?;
    Ok(next.run(request).await)
}

fn check_resources(
    state: &AppState,
    user: &User,
    request: &Request<Body>,
    params: &HashMap<String, String>,
    label: &str,
    allowed: &[String],
) -> Result<(), ApiError> {
    info!(
        "AUTHZ MIDDLEWARE: {} authorization for {} (roles: {}) on {} {}",
        label,
        user.username,
        user.roles.ids().join(","),
        request.method(),
        request.uri().path()
    );

    authorize_resources(
        user,
        &state.admin_routes,
        request.uri().path(),
        request.uri().query(),
        params,
        label,
        allowed,
    )
}

/// Resource decision behind [`namespace_authorization`] and
/// [`gitconfig_authorization`].
///
/// Admins pass. Paths in `admin_routes` are denied to everyone else. The
/// resources come from the `<label>s[]` query array when present, otherwise
/// from the `<label>` path parameter, and each must be in `allowed`.
pub fn authorize_resources(
    user: &User,
    admin_routes: &HashSet<String>,
    path: &str,
    query: Option<&str>,
    params: &HashMap<String, String>,
    label: &str,
    allowed: &[String],
) -> Result<(), ApiError> {
    if user.is_admin() {
        debug!("AUTHZ MIDDLEWARE: user {} is admin", user.username);
        return Ok(());
    }

    if admin_routes.contains(path) {
        warn!("AUTHZ MIDDLEWARE: {} is an admin route, {} denied", path, user.username);
        return Err(ApiError::unauthorized_user());
    }

    let query_key = format!("{}s[]", label);
    let resources = match query.and_then(|q| query_array(q, &query_key)) {
        Some(resources) => resources,
        None => vec![params.get(label).cloned().unwrap_or_default()],
    };

    for resource in &resources {
        let authorized = authorize_resource(resource, allowed);
        info!(
            "AUTHZ MIDDLEWARE: {} {} for {}: authorized={}",
            label, resource, user.username, authorized
        );
        if !authorized {
            return Err(ApiError::unauthorized_for(label));
        }
    }

    Ok(())
}

/// Values of a repeated query parameter, or `None` if the key is absent.
pub fn query_array(query: &str, key: &str) -> Option<Vec<String>> {
    let decode = |raw: &str| {
        let raw = raw.replace('+', " ");
        urlencoding::decode(&raw)
            .map(|decoded| decoded.into_owned())
            .unwrap_or(raw)
    };

    let values: Vec<String> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode(name) == key).then(|| decode(value))
        })
        .collect();

    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}

/// Response processing middleware hook
///
/// Tags every response with the server version.
pub async fn response_middleware(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        "X-Paas-Version",
        HeaderValue::from_static(env!("CARGO_PKG_VERSION")),
    );
    response
}
