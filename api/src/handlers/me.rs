use authz::User;
use axum::{extract::State, response::IntoResponse, Extension, Json};
use tracing::debug;

use crate::{
    error::{ApiErrorResponse, ApiResult},
    models::MeResponse,
    AppState,
};

/// The authenticated user, with the endpoints each of its roles reaches
///
/// GET /api/v1/me
#[utoipa::path(
    get,
    path = "/api/v1/me",
    responses(
        (status = 200, description = "Authenticated user", body = MeResponse),
        (status = 401, description = "Missing or invalid credentials", body = ApiErrorResponse)
    ),
    tag = "users"
)]
pub async fn me(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> ApiResult<impl IntoResponse> {
    debug!("Describing user {}", user.username);
    Ok(Json(MeResponse::new(&user, &state.engine)))
}
