use axum::{extract::MatchedPath, http::Method};
use tracing::debug;

use crate::error::{ApiError, ApiResult};

/// Terminal handler for authorized PaaS routes.
///
/// Resource backends are mounted by the deployment, not by this server, so an
/// authorized request that reaches this point answers 501.
pub async fn not_implemented(method: Method, matched_path: MatchedPath) -> ApiResult<()> {
    debug!("No backend for {} {}", method, matched_path.as_str());
    Err(ApiError::NotImplemented(format!(
        "{} {}",
        method,
        matched_path.as_str()
    )))
}
