use axum::{
    body::Body as AxumBody,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;

use crate::web::models::decode_token;
use crate::web::{AppState, error::AppError};

/// Decodes the `Authorization: Bearer` token and attaches an
/// `AuthenticatedUser` extension for the handlers.
pub async fn auth(
    State(state): State<Arc<AppState>>,
    mut req: Request<AxumBody>,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .ok_or(AppError::InvalidCredentials)?;

    let authenticated_user = decode_token(token, &state.config.jwt_secret).map_err(|e| {
        warn!(error = ?e, "JWT decoding error during auth middleware.");
        AppError::InvalidCredentials
    })?;

    req.extensions_mut().insert(authenticated_user);
    Ok(next.run(req).await)
}
