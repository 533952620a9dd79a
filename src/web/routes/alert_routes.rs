use axum::{
    Json, Router,
    extract::{Extension, Path, Query, State},
    routing::{delete, get, put},
};
use std::sync::Arc;

use crate::db::models::{Alert, AlertCounts};
use crate::db::store::AlertFilter;
use crate::web::{
    AppError, AppState,
    models::{AuthenticatedUser, CountResponse, DeletedResponse, ModifiedResponse},
};

pub fn create_alert_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_alerts_handler))
        .route("/counts", get(get_alert_counts_handler))
        .route("/unread/count", get(get_unread_count_handler))
        .route("/mark-all-read", put(mark_all_read_handler))
        .route("/clear-all", delete(clear_all_handler))
        .route("/{id}", get(get_alert_handler))
        .route("/{id}/read", put(mark_as_read_handler))
        .route("/{id}/resolve", put(resolve_alert_handler))
}

async fn get_alerts_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    Query(filter): Query<AlertFilter>,
) -> Result<Json<Vec<Alert>>, AppError> {
    let alerts = app_state
        .alert_service
        .list(&authenticated_user, &filter)
        .await?;
    Ok(Json(alerts))
}

async fn get_alert_counts_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(authenticated_user): Extension<AuthenticatedUser>,
) -> Result<Json<AlertCounts>, AppError> {
    let counts = app_state.alert_service.counts(&authenticated_user).await?;
    Ok(Json(counts))
}

async fn get_unread_count_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(authenticated_user): Extension<AuthenticatedUser>,
) -> Result<Json<CountResponse>, AppError> {
    let count = app_state
        .alert_service
        .unread_count(&authenticated_user)
        .await?;
    Ok(Json(CountResponse { count }))
}

async fn mark_all_read_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(authenticated_user): Extension<AuthenticatedUser>,
) -> Result<Json<ModifiedResponse>, AppError> {
    let modified_count = app_state
        .alert_service
        .mark_all_read(&authenticated_user)
        .await?;
    Ok(Json(ModifiedResponse { modified_count }))
}

async fn clear_all_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(authenticated_user): Extension<AuthenticatedUser>,
) -> Result<Json<DeletedResponse>, AppError> {
    let deleted_count = app_state
        .alert_service
        .clear_all(&authenticated_user)
        .await?;
    Ok(Json(DeletedResponse { deleted_count }))
}

async fn get_alert_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> Result<Json<Alert>, AppError> {
    let alert = app_state.alert_service.get(&authenticated_user, id).await?;
    Ok(Json(alert))
}

async fn mark_as_read_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> Result<Json<Alert>, AppError> {
    let alert = app_state
        .alert_service
        .mark_as_read(&authenticated_user, id)
        .await?;
    Ok(Json(alert))
}

async fn resolve_alert_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(authenticated_user): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> Result<Json<Alert>, AppError> {
    let alert = app_state
        .alert_service
        .resolve(&authenticated_user, id)
        .await?;
    Ok(Json(alert))
}
