use axum::{
    Router,
    http::Method,
    middleware as axum_middleware,
    routing::get,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::alerting::AlertService;
use crate::realtime::RoomHub;
use crate::server::config::ServerConfig;
use crate::web::middleware::auth;
use crate::web::routes::alert_routes;

pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod websocket_handler;

pub use error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub alert_service: Arc<AlertService>,
    pub hub: Arc<RoomHub>,
    pub config: Arc<ServerConfig>,
}

async fn health_check_handler() -> &'static str {
    "OK"
}

pub fn create_axum_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(vec![
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health_check_handler))
        .route("/ws", get(websocket_handler::websocket_handler))
        .nest(
            "/api/alerts",
            alert_routes::create_alert_router()
                .route_layer(axum_middleware::from_fn_with_state(app_state.clone(), auth::auth)),
        )
        .with_state(app_state)
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::enums::{AlertType, Severity};
    use crate::db::memory::MemoryStore;
    use crate::db::models::{Alert, NewAlert, UserId};
    use crate::db::store::AlertStore;
    use crate::notifications::service::NotificationService;
    use crate::notifications::service::tests::{RecordingSender, owner_with_all_channels};
    use crate::realtime::RealtimePublisher;
    use crate::web::models::tests::token_for;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use futures::{SinkExt, StreamExt};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
    use tower::ServiceExt;

    const SECRET: &str = "test-secret";

    fn test_config() -> ServerConfig {
        ServerConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            database_url: None,
            jwt_secret: SECRET.to_string(),
            check_tick_secs: 60,
            max_concurrent_checks: 4,
            latency_alert_cooldown_secs: 900,
            webhook_secret: None,
            email_relay_url: None,
            email_api_key: None,
            email_from: "alerts@test".to_string(),
            sms_gateway_url: None,
            log_dir: "logs".to_string(),
        }
    }

    fn state() -> (Arc<AppState>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store.insert_owner(owner_with_all_channels(1));
        store.insert_owner(owner_with_all_channels(2));
        let hub = Arc::new(RoomHub::new());
        let notifications = Arc::new(NotificationService::new(
            Arc::new(RecordingSender::default()),
            Arc::new(RecordingSender::default()),
            Arc::new(RecordingSender::default()),
        ));
        let alert_service = Arc::new(AlertService::new(
            store.clone(),
            store.clone(),
            RealtimePublisher::new(hub.clone()),
            notifications,
            900,
        ));
        let state = Arc::new(AppState {
            alert_service,
            hub,
            config: Arc::new(test_config()),
        });
        (state, store)
    }

    async fn seed_alert(store: &MemoryStore, owner: i64) -> Alert {
        store
            .create(NewAlert {
                owner_id: UserId(owner),
                monitor_id: 1,
                alert_type: AlertType::Downtime,
                severity: Severity::Critical,
                message: "orders is down".to_string(),
                details: serde_json::json!({}),
            })
            .await
            .unwrap()
    }

    async fn call(app: Router, method: &str, uri: &str, user: Option<i64>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(
                header::AUTHORIZATION,
                format!("Bearer {}", token_for(user, SECRET)),
            );
        }
        let response = app.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn test_alert_routes_require_bearer_token() {
        let (state, _) = state();
        let (status, body) = call(create_axum_router(state), "GET", "/api/alerts", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid credentials");
    }

    #[tokio::test]
    async fn test_list_and_unread_count_are_owner_scoped() {
        let (state, store) = state();
        seed_alert(&store, 1).await;
        seed_alert(&store, 1).await;
        seed_alert(&store, 2).await;
        let app = create_axum_router(state);

        let (status, body) =
            call(app.clone(), "GET", "/api/alerts?severity=Critical", Some(1)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);

        let (_, body) = call(app.clone(), "GET", "/api/alerts/unread/count", Some(2)).await;
        assert_eq!(body["count"], 1);

        let (_, body) = call(app, "GET", "/api/alerts/counts", Some(1)).await;
        assert_eq!(body["unresolved"], 2);
        assert_eq!(body["resolved"], 0);
    }

    #[tokio::test]
    async fn test_read_and_resolve_enforce_ownership() {
        let (state, store) = state();
        let alert = seed_alert(&store, 1).await;
        let app = create_axum_router(state);

        let uri = format!("/api/alerts/{}/read", alert.id);
        let (status, _) = call(app.clone(), "PUT", &uri, Some(2)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = call(app.clone(), "PUT", &uri, Some(1)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["read"], true);

        let (status, _) = call(app.clone(), "PUT", "/api/alerts/4242/resolve", Some(1)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let uri = format!("/api/alerts/{}/resolve", alert.id);
        let (status, body) = call(app, "PUT", &uri, Some(1)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["resolved"], true);
    }

    #[tokio::test]
    async fn test_bulk_routes_report_counts() {
        let (state, store) = state();
        seed_alert(&store, 1).await;
        seed_alert(&store, 1).await;
        seed_alert(&store, 2).await;
        let app = create_axum_router(state);

        let (_, body) = call(app.clone(), "PUT", "/api/alerts/mark-all-read", Some(1)).await;
        assert_eq!(body["modifiedCount"], 2);

        let (_, body) = call(app.clone(), "DELETE", "/api/alerts/clear-all", Some(1)).await;
        assert_eq!(body["deletedCount"], 2);

        assert_eq!(store.alerts_for(UserId(2)).len(), 1);
    }

    #[tokio::test]
    async fn test_health_check() {
        let (state, _) = state();
        let response = create_axum_router(state)
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    async fn next_event(
        ws: &mut (impl StreamExt<Item = Result<WsMessage, WsError>> + Unpin),
    ) -> Value {
        loop {
            match ws.next().await.unwrap().unwrap() {
                WsMessage::Text(text) => {
                    return serde_json::from_str(text.as_str()).unwrap_or(Value::Null);
                }
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn test_websocket_join_by_token_receives_room_events() {
        let (state, store) = state();
        seed_alert(&store, 1).await;
        let service = state.alert_service.clone();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = create_axum_router(state);
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
            .await
            .unwrap();

        ws.send(WsMessage::Text("ping".into())).await.unwrap();
        match ws.next().await.unwrap().unwrap() {
            WsMessage::Text(text) => assert_eq!(text.as_str(), "pong"),
            other => panic!("unexpected frame {other:?}"),
        }

        let join = serde_json::json!({ "type": "join", "token": token_for(1, SECRET) });
        ws.send(WsMessage::Text(join.to_string().into())).await.unwrap();
        let joined = next_event(&mut ws).await;
        assert_eq!(joined["event"], "joined");
        assert_eq!(joined["payload"]["userId"], 1);

        service.mark_all_read(UserId(1)).await.unwrap();
        assert_eq!(next_event(&mut ws).await["event"], "markAllRead");
        assert_eq!(next_event(&mut ws).await["event"], "refreshUnreadCount");
    }

    #[tokio::test]
    async fn test_websocket_join_by_raw_id_and_disconnect_leaves_room() {
        let (state, _) = state();
        let hub = state.hub.clone();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = create_axum_router(state);
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
            .await
            .unwrap();
        ws.send(WsMessage::Text(r#"{"type":"join","userId":"2"}"#.into()))
            .await
            .unwrap();
        assert_eq!(next_event(&mut ws).await["event"], "joined");
        assert_eq!(hub.room_size(UserId(2)), 1);

        ws.close(None).await.unwrap();
        for _ in 0..50 {
            if hub.room_size(UserId(2)) == 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert_eq!(hub.room_size(UserId(2)), 0);
    }
}
