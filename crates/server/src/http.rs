//! HTTP Endpoints
//!
//! REST API for the parish chat.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Json, Path, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use parish_chat_agent::{AnswerSource, ChatRequest};
use parish_chat_config::constants::timeouts;
use parish_chat_core::ChatTurn;
use parish_chat_resilience::PhaseKind;

use crate::metrics::metrics_handler;
use crate::state::AppState;
use crate::ServerError;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let server = &state.config.server;
    let cors_layer = build_cors_layer(&server.cors_origins, server.cors_enabled);
    let timeout = Duration::from_secs(server.request_timeout_secs);

    Router::new()
        .route("/api/chat/message", post(chat_message))
        // Health check
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        // Prometheus metrics
        .route("/metrics", get(metrics_handler))
        // Admin endpoints
        .route("/admin/cache/stats", get(cache_stats))
        .route("/admin/cache/cleanup", post(cache_cleanup))
        .route("/admin/cache", delete(cache_clear))
        .route("/admin/breaker/:service", get(breaker_state))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(timeout))
        .layer(CompressionLayer::new())
        .layer(cors_layer)
        .with_state(state)
}

/// Build CORS layer from configured origins
///
/// - If cors_enabled is false, returns permissive layer (for dev)
/// - If no configured origin parses, defaults to localhost:3000
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins");
        return CorsLayer::permissive();
    }

    let mut parsed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!(origin = %origin, "Invalid CORS origin");
                None
            })
        })
        .collect();

    if parsed_origins.is_empty() {
        tracing::info!("No usable CORS origins configured, defaulting to localhost:3000");
        parsed_origins.push(HeaderValue::from_static("http://localhost:3000"));
    }

    tracing::info!(count = parsed_origins.len(), "CORS configured");
    CorsLayer::new()
        .allow_origin(parsed_origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageBody {
    pub message: String,
    #[serde(default, alias = "conversation_history")]
    pub conversation_history: Vec<ChatTurn>,
}

/// Header carrying the user authenticated by the upstream gateway
pub const USER_ID_HEADER: &str = "x-user-id";

/// Rate-limit identity.
///
/// With a trusted proxy in front: the authenticated user header, else the
/// first forwarded hop, else `X-Real-IP`. Otherwise, and as a last resort,
/// the socket address. Nothing from the request body is used.
pub fn caller_identity(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded: bool) -> String {
    if trust_forwarded {
        if let Some(user) = header_value(headers, USER_ID_HEADER) {
            return format!("user:{}", user);
        }
        let forwarded = header_value(headers, "x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded.or_else(|| header_value(headers, "x-real-ip")) {
            return ip.to_string();
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// POST /api/chat/message
async fn chat_message(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(body): Json<ChatMessageBody>,
) -> Result<Response, ServerError> {
    let caller = caller_identity(
        &headers,
        peer.map(|ConnectInfo(addr)| addr),
        state.config.server.trust_forwarded_for,
    );

    let request = ChatRequest {
        message: body.message,
        history: body.conversation_history,
        caller,
    };
    let reply = state.orchestrator.handle(request).await?;

    if reply.source == AnswerSource::RateLimited {
        let retry_after_secs = reply.retry_after_ms.unwrap_or(0).div_ceil(1000).max(1);
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(reply)).into_response();
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        return Ok(response);
    }

    Ok(Json(reply).into_response())
}

/// GET /health: process liveness
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "store": state.store.as_ref().map(|s| s.name()).unwrap_or("none"),
        "cache_enabled": state.cache.is_enabled(),
    }))
}

/// GET /ready: store connectivity and provider breaker phase.
///
/// Only a configured store that stops answering makes the instance unready;
/// an open breaker still serves degraded replies.
async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let mut checks = serde_json::Map::new();
    let mut ready = true;

    let store_status = match &state.store {
        Some(store) => {
            let timeout = Duration::from_millis(timeouts::HEALTH_CHECK_MS);
            match tokio::time::timeout(timeout, store.ping()).await {
                Ok(Ok(())) => "ok",
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "Store ping failed");
                    ready = false;
                    "unreachable"
                },
                Err(_) => {
                    ready = false;
                    "timeout"
                },
            }
        },
        None => "disabled",
    };
    checks.insert(
        "store".to_string(),
        serde_json::json!({ "status": store_status }),
    );

    let service = state.breaker.default_service();
    let phase = match state.breaker.state(service).await {
        Ok(breaker) => PhaseKind::from(breaker.phase),
        Err(_) => PhaseKind::Unknown,
    };
    checks.insert(
        "llm_provider".to_string(),
        serde_json::json!({ "service": service, "phase": phase.as_str() }),
    );

    let (status, status_code) = if ready {
        ("ready", StatusCode::OK)
    } else {
        ("not_ready", StatusCode::SERVICE_UNAVAILABLE)
    };

    (
        status_code,
        Json(serde_json::json!({
            "status": status,
            "checks": checks
        })),
    )
}

/// GET /admin/cache/stats
async fn cache_stats(State(state): State<AppState>) -> Result<impl IntoResponse, ServerError> {
    let stats = state.cache.stats().await?;
    Ok(Json(stats))
}

/// POST /admin/cache/cleanup
async fn cache_cleanup(State(state): State<AppState>) -> Result<impl IntoResponse, ServerError> {
    let removed = state.cache.try_cleanup().await?;
    tracing::info!(removed, "Cache cleanup requested");
    Ok(Json(serde_json::json!({ "removed": removed })))
}

/// DELETE /admin/cache
async fn cache_clear(State(state): State<AppState>) -> Result<impl IntoResponse, ServerError> {
    let removed = state.cache.clear().await?;
    Ok(Json(serde_json::json!({ "removed": removed })))
}

/// GET /admin/breaker/:service
async fn breaker_state(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let breaker = state.breaker.state(&service).await?;
    Ok(Json(serde_json::json!({
        "service": service,
        "phase": PhaseKind::from(breaker.phase).as_str(),
        "breaker": breaker,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Backends;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use parish_chat_config::{DomainConfig, RateLimitConfig, Settings};
    use parish_chat_core::{
        EmbeddingProvider, GenerateRequest, GenerateResponse, KeyValueStore, LanguageModel,
        Result as CoreResult, RetrievalCandidate, VectorIndex,
    };
    use parish_chat_persistence::MemoryStore;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct CannedLlm;

    #[async_trait]
    impl LanguageModel for CannedLlm {
        async fn generate(&self, _request: GenerateRequest) -> CoreResult<GenerateResponse> {
            Ok(GenerateResponse {
                text: "La misa del domingo es a las 12:00.".to_string(),
                model: "canned".to_string(),
            })
        }

        fn model_name(&self) -> &str {
            "canned"
        }
    }

    struct FlatEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FlatEmbedder {
        async fn embed(&self, _text: &str) -> CoreResult<Vec<f32>> {
            Ok(vec![0.5; 4])
        }

        fn dimensions(&self) -> usize {
            4
        }
    }

    struct OneDocIndex;

    #[async_trait]
    impl VectorIndex for OneDocIndex {
        async fn search(&self, _embedding: &[f32], _top_k: usize) -> CoreResult<Vec<RetrievalCandidate>> {
            let mut metadata = HashMap::new();
            metadata.insert(
                "pageContent".to_string(),
                "Misas: domingos a las 12:00 en la iglesia parroquial.".to_string(),
            );
            Ok(vec![RetrievalCandidate {
                id: "misas".to_string(),
                score: 0.9,
                metadata,
            }])
        }

        fn name(&self) -> &str {
            "one-doc"
        }
    }

    fn state_with(settings: Settings, store: Option<Arc<dyn KeyValueStore>>) -> AppState {
        let model: Arc<dyn LanguageModel> = Arc::new(CannedLlm);
        AppState::build(
            settings,
            &DomainConfig::default(),
            Backends {
                store,
                model: model.clone(),
                auxiliary: model,
                embedder: Arc::new(FlatEmbedder),
                index: Arc::new(OneDocIndex),
            },
        )
    }

    fn app() -> Router {
        create_router(state_with(Settings::default(), Some(Arc::new(MemoryStore::new()))))
    }

    fn chat(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/chat/message")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", "198.51.100.4, 10.0.0.1")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_chat_message() {
        let response = app()
            .oneshot(chat(serde_json::json!({ "message": "¿A qué hora es la misa del domingo?" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["source"], "generated");
        assert_eq!(body["answer"], "La misa del domingo es a las 12:00.");
        assert_eq!(body["cacheable"], false);
    }

    #[tokio::test]
    async fn test_empty_message_is_bad_request() {
        let response = app()
            .oneshot(chat(serde_json::json!({ "message": "  " })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_rate_limited_sets_retry_after() {
        let settings = Settings {
            rate_limit: RateLimitConfig {
                max_requests: 1,
                ..Default::default()
            },
            ..Default::default()
        };
        let app = create_router(state_with(settings, Some(Arc::new(MemoryStore::new()))));
        let body = serde_json::json!({ "message": "¿Dónde está el despacho parroquial?" });

        let first = app.clone().oneshot(chat(body.clone())).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.oneshot(chat(body)).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry_after: u64 = second.headers()[header::RETRY_AFTER]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(retry_after >= 1);
        assert_eq!(json_body(second).await["source"], "rate_limited");
    }

    #[tokio::test]
    async fn test_body_user_id_does_not_reset_quota() {
        let settings = Settings {
            rate_limit: RateLimitConfig {
                max_requests: 1,
                ..Default::default()
            },
            ..Default::default()
        };
        let app = create_router(state_with(settings, Some(Arc::new(MemoryStore::new()))));

        let first = app
            .clone()
            .oneshot(chat(serde_json::json!({ "message": "¿Dónde está el despacho?", "userId": "ana" })))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        for user in ["bea", "carlos"] {
            let again = app
                .clone()
                .oneshot(chat(serde_json::json!({ "message": "¿Dónde está el despacho?", "user_id": user })))
                .await
                .unwrap();
            assert_eq!(again.status(), StatusCode::TOO_MANY_REQUESTS);
        }
    }

    #[tokio::test]
    async fn test_health_and_ready() {
        let app = app();
        let health = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);
        assert_eq!(json_body(health).await["store"], "memory");

        let ready = app
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(ready.status(), StatusCode::OK);
        let body = json_body(ready).await;
        assert_eq!(body["checks"]["store"]["status"], "ok");
        assert_eq!(body["checks"]["llm_provider"]["phase"], "closed");
    }

    #[tokio::test]
    async fn test_not_ready_when_store_down() {
        let store = Arc::new(MemoryStore::new());
        store.set_available(false);
        let app = create_router(state_with(Settings::default(), Some(store)));

        let ready = app
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(ready.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_cache_admin() {
        let app = app();
        let asked = app
            .clone()
            .oneshot(chat(serde_json::json!({ "message": "¿Qué es el grupo Eloos?" })))
            .await
            .unwrap();
        assert_eq!(json_body(asked).await["cacheable"], true);

        let stats = app
            .clone()
            .oneshot(Request::get("/admin/cache/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(json_body(stats).await["size"], 1);

        let cleared = app
            .oneshot(Request::delete("/admin/cache").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(cleared.status(), StatusCode::OK);
        assert_eq!(json_body(cleared).await["removed"], 1);
    }

    #[tokio::test]
    async fn test_cache_admin_without_store() {
        let app = create_router(state_with(Settings::default(), None));
        let stats = app
            .oneshot(Request::get("/admin/cache/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(stats.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_breaker_state() {
        let response = app()
            .oneshot(Request::get("/admin/breaker/llm_provider").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["phase"], "closed");
        assert_eq!(body["breaker"]["failures"], 0);
    }

    #[test]
    fn test_caller_identity() {
        let mut headers = HeaderMap::new();
        let peer: SocketAddr = "192.0.2.10:51000".parse().unwrap();

        assert_eq!(caller_identity(&headers, Some(peer), true), "192.0.2.10");
        assert_eq!(caller_identity(&headers, None, true), "unknown");

        headers.insert("x-real-ip", HeaderValue::from_static("203.0.113.9"));
        assert_eq!(caller_identity(&headers, Some(peer), true), "203.0.113.9");

        headers.insert("x-forwarded-for", HeaderValue::from_static("198.51.100.4, 10.0.0.1"));
        assert_eq!(caller_identity(&headers, Some(peer), true), "198.51.100.4");
        assert_eq!(caller_identity(&headers, Some(peer), false), "192.0.2.10");

        headers.insert(USER_ID_HEADER, HeaderValue::from_static("ana"));
        assert_eq!(caller_identity(&headers, Some(peer), true), "user:ana");
        assert_eq!(caller_identity(&headers, Some(peer), false), "192.0.2.10");

        headers.insert(USER_ID_HEADER, HeaderValue::from_static("  "));
        assert_eq!(caller_identity(&headers, Some(peer), true), "198.51.100.4");
    }
}
