use axum::Router;
use axum::extract::State;
use axum::http::{HeaderValue, Method, header};
use axum::routing::{get, post};
use serde_json::json;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::api;
use crate::state::SharedState;

/// Build the main application router with all routes.
pub fn build_router(state: SharedState) -> Router {
    let cors = cors_layer(&state.config.gateway.cors_origins);

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/chat", post(api::chat))
        .route("/chat/stream", post(api::chat_stream))
        .route("/chat/{thread_id}/history", get(api::history))
        .route("/api/tools", get(api::list_tools))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Allow the configured origins; unparseable entries are skipped.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

async fn health() -> &'static str {
    "ok"
}

async fn index(State(state): State<SharedState>) -> axum::Json<serde_json::Value> {
    axum::Json(json!({
        "success": true,
        "message": state.config.gateway.welcome_message,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chatloop_agents::{LlmProvider, LlmRequest, LlmResponse, ToolRegistry, TurnExecutor};
    use chatloop_common::{ChatMessage, Result};
    use chatloop_config::AppConfig;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct Silent;

    #[async_trait]
    impl LlmProvider for Silent {
        fn provider_id(&self) -> &str {
            "silent"
        }

        async fn complete(&self, _request: &LlmRequest) -> Result<LlmResponse> {
            Ok(LlmResponse {
                message: ChatMessage::assistant("..."),
                model: "silent".into(),
                usage: None,
                stop_reason: None,
            })
        }
    }

    fn app() -> Router {
        let config = AppConfig::default();
        let executor = TurnExecutor::new(Arc::new(Silent), ToolRegistry::new());
        build_router(Arc::new(AppState::new(config, executor)))
    }

    #[tokio::test]
    async fn index_reports_running() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn cors_allows_configured_origin() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/chat")
                    .header(header::ORIGIN, "http://localhost:5173")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN),
            Some(&HeaderValue::from_static("http://localhost:5173"))
        );
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let response = app()
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn invalid_origins_are_skipped() {
        // Builds without panicking even with a value that is not a header.
        let _ = cors_layer(&["http://ok.example".into(), "bad\norigin".into()]);
    }
}
