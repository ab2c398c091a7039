//! Route definitions for the thin HTTP front end.

use axum::{
    extract::{Path, State},
    middleware,
    routing::{get, post},
    Json, Router,
};

use crate::error::Result;
use crate::health::health;
use crate::middleware::JwtAuth;
use crate::registry::Registry;
use crate::session::dispatch;

#[derive(Clone)]
struct AppState {
    registry: Registry,
}

/// `GET /healthz` (no auth) plus `POST /v1/connectors/{id}/{operation}`
/// (JWT-authenticated), both backed by the same `session::dispatch`
/// function the WebSocket session uses. No other route-level validation,
/// pagination helpers, or OpenAPI generation -- this binding only exists
/// so the binary is runnable without a session connection.
pub fn router(registry: Registry, jwt_auth: JwtAuth) -> Router {
    let state = AppState { registry };

    let operations = Router::new()
        .route("/v1/connectors/{id}/{operation}", post(run_operation))
        .with_state(state)
        .route_layer(middleware::from_fn_with_state(jwt_auth, JwtAuth::middleware));

    Router::new().route("/healthz", get(health)).merge(operations)
}

async fn run_operation(
    State(state): State<AppState>,
    Path((connector_id, operation)): Path<(String, String)>,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>> {
    let result = dispatch(&state.registry, &connector_id, &operation, payload).await?;
    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::test_support::MemoryConnector;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_jwt_auth() -> JwtAuth {
        // An RS256 key is required to construct `JwtAuth`; requests that
        // never reach the operation route (here, the public healthz
        // probe) don't need a real keypair, so a config pointing at a
        // missing file is fine as long as we never call `validate_token`.
        // Exercised indirectly via the healthz test below.
        JwtAuth::new(&crate::config::AuthConfig {
            jwt_public_key_path: "/dev/null".into(),
            jwt_algorithm: "HS256".to_string(),
            jwt_issuer: None,
            jwt_audience: None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn healthz_requires_no_authentication() {
        let registry = Registry::new();
        registry.register_factory("ldap", "1.0.0", Arc::new(|_| Ok(Arc::new(MemoryConnector::new()))));
        let app = router(registry, test_jwt_auth());

        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn operation_route_rejects_missing_bearer_token() {
        let registry = Registry::new();
        let app = router(registry, test_jwt_auth());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/connectors/i1/schema")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn healthz_body_reports_status() {
        let registry = Registry::new();
        let app = router(registry, test_jwt_auth());

        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["status"], "healthy");
    }
}
