//! Gazette HTTP server.
//!
//! Newsletter CRUD over a [`NewsletterStore`], plus a live change stream at
//! `/newsletter/events` fed by the database's commit notifications through
//! the `gazette_relay` listener and broker.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod store;
pub mod supervisor;

pub use config::{Args, ServerConfig, StorageBackend};
pub use error::AppError;
pub use state::AppState;
pub use store::{MemoryStore, NewNewsletter, Newsletter, NewsletterStore, PgStore};
pub use supervisor::{ListenerStatus, SupervisorConfig};

use axum::http::{header, HeaderValue};
use axum::Router;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Create the router with all routes.
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        .merge(routes::health::routes())
        .merge(routes::auth::routes())
        .merge(routes::newsletters::routes())
        .merge(routes::events::routes());

    if let Some(dir) = &state.config.static_dir {
        router = router.nest_service("/static", ServeDir::new(dir));
    }

    let router = router.layer(TraceLayer::new_for_http());

    let router = match HeaderValue::from_str(&state.config.allowed_origin) {
        Ok(origin) => router.layer(cors_layer(origin)),
        Err(_) => {
            warn!(origin = %state.config.allowed_origin, "invalid allowed origin, CORS disabled");
            router
        }
    };

    router.with_state(state)
}

// Credentialed CORS cannot use wildcards, so methods and headers mirror the request.
fn cors_layer(origin: HeaderValue) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::list([origin]))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
        .expose_headers([header::SET_COOKIE])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use gazette_relay::EventBroker;
    use tokio::sync::{broadcast, watch};
    use tower::ServiceExt;

    fn router(config: ServerConfig) -> Router {
        let (_status_tx, status_rx) = watch::channel(ListenerStatus::Starting);
        let (shutdown_tx, _) = broadcast::channel(1);
        create_router(AppState::new(
            Arc::new(NewsletterStore::from(MemoryStore::new())),
            EventBroker::new(),
            config,
            status_rx,
            shutdown_tx,
        ))
    }

    #[tokio::test]
    async fn test_cors_allows_configured_origin_with_credentials() {
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/newsletters")
            .header(header::ORIGIN, "http://localhost:8000")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();

        let response = router(ServerConfig::default()).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:8000"
        );
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    }

    #[tokio::test]
    async fn test_other_origins_are_not_allowed() {
        let request = Request::builder()
            .uri("/health")
            .header(header::ORIGIN, "http://evil.example")
            .body(Body::empty())
            .unwrap();

        let response = router(ServerConfig::default()).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());
    }
}
