//! Router construction.
//!
//! The content server and the notifier listen on separate ports, so each
//! gets its own router.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::live_reload::{self, Notifier};
use crate::middleware::headers;
use crate::state::AppState;
use crate::static_files;

/// Create the content server router.
pub(crate) fn create_router(state: Arc<AppState>) -> Router {
    static_files::static_router()
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(headers::no_store_layer())
                .layer(headers::content_type_options_layer()),
        )
        .with_state(state)
}

/// Create the notifier router: a single WebSocket endpoint at `/`.
pub(crate) fn create_notifier_router(notifier: Arc<Notifier>) -> Router {
    Router::new()
        .route("/", get(live_reload::ws_handler))
        .with_state(notifier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use tower::ServiceExt;

    use crate::inject::ReloadScript;

    #[tokio::test]
    async fn test_content_responses_carry_headers() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();
        std::fs::write(root.join("app.js"), "1").unwrap();

        let state = Arc::new(AppState {
            root,
            script: ReloadScript::new("localhost", 8001),
        });

        for uri in ["/app.js", "/missing.js"] {
            let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
            let response = create_router(Arc::clone(&state)).oneshot(request).await.unwrap();

            assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
            assert_eq!(response.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
        }
    }

    #[tokio::test]
    async fn test_notifier_rejects_plain_http() {
        let router = create_notifier_router(Arc::new(Notifier::new()));
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();

        let response = router.oneshot(request).await.unwrap();

        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_notifier_has_no_other_routes() {
        let router = create_notifier_router(Arc::new(Notifier::new()));
        let request = Request::builder()
            .uri("/index.html")
            .body(Body::empty())
            .unwrap();

        let response = router.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
