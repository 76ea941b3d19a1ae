//! HTTP surface for triggering crawls and reading results.

mod handlers;

use std::net::SocketAddr;

use axum::{
    Router,
    routing::{get, patch, post},
};

use crate::orchestrator::Orchestrator;
use crate::store::Database;

/// Shared state for the web server
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub orchestrator: Orchestrator,
}

/// Create the router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/crawl", post(handlers::trigger_crawl))
        .route("/api/crawl/stop", post(handlers::stop_crawl))
        .route("/api/runs/:run_id", get(handlers::run_detail))
        .route(
            "/api/runs/:run_id/announcements",
            get(handlers::run_announcements),
        )
        .route("/api/announcements/:id", patch(handlers::update_announcement))
        .route("/api/dashboard", get(handlers::dashboard))
        .with_state(state)
}

/// Start the web server
pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let app = create_router(state);
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    use crate::classifier::{GeminiAnalysisResult, StaticClassifier};
    use crate::extractor::{Extractor, ExtractorConfig};
    use crate::fetcher::StaticFetcher;
    use crate::models::RegionSource;
    use crate::orchestrator::OrchestratorConfig;

    async fn setup_test_app() -> (Router, Database) {
        let db = Database::new_in_memory().await.unwrap();
        let orchestrator = Orchestrator::new(
            db.clone(),
            Arc::new(Vec::<RegionSource>::new()),
            Arc::new(StaticFetcher::new()),
            Arc::new(Extractor::new(&ExtractorConfig::default()).unwrap()),
            Arc::new(StaticClassifier::new(GeminiAnalysisResult::default())),
            OrchestratorConfig::default(),
        );
        let app = create_router(AppState {
            db: db.clone(),
            orchestrator,
        });
        (app, db)
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = setup_test_app().await;
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_trigger_returns_run_id() {
        let (app, db) = setup_test_app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/crawl")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"enable_phase2": true, "force": false}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        let run_id = body["run_id"].as_str().unwrap();
        assert!(db.get_run(run_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_stop_unknown_run_is_404() {
        let (app, _) = setup_test_app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/crawl/stop")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"run_id": "nope"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_stop_without_body_stops_all() {
        let (app, _) = setup_test_app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/crawl/stop")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert!(body["stopped"].is_array());
    }

    #[tokio::test]
    async fn test_unknown_run_is_404() {
        let (app, _) = setup_test_app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/runs/nope/announcements?page=1&ai_verified_only=true")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_run_announcements_page() {
        let (app, db) = setup_test_app().await;
        db.create_run("run-1", 0).await.unwrap();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/runs/run-1/announcements?page=1&page_size=10&relevant_only=true")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["pagination"]["total"], 0);
        assert_eq!(body["pagination"]["page_size"], 10);
        assert_eq!(body["filters"]["relevant_only"], true);
    }

    #[tokio::test]
    async fn test_dashboard() {
        let (app, _) = setup_test_app().await;
        let response = app
            .oneshot(Request::builder().uri("/api/dashboard").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["total_relevant"], 0);
    }

    #[tokio::test]
    async fn test_update_missing_announcement() {
        let (app, _) = setup_test_app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .method("PATCH")
                    .uri("/api/announcements/42")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"status": "applied"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
