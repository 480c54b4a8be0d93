pub mod generations;
pub mod health;

use std::path::Path;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::services::ServeDir;

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/generations", post(generations::handle_create))
        .route("/api/v1/generations/stats", get(generations::handle_stats))
        .route("/api/v1/generations/:id", get(generations::handle_get))
        .with_state(state)
}

/// Serves compiled PDFs under the artifact prefix so a persisted `pdf_path`
/// resolves against this server. Prefixes that are absolute URLs or the bare
/// root are left to whatever fronts the worker.
pub fn with_artifacts(router: Router, url_prefix: &str, output_dir: &Path) -> Router {
    let mount = url_prefix.trim_end_matches('/');
    if !mount.starts_with('/') || mount.is_empty() {
        tracing::info!("Artifact prefix '{url_prefix}' is not a local path; not serving PDFs");
        return router;
    }
    router.nest_service(mount, ServeDir::new(output_dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use futures::StreamExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::builder::resume::fixtures::sample_payload;
    use crate::models::JobStatus;
    use crate::store::memory::MemoryJobStore;
    use crate::store::JobStore;

    fn app(store: Arc<MemoryJobStore>) -> Router {
        build_router(AppState { store })
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(
            app(Arc::new(MemoryJobStore::new())),
            Request::get("/health").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "resume-worker");
    }

    #[tokio::test]
    async fn test_create_inserts_pending_job_with_payload_meta_code() {
        let store = Arc::new(MemoryJobStore::new());
        let mut feed = store.subscribe_inserts().await.unwrap();

        let (status, body) = send(
            app(store.clone()),
            post_json(
                "/api/v1/generations",
                json!({
                    "output_filename": "Jane_Doe_BE",
                    "resume_data": sample_payload(),
                    "resume_id": "r-1",
                    "version_number": 3
                }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "PENDING");
        assert_eq!(body["meta_code"], "BE");
        assert_eq!(body["version_number"], 3);

        let id = body["id"].as_str().unwrap().parse().unwrap();
        let stored = store.job(id);
        assert_eq!(stored.status, JobStatus::Pending);
        assert_eq!(stored.resume_id.as_deref(), Some("r-1"));

        let event = feed.next().await.unwrap().unwrap();
        assert_eq!(event.job_id, id);
    }

    #[tokio::test]
    async fn test_create_prefers_explicit_meta_code_and_defaults_to_res() {
        let store = Arc::new(MemoryJobStore::new());

        let (_, body) = send(
            app(store.clone()),
            post_json(
                "/api/v1/generations",
                json!({
                    "output_filename": "Explicit",
                    "resume_data": sample_payload(),
                    "meta_code": "ml"
                }),
            ),
        )
        .await;
        assert_eq!(body["meta_code"], "ML");

        let (_, body) = send(
            app(store),
            post_json(
                "/api/v1/generations",
                json!({"output_filename": "Plain", "resume_data": {"basics": {}}}),
            ),
        )
        .await;
        assert_eq!(body["meta_code"], "RES");
    }

    #[tokio::test]
    async fn test_create_rejects_unsafe_filename_and_non_object_payload() {
        let store = Arc::new(MemoryJobStore::new());

        let (status, body) = send(
            app(store.clone()),
            post_json(
                "/api/v1/generations",
                json!({"output_filename": "../etc/passwd", "resume_data": {}}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let (status, _) = send(
            app(store.clone()),
            post_json(
                "/api/v1/generations",
                json!({"output_filename": "Ok_Name", "resume_data": [1, 2]}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert_eq!(store.count_by_status().await.unwrap().pending, 0);
    }

    #[tokio::test]
    async fn test_get_returns_job_or_404() {
        let store = Arc::new(MemoryJobStore::new());
        let job = store.seed_pending("Lookup", json!({}), chrono::Utc::now());

        let (status, body) = send(
            app(store.clone()),
            Request::get(format!("/api/v1/generations/{}", job.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["output_filename"], "Lookup");
        assert!(body["createdAt"].is_string());

        let (status, body) = send(
            app(store),
            Request::get(format!("/api/v1/generations/{}", uuid::Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_stats_counts_by_status() {
        let store = Arc::new(MemoryJobStore::new());
        let now = chrono::Utc::now();
        store.seed_pending("A", json!({}), now);
        store.seed_pending("B", json!({}), now);
        store.seed_processing("C", now);

        let (status, body) = send(
            app(store),
            Request::get("/api/v1/generations/stats")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"pending": 2, "processing": 1, "completed": 0, "failed": 0})
        );
    }

    #[tokio::test]
    async fn test_artifacts_served_under_prefix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Jane.pdf"), b"%PDF-1.5").unwrap();
        let router = with_artifacts(
            app(Arc::new(MemoryJobStore::new())),
            "/output/",
            dir.path(),
        );

        let response = router
            .oneshot(Request::get("/output/Jane.pdf").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"%PDF-1.5");
    }

    #[test]
    fn test_remote_prefix_is_not_mounted() {
        let dir = tempfile::tempdir().unwrap();
        // Must not panic on a non-path prefix.
        let _ = with_artifacts(
            app(Arc::new(MemoryJobStore::new())),
            "https://cdn.example.com/pdfs",
            dir.path(),
        );
        let _ = with_artifacts(app(Arc::new(MemoryJobStore::new())), "/", dir.path());
    }
}
