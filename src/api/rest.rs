//! Axum REST API handlers

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::engine::FaceEncoder;
use crate::service::FaceService;
use crate::storage::EncodingStore;

use super::dto::*;

type HandlerError = (StatusCode, Json<ErrorResponse>);

/// Application state shared across handlers
pub struct AppState<S: EncodingStore, E: FaceEncoder> {
    pub service: Arc<FaceService<S, E>>,
    pub start_time: Instant,
}

/// Create the REST API router
pub fn create_router<S: EncodingStore, E: FaceEncoder>(
    state: Arc<AppState<S, E>>,
    max_upload_mb: usize,
) -> Router {
    Router::new()
        .route("/register", post(register_handler::<S, E>))
        .route("/identify", post(identify_handler::<S, E>))
        .route("/health", get(health_handler::<S, E>))
        .route("/metrics", get(metrics_handler::<S, E>))
        .layer(DefaultBodyLimit::max(max_upload_mb * 1024 * 1024))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn bad_request(error: &str, code: &str) -> HandlerError {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(error, code)))
}

/// Register a face encoding under a student identifier
async fn register_handler<S: EncodingStore, E: FaceEncoder>(
    State(state): State<Arc<AppState<S, E>>>,
    mut multipart: Multipart,
) -> Result<Json<RegisterResponse>, HandlerError> {
    let mut photo: Option<Vec<u8>> = None;
    let mut student_id: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(&e.to_string(), "MULTIPART_ERROR"))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "photo" => {
                photo = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| bad_request(&e.to_string(), "READ_ERROR"))?
                        .to_vec(),
                );
            }
            "student_id" => student_id = Some(field.text().await.unwrap_or_default()),
            _ => {}
        }
    }

    let photo = photo.ok_or_else(|| bad_request("Missing photo field", "MISSING_PHOTO"))?;
    let student_id = student_id
        .filter(|s| !s.is_empty())
        .ok_or_else(|| bad_request("Missing student_id field", "MISSING_STUDENT_ID"))?;

    let result = state
        .service
        .register(&photo, &student_id)
        .await
        .map_err(|e| {
            error!("Registration failed: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(&e.to_string(), "REGISTRATION_FAILED")),
            )
        })?;

    if !result.success {
        return Err(bad_request(&result.message, "NO_FACE"));
    }

    Ok(Json(RegisterResponse {
        success: true,
        student_id: result.student_id,
    }))
}

/// Identify the face in a photo against all enrolled encodings
async fn identify_handler<S: EncodingStore, E: FaceEncoder>(
    State(state): State<Arc<AppState<S, E>>>,
    mut multipart: Multipart,
) -> Result<Json<IdentifyResponse>, HandlerError> {
    let mut photo: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(&e.to_string(), "MULTIPART_ERROR"))?
    {
        if field.name().unwrap_or("") == "photo" {
            photo = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(&e.to_string(), "READ_ERROR"))?
                    .to_vec(),
            );
        }
    }

    let photo = photo.ok_or_else(|| bad_request("Missing photo field", "MISSING_PHOTO"))?;

    let result = state.service.identify(&photo).await.map_err(|e| {
        error!("Identification failed: {:#}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(&e.to_string(), "IDENTIFICATION_FAILED")),
        )
    })?;

    if !result.face_found {
        return Err(bad_request("No face found in the photo", "NO_FACE"));
    }

    Ok(Json(IdentifyResponse {
        success: result.student_id.is_some(),
        student_id: result.student_id,
    }))
}

/// Health check
async fn health_handler<S: EncodingStore, E: FaceEncoder>(
    State(state): State<Arc<AppState<S, E>>>,
) -> Json<HealthResponse> {
    let health = state.service.health();

    Json(HealthResponse {
        healthy: health.healthy,
        version: health.version,
        models_loaded: health.models_loaded,
    })
}

/// Metrics
async fn metrics_handler<S: EncodingStore, E: FaceEncoder>(
    State(state): State<Arc<AppState<S, E>>>,
) -> Json<MetricsResponse> {
    let health = state.service.health();
    let enrolled = state.service.storage().count().await.unwrap_or(0);

    Json(MetricsResponse {
        enrolled,
        models_loaded: health.models_loaded,
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use anyhow::Result;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tempfile::tempdir;
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::engine::FaceEmbedding;
    use crate::storage::FileStore;

    struct StubEncoder {
        vectors: HashMap<Vec<u8>, Vec<f32>>,
    }

    impl FaceEncoder for StubEncoder {
        fn encode(&self, image_data: &[u8]) -> Result<Option<FaceEmbedding>> {
            Ok(self
                .vectors
                .get(image_data)
                .map(|v| FaceEmbedding::new(v.clone())))
        }

        fn model_status(&self) -> HashMap<String, bool> {
            HashMap::new()
        }
    }

    fn test_router(dir: &std::path::Path, photos: &[(&[u8], Vec<f32>)]) -> Router {
        let storage = Arc::new(FileStore::open(dir.join("encodings.bin")).unwrap());
        let encoder = Arc::new(StubEncoder {
            vectors: photos
                .iter()
                .map(|(bytes, v)| (bytes.to_vec(), v.clone()))
                .collect(),
        });
        let service = Arc::new(FaceService::new(encoder, storage, Config::default()));
        let state = Arc::new(AppState {
            service,
            start_time: Instant::now(),
        });
        create_router(state, 10)
    }

    const BOUNDARY: &str = "facegate-test-boundary";

    fn multipart_request(uri: &str, fields: &[(&str, &[u8])]) -> Request<Body> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"")
                    .as_bytes(),
            );
            if *name == "photo" {
                body.extend_from_slice(
                    b"; filename=\"photo.jpg\"\r\nContent-Type: image/jpeg",
                );
            }
            body.extend_from_slice(b"\r\n\r\n");
            body.extend_from_slice(value);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn register_then_identify_round_trip() {
        let dir = tempdir().unwrap();
        let router = test_router(dir.path(), &[(b"alice-photo".as_slice(), vec![1.0, 0.0])]);

        let response = router
            .clone()
            .oneshot(multipart_request(
                "/register",
                &[
                    ("student_id", b"s-1001".as_slice()),
                    ("photo", b"alice-photo".as_slice()),
                ],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["student_id"], "s-1001");

        let response = router
            .oneshot(multipart_request(
                "/identify",
                &[("photo", b"alice-photo".as_slice())],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["student_id"], "s-1001");
    }

    #[tokio::test]
    async fn register_without_student_id_is_rejected() {
        let dir = tempdir().unwrap();
        let router = test_router(dir.path(), &[(b"alice-photo".as_slice(), vec![1.0, 0.0])]);

        let response = router
            .oneshot(multipart_request("/register", &[("photo", b"alice-photo".as_slice())]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["code"], "MISSING_STUDENT_ID");
    }

    #[tokio::test]
    async fn register_without_photo_is_rejected() {
        let dir = tempdir().unwrap();
        let router = test_router(dir.path(), &[]);

        let response = router
            .oneshot(multipart_request("/register", &[("student_id", b"s-1001".as_slice())]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["code"], "MISSING_PHOTO");
    }

    #[tokio::test]
    async fn register_without_face_is_rejected() {
        let dir = tempdir().unwrap();
        let router = test_router(dir.path(), &[]);

        let response = router
            .oneshot(multipart_request(
                "/register",
                &[("student_id", b"s-1001".as_slice()), ("photo", b"landscape-photo".as_slice())],
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["code"], "NO_FACE");
    }

    #[tokio::test]
    async fn identify_with_no_enrollments_is_no_match() {
        let dir = tempdir().unwrap();
        let router = test_router(dir.path(), &[(b"bob-photo".as_slice(), vec![0.0, 1.0])]);

        let response = router
            .oneshot(multipart_request("/identify", &[("photo", b"bob-photo".as_slice())]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["student_id"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn identify_without_photo_is_rejected() {
        let dir = tempdir().unwrap();
        let router = test_router(dir.path(), &[]);

        let response = router
            .oneshot(multipart_request("/identify", &[]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["code"], "MISSING_PHOTO");
    }

    #[tokio::test]
    async fn health_reports_version() {
        let dir = tempdir().unwrap();
        let router = test_router(dir.path(), &[]);

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["healthy"], true);
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn metrics_counts_enrollments() {
        let dir = tempdir().unwrap();
        let router = test_router(dir.path(), &[(b"alice-photo".as_slice(), vec![1.0, 0.0])]);

        router
            .clone()
            .oneshot(multipart_request(
                "/register",
                &[("student_id", b"s-1001".as_slice()), ("photo", b"alice-photo".as_slice())],
            ))
            .await
            .unwrap();

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["enrolled"], 1);
    }
}
