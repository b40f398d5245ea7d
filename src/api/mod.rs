//! Pokedex REST API
//!
//! HTTP API layer for Pokedex, built with Axum.
//!
//! # Endpoints
//!
//! ## Page
//! - `GET /` - Browser UI (gallery and add form)
//!
//! ## Entries
//! - `GET /api/v1/entries` - List the index
//! - `GET /api/v1/entries/:id` - One entry with media as data URIs
//! - `POST /api/v1/entries` - Add an entry
//!
//! ## Media
//! - `GET /api/v1/media?path=` - Resolve a repository path to a data URI
//!
//! ## Sessions
//! - `POST /api/v1/sessions` - Open a browse session
//! - `GET /api/v1/sessions/:id` - Reload and render the selection
//! - `PUT /api/v1/sessions/:id/selection` - Change the selection
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe
//! - `GET /health` - Full health status
//!
//! # Example
//!
//! ```rust,ignore
//! use pokedex::api::{serve, AppState};
//! use pokedex::catalog::{Catalog, SessionRegistry};
//! use pokedex::config::Config;
//!
//! let catalog = Arc::new(Catalog::new(index, media, SessionRegistry::default()));
//! let config = Config::load_default(None)?;
//! serve(AppState::new(catalog, config.api.clone())).await?;
//! ```

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::config::ApiConfig;

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Entry routes - uploads arrive base64 encoded in JSON
        .route(
            "/entries",
            get(routes::entries::list_entries).post(routes::entries::create_entry),
        )
        .route("/entries/:id", get(routes::entries::get_entry))
        // Media routes
        .route("/media", get(routes::media::resolve_media))
        // Session routes
        .route("/sessions", post(routes::sessions::open_session))
        .route("/sessions/:id", get(routes::sessions::get_session))
        .route("/sessions/:id/selection", put(routes::sessions::select_entry))
        .layer(DefaultBodyLimit::max(state.config.max_body_bytes));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    let cors = cors_layer(&state.config);

    // Create shared state
    let shared_state = Arc::new(state);

    Router::new()
        .route("/", get(routes::page::index))
        .nest("/api/v1", api_routes)
        .nest("/health", health_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(shared_state)
}

fn cors_layer(config: &ApiConfig) -> CorsLayer {
    if config.cors_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::permissive().allow_origin(AllowOrigin::list(origins))
}

/// Start the API server
pub async fn serve(state: AppState) -> Result<(), ApiError> {
    let addr = state.config.addr();
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Pokedex listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("Pokedex shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::dto::{EntryListResponse, HealthResponse, MediaResponse, UploadDto};
    use crate::catalog::{Catalog, SessionRegistry};
    use crate::index::{parse_entries, IndexRepository, DEFAULT_INDEX_PATH};
    use crate::media::{MediaCacheConfig, MediaResolver, PLACEHOLDER_IMAGE};
    use crate::store::{InMemoryStore, StoreError};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::util::ServiceExt;

    fn create_test_app(store: Arc<InMemoryStore>) -> Router {
        let index = IndexRepository::new(store.clone(), DEFAULT_INDEX_PATH, "main");
        let media = Arc::new(MediaResolver::new(store, "main", MediaCacheConfig::default()));
        let catalog = Arc::new(Catalog::new(index, media, SessionRegistry::default()));
        build_router(AppState::new(catalog, ApiConfig::default()))
    }

    async fn seeded_store() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store
            .insert(
                DEFAULT_INDEX_PATH,
                "main",
                r#"[{"id":"0001","name":"Bulbasaur","img_path":"pic/0001_Bulbasaur.png","audio_path":""},
                    {"id":"0004","name":"Charmander","img_path":"pic/0004_Charmander.png","audio_path":"wav/0004_Charmander.mp3"}]"#,
            )
            .await;
        store.insert("pic/0001_Bulbasaur.png", "main", b"png".to_vec()).await;
        store
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn submission(id: &str, name: &str) -> Value {
        json!({
            "id": id,
            "name": name,
            "image": UploadDto::encode(format!("{}.png", name), b"png"),
        })
    }

    #[tokio::test]
    async fn test_health_live() {
        let app = create_test_app(Arc::new(InMemoryStore::new()));
        let response = app.oneshot(get("/health/live")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_ready_tracks_store() {
        let store = Arc::new(InMemoryStore::new());
        let app = create_test_app(Arc::clone(&store));

        let response = app.clone().oneshot(get("/health/ready")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        store
            .fail_next(StoreError::AuthFailure("bad credentials".into()))
            .await;
        let response = app.oneshot(get("/health/ready")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_health_full() {
        let app = create_test_app(seeded_store().await);
        let (status, body) = send(app, get("/health")).await;
        assert_eq!(status, StatusCode::OK);

        let health: HealthResponse = serde_json::from_value(body).unwrap();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.entries, Some(2));
        assert_eq!(health.branch, "main");
    }

    #[tokio::test]
    async fn test_index_page() {
        let app = create_test_app(Arc::new(InMemoryStore::new()));
        let response = app.oneshot(get("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let page = String::from_utf8_lossy(&bytes);
        assert!(page.contains(r#"const api = "/api/v1";"#));
        assert!(page.contains(r#"id="picker""#));
    }

    #[tokio::test]
    async fn test_list_entries_empty() {
        let app = create_test_app(Arc::new(InMemoryStore::new()));
        let (status, body) = send(app, get("/api/v1/entries")).await;
        assert_eq!(status, StatusCode::OK);

        let list: EntryListResponse = serde_json::from_value(body).unwrap();
        assert_eq!(list.total, 0);
        assert!(list.revision.is_none());
    }

    #[tokio::test]
    async fn test_get_entry_with_placeholder_audio_omitted() {
        let app = create_test_app(seeded_store().await);

        let (status, body) = send(app.clone(), get("/api/v1/entries/0001")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["label"], "0001 Bulbasaur");
        assert_eq!(body["image"], "data:image/png;base64,cG5n");
        assert!(body["audio"].is_null());

        // Neither media file exists for 0004
        let (status, body) = send(app, get("/api/v1/entries/0004")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["image"], PLACEHOLDER_IMAGE);
        assert!(body["audio"].is_null());
    }

    #[tokio::test]
    async fn test_get_unknown_entry() {
        let app = create_test_app(seeded_store().await);
        let (status, body) = send(app, get("/api/v1/entries/9999")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "ENTRY_NOT_FOUND");
        assert!(body["request_id"].is_string());
    }

    #[tokio::test]
    async fn test_create_entry() {
        let store = seeded_store().await;
        let app = create_test_app(Arc::clone(&store));

        let (status, body) = send(
            app,
            json_request("POST", "/api/v1/entries", submission("0002", "Ivysaur")),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["entry"]["img_path"], "pic/0002_Ivysaur.png");
        assert_eq!(body["total_entries"], 3);

        let bytes = store.get(DEFAULT_INDEX_PATH, "main").await.unwrap();
        let ids: Vec<String> = parse_entries(DEFAULT_INDEX_PATH, &bytes)
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["0001", "0002", "0004"]);
        assert_eq!(
            store.get("pic/0002_Ivysaur.png", "main").await.unwrap(),
            b"png"
        );
    }

    #[tokio::test]
    async fn test_create_duplicate_entry() {
        let store = seeded_store().await;
        let app = create_test_app(Arc::clone(&store));

        let (status, body) = send(
            app,
            json_request("POST", "/api/v1/entries", submission("0001", "Other")),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "DUPLICATE_ID");
        assert!(store.get("pic/0001_Other.png", "main").await.is_none());
    }

    #[tokio::test]
    async fn test_create_entry_missing_image() {
        let app = create_test_app(Arc::new(InMemoryStore::new()));
        let (status, body) = send(
            app,
            json_request("POST", "/api/v1/entries", json!({"id": "0001", "name": "Bulbasaur"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_create_entry_invalid_json() {
        let app = create_test_app(Arc::new(InMemoryStore::new()));
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/entries")
                    .header("Content-Type", "application/json")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_entry_store_failures() {
        let store = seeded_store().await;
        let app = create_test_app(Arc::clone(&store));

        store
            .fail_write(
                "pic/0002_Ivysaur.png",
                StoreError::AuthFailure("bad credentials".into()),
            )
            .await;
        let (status, body) = send(
            app.clone(),
            json_request("POST", "/api/v1/entries", submission("0002", "Ivysaur")),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["code"], "STORE_AUTH_FAILURE");

        store
            .fail_write(DEFAULT_INDEX_PATH, StoreError::Conflict(DEFAULT_INDEX_PATH.into()))
            .await;
        let (status, body) = send(
            app,
            json_request("POST", "/api/v1/entries", submission("0003", "Venusaur")),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn test_resolve_media() {
        let app = create_test_app(seeded_store().await);

        let (status, body) = send(
            app.clone(),
            get("/api/v1/media?path=pic%2F0001_Bulbasaur.png"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let media: MediaResponse = serde_json::from_value(body).unwrap();
        assert_eq!(media.uri.as_deref(), Some("data:image/png;base64,cG5n"));

        let (status, body) = send(app, get("/api/v1/media?path=wav%2Fmissing.mp3")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["uri"].is_null());
    }

    #[tokio::test]
    async fn test_media_outside_media_dirs_is_rejected() {
        let store = seeded_store().await;
        store
            .insert(
                "../../other/private-repo/contents/secrets.env",
                "main",
                b"TOKEN=x".to_vec(),
            )
            .await;
        let app = create_test_app(store);

        for path in [
            "..%2F..%2Fother%2Fprivate-repo%2Fcontents%2Fsecrets.env",
            "pic%2F..%2F..%2F..%2Fother%2Fprivate-repo%2Fcontents%2Fsecrets.env",
            "data.json",
            "pic%2F",
        ] {
            let uri = format!("/api/v1/media?path={}", path);
            let (status, body) = send(app.clone(), get(&uri)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", path);
            assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        }
    }

    #[tokio::test]
    async fn test_session_flow() {
        let app = create_test_app(seeded_store().await);

        let (status, body) = send(
            app.clone(),
            Request::builder()
                .method("POST")
                .uri("/api/v1/sessions")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["selected_index"], 0);
        assert_eq!(body["labels"][1], "0004 Charmander");
        let session_id = body["session_id"].as_str().unwrap().to_string();

        let (status, body) = send(
            app.clone(),
            json_request(
                "PUT",
                &format!("/api/v1/sessions/{}/selection", session_id),
                json!({"index": 7}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["selected_index"], 1);
        assert_eq!(body["selected"]["entry"]["id"], "0004");

        let (status, body) = send(app, get(&format!("/api/v1/sessions/{}", session_id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["selected_index"], 1);
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let app = create_test_app(seeded_store().await);
        let (status, body) = send(
            app,
            get(&format!("/api/v1/sessions/{}", uuid::Uuid::new_v4())),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "SESSION_NOT_FOUND");
    }
}
