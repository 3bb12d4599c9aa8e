//! Research Object repository server.
//!
//! Serves RO collections over HTTP for `ro push` and `ro checkout`.
//!
//! # Configuration
//!
//! Environment variables:
//! - `ROSYNC_PORT`: Port to listen on (default: 8080)
//! - `ROSYNC_CONFIG`: Path to config file (default: ~/.config/rosync/config.yaml)
//! - `ROSYNC_PUBLIC_URL`: Scheme and authority used in returned URIs
//!   (default: taken from the request's `Host` header)
//!
//! # Config File Format
//!
//! ```yaml
//! access_tokens:
//!   - "your-secret-token-here"
//! ```

pub mod repository;
mod routes;

pub use repository::{Repository, RepositoryError};
pub use routes::ApiError;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

/// Config file structure
#[derive(Debug, Clone, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    access_tokens: Vec<String>,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub config_path: PathBuf,
    pub public_url: Option<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let port = std::env::var("ROSYNC_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let config_path = std::env::var("ROSYNC_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("rosync")
                    .join("config.yaml")
            });

        let public_url = std::env::var("ROSYNC_PUBLIC_URL")
            .ok()
            .map(|url| url.trim_end_matches('/').to_string());

        Self {
            port,
            config_path,
            public_url,
        }
    }
}

/// Accepted bearer tokens
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    tokens: HashSet<String>,
}

impl TokenStore {
    pub fn new(tokens: impl IntoIterator<Item = String>) -> Self {
        Self {
            tokens: tokens.into_iter().collect(),
        }
    }

    /// Load tokens from the config file. A missing or unreadable file
    /// yields an empty store.
    pub fn load(config_path: &Path) -> Self {
        let tokens = match std::fs::read_to_string(config_path) {
            Ok(contents) => match serde_yaml::from_str::<ConfigFile>(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded {} access token(s)", config.access_tokens.len());
                    config.access_tokens
                }
                Err(e) => {
                    tracing::warn!("Failed to parse config file: {}", e);
                    Vec::new()
                }
            },
            Err(e) => {
                tracing::warn!(
                    "Failed to read config file {}: {}",
                    config_path.display(),
                    e
                );
                Vec::new()
            }
        };
        if tokens.is_empty() {
            tracing::warn!("No access tokens loaded - all authenticated requests will fail");
        }
        Self::new(tokens)
    }

    pub fn validate(&self, token: &str) -> bool {
        self.tokens.contains(token)
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    tokens: Arc<TokenStore>,
    repository: Arc<RwLock<Repository>>,
    public_url: Option<String>,
}

impl AppState {
    pub fn new(tokens: TokenStore, public_url: Option<String>) -> Self {
        Self {
            tokens: Arc::new(tokens),
            repository: Arc::new(RwLock::new(Repository::new())),
            public_url,
        }
    }

    /// Scheme and authority for URIs in responses.
    fn base_url(&self, headers: &HeaderMap) -> String {
        if let Some(url) = &self.public_url {
            return url.clone();
        }
        let host = headers
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("localhost");
        format!("http://{}", host)
    }
}

/// Auth error response
#[derive(Serialize)]
struct AuthError {
    error: &'static str,
    message: &'static str,
}

fn unauthorized(error: &'static str, message: &'static str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(AuthError { error, message })).into_response()
}

/// Authentication middleware
async fn auth_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match auth_header {
        Some(h) => match h.strip_prefix("Bearer ") {
            Some(token) => token,
            None => {
                return unauthorized(
                    "invalid_auth",
                    "Authorization header must use Bearer scheme",
                )
            }
        },
        None => return unauthorized("missing_auth", "Authorization header required"),
    };

    if state.tokens.validate(token) {
        next.run(request).await
    } else {
        unauthorized("invalid_token", "Invalid access token")
    }
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint (no auth required)
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Builds the full application router.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new().route("/health", get(health));

    let protected_routes = Router::new()
        .route("/ROs/", post(routes::create_ro))
        .route(
            "/ROs/{ro}/",
            get(routes::describe_ro).delete(routes::delete_ro),
        )
        .route(
            "/ROs/{ro}/{*path}",
            get(routes::get_item)
                .put(routes::put_item)
                .delete(routes::delete_item),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use ro_sync_core::remote::RoDocument;
    use ro_sync_core::{Annotation, Subject};
    use tower::ServiceExt;

    const TOKEN: &str = "test-token";

    fn app() -> Router {
        router(AppState::new(
            TokenStore::new([TOKEN.to_string()]),
            Some("http://rosync.test".into()),
        ))
    }

    fn request(method: Method, uri: &str, body: Body) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", TOKEN))
            .body(body)
            .unwrap()
    }

    fn create(name: &str) -> Request<Body> {
        let mut req = request(
            Method::POST,
            "/ROs/",
            Body::from(format!(r#"{{"name":"{}"}}"#, name)),
        );
        req.headers_mut()
            .insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
        req
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn test_health_needs_no_token() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_or_bad_token_is_unauthorized() {
        let app = app();
        let response = app
            .clone()
            .oneshot(Request::get("/ROs/x/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(
                Request::get("/ROs/x/")
                    .header(header::AUTHORIZATION, "Bearer wrong")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_create_then_conflict() {
        let app = app();
        let response = app.clone().oneshot(create("RO test")).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers()[header::LOCATION],
            "http://rosync.test/ROs/RO_test/"
        );

        let response = app.oneshot(create("RO test")).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_resource_lifecycle() {
        let app = app();
        app.clone().oneshot(create("r")).await.unwrap();

        let put = |body: &'static str| {
            let mut req = request(Method::PUT, "/ROs/r/sub%20dir/a.txt", Body::from(body));
            req.headers_mut()
                .insert(header::CONTENT_TYPE, "text/plain".parse().unwrap());
            req
        };
        let response = app.clone().oneshot(put("one")).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(response.headers().contains_key(header::ETAG));
        let response = app.clone().oneshot(put("two")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(request(Method::GET, "/ROs/r/sub%20dir/a.txt", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
        assert_eq!(body_bytes(response).await, b"two");

        let response = app
            .clone()
            .oneshot(request(Method::GET, "/ROs/r/", Body::empty()))
            .await
            .unwrap();
        let doc: RoDocument = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(doc.resources.len(), 1);
        assert_eq!(doc.resources[0].id.as_str(), "sub dir/a.txt");

        let response = app
            .clone()
            .oneshot(request(Method::DELETE, "/ROs/r/sub%20dir/a.txt", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let response = app
            .oneshot(request(Method::DELETE, "/ROs/r/sub%20dir/a.txt", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_annotation_key_must_match() {
        let app = app();
        app.clone().oneshot(create("r")).await.unwrap();
        let ann = Annotation::new(Subject::Ro, "title", "T");
        let body = serde_json::to_vec(&ann).unwrap();

        let response = app
            .clone()
            .oneshot(request(
                Method::PUT,
                "/ROs/r/.ro/annotations/wrong",
                Body::from(body.clone()),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let uri = format!("/ROs/r/.ro/annotations/{}", ann.key());
        let response = app
            .clone()
            .oneshot(request(Method::PUT, &uri, Body::from(body)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .oneshot(request(Method::DELETE, &uri, Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_metadata_paths_are_not_resources() {
        let app = app();
        app.clone().oneshot(create("r")).await.unwrap();
        let response = app
            .oneshot(request(
                Method::PUT,
                "/ROs/r/.ro/manifest.json",
                Body::from("{}"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_token_store_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.yaml");
        std::fs::write(&path, "access_tokens:\n  - abc\n  - def\n").unwrap();

        let store = TokenStore::load(&path);
        assert!(store.validate("abc"));
        assert!(store.validate("def"));
        assert!(!store.validate("xyz"));
        assert!(!TokenStore::load(&temp_dir.path().join("missing.yaml")).validate("abc"));
    }
}
