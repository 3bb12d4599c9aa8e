//! Handlers for the RO collection.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use ro_sync_core::remote::{ro_slug, CreateRoRequest, RosrsClient};
use ro_sync_core::{Annotation, ResourceId};
use serde::Serialize;

use super::repository::{ro_uri, RepositoryError};
use super::AppState;

const ANNOTATIONS_PREFIX: &str = ".ro/annotations/";

/// Error body returned by every handler.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: &'static str,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: "bad_request",
            message: message.into(),
        }
    }
}

impl From<RepositoryError> for ApiError {
    fn from(e: RepositoryError) -> Self {
        let (status, error) = match &e {
            RepositoryError::RoNotFound(_) | RepositoryError::ItemNotFound(_) => {
                (StatusCode::NOT_FOUND, "not_found")
            }
            RepositoryError::RoExists(_) => (StatusCode::CONFLICT, "conflict"),
            RepositoryError::InvalidSlug(_) => (StatusCode::BAD_REQUEST, "bad_request"),
        };
        Self {
            status,
            error,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.error,
                message: self.message,
            }),
        )
            .into_response()
    }
}

/// What a path below an RO refers to.
enum Item {
    Resource(ResourceId),
    Annotation(String),
}

fn parse_item(path: &str) -> Result<Item, ApiError> {
    if let Some(key) = path.strip_prefix(ANNOTATIONS_PREFIX) {
        if key.is_empty() || key.contains('/') {
            return Err(ApiError::bad_request(format!("invalid annotation key '{}'", key)));
        }
        return Ok(Item::Annotation(key.to_string()));
    }
    ResourceId::new(path)
        .map(Item::Resource)
        .map_err(|e| ApiError::bad_request(e.to_string()))
}

fn created_or_ok(created: bool) -> StatusCode {
    if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    }
}

/// `POST /ROs/`
pub async fn create_ro(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateRoRequest>,
) -> Result<Response, ApiError> {
    let slug = headers
        .get("slug")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| ro_slug(&body.name));

    state
        .repository
        .write()
        .await
        .create_ro(&slug, &body.name)?;

    let uri = ro_uri(&state.base_url(&headers), &slug);
    tracing::info!("Created RO {} ({})", uri, body.name);
    Ok((StatusCode::CREATED, [(header::LOCATION, uri.to_string())]).into_response())
}

/// `GET /ROs/{ro}/`
pub async fn describe_ro(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let document = state
        .repository
        .read()
        .await
        .document(&state.base_url(&headers), &slug)?;
    Ok(Json(document).into_response())
}

/// `DELETE /ROs/{ro}/`
pub async fn delete_ro(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.repository.write().await.delete_ro(&slug)?;
    tracing::info!("Deleted RO {}", slug);
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /ROs/{ro}/{path}`
pub async fn get_item(
    State(state): State<AppState>,
    Path((slug, path)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let repository = state.repository.read().await;
    match parse_item(&path)? {
        Item::Resource(id) => {
            let resource = repository.resource(&slug, &id)?;
            Ok((
                [
                    (header::CONTENT_TYPE, resource.content_type.clone()),
                    (header::ETAG, resource.etag.clone()),
                ],
                resource.bytes.clone(),
            )
                .into_response())
        }
        Item::Annotation(key) => Ok(Json(repository.annotation(&slug, &key)?.clone()).into_response()),
    }
}

/// `PUT /ROs/{ro}/{path}`
pub async fn put_item(
    State(state): State<AppState>,
    Path((slug, path)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let ro = ro_uri(&state.base_url(&headers), &slug);
    match parse_item(&path)? {
        Item::Resource(id) => {
            let content_type = headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("application/octet-stream")
                .to_string();
            let location = RosrsClient::resource_uri(&ro, &id);
            let (created, etag) = state.repository.write().await.put_resource(
                &slug,
                id,
                body.to_vec(),
                content_type,
            )?;
            tracing::debug!("Stored {} ({} bytes)", location, body.len());
            Ok((
                created_or_ok(created),
                [(header::ETAG, etag), (header::LOCATION, location)],
            )
                .into_response())
        }
        Item::Annotation(key) => {
            let annotation: Annotation = serde_json::from_slice(&body)
                .map_err(|e| ApiError::bad_request(format!("invalid annotation: {}", e)))?;
            if annotation.key() != key {
                return Err(ApiError::bad_request(format!(
                    "annotation key '{}' does not match its content",
                    key
                )));
            }
            let location = RosrsClient::annotation_uri(&ro, &annotation);
            let created = state
                .repository
                .write()
                .await
                .put_annotation(&slug, &key, annotation)?;
            Ok((created_or_ok(created), [(header::LOCATION, location)]).into_response())
        }
    }
}

/// `DELETE /ROs/{ro}/{path}`
pub async fn delete_item(
    State(state): State<AppState>,
    Path((slug, path)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let mut repository = state.repository.write().await;
    match parse_item(&path)? {
        Item::Resource(id) => repository.delete_resource(&slug, &id)?,
        Item::Annotation(key) => repository.delete_annotation(&slug, &key)?,
    }
    Ok(StatusCode::NO_CONTENT)
}
