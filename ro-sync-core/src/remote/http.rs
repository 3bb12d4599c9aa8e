//! HTTP client for a ROSRS-style digital library service.
//!
//! # Endpoints
//!
//! ```text
//! POST   <base>                           create RO (Slug header)
//! GET    <base><ro>/                      RO document (name, resources, annotations)
//! DELETE <base><ro>/                      delete RO
//! PUT    <base><ro>/<path>                create/replace resource
//! GET    <base><ro>/<path>                resource content
//! DELETE <base><ro>/<path>                delete resource
//! PUT    <base><ro>/.ro/annotations/<key> create/replace annotation
//! DELETE <base><ro>/.ro/annotations/<key> retract annotation
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, ETAG, LOCATION};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

use super::{
    ro_slug, RemoteAnnotation, RemoteEntry, RemoteResource, RemoteRoInfo, RemoteStore, RoUri,
};
use crate::error::{SyncError, SyncResult};
use crate::model::{Annotation, ResourceId, METADATA_DIR};

/// Default timeout for a single HTTP request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings, passed explicitly to every client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// RO collection URI, e.g. `http://sandbox.example.org/rodl/ROs/`.
    pub base_uri: String,
    /// Bearer token sent with every request.
    pub access_token: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_uri: impl Into<String>) -> Self {
        let mut base_uri = base_uri.into();
        if !base_uri.ends_with('/') {
            base_uri.push('/');
        }
        Self {
            base_uri,
            access_token: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Body of `POST <base>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRoRequest {
    pub name: String,
}

/// Body of `GET <base><ro>/`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoDocument {
    pub uri: String,
    pub name: String,
    #[serde(default)]
    pub resources: Vec<RemoteResource>,
    #[serde(default)]
    pub annotations: Vec<RemoteAnnotation>,
}

/// `reqwest`-backed [`RemoteStore`].
#[derive(Debug, Clone)]
pub struct RosrsClient {
    config: ClientConfig,
    http: reqwest::Client,
}

impl RosrsClient {
    pub fn new(config: ClientConfig) -> SyncResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SyncError::RemoteUnavailable(e.to_string()))?;
        Ok(Self { config, http })
    }

    pub fn base_uri(&self) -> &str {
        &self.config.base_uri
    }

    /// URI of a resource inside an RO; each path segment is percent-encoded.
    pub fn resource_uri(ro: &RoUri, id: &ResourceId) -> String {
        let path = id
            .as_str()
            .split('/')
            .map(urlencoding::encode)
            .collect::<Vec<_>>()
            .join("/");
        format!("{}{}", ro, path)
    }

    pub fn annotation_uri(ro: &RoUri, annotation: &Annotation) -> String {
        format!("{}{}/annotations/{}", ro, METADATA_DIR, annotation.key())
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.config.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, uri: &str) -> SyncResult<Response> {
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                SyncError::Timeout(self.config.timeout)
            } else {
                SyncError::RemoteUnavailable(format!("{}: {}", uri, e))
            }
        })?;
        check_status(response, uri).await
    }

    async fn fetch_document(&self, ro: &RoUri) -> SyncResult<RoDocument> {
        let response = self
            .send(self.request(Method::GET, ro.as_str()), ro.as_str())
            .await?;
        response.json().await.map_err(|e| SyncError::Remote {
            status: 200,
            uri: ro.to_string(),
            message: format!("invalid RO document: {}", e),
        })
    }
}

async fn check_status(response: Response, uri: &str) -> SyncResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match status {
        StatusCode::NOT_FOUND => Err(SyncError::NotFound(uri.to_string())),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(SyncError::Unauthorized(uri.to_string()))
        }
        _ => {
            let message = response.text().await.unwrap_or_default();
            Err(SyncError::Remote {
                status: status.as_u16(),
                uri: uri.to_string(),
                message,
            })
        }
    }
}

fn header_string(response: &Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[async_trait]
impl RemoteStore for RosrsClient {
    fn resolve(&self, name_or_uri: &str) -> RoUri {
        if name_or_uri.starts_with("http://") || name_or_uri.starts_with("https://") {
            RoUri::new(name_or_uri)
        } else {
            let slug = ro_slug(name_or_uri);
            RoUri::new(format!(
                "{}{}",
                self.config.base_uri,
                urlencoding::encode(&slug)
            ))
        }
    }

    async fn create_ro(&self, name: &str) -> SyncResult<RoUri> {
        let base = self.config.base_uri.as_str();
        let request = self
            .request(Method::POST, base)
            .header("Slug", ro_slug(name))
            .json(&CreateRoRequest {
                name: name.to_string(),
            });
        let response = match request.send().await {
            Ok(response) if response.status() == StatusCode::CONFLICT => {
                tracing::debug!("RO {} already exists", name);
                return Ok(self.resolve(name));
            }
            Ok(response) => check_status(response, base).await?,
            Err(e) => return Err(SyncError::RemoteUnavailable(format!("{}: {}", base, e))),
        };

        match header_string(&response, LOCATION) {
            Some(location) if location.starts_with("http") => Ok(RoUri::new(location)),
            _ => Ok(self.resolve(name)),
        }
    }

    async fn describe(&self, ro: &RoUri) -> SyncResult<RemoteRoInfo> {
        let doc = self.fetch_document(ro).await?;
        Ok(RemoteRoInfo {
            uri: ro.clone(),
            name: doc.name,
        })
    }

    async fn list_resources(&self, ro: &RoUri) -> SyncResult<Vec<RemoteResource>> {
        Ok(self.fetch_document(ro).await?.resources)
    }

    async fn fetch_resource(
        &self,
        _ro: &RoUri,
        resource: &RemoteResource,
    ) -> SyncResult<Vec<u8>> {
        let uri = resource.uri.as_str();
        let response = self.send(self.request(Method::GET, uri), uri).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| SyncError::RemoteUnavailable(format!("{}: {}", uri, e)))?;
        Ok(bytes.to_vec())
    }

    async fn upload_resource(
        &self,
        ro: &RoUri,
        id: &ResourceId,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> SyncResult<RemoteEntry> {
        let uri = Self::resource_uri(ro, id);
        let request = self
            .request(Method::PUT, &uri)
            .header(CONTENT_TYPE, content_type)
            .body(bytes);
        let response = self.send(request, &uri).await?;
        Ok(RemoteEntry {
            etag: header_string(&response, ETAG),
            uri: header_string(&response, LOCATION).unwrap_or(uri),
        })
    }

    async fn delete_resource(&self, _ro: &RoUri, uri: &str) -> SyncResult<()> {
        self.send(self.request(Method::DELETE, uri), uri).await?;
        Ok(())
    }

    async fn list_annotations(&self, ro: &RoUri) -> SyncResult<Vec<RemoteAnnotation>> {
        Ok(self.fetch_document(ro).await?.annotations)
    }

    async fn push_annotation(
        &self,
        ro: &RoUri,
        annotation: &Annotation,
    ) -> SyncResult<RemoteEntry> {
        let uri = Self::annotation_uri(ro, annotation);
        let request = self.request(Method::PUT, &uri).json(annotation);
        let response = self.send(request, &uri).await?;
        Ok(RemoteEntry {
            etag: header_string(&response, ETAG),
            uri,
        })
    }

    async fn retract_annotation(&self, _ro: &RoUri, uri: &str) -> SyncResult<()> {
        self.send(self.request(Method::DELETE, uri), uri).await?;
        Ok(())
    }

    async fn delete_ro(&self, ro: &RoUri) -> SyncResult<()> {
        self.send(self.request(Method::DELETE, ro.as_str()), ro.as_str())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Subject;

    fn client() -> RosrsClient {
        RosrsClient::new(ClientConfig::new("http://sandbox.example.org/rodl/ROs").with_token("t"))
            .unwrap()
    }

    #[test]
    fn test_config_normalizes_base() {
        let config = ClientConfig::new("http://x/ROs");
        assert_eq!(config.base_uri, "http://x/ROs/");
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_resolve_name() {
        let ro = client().resolve("RO test ro push");
        assert_eq!(
            ro.as_str(),
            "http://sandbox.example.org/rodl/ROs/RO_test_ro_push/"
        );
    }

    #[test]
    fn test_resolve_uri_passthrough() {
        let ro = client().resolve("https://other.example.org/ROs/abc");
        assert_eq!(ro.as_str(), "https://other.example.org/ROs/abc/");
    }

    #[test]
    fn test_resource_uri_encodes_segments() {
        let ro = RoUri::new("http://x/ROs/r/");
        let id = ResourceId::new("sub dir/file #1.txt").unwrap();
        assert_eq!(
            RosrsClient::resource_uri(&ro, &id),
            "http://x/ROs/r/sub%20dir/file%20%231.txt"
        );
    }

    #[test]
    fn test_annotation_uri_uses_key() {
        let ro = RoUri::new("http://x/ROs/r/");
        let ann = Annotation::new(Subject::Ro, "title", "T");
        let uri = RosrsClient::annotation_uri(&ro, &ann);
        assert_eq!(uri, format!("http://x/ROs/r/.ro/annotations/{}", ann.key()));
    }

    #[test]
    fn test_ro_document_parses() {
        let json = r#"{
            "uri": "http://x/ROs/r/",
            "name": "r",
            "resources": [{"id": "a.txt", "uri": "http://x/ROs/r/a.txt", "etag": "\"1\""}],
            "annotations": [{"uri": "http://x/ROs/r/.ro/annotations/k",
                             "subject": "a.txt", "property": "type", "value": "v"}]
        }"#;
        let doc: RoDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.resources[0].id.as_str(), "a.txt");
        assert_eq!(doc.annotations[0].annotation.property, "type");
    }
}
