use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, Method, Url};
use thiserror::Error;
use tracing::debug;

/// Backend routes consumed by the dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    SystemStats,
    AllDetections,
    DetectionsByDate(NaiveDate),
    VideoFeed { camera_id: String, cache_bust: Option<i64> },
    SwitchCamera(String),
    DeleteDetection(i64),
    ExportCsv,
    Image(String),
}

impl Endpoint {
    pub fn method(&self) -> Method {
        match self {
            Endpoint::DeleteDetection(_) => Method::DELETE,
            _ => Method::GET,
        }
    }

    /// Unencoded path segments.
    pub fn segments(&self) -> Vec<String> {
        match self {
            Endpoint::SystemStats => vec!["get_system_stats".to_string()],
            Endpoint::AllDetections => vec!["get_all_detections".to_string()],
            Endpoint::DetectionsByDate(_) => vec!["get_detections_by_date".to_string()],
            Endpoint::VideoFeed { .. } => vec!["video_feed".to_string()],
            Endpoint::SwitchCamera(id) => vec!["switch_camera".to_string(), id.clone()],
            Endpoint::DeleteDetection(_) => vec!["delete_detection".to_string()],
            Endpoint::ExportCsv => vec!["export_csv".to_string()],
            Endpoint::Image(path) => std::iter::once("image".to_string())
                .chain(path.split('/').filter(|s| !s.is_empty()).map(str::to_string))
                .collect(),
        }
    }

    pub fn query(&self) -> Vec<(&'static str, String)> {
        match self {
            Endpoint::DetectionsByDate(date) => vec![("date", date.format("%Y-%m-%d").to_string())],
            Endpoint::VideoFeed {
                camera_id,
                cache_bust,
            } => {
                let mut query = vec![("camera_id", camera_id.clone())];
                if let Some(t) = cache_bust {
                    query.push(("t", t.to_string()));
                }
                query
            }
            Endpoint::DeleteDetection(id) => vec![("id", id.to_string())],
            _ => Vec::new(),
        }
    }

    /// Short route name for logs, e.g. `/switch_camera/Lobby Camera`.
    pub fn route(&self) -> String {
        format!("/{}", self.segments().join("/"))
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },
    #[error("malformed payload: {0}")]
    Parse(String),
    #[error("rejected by backend: {0}")]
    Rejected(String),
}

impl FetchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn message(&self) -> String {
        match self {
            FetchError::HttpStatus { message, .. } => message.clone(),
            FetchError::Transport(m) | FetchError::Parse(m) | FetchError::Rejected(m) => m.clone(),
        }
    }
}

/// Thin request layer. No retries, no caching.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn fetch_json(&self, endpoint: &Endpoint) -> Result<serde_json::Value, FetchError>;
    async fn fetch_blob(&self, endpoint: &Endpoint) -> Result<Vec<u8>, FetchError>;
    /// Absolute URL of a resource the front end loads by itself (video streams).
    fn resource_url(&self, endpoint: &Endpoint) -> String;
}

pub struct HttpBackend {
    client: Client,
    base: Url,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let base = Url::parse(base_url)
            .map_err(|err| FetchError::Transport(format!("invalid base url {base_url}: {err}")))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| FetchError::Transport(err.to_string()))?;
        Ok(Self { client, base })
    }

    pub fn url(&self, endpoint: &Endpoint) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty();
            for segment in endpoint.segments() {
                segments.push(&segment);
            }
        }
        let query = endpoint.query();
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        url
    }

    async fn send(&self, endpoint: &Endpoint) -> Result<Vec<u8>, FetchError> {
        let url = self.url(endpoint);
        debug!(method = %endpoint.method(), %url, "backend request");

        let response = self
            .client
            .request(endpoint.method(), url)
            .send()
            .await
            .map_err(|err| FetchError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                message: if message.is_empty() {
                    status.canonical_reason().unwrap_or("request failed").to_string()
                } else {
                    message
                },
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| FetchError::Transport(err.to_string()))?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn fetch_json(&self, endpoint: &Endpoint) -> Result<serde_json::Value, FetchError> {
        let body = self.send(endpoint).await?;
        serde_json::from_slice(&body).map_err(|err| FetchError::Parse(err.to_string()))
    }

    async fn fetch_blob(&self, endpoint: &Endpoint) -> Result<Vec<u8>, FetchError> {
        self.send(endpoint).await
    }

    fn resource_url(&self, endpoint: &Endpoint) -> String {
        self.url(endpoint).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> HttpBackend {
        HttpBackend::new("http://localhost:5000", Duration::from_secs(1)).expect("backend")
    }

    #[test]
    fn camera_ids_are_percent_encoded_as_one_segment() {
        let url = backend().url(&Endpoint::SwitchCamera("Front Gate Camera".to_string()));
        assert_eq!(url.as_str(), "http://localhost:5000/switch_camera/Front%20Gate%20Camera");
    }

    #[test]
    fn image_paths_keep_their_directories() {
        let url = backend().url(&Endpoint::Image("2024-01-01/Lobby Camera/a.jpg".to_string()));
        assert_eq!(url.path(), "/image/2024-01-01/Lobby%20Camera/a.jpg");
    }

    #[test]
    fn video_feed_carries_cache_bust() {
        let url = backend().url(&Endpoint::VideoFeed {
            camera_id: "Main Entrance".to_string(),
            cache_bust: Some(1700000000000),
        });
        assert_eq!(url.query(), Some("camera_id=Main+Entrance&t=1700000000000"));
    }

    #[test]
    fn delete_uses_delete_method_and_id_query() {
        let endpoint = Endpoint::DeleteDetection(42);
        assert_eq!(endpoint.method(), Method::DELETE);
        assert_eq!(backend().url(&endpoint).query(), Some("id=42"));
    }

    #[test]
    fn only_http_errors_carry_status() {
        let err = FetchError::HttpStatus {
            status: 503,
            message: "down".to_string(),
        };
        assert_eq!(err.status(), Some(503));
        assert_eq!(FetchError::Transport("refused".to_string()).status(), None);
    }
}
