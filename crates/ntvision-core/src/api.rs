//! Typed calls on top of [`Backend`].

use chrono::NaiveDate;
use serde::de::DeserializeOwned;

use crate::gateway::{Backend, Endpoint, FetchError};
use crate::model::{DetectionRecord, DetectionsByDate, DetectionsPayload, StatusReply, SystemStats};

async fn fetch_typed<B, T>(backend: &B, endpoint: &Endpoint) -> Result<T, FetchError>
where
    B: Backend + ?Sized,
    T: DeserializeOwned,
{
    let value = backend.fetch_json(endpoint).await?;
    serde_json::from_value(value).map_err(|err| FetchError::Parse(format!("{}: {err}", endpoint.route())))
}

async fn acknowledge<B: Backend + ?Sized>(backend: &B, endpoint: &Endpoint) -> Result<(), FetchError> {
    let reply: StatusReply = fetch_typed(backend, endpoint).await?;
    if reply.is_success() {
        Ok(())
    } else {
        Err(FetchError::Rejected(
            reply.message.unwrap_or_else(|| format!("status {}", reply.status)),
        ))
    }
}

pub async fn get_system_stats<B: Backend + ?Sized>(backend: &B) -> Result<SystemStats, FetchError> {
    fetch_typed(backend, &Endpoint::SystemStats).await
}

pub async fn get_all_detections<B: Backend + ?Sized>(
    backend: &B,
) -> Result<DetectionsPayload, FetchError> {
    fetch_typed(backend, &Endpoint::AllDetections).await
}

pub async fn get_detections_by_date<B: Backend + ?Sized>(
    backend: &B,
    date: NaiveDate,
) -> Result<Vec<DetectionRecord>, FetchError> {
    let body: DetectionsByDate = fetch_typed(backend, &Endpoint::DetectionsByDate(date)).await?;
    Ok(body.detections)
}

pub async fn switch_camera<B: Backend + ?Sized>(backend: &B, camera_id: &str) -> Result<(), FetchError> {
    acknowledge(backend, &Endpoint::SwitchCamera(camera_id.to_string())).await
}

pub async fn delete_detection<B: Backend + ?Sized>(backend: &B, id: i64) -> Result<(), FetchError> {
    acknowledge(backend, &Endpoint::DeleteDetection(id)).await
}

pub async fn export_csv<B: Backend + ?Sized>(backend: &B) -> Result<Vec<u8>, FetchError> {
    backend.fetch_blob(&Endpoint::ExportCsv).await
}

pub async fn fetch_image<B: Backend + ?Sized>(backend: &B, image_path: &str) -> Result<Vec<u8>, FetchError> {
    backend.fetch_blob(&Endpoint::Image(image_path.to_string())).await
}

pub fn video_feed_url<B: Backend + ?Sized>(backend: &B, camera_id: &str, cache_bust: Option<i64>) -> String {
    backend.resource_url(&Endpoint::VideoFeed {
        camera_id: camera_id.to_string(),
        cache_bust,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedBackend;
    use serde_json::json;

    #[tokio::test]
    async fn structured_error_status_is_a_rejection() {
        let backend = ScriptedBackend::new();
        backend.push_json(
            "/switch_camera/Nowhere",
            json!({"status": "error", "message": "Camera not found"}),
        );

        let err = switch_camera(&backend, "Nowhere").await.expect_err("rejected");

        assert_eq!(err, FetchError::Rejected("Camera not found".to_string()));
    }

    #[tokio::test]
    async fn wrong_shape_is_a_parse_error() {
        let backend = ScriptedBackend::new();
        backend.push_json("/get_system_stats", json!({"cpu_percent": "busy"}));

        let err = get_system_stats(&backend).await.expect_err("parse error");

        assert!(matches!(err, FetchError::Parse(_)));
    }

    #[tokio::test]
    async fn by_date_unwraps_detection_list() {
        let backend = ScriptedBackend::new();
        backend.push_json(
            "/get_detections_by_date",
            json!({"detections": [
                {"id": 3, "camera_id": "Main Entrance", "timestamp": "2024-03-02T08:15:00", "confidence": 64.0}
            ]}),
        );
        let date = NaiveDate::from_ymd_opt(2024, 3, 2).expect("date");

        let records = get_detections_by_date(&backend, date).await.expect("records");

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, 3);
    }
}
