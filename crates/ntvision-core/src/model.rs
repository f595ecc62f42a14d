use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// One person detection reported by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub id: i64,
    pub camera_id: String,
    #[serde(deserialize_with = "de_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub confidence: f64,
    #[serde(default, deserialize_with = "de_non_empty")]
    pub image_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStats {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
    pub active_cameras: u32,
    pub total_cameras: u32,
    #[serde(rename = "uptime", default, deserialize_with = "de_whole_seconds")]
    pub uptime_seconds: u64,
}

/// Body of `/get_all_detections`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionsPayload {
    /// Per-camera counts plus a `total` entry.
    #[serde(default)]
    pub total_counts: BTreeMap<String, u64>,
    #[serde(default)]
    pub recent_detections: Vec<DetectionRecord>,
}

impl DetectionsPayload {
    pub fn total(&self) -> u64 {
        self.total_counts.get("total").copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct DetectionsByDate {
    #[serde(default)]
    pub detections: Vec<DetectionRecord>,
}

/// Structured `{status, message}` acknowledgement.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StatusReply {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

impl StatusReply {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn de_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("unrecognized timestamp: {raw}")))
}

fn de_non_empty<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()))
}

fn de_whole_seconds<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?;
    Ok(raw.filter(|v| v.is_finite() && *v > 0.0).map(|v| v as u64).unwrap_or(0))
}
