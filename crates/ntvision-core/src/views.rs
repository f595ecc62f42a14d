//! Data-only view-models handed to whatever draws the dashboard.

use std::fmt;

use chrono::{DateTime, Local, TimeZone, Utc};
use serde::Serialize;

use crate::camera::CameraSet;
use crate::model::DetectionRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
}

impl ConfidenceBand {
    pub fn of(confidence: f64) -> Self {
        if confidence >= 80.0 {
            ConfidenceBand::High
        } else if confidence >= 60.0 {
            ConfidenceBand::Medium
        } else {
            ConfidenceBand::Low
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConfidenceBand::High => "high",
            ConfidenceBand::Medium => "medium",
            ConfidenceBand::Low => "low",
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            ConfidenceBand::High => "High Confidence",
            ConfidenceBand::Medium => "Medium Confidence",
            ConfidenceBand::Low => "Low Confidence",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfidenceBadge {
    pub band: ConfidenceBand,
    pub label: String,
}

impl ConfidenceBadge {
    pub fn new(confidence: f64) -> Self {
        Self {
            band: ConfidenceBand::of(confidence),
            label: format!("{}%", confidence.round() as i64),
        }
    }
}

/// Usage band of a percentage metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Normal,
    Warning,
    Critical,
}

impl Severity {
    pub fn of(percent: u8) -> Self {
        if percent > 80 {
            Severity::Critical
        } else if percent > 60 {
            Severity::Warning
        } else {
            Severity::Normal
        }
    }

    pub fn color_token(self) -> &'static str {
        match self {
            Severity::Normal => "success",
            Severity::Warning => "warning",
            Severity::Critical => "danger",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricView {
    pub percent: u8,
    pub severity: Severity,
}

impl MetricView {
    pub fn new(raw_percent: f64) -> Self {
        let percent = if raw_percent.is_finite() {
            raw_percent.round().clamp(0.0, 100.0) as u8
        } else {
            0
        };
        Self {
            percent,
            severity: Severity::of(percent),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowAction {
    View {
        image_url: Option<String>,
        camera: String,
        time: String,
        confidence: f64,
    },
    Download {
        image_path: String,
    },
    Delete {
        id: i64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionRow {
    pub id: i64,
    pub time: String,
    pub camera: String,
    pub confidence: ConfidenceBadge,
    pub thumbnail: Option<String>,
    pub actions: Vec<RowAction>,
}

impl DetectionRow {
    pub fn new(record: &DetectionRecord, cameras: &CameraSet) -> Self {
        let time = format_datetime(&record.timestamp);
        let camera = cameras.display_name(&record.camera_id).to_string();
        let thumbnail = record.image_path.as_deref().map(image_url);

        let mut actions = vec![RowAction::View {
            image_url: thumbnail.clone(),
            camera: camera.clone(),
            time: time.clone(),
            confidence: record.confidence,
        }];
        if let Some(path) = &record.image_path {
            actions.push(RowAction::Download {
                image_path: path.clone(),
            });
        }
        actions.push(RowAction::Delete { id: record.id });

        Self {
            id: record.id,
            time,
            camera,
            confidence: ConfidenceBadge::new(record.confidence),
            thumbnail,
            actions,
        }
    }

    /// Text a user can see in the row, used by the search filter.
    pub fn searchable_text(&self) -> String {
        format!("{} {} {}", self.time, self.camera, self.confidence.label).to_lowercase()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TableRow {
    Placeholder { message: String },
    Detection(DetectionRow),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityItem {
    pub title: String,
    pub detail: String,
    pub time_ago: String,
}

impl ActivityItem {
    pub fn new(record: &DetectionRecord, cameras: &CameraSet, now: DateTime<Utc>) -> Self {
        Self {
            title: "Person Detected".to_string(),
            detail: format!(
                "{} - Confidence: {}%",
                cameras.display_name(&record.camera_id),
                record.confidence.round() as i64
            ),
            time_ago: time_ago(&record.timestamp, now),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CameraCard {
    pub id: String,
    pub display_name: String,
    pub live: bool,
    pub active: bool,
    pub preview_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoView {
    pub camera_id: String,
    pub display_name: String,
    pub source_url: String,
}

pub fn image_url(image_path: &str) -> String {
    format!("/image/{}", image_path.trim_start_matches('/'))
}

/// Table timestamp in the viewer's local zone, matching the chart labels.
pub fn format_datetime(ts: &DateTime<Utc>) -> String {
    format_datetime_in(ts, &Local)
}

pub fn format_datetime_in<Tz>(ts: &DateTime<Utc>, zone: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    ts.with_timezone(zone).format("%b %-d, %Y, %H:%M").to_string()
}

pub fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;

    if days > 0 {
        format!("Running {days}d {hours}h")
    } else if hours > 0 {
        format!("Running {hours}h {minutes}m")
    } else {
        format!("Running {minutes}m")
    }
}

pub fn time_ago(ts: &DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - *ts).num_seconds();
    if seconds < 60 {
        format!("{seconds} seconds ago")
    } else if seconds < 3_600 {
        format!("{} minutes ago", seconds / 60)
    } else if seconds < 86_400 {
        format!("{} hours ago", seconds / 3_600)
    } else {
        format!("{} days ago", seconds / 86_400)
    }
}
