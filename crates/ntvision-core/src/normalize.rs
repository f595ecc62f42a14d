use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, TimeZone};
use serde::Serialize;

use crate::camera::CameraSet;
use crate::model::DetectionRecord;

const HOUR_MS: i64 = 3_600_000;
const DAY_MS: i64 = 24 * HOUR_MS;

/// Positionally aligned labels and values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChartSeries {
    labels: Vec<String>,
    values: Vec<u64>,
}

impl ChartSeries {
    /// Zips the pairs so both halves always have the same length.
    pub fn from_points<I, S>(points: I) -> Self
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        let (labels, values) = points.into_iter().map(|(l, v)| (l.into(), v)).unzip();
        Self { labels, values }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn values(&self) -> &[u64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn points(&self) -> impl Iterator<Item = (&str, u64)> {
        self.labels.iter().map(String::as_str).zip(self.values.iter().copied())
    }

    /// Same labels, every value zeroed.
    pub fn zeroed(&self) -> Self {
        Self {
            labels: self.labels.clone(),
            values: vec![0; self.values.len()],
        }
    }
}

/// Analytics chart window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Period {
    #[default]
    #[serde(rename = "24h")]
    Hours24,
    #[serde(rename = "7d")]
    Days7,
    #[serde(rename = "30d")]
    Days30,
}

impl Period {
    pub fn next(self) -> Self {
        match self {
            Period::Hours24 => Period::Days7,
            Period::Days7 => Period::Days30,
            Period::Days30 => Period::Hours24,
        }
    }

    pub fn series<Tz>(self, records: &[DetectionRecord], now: &DateTime<Tz>) -> ChartSeries
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        match self {
            Period::Hours24 => bucket_by_hour(records, now),
            Period::Days7 => bucket_by_day(records, now, 7),
            Period::Days30 => bucket_by_day(records, now, 30),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Period::Hours24 => "24h",
            Period::Days7 => "7d",
            Period::Days30 => "30d",
        })
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "24h" => Ok(Period::Hours24),
            "7d" => Ok(Period::Days7),
            "30d" => Ok(Period::Days30),
            other => Err(format!("unknown period {other:?}")),
        }
    }
}

fn bucket_counts(records: &[DetectionRecord], now_ms: i64, span_ms: i64, buckets: usize) -> Vec<u64> {
    let mut counts = vec![0_u64; buckets];
    for record in records {
        let age = now_ms - record.timestamp.timestamp_millis();
        let steps_back = age.div_euclid(span_ms);
        if steps_back < 0 || steps_back >= buckets as i64 {
            continue;
        }
        counts[buckets - 1 - steps_back as usize] += 1;
    }
    counts
}

/// 24 hourly buckets ending at `now`, labeled `HH:00` in `now`'s zone.
pub fn bucket_by_hour<Tz>(records: &[DetectionRecord], now: &DateTime<Tz>) -> ChartSeries
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let counts = bucket_counts(records, now.timestamp_millis(), HOUR_MS, 24);
    ChartSeries::from_points((0..24_i64).zip(counts).map(|(i, count)| {
        let at = now.clone() - Duration::hours(23 - i);
        (at.format("%H:00").to_string(), count)
    }))
}

/// `days` daily buckets ending at `now`, labeled like `Jan 5`.
pub fn bucket_by_day<Tz>(records: &[DetectionRecord], now: &DateTime<Tz>, days: usize) -> ChartSeries
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let counts = bucket_counts(records, now.timestamp_millis(), DAY_MS, days);
    let last = days as i64 - 1;
    ChartSeries::from_points((0..days as i64).zip(counts).map(|(i, count)| {
        let at = now.clone() - Duration::days(last - i);
        (at.format("%b %-d").to_string(), count)
    }))
}

/// Counts in camera display order; cameras missing from the map count 0.
pub fn aggregate_by_camera(total_counts: &BTreeMap<String, u64>, cameras: &CameraSet) -> Vec<u64> {
    cameras
        .iter()
        .map(|camera| total_counts.get(&camera.id).copied().unwrap_or(0))
        .collect()
}

/// Per-camera breakdown as a chart series labeled with display names.
pub fn camera_series(total_counts: &BTreeMap<String, u64>, cameras: &CameraSet) -> ChartSeries {
    ChartSeries::from_points(
        cameras
            .iter()
            .map(|c| c.display_name.clone())
            .zip(aggregate_by_camera(total_counts, cameras)),
    )
}
