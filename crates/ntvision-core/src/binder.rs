use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::sleep;
use tracing::debug;

use crate::camera::CameraSet;
use crate::model::DetectionRecord;
use crate::normalize::ChartSeries;
use crate::views::{ActivityItem, CameraCard, DetectionRow, MetricView, TableRow, VideoView};

pub const NO_DETECTIONS: &str = "No detections found";
pub const DETECTIONS_UNAVAILABLE: &str = "Unable to load detections";
pub const ACTIVITY_IDLE: &str = "Monitoring for activity...";
pub const ACTIVITY_UNAVAILABLE: &str = "Unable to load activity data";

/// Logical dashboard slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum WidgetId {
    CpuMetric,
    MemoryMetric,
    StorageMetric,
    ActiveCameras,
    Uptime,
    TotalDetections,
    DetectionsTable,
    ActivityFeed,
    AnalyticsChart,
    TrendsChart,
    PerformanceChart,
    MainVideo,
    CameraGrid,
    LoadingIndicator,
    ErrorIndicator,
    Page,
}

impl WidgetId {
    pub const ALL: [WidgetId; 16] = [
        WidgetId::CpuMetric,
        WidgetId::MemoryMetric,
        WidgetId::StorageMetric,
        WidgetId::ActiveCameras,
        WidgetId::Uptime,
        WidgetId::TotalDetections,
        WidgetId::DetectionsTable,
        WidgetId::ActivityFeed,
        WidgetId::AnalyticsChart,
        WidgetId::TrendsChart,
        WidgetId::PerformanceChart,
        WidgetId::MainVideo,
        WidgetId::CameraGrid,
        WidgetId::LoadingIndicator,
        WidgetId::ErrorIndicator,
        WidgetId::Page,
    ];

    fn empty_widget(self) -> Widget {
        match self {
            WidgetId::CpuMetric | WidgetId::MemoryMetric | WidgetId::StorageMetric => Widget::Metric(None),
            WidgetId::ActiveCameras | WidgetId::Uptime | WidgetId::Page => Widget::Text(String::new()),
            WidgetId::TotalDetections => Widget::Counter(Counter::default()),
            WidgetId::DetectionsTable => Widget::Table(TableView::default()),
            WidgetId::ActivityFeed => Widget::Feed(FeedView::default()),
            WidgetId::AnalyticsChart | WidgetId::TrendsChart | WidgetId::PerformanceChart => {
                Widget::Chart(ChartView::default())
            }
            WidgetId::MainVideo => Widget::Video(None),
            WidgetId::CameraGrid => Widget::Cards(Vec::new()),
            WidgetId::LoadingIndicator | WidgetId::ErrorIndicator => Widget::Flag(false),
        }
    }
}

/// Numeric counter that eases toward its target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Counter {
    displayed: u64,
    target: u64,
    #[serde(skip)]
    generation: u64,
    #[serde(skip)]
    animating: bool,
}

impl Counter {
    pub fn displayed(&self) -> u64 {
        self.displayed
    }

    pub fn target(&self) -> u64 {
        self.target
    }

    pub fn is_animating(&self) -> bool {
        self.animating
    }

    /// One tick: move `ceil(remaining / divisor)` toward the target.
    /// Returns whether more ticks are needed.
    pub fn step(&mut self, divisor: u64) -> bool {
        if self.displayed < self.target {
            let increment = (self.target - self.displayed).div_ceil(divisor.max(1));
            self.displayed = (self.displayed + increment).min(self.target);
        }
        self.displayed < self.target
    }

    /// Points the counter at `target`. Returns the token of a new animation
    /// when one has to be started; an animation already in flight just
    /// follows the new target.
    fn retarget(&mut self, target: u64) -> Option<u64> {
        self.target = target;
        if self.displayed > target {
            self.displayed = target;
        }
        if self.displayed >= self.target || self.animating {
            return None;
        }
        self.generation += 1;
        self.animating = true;
        Some(self.generation)
    }

    fn advance(&mut self, token: u64, divisor: u64) -> bool {
        if !self.animating || token != self.generation {
            return false;
        }
        let more = self.step(divisor);
        if !more {
            self.animating = false;
        }
        more
    }

    fn set(&mut self, value: u64) {
        self.displayed = value;
        self.target = value;
        self.animating = false;
        self.generation += 1;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableView {
    pub rows: Vec<TableRow>,
    pub filter: Option<String>,
}

impl TableView {
    /// Rows matching the search filter. Placeholder rows always show.
    pub fn visible_rows(&self) -> impl Iterator<Item = &TableRow> {
        let needle = self.filter.as_deref().map(str::to_lowercase);
        self.rows.iter().filter(move |row| match (row, &needle) {
            (TableRow::Detection(det), Some(needle)) => det.searchable_text().contains(needle.as_str()),
            _ => true,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeedView {
    pub items: Vec<ActivityItem>,
    pub placeholder: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Redraw {
    #[default]
    Immediate,
    Animated,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChartView {
    pub series: ChartSeries,
    pub redraw: Redraw,
    /// Bumped on every update so renderers can spot fresh data.
    pub revision: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Widget {
    Metric(Option<MetricView>),
    Text(String),
    Counter(Counter),
    Table(TableView),
    Feed(FeedView),
    Chart(ChartView),
    Video(Option<VideoView>),
    Cards(Vec<CameraCard>),
    Flag(bool),
}

/// Widget slots by id. Ids that were never registered have no slot and
/// every bind against them does nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WidgetRegistry {
    slots: BTreeMap<WidgetId, Widget>,
}

impl WidgetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_all() -> Self {
        let mut registry = Self::new();
        for id in WidgetId::ALL {
            registry.register(id);
        }
        registry
    }

    pub fn register(&mut self, id: WidgetId) {
        self.slots.entry(id).or_insert_with(|| id.empty_widget());
    }

    pub fn is_registered(&self, id: WidgetId) -> bool {
        self.slots.contains_key(&id)
    }

    pub fn get(&self, id: WidgetId) -> Option<&Widget> {
        self.slots.get(&id)
    }

    pub fn metric(&self, id: WidgetId) -> Option<MetricView> {
        match self.slots.get(&id) {
            Some(Widget::Metric(view)) => *view,
            _ => None,
        }
    }

    pub fn text(&self, id: WidgetId) -> Option<&str> {
        match self.slots.get(&id) {
            Some(Widget::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn counter(&self, id: WidgetId) -> Option<&Counter> {
        match self.slots.get(&id) {
            Some(Widget::Counter(counter)) => Some(counter),
            _ => None,
        }
    }

    pub fn table(&self, id: WidgetId) -> Option<&TableView> {
        match self.slots.get(&id) {
            Some(Widget::Table(table)) => Some(table),
            _ => None,
        }
    }

    pub fn feed(&self, id: WidgetId) -> Option<&FeedView> {
        match self.slots.get(&id) {
            Some(Widget::Feed(feed)) => Some(feed),
            _ => None,
        }
    }

    pub fn chart(&self, id: WidgetId) -> Option<&ChartView> {
        match self.slots.get(&id) {
            Some(Widget::Chart(chart)) => Some(chart),
            _ => None,
        }
    }

    pub fn video(&self, id: WidgetId) -> Option<&VideoView> {
        match self.slots.get(&id) {
            Some(Widget::Video(video)) => video.as_ref(),
            _ => None,
        }
    }

    pub fn cards(&self, id: WidgetId) -> Option<&[CameraCard]> {
        match self.slots.get(&id) {
            Some(Widget::Cards(cards)) => Some(cards),
            _ => None,
        }
    }

    pub fn flag(&self, id: WidgetId) -> bool {
        matches!(self.slots.get(&id), Some(Widget::Flag(true)))
    }

    fn slot_mut(&mut self, id: WidgetId) -> Option<&mut Widget> {
        let slot = self.slots.get_mut(&id);
        if slot.is_none() {
            debug!(widget = ?id, "bind skipped, widget not registered");
        }
        slot
    }

    fn counter_mut(&mut self, id: WidgetId) -> Option<&mut Counter> {
        match self.slot_mut(id) {
            Some(Widget::Counter(counter)) => Some(counter),
            _ => None,
        }
    }
}

/// Pushes view-models into the shared registry.
#[derive(Clone)]
pub struct Binder {
    registry: Arc<Mutex<WidgetRegistry>>,
    counter_tick: Duration,
    counter_divisor: u64,
}

impl Binder {
    pub fn new(registry: WidgetRegistry, counter_tick: Duration, counter_divisor: u64) -> Self {
        Self {
            registry: Arc::new(Mutex::new(registry)),
            counter_tick,
            counter_divisor,
        }
    }

    fn lock(&self) -> MutexGuard<'_, WidgetRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of every widget as it stands now.
    pub fn snapshot(&self) -> WidgetRegistry {
        self.lock().clone()
    }

    pub fn read<R>(&self, f: impl FnOnce(&WidgetRegistry) -> R) -> R {
        f(&self.lock())
    }

    pub fn bind_metric(&self, id: WidgetId, raw_percent: f64) {
        if let Some(Widget::Metric(slot)) = self.lock().slot_mut(id) {
            *slot = Some(MetricView::new(raw_percent));
        }
    }

    pub fn bind_text(&self, id: WidgetId, text: impl Into<String>) {
        if let Some(Widget::Text(slot)) = self.lock().slot_mut(id) {
            *slot = text.into();
        }
    }

    pub fn set_flag(&self, id: WidgetId, on: bool) {
        if let Some(Widget::Flag(slot)) = self.lock().slot_mut(id) {
            *slot = on;
        }
    }

    /// Shows `value` right away and stops any running animation.
    pub fn set_counter(&self, id: WidgetId, value: u64) {
        if let Some(counter) = self.lock().counter_mut(id) {
            counter.set(value);
        }
    }

    /// Eases the counter toward `target` on a background task, one step
    /// per tick. Rebinding mid-animation retargets the running task.
    pub fn animate_counter(&self, id: WidgetId, target: u64) {
        let token = match self.lock().counter_mut(id) {
            Some(counter) => counter.retarget(target),
            None => return,
        };
        let Some(token) = token else {
            return;
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            self.set_counter(id, target);
            return;
        };

        let binder = self.clone();
        runtime.spawn(async move {
            loop {
                sleep(binder.counter_tick).await;
                let more = binder
                    .lock()
                    .counter_mut(id)
                    .map(|counter| counter.advance(token, binder.counter_divisor))
                    .unwrap_or(false);
                if !more {
                    break;
                }
            }
        });
    }

    /// Replaces the whole table. No records gives a single placeholder row.
    pub fn bind_table(&self, id: WidgetId, records: &[DetectionRecord], cameras: &CameraSet) {
        let rows = if records.is_empty() {
            vec![TableRow::Placeholder {
                message: NO_DETECTIONS.to_string(),
            }]
        } else {
            records
                .iter()
                .map(|record| TableRow::Detection(DetectionRow::new(record, cameras)))
                .collect()
        };
        self.replace_rows(id, rows);
    }

    pub fn bind_table_placeholder(&self, id: WidgetId, message: &str) {
        self.replace_rows(
            id,
            vec![TableRow::Placeholder {
                message: message.to_string(),
            }],
        );
    }

    fn replace_rows(&self, id: WidgetId, rows: Vec<TableRow>) {
        if let Some(Widget::Table(table)) = self.lock().slot_mut(id) {
            table.rows = rows;
        }
    }

    /// Empty or whitespace-only terms clear the filter.
    pub fn apply_search(&self, id: WidgetId, term: &str) {
        if let Some(Widget::Table(table)) = self.lock().slot_mut(id) {
            let term = term.trim();
            table.filter = (!term.is_empty()).then(|| term.to_string());
        }
    }

    pub fn bind_feed(
        &self,
        id: WidgetId,
        records: &[DetectionRecord],
        cameras: &CameraSet,
        limit: usize,
        now: DateTime<Utc>,
    ) {
        let items: Vec<ActivityItem> = records
            .iter()
            .take(limit)
            .map(|record| ActivityItem::new(record, cameras, now))
            .collect();
        let placeholder = items.is_empty().then(|| ACTIVITY_IDLE.to_string());
        if let Some(Widget::Feed(feed)) = self.lock().slot_mut(id) {
            *feed = FeedView { items, placeholder };
        }
    }

    pub fn bind_feed_placeholder(&self, id: WidgetId, message: &str) {
        if let Some(Widget::Feed(feed)) = self.lock().slot_mut(id) {
            *feed = FeedView {
                items: Vec::new(),
                placeholder: Some(message.to_string()),
            };
        }
    }

    pub fn bind_chart(&self, id: WidgetId, series: ChartSeries, redraw: Redraw) {
        if let Some(Widget::Chart(chart)) = self.lock().slot_mut(id) {
            chart.series = series;
            chart.redraw = redraw;
            chart.revision += 1;
        }
    }

    pub fn bind_video(&self, id: WidgetId, view: VideoView) {
        if let Some(Widget::Video(slot)) = self.lock().slot_mut(id) {
            *slot = Some(view);
        }
    }

    pub fn bind_cards(&self, id: WidgetId, cards: Vec<CameraCard>) {
        if let Some(Widget::Cards(slot)) = self.lock().slot_mut(id) {
            *slot = cards;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn binder() -> Binder {
        Binder::new(WidgetRegistry::with_all(), Duration::from_millis(50), 20)
    }

    fn record(id: i64, camera: &str, confidence: f64) -> DetectionRecord {
        DetectionRecord {
            id,
            camera_id: camera.to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).single().expect("valid date"),
            confidence,
            image_path: None,
        }
    }

    #[test]
    fn counter_converges_without_overshoot() {
        let mut counter = Counter::default();
        counter.target = 47;

        let mut ticks = 0;
        let mut previous = 0;
        while counter.step(20) {
            ticks += 1;
            assert!(counter.displayed() <= 47);
            assert!(counter.displayed() > previous);
            previous = counter.displayed();
        }

        assert_eq!(counter.displayed(), 47);
        assert!(ticks < 47, "took {ticks} ticks");
    }

    #[test]
    fn unregistered_widgets_ignore_binds() {
        let mut registry = WidgetRegistry::new();
        registry.register(WidgetId::CpuMetric);
        let binder = Binder::new(registry, Duration::from_millis(50), 20);

        binder.bind_metric(WidgetId::MemoryMetric, 50.0);
        binder.bind_table(WidgetId::DetectionsTable, &[], &CameraSet::standard());
        binder.animate_counter(WidgetId::TotalDetections, 10);
        binder.bind_metric(WidgetId::CpuMetric, 85.0);

        let snapshot = binder.snapshot();
        assert!(!snapshot.is_registered(WidgetId::MemoryMetric));
        assert!(snapshot.table(WidgetId::DetectionsTable).is_none());
        assert_eq!(snapshot.metric(WidgetId::CpuMetric).map(|m| m.percent), Some(85));
    }

    #[test]
    fn empty_table_renders_one_placeholder_row() {
        let binder = binder();

        binder.bind_table(WidgetId::DetectionsTable, &[], &CameraSet::standard());

        let table = binder.snapshot().table(WidgetId::DetectionsTable).cloned().expect("table");
        assert_eq!(
            table.rows,
            vec![TableRow::Placeholder {
                message: NO_DETECTIONS.to_string()
            }]
        );
    }

    #[test]
    fn table_keeps_input_order() {
        let binder = binder();
        let records = vec![
            record(9, "Lobby Camera", 90.0),
            record(4, "Main Entrance", 65.0),
            record(7, "Front Gate Camera", 20.0),
        ];

        binder.bind_table(WidgetId::DetectionsTable, &records, &CameraSet::standard());

        let table = binder.snapshot().table(WidgetId::DetectionsTable).cloned().expect("table");
        let ids: Vec<i64> = table
            .rows
            .iter()
            .filter_map(|row| match row {
                TableRow::Detection(det) => Some(det.id),
                TableRow::Placeholder { .. } => None,
            })
            .collect();
        assert_eq!(ids, vec![9, 4, 7]);
    }

    #[test]
    fn search_filters_rows_case_insensitively() {
        let binder = binder();
        let records = vec![record(1, "Lobby Camera", 90.0), record(2, "Main Entrance", 65.0)];
        binder.bind_table(WidgetId::DetectionsTable, &records, &CameraSet::standard());

        binder.apply_search(WidgetId::DetectionsTable, "LOBBY");

        let snapshot = binder.snapshot();
        let table = snapshot.table(WidgetId::DetectionsTable).expect("table");
        assert_eq!(table.visible_rows().count(), 1);

        binder.apply_search(WidgetId::DetectionsTable, "  ");
        let snapshot = binder.snapshot();
        assert_eq!(snapshot.table(WidgetId::DetectionsTable).expect("table").visible_rows().count(), 2);
    }

    #[test]
    fn feed_takes_first_items_or_idle_placeholder() {
        let binder = binder();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 2, 0).single().expect("valid date");
        let records: Vec<_> = (0..8).map(|i| record(i, "Lobby Camera", 88.0)).collect();

        binder.bind_feed(WidgetId::ActivityFeed, &records, &CameraSet::standard(), 5, now);
        let feed = binder.snapshot().feed(WidgetId::ActivityFeed).cloned().expect("feed");
        assert_eq!(feed.items.len(), 5);
        assert_eq!(feed.items[0].detail, "Lobby Area - Confidence: 88%");
        assert_eq!(feed.items[0].time_ago, "2 minutes ago");

        binder.bind_feed(WidgetId::ActivityFeed, &[], &CameraSet::standard(), 5, now);
        let feed = binder.snapshot().feed(WidgetId::ActivityFeed).cloned().expect("feed");
        assert_eq!(feed.placeholder.as_deref(), Some(ACTIVITY_IDLE));
    }

    #[test]
    fn chart_bind_replaces_series_and_bumps_revision() {
        let binder = binder();
        let series = ChartSeries::from_points([("a", 1), ("b", 2)]);

        binder.bind_chart(WidgetId::AnalyticsChart, series.clone(), Redraw::Animated);

        let snapshot = binder.snapshot();
        let chart = snapshot.chart(WidgetId::AnalyticsChart).expect("chart");
        assert_eq!(chart.series, series);
        assert_eq!(chart.redraw, Redraw::Animated);
        assert_eq!(chart.revision, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn animation_reaches_target() {
        let binder = binder();

        binder.animate_counter(WidgetId::TotalDetections, 47);
        tokio::time::sleep(Duration::from_secs(5)).await;

        let snapshot = binder.snapshot();
        let counter = snapshot.counter(WidgetId::TotalDetections).expect("counter");
        assert_eq!(counter.displayed(), 47);
        assert!(!counter.is_animating());
    }

    #[tokio::test(start_paused = true)]
    async fn retarget_mid_flight_keeps_a_single_animation() {
        let binder = binder();
        binder.animate_counter(WidgetId::TotalDetections, 1000);
        tokio::time::sleep(Duration::from_millis(120)).await;
        let generation_before = binder
            .read(|r| r.counter(WidgetId::TotalDetections).map(|c| c.generation))
            .expect("counter");

        binder.animate_counter(WidgetId::TotalDetections, 2000);

        let generation_after = binder
            .read(|r| r.counter(WidgetId::TotalDetections).map(|c| c.generation))
            .expect("counter");
        assert_eq!(generation_before, generation_after);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(
            binder.read(|r| r.counter(WidgetId::TotalDetections).map(Counter::displayed)),
            Some(2000)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn set_counter_stops_running_animation() {
        let binder = binder();
        binder.animate_counter(WidgetId::TotalDetections, 500);
        tokio::time::sleep(Duration::from_millis(60)).await;

        binder.set_counter(WidgetId::TotalDetections, 0);
        tokio::time::sleep(Duration::from_secs(5)).await;

        let snapshot = binder.snapshot();
        let counter = snapshot.counter(WidgetId::TotalDetections).expect("counter");
        assert_eq!(counter.displayed(), 0);
        assert!(!counter.is_animating());
    }

    #[test]
    fn lower_target_snaps_down() {
        let binder = binder();
        binder.set_counter(WidgetId::TotalDetections, 30);

        binder.animate_counter(WidgetId::TotalDetections, 12);

        assert_eq!(
            binder.read(|r| r.counter(WidgetId::TotalDetections).map(Counter::displayed)),
            Some(12)
        );
    }
}
