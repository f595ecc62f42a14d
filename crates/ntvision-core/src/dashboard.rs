use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::api;
use crate::binder::{
    Binder, Redraw, WidgetId, WidgetRegistry, ACTIVITY_UNAVAILABLE, DETECTIONS_UNAVAILABLE,
};
use crate::camera::{CameraSession, CameraSet};
use crate::config::DashboardConfig;
use crate::gateway::{Backend, FetchError};
use crate::model::{DetectionRecord, DetectionsPayload, SystemStats};
use crate::normalize::{bucket_by_day, camera_series, Period};
use crate::notify::{Notifier, ToastLevel};
use crate::scheduler::{FailureVerdict, GroupPhase, RefreshBook, RefreshGroup, RefreshState};
use crate::views::{format_uptime, CameraCard, VideoView};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Page {
    #[default]
    Dashboard,
    Surveillance,
    Detections,
    Reports,
}

impl Page {
    pub fn title(self) -> &'static str {
        match self {
            Page::Dashboard => "Intelligence Dashboard",
            Page::Surveillance => "Live Surveillance",
            Page::Detections => "Detection History",
            Page::Reports => "Analytics & Reports",
        }
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Page::Dashboard => "dashboard",
            Page::Surveillance => "surveillance",
            Page::Detections => "detections",
            Page::Reports => "reports",
        })
    }
}

impl FromStr for Page {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dashboard" => Ok(Page::Dashboard),
            "surveillance" => Ok(Page::Surveillance),
            "detections" => Ok(Page::Detections),
            "reports" => Ok(Page::Reports),
            other => Err(format!("unknown page {other:?}")),
        }
    }
}

/// Page-level input fed to [`Dashboard::run`].
#[derive(Debug, Clone, PartialEq)]
pub enum DashboardEvent {
    Visibility(bool),
    Online,
    Offline,
    Navigate(Page),
    RefreshPanel,
    SwitchCamera(String),
    ChangePeriod(Period),
    FilterDate(Option<NaiveDate>),
    Search(String),
    Delete(i64),
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    Applied,
    Fallback,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupDebug {
    pub group: RefreshGroup,
    pub phase: GroupPhase,
    pub state: RefreshState,
}

#[derive(Debug, Clone, Serialize)]
pub struct DebugInfo {
    pub active_camera: String,
    pub cameras: usize,
    pub last_success: Option<DateTime<Utc>>,
    pub auto_refresh: bool,
    pub visible: bool,
    pub page: Page,
    pub period: Period,
    pub groups: Vec<GroupDebug>,
}

/// Everything the dashboard owns, built once at startup.
pub struct AppState<B> {
    pub backend: B,
    pub config: DashboardConfig,
    pub cameras: CameraSet,
    pub binder: Binder,
    pub notifier: Notifier,
    refresh: Mutex<RefreshBook>,
    session: Mutex<CameraSession>,
    page: Mutex<Page>,
    period: Mutex<Period>,
    visible: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Dashboard<B> {
    state: Arc<AppState<B>>,
}

impl<B> Clone for Dashboard<B> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<B: Backend + 'static> Dashboard<B> {
    pub fn new(backend: B, config: DashboardConfig, cameras: CameraSet) -> Self {
        Self::with_registry(backend, config, cameras, WidgetRegistry::with_all())
    }

    pub fn with_registry(
        backend: B,
        config: DashboardConfig,
        cameras: CameraSet,
        registry: WidgetRegistry,
    ) -> Self {
        let binder = Binder::new(registry, config.counter_tick, config.counter_divisor);
        let notifier = Notifier::new(config.toast_capacity, config.toast_ttl);
        let session = CameraSession::new(&cameras, config.default_camera.as_deref());
        let refresh = RefreshBook::new(config.max_attempts, config.retry_delay);

        let dashboard = Self {
            state: Arc::new(AppState {
                backend,
                config,
                cameras,
                binder,
                notifier,
                refresh: Mutex::new(refresh),
                session: Mutex::new(session),
                page: Mutex::new(Page::Dashboard),
                period: Mutex::new(Period::Hours24),
                visible: AtomicBool::new(true),
            }),
        };
        dashboard.state.binder.bind_text(WidgetId::Page, Page::Dashboard.title());
        dashboard.bind_camera_views();
        dashboard
    }

    pub fn state(&self) -> &AppState<B> {
        &self.state
    }

    pub fn binder(&self) -> &Binder {
        &self.state.binder
    }

    pub fn notifier(&self) -> &Notifier {
        &self.state.notifier
    }

    pub fn cameras(&self) -> &CameraSet {
        &self.state.cameras
    }

    pub fn widgets(&self) -> WidgetRegistry {
        self.state.binder.snapshot()
    }

    pub fn active_camera(&self) -> String {
        lock(&self.state.session).active().to_string()
    }

    pub fn period(&self) -> Period {
        *lock(&self.state.period)
    }

    pub fn page(&self) -> Page {
        *lock(&self.state.page)
    }

    pub fn phase(&self, group: RefreshGroup) -> GroupPhase {
        lock(&self.state.refresh).get(group).phase()
    }

    pub fn refresh_state(&self, group: RefreshGroup) -> RefreshState {
        lock(&self.state.refresh).get(group).state().clone()
    }

    pub fn is_visible(&self) -> bool {
        self.state.visible.load(Ordering::SeqCst)
    }

    /// Records page visibility. Returns `true` when the page just came back.
    pub fn set_visible(&self, visible: bool) -> bool {
        let was = self.state.visible.swap(visible, Ordering::SeqCst);
        !was && visible
    }

    pub fn debug_info(&self) -> DebugInfo {
        let book = lock(&self.state.refresh).clone();
        DebugInfo {
            active_camera: self.active_camera(),
            cameras: self.state.cameras.len(),
            last_success: book.last_success(),
            auto_refresh: self.state.config.auto_refresh,
            visible: self.is_visible(),
            page: self.page(),
            period: self.period(),
            groups: RefreshGroup::ALL
                .into_iter()
                .map(|group| GroupDebug {
                    group,
                    phase: book.get(group).phase(),
                    state: book.get(group).state().clone(),
                })
                .collect(),
        }
    }

    /// Runs one group through fetch, normalize and bind, retrying on the
    /// fixed delay until the attempt budget is spent.
    pub async fn refresh_group(&self, group: RefreshGroup) -> PassOutcome {
        let mut attempt = 0;
        loop {
            attempt += 1;
            lock(&self.state.refresh).get_mut(group).begin_attempt();

            let err = match self.fetch_and_bind(group).await {
                Ok(()) => {
                    lock(&self.state.refresh)
                        .get_mut(group)
                        .record_success(Instant::now(), Utc::now());
                    debug!(%group, "refresh applied");
                    return PassOutcome::Applied;
                }
                Err(err) => err,
            };

            let (verdict, failures) = {
                let mut book = lock(&self.state.refresh);
                let tracker = book.get_mut(group);
                let verdict = tracker.record_failure(attempt);
                (verdict, tracker.state().consecutive_failures)
            };
            warn!(%group, attempt, failures, status = ?err.status(), error = %err, "refresh failed");

            match verdict {
                FailureVerdict::RetryAfter(delay) => sleep(delay).await,
                FailureVerdict::Terminal => {
                    error!(%group, "retry budget exhausted, showing fallback");
                    self.apply_fallback(group);
                    self.state.notifier.notify(
                        ToastLevel::Error,
                        format!("Unable to load {group} data. Check your connection."),
                    );
                    return PassOutcome::Fallback;
                }
            }
        }
    }

    async fn fetch_and_bind(&self, group: RefreshGroup) -> Result<(), FetchError> {
        let backend = &self.state.backend;
        match group {
            RefreshGroup::Stats => {
                let stats = api::get_system_stats(backend).await?;
                self.bind_stats(&stats);
            }
            RefreshGroup::Detections => {
                let payload = api::get_all_detections(backend).await?;
                self.bind_detections(&payload);
            }
            RefreshGroup::Activity => {
                let payload = api::get_all_detections(backend).await?;
                self.bind_activity(&payload.recent_detections);
            }
        }
        Ok(())
    }

    /// Refreshes `groups` concurrently. Clears the error indicator when
    /// every group in the pass succeeded.
    pub async fn refresh_pass(&self, groups: &[RefreshGroup]) -> Vec<(RefreshGroup, PassOutcome)> {
        let run = |group: RefreshGroup| async move {
            if groups.contains(&group) {
                Some((group, self.refresh_group(group).await))
            } else {
                None
            }
        };
        let (stats, detections, activity) = tokio::join!(
            run(RefreshGroup::Stats),
            run(RefreshGroup::Detections),
            run(RefreshGroup::Activity)
        );
        let outcomes: Vec<_> = [stats, detections, activity].into_iter().flatten().collect();

        if !outcomes.is_empty() && outcomes.iter().all(|(_, o)| *o == PassOutcome::Applied) {
            self.state.binder.set_flag(WidgetId::ErrorIndicator, false);
        }
        outcomes
    }

    /// Forced pass over every group with the loading indicator up. Raises
    /// the persistent error indicator when any group falls back.
    pub async fn load_initial(&self) -> Vec<(RefreshGroup, PassOutcome)> {
        info!("loading dashboard data");
        lock(&self.state.refresh).rearm_all();
        self.state.binder.set_flag(WidgetId::LoadingIndicator, true);

        let outcomes = self.refresh_pass(&RefreshGroup::ALL).await;

        self.state.binder.set_flag(WidgetId::LoadingIndicator, false);
        if outcomes.iter().any(|(_, o)| *o == PassOutcome::Fallback) {
            self.state.binder.set_flag(WidgetId::ErrorIndicator, true);
        }
        outcomes
    }

    /// Periodic tick: refresh the groups that are idle and due, only while
    /// the page is visible.
    pub async fn tick(&self) -> Vec<(RefreshGroup, PassOutcome)> {
        if !self.state.config.auto_refresh || !self.is_visible() {
            return Vec::new();
        }
        let due = lock(&self.state.refresh).due(Instant::now(), self.state.config.refresh_interval);
        if due.is_empty() {
            return Vec::new();
        }
        debug!(groups = ?due, "periodic refresh");
        self.refresh_pass(&due).await
    }

    pub async fn refresh_panel(&self) -> Vec<(RefreshGroup, PassOutcome)> {
        lock(&self.state.refresh).rearm_all();
        self.state
            .notifier
            .notify(ToastLevel::Success, "Panel data refreshed");
        self.refresh_pass(&RefreshGroup::ALL).await
    }

    /// One-off stats and detections pass after the page becomes visible.
    pub async fn on_visibility_restored(&self) -> Vec<(RefreshGroup, PassOutcome)> {
        sleep(self.state.config.visibility_refresh_delay).await;
        let groups: Vec<RefreshGroup> = {
            let book = lock(&self.state.refresh);
            [RefreshGroup::Stats, RefreshGroup::Detections]
                .into_iter()
                .filter(|g| book.get(*g).phase() == GroupPhase::Idle)
                .collect()
        };
        self.refresh_pass(&groups).await
    }

    pub async fn on_online(&self) -> Vec<(RefreshGroup, PassOutcome)> {
        self.state
            .notifier
            .notify(ToastLevel::Success, "Connection restored");
        lock(&self.state.refresh).reset_all();
        self.load_initial().await
    }

    pub fn on_offline(&self) {
        self.state.notifier.notify(ToastLevel::Warning, "Connection lost");
    }

    pub async fn reset(&self) -> Vec<(RefreshGroup, PassOutcome)> {
        lock(&self.state.refresh).reset_all();
        let outcomes = self.load_initial().await;
        self.state.notifier.notify(ToastLevel::Info, "Dashboard reset");
        outcomes
    }

    fn bind_stats(&self, stats: &SystemStats) {
        let binder = &self.state.binder;
        binder.bind_metric(WidgetId::CpuMetric, stats.cpu_percent);
        binder.bind_metric(WidgetId::MemoryMetric, stats.memory_percent);
        binder.bind_metric(WidgetId::StorageMetric, stats.disk_percent);
        binder.bind_text(
            WidgetId::ActiveCameras,
            format!("{}/{}", stats.active_cameras, stats.total_cameras),
        );
        if stats.uptime_seconds > 0 {
            binder.bind_text(WidgetId::Uptime, format_uptime(stats.uptime_seconds));
        }
    }

    fn bind_detections(&self, payload: &DetectionsPayload) {
        let binder = &self.state.binder;
        let cameras = &self.state.cameras;
        binder.animate_counter(WidgetId::TotalDetections, payload.total());
        binder.bind_table(WidgetId::DetectionsTable, &payload.recent_detections, cameras);
        binder.bind_chart(
            WidgetId::AnalyticsChart,
            self.period().series(&payload.recent_detections, &Local::now()),
            Redraw::Immediate,
        );
        binder.bind_chart(
            WidgetId::PerformanceChart,
            camera_series(&payload.total_counts, cameras),
            Redraw::Immediate,
        );
    }

    fn bind_activity(&self, records: &[DetectionRecord]) {
        self.state.binder.bind_feed(
            WidgetId::ActivityFeed,
            records,
            &self.state.cameras,
            self.state.config.activity_limit,
            Utc::now(),
        );
    }

    fn apply_fallback(&self, group: RefreshGroup) {
        let binder = &self.state.binder;
        match group {
            RefreshGroup::Stats => {
                for id in [WidgetId::CpuMetric, WidgetId::MemoryMetric, WidgetId::StorageMetric] {
                    binder.bind_metric(id, 0.0);
                }
                binder.bind_text(WidgetId::ActiveCameras, format!("0/{}", self.state.cameras.len()));
                binder.bind_text(WidgetId::Uptime, "");
            }
            RefreshGroup::Detections => {
                binder.set_counter(WidgetId::TotalDetections, 0);
                binder.bind_table_placeholder(WidgetId::DetectionsTable, DETECTIONS_UNAVAILABLE);
                binder.bind_chart(
                    WidgetId::AnalyticsChart,
                    self.period().series(&[], &Local::now()),
                    Redraw::Immediate,
                );
                binder.bind_chart(
                    WidgetId::PerformanceChart,
                    camera_series(&Default::default(), &self.state.cameras),
                    Redraw::Immediate,
                );
            }
            RefreshGroup::Activity => {
                binder.bind_feed_placeholder(WidgetId::ActivityFeed, ACTIVITY_UNAVAILABLE);
            }
        }
    }

    fn bind_camera_views(&self) {
        let active = self.active_camera();
        let backend = &self.state.backend;
        let cards = self
            .state
            .cameras
            .iter()
            .map(|camera| CameraCard {
                id: camera.id.clone(),
                display_name: camera.display_name.clone(),
                live: true,
                active: camera.id == active,
                preview_url: api::video_feed_url(backend, &camera.id, None),
            })
            .collect();
        self.state.binder.bind_cards(WidgetId::CameraGrid, cards);
        self.state.binder.bind_video(
            WidgetId::MainVideo,
            VideoView {
                display_name: self.state.cameras.display_name(&active).to_string(),
                source_url: api::video_feed_url(backend, &active, Some(Utc::now().timestamp_millis())),
                camera_id: active,
            },
        );
    }

    /// Makes `camera_id` active right away, then tells the backend in the
    /// background. Unknown ids are ignored. Backend failures only toast;
    /// the local switch stands.
    pub fn switch_camera(&self, camera_id: &str) -> Option<JoinHandle<()>> {
        let switched = lock(&self.state.session).select(&self.state.cameras, camera_id);
        if !switched {
            warn!(camera = camera_id, "camera not found");
            return None;
        }
        info!(camera = camera_id, "switching camera");
        self.bind_camera_views();

        let dashboard = self.clone();
        let camera_id = camera_id.to_string();
        Some(tokio::spawn(async move {
            match api::switch_camera(&dashboard.state.backend, &camera_id).await {
                Ok(()) => {
                    let name = dashboard.state.cameras.display_name(&camera_id);
                    dashboard
                        .state
                        .notifier
                        .notify(ToastLevel::Success, format!("Switched to {name}"));
                }
                Err(err) => {
                    error!(camera = %camera_id, error = %err, "backend camera switch failed");
                    dashboard
                        .state
                        .notifier
                        .notify(ToastLevel::Error, "Error switching camera");
                }
            }
        }))
    }

    pub async fn navigate(&self, page: Page) {
        *lock(&self.state.page) = page;
        self.state.binder.bind_text(WidgetId::Page, page.title());
        info!(%page, "navigate");

        match page {
            Page::Surveillance => self.bind_camera_views(),
            Page::Reports => self.load_trends().await,
            Page::Dashboard | Page::Detections => {}
        }
        lock(&self.state.refresh).rearm_all();
        self.refresh_pass(&RefreshGroup::ALL).await;
    }

    /// Weekly trend chart for the reports page.
    pub async fn load_trends(&self) {
        match api::get_all_detections(&self.state.backend).await {
            Ok(payload) => self.state.binder.bind_chart(
                WidgetId::TrendsChart,
                bucket_by_day(&payload.recent_detections, &Local::now(), 7),
                Redraw::Animated,
            ),
            Err(err) => warn!(error = %err, "failed to load trend data"),
        }
    }

    /// User-selected analytics window; redraws with animation.
    pub async fn change_period(&self, period: Period) {
        *lock(&self.state.period) = period;
        match api::get_all_detections(&self.state.backend).await {
            Ok(payload) => self.state.binder.bind_chart(
                WidgetId::AnalyticsChart,
                period.series(&payload.recent_detections, &Local::now()),
                Redraw::Animated,
            ),
            Err(err) => warn!(%period, error = %err, "failed to load chart data"),
        }
    }

    pub async fn filter_by_date(&self, date: Option<NaiveDate>) {
        let Some(date) = date else {
            self.refresh_group(RefreshGroup::Detections).await;
            return;
        };
        match api::get_detections_by_date(&self.state.backend, date).await {
            Ok(records) => {
                self.state
                    .binder
                    .bind_table(WidgetId::DetectionsTable, &records, &self.state.cameras)
            }
            Err(err) => {
                error!(%date, error = %err, "date filter failed");
                self.state
                    .notifier
                    .notify(ToastLevel::Error, "Error filtering detections");
            }
        }
    }

    pub fn search(&self, term: &str) {
        self.state.binder.apply_search(WidgetId::DetectionsTable, term);
    }

    pub async fn delete_detection(&self, id: i64) -> bool {
        match api::delete_detection(&self.state.backend, id).await {
            Ok(()) => {
                self.state
                    .notifier
                    .notify(ToastLevel::Success, "Detection deleted successfully");
                self.refresh_group(RefreshGroup::Detections).await;
                true
            }
            Err(err) => {
                error!(id, error = %err, "delete failed");
                self.state
                    .notifier
                    .notify(ToastLevel::Error, "Error deleting detection");
                false
            }
        }
    }

    /// CSV export body. Saving it is up to the caller.
    pub async fn export_csv(&self) -> Result<Vec<u8>, FetchError> {
        self.state.notifier.notify(ToastLevel::Info, "Preparing export...");
        api::export_csv(&self.state.backend).await.inspect_err(|err| {
            error!(error = %err, "export failed");
            self.state.notifier.notify(ToastLevel::Error, "Error exporting data");
        })
    }

    pub async fn download_image(&self, image_path: &str) -> Result<Vec<u8>, FetchError> {
        api::fetch_image(&self.state.backend, image_path).await
    }

    /// Drives the dashboard until `events` closes: initial load, periodic
    /// ticks, and one task per incoming event.
    pub async fn run(self, mut events: mpsc::Receiver<DashboardEvent>) {
        let initial = self.clone();
        tokio::spawn(async move {
            initial.load_initial().await;
        });

        let period = self.state.config.refresh_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let dashboard = self.clone();
                    tokio::spawn(async move {
                        dashboard.tick().await;
                    });
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        break;
                    };
                    self.dispatch(event);
                }
            }
        }
        info!("dashboard event loop stopped");
    }

    /// Applies an event, spawning anything that talks to the backend.
    pub fn dispatch(&self, event: DashboardEvent) {
        debug!(?event, "dashboard event");
        let dashboard = self.clone();
        match event {
            DashboardEvent::Visibility(visible) => {
                if self.set_visible(visible) {
                    tokio::spawn(async move {
                        dashboard.on_visibility_restored().await;
                    });
                }
            }
            DashboardEvent::Online => {
                tokio::spawn(async move {
                    dashboard.on_online().await;
                });
            }
            DashboardEvent::Offline => self.on_offline(),
            DashboardEvent::Navigate(page) => {
                tokio::spawn(async move {
                    dashboard.navigate(page).await;
                });
            }
            DashboardEvent::RefreshPanel => {
                tokio::spawn(async move {
                    dashboard.refresh_panel().await;
                });
            }
            DashboardEvent::SwitchCamera(id) => {
                self.switch_camera(&id);
            }
            DashboardEvent::ChangePeriod(period) => {
                tokio::spawn(async move {
                    dashboard.change_period(period).await;
                });
            }
            DashboardEvent::FilterDate(date) => {
                tokio::spawn(async move {
                    dashboard.filter_by_date(date).await;
                });
            }
            DashboardEvent::Search(term) => self.search(&term),
            DashboardEvent::Delete(id) => {
                tokio::spawn(async move {
                    dashboard.delete_detection(id).await;
                });
            }
            DashboardEvent::Reset => {
                tokio::spawn(async move {
                    dashboard.reset().await;
                });
            }
        }
    }
}
