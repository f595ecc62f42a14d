pub mod api;
pub mod binder;
pub mod camera;
pub mod config;
pub mod dashboard;
pub mod gateway;
pub mod model;
pub mod normalize;
pub mod notify;
pub mod scheduler;
pub mod views;

#[cfg(test)]
pub(crate) mod testing;

pub use binder::{Binder, Widget, WidgetId, WidgetRegistry};
pub use camera::{CameraInfo, CameraSession, CameraSet};
pub use config::DashboardConfig;
pub use dashboard::{Dashboard, DashboardEvent, DebugInfo, Page, PassOutcome};
pub use gateway::{Backend, Endpoint, FetchError, HttpBackend};
pub use model::{DetectionRecord, DetectionsPayload, SystemStats};
pub use normalize::{ChartSeries, Period};
pub use notify::{Notifier, Toast, ToastLevel};
pub use scheduler::{GroupPhase, RefreshGroup, RefreshState};
