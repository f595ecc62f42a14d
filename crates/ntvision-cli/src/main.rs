use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use ntvision_core::views::{format_uptime, DetectionRow, MetricView, TableRow};
use ntvision_core::{
    api, CameraSet, Dashboard, DashboardConfig, DetectionRecord, HttpBackend, ToastLevel, WidgetId,
    WidgetRegistry,
};
use serde_json::json;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod viewer;
mod exporter;

#[derive(Debug, Parser)]
#[command(name = "ntvision")]
#[command(about = "NT Vision surveillance dashboard client")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(long, default_value = "http://localhost:5000")]
    base_url: String,

    #[arg(long, default_value_t = 5000)]
    interval_ms: u64,

    #[arg(long, default_value_t = 2000)]
    retry_delay_ms: u64,

    #[arg(long, default_value_t = 3)]
    max_attempts: u32,

    #[arg(long, default_value_t = 10_000)]
    timeout_ms: u64,

    /// Camera shown in the main viewer at startup.
    #[arg(long)]
    camera: Option<String>,

    #[arg(long)]
    no_auto_refresh: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    Cameras {
        #[arg(long, value_enum, default_value = "human")]
        format: OutputFormat,
    },
    Stats {
        #[arg(long, value_enum, default_value = "human")]
        format: OutputFormat,
    },
    Detections {
        /// Only detections from this day (YYYY-MM-DD).
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, value_enum, default_value = "human")]
        format: OutputFormat,
    },
    Switch {
        camera: String,
    },
    Delete {
        id: i64,
    },
    Export {
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
    Image {
        path: String,
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
    Watch {
        #[arg(long, value_enum, default_value = "human")]
        format: OutputFormat,
    },
    View,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Human,
    Json,
    Ndjson,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // the TUI owns the terminal; log only when asked to
    let quiet = matches!(cli.command, Command::View) && std::env::var_os("RUST_LOG").is_none();
    if !quiet {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .init();
    }

    let config = DashboardConfig {
        base_url: cli.base_url.clone(),
        refresh_interval: Duration::from_millis(cli.interval_ms),
        retry_delay: Duration::from_millis(cli.retry_delay_ms),
        max_attempts: cli.max_attempts,
        request_timeout: Duration::from_millis(cli.timeout_ms),
        auto_refresh: !cli.no_auto_refresh,
        default_camera: cli.camera.clone(),
        ..DashboardConfig::default()
    };

    let backend = HttpBackend::new(&config.base_url, config.request_timeout)?;
    let dashboard = Dashboard::new(backend, config, CameraSet::standard());

    match cli.command {
        Command::Cameras { format } => print_cameras(&dashboard, format)?,
        Command::Stats { format } => {
            let stats = api::get_system_stats(&dashboard.state().backend).await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
                OutputFormat::Ndjson => println!("{}", serde_json::to_string(&stats)?),
                OutputFormat::Human => {
                    println!("=== System Stats ===");
                    println!("CPU:        {}", metric_label(Some(MetricView::new(stats.cpu_percent))));
                    println!("Memory:     {}", metric_label(Some(MetricView::new(stats.memory_percent))));
                    println!("Storage:    {}", metric_label(Some(MetricView::new(stats.disk_percent))));
                    println!("Cameras:    {}/{}", stats.active_cameras, stats.total_cameras);
                    println!("Uptime:     {}", format_uptime(stats.uptime_seconds));
                }
            }
        }
        Command::Detections { date, format } => {
            let backend = &dashboard.state().backend;
            let records = match date {
                Some(date) => api::get_detections_by_date(backend, date).await?,
                None => api::get_all_detections(backend).await?.recent_detections,
            };
            print_detections(&records, dashboard.cameras(), format)?;
        }
        Command::Switch { camera } => {
            let Some(handle) = dashboard.switch_camera(&camera) else {
                bail!("unknown camera {camera:?}");
            };
            handle.await?;
            print_toasts(&dashboard);
            if has_error_toast(&dashboard) {
                bail!("backend did not accept the switch to {camera:?}");
            }
        }
        Command::Delete { id } => {
            if !dashboard.delete_detection(id).await {
                bail!("could not delete detection {id}");
            }
            println!("deleted detection {id}");
        }
        Command::Export { output_dir } => {
            let path = exporter::export_detections(&dashboard, &output_dir).await?;
            println!("{}", path.display());
        }
        Command::Image { path, output_dir } => {
            let saved = exporter::download_image(&dashboard, &path, &output_dir).await?;
            println!("{}", saved.display());
        }
        Command::Watch { format } => stream_loop(&dashboard, format).await?,
        Command::View => viewer::run_viewer(dashboard).await?,
    }

    Ok(())
}

async fn stream_loop(dashboard: &Dashboard<HttpBackend>, format: OutputFormat) -> Result<()> {
    dashboard.load_initial().await;
    print_frame(dashboard, format)?;

    let period = dashboard.state().config.refresh_interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!("received ctrl-c, stopping");
                break;
            }
            _ = ticker.tick() => {
                let outcomes = dashboard.tick().await;
                if outcomes.is_empty() {
                    continue;
                }
                print_frame(dashboard, format)?;
                info!(groups = outcomes.len(), error_indicator = dashboard.widgets().flag(WidgetId::ErrorIndicator), "tick");
            }
        }
    }

    Ok(())
}

fn print_cameras(dashboard: &Dashboard<HttpBackend>, format: OutputFormat) -> Result<()> {
    let active = dashboard.active_camera();
    match format {
        OutputFormat::Json | OutputFormat::Ndjson => {
            let out = json!({ "active": active, "cameras": dashboard.cameras() });
            if matches!(format, OutputFormat::Json) {
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("{}", serde_json::to_string(&out)?);
            }
        }
        OutputFormat::Human => {
            for (idx, camera) in dashboard.cameras().iter().enumerate() {
                let marker = if camera.id == active { "*" } else { " " };
                println!("{marker} {}  {:<18} {}", idx + 1, camera.id, camera.display_name);
            }
        }
    }
    Ok(())
}

fn print_detections(records: &[DetectionRecord], cameras: &CameraSet, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(records)?),
        OutputFormat::Ndjson => {
            for record in records {
                println!("{}", serde_json::to_string(record)?);
            }
        }
        OutputFormat::Human => {
            if records.is_empty() {
                println!("No detections found");
            }
            for record in records {
                let row = DetectionRow::new(record, cameras);
                println!("{}", human_row(&row));
            }
        }
    }
    Ok(())
}

fn print_frame(dashboard: &Dashboard<HttpBackend>, format: OutputFormat) -> Result<()> {
    let widgets = dashboard.widgets();
    let toasts: Vec<_> = dashboard
        .notifier()
        .active()
        .into_iter()
        .map(|t| json!({ "level": t.level, "message": t.message }))
        .collect();

    match format {
        OutputFormat::Json | OutputFormat::Ndjson => {
            let frame = json!({
                "ts": Utc::now(),
                "widgets": widgets,
                "toasts": toasts,
                "debug": dashboard.debug_info(),
            });
            if matches!(format, OutputFormat::Json) {
                println!("{}", serde_json::to_string_pretty(&frame)?);
            } else {
                println!("{}", serde_json::to_string(&frame)?);
            }
        }
        OutputFormat::Human => print_human(dashboard, &widgets),
    }

    Ok(())
}

fn print_human(dashboard: &Dashboard<HttpBackend>, widgets: &WidgetRegistry) {
    let active = dashboard.active_camera();
    println!("=== NT Vision Dashboard ===");
    println!("Time:       {}", Utc::now().to_rfc3339());
    println!(
        "Camera:     {} ({})",
        dashboard.cameras().display_name(&active),
        active
    );
    println!(
        "CPU:        {}   Memory: {}   Storage: {}",
        metric_label(widgets.metric(WidgetId::CpuMetric)),
        metric_label(widgets.metric(WidgetId::MemoryMetric)),
        metric_label(widgets.metric(WidgetId::StorageMetric)),
    );
    println!(
        "Cameras:    {}   {}",
        widgets.text(WidgetId::ActiveCameras).unwrap_or("n/a"),
        widgets.text(WidgetId::Uptime).unwrap_or_default(),
    );
    println!(
        "Detections: {}",
        widgets
            .counter(WidgetId::TotalDetections)
            .map(|c| c.target())
            .unwrap_or(0)
    );

    if let Some(table) = widgets.table(WidgetId::DetectionsTable) {
        println!("Recent:");
        for row in table.visible_rows().take(10) {
            match row {
                TableRow::Placeholder { message } => println!("  {message}"),
                TableRow::Detection(det) => println!("  {}", human_row(det)),
            }
        }
    }

    if let Some(feed) = widgets.feed(WidgetId::ActivityFeed) {
        println!("Activity:");
        if let Some(placeholder) = &feed.placeholder {
            println!("  {placeholder}");
        }
        for item in &feed.items {
            println!("  {}  {}  ({})", item.title, item.detail, item.time_ago);
        }
    }

    print_toasts(dashboard);

    if widgets.flag(WidgetId::ErrorIndicator) {
        println!("Status:     backend unavailable, showing fallback values");
    }
}

fn print_toasts(dashboard: &Dashboard<HttpBackend>) {
    for toast in dashboard.notifier().active() {
        let level = match toast.level {
            ToastLevel::Info => "info",
            ToastLevel::Success => "ok",
            ToastLevel::Warning => "warn",
            ToastLevel::Error => "error",
        };
        println!("[{level}] {}", toast.message);
    }
}

fn has_error_toast(dashboard: &Dashboard<HttpBackend>) -> bool {
    dashboard
        .notifier()
        .active()
        .iter()
        .any(|t| t.level == ToastLevel::Error)
}

fn human_row(row: &DetectionRow) -> String {
    format!(
        "{:>6}  {:<20} {:<14} {:>4} ({})",
        row.id,
        row.time,
        row.camera,
        row.confidence.label,
        row.confidence.band.as_str()
    )
}

fn metric_label(view: Option<MetricView>) -> String {
    match view {
        Some(view) => format!("{}% [{}]", view.percent, view.severity.color_token()),
        None => "n/a".to_string(),
    }
}
