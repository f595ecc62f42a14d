use std::io;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{
    self, DisableFocusChange, EnableFocusChange, Event, KeyCode, KeyEventKind,
};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use ntvision_core::binder::ChartView;
use ntvision_core::views::{ConfidenceBand, MetricView, Severity, TableRow};
use ntvision_core::{
    Backend, CameraSet, Dashboard, DashboardEvent, HttpBackend, Page, Period, ToastLevel, WidgetId,
    WidgetRegistry,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{BarChart, Block, Borders, Cell, Gauge, List, ListItem, Paragraph, Row, Table};
use ratatui::Terminal;
use tokio::sync::mpsc;
use tracing::warn;

const HELP: &str = "q quit  1-4 camera  r refresh  p period  h/s/d/t pages  / search  x export  R reset";

#[derive(Debug, Clone, PartialEq)]
enum KeyAction {
    Quit,
    Send(DashboardEvent),
    Export,
    StartSearch,
    None,
}

fn key_action(code: KeyCode, cameras: &CameraSet, period: Period) -> KeyAction {
    match code {
        KeyCode::Char('q') => KeyAction::Quit,
        KeyCode::Char(c @ '1'..='9') => {
            let idx = c as usize - '1' as usize;
            match cameras.nth(idx) {
                Some(camera) => KeyAction::Send(DashboardEvent::SwitchCamera(camera.id.clone())),
                None => KeyAction::None,
            }
        }
        KeyCode::Char('r') => KeyAction::Send(DashboardEvent::RefreshPanel),
        KeyCode::Char('p') => KeyAction::Send(DashboardEvent::ChangePeriod(period.next())),
        KeyCode::Char('h') => KeyAction::Send(DashboardEvent::Navigate(Page::Dashboard)),
        KeyCode::Char('s') => KeyAction::Send(DashboardEvent::Navigate(Page::Surveillance)),
        KeyCode::Char('d') => KeyAction::Send(DashboardEvent::Navigate(Page::Detections)),
        KeyCode::Char('t') => KeyAction::Send(DashboardEvent::Navigate(Page::Reports)),
        KeyCode::Char('R') => KeyAction::Send(DashboardEvent::Reset),
        KeyCode::Char('x') => KeyAction::Export,
        KeyCode::Char('/') => KeyAction::StartSearch,
        _ => KeyAction::None,
    }
}

pub async fn run_viewer(dashboard: Dashboard<HttpBackend>) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableFocusChange)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let (events, rx) = mpsc::channel(32);
    let runner = tokio::spawn(dashboard.clone().run(rx));
    let mut search: Option<String> = None;

    let run_result = async {
        loop {
            if event::poll(Duration::from_millis(50))? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        if let Some(buffer) = search.as_mut() {
                            match key.code {
                                KeyCode::Enter => search = None,
                                KeyCode::Esc => {
                                    dashboard.search("");
                                    search = None;
                                }
                                KeyCode::Backspace => {
                                    buffer.pop();
                                    dashboard.search(buffer);
                                }
                                KeyCode::Char(c) => {
                                    buffer.push(c);
                                    dashboard.search(buffer);
                                }
                                _ => {}
                            }
                        } else {
                            match key_action(key.code, dashboard.cameras(), dashboard.period()) {
                                KeyAction::Quit => break,
                                KeyAction::Send(event) => events.send(event).await?,
                                KeyAction::Export => spawn_export(&dashboard),
                                KeyAction::StartSearch => search = Some(String::new()),
                                KeyAction::None => {}
                            }
                        }
                    }
                    Event::FocusGained => events.send(DashboardEvent::Visibility(true)).await?,
                    Event::FocusLost => events.send(DashboardEvent::Visibility(false)).await?,
                    _ => {}
                }
            }

            let widgets = dashboard.widgets();
            terminal.draw(|frame| draw_ui(frame.size(), frame, &dashboard, &widgets, search.as_deref()))?;
        }

        Ok::<(), anyhow::Error>(())
    }
    .await;

    drop(events);
    let _ = runner.await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), DisableFocusChange, LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    run_result
}

fn spawn_export<B: Backend + 'static>(dashboard: &Dashboard<B>) {
    let dashboard = dashboard.clone();
    tokio::spawn(async move {
        if let Err(err) = crate::exporter::export_detections(&dashboard, Path::new(".")).await {
            warn!(error = %err, "export from viewer failed");
        }
    });
}

fn draw_ui<B: Backend + 'static>(
    area: Rect,
    frame: &mut ratatui::Frame<'_>,
    dashboard: &Dashboard<B>,
    widgets: &WidgetRegistry,
    search: Option<&str>,
) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Length(3),
            Constraint::Percentage(40),
            Constraint::Min(6),
            Constraint::Length(3),
        ])
        .split(area);

    frame.render_widget(render_header(dashboard, widgets), rows[0]);
    render_metrics(frame, rows[1], widgets);

    let middle = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(rows[2]);
    match dashboard.page() {
        Page::Surveillance => {
            frame.render_widget(render_cameras(widgets), rows[2]);
        }
        Page::Reports => {
            render_chart(frame, middle[0], "Weekly Trends", widgets.chart(WidgetId::TrendsChart), Color::Cyan);
            render_chart(frame, middle[1], "By Camera", widgets.chart(WidgetId::PerformanceChart), Color::Magenta);
        }
        Page::Dashboard | Page::Detections => {
            let title = format!("Detections ({})", dashboard.period());
            render_chart(frame, middle[0], &title, widgets.chart(WidgetId::AnalyticsChart), Color::Cyan);
            render_chart(frame, middle[1], "By Camera", widgets.chart(WidgetId::PerformanceChart), Color::Magenta);
        }
    }

    let lower = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(rows[3]);
    frame.render_widget(render_table(widgets, search), lower[0]);
    frame.render_widget(render_feed(widgets), lower[1]);

    frame.render_widget(render_footer(dashboard, search), rows[4]);
}

fn render_header<B: Backend + 'static>(dashboard: &Dashboard<B>, widgets: &WidgetRegistry) -> Paragraph<'static> {
    let active = dashboard.active_camera();
    let mut status = vec![Span::styled(
        "NT Vision  ",
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    )];
    status.push(Span::raw(widgets.text(WidgetId::Page).unwrap_or_default().to_string()));
    if widgets.flag(WidgetId::LoadingIndicator) {
        status.push(Span::styled("  loading...", Style::default().fg(Color::Yellow)));
    }
    if widgets.flag(WidgetId::ErrorIndicator) {
        status.push(Span::styled(
            "  backend unavailable",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ));
    }

    let camera = format!(
        "camera={} ({})  uptime={}  last_update={}",
        dashboard.cameras().display_name(&active),
        active,
        widgets.text(WidgetId::Uptime).filter(|t| !t.is_empty()).unwrap_or("n/a"),
        dashboard
            .debug_info()
            .last_success
            .map(|ts| ts.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "never".to_string()),
    );

    Paragraph::new(vec![Line::from(status), Line::from(camera)])
        .block(Block::default().borders(Borders::ALL).title("Status"))
}

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Normal => Color::Green,
        Severity::Warning => Color::Yellow,
        Severity::Critical => Color::Red,
    }
}

fn band_color(band: ConfidenceBand) -> Color {
    match band {
        ConfidenceBand::High => Color::Green,
        ConfidenceBand::Medium => Color::Yellow,
        ConfidenceBand::Low => Color::Red,
    }
}

fn render_metrics(frame: &mut ratatui::Frame<'_>, area: Rect, widgets: &WidgetRegistry) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(20),
            Constraint::Percentage(20),
            Constraint::Percentage(20),
            Constraint::Percentage(20),
            Constraint::Percentage(20),
        ])
        .split(area);

    let metrics = [
        ("CPU", WidgetId::CpuMetric),
        ("Memory", WidgetId::MemoryMetric),
        ("Storage", WidgetId::StorageMetric),
    ];
    for (col, (label, id)) in cols.iter().copied().zip(metrics) {
        let view = widgets.metric(id).unwrap_or(MetricView::new(0.0));
        let gauge = Gauge::default()
            .block(Block::default().borders(Borders::ALL).title(label))
            .gauge_style(Style::default().fg(severity_color(view.severity)))
            .percent(u16::from(view.percent))
            .label(format!("{}%", view.percent));
        frame.render_widget(gauge, col);
    }

    let cameras = Paragraph::new(widgets.text(WidgetId::ActiveCameras).unwrap_or_default().to_string())
        .block(Block::default().borders(Borders::ALL).title("Cameras"));
    frame.render_widget(cameras, cols[3]);

    let total = widgets
        .counter(WidgetId::TotalDetections)
        .map(|c| c.displayed())
        .unwrap_or(0);
    let counter = Paragraph::new(Span::styled(
        total.to_string(),
        Style::default().add_modifier(Modifier::BOLD),
    ))
    .block(Block::default().borders(Borders::ALL).title("Detections"));
    frame.render_widget(counter, cols[4]);
}

fn render_chart(frame: &mut ratatui::Frame<'_>, area: Rect, title: &str, chart: Option<&ChartView>, color: Color) {
    let data: Vec<(&str, u64)> = chart.map(|c| c.series.points().collect()).unwrap_or_default();
    let bar_width = if data.len() > 12 { 2 } else { 5 };

    let bar_chart = BarChart::default()
        .block(
            Block::default()
                .title(format!(" {title} "))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(color)),
        )
        .data(&data)
        .bar_width(bar_width)
        .bar_gap(1)
        .bar_style(Style::default().fg(color))
        .value_style(Style::default().fg(Color::DarkGray));

    frame.render_widget(bar_chart, area);
}

fn render_cameras(widgets: &WidgetRegistry) -> List<'static> {
    let playing = widgets.video(WidgetId::MainVideo).map(|v| v.camera_id.clone());
    let items: Vec<ListItem> = widgets
        .cards(WidgetId::CameraGrid)
        .unwrap_or_default()
        .iter()
        .enumerate()
        .map(|(idx, card)| {
            let style = if card.active {
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            let live = if card.live { "LIVE" } else { "OFF " };
            let marker = if playing.as_deref() == Some(card.id.as_str()) { ">" } else { " " };
            ListItem::new(Line::from(vec![
                Span::raw(format!("{marker} {} ", idx + 1)),
                Span::styled(format!("[{live}] "), Style::default().fg(Color::Red)),
                Span::styled(card.display_name.clone(), style),
                Span::styled(format!("  {}", card.preview_url), Style::default().fg(Color::DarkGray)),
            ]))
        })
        .collect();

    List::new(items).block(Block::default().borders(Borders::ALL).title("Cameras"))
}

fn render_table(widgets: &WidgetRegistry, search: Option<&str>) -> Table<'static> {
    let header = Row::new(vec![Cell::from("Time"), Cell::from("Camera"), Cell::from("Confidence")])
        .style(Style::default().add_modifier(Modifier::BOLD));

    let rows: Vec<Row> = widgets
        .table(WidgetId::DetectionsTable)
        .map(|table| {
            table
                .visible_rows()
                .map(|row| match row {
                    TableRow::Placeholder { message } => {
                        Row::new(vec![Cell::from(message.clone()), Cell::from(""), Cell::from("")])
                            .style(Style::default().fg(Color::Gray))
                    }
                    TableRow::Detection(det) => Row::new(vec![
                        Cell::from(det.time.clone()),
                        Cell::from(det.camera.clone()),
                        Cell::from(det.confidence.label.clone())
                            .style(Style::default().fg(band_color(det.confidence.band))),
                    ]),
                })
                .collect()
        })
        .unwrap_or_default();

    let title = match search {
        Some(term) => format!("Recent Detections  /{term}"),
        None => "Recent Detections".to_string(),
    };
    Table::new(
        rows,
        [Constraint::Length(20), Constraint::Length(16), Constraint::Length(10)],
    )
    .header(header)
    .column_spacing(1)
    .block(Block::default().borders(Borders::ALL).title(title))
}

fn render_feed(widgets: &WidgetRegistry) -> List<'static> {
    let mut items = Vec::new();
    if let Some(feed) = widgets.feed(WidgetId::ActivityFeed) {
        if let Some(placeholder) = &feed.placeholder {
            items.push(ListItem::new(Line::from(Span::styled(
                placeholder.clone(),
                Style::default().fg(Color::Gray),
            ))));
        }
        for item in &feed.items {
            items.push(ListItem::new(vec![
                Line::from(Span::styled(item.title.clone(), Style::default().add_modifier(Modifier::BOLD))),
                Line::from(format!("{}  {}", item.detail, item.time_ago)),
            ]));
        }
    }

    List::new(items).block(Block::default().borders(Borders::ALL).title("Live Activity"))
}

fn render_footer<B: Backend + 'static>(dashboard: &Dashboard<B>, search: Option<&str>) -> Paragraph<'static> {
    let line = match dashboard.notifier().active().pop() {
        Some(toast) => {
            let color = match toast.level {
                ToastLevel::Info => Color::Blue,
                ToastLevel::Success => Color::Green,
                ToastLevel::Warning => Color::Yellow,
                ToastLevel::Error => Color::Red,
            };
            Line::from(Span::styled(toast.message, Style::default().fg(color)))
        }
        None if search.is_some() => Line::from("type to filter, enter to keep, esc to clear"),
        None => Line::from(HELP),
    };

    Paragraph::new(line).block(Block::default().borders(Borders::ALL))
}
