//! Read-only web dashboard over the event log, the annotated video and the live camera.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use crate::camera_stream::CameraStream;
use crate::data::MonitorConfig;
use crate::event_log::{read_entries, EventKind, EventLogEntry};
use crate::frame_io;

const DEFAULT_EVENT_LIMIT: usize = 20;
const DOWNLOAD_TS_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Clone)]
pub struct AppState {
    config: Arc<MonitorConfig>,
    camera: Arc<Mutex<CameraStream>>,
}

impl AppState {
    pub fn new(config: MonitorConfig) -> Self {
        let interval = Duration::from_millis(config.dashboard.camera_interval_ms);
        Self {
            config: Arc::new(config),
            camera: Arc::new(Mutex::new(CameraStream::new(interval))),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct StatusResponse {
    pub machine_status: String,
    pub video_available: bool,
    pub video_updated: Option<String>,
    pub event_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    limit: Option<usize>,
}

/// Wraps `anyhow` errors into a 500 response.
struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        log::error!("Dashboard request failed: {:#}", self.0);
        (StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", self.0)).into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

/// "Auto-stopped" iff the most recent event is a hazard stop.
pub fn machine_status(entries: &[EventLogEntry]) -> &'static str {
    match entries.last() {
        Some(entry) if entry.event_kind == EventKind::HazardDetected => "Auto-stopped",
        _ => "Running",
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/status", get(status))
        .route("/api/events", get(events))
        .route("/events.csv", get(events_csv))
        .route("/video", get(video))
        .route("/api/camera/start", post(camera_start))
        .route("/api/camera/stop", post(camera_stop))
        .route("/api/camera/frame.jpg", get(camera_frame))
        .with_state(state)
}

pub async fn serve(config: MonitorConfig) -> anyhow::Result<()> {
    let bind = config.dashboard.bind.clone();
    let state = AppState::new(config);
    let camera = Arc::clone(&state.camera);

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    log::info!("Dashboard listening on http://{}", bind);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for shutdown signal: {err}");
            }
            log::info!("Shutting down dashboard");
        })
        .await?;

    camera.lock().stop();
    Ok(())
}

/// Reads the event log and the video metadata on the blocking pool.
async fn snapshot(config: &Arc<MonitorConfig>) -> anyhow::Result<(Vec<EventLogEntry>, StatusResponse)> {
    let config = Arc::clone(config);
    tokio::task::spawn_blocking(move || {
        let entries = read_entries(Path::new(&config.output.event_log))?;
        let status = build_status(&config, &entries);
        Ok::<_, anyhow::Error>((entries, status))
    })
    .await?
}

fn video_modified(path: &Path) -> Option<String> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::<Local>::from(modified).format("%Y-%m-%d %H:%M:%S").to_string())
}

fn build_status(config: &MonitorConfig, entries: &[EventLogEntry]) -> StatusResponse {
    let video_path = Path::new(&config.output.video_path);
    StatusResponse {
        machine_status: machine_status(entries).to_string(),
        video_available: video_path.is_file(),
        video_updated: video_modified(video_path),
        event_count: entries.len(),
    }
}

fn recent(entries: &[EventLogEntry], limit: usize) -> &[EventLogEntry] {
    &entries[entries.len().saturating_sub(limit)..]
}

async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, AppError> {
    let (_, status) = snapshot(&state.config).await?;
    Ok(Json(status))
}

async fn events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Vec<EventLogEntry>>, AppError> {
    let (entries, _) = snapshot(&state.config).await?;
    let limit = query.limit.unwrap_or(DEFAULT_EVENT_LIMIT);
    Ok(Json(recent(&entries, limit).to_vec()))
}

async fn events_csv(State(state): State<AppState>) -> Result<Response, AppError> {
    let path = Path::new(&state.config.output.event_log);
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok((StatusCode::NOT_FOUND, "No event log yet").into_response());
        }
        Err(err) => return Err(err.into()),
    };
    let filename = format!("event_log_{}.csv", Local::now().format(DOWNLOAD_TS_FORMAT));
    Ok(attachment("text/csv", &filename, bytes))
}

async fn video(State(state): State<AppState>) -> Result<Response, AppError> {
    let path = Path::new(&state.config.output.video_path);
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok((StatusCode::NOT_FOUND, "No video available yet").into_response());
        }
        Err(err) => return Err(err.into()),
    };
    let filename = format!("safety_system_{}.mp4", Local::now().format(DOWNLOAD_TS_FORMAT));
    Ok(attachment("video/mp4", &filename, bytes))
}

fn attachment(content_type: &'static str, filename: &str, bytes: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
        ],
        bytes,
    )
        .into_response()
}

async fn camera_start(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    if state.camera.lock().is_running() {
        return Ok(StatusCode::OK);
    }
    let config = Arc::clone(&state.config);
    let source = tokio::task::spawn_blocking(move || frame_io::open_source(&config.source)).await?;
    let source = match source {
        Ok(source) => source,
        Err(err) => {
            log::warn!("Camera not available: {err}");
            return Ok(StatusCode::SERVICE_UNAVAILABLE);
        }
    };
    state.camera.lock().start(source);
    Ok(StatusCode::OK)
}

async fn camera_stop(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    let camera = Arc::clone(&state.camera);
    tokio::task::spawn_blocking(move || camera.lock().stop()).await?;
    Ok(StatusCode::OK)
}

async fn camera_frame(State(state): State<AppState>) -> Result<Response, AppError> {
    let frame = {
        let camera = state.camera.lock();
        if !camera.is_running() {
            return Ok((StatusCode::CONFLICT, "Camera is not running").into_response());
        }
        camera.latest_frame()
    };
    let Some(frame) = frame else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    let mut buf = Vec::new();
    frame.image.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Jpeg)?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], buf).into_response())
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}

async fn index(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let config = &state.config;
    let (entries, status) = snapshot(config).await?;
    let camera_running = state.camera.lock().is_running();

    let refresh = if config.dashboard.auto_refresh {
        format!(r#"<meta http-equiv="refresh" content="{}">"#, config.dashboard.refresh_interval_secs)
    } else {
        String::new()
    };

    let status_html = if status.machine_status == "Running" {
        r#"<p class="ok">Machine Status: Running</p>"#
    } else {
        r#"<p class="alert">Machine Status: Auto-stopped</p>"#
    };

    let video_html = match (&status.video_available, &status.video_updated) {
        (true, updated) => format!(
            r#"<p>Last updated: {}</p><p><a href="/video">Download Processed Video</a></p>"#,
            updated.as_deref().unwrap_or("unknown")
        ),
        (false, _) => "<p>No processed video available yet. Run the monitor to generate one.</p>".to_string(),
    };

    let events_html = if entries.is_empty() {
        "<p>No events logged yet.</p>".to_string()
    } else {
        let rows: String = recent(&entries, config.dashboard.recent_events)
            .iter()
            .rev()
            .map(|e| {
                format!(
                    "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                    e.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    e.event_kind.as_str(),
                    escape_html(&e.details)
                )
            })
            .collect();
        format!(
            r#"<table><tr><th>timestamp</th><th>event</th><th>details</th></tr>{rows}</table>
<p><a href="/events.csv">Download Event Log (CSV)</a></p>"#
        )
    };

    let camera_html = if camera_running {
        r#"<img src="/api/camera/frame.jpg" alt="live camera"><form method="post" action="/api/camera/stop"><button>Stop Camera</button></form>"#
    } else {
        r#"<form method="post" action="/api/camera/start"><button>Start Camera</button></form>"#
    };

    Ok(Html(format!(
        r#"<!DOCTYPE html>
<html><head><meta charset="utf-8">{refresh}<title>Safety Monitoring Dashboard</title>
<style>.ok{{color:green}}.alert{{color:red;font-weight:bold}}td,th{{padding:4px 8px}}</style></head>
<body>
<h1>Safety Monitoring Dashboard</h1>
<h2>Processed Safety Video</h2>{video_html}
<h2>Live Camera</h2>{camera_html}
<h2>System Status</h2>{status_html}
<h2>Recent Events</h2>{events_html}
</body></html>"#
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn entry(kind: EventKind) -> EventLogEntry {
        EventLogEntry {
            timestamp: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap().and_hms_opt(8, 0, 0).unwrap(),
            event_kind: kind,
            details: String::new(),
        }
    }

    #[test]
    fn status_follows_last_event() {
        assert_eq!(machine_status(&[]), "Running");
        assert_eq!(machine_status(&[entry(EventKind::HazardDetected)]), "Auto-stopped");
        assert_eq!(
            machine_status(&[entry(EventKind::HazardDetected), entry(EventKind::MachineRestarted)]),
            "Running"
        );
    }

    #[test]
    fn recent_takes_the_tail() {
        let entries = vec![entry(EventKind::HazardDetected), entry(EventKind::MachineRestarted)];
        assert_eq!(recent(&entries, 1), &entries[1..]);
        assert_eq!(recent(&entries, 10).len(), 2);
    }

    #[test]
    fn html_is_escaped() {
        assert_eq!(escape_html("<b>&\""), "&lt;b&gt;&amp;&quot;");
    }
}
