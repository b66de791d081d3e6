use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, OnceLock,
    },
    time::{Duration, Instant},
};

use anyhow::Context;
use axum::{
    extract::{Query, RawForm, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{Offset, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tokio::{net::TcpListener, sync::Mutex};
use tower_http::services::ServeDir;
use tracing::{info, warn};

use relayboard_common::{
    digest_hex, Day, Device, FixedDigestVerifier, Grid, HourBlock, Resolver, RuntimeConfig,
    SessionStore, TimeSlot,
};

use crate::store::{ScheduleError, ScheduleStore};

const SESSION_HEADER: &str = "x-session-token";

/// Seam to the physical outputs. The host build logs transitions; the
/// relay GPIO transport hooks in here on real hardware.
pub trait OutputDriver: Send + Sync {
    fn set(&self, device: Device, on: bool) -> anyhow::Result<()>;
}

pub struct LogDriver;

impl OutputDriver for LogDriver {
    fn set(&self, device: Device, on: bool) -> anyhow::Result<()> {
        info!(
            "output {} -> {}",
            device.as_str(),
            if on { "on" } else { "off" }
        );
        Ok(())
    }
}

#[derive(Clone)]
struct AppState {
    grid: Arc<Mutex<Grid>>,
    sessions: Arc<Mutex<SessionStore>>,
    resolver: Arc<Mutex<Resolver>>,
    verifier: Arc<FixedDigestVerifier>,
    driver: Arc<dyn OutputDriver>,
    timezone: Arc<String>,
    time_synced: Arc<AtomicBool>,
    store: ScheduleStore,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    token: String,
}

#[derive(Debug, Serialize)]
struct LogoutResponse {
    #[serde(rename = "loggedOut")]
    logged_out: bool,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct UpdateOutcome {
    applied: usize,
    skipped: usize,
    persisted: bool,
}

#[derive(Debug, Serialize)]
struct SlotView {
    weekday: &'static str,
    #[serde(rename = "hourBlock")]
    hour_block: &'static str,
}

#[derive(Debug, Serialize)]
struct DeviceStatusView {
    device: &'static str,
    desired: bool,
    applied: Option<bool>,
}

#[derive(Debug, Serialize)]
struct StatusView {
    #[serde(rename = "timeSynced")]
    time_synced: bool,
    timezone: String,
    slot: Option<SlotView>,
    devices: Vec<DeviceStatusView>,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = ScheduleStore::new();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    runtime.sanitize();
    // Write the sanitized values back: a first boot seeds an editable
    // runtime.json, and hand-edited out-of-range values get normalized.
    if let Err(err) = store.save_runtime_config(&runtime).await {
        warn!("failed to write back runtime config: {err:#}");
    }

    let grid = store.load_grid().await;
    info!("loaded schedule grid with {} cells on", grid.cells_on());

    let state = AppState {
        grid: Arc::new(Mutex::new(grid)),
        sessions: Arc::new(Mutex::new(SessionStore::new(runtime.session_idle_timeout_ms))),
        resolver: Arc::new(Mutex::new(Resolver::default())),
        verifier: Arc::new(FixedDigestVerifier::new(
            runtime.auth.username_digest.clone(),
            runtime.auth.password_digest.clone(),
        )),
        driver: Arc::new(LogDriver),
        timezone: Arc::new(runtime.timezone.clone()),
        time_synced: Arc::new(AtomicBool::new(false)),
        store,
    };

    spawn_control_loop(
        state.clone(),
        Duration::from_millis(runtime.tick_interval_ms),
    );

    let web_root = format!("{}/web", env!("CARGO_MANIFEST_DIR"));
    let app = Router::new()
        .route("/api/login", post(handle_login))
        .route("/api/logout", post(handle_logout))
        .route(
            "/api/schedule",
            get(handle_get_schedule).post(handle_post_schedule),
        )
        .route("/api/status", get(handle_get_status))
        .fallback_service(ServeDir::new(web_root))
        .with_state(state);

    let port = std::env::var("RELAYBOARD_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr: SocketAddr = format!("0.0.0.0:{port}").parse().unwrap();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("controller listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Periodic resolver tick: reads the grid, computes desired outputs for
/// the current slot, and drives only the devices whose state changed.
/// Never propagates errors; a failed write stays pending for next tick.
fn spawn_control_loop(state: AppState, tick_interval: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick_interval);
        let mut clock_was_valid = true;

        loop {
            interval.tick().await;

            let now = now_in_timezone(&state.timezone);
            state.time_synced.store(now.is_some(), Ordering::Relaxed);
            if now.is_none() && clock_was_valid {
                warn!("clock unavailable; resolving every output off");
            }
            clock_was_valid = now.is_some();

            let slot = now.and_then(TimeSlot::from_datetime);
            let commands = {
                let grid = state.grid.lock().await;
                let resolver = state.resolver.lock().await;
                resolver.plan(&grid, slot)
            };

            for command in commands {
                match state.driver.set(command.device, command.on) {
                    Ok(()) => {
                        let mut resolver = state.resolver.lock().await;
                        resolver.commit(command.device, command.on);
                    }
                    // Not committed, so the same edge is retried next tick.
                    Err(err) => warn!(
                        "output write for {} failed: {err:#}",
                        command.device.as_str()
                    ),
                }
            }
        }
    });
}

/// The schedule-update path: verify the session, build the candidate grid
/// off to the side, hold the grid lock only for the swap, then persist a
/// snapshot of the shared grid taken under the store's file lock. A storage
/// failure leaves the in-memory grid authoritative and is reported, not
/// rolled back.
async fn apply_schedule_update(
    state: &AppState,
    token: &str,
    field_names: &[String],
) -> Result<UpdateOutcome, ScheduleError> {
    let now_ms = monotonic_ms();
    let authorized = {
        let mut sessions = state.sessions.lock().await;
        sessions.is_authenticated(token, now_ms)
    };
    if !authorized {
        return Err(ScheduleError::Unauthorized);
    }

    let (candidate, stats) = Grid::from_fields(field_names.iter().map(String::as_str));

    {
        let mut grid = state.grid.lock().await;
        *grid = candidate;
    }

    // Persist a snapshot read back from the shared grid, not the local
    // candidate: concurrent editors may reach the store in swap order or
    // not, and the record on disk must match whichever swap won. Bounded
    // so a slow disk never stalls the response or the tick.
    let persisted = match tokio::time::timeout(
        Duration::from_secs(5),
        state.store.save_grid_snapshot(&state.grid),
    )
    .await
    {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            warn!(
                "schedule active in memory only: {:#}",
                anyhow::Error::new(err)
            );
            false
        }
        Err(_) => {
            warn!("schedule active in memory only: grid write timed out");
            false
        }
    };

    Ok(UpdateOutcome {
        applied: stats.applied,
        skipped: stats.skipped,
        persisted,
    })
}

async fn handle_login(State(state): State<AppState>, RawForm(body): RawForm) -> impl IntoResponse {
    let fields: HashMap<String, String> = form_urlencoded::parse(&body).into_owned().collect();
    let (Some(username), Some(password)) =
        (fields.get("login-username"), fields.get("login-password"))
    else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Missing login-username or login-password field",
        );
    };

    // Hash at the edge; plaintext never goes further than this frame.
    let username_digest = digest_hex(username);
    let password_digest = digest_hex(password);

    let result = {
        let mut sessions = state.sessions.lock().await;
        sessions.login(
            state.verifier.as_ref(),
            &username_digest,
            &password_digest,
            monotonic_ms(),
        )
    };

    match result {
        Ok(token) => Json(LoginResponse { token }).into_response(),
        Err(_) => {
            warn!("rejected login attempt");
            error_response(StatusCode::UNAUTHORIZED, "Invalid credentials")
        }
    }
}

async fn handle_logout(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(token) = session_token(&headers) {
        let mut sessions = state.sessions.lock().await;
        sessions.logout(token);
    }
    Json(LogoutResponse { logged_out: true })
}

async fn handle_post_schedule(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawForm(body): RawForm,
) -> impl IntoResponse {
    let Some(token) = session_token(&headers) else {
        return error_response(StatusCode::UNAUTHORIZED, "Missing session token");
    };

    let field_names: Vec<String> = form_urlencoded::parse(&body)
        .into_owned()
        .map(|(name, _)| name)
        .collect();

    match apply_schedule_update(&state, token, &field_names).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(ScheduleError::Unauthorized) => {
            error_response(StatusCode::UNAUTHORIZED, "Session is not authenticated")
        }
        Err(err) => {
            warn!("schedule update failed: {:#}", anyhow::Error::new(err));
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to apply schedule update",
            )
        }
    }
}

/// Unauthenticated read of one (weekday, hour-block) column, answering the
/// `pv<code>-status` readback fields.
async fn handle_get_schedule(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(day) = params.get("weekday").and_then(|t| Day::from_token(t)) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Missing or invalid 'weekday' parameter",
        );
    };
    let Some(block) = params.get("hour-block").and_then(|t| HourBlock::from_token(t)) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Missing or invalid 'hour-block' parameter",
        );
    };

    let grid = state.grid.lock().await;
    let mut body = serde_json::Map::new();
    body.insert("weekday".to_string(), day.token().into());
    body.insert("hourBlock".to_string(), block.token().into());
    for device in Device::ALL {
        body.insert(
            format!("{}-status", device.as_str()),
            grid.get(device, day, block).into(),
        );
    }
    Json(serde_json::Value::Object(body)).into_response()
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    let slot = now_in_timezone(&state.timezone).and_then(TimeSlot::from_datetime);

    let grid = state.grid.lock().await;
    let resolver = state.resolver.lock().await;
    let devices = Device::ALL
        .into_iter()
        .map(|device| DeviceStatusView {
            device: device.as_str(),
            desired: Resolver::desired(&grid, slot, device),
            applied: resolver.applied(device),
        })
        .collect();

    Json(StatusView {
        time_synced: state.time_synced.load(Ordering::Relaxed),
        timezone: state.timezone.as_ref().clone(),
        slot: slot.map(|slot| SlotView {
            weekday: slot.day.token(),
            hour_block: slot.block.token(),
        }),
        devices,
    })
}

fn session_token(headers: &HeaderMap) -> Option<&str> {
    headers.get(SESSION_HEADER)?.to_str().ok()
}

fn now_in_timezone(timezone: &str) -> Option<chrono::DateTime<chrono::FixedOffset>> {
    let tz: Tz = timezone.parse().ok()?;
    let local = Utc::now().with_timezone(&tz);
    Some(local.with_timezone(&local.offset().fix()))
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
