//!
//! facegate HTTP server
//! --------------------
//! This module defines the Axum-based HTTP/JSON endpoint for facegate. The
//! endpoint exposes the service's two remote operations (`authenticate` and
//! `executeCommand`) and stays a thin adapter: probe handling lives in
//! `auth`, process execution in `dispatch`.
//!
//! Responsibilities:
//! - Startup wiring: enrollment store (fatal when unusable), matcher,
//!   session manager, dispatcher, optional host-account import.
//! - Initial matcher training and a startup enrollment inventory log.
//! - Handler-level mapping of AppError to HTTP statuses, preserving the
//!   legacy `INTRUDER` sentinel on rejected probes.

use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::FutureExt; // for catch_unwind on async blocks
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::auth::{Authenticator, SessionManager};
use crate::dispatch::{CommandDispatcher, ExecRequest};
use crate::matcher::{Matcher, NearestTemplateMatcher};
use crate::store::SharedStore;

/// Literal sentinel returned in place of a token when a probe is rejected.
/// Legacy clients compare the returned string against it.
pub const INTRUDER_SENTINEL: &str = "INTRUDER";

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub http_port: u16,
    pub db_root: String,
    pub exec_timeout_secs: u64,
    pub exec_workers: usize,
    pub match_threshold: f64,
    pub session_ttl_secs: u64,
    pub import_host_users: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            db_root: "facegate-data".to_string(),
            exec_timeout_secs: 30,
            exec_workers: 4,
            match_threshold: 0.75,
            session_ttl_secs: 3600,
            import_host_users: false,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn env_parse_bool(name: &str) -> Option<bool> {
    match std::env::var(name) {
        Ok(v) => match v.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        },
        Err(_) => None,
    }
}

impl ServiceConfig {
    /// Environment-derived configuration; unset or unparsable variables keep
    /// their defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(v) = env_parse::<u16>("FACEGATE_HTTP_PORT") { cfg.http_port = v; }
        if let Ok(v) = std::env::var("FACEGATE_DB_FOLDER") {
            if !v.trim().is_empty() { cfg.db_root = v; }
        }
        if let Some(v) = env_parse::<u64>("FACEGATE_EXEC_TIMEOUT_SECS") { cfg.exec_timeout_secs = v; }
        if let Some(v) = env_parse::<usize>("FACEGATE_EXEC_WORKERS") { cfg.exec_workers = v; }
        if let Some(v) = env_parse::<f64>("FACEGATE_MATCH_THRESHOLD") { cfg.match_threshold = v; }
        if let Some(v) = env_parse::<u64>("FACEGATE_SESSION_TTL_SECS") { cfg.session_ttl_secs = v; }
        if let Some(v) = env_parse_bool("FACEGATE_IMPORT_HOST_USERS") { cfg.import_host_users = v; }
        cfg
    }
}

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub auth: Authenticator,
    pub dispatcher: Arc<CommandDispatcher>,
}

fn log_startup_folders(cfg: &ServiceConfig) {
    let cwd = std::env::current_dir().ok();
    let exe = std::env::current_exe().ok();
    let user = std::env::var("USER").or_else(|_| std::env::var("USERNAME")).ok();
    let db_env = std::env::var("FACEGATE_DB_FOLDER").ok();

    info!(
        target: "startup",
        "facegate starting. Folder configuration: cwd={:?}, exe={:?}, user={:?}, db_root_param={:?}, FACEGATE_DB_FOLDER_env={:?}",
        cwd, exe, user, cfg.db_root, db_env
    );

    let db_exists = Path::new(&cfg.db_root).exists();
    info!(target: "startup", "Path existence: db_root_exists={}", db_exists);
}

/// Scan and print the enrolled identities and their sample counts on startup.
fn print_enrollment_inventory(store: &SharedStore) {
    let guard = store.0.lock();
    match (guard.list_identities(), guard.list_all_templates()) {
        (Ok(identities), Ok(templates)) => {
            if identities.is_empty() {
                println!("No identities enrolled under {}", guard.root_path().display());
                info!("No identities enrolled under {}", guard.root_path().display());
                return;
            }
            println!("Enrolled identities:");
            info!("Enrolled identities:");
            for identity in &identities {
                let count = templates.iter().filter(|t| t.identity_id == identity.id).count();
                println!("- {} (uid {}): {} sample(s)", identity.name, identity.uid, count);
                info!("- {} (uid {}): {} sample(s)", identity.name, identity.uid, count);
            }
        }
        _ => warn!("could not read enrollment inventory"),
    }
}

/// Start the facegate HTTP service with the given configuration.
///
/// Opens the enrollment store (fatal when it cannot be opened or created),
/// optionally imports host accounts, trains the matcher from the current
/// enrollment set and mounts the two RPC routes.
pub async fn run_with_config(cfg: ServiceConfig) -> anyhow::Result<()> {
    log_startup_folders(&cfg);

    let store = SharedStore::open(&cfg.db_root)
        .with_context(|| format!("enrollment store unavailable at '{}'", cfg.db_root))?;

    if cfg.import_host_users {
        match crate::bootstrap::import_host_accounts(&store, Path::new("/etc/passwd")) {
            Ok(n) => info!("imported {} host account(s)", n),
            Err(e) => warn!("host account import failed: {}", e),
        }
    }

    let matcher: Arc<dyn Matcher> = Arc::new(NearestTemplateMatcher::new(cfg.match_threshold));
    let sessions = Arc::new(SessionManager::new(Duration::from_secs(cfg.session_ttl_secs)));
    let auth = Authenticator::new(store.clone(), matcher, sessions.clone());
    let trained = auth.retrain().context("initial matcher training failed")?;
    info!("matcher trained with {} enrollment sample(s)", trained);

    print_enrollment_inventory(&store);

    let dispatcher = Arc::new(CommandDispatcher::new(
        sessions,
        Duration::from_secs(cfg.exec_timeout_secs),
        cfg.exec_workers,
    ));

    let app_state = AppState { auth, dispatcher };

    let app = Router::new()
        .route("/", get(|| async { "facegate ok" }))
        .route("/authenticate", post(authenticate))
        .route("/execute", post(execute))
        .with_state(app_state);

    let addr: SocketAddr = format!("0.0.0.0:{}", cfg.http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Convenience entry point using environment-derived configuration.
pub async fn run() -> anyhow::Result<()> {
    run_with_config(ServiceConfig::from_env()).await
}

#[derive(Debug, Deserialize)]
struct AuthenticatePayload {
    image_data: String,
}

async fn authenticate(
    State(state): State<AppState>,
    Json(payload): Json<AuthenticatePayload>,
) -> impl IntoResponse {
    match state.auth.authenticate(&payload.image_data) {
        Ok(session) => (
            StatusCode::OK,
            Json(json!({"status":"ok","token": session.token})),
        ),
        Err(e @ crate::error::AppError::NoMatch { .. }) => {
            info!("authentication rejected: {}", e.message());
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({"status":"intruder","token": INTRUDER_SENTINEL})),
            )
        }
        Err(e) => {
            error!("authenticate error: {e}");
            let status = StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (
                status,
                Json(json!({"status":"error","code": e.code_str(),"message": e.message()})),
            )
        }
    }
}

async fn execute(
    State(state): State<AppState>,
    Json(payload): Json<ExecRequest>,
) -> impl IntoResponse {
    let exec_fut = async { state.dispatcher.execute(&payload).await };
    match AssertUnwindSafe(exec_fut).catch_unwind().await {
        Ok(Ok(outcome)) => {
            let error = outcome
                .exit_status
                .filter(|c| *c != 0)
                .map(|c| format!("exit status {}", c));
            (
                StatusCode::OK,
                Json(json!({
                    "status": "ok",
                    "stdout": outcome.stdout,
                    "stderr": outcome.stderr,
                    "exit_status": outcome.exit_status,
                    "duration_ms": outcome.duration_ms,
                    "error": error,
                })),
            )
        }
        Ok(Err(app)) => {
            let status = StatusCode::from_u16(app.http_status()).unwrap_or(StatusCode::UNPROCESSABLE_ENTITY);
            (
                status,
                Json(json!({"status":"error","code": app.code_str(),"message": app.message()})),
            )
        }
        Err(panic_payload) => {
            // Convert panics to a 500 error response without crashing the server task
            let msg = if let Some(s) = panic_payload.downcast_ref::<&str>() { *s }
                      else if let Some(s) = panic_payload.downcast_ref::<String>() { s.as_str() }
                      else { "panic" };
            error!(target: "panic", "execute handler panic: {}", msg);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "status":"error",
                    "code":"internal_panic",
                    "message":"internal server error"
                })),
            )
        }
    }
}
