//!
//! facegate server binary
//! ----------------------
//! Command-line entry point for starting the facegate HTTP service. Supports
//! configuration via CLI flags and environment variables; flags override the
//! environment.

use anyhow::Result;
use std::env;

use facegate::server::ServiceConfig;

fn parse_arg<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag && i + 1 < args.len() {
            return args[i + 1].parse::<T>().ok();
        }
        i += 1;
    }
    None
}

fn parse_string_arg(args: &[String], flag: &str) -> Option<String> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
        i += 1;
    }
    None
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

#[tokio::main]
async fn main() -> Result<()> {
    println!(r"   ______                ______      __
  / ____/___ _________  / ____/___ _/ /____
 / /_  / __ `/ ___/ _ \/ / __/ __ `/ __/ _ \
/ __/ / /_/ / /__/  __/ /_/ / /_/ / /_/  __/
/_/    \__,_/\___/\___/\____/\__,_/\__/\___/  ");

    // Initialize tracing subscriber with env filter if provided
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let args: Vec<String> = env::args().collect();

    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        println!("facegate Server\n\nUSAGE:\n  facegate_server [--http-port N] [--db-folder PATH] [--exec-timeout N] [--workers N] [--threshold F] [--session-ttl N] [--import-host-users]\n\nOPTIONS:\n  --http-port N        HTTP API port (env: FACEGATE_HTTP_PORT, default 8080)\n  --db-folder PATH     Enrollment store folder (env: FACEGATE_DB_FOLDER, default facegate-data)\n  --exec-timeout N     Command timeout in seconds (env: FACEGATE_EXEC_TIMEOUT_SECS, default 30)\n  --workers N          Max concurrent commands (env: FACEGATE_EXEC_WORKERS, default 4)\n  --threshold F        Match rejection threshold in 0..1 (env: FACEGATE_MATCH_THRESHOLD, default 0.75)\n  --session-ttl N      Session lifetime in seconds (env: FACEGATE_SESSION_TTL_SECS, default 3600)\n  --import-host-users  Seed identities from /etc/passwd, uid >= 1000 (env: FACEGATE_IMPORT_HOST_USERS)\n");
        return Ok(());
    }

    // Environment first, CLI arguments override
    let mut cfg = ServiceConfig::from_env();
    if let Some(v) = parse_arg::<u16>(&args, "--http-port") { cfg.http_port = v; }
    if let Some(v) = parse_string_arg(&args, "--db-folder") { cfg.db_root = v; }
    if let Some(v) = parse_arg::<u64>(&args, "--exec-timeout") { cfg.exec_timeout_secs = v; }
    if let Some(v) = parse_arg::<usize>(&args, "--workers") { cfg.exec_workers = v; }
    if let Some(v) = parse_arg::<f64>(&args, "--threshold") { cfg.match_threshold = v; }
    if let Some(v) = parse_arg::<u64>(&args, "--session-ttl") { cfg.session_ttl_secs = v; }
    if has_flag(&args, "--import-host-users") { cfg.import_host_users = true; }

    println!(
        "facegate starting: http={}, db_root={}, exec_timeout={}s, workers={}, threshold={}",
        cfg.http_port, cfg.db_root, cfg.exec_timeout_secs, cfg.exec_workers, cfg.match_threshold
    );
    tracing::info!(
        "Using port http={}, db_root={}, import_host_users={}",
        cfg.http_port, cfg.db_root, cfg.import_host_users
    );

    facegate::server::run_with_config(cfg).await
}
