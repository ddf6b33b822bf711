//! Command-execution gateway. A validated session unlocks running an
//! external program; output is captured in full and the child is bounded by
//! a timeout and a fixed-size worker pool so a hung process can never starve
//! the endpoint's ability to accept new authentications.

use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::auth::SessionManager;
use crate::error::AppError;

#[derive(Debug, Clone, Deserialize)]
pub struct ExecRequest {
    pub session_id: String,
    pub command: String,
    /// Single argument string per the wire contract; split on whitespace
    /// into argv entries before spawning.
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: Option<i32>,
    pub status: ExecStatus,
    pub duration_ms: u64,
}

pub struct CommandDispatcher {
    sessions: Arc<SessionManager>,
    timeout: Duration,
    permits: Arc<Semaphore>,
}

impl CommandDispatcher {
    pub fn new(sessions: Arc<SessionManager>, timeout: Duration, workers: usize) -> Self {
        Self {
            sessions,
            timeout,
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    pub fn timeout(&self) -> Duration { self.timeout }

    /// Execute a command on behalf of a session. Validation is unconditional:
    /// nothing is spawned for a token that was never issued.
    pub async fn execute(&self, req: &ExecRequest) -> Result<ExecOutcome, AppError> {
        let Some(session) = self.sessions.validate(&req.session_id) else {
            return Err(AppError::unauthorized("unauthorized", "session token absent or unknown"));
        };
        let program = req.command.trim();
        if program.is_empty() {
            return Err(AppError::execution("exec_failed", "command must not be empty"));
        }

        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AppError::internal("internal_error", "worker pool closed"))?;

        let argv: Vec<String> = req.arguments.split_whitespace().map(|s| s.to_string()).collect();
        info!(
            target: "facegate::dispatch",
            "'{}' runs {} {:?}", session.identity_name, program, argv
        );

        let started = Instant::now();
        let mut cmd = Command::new(program);
        cmd.args(&argv)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // An abandoned wait must kill and reap the child, not leak it.
            .kill_on_drop(true);

        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => Ok(ExecOutcome {
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                exit_status: output.status.code(),
                status: if output.status.success() { ExecStatus::Completed } else { ExecStatus::Failed },
                duration_ms: started.elapsed().as_millis() as u64,
            }),
            Ok(Err(e)) => Err(AppError::execution(
                "exec_failed".to_string(),
                format!("failed to spawn '{}': {}", program, e),
            )),
            Err(_) => {
                warn!(
                    target: "facegate::dispatch",
                    "'{}' exceeded {:?} and was killed", program, self.timeout
                );
                Err(AppError::timed_out(
                    "timed_out".to_string(),
                    format!("command exceeded {}s and was terminated", self.timeout.as_secs()),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Identity;

    fn dispatcher_with_session(timeout_secs: u64, workers: usize) -> (CommandDispatcher, String) {
        let sessions = Arc::new(SessionManager::new(Duration::from_secs(3600)));
        let alice = Identity { id: "id-alice".into(), name: "alice".into(), uid: 1000 };
        let token = sessions.issue(&alice).unwrap().token;
        (
            CommandDispatcher::new(sessions, Duration::from_secs(timeout_secs), workers),
            token,
        )
    }

    fn request(token: &str, command: &str, arguments: &str) -> ExecRequest {
        ExecRequest {
            session_id: token.to_string(),
            command: command.to_string(),
            arguments: arguments.to_string(),
        }
    }

    #[tokio::test]
    async fn echo_returns_captured_stdout() {
        let (d, token) = dispatcher_with_session(10, 4);
        let out = d.execute(&request(&token, "echo", "hello")).await.unwrap();
        assert_eq!(out.stdout, "hello\n");
        assert_eq!(out.exit_status, Some(0));
        assert_eq!(out.status, ExecStatus::Completed);
    }

    #[tokio::test]
    async fn unknown_token_never_executes() {
        let (d, _token) = dispatcher_with_session(10, 4);
        let tmp = tempfile::tempdir().unwrap();
        let marker = tmp.path().join("ran");
        let req = request("never-issued", "touch", marker.to_str().unwrap());
        let err = d.execute(&req).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized { .. }));
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn missing_program_is_reported_as_execution_failure() {
        let (d, token) = dispatcher_with_session(10, 4);
        let err = d
            .execute(&request(&token, "/no/such/binary", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ExecutionFailed { .. }));
    }

    #[tokio::test]
    async fn nonzero_exit_is_surfaced_with_status() {
        let (d, token) = dispatcher_with_session(10, 4);
        let out = d.execute(&request(&token, "false", "")).await.unwrap();
        assert_eq!(out.status, ExecStatus::Failed);
        assert_eq!(out.exit_status, Some(1));
    }

    #[tokio::test]
    async fn overlong_command_is_killed_and_reported() {
        let (d, token) = dispatcher_with_session(1, 4);
        let started = Instant::now();
        let err = d.execute(&request(&token, "sleep", "30")).await.unwrap_err();
        assert!(matches!(err, AppError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn worker_pool_serializes_beyond_capacity() {
        let (d, token) = dispatcher_with_session(10, 1);
        let started = Instant::now();
        let req_a = request(&token, "sleep", "0.3");
        let req_b = request(&token, "sleep", "0.3");
        let (a, b) = tokio::join!(
            d.execute(&req_a),
            d.execute(&req_b),
        );
        a.unwrap();
        b.unwrap();
        // One permit: the second sleep cannot start until the first finishes.
        assert!(started.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn expired_session_is_unauthorized() {
        let sessions = Arc::new(SessionManager::new(Duration::from_secs(0)));
        let alice = Identity { id: "id-alice".into(), name: "alice".into(), uid: 1000 };
        let token = sessions.issue(&alice).unwrap().token;
        let d = CommandDispatcher::new(sessions, Duration::from_secs(10), 4);
        let err = d.execute(&request(&token, "echo", "hi")).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized { .. }));
    }
}
