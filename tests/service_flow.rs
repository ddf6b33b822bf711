//! End-to-end flow over the public API: enroll, authenticate with a probe,
//! then execute a command through the issued session.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;

use facegate::auth::{Authenticator, SessionManager};
use facegate::dispatch::{CommandDispatcher, ExecRequest};
use facegate::error::AppError;
use facegate::matcher::{Matcher, NearestTemplateMatcher};
use facegate::store::SharedStore;

fn encode(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn exec_request(token: &str, command: &str, arguments: &str) -> ExecRequest {
    ExecRequest {
        session_id: token.to_string(),
        command: command.to_string(),
        arguments: arguments.to_string(),
    }
}

#[tokio::test]
async fn probe_to_command_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let store = SharedStore::open(tmp.path()).unwrap();
    {
        let guard = store.0.lock();
        let alice = guard.enroll("alice", 1000).unwrap();
        guard.add_template(&alice.id, &encode(&[42u8; 48])).unwrap();
    }

    let matcher: Arc<dyn Matcher> = Arc::new(NearestTemplateMatcher::new(0.75));
    let sessions = Arc::new(SessionManager::new(Duration::from_secs(3600)));
    let auth = Authenticator::new(store, matcher, sessions.clone());

    let session = auth.authenticate(&encode(&[42u8; 48])).unwrap();
    assert_eq!(session.identity_name, "alice");

    let dispatcher = CommandDispatcher::new(sessions, Duration::from_secs(10), 2);
    let out = dispatcher
        .execute(&exec_request(&session.token, "echo", "hello"))
        .await
        .unwrap();
    assert_eq!(out.stdout, "hello\n");
    assert_eq!(out.exit_status, Some(0));
}

#[tokio::test]
async fn rejected_probe_cannot_reach_the_dispatcher() {
    let tmp = tempfile::tempdir().unwrap();
    let store = SharedStore::open(tmp.path()).unwrap();
    {
        let guard = store.0.lock();
        let alice = guard.enroll("alice", 1000).unwrap();
        guard.add_template(&alice.id, &encode(&[0u8; 48])).unwrap();
    }

    let matcher: Arc<dyn Matcher> = Arc::new(NearestTemplateMatcher::new(0.9));
    let sessions = Arc::new(SessionManager::new(Duration::from_secs(3600)));
    let auth = Authenticator::new(store, matcher, sessions.clone());

    let err = auth.authenticate(&encode(&[255u8; 48])).unwrap_err();
    assert!(matches!(err, AppError::NoMatch { .. }));

    // The sentinel a legacy client would hold is not a usable token either.
    let dispatcher = CommandDispatcher::new(sessions, Duration::from_secs(10), 2);
    let err = dispatcher
        .execute(&exec_request("INTRUDER", "echo", "hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized { .. }));
}
