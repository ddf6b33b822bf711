use std::sync::Arc;

use anyhow::{Context, Result};
use base64::Engine;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::AppError;
use crate::matcher::{Matcher, TrainingExample};
use crate::store::SharedStore;
use crate::tprintln;

use super::session::{Session, SessionManager};

/// Orchestrates authentication: builds the matcher's training set from the
/// enrollment store, decodes probes, invokes the matcher and mints sessions
/// for resolved identities.
#[derive(Clone)]
pub struct Authenticator {
    store: SharedStore,
    matcher: Arc<dyn Matcher>,
    sessions: Arc<SessionManager>,
    trained_stamp: Arc<Mutex<Option<u64>>>,
}

impl Authenticator {
    pub fn new(store: SharedStore, matcher: Arc<dyn Matcher>, sessions: Arc<SessionManager>) -> Self {
        Self { store, matcher, sessions, trained_stamp: Arc::new(Mutex::new(None)) }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> { &self.sessions }

    /// Rebuild the matcher's training set from the current enrollment set.
    /// Returns the number of usable examples handed to the matcher.
    pub fn retrain(&self) -> Result<usize> {
        let (stamp, identities, templates) = {
            let guard = self.store.0.lock();
            let stamp = guard.enrollment_stamp();
            let identities = guard.list_identities().context("loading identities")?;
            let templates = guard.list_all_templates().context("loading templates")?;
            (stamp, identities, templates)
        };
        let mut examples = Vec::with_capacity(templates.len());
        for t in templates {
            let Some(identity) = identities.iter().find(|i| i.id == t.identity_id) else {
                warn!(target: "facegate::auth", "template {} references missing identity {}", t.id, t.identity_id);
                continue;
            };
            match base64::engine::general_purpose::STANDARD.decode(t.encoded_sample.trim()) {
                Ok(sample) if !sample.is_empty() => {
                    examples.push(TrainingExample { label: identity.name.clone(), sample })
                }
                _ => warn!(target: "facegate::auth", "template {} for '{}' is not decodable, skipped", t.id, identity.name),
            }
        }
        let count = examples.len();
        self.matcher.train(examples);
        *self.trained_stamp.lock() = Some(stamp);
        tprintln!("auth.retrain examples={}", count);
        Ok(count)
    }

    /// Retrain only when the enrollment set changed since the last training.
    /// The stamp check is a pair of file stats, so calling this per request
    /// is cheap; the rebuild itself runs only on change.
    fn ensure_trained(&self) -> Result<()> {
        let current = self.store.0.lock().enrollment_stamp();
        if *self.trained_stamp.lock() == Some(current) {
            return Ok(());
        }
        self.retrain().map(|_| ())
    }

    /// Authenticate a probe payload. On success a new session bound to the
    /// matched identity is minted and returned.
    pub fn authenticate(&self, image_data: &str) -> Result<Session, AppError> {
        let probe = base64::engine::general_purpose::STANDARD
            .decode(image_data.trim())
            .map_err(|_| AppError::malformed("malformed_sample", "probe payload is not valid base64"))?;
        if probe.is_empty() {
            return Err(AppError::malformed("malformed_sample", "probe payload is empty"));
        }

        self.ensure_trained()
            .map_err(|e| AppError::store_unavailable("store_unavailable".to_string(), e.to_string()))?;

        let Some(outcome) = self.matcher.recognize(&probe) else {
            return Err(AppError::no_match("no_match", "no enrolled identity passed the rejection threshold"));
        };

        let identity = {
            let guard = self.store.0.lock();
            guard.find_identity_by_name(&outcome.label)
        }
        .map_err(|e| AppError::store_unavailable("store_unavailable".to_string(), e.to_string()))?;
        let Some(identity) = identity else {
            warn!(target: "facegate::auth", "matched label '{}' is no longer enrolled", outcome.label);
            return Err(AppError::no_match("no_match", "matched identity is no longer enrolled"));
        };

        let session = self.sessions.issue(&identity).map_err(AppError::from)?;
        info!(
            target: "facegate::auth",
            "authenticated '{}' (uid {}) confidence {:.3}",
            identity.name, identity.uid, outcome.confidence
        );
        Ok(session)
    }

    pub fn validate(&self, token: &str) -> Option<Session> {
        self.sessions.validate(token)
    }

    /// Remove an identity from enrollment and revoke its live sessions.
    pub fn remove_identity(&self, identity_id: &str) -> Result<bool> {
        let removed = self.store.0.lock().delete_identity(identity_id)?;
        if removed {
            let swept = self.sessions.revoke_identity(identity_id);
            tprintln!("auth.remove identity={} sessions_revoked={}", identity_id, swept);
        }
        Ok(removed)
    }
}
