use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use base64::Engine;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::store::Identity;
use crate::tprintln;

pub type SessionToken = String;

/// A live credential minted by a successful authentication. Sessions are
/// never updated after issue, only validated and removed.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: SessionToken,
    pub identity_id: String,
    pub identity_name: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Instant,
}

#[derive(Debug)]
struct SessionEntry {
    session: Session,
}

fn gen_token() -> Result<String> {
    // 256-bit random token, base64url without padding
    let mut buf = [0u8; 32];
    getrandom::getrandom(&mut buf).map_err(|e| anyhow!("os rng unavailable: {}", e))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

/// Owned, lock-guarded session table. All maps live on the manager value and
/// are shared by handle, never through ambient globals.
pub struct SessionManager {
    ttl: Duration,
    sessions: RwLock<HashMap<String, SessionEntry>>,
    identity_index: RwLock<HashMap<String, HashSet<String>>>,
    revoked: RwLock<HashSet<String>>,
}

impl Default for SessionManager {
    fn default() -> Self { Self::new(Duration::from_secs(60 * 60)) }
}

impl SessionManager {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: RwLock::new(HashMap::new()),
            identity_index: RwLock::new(HashMap::new()),
            revoked: RwLock::new(HashSet::new()),
        }
    }

    pub fn issue(&self, identity: &Identity) -> Result<Session> {
        let now = Instant::now();
        let token = gen_token()?;
        let sess = Session {
            token: token.clone(),
            identity_id: identity.id.clone(),
            identity_name: identity.name.clone(),
            issued_at: Utc::now(),
            expires_at: now + self.ttl,
        };
        {
            let mut m = self.sessions.write();
            m.insert(token.clone(), SessionEntry { session: sess.clone() });
        }
        {
            let mut idx = self.identity_index.write();
            let set = idx.entry(identity.id.clone()).or_insert_with(HashSet::new);
            set.insert(token.clone());
        }
        tprintln!("session.issue identity={} ttl_secs={}", identity.name, self.ttl.as_secs());
        Ok(sess)
    }

    /// Pure lookup used on every dispatch. Unknown, revoked and expired
    /// tokens are rejected; expired entries are pruned on the way out.
    pub fn validate(&self, token: &str) -> Option<Session> {
        if self.revoked.read().contains(token) {
            return None;
        }
        let now = Instant::now();
        let mut drop_key: Option<String> = None;
        let out = {
            let map = self.sessions.read();
            if let Some(ent) = map.get(token) {
                if ent.session.expires_at > now {
                    Some(ent.session.clone())
                } else {
                    drop_key = Some(token.to_string());
                    None
                }
            } else {
                None
            }
        };
        if let Some(k) = drop_key {
            if let Some(ent) = self.sessions.write().remove(&k) {
                let mut idx = self.identity_index.write();
                if let Some(set) = idx.get_mut(&ent.session.identity_id) {
                    set.remove(&k);
                }
            }
        }
        out
    }

    pub fn revoke(&self, token: &str) -> bool {
        let mut removed = false;
        if let Some(ent) = self.sessions.write().remove(token) {
            removed = true;
            let mut idx = self.identity_index.write();
            if let Some(set) = idx.get_mut(&ent.session.identity_id) {
                set.remove(token);
            }
            self.revoked.write().insert(token.to_string());
        }
        removed
    }

    /// Revoke every live session bound to an identity. Used when an identity
    /// is removed from enrollment.
    pub fn revoke_identity(&self, identity_id: &str) -> usize {
        let mut count = 0usize;
        if let Some(tokens) = self.identity_index.read().get(identity_id).cloned() {
            let mut s = self.sessions.write();
            let mut r = self.revoked.write();
            for t in tokens.iter() {
                if s.remove(t).is_some() {
                    count += 1;
                }
                r.insert(t.clone());
            }
        }
        tprintln!("session.revoke identity={} count={}", identity_id, count);
        count
    }

    pub fn live_count(&self) -> usize {
        self.sessions.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(name: &str) -> Identity {
        Identity { id: format!("id-{name}"), name: name.to_string(), uid: 1000 }
    }

    #[test]
    fn issued_token_resolves_to_its_identity() {
        let sm = SessionManager::default();
        let alice = identity("alice");
        let s1 = sm.issue(&alice).unwrap();
        let s2 = sm.issue(&alice).unwrap();
        assert_ne!(s1.token, s2.token);
        assert_eq!(sm.validate(&s1.token).unwrap().identity_id, alice.id);
        assert_eq!(sm.validate(&s2.token).unwrap().identity_id, alice.id);
    }

    #[test]
    fn unknown_token_is_rejected() {
        let sm = SessionManager::default();
        assert!(sm.validate("never-issued").is_none());
    }

    #[test]
    fn expired_session_is_rejected_and_pruned() {
        let sm = SessionManager::new(Duration::from_secs(0));
        let s = sm.issue(&identity("alice")).unwrap();
        assert!(sm.validate(&s.token).is_none());
        assert_eq!(sm.live_count(), 0);
    }

    #[test]
    fn revoke_invalidates_token() {
        let sm = SessionManager::default();
        let s = sm.issue(&identity("alice")).unwrap();
        assert!(sm.revoke(&s.token));
        assert!(!sm.revoke(&s.token));
        assert!(sm.validate(&s.token).is_none());
    }

    #[test]
    fn revoke_identity_sweeps_all_its_sessions() {
        let sm = SessionManager::default();
        let alice = identity("alice");
        let bob = identity("bob");
        let a1 = sm.issue(&alice).unwrap();
        let a2 = sm.issue(&alice).unwrap();
        let b1 = sm.issue(&bob).unwrap();
        assert_eq!(sm.revoke_identity(&alice.id), 2);
        assert!(sm.validate(&a1.token).is_none());
        assert!(sm.validate(&a2.token).is_none());
        assert!(sm.validate(&b1.token).is_some());
    }

    #[test]
    fn tokens_are_long_and_unique() {
        let sm = SessionManager::default();
        let alice = identity("alice");
        let mut seen = std::collections::HashSet::new();
        for _ in 0..64 {
            let s = sm.issue(&alice).unwrap();
            // 32 random bytes, base64url without padding
            assert_eq!(s.token.len(), 43);
            assert!(seen.insert(s.token));
        }
    }
}
