//!
//! facegate enrollment store
//! -------------------------
//! Durable record of enrolled identities and their biometric templates. Two
//! Parquet tables live under a configurable root: `identities.parquet`
//! (id, name, uid) and `templates.parquet` (id, identity_id, encoded_sample).
//! Tables are small (one row per enrolled principal / stored sample) and are
//! read and rewritten whole on each operation.
//!
//! Key responsibilities:
//! - Idempotent enrollment keyed by the external uid.
//! - Name uniqueness across enrolled identities (names are the match labels).
//! - Template ownership and cascade deletion with the owning identity.
//! - A cheap on-disk fingerprint (`enrollment_stamp`) so the authentication
//!   layer can detect enrollment changes made by this or another process.
//!
//! The public API centers around the `Store` type, which is wrapped in a
//! thread-safe `SharedStore` (`Arc<Mutex<Store>>`) elsewhere in the codebase.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use anyhow::{anyhow, Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

mod tables;
use tables::{
    identities_df, identities_schema_df, read_table, scan_identities, scan_templates,
    templates_df, templates_schema_df, write_table,
};

/// An enrolled principal who may authenticate.
///
/// `name` doubles as the matcher label; `uid` is the external account id and
/// the natural key for idempotent enrollment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub name: String,
    pub uid: i64,
}

/// One stored biometric sample. The sample is kept exactly as submitted
/// (opaque encoded text); the store never interprets it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Template {
    pub id: String,
    pub identity_id: String,
    pub encoded_sample: String,
}

pub struct Store {
    root: PathBuf,
}

impl Store {
    /// Open (or create) a store rooted at the given folder. Seeds empty
    /// tables so an unusable location fails here, at startup, rather than on
    /// the first request.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .with_context(|| format!("creating enrollment root {}", root.display()))?;
        let store = Self { root };
        if !store.identities_path().exists() {
            write_table(&store.identities_path(), identities_schema_df())
                .context("seeding identities table")?;
        }
        if !store.templates_path().exists() {
            write_table(&store.templates_path(), templates_schema_df())
                .context("seeding templates table")?;
        }
        Ok(store)
    }

    pub fn root_path(&self) -> &PathBuf { &self.root }

    fn identities_path(&self) -> PathBuf { self.root.join("identities.parquet") }
    fn templates_path(&self) -> PathBuf { self.root.join("templates.parquet") }

    /// Fingerprint of the enrollment set on disk. Changes whenever either
    /// table is rewritten, including by another process on the same root.
    pub fn enrollment_stamp(&self) -> u64 {
        let mut h: u64 = 0xcbf2_9ce4_8422_2325;
        for path in [self.identities_path(), self.templates_path()] {
            if let Ok(md) = fs::metadata(&path) {
                let mtime = md
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_nanos() as u64)
                    .unwrap_or(0);
                h = (h ^ md.len()).wrapping_mul(0x0000_0100_0000_01b3);
                h = (h ^ mtime).wrapping_mul(0x0000_0100_0000_01b3);
            }
        }
        h
    }

    pub fn list_identities(&self) -> Result<Vec<Identity>> {
        let df = read_table(&self.identities_path(), identities_schema_df)?;
        scan_identities(&df)
    }

    /// Enroll an identity, idempotently keyed by `uid`: re-enrolling an
    /// existing uid updates the name in place and keeps the id and templates.
    pub fn enroll(&self, name: &str, uid: i64) -> Result<Identity> {
        let name = name.trim();
        if name.is_empty() {
            return Err(anyhow!("identity name must not be empty"));
        }
        let mut rows = self.list_identities()?;
        if let Some(other) = rows.iter().find(|r| r.name == name && r.uid != uid) {
            return Err(anyhow!(
                "name '{}' is already enrolled for uid {}",
                name,
                other.uid
            ));
        }
        if let Some(existing) = rows.iter_mut().find(|r| r.uid == uid) {
            existing.name = name.to_string();
            let updated = existing.clone();
            write_table(&self.identities_path(), identities_df(&rows)?)?;
            debug!(target: "facegate::store", "enroll: updated uid={} name='{}'", uid, name);
            return Ok(updated);
        }
        let identity = Identity {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            uid,
        };
        rows.push(identity.clone());
        write_table(&self.identities_path(), identities_df(&rows)?)?;
        debug!(target: "facegate::store", "enroll: created uid={} name='{}' id={}", uid, name, identity.id);
        Ok(identity)
    }

    pub fn find_identity_by_name(&self, name: &str) -> Result<Option<Identity>> {
        Ok(self.list_identities()?.into_iter().find(|r| r.name == name))
    }

    pub fn get_identity(&self, id: &str) -> Result<Option<Identity>> {
        Ok(self.list_identities()?.into_iter().find(|r| r.id == id))
    }

    /// Delete an identity and all templates it owns. Returns false if the
    /// identity was not enrolled.
    pub fn delete_identity(&self, id: &str) -> Result<bool> {
        let mut rows = self.list_identities()?;
        let before = rows.len();
        rows.retain(|r| r.id != id);
        if rows.len() == before {
            return Ok(false);
        }
        write_table(&self.identities_path(), identities_df(&rows)?)?;
        let mut templates = self.list_all_templates()?;
        let t_before = templates.len();
        templates.retain(|t| t.identity_id != id);
        if templates.len() != t_before {
            write_table(&self.templates_path(), templates_df(&templates)?)?;
        }
        debug!(target: "facegate::store", "delete_identity: id={} templates_removed={}", id, t_before - templates.len());
        Ok(true)
    }

    /// Attach a sample to an existing identity. The identity must be enrolled.
    pub fn add_template(&self, identity_id: &str, encoded_sample: &str) -> Result<Template> {
        if self.get_identity(identity_id)?.is_none() {
            return Err(anyhow!("identity '{}' is not enrolled", identity_id));
        }
        if encoded_sample.trim().is_empty() {
            return Err(anyhow!("template sample must not be empty"));
        }
        let mut rows = self.list_all_templates()?;
        let template = Template {
            id: Uuid::new_v4().to_string(),
            identity_id: identity_id.to_string(),
            encoded_sample: encoded_sample.to_string(),
        };
        rows.push(template.clone());
        write_table(&self.templates_path(), templates_df(&rows)?)?;
        debug!(target: "facegate::store", "add_template: identity={} template={}", identity_id, template.id);
        Ok(template)
    }

    pub fn list_templates(&self, identity_id: &str) -> Result<Vec<Template>> {
        Ok(self
            .list_all_templates()?
            .into_iter()
            .filter(|t| t.identity_id == identity_id)
            .collect())
    }

    pub fn list_all_templates(&self) -> Result<Vec<Template>> {
        let df = read_table(&self.templates_path(), templates_schema_df)?;
        scan_templates(&df)
    }

    pub fn delete_template(&self, template_id: &str) -> Result<bool> {
        let mut rows = self.list_all_templates()?;
        let before = rows.len();
        rows.retain(|t| t.id != template_id);
        if rows.len() == before {
            return Ok(false);
        }
        write_table(&self.templates_path(), templates_df(&rows)?)?;
        Ok(true)
    }
}

#[derive(Clone)]
pub struct SharedStore(pub Arc<Mutex<Store>>);

impl SharedStore {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        Ok(SharedStore(Arc::new(Mutex::new(Store::open(root)?))))
    }
}
