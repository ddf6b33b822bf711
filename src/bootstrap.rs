//! Optional bootstrap: seed the enrollment store from the host's user
//! directory. Imported identities start with no templates and therefore
//! cannot authenticate until samples are added for them.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::store::SharedStore;

/// Accounts below this uid are system accounts and are never imported.
pub const MIN_IMPORT_UID: i64 = 1000;

/// Seed identities from a passwd-format file. Only accounts with
/// uid >= MIN_IMPORT_UID are considered; enrollment is idempotent by uid, so
/// repeated imports update rather than duplicate. Returns the number of
/// accounts enrolled or refreshed.
pub fn import_host_accounts(store: &SharedStore, passwd_path: &Path) -> Result<usize> {
    let text = std::fs::read_to_string(passwd_path)
        .with_context(|| format!("reading {}", passwd_path.display()))?;
    let guard = store.0.lock();
    let mut imported = 0usize;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split(':');
        let (Some(name), _passwd, Some(uid)) = (fields.next(), fields.next(), fields.next()) else {
            continue;
        };
        let Ok(uid) = uid.parse::<i64>() else { continue };
        if uid < MIN_IMPORT_UID {
            continue;
        }
        match guard.enroll(name, uid) {
            Ok(_) => imported += 1,
            Err(e) => warn!(target: "facegate::bootstrap", "skipping account '{}': {}", name, e),
        }
    }
    info!(
        target: "facegate::bootstrap",
        "imported {} host account(s) from {}", imported, passwd_path.display()
    );
    Ok(imported)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const PASSWD: &str = "\
root:x:0:0:root:/root:/bin/bash
daemon:x:1:1:daemon:/usr/sbin:/usr/sbin/nologin
# comment line
malformed-line-without-fields
alice:x:1000:1000:Alice:/home/alice:/bin/bash
bob:x:1001:1001::/home/bob:/bin/zsh
nobody:x:65534:65534:nobody:/nonexistent:/usr/sbin/nologin
";

    fn write_passwd(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("passwd");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(PASSWD.as_bytes()).unwrap();
        path
    }

    #[test]
    fn imports_only_regular_accounts() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SharedStore::open(tmp.path().join("data")).unwrap();
        let passwd = write_passwd(tmp.path());

        let imported = import_host_accounts(&store, &passwd).unwrap();
        assert_eq!(imported, 3);

        let guard = store.0.lock();
        let names: Vec<String> = guard.list_identities().unwrap().into_iter().map(|i| i.name).collect();
        assert!(names.contains(&"alice".to_string()));
        assert!(names.contains(&"bob".to_string()));
        assert!(!names.contains(&"root".to_string()));
        assert!(!names.contains(&"daemon".to_string()));
    }

    #[test]
    fn reimport_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SharedStore::open(tmp.path().join("data")).unwrap();
        let passwd = write_passwd(tmp.path());

        import_host_accounts(&store, &passwd).unwrap();
        import_host_accounts(&store, &passwd).unwrap();
        assert_eq!(store.0.lock().list_identities().unwrap().len(), 3);
    }

    #[test]
    fn missing_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SharedStore::open(tmp.path().join("data")).unwrap();
        assert!(import_host_accounts(&store, &tmp.path().join("absent")).is_err());
    }
}
