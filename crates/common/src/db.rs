//! Credential persistence
//!
//! A realm authenticator loads its records once at configure time and
//! persists every mutation through a [`CredentialPersistence`]. The on-disk
//! layout is owned by the implementation; `SqliteCredentials` keeps one JSON
//! row per user in a SQLite database at the realm path.

use crate::types::UserRecord;
use crate::{Error, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Path that selects a private in-memory SQLite database
pub const MEMORY_PATH: &str = ":memory:";

/// Storage boundary for a realm's credential records
pub trait CredentialPersistence: Send + Sync {
    /// Load every record stored at `path`. A missing store is empty.
    fn load(&self, path: &Path) -> Result<Vec<UserRecord>>;

    /// Insert or replace the given records.
    fn persist(&self, records: &[UserRecord], path: &Path) -> Result<()>;

    /// Remove a user and all of its material.
    fn remove(&self, username: &str, path: &Path) -> Result<()>;
}

// ============================================================================
// SQLite
// ============================================================================

/// SQLite-backed credential persistence, one connection per realm path
#[derive(Clone, Default)]
pub struct SqliteCredentials {
    conns: Arc<Mutex<HashMap<PathBuf, Arc<Mutex<Connection>>>>>,
}

impl SqliteCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    fn connection(&self, path: &Path) -> Result<Arc<Mutex<Connection>>> {
        let mut conns = self.conns.lock();
        if let Some(conn) = conns.get(path) {
            return Ok(conn.clone());
        }

        let conn = if path.as_os_str() == MEMORY_PATH {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::Internal(format!("create {}: {}", parent.display(), e))
                })?;
            }
            let conn = Connection::open(path)?;
            conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
            conn
        };
        init_schema(&conn)?;
        info!("Opened credential database at {:?}", path);

        let conn = Arc::new(Mutex::new(conn));
        conns.insert(path.to_path_buf(), conn.clone());
        Ok(conn)
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS realm_users (
            username TEXT PRIMARY KEY,
            id TEXT NOT NULL UNIQUE,
            record TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        "#,
    )?;
    debug!("Credential schema initialized");
    Ok(())
}

impl CredentialPersistence for SqliteCredentials {
    fn load(&self, path: &Path) -> Result<Vec<UserRecord>> {
        let conn = self.connection(path)?;
        let conn = conn.lock();

        let mut stmt = conn.prepare("SELECT record FROM realm_users ORDER BY username")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(serde_json::from_str(&row?)?);
        }
        debug!("Loaded {} credential records from {:?}", records.len(), path);
        Ok(records)
    }

    fn persist(&self, records: &[UserRecord], path: &Path) -> Result<()> {
        let conn = self.connection(path)?;
        let mut conn = conn.lock();
        let tx = conn.transaction()?;
        for record in records {
            tx.execute(
                "INSERT INTO realm_users (username, id, record, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(username) DO UPDATE SET
                    record = excluded.record,
                    updated_at = excluded.updated_at",
                params![
                    record.username,
                    record.id,
                    serde_json::to_string(record)?,
                    record.created_at,
                    record.updated_at,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn remove(&self, username: &str, path: &Path) -> Result<()> {
        let conn = self.connection(path)?;
        let conn = conn.lock();
        let rows = conn.execute("DELETE FROM realm_users WHERE username = ?1", params![username])?;
        if rows > 0 {
            debug!("Removed credential record {} from {:?}", username, path);
        }
        Ok(())
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Process-local persistence, keyed by realm path. Intended for tests and
/// ephemeral realms.
#[derive(Default)]
pub struct MemoryCredentials {
    realms: Mutex<HashMap<PathBuf, BTreeMap<String, UserRecord>>>,
    failing: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed records at a path, as if a previous process had written them.
    pub fn seed(&self, path: impl AsRef<Path>, records: Vec<UserRecord>) {
        let mut realms = self.realms.lock();
        let realm = realms.entry(path.as_ref().to_path_buf()).or_default();
        for record in records {
            realm.insert(record.username.clone(), record);
        }
    }

    /// Make every subsequent write fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of successful writes (persist or remove calls)
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn stored(&self, path: impl AsRef<Path>, username: &str) -> Option<UserRecord> {
        self.realms
            .lock()
            .get(path.as_ref())
            .and_then(|realm| realm.get(username).cloned())
    }

    fn check_writable(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Internal("credential store is not writable".to_string()));
        }
        Ok(())
    }
}

impl CredentialPersistence for MemoryCredentials {
    fn load(&self, path: &Path) -> Result<Vec<UserRecord>> {
        Ok(self
            .realms
            .lock()
            .get(path)
            .map(|realm| realm.values().cloned().collect())
            .unwrap_or_default())
    }

    fn persist(&self, records: &[UserRecord], path: &Path) -> Result<()> {
        self.check_writable()?;
        let mut realms = self.realms.lock();
        let realm = realms.entry(path.to_path_buf()).or_default();
        for record in records {
            realm.insert(record.username.clone(), record.clone());
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove(&self, username: &str, path: &Path) -> Result<()> {
        self.check_writable()?;
        if let Some(realm) = self.realms.lock().get_mut(path) {
            realm.remove(username);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
