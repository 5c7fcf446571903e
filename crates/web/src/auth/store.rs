//! In-memory credential record store for one realm.
//!
//! The user map sits behind an `RwLock`; each record has its own `Mutex`.
//! Writers to different users proceed independently, writers to the same
//! user serialize on that user's lock. Every mutation is applied to a copy,
//! persisted, and only then swapped in, so a failed write leaves the record
//! unchanged. The map lock is never held across a persistence call.

use parking_lot::{Mutex, RwLock};
use realmgate_common::{CredentialPersistence, Error, Result, UserRecord};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// `None` marks a record removed while another writer held a reference, or
/// an insert whose write failed.
type Slot = Arc<Mutex<Option<UserRecord>>>;

#[derive(Default)]
struct Users {
    records: BTreeMap<String, Slot>,
    /// Lowercased email -> owning username
    emails: HashMap<String, String>,
}

impl Users {
    fn claim_email(&mut self, record: &UserRecord) {
        if let Some(email) = &record.email {
            self.emails
                .insert(email.to_ascii_lowercase(), record.username.clone());
        }
    }

    fn release(&mut self, username: &str, slot: &Slot, email: Option<&str>) {
        if self
            .records
            .get(username)
            .map(|current| Arc::ptr_eq(current, slot))
            .unwrap_or(false)
        {
            self.records.remove(username);
        }
        if let Some(email) = email.map(str::to_ascii_lowercase) {
            if self.emails.get(&email).map(String::as_str) == Some(username) {
                self.emails.remove(&email);
            }
        }
    }
}

pub struct CredentialStore {
    users: RwLock<Users>,
    persistence: Arc<dyn CredentialPersistence>,
    path: PathBuf,
}

impl CredentialStore {
    /// Load the records persisted at `path`.
    pub fn open(persistence: Arc<dyn CredentialPersistence>, path: PathBuf) -> Result<Self> {
        let records = persistence.load(&path)?;
        debug!(path = %path.display(), users = records.len(), "loaded credential store");
        let mut users = Users::default();
        for record in records {
            users.claim_email(&record);
            users
                .records
                .insert(record.username.clone(), Arc::new(Mutex::new(Some(record))));
        }
        Ok(Self {
            users: RwLock::new(users),
            persistence,
            path,
        })
    }

    pub fn len(&self) -> usize {
        self.users.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, username: &str) -> Option<Slot> {
        self.users.read().records.get(username).cloned()
    }

    /// Consistent copy of one record
    pub fn snapshot(&self, username: &str) -> Option<UserRecord> {
        let slot = self.slot(username)?;
        let guard = slot.lock();
        guard.clone()
    }

    /// Copies of every record, ordered by username
    pub fn snapshots(&self) -> Vec<UserRecord> {
        let slots: Vec<Slot> = self.users.read().records.values().cloned().collect();
        slots.iter().filter_map(|slot| slot.lock().clone()).collect()
    }

    /// First record matching `pred`, in username order
    pub fn find<F>(&self, pred: F) -> Option<UserRecord>
    where
        F: Fn(&UserRecord) -> bool,
    {
        let slots: Vec<Slot> = self.users.read().records.values().cloned().collect();
        slots.iter().find_map(|slot| {
            let guard = slot.lock();
            let found = guard.as_ref().filter(|r| pred(r)).cloned();
            found
        })
    }

    /// Apply `f` to a user's record under that record's lock.
    ///
    /// `f` works on a copy; the copy is persisted and swapped in only if both
    /// `f` and the write succeed.
    pub fn update<T, F>(&self, username: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut UserRecord) -> Result<T>,
    {
        let slot = self
            .slot(username)
            .ok_or_else(|| Error::not_found("user", username))?;
        let mut guard = slot.lock();
        let current = guard
            .as_ref()
            .ok_or_else(|| Error::not_found("user", username))?;

        let mut working = current.clone();
        let out = f(&mut working)?;
        working.touch();
        self.persistence
            .persist(std::slice::from_ref(&working), &self.path)?;
        *guard = Some(working);
        Ok(out)
    }

    /// Add a new user. Usernames and emails are unique within the realm;
    /// emails compare ignoring ASCII case.
    ///
    /// The slot is reserved under the map lock and filled once the write
    /// succeeds. Readers of a reserved slot wait on its lock.
    pub fn insert(&self, record: UserRecord) -> Result<()> {
        let slot: Slot = Arc::new(Mutex::new(None));
        let mut guard = slot.lock();
        {
            let mut users = self.users.write();
            if users.records.contains_key(&record.username) {
                return Err(Error::already_exists("user", record.username));
            }
            if let Some(email) = &record.email {
                if users.emails.contains_key(&email.to_ascii_lowercase()) {
                    return Err(Error::already_exists("email", email.clone()));
                }
            }
            users.claim_email(&record);
            users.records.insert(record.username.clone(), slot.clone());
        }

        if let Err(e) = self
            .persistence
            .persist(std::slice::from_ref(&record), &self.path)
        {
            drop(guard);
            self.users
                .write()
                .release(&record.username, &slot, record.email.as_deref());
            return Err(e);
        }
        *guard = Some(record);
        Ok(())
    }

    /// Remove a user and everything attached to it.
    pub fn remove(&self, username: &str) -> Result<UserRecord> {
        let slot = self
            .slot(username)
            .ok_or_else(|| Error::not_found("user", username))?;
        let mut guard = slot.lock();
        if guard.is_none() {
            return Err(Error::not_found("user", username));
        }

        self.persistence.remove(username, &self.path)?;
        let removed = guard
            .take()
            .ok_or_else(|| Error::not_found("user", username))?;
        drop(guard);
        self.users
            .write()
            .release(username, &slot, removed.email.as_deref());
        Ok(removed)
    }
}
