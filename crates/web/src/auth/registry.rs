//! Realm registry: realm name to shared authenticator.
//!
//! Every backend configured against the same realm receives the same
//! `Arc<RealmAuthenticator>`. The first registration of a realm wins; a later
//! backend must name the same credential path or configuration fails.

use parking_lot::Mutex;
use realmgate_common::{
    Argon2Comparator, CredentialComparator, CredentialPersistence, Error, Result,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::local::RealmAuthenticator;
use super::policy::{MinLengthPolicy, PasswordPolicy};

pub struct RealmRegistry {
    realms: Mutex<HashMap<String, Arc<RealmAuthenticator>>>,
    persistence: Arc<dyn CredentialPersistence>,
    comparator: Arc<dyn CredentialComparator>,
    policy: Arc<dyn PasswordPolicy>,
}

impl RealmRegistry {
    pub fn new(persistence: Arc<dyn CredentialPersistence>) -> Self {
        Self {
            realms: Mutex::new(HashMap::new()),
            persistence,
            comparator: Arc::new(Argon2Comparator),
            policy: Arc::new(MinLengthPolicy::default()),
        }
    }

    pub fn with_comparator(mut self, comparator: Arc<dyn CredentialComparator>) -> Self {
        self.comparator = comparator;
        self
    }

    pub fn with_policy(mut self, policy: Arc<dyn PasswordPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Register an authenticator under `realm`. If the realm is already
    /// registered the existing entry is kept.
    pub fn register(&self, realm: &str, authenticator: Arc<RealmAuthenticator>) -> Result<()> {
        let mut realms = self.realms.lock();
        if realms.contains_key(realm) {
            debug!(realm = %realm, "realm already registered, keeping first");
            return Ok(());
        }
        realms.insert(realm.to_string(), authenticator);
        Ok(())
    }

    pub fn lookup(&self, realm: &str) -> Option<Arc<RealmAuthenticator>> {
        self.realms.lock().get(realm).cloned()
    }

    /// Return the realm's authenticator, creating an unconfigured one bound
    /// to `path` if the realm is new.
    pub fn resolve_or_create(&self, realm: &str, path: &str) -> Result<Arc<RealmAuthenticator>> {
        let mut realms = self.realms.lock();
        if let Some(existing) = realms.get(realm) {
            if existing.path() != path {
                return Err(Error::PathMismatch {
                    realm: realm.to_string(),
                    path: path.to_string(),
                    existing: existing.path().to_string(),
                });
            }
            return Ok(existing.clone());
        }

        let authenticator = Arc::new(RealmAuthenticator::new(
            realm,
            path,
            self.persistence.clone(),
            self.comparator.clone(),
            self.policy.clone(),
        ));
        realms.insert(realm.to_string(), authenticator.clone());
        info!(realm = %realm, path = %path, "registered realm");
        Ok(authenticator)
    }

    /// Registered realm names, sorted
    pub fn realms(&self) -> Vec<String> {
        let mut names: Vec<String> = self.realms.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.realms.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use realmgate_common::MemoryCredentials;
    use std::thread;

    fn registry() -> RealmRegistry {
        RealmRegistry::new(Arc::new(MemoryCredentials::new()))
    }

    #[test]
    fn test_resolve_shares_instance() {
        let registry = registry();
        let a = registry.resolve_or_create("default", "/data/users.db").unwrap();
        let b = registry.resolve_or_create("default", "/data/users.db").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_resolve_rejects_path_mismatch() {
        let registry = registry();
        registry.resolve_or_create("default", "/a.db").unwrap();
        let err = registry.resolve_or_create("default", "/b.db").unwrap_err();
        match err {
            Error::PathMismatch { realm, path, existing } => {
                assert_eq!(realm, "default");
                assert_eq!(path, "/b.db");
                assert_eq!(existing, "/a.db");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(registry.lookup("default").unwrap().path(), "/a.db");
    }

    #[test]
    fn test_register_first_writer_wins() {
        let registry = registry();
        let first = registry.resolve_or_create("ops", "/ops.db").unwrap();
        let second = Arc::new(RealmAuthenticator::new(
            "ops",
            "/other.db",
            Arc::new(MemoryCredentials::new()),
            Arc::new(Argon2Comparator),
            Arc::new(MinLengthPolicy::default()),
        ));
        registry.register("ops", second).unwrap();
        assert!(Arc::ptr_eq(&registry.lookup("ops").unwrap(), &first));
        assert!(registry.lookup("missing").is_none());
    }

    #[test]
    fn test_concurrent_resolve_yields_one_instance() {
        let registry = Arc::new(registry());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                thread::spawn(move || registry.resolve_or_create("shared", "/shared.db").unwrap())
            })
            .collect();
        let resolved: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(resolved.iter().all(|a| Arc::ptr_eq(a, &resolved[0])));
        assert_eq!(registry.realms(), vec!["shared".to_string()]);
    }
}
