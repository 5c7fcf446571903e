//! Local realm authenticator.
//!
//! A `RealmAuthenticator` owns the credential store of one realm and is
//! shared by every backend configured against that realm. It moves through
//! `Unconfigured -> Configured -> Serving`; operations are only accepted
//! once the store has been loaded.

use once_cell::sync::OnceCell;
use realmgate_common::crypto::{
    constant_time_eq, generate_api_key, hash_api_key, parse_gpg_public_key, parse_ssh_public_key,
};
use realmgate_common::{
    ApiKey, CredentialComparator, CredentialPersistence, Error, KeyUsage, MfaToken, MfaTokenKind,
    Operator, PublicKey, Request, Response, Result, UserRecord, UserSummary,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use super::mfa;
use super::policy::PasswordPolicy;
use super::store::CredentialStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthenticatorState {
    Unconfigured,
    Configured,
    Serving,
}

pub struct RealmAuthenticator {
    realm: String,
    path: String,
    persistence: Arc<dyn CredentialPersistence>,
    comparator: Arc<dyn CredentialComparator>,
    policy: Arc<dyn PasswordPolicy>,
    store: OnceCell<CredentialStore>,
    serving: AtomicBool,
}

impl std::fmt::Debug for RealmAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealmAuthenticator")
            .field("realm", &self.realm)
            .field("path", &self.path)
            .field("state", &self.state())
            .finish()
    }
}

fn require<'a>(op: Operator, value: Option<&'a str>, field: &'static str) -> Result<&'a str> {
    value
        .filter(|v| !v.is_empty())
        .ok_or(Error::MissingField { op, field })
}

fn validate_username(username: &str) -> Result<()> {
    let valid_chars = username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '@'));
    let starts_ok = username
        .chars()
        .next()
        .map(|c| c.is_ascii_alphanumeric())
        .unwrap_or(false);
    if username.len() > 64 || !valid_chars || !starts_ok {
        return Err(Error::InvalidInput(format!("invalid username: {:?}", username)));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<()> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(Error::InvalidInput(format!("invalid email address: {:?}", email))),
    }
}

impl RealmAuthenticator {
    pub fn new(
        realm: impl Into<String>,
        path: impl Into<String>,
        persistence: Arc<dyn CredentialPersistence>,
        comparator: Arc<dyn CredentialComparator>,
        policy: Arc<dyn PasswordPolicy>,
    ) -> Self {
        Self {
            realm: realm.into(),
            path: path.into(),
            persistence,
            comparator,
            policy,
            store: OnceCell::new(),
            serving: AtomicBool::new(false),
        }
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// Backing location of the realm's persisted credentials
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn state(&self) -> AuthenticatorState {
        match (self.store.get(), self.serving.load(Ordering::Acquire)) {
            (None, _) => AuthenticatorState::Unconfigured,
            (Some(_), false) => AuthenticatorState::Configured,
            (Some(_), true) => AuthenticatorState::Serving,
        }
    }

    /// Bind the store to `path` and load persisted records.
    ///
    /// Loading happens once; later calls with the same path are no-ops.
    pub fn configure(&self, path: &str) -> Result<()> {
        if path != self.path {
            return Err(Error::PathMismatch {
                realm: self.realm.clone(),
                path: path.to_string(),
                existing: self.path.clone(),
            });
        }
        let store = self.store.get_or_try_init(|| {
            CredentialStore::open(self.persistence.clone(), PathBuf::from(&self.path))
        })?;
        info!(
            realm = %self.realm,
            path = %self.path,
            users = store.len(),
            "configured realm authenticator"
        );
        Ok(())
    }

    pub fn mark_serving(&self) -> Result<()> {
        self.store()?;
        self.serving.store(true, Ordering::Release);
        Ok(())
    }

    fn store(&self) -> Result<&CredentialStore> {
        self.store.get().ok_or_else(|| Error::BackendUnavailable {
            realm: self.realm.clone(),
        })
    }

    // ========================================================================
    // Authentication
    // ========================================================================

    /// Check a username/password pair. Unknown users and wrong passwords are
    /// indistinguishable to the caller.
    pub fn authenticate_user(&self, req: &Request) -> Result<UserSummary> {
        let store = self.store()?;
        let op = Operator::Authenticate;
        let username = require(op, req.username(), "username")?;
        let password = require(op, req.user.password.as_deref(), "password")?;

        let record = store.snapshot(username);
        let stored = record.as_ref().and_then(|r| r.password_hash.as_deref());
        match record.as_ref() {
            Some(r) if self.comparator.verify(stored, password) => Ok(r.summary()),
            Some(_) => Err(Error::InvalidCredentials),
            None => {
                self.comparator.verify(None, password);
                Err(Error::InvalidCredentials)
            }
        }
    }

    /// Resolve a user by username, or by email when no username is given.
    pub fn identify_user(&self, req: &Request) -> Result<Response> {
        let store = self.store()?;
        if let Some(username) = req.username() {
            return store
                .snapshot(username)
                .map(|r| Response::User(r.summary()))
                .ok_or_else(|| Error::not_found("user", username));
        }
        let email = require(Operator::IdentifyUser, req.user.email.as_deref(), "username")?;
        store
            .find(|r| {
                r.email
                    .as_deref()
                    .map(|e| e.eq_ignore_ascii_case(email))
                    .unwrap_or(false)
            })
            .map(|r| Response::User(r.summary()))
            .ok_or_else(|| Error::not_found("user", email))
    }

    pub fn change_password(&self, req: &Request) -> Result<Response> {
        let store = self.store()?;
        let op = Operator::ChangePassword;
        let username = require(op, req.username(), "username")?;
        let new_password = require(op, req.user.password.as_deref(), "password")?;
        self.policy.check(new_password)?;
        let new_hash = self.comparator.hash(new_password)?;

        store.update(username, |record| {
            if let Some(current) = record.password_hash.as_deref() {
                let old = require(op, req.user.old_password.as_deref(), "old_password")?;
                if !self.comparator.verify(Some(current), old) {
                    return Err(Error::InvalidCredentials);
                }
            }
            record.password_hash = Some(new_hash);
            record.password_updated_at = Some(chrono::Utc::now().timestamp());
            Ok(())
        })?;
        debug!(realm = %self.realm, user = %username, "password changed");
        Ok(Response::Done)
    }

    // ========================================================================
    // Public keys
    // ========================================================================

    pub fn add_public_key(&self, req: &Request, usage: KeyUsage) -> Result<Response> {
        let store = self.store()?;
        let op = match usage {
            KeyUsage::Ssh => Operator::AddKeySsh,
            KeyUsage::Gpg => Operator::AddKeyGpg,
        };
        let username = require(op, req.username(), "username")?;
        let key = req.key.as_ref().ok_or(Error::MissingField { op, field: "key" })?;
        let payload = require(op, key.payload.as_deref(), "key payload")?;
        let parsed = match usage {
            KeyUsage::Ssh => parse_ssh_public_key(payload)?,
            KeyUsage::Gpg => parse_gpg_public_key(payload)?,
        };

        store.update(username, |record| {
            if record.public_keys.iter().any(|k| k.id == parsed.fingerprint) {
                return Err(Error::already_exists("public key", parsed.fingerprint.clone()));
            }
            record.public_keys.push(PublicKey {
                id: parsed.fingerprint.clone(),
                usage,
                key_type: parsed.key_type.clone(),
                payload: parsed.payload.clone(),
                comment: key.comment.clone().or_else(|| parsed.comment.clone()),
                created_at: chrono::Utc::now().timestamp(),
            });
            Ok(())
        })?;
        debug!(realm = %self.realm, user = %username, key_id = %parsed.fingerprint, usage = %usage, "public key added");
        Ok(Response::Done)
    }

    pub fn delete_public_key(&self, req: &Request) -> Result<Response> {
        let store = self.store()?;
        let op = Operator::DeletePublicKey;
        let username = require(op, req.username(), "username")?;
        let key_id = require(op, req.key.as_ref().and_then(|k| k.id.as_deref()), "key id")?;

        store.update(username, |record| {
            let idx = record
                .public_keys
                .iter()
                .position(|k| k.id == key_id)
                .ok_or_else(|| Error::not_found("public key", key_id))?;
            record.public_keys.remove(idx);
            Ok(())
        })?;
        Ok(Response::Done)
    }

    pub fn get_public_keys(&self, req: &Request) -> Result<Response> {
        let store = self.store()?;
        let username = require(Operator::GetPublicKeys, req.username(), "username")?;
        let usage = req.key.as_ref().and_then(|k| k.usage);
        let record = store
            .snapshot(username)
            .ok_or_else(|| Error::not_found("user", username))?;
        let keys = record
            .public_keys
            .into_iter()
            .filter(|k| usage.map(|u| u == k.usage).unwrap_or(true))
            .collect();
        Ok(Response::PublicKeys(keys))
    }

    // ========================================================================
    // MFA tokens
    // ========================================================================

    /// Register a TOTP token. The request must carry a passcode generated
    /// from the secret, proving the client enrolled it.
    pub fn add_mfa_token(&self, req: &Request) -> Result<Response> {
        let store = self.store()?;
        let op = Operator::AddMfaToken;
        let username = require(op, req.username(), "username")?;
        let token = req
            .mfa_token
            .as_ref()
            .ok_or(Error::MissingField { op, field: "mfa token" })?;
        let secret = require(op, token.secret.as_deref(), "mfa secret")?;
        let passcode = require(op, token.passcode.as_deref(), "mfa passcode")?;

        let (algorithm, algorithm_name) = mfa::parse_algorithm(token.algorithm.as_deref())?;
        let period = token.period.unwrap_or(mfa::DEFAULT_PERIOD);
        let digits = token.digits.unwrap_or(mfa::DEFAULT_DIGITS);
        let totp = mfa::totp_for_secret_b32(algorithm, digits, period, secret, username)?;
        if !mfa::verify_totp_code(&totp, passcode) {
            return Err(Error::InvalidInput("mfa passcode does not match secret".to_string()));
        }
        let secret = secret.trim().to_uppercase();

        let id = store.update(username, |record| {
            if record.mfa_tokens.iter().any(|t| constant_time_eq(&t.secret, &secret)) {
                return Err(Error::already_exists("mfa token", username));
            }
            let id = uuid::Uuid::new_v4().to_string();
            record.mfa_tokens.push(MfaToken {
                id: id.clone(),
                kind: MfaTokenKind::Totp,
                algorithm: algorithm_name.to_string(),
                period,
                digits,
                secret: secret.clone(),
                comment: token.comment.clone(),
                created_at: chrono::Utc::now().timestamp(),
            });
            Ok(id)
        })?;
        debug!(realm = %self.realm, user = %username, token_id = %id, "mfa token added");
        Ok(Response::Done)
    }

    pub fn delete_mfa_token(&self, req: &Request) -> Result<Response> {
        let store = self.store()?;
        let op = Operator::DeleteMfaToken;
        let username = require(op, req.username(), "username")?;
        let token_id = require(
            op,
            req.mfa_token.as_ref().and_then(|t| t.id.as_deref()),
            "mfa token id",
        )?;

        store.update(username, |record| {
            let idx = record
                .mfa_tokens
                .iter()
                .position(|t| t.id == token_id)
                .ok_or_else(|| Error::not_found("mfa token", token_id))?;
            record.mfa_tokens.remove(idx);
            Ok(())
        })?;
        Ok(Response::Done)
    }

    pub fn get_mfa_tokens(&self, req: &Request) -> Result<Response> {
        let store = self.store()?;
        let username = require(Operator::GetMfaTokens, req.username(), "username")?;
        let record = store
            .snapshot(username)
            .ok_or_else(|| Error::not_found("user", username))?;
        Ok(Response::MfaTokens(
            record.mfa_tokens.iter().map(MfaToken::redacted).collect(),
        ))
    }

    // ========================================================================
    // API keys
    // ========================================================================

    /// Issue a new API key. Only its hash is stored; the secret is returned
    /// once in the response.
    pub fn add_api_key(&self, req: &Request) -> Result<Response> {
        let store = self.store()?;
        let username = require(Operator::AddApiKey, req.username(), "username")?;
        let (secret, prefix) = generate_api_key();
        let key = ApiKey {
            id: uuid::Uuid::new_v4().to_string(),
            prefix,
            hash: hash_api_key(&secret),
            comment: req.api_key.as_ref().and_then(|k| k.comment.clone()),
            created_at: chrono::Utc::now().timestamp(),
        };

        store.update(username, |record| {
            record.api_keys.push(key.clone());
            Ok(())
        })?;
        debug!(realm = %self.realm, user = %username, key_id = %key.id, "api key added");
        Ok(Response::ApiKeyIssued {
            key: key.redacted(),
            secret,
        })
    }

    pub fn delete_api_key(&self, req: &Request) -> Result<Response> {
        let store = self.store()?;
        let op = Operator::DeleteApiKey;
        let username = require(op, req.username(), "username")?;
        let key_id = require(
            op,
            req.api_key.as_ref().and_then(|k| k.id.as_deref()),
            "api key id",
        )?;

        store.update(username, |record| {
            let idx = record
                .api_keys
                .iter()
                .position(|k| k.id == key_id)
                .ok_or_else(|| Error::not_found("api key", key_id))?;
            record.api_keys.remove(idx);
            Ok(())
        })?;
        Ok(Response::Done)
    }

    pub fn get_api_keys(&self, req: &Request) -> Result<Response> {
        let store = self.store()?;
        let username = require(Operator::GetApiKeys, req.username(), "username")?;
        let record = store
            .snapshot(username)
            .ok_or_else(|| Error::not_found("user", username))?;
        Ok(Response::ApiKeys(
            record.api_keys.iter().map(ApiKey::redacted).collect(),
        ))
    }

    /// Find the owner of a presented API key.
    pub fn lookup_api_key(&self, req: &Request) -> Result<Response> {
        let store = self.store()?;
        let presented = require(
            Operator::LookupApiKey,
            req.api_key.as_ref().and_then(|k| k.key.as_deref()),
            "api key",
        )?;
        let hash = hash_api_key(presented);
        store
            .find(|r| r.api_keys.iter().any(|k| constant_time_eq(&k.hash, &hash)))
            .map(|r| Response::User(r.summary()))
            .ok_or_else(|| Error::not_found("api key", presented.chars().take(10).collect::<String>()))
    }

    // ========================================================================
    // Users
    // ========================================================================

    pub fn add_user(&self, req: &Request) -> Result<Response> {
        let store = self.store()?;
        let username = require(Operator::AddUser, req.username(), "username")?;
        validate_username(username)?;
        let email = req.user.email.as_deref().filter(|e| !e.is_empty());
        if let Some(email) = email {
            validate_email(email)?;
        }

        let mut record = UserRecord::new(
            username,
            email.map(str::to_string),
            req.user.roles.clone(),
        );
        if let Some(password) = req.user.password.as_deref().filter(|p| !p.is_empty()) {
            self.policy.check(password)?;
            record.password_hash = Some(self.comparator.hash(password)?);
            record.password_updated_at = Some(record.created_at);
        }
        let summary = record.summary();
        store.insert(record)?;
        info!(realm = %self.realm, user = %username, "user added");
        Ok(Response::User(summary))
    }

    /// All users, ordered by username
    pub fn get_users(&self, _req: &Request) -> Result<Response> {
        let store = self.store()?;
        Ok(Response::Users(
            store.snapshots().iter().map(UserRecord::summary).collect(),
        ))
    }

    pub fn get_user(&self, req: &Request) -> Result<Response> {
        let store = self.store()?;
        let username = require(Operator::GetUser, req.username(), "username")?;
        store
            .snapshot(username)
            .map(|r| Response::User(r.summary()))
            .ok_or_else(|| Error::not_found("user", username))
    }

    /// Remove a user together with every credential attached to it.
    pub fn delete_user(&self, req: &Request) -> Result<Response> {
        let store = self.store()?;
        let username = require(Operator::DeleteUser, req.username(), "username")?;
        let removed = store.remove(username)?;
        info!(
            realm = %self.realm,
            user = %username,
            public_keys = removed.public_keys.len(),
            mfa_tokens = removed.mfa_tokens.len(),
            api_keys = removed.api_keys.len(),
            "user deleted"
        );
        Ok(Response::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::mfa::tests::{current_code, SECRET};
    use crate::auth::policy::MinLengthPolicy;
    use crate::auth::testutil::sample_ssh_key;
    use realmgate_common::{Argon2Comparator, MemoryCredentials, MfaTokenRequest};

    fn authenticator(persistence: Arc<MemoryCredentials>) -> RealmAuthenticator {
        RealmAuthenticator::new(
            "default",
            "/data/users.db",
            persistence,
            Arc::new(Argon2Comparator),
            Arc::new(MinLengthPolicy::default()),
        )
    }

    fn configured() -> RealmAuthenticator {
        let auth = authenticator(Arc::new(MemoryCredentials::new()));
        auth.configure("/data/users.db").unwrap();
        auth.add_user(&Request::for_user("alice").with_email("alice@example.com"))
            .unwrap();
        auth
    }

    fn public_keys(auth: &RealmAuthenticator, username: &str) -> Vec<PublicKey> {
        match auth.get_public_keys(&Request::for_user(username)).unwrap() {
            Response::PublicKeys(keys) => keys,
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_state_machine() {
        let auth = authenticator(Arc::new(MemoryCredentials::new()));
        assert_eq!(auth.state(), AuthenticatorState::Unconfigured);
        let err = auth.get_users(&Request::default()).unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable { .. }));
        assert!(auth.mark_serving().is_err());

        auth.configure("/data/users.db").unwrap();
        assert_eq!(auth.state(), AuthenticatorState::Configured);
        auth.mark_serving().unwrap();
        assert_eq!(auth.state(), AuthenticatorState::Serving);
    }

    #[test]
    fn test_configure_loads_persisted_records() {
        let persistence = Arc::new(MemoryCredentials::new());
        persistence.seed("/data/users.db", vec![UserRecord::new("bob", None, vec![])]);
        let auth = authenticator(persistence);
        auth.configure("/data/users.db").unwrap();
        assert!(auth.get_user(&Request::for_user("bob")).is_ok());

        // reconfiguring does not reload or duplicate
        auth.configure("/data/users.db").unwrap();
        assert!(matches!(
            auth.configure("/other.db"),
            Err(Error::PathMismatch { .. })
        ));
    }

    #[test]
    fn test_authenticate_and_change_password() {
        let auth = configured();
        auth.add_user(&Request::for_user("carol").with_password("initial-pass"))
            .unwrap();

        let summary = auth
            .authenticate_user(&Request::for_user("carol").with_password("initial-pass"))
            .unwrap();
        assert_eq!(summary.username, "carol");

        let wrong = auth.authenticate_user(&Request::for_user("carol").with_password("nope-nope"));
        let unknown = auth.authenticate_user(&Request::for_user("zed").with_password("initial-pass"));
        assert!(matches!(wrong, Err(Error::InvalidCredentials)));
        assert!(matches!(unknown, Err(Error::InvalidCredentials)));

        // old password required and verified
        let err = auth
            .change_password(&Request::for_user("carol").with_password("brand-new-pass"))
            .unwrap_err();
        assert!(matches!(err, Error::MissingField { field: "old_password", .. }));
        let err = auth
            .change_password(
                &Request::for_user("carol")
                    .with_password("brand-new-pass")
                    .with_old_password("guess-guess"),
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials));

        // policy rejects weak passwords before anything changes
        let err = auth
            .change_password(
                &Request::for_user("carol")
                    .with_password("short")
                    .with_old_password("initial-pass"),
            )
            .unwrap_err();
        assert!(matches!(err, Error::PolicyViolation(_)));

        auth.change_password(
            &Request::for_user("carol")
                .with_password("brand-new-pass")
                .with_old_password("initial-pass"),
        )
        .unwrap();
        assert!(auth
            .authenticate_user(&Request::for_user("carol").with_password("brand-new-pass"))
            .is_ok());
    }

    #[test]
    fn test_identify_user_by_email() {
        let auth = configured();
        let req = Request {
            user: realmgate_common::UserRequest {
                email: Some("ALICE@example.com".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        match auth.identify_user(&req).unwrap() {
            Response::User(u) => assert_eq!(u.username, "alice"),
            other => panic!("unexpected response: {:?}", other),
        }
        assert!(auth
            .identify_user(&Request::for_user("nobody"))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_duplicate_ssh_key_rejected() {
        let auth = configured();
        let req = Request::for_user("alice").with_key(sample_ssh_key(1));
        auth.add_public_key(&req, KeyUsage::Ssh).unwrap();
        let once = public_keys(&auth, "alice");

        let err = auth.add_public_key(&req, KeyUsage::Ssh).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
        assert_eq!(public_keys(&auth, "alice"), once);

        auth.add_public_key(&Request::for_user("alice").with_key(sample_ssh_key(2)), KeyUsage::Ssh)
            .unwrap();
        assert_eq!(public_keys(&auth, "alice").len(), 2);
    }

    #[test]
    fn test_delete_absent_key_is_not_found() {
        let auth = configured();
        auth.add_public_key(&Request::for_user("alice").with_key(sample_ssh_key(1)), KeyUsage::Ssh)
            .unwrap();
        let before = public_keys(&auth, "alice");

        let err = auth
            .delete_public_key(&Request::for_user("alice").with_key_id("SHA256:missing"))
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(public_keys(&auth, "alice"), before);

        auth.delete_public_key(&Request::for_user("alice").with_key_id(before[0].id.clone()))
            .unwrap();
        assert!(public_keys(&auth, "alice").is_empty());
    }

    #[test]
    fn test_get_public_keys_filters_by_usage() {
        let auth = configured();
        auth.add_public_key(&Request::for_user("alice").with_key(sample_ssh_key(3)), KeyUsage::Ssh)
            .unwrap();
        let req = Request::for_user("alice").with_key_usage(KeyUsage::Gpg);
        match auth.get_public_keys(&req).unwrap() {
            Response::PublicKeys(keys) => assert!(keys.is_empty()),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_mfa_token_zero_period_rejected() {
        let auth = configured();
        let req = Request::for_user("alice").with_mfa_token(MfaTokenRequest {
            secret: Some(SECRET.to_string()),
            period: Some(0),
            passcode: Some("123456".to_string()),
            ..Default::default()
        });
        assert!(matches!(auth.add_mfa_token(&req), Err(Error::InvalidInput(_))));
        match auth.get_mfa_tokens(&Request::for_user("alice")).unwrap() {
            Response::MfaTokens(tokens) => assert!(tokens.is_empty()),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_email_unique_ignoring_case() {
        let auth = configured();
        let err = auth
            .add_user(&Request::for_user("mallory").with_email("Alice@Example.com"))
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
        assert!(auth.get_user(&Request::for_user("mallory")).unwrap_err().is_not_found());
    }

    #[test]
    fn test_mfa_token_lifecycle() {
        let auth = configured();
        let token = MfaTokenRequest {
            secret: Some(SECRET.to_string()),
            passcode: Some("000000".to_string()),
            ..Default::default()
        };
        // wrong passcode (with overwhelming probability)
        let bad = auth.add_mfa_token(&Request::for_user("alice").with_mfa_token(MfaTokenRequest {
            passcode: Some("abcdef".to_string()),
            ..token.clone()
        }));
        assert!(matches!(bad, Err(Error::InvalidInput(_))));

        let good = MfaTokenRequest {
            passcode: Some(current_code(SECRET)),
            ..token
        };
        auth.add_mfa_token(&Request::for_user("alice").with_mfa_token(good.clone()))
            .unwrap();
        let dup = auth.add_mfa_token(&Request::for_user("alice").with_mfa_token(good));
        assert!(matches!(dup, Err(Error::AlreadyExists { .. })));

        let tokens = match auth.get_mfa_tokens(&Request::for_user("alice")).unwrap() {
            Response::MfaTokens(tokens) => tokens,
            other => panic!("unexpected response: {:?}", other),
        };
        assert_eq!(tokens.len(), 1);
        assert!(tokens[0].secret.is_empty());

        auth.delete_mfa_token(&Request::for_user("alice").with_mfa_token_id(tokens[0].id.clone()))
            .unwrap();
        assert!(auth
            .delete_mfa_token(&Request::for_user("alice").with_mfa_token_id(tokens[0].id.clone()))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_api_key_issue_lookup_delete() {
        let auth = configured();
        let (key, secret) = match auth
            .add_api_key(&Request::for_user("alice").with_api_key_comment("ci"))
            .unwrap()
        {
            Response::ApiKeyIssued { key, secret } => (key, secret),
            other => panic!("unexpected response: {:?}", other),
        };
        assert!(key.hash.is_empty());
        assert_eq!(key.comment.as_deref(), Some("ci"));

        match auth.lookup_api_key(&Request::default().with_api_key(secret.clone())).unwrap() {
            Response::User(u) => assert_eq!(u.username, "alice"),
            other => panic!("unexpected response: {:?}", other),
        }
        assert!(auth
            .lookup_api_key(&Request::default().with_api_key("rgk_bogus"))
            .unwrap_err()
            .is_not_found());

        auth.delete_api_key(&Request::for_user("alice").with_api_key_id(key.id.clone()))
            .unwrap();
        assert!(auth
            .lookup_api_key(&Request::default().with_api_key(secret))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_delete_user_cascades() {
        let persistence = Arc::new(MemoryCredentials::new());
        let auth = authenticator(persistence.clone());
        auth.configure("/data/users.db").unwrap();
        auth.add_user(&Request::for_user("dave")).unwrap();
        auth.add_public_key(&Request::for_user("dave").with_key(sample_ssh_key(9)), KeyUsage::Ssh)
            .unwrap();
        auth.add_api_key(&Request::for_user("dave")).unwrap();

        auth.delete_user(&Request::for_user("dave")).unwrap();
        assert!(persistence.stored("/data/users.db", "dave").is_none());
        for result in [
            auth.get_public_keys(&Request::for_user("dave")),
            auth.get_api_keys(&Request::for_user("dave")),
            auth.get_mfa_tokens(&Request::for_user("dave")),
        ] {
            assert!(result.unwrap_err().is_not_found());
        }
        assert!(auth.delete_user(&Request::for_user("dave")).unwrap_err().is_not_found());
    }

    #[test]
    fn test_add_user_validation() {
        let auth = configured();
        assert!(matches!(
            auth.add_user(&Request::for_user("bad name")),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            auth.add_user(&Request::for_user("eve").with_email("not-an-email")),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            auth.add_user(&Request::for_user("alice")),
            Err(Error::AlreadyExists { .. })
        ));
        assert!(matches!(
            auth.add_user(&Request::default()),
            Err(Error::MissingField { .. })
        ));

        auth.add_user(&Request::for_user("bob")).unwrap();
        match auth.get_users(&Request::default()).unwrap() {
            Response::Users(users) => {
                let names: Vec<_> = users.iter().map(|u| u.username.as_str()).collect();
                assert_eq!(names, vec!["alice", "bob"]);
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }
}
