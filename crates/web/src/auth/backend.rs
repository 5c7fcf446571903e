//! Backends: named bindings from a configuration block to a realm.
//!
//! A `Backend` is the only route to a realm's authenticator. Several
//! backends may point at the same realm and then share one authenticator.

use realmgate_common::{Error, KeyUsage, Operator, Request, Response, Result, UserSummary};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn, Span};

use super::local::RealmAuthenticator;
use super::registry::RealmRegistry;

/// One `[[backends]]` block of the daemon configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub name: String,
    pub method: String,
    pub realm: String,
    pub path: String,
}

impl BackendConfig {
    pub fn new(
        name: impl Into<String>,
        method: impl Into<String>,
        realm: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            method: method.into(),
            realm: realm.into(),
            path: path.into(),
        }
    }

    fn check(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::NameEmpty);
        }
        if self.method.is_empty() {
            return Err(Error::MethodEmpty);
        }
        if self.realm.is_empty() {
            return Err(Error::RealmEmpty);
        }
        if self.path.is_empty() {
            return Err(Error::PathEmpty);
        }
        Ok(())
    }
}

pub struct Backend {
    config: BackendConfig,
    authenticator: Option<Arc<RealmAuthenticator>>,
    span: Span,
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("config", &self.config)
            .field("resolved", &self.authenticator.is_some())
            .finish()
    }
}

impl Backend {
    pub fn new(config: BackendConfig) -> Self {
        let span = tracing::info_span!(
            "backend",
            name = %config.name,
            method = %config.method,
            realm = %config.realm,
        );
        Self {
            config,
            authenticator: None,
            span,
        }
    }

    /// Validate the configuration and attach the realm's authenticator.
    ///
    /// On error the backend is left unresolved and refuses requests.
    pub fn configure(&mut self, registry: &RealmRegistry) -> Result<()> {
        let _enter = self.span.clone().entered();
        self.authenticator = None;

        if let Err(e) = self.config.check() {
            error!(error = %e, "invalid backend configuration");
            return Err(e);
        }

        let resolved = registry
            .resolve_or_create(&self.config.realm, &self.config.path)
            .and_then(|auth| {
                auth.configure(&self.config.path)?;
                Ok(auth)
            });
        match resolved {
            Ok(auth) => {
                info!(path = %self.config.path, "backend configured");
                self.authenticator = Some(auth);
                Ok(())
            }
            Err(e) => {
                error!(path = %self.config.path, error = %e, "backend configuration failed");
                Err(e)
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn method(&self) -> &str {
        &self.config.method
    }

    pub fn realm(&self) -> &str {
        &self.config.realm
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Line-oriented rendering of the configuration, for diagnostics.
    pub fn config_text(&self) -> String {
        format!(
            "name {}\nmethod {}\nrealm {}\npath {}",
            self.config.name, self.config.method, self.config.realm, self.config.path
        )
    }

    pub fn authenticator(&self) -> Option<&Arc<RealmAuthenticator>> {
        self.authenticator.as_ref()
    }

    fn resolved(&self) -> Result<&RealmAuthenticator> {
        self.authenticator
            .as_deref()
            .ok_or_else(|| Error::BackendUnavailable {
                realm: self.config.realm.clone(),
            })
    }

    /// Dispatch one operation to the realm's authenticator.
    pub fn request(&self, op: Operator, req: &Request) -> Result<Response> {
        let _enter = self.span.enter();
        let result = self.dispatch(op, req);
        if let Err(e) = &result {
            if e.is_not_found() {
                warn!(op = %op, error = %e, "operation target not found");
            } else {
                error!(op = %op, error = %e, "operation failed");
            }
        }
        result
    }

    fn dispatch(&self, op: Operator, req: &Request) -> Result<Response> {
        if let Operator::Unknown(_) = op {
            return Err(Error::OperatorNotSupported { op });
        }
        let auth = self.resolved()?;
        match op {
            Operator::Authenticate => auth.authenticate_user(req).map(Response::Authenticated),
            Operator::IdentifyUser => auth.identify_user(req),
            Operator::ChangePassword => auth.change_password(req),
            Operator::AddKeySsh => auth.add_public_key(req, KeyUsage::Ssh),
            Operator::AddKeyGpg => auth.add_public_key(req, KeyUsage::Gpg),
            Operator::DeletePublicKey => auth.delete_public_key(req),
            Operator::AddMfaToken => auth.add_mfa_token(req),
            Operator::DeleteMfaToken => auth.delete_mfa_token(req),
            Operator::AddApiKey => auth.add_api_key(req),
            Operator::DeleteApiKey => auth.delete_api_key(req),
            Operator::GetPublicKeys => auth.get_public_keys(req),
            Operator::GetApiKeys => auth.get_api_keys(req),
            Operator::GetMfaTokens => auth.get_mfa_tokens(req),
            Operator::AddUser => auth.add_user(req),
            Operator::GetUsers => auth.get_users(req),
            Operator::GetUser => auth.get_user(req),
            Operator::DeleteUser => auth.delete_user(req),
            Operator::LookupApiKey => auth.lookup_api_key(req),
            Operator::Unknown(_) => Err(Error::OperatorNotSupported { op }),
        }
    }

    /// Check a username/password pair. Failures surface as a generic
    /// `AuthFailed`; the underlying cause stays available through `source()`.
    pub fn authenticate(&self, req: &Request) -> Result<UserSummary> {
        let _enter = self.span.enter();
        let outcome = self
            .resolved()
            .and_then(|auth| auth.authenticate_user(req));
        outcome.map_err(|e| {
            warn!(user = req.username().unwrap_or(""), cause = %e, "authentication failed");
            Error::AuthFailed {
                backend: self.config.name.clone(),
                source: Box::new(e),
            }
        })
    }

    /// Post-configuration check. Moves the shared authenticator to serving.
    pub fn validate(&self) -> Result<()> {
        let _enter = self.span.enter();
        let auth = self.resolved()?;
        auth.mark_serving()?;
        info!(path = %self.config.path, state = ?auth.state(), "backend validated");
        Ok(())
    }
}
