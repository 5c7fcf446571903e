//! Authenticator endpoints: a path bound to a named portal.

use axum::extract::Request as HttpRequest;
use axum::response::Response as HttpResponse;
use realmgate_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, Span};

use super::portal::{Portal, PortalRegistry, RequestContext};

/// One `[[authenticators]]` block of the daemon configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatorConfig {
    pub portal_name: String,
    pub path: String,
}

impl AuthenticatorConfig {
    pub fn new(portal_name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            portal_name: portal_name.into(),
            path: path.into(),
        }
    }
}

pub struct AuthenticatorEndpoint {
    config: AuthenticatorConfig,
    id: Option<String>,
    portal: Option<Arc<dyn Portal>>,
    span: Span,
}

impl AuthenticatorEndpoint {
    pub fn new(config: AuthenticatorConfig) -> Self {
        let span = tracing::info_span!(
            "authenticator",
            portal = %config.portal_name,
            path = %config.path,
            id = tracing::field::Empty,
        );
        Self {
            config,
            id: None,
            portal: None,
            span,
        }
    }

    /// Assign an instance id, resolve the portal and register with it.
    ///
    /// Provisioning again keeps the id, so a reload re-registers the same
    /// endpoint instead of colliding with its own path.
    pub fn provision(&mut self, portals: &PortalRegistry) -> Result<()> {
        let id = self
            .id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        self.span.record("id", id.as_str());
        let _enter = self.span.clone().entered();
        self.id = Some(id.clone());
        self.portal = None;

        let resolved = self.check().and_then(|_| {
            let portal = portals.lookup_portal(&self.config.portal_name)?;
            portals.register_authenticator(&self.config.portal_name, &id, &self.config.path)?;
            Ok(portal)
        });
        match resolved {
            Ok(portal) => {
                info!("provisioned authenticator endpoint");
                self.portal = Some(portal);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "failed to provision authenticator endpoint");
                Err(e)
            }
        }
    }

    fn check(&self) -> Result<()> {
        if self.config.portal_name.is_empty() {
            return Err(Error::PortalNameEmpty);
        }
        if self.config.path.is_empty() {
            return Err(Error::EndpointPathEmpty);
        }
        if !self.config.path.starts_with('/') {
            return Err(Error::InvalidInput(format!(
                "authenticator path must start with '/': {}",
                self.config.path
            )));
        }
        Ok(())
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn path(&self) -> &str {
        &self.config.path
    }

    pub fn portal_name(&self) -> &str {
        &self.config.portal_name
    }

    fn unavailable(&self) -> Error {
        Error::PortalUnavailable {
            portal: self.config.portal_name.clone(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let _enter = self.span.enter();
        if self.portal.is_none() {
            let e = self.unavailable();
            error!(error = %e, "authenticator endpoint not provisioned");
            return Err(e);
        }
        info!("validated authenticator endpoint");
        Ok(())
    }

    pub async fn serve(&self, request: HttpRequest) -> Result<HttpResponse> {
        let (portal, id) = match (&self.portal, &self.id) {
            (Some(portal), Some(id)) => (portal.clone(), id.clone()),
            _ => return Err(self.unavailable()),
        };
        let ctx = RequestContext {
            endpoint_id: id,
            request_id: uuid::Uuid::new_v4().to_string(),
            path: self.config.path.clone(),
        };
        portal.serve(request, ctx).await
    }
}
