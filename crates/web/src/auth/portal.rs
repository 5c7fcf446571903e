//! Portals: the HTTP-facing side of authentication.
//!
//! Authenticator endpoints resolve a named `Portal` at provisioning time and
//! forward every inbound request to it.

use async_trait::async_trait;
use axum::body::to_bytes;
use axum::extract::Request as HttpRequest;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response as HttpResponse};
use axum::Json;
use parking_lot::Mutex;
use realmgate_common::{Error, Request, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::backend::Backend;

const MAX_BODY_BYTES: usize = 64 * 1024;

/// Per-request data handed from an endpoint to its portal.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub endpoint_id: String,
    pub request_id: String,
    pub path: String,
}

#[async_trait]
pub trait Portal: Send + Sync {
    fn name(&self) -> &str;

    async fn serve(&self, request: HttpRequest, ctx: RequestContext) -> Result<HttpResponse>;
}

/// An endpoint registered against a portal
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointRecord {
    pub id: String,
    pub path: String,
}

#[derive(Default)]
struct PortalRegistryInner {
    portals: HashMap<String, Arc<dyn Portal>>,
    endpoints: HashMap<String, Vec<EndpointRecord>>,
}

/// Portal name to portal, plus the endpoints attached to each.
#[derive(Default)]
pub struct PortalRegistry {
    inner: Mutex<PortalRegistryInner>,
}

impl PortalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// First registration of a name wins; later ones are ignored.
    pub fn register_portal(&self, portal: Arc<dyn Portal>) -> Result<()> {
        let name = portal.name().to_string();
        if name.is_empty() {
            return Err(Error::PortalNameEmpty);
        }
        let mut inner = self.inner.lock();
        if inner.portals.contains_key(&name) {
            debug!(portal = %name, "portal already registered, keeping first");
            return Ok(());
        }
        inner.portals.insert(name.clone(), portal);
        info!(portal = %name, "registered portal");
        Ok(())
    }

    pub fn lookup_portal(&self, name: &str) -> Result<Arc<dyn Portal>> {
        self.inner
            .lock()
            .portals
            .get(name)
            .cloned()
            .ok_or_else(|| Error::PortalNotFound {
                name: name.to_string(),
            })
    }

    /// Record an endpoint under `portal`. A path can be claimed by only one
    /// endpoint across all portals.
    pub fn register_authenticator(&self, portal: &str, id: &str, path: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.portals.contains_key(portal) {
            return Err(Error::PortalNotFound {
                name: portal.to_string(),
            });
        }
        let holder = inner.endpoints.iter().find_map(|(owner, records)| {
            records
                .iter()
                .find(|r| r.path == path)
                .map(|r| (owner.clone(), r.id == id))
        });
        match holder {
            // same endpoint registering again
            Some((owner, true)) if owner == portal => return Ok(()),
            Some((owner, _)) => {
                return Err(Error::EndpointPathTaken {
                    portal: owner,
                    path: path.to_string(),
                })
            }
            None => {}
        }
        inner
            .endpoints
            .entry(portal.to_string())
            .or_default()
            .push(EndpointRecord {
                id: id.to_string(),
                path: path.to_string(),
            });
        Ok(())
    }

    pub fn authenticators(&self, portal: &str) -> Vec<EndpointRecord> {
        self.inner
            .lock()
            .endpoints
            .get(portal)
            .cloned()
            .unwrap_or_default()
    }

    pub fn portal_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.lock().portals.keys().cloned().collect();
        names.sort();
        names
    }
}

#[derive(Debug, Deserialize)]
struct LoginBody {
    #[serde(default)]
    realm: Option<String>,
    username: String,
    password: String,
}

/// Password login against one or more configured backends.
///
/// Accepts `POST` with a JSON body `{"realm", "username", "password"}`.
/// Without a realm the first backend is used.
pub struct LocalPortal {
    name: String,
    backends: Vec<Arc<Backend>>,
}

impl LocalPortal {
    pub fn new(name: impl Into<String>, backends: Vec<Arc<Backend>>) -> Self {
        Self {
            name: name.into(),
            backends,
        }
    }

    fn backend_for(&self, realm: Option<&str>) -> Result<Arc<Backend>> {
        let found = match realm.filter(|r| !r.is_empty()) {
            Some(realm) => self.backends.iter().find(|b| b.realm() == realm),
            None => self.backends.first(),
        };
        found
            .cloned()
            .ok_or_else(|| Error::not_found("realm", realm.unwrap_or("")))
    }
}

#[async_trait]
impl Portal for LocalPortal {
    fn name(&self) -> &str {
        &self.name
    }

    async fn serve(&self, request: HttpRequest, ctx: RequestContext) -> Result<HttpResponse> {
        if request.method() != Method::POST {
            return Ok((
                StatusCode::METHOD_NOT_ALLOWED,
                Json(serde_json::json!({"error": "use POST"})),
            )
                .into_response());
        }
        let bytes = to_bytes(request.into_body(), MAX_BODY_BYTES)
            .await
            .map_err(|e| Error::InvalidInput(format!("unreadable request body: {}", e)))?;
        let body: LoginBody = serde_json::from_slice(&bytes)
            .map_err(|e| Error::InvalidInput(format!("invalid login body: {}", e)))?;

        let backend = self.backend_for(body.realm.as_deref())?;
        let realm = backend.realm().to_string();
        let login = Request::for_user(body.username).with_password(body.password);
        let user = tokio::task::spawn_blocking(move || backend.authenticate(&login))
            .await
            .map_err(|e| Error::Internal(format!("authentication task failed: {}", e)))??;

        info!(
            portal = %self.name,
            endpoint = %ctx.endpoint_id,
            request_id = %ctx.request_id,
            realm = %realm,
            user = %user.username,
            "login succeeded"
        );
        Ok((
            StatusCode::OK,
            Json(serde_json::json!({
                "realm": realm,
                "user": user,
                "request_id": ctx.request_id,
            })),
        )
            .into_response())
    }
}
