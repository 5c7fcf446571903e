//! HTTP server: mounts authenticator endpoints and diagnostics routes.

use crate::auth::{AuthenticatorEndpoint, PortalRegistry, RealmRegistry};
use axum::{
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use realmgate_common::Error;
use serde::Serialize;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Wrapper that renders a `realmgate_common::Error` as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::InvalidCredentials | Error::AuthFailed { .. } => StatusCode::UNAUTHORIZED,
        Error::NotFound { .. } => StatusCode::NOT_FOUND,
        Error::AlreadyExists { .. } | Error::EndpointPathTaken { .. } => StatusCode::CONFLICT,
        Error::MissingField { .. }
        | Error::InvalidInput(_)
        | Error::PolicyViolation(_)
        | Error::OperatorNotSupported { .. } => StatusCode::BAD_REQUEST,
        Error::BackendUnavailable { .. }
        | Error::PortalUnavailable { .. }
        | Error::PortalNotFound { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self.0, "request failed");
            "internal error".to_string()
        } else {
            self.0.to_string()
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

struct WebServerState {
    realms: Arc<RealmRegistry>,
    portals: Arc<PortalRegistry>,
}

/// Realmgate HTTP server
pub struct WebServer {
    state: Arc<WebServerState>,
    endpoints: Vec<Arc<AuthenticatorEndpoint>>,
}

impl WebServer {
    pub fn new(realms: Arc<RealmRegistry>, portals: Arc<PortalRegistry>) -> Self {
        Self {
            state: Arc::new(WebServerState { realms, portals }),
            endpoints: Vec::new(),
        }
    }

    pub fn with_endpoints(mut self, endpoints: Vec<AuthenticatorEndpoint>) -> Self {
        self.endpoints.extend(endpoints.into_iter().map(Arc::new));
        self
    }

    /// Build the router. Endpoints with an unusable or duplicate path are
    /// skipped with a warning.
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .route("/api/health", get(health_handler))
            .route("/api/realms", get(realms_handler))
            .route("/api/portals", get(portals_handler));

        let mut mounted: HashSet<String> = ["/api/health", "/api/realms", "/api/portals"]
            .iter()
            .map(|p| p.to_string())
            .collect();
        for endpoint in &self.endpoints {
            let path = endpoint.path().to_string();
            if !path.starts_with('/') || !mounted.insert(path.clone()) {
                warn!(path = %path, portal = %endpoint.portal_name(), "skipping authenticator endpoint");
                continue;
            }
            let endpoint = endpoint.clone();
            router = router.route(
                &path,
                any(move |request: Request| {
                    let endpoint = endpoint.clone();
                    async move {
                        match endpoint.serve(request).await {
                            Ok(response) => response,
                            Err(e) => ApiError(e).into_response(),
                        }
                    }
                }),
            );
        }

        router
            .fallback(not_found_handler)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Start the web server
    pub async fn serve(self, addr: SocketAddr) -> anyhow::Result<()> {
        info!("Realmgate listening on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "realmgate",
        "version": realmgate_common::VERSION,
    }))
}

#[derive(Serialize)]
struct RealmStatus {
    realm: String,
    path: String,
    state: crate::auth::AuthenticatorState,
}

async fn realms_handler(State(state): State<Arc<WebServerState>>) -> impl IntoResponse {
    let realms: Vec<RealmStatus> = state
        .realms
        .realms()
        .into_iter()
        .filter_map(|name| state.realms.lookup(&name))
        .map(|auth| RealmStatus {
            realm: auth.realm().to_string(),
            path: auth.path().to_string(),
            state: auth.state(),
        })
        .collect();
    Json(realms)
}

async fn portals_handler(State(state): State<Arc<WebServerState>>) -> impl IntoResponse {
    let portals: Vec<serde_json::Value> = state
        .portals
        .portal_names()
        .into_iter()
        .map(|name| {
            let endpoints = state.portals.authenticators(&name);
            serde_json::json!({ "portal": name, "authenticators": endpoints })
        })
        .collect();
    Json(portals)
}

async fn not_found_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "not found" })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::portal::tests::{local_portal, login};
    use crate::auth::AuthenticatorConfig;
    use axum::body::{to_bytes, Body};
    use realmgate_common::MemoryCredentials;
    use tower::ServiceExt;

    fn server(paths: &[&str]) -> WebServer {
        let realms = Arc::new(RealmRegistry::new(Arc::new(MemoryCredentials::new())));
        let portals = Arc::new(PortalRegistry::new());
        portals.register_portal(Arc::new(local_portal("main"))).unwrap();
        let endpoints = paths
            .iter()
            .map(|path| {
                let mut endpoint =
                    AuthenticatorEndpoint::new(AuthenticatorConfig::new("main", *path));
                let _ = endpoint.provision(&portals);
                endpoint
            })
            .collect();
        WebServer::new(realms, portals).with_endpoints(endpoints)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&Error::InvalidCredentials), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_for(&Error::not_found("user", "x")),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&Error::already_exists("user", "x")),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&Error::PortalUnavailable { portal: "p".into() }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&Error::Internal("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_login_through_router() {
        let router = server(&["/auth"]).router();
        let ok = router
            .clone()
            .oneshot(login(None, "alice", "alice-password"))
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
        let body = body_json(ok).await;
        assert_eq!(body["user"]["username"], "alice");

        let denied = router
            .oneshot(login(None, "alice", "nope-nope"))
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(denied).await;
        assert_eq!(body["error"], "authentication failed");
    }

    #[tokio::test]
    async fn test_duplicate_path_not_mounted_twice() {
        // second endpoint fails to provision but must not break the router
        let router = server(&["/auth", "/auth"]).router();
        let resp = router
            .oneshot(login(None, "alice", "alice-password"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_and_fallback() {
        let router = server(&[]).router();
        let health = router
            .clone()
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);

        let missing = router
            .oneshot(Request::builder().uri("/nowhere").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
