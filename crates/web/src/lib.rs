//! Realmgate web layer
//!
//! Realm registry, backends and the realm authenticator, plus the portals and
//! authenticator endpoints that expose them over HTTP.

pub mod auth;
pub mod server;

pub use auth::{
    AuthenticatorConfig, AuthenticatorEndpoint, Backend, BackendConfig, LocalPortal, Portal,
    PortalRegistry, RealmAuthenticator, RealmRegistry,
};
pub use server::{ApiError, WebServer};
