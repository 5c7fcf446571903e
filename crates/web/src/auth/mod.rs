//! Realm-scoped authentication.
//!
//! - `registry`: realm name to shared `RealmAuthenticator`
//! - `backend`: configured bindings that dispatch operations to a realm
//! - `local`: the realm authenticator and its credential store
//! - `portal` / `endpoint`: HTTP-facing portals and the endpoints bound to them

pub mod backend;
pub mod endpoint;
pub mod local;
pub mod mfa;
pub mod policy;
pub mod portal;
pub mod registry;
pub mod store;

#[cfg(test)]
pub(crate) mod testutil;

pub use backend::{Backend, BackendConfig};
pub use endpoint::{AuthenticatorConfig, AuthenticatorEndpoint};
pub use local::{AuthenticatorState, RealmAuthenticator};
pub use policy::{MinLengthPolicy, PasswordPolicy};
pub use portal::{EndpointRecord, LocalPortal, Portal, PortalRegistry, RequestContext};
pub use registry::RealmRegistry;
pub use store::CredentialStore;
