mod error;
mod handlers;
mod middleware;
mod router;
mod session;

pub use error::{ErrorBody, IntoResponseError};
pub use middleware::require_authentication;
pub use router::{mount, webauthn_router, webauthn_router_no_trace};
pub use session::AuthUser;

// Re-export the pieces of webauthn_gate needed to build a router
pub use webauthn_gate::{
    CredentialStore, Endpoints, GateConfig, GateError, InMemoryCredentialStore, UserSummary,
    WEBAUTHN_ROUTE_PREFIX, WebauthnGate,
};
