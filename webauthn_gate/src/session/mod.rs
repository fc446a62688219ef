mod config;
mod cookie;
mod errors;
mod store;
mod types;

pub use config::SESSION_COOKIE_NAME;
pub use cookie::{clear_session_cookie_headers, session_cookie_headers, session_id_from_headers};
pub use errors::SessionError;
pub use store::SessionStore;
pub use types::{PendingCeremony, SessionState};
