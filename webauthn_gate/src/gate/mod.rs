mod ceremony;
mod errors;
mod types;

pub use ceremony::WebauthnGate;
pub use errors::GateError;
pub use types::{FinishOutcome, ResponseKind};
