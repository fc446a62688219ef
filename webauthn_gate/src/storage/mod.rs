mod errors;
mod memory;
mod types;

pub use errors::StorageError;
pub use memory::InMemoryCredentialStore;
pub use types::{CredentialStore, StoredUser, UserSummary};
