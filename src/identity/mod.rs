//! Identity directory
//!
//! Maps the caller-supplied identity key to the storage key recorded in Items
//! and Groups, and to the messaging address the push provider knows the device
//! by. Registration and token verification live here as well.

pub mod cache;
pub mod directory;
pub mod registration;
pub mod verifier;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

pub use cache::CachingDirectory;
pub use directory::StoreIdentityDirectory;
pub use registration::{IdentityRegistrar, Registration};
pub use verifier::{HttpTokenVerifier, TokenVerifier, VerificationError};

#[cfg(any(test, feature = "testing"))]
pub use verifier::MockTokenVerifier;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Opaque key stored in member lists.
    pub storage_key: String,
    /// Key the caller authenticates with.
    pub identity_key: String,
    /// Device address used in group operations.
    pub messaging_address: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("identity directory unavailable: {0}")]
    Unavailable(String),
}

#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Resolve a caller-supplied identity key.
    async fn resolve(&self, identity_key: &str) -> Result<Option<Identity>, DirectoryError>;

    /// Look up an identity by the storage key kept in member lists.
    async fn lookup(&self, storage_key: &str) -> Result<Option<Identity>, DirectoryError>;

    /// Whether the caller is a known identity.
    async fn is_known(&self, identity_key: &str) -> Result<bool, DirectoryError> {
        Ok(self.resolve(identity_key).await?.is_some())
    }
}
