//! Provider credential management.
//!
//! Every provider connection authenticates with a short-lived bearer token.
//! [`CredentialCache`] holds the current token and refreshes it lazily through
//! a provider-specific [`CredentialSource`], at most once per expiry no matter
//! how many workers ask for it concurrently.

mod cache;
mod error;

pub use cache::{CredentialCache, CredentialSource, RefreshedToken};
pub use error::CredentialError;
