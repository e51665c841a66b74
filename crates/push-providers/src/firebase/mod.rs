//! Firebase Cloud Messaging (HTTP v1).
//!
//! Access tokens are obtained by exchanging a signed service-account
//! assertion and are shared by every worker through one
//! [`CredentialCache`](push_core::CredentialCache).

mod auth;
mod connection;
mod notification;
mod settings;

pub use auth::{AssertionClaims, FIREBASE_MESSAGING_SCOPE, FirebaseTokenSource};
pub use connection::{FirebaseConnection, FirebaseConnectionFactory, TOKEN_REFRESH_MARGIN};
pub use notification::{FirebaseContent, FirebaseNotification};
pub use settings::{DEFAULT_TOKEN_URI, FirebaseSettings};

use push_core::{Broker, BrokerConfig, OutcomeReceiver};

use crate::error::SettingsError;

/// Build an idle broker delivering through FCM.
pub fn broker(
    settings: &FirebaseSettings,
    config: BrokerConfig,
) -> Result<(Broker<FirebaseNotification>, OutcomeReceiver<FirebaseNotification>), SettingsError> {
    let factory = FirebaseConnectionFactory::new(settings)?;
    Ok(Broker::with_config(factory, config))
}
