//! Huawei Push Kit.
//!
//! Uses the v2 API when a project id is configured and the legacy v1 API
//! when only an app id is known. Access tokens come from the OAuth
//! client-credentials flow.

mod auth;
mod connection;
mod notification;
mod settings;

pub use auth::{HuaweiTokenSource, TOKEN_URL};
pub use connection::{
    HuaweiConnection, HuaweiConnectionFactory, TOKEN_REFRESH_MARGIN, code_description,
    status_description,
};
pub use notification::HuaweiNotification;
pub use settings::HuaweiSettings;

use push_core::{Broker, BrokerConfig, OutcomeReceiver};

use crate::error::SettingsError;

/// Build an idle broker delivering through Push Kit.
pub fn broker(
    settings: &HuaweiSettings,
    config: BrokerConfig,
) -> Result<(Broker<HuaweiNotification>, OutcomeReceiver<HuaweiNotification>), SettingsError> {
    let factory = HuaweiConnectionFactory::new(settings)?;
    Ok(Broker::with_config(factory, config))
}
