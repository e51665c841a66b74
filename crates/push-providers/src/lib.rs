//! # Push Providers
//!
//! [`push_core`] connections for Firebase Cloud Messaging and Huawei Push Kit.
//!
//! Each provider module exposes its settings, notification type, a
//! connection factory and a `broker()` shortcut:
//!
//! ```ignore
//! use push_core::BrokerConfig;
//! use push_providers::firebase::{self, FirebaseNotification, FirebaseSettings};
//!
//! let settings = FirebaseSettings::from_file("service-account.json")?;
//! let (broker, outcomes) = firebase::broker(&settings, BrokerConfig::default())?;
//! broker.start().await?;
//! broker.enqueue(FirebaseNotification::to_device(token).with_notification("Hi", "there"))?;
//! ```

mod error;
pub mod firebase;
pub mod http;
pub mod huawei;

#[cfg(test)]
mod testing;

pub use error::{ProviderError, SettingsError};
