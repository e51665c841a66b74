//! # Push Core
//!
//! The provider-agnostic dispatch engine behind every push connection.
//!
//! A [`Broker`] owns an in-memory notification queue and a pool of workers.
//! Each worker holds its own [`Connection`] (created by a
//! [`ConnectionFactory`]), pulls batches of queued notifications, sends them
//! concurrently and reports exactly one [`Outcome`] per notification on the
//! broker's outcome channel.
//!
//! ## Features
//!
//! - Graceful and immediate shutdown with exactly-once outcome accounting
//! - Pool resizing while sends are in flight
//! - Lazily refreshed, single-flight [`CredentialCache`] for bearer tokens
//! - A small reporting taxonomy ([`PushError`]) shared by all providers
//!
//! ## Example
//!
//! ```ignore
//! use push_core::{Broker, BrokerConfig};
//!
//! let (broker, mut outcomes) = Broker::with_config(factory, BrokerConfig::default().with_scale(4));
//! broker.start().await?;
//! broker.enqueue(notification)?;
//! broker.stop(false).await?;
//!
//! while let Some(outcome) = outcomes.try_recv() {
//!     println!("{:?}", outcome.error());
//! }
//! ```

mod broker;
mod config;
mod connection;
pub mod credentials;
mod error;
mod notification;
mod outcome;
mod queue;
mod supervisor;
mod worker;

pub use broker::Broker;
pub use config::{BrokerConfig, ConfigError};
pub use connection::{Connection, ConnectionFactory};
pub use credentials::{CredentialCache, CredentialError, CredentialSource, RefreshedToken};
pub use error::{BoxError, BrokerError, EnqueueError, FailureKind, PushError};
pub use notification::{Notification, Tag};
pub use outcome::{DeliveryReport, FailureRecord, Outcome, OutcomeReceiver};
pub use supervisor::ShutdownReport;

/// Re-exported so connection implementations and callers agree on the token type.
pub use tokio_util::sync::CancellationToken;
