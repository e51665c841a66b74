use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use push_core::{
    Broker, BrokerConfig, DeliveryReport, EnqueueError, Notification, Outcome, OutcomeReceiver,
    PushError,
};
use push_providers::firebase::{self, FirebaseNotification, FirebaseSettings};
use push_providers::huawei::{self, HuaweiNotification, HuaweiSettings};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, trace, warn};

use crate::cli::{InputArgs, Provider, SendArgs};

/// Result of `pushctl validate`.
#[derive(Debug, Serialize)]
pub struct ValidationReport {
    pub total: usize,
    /// Zero-based positions of the invalid notifications.
    pub invalid: Vec<usize>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.invalid.is_empty()
    }
}

/// Read a JSON array of notifications.
///
/// Objects without a `tag` are tagged with their position in the file so
/// failures in the report can be traced back to the input.
pub fn load_input<N: DeserializeOwned>(path: &Path) -> Result<Vec<N>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read input file: {}", path.display()))?;
    parse_input(&raw).with_context(|| format!("Invalid input file: {}", path.display()))
}

fn parse_input<N: DeserializeOwned>(raw: &str) -> Result<Vec<N>> {
    let items: Vec<Value> = serde_json::from_str(raw).context("Expected a JSON array")?;

    items
        .into_iter()
        .enumerate()
        .map(|(position, mut item)| {
            if let Value::Object(fields) = &mut item {
                fields.entry("tag").or_insert(Value::from(position));
            }
            serde_json::from_value(item)
                .with_context(|| format!("Notification at position {} is malformed", position))
        })
        .collect()
}

pub fn validate(args: &InputArgs) -> Result<ValidationReport> {
    let invalid = match args.provider {
        Provider::Firebase => invalid_positions(load_input::<FirebaseNotification>(&args.input)?),
        Provider::Huawei => invalid_positions(load_input::<HuaweiNotification>(&args.input)?),
    };
    Ok(invalid)
}

fn invalid_positions<N: Notification>(notifications: Vec<N>) -> ValidationReport {
    let invalid = notifications
        .iter()
        .enumerate()
        .filter(|(_, n)| !n.is_valid())
        .map(|(position, _)| position)
        .collect();

    ValidationReport {
        total: notifications.len(),
        invalid,
    }
}

fn broker_config(scale: Option<usize>) -> Result<BrokerConfig> {
    let mut config = BrokerConfig::from_env().context("Invalid broker configuration")?;
    if let Some(scale) = scale {
        config = config.with_scale(scale);
    }
    config.validate().context("Invalid broker configuration")?;
    Ok(config)
}

pub async fn send(args: SendArgs) -> Result<DeliveryReport> {
    let config = broker_config(args.scale)?;
    let immediate_after = args.immediate_after.map(Duration::from_secs);

    match args.input.provider {
        Provider::Firebase => {
            let path = args
                .service_account
                .context("--service-account or FIREBASE_SERVICE_ACCOUNT is required for firebase")?;
            let settings = FirebaseSettings::from_file(&path).with_context(|| {
                format!("Failed to load service account: {}", path.display())
            })?;
            let notifications = load_input::<FirebaseNotification>(&args.input.input)?;

            let (broker, outcomes) = firebase::broker(&settings, config)?;
            dispatch(broker, outcomes, notifications, immediate_after).await
        }
        Provider::Huawei => {
            let settings = HuaweiSettings::from_env().context("Failed to load Huawei settings")?;
            let notifications = load_input::<HuaweiNotification>(&args.input.input)?;

            let (broker, outcomes) = huawei::broker(&settings, config)?;
            dispatch(broker, outcomes, notifications, immediate_after).await
        }
    }
}

/// Run every notification through `broker` and fold the outcomes into a report.
///
/// A bounded queue applies backpressure: while it is full, outcomes are
/// collected until there is room again. With `immediate_after` set, whatever
/// has not completed by then is abandoned through an immediate stop, and
/// notifications that never made it into the queue are reported as cancelled.
pub async fn dispatch<N: Notification>(
    broker: Broker<N>,
    mut outcomes: OutcomeReceiver<N>,
    notifications: Vec<N>,
    immediate_after: Option<Duration>,
) -> Result<DeliveryReport> {
    let total = notifications.len();
    info!("Dispatching {} notifications with {} workers", total, broker.scale());

    broker.start().await?;

    let deadline = immediate_after.map(|after| tokio::time::Instant::now() + after);
    let mut report = DeliveryReport::default();
    let mut pending = notifications.into_iter();
    let mut expired = false;

    'enqueue: for mut notification in pending.by_ref() {
        loop {
            match broker.enqueue(notification) {
                Ok(()) => break,
                Err(EnqueueError::Full {
                    notification: rejected,
                    capacity,
                }) => {
                    trace!(capacity, "Queue full, waiting for outcomes");
                    notification = rejected;
                    match next_outcome(&mut outcomes, deadline).await {
                        Some(outcome) => record(&mut report, &outcome),
                        None => {
                            expired = true;
                            let abandoned = Outcome::Failed(notification, PushError::Cancelled);
                            record(&mut report, &abandoned);
                            break 'enqueue;
                        }
                    }
                }
                Err(e) => return Err(anyhow!("Failed to enqueue notification: {}", e)),
            }
        }
    }

    // Reported directly; these never reached the broker.
    for notification in pending {
        record(&mut report, &Outcome::Failed(notification, PushError::Cancelled));
    }

    while !expired && report.total() < total {
        match next_outcome(&mut outcomes, deadline).await {
            Some(outcome) => record(&mut report, &outcome),
            None => expired = true,
        }
    }

    if expired {
        warn!(
            "Deadline reached with {} of {} notifications outstanding",
            total - report.total(),
            total
        );
    }

    let immediate = report.total() < total;
    let shutdown = broker.stop(immediate).await?;
    for outcome in outcomes.drain_ready() {
        record(&mut report, &outcome);
    }

    info!(
        succeeded = report.succeeded,
        failed = report.failed,
        abandoned = shutdown.abandoned,
        "Dispatch finished"
    );
    Ok(report)
}

/// Next outcome, or `None` once `deadline` passes or the broker is gone.
async fn next_outcome<N: Notification>(
    outcomes: &mut OutcomeReceiver<N>,
    deadline: Option<tokio::time::Instant>,
) -> Option<Outcome<N>> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, outcomes.recv())
            .await
            .ok()
            .flatten(),
        None => outcomes.recv().await,
    }
}

fn record<N: Notification>(report: &mut DeliveryReport, outcome: &Outcome<N>) {
    let tag = outcome.notification().tag();
    match outcome.error() {
        None => debug!(tag = ?tag, "Notification delivered"),
        Some(error) => warn!(tag = ?tag, kind = %error.kind(), "Notification failed: {}", error),
    }
    report.record(outcome);
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use push_core::{CancellationToken, Connection, FailureKind};
    use serde_json::json;

    struct Instant;

    #[async_trait]
    impl Connection<FirebaseNotification> for Instant {
        async fn send(
            &self,
            notification: &mut FirebaseNotification,
            _cancel: &CancellationToken,
        ) -> Result<(), PushError> {
            notification.set_provider_id("projects/demo/messages/1".into());
            Ok(())
        }
    }

    struct Hang;

    #[async_trait]
    impl Connection<FirebaseNotification> for Hang {
        async fn send(
            &self,
            _notification: &mut FirebaseNotification,
            cancel: &CancellationToken,
        ) -> Result<(), PushError> {
            cancel.cancelled().await;
            Err(PushError::Cancelled)
        }
    }

    fn batch(tokens: &[&str]) -> Vec<FirebaseNotification> {
        tokens
            .iter()
            .enumerate()
            .map(|(i, t)| FirebaseNotification::to_device(*t).with_tag(json!(i)))
            .collect()
    }

    #[tokio::test]
    async fn test_dispatch_reports_every_notification() {
        let (broker, outcomes) = Broker::with_config(
            || Box::new(Instant) as Box<dyn Connection<FirebaseNotification>>,
            BrokerConfig::default().with_scale(2),
        );

        let report = dispatch(broker, outcomes, batch(&["a", "b", "", "c", "d"]), None)
            .await
            .unwrap();

        assert_eq!(report.succeeded, 4);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].kind, FailureKind::Validation);
        assert_eq!(report.failures[0].tag, Some(json!(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_deadline_abandons_outstanding() {
        let (broker, outcomes) = Broker::with_config(
            || Box::new(Hang) as Box<dyn Connection<FirebaseNotification>>,
            BrokerConfig::default().with_scale(1).with_max_batch_size(2),
        );

        let report = dispatch(
            broker,
            outcomes,
            batch(&["a", "b", "c", "d", "e"]),
            Some(Duration::from_secs(5)),
        )
        .await
        .unwrap();

        assert_eq!(report.total(), 5);
        assert_eq!(report.succeeded, 0);
        assert_eq!(report.failures_by_kind.get(&FailureKind::Cancelled), Some(&5));
    }

    #[tokio::test]
    async fn test_full_queue_applies_backpressure() {
        let (broker, outcomes) = Broker::with_config(
            || Box::new(Instant) as Box<dyn Connection<FirebaseNotification>>,
            BrokerConfig::default()
                .with_scale(1)
                .with_max_batch_size(1)
                .with_max_queue_size(Some(2)),
        );
        let tokens: Vec<String> = (0..50).map(|i| format!("device-{}", i)).collect();
        let tokens: Vec<&str> = tokens.iter().map(String::as_str).collect();

        let report = dispatch(broker, outcomes, batch(&tokens), None).await.unwrap();

        assert_eq!(report.total(), 50);
        assert_eq!(report.succeeded, 50);
        assert!(report.all_succeeded());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_while_queue_full_cancels_the_rest() {
        let (broker, outcomes) = Broker::with_config(
            || Box::new(Hang) as Box<dyn Connection<FirebaseNotification>>,
            BrokerConfig::default()
                .with_scale(1)
                .with_max_batch_size(1)
                .with_max_queue_size(Some(2)),
        );

        let report = dispatch(
            broker,
            outcomes,
            batch(&["a", "b", "c", "d", "e", "f"]),
            Some(Duration::from_secs(5)),
        )
        .await
        .unwrap();

        assert_eq!(report.total(), 6);
        assert_eq!(report.failures_by_kind.get(&FailureKind::Cancelled), Some(&6));
    }

    #[test]
    fn test_zero_scale_rejected() {
        let err = broker_config(Some(0)).unwrap_err();
        assert!(format!("{:#}", err).contains("scale must be greater than zero"));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let (broker, outcomes) = Broker::new(|| {
            Box::new(Instant) as Box<dyn Connection<FirebaseNotification>>
        });
        let report = dispatch(broker, outcomes, Vec::new(), None).await.unwrap();
        assert_eq!(report.total(), 0);
        assert!(report.all_succeeded());
    }

    #[test]
    fn test_positions_become_tags() {
        let raw = r#"[{"token": "a"}, {"token": "b", "tag": "custom"}]"#;
        let parsed: Vec<FirebaseNotification> = parse_input(raw).unwrap();

        assert_eq!(parsed[0].tag(), Some(&json!(0)));
        assert_eq!(parsed[1].tag(), Some(&json!("custom")));
    }

    #[test]
    fn test_rejects_non_array() {
        let err = parse_input::<FirebaseNotification>(r#"{"token": "a"}"#).unwrap_err();
        assert!(err.to_string().contains("JSON array"));
    }

    #[test]
    fn test_malformed_item_names_position() {
        let err = parse_input::<HuaweiNotification>(r#"[{"tokens": ["a"]}, {"tokens": "oops"}]"#)
            .unwrap_err();
        assert!(err.to_string().contains("position 1"));
    }

    #[test]
    fn test_validate_lists_invalid_positions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.json");
        std::fs::write(
            &path,
            r#"[{"tokens": ["a"]}, {"tokens": []}, {"tokens": ["b", " "]}, {"tokens": ["c"]}]"#,
        )
        .unwrap();

        let report = validate(&InputArgs {
            provider: Provider::Huawei,
            input: path,
        })
        .unwrap();

        assert_eq!(report.total, 4);
        assert_eq!(report.invalid, vec![1, 2]);
        assert!(!report.is_clean());
    }
}
