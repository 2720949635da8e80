//! Audit event delivery to the message broker.
//!
//! Events are wrapped in Celery (protocol v2) task messages so the audit
//! service's existing `process_audit_log` consumer can pick them up from the
//! `audit_queue`. Publishing never fails the caller: transient connection
//! errors are retried with capped exponential backoff, everything else is
//! logged and dropped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lapin::options::{
    BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldArray, FieldTable, LongString, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::models::AuditEvent;

/// Topic exchange every service publishes events to.
pub const EVENTS_EXCHANGE: &str = "events_exchange";
/// Queue consumed by the audit service.
pub const AUDIT_QUEUE: &str = "audit_queue";
/// Binding key routing every event to the audit queue.
const AUDIT_BINDING_KEY: &str = "#";
/// Task name registered by the audit consumer.
pub const AUDIT_TASK_NAME: &str = "process_audit_log";

/// Bound on opening a connection and declaring the topology.
const SETUP_TIMEOUT: Duration = Duration::from_secs(5);
/// Bound on waiting for the broker to confirm a publish.
const CONFIRM_TIMEOUT: Duration = Duration::from_secs(2);

/// Broker delivery errors.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// Broker unreachable or the connection/channel dropped; worth retrying
    #[error("Broker connection error: {0}")]
    Connection(String),

    #[error("Failed to encode task message: {0}")]
    Encode(#[from] serde_json::Error),

    /// Broker accepted the frame but refused the message
    #[error("Broker rejected message: {0}")]
    Rejected(String),
}

impl BrokerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

impl From<lapin::Error> for BrokerError {
    fn from(err: lapin::Error) -> Self {
        BrokerError::Connection(err.to_string())
    }
}

/// Celery protocol v2 task message carrying a single audit event.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskMessage {
    pub id: String,
    pub task: String,
    pub argsrepr: String,
    pub body: Vec<u8>,
}

impl TaskMessage {
    pub fn for_event(event: &AuditEvent) -> Result<Self, BrokerError> {
        let args = json!([event]);
        let body = json!([
            args,
            {},
            {"callbacks": null, "errbacks": null, "chain": null, "chord": null}
        ]);

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            task: AUDIT_TASK_NAME.to_string(),
            argsrepr: serde_json::to_string(&args)?,
            body: serde_json::to_vec(&body)?,
        })
    }

    /// Decoded `args` of the task body.
    pub fn args(&self) -> Result<serde_json::Value, BrokerError> {
        let body: serde_json::Value = serde_json::from_slice(&self.body)?;
        Ok(body.get(0).cloned().unwrap_or(serde_json::Value::Null))
    }

    fn headers(&self) -> FieldTable {
        let mut headers = FieldTable::default();
        let mut put_str = |key: &str, value: &str| {
            headers.insert(
                ShortString::from(key),
                AMQPValue::LongString(LongString::from(value)),
            );
        };
        put_str("lang", "py");
        put_str("task", &self.task);
        put_str("id", &self.id);
        put_str("root_id", &self.id);
        put_str("argsrepr", &self.argsrepr);
        put_str("kwargsrepr", "{}");
        put_str("origin", crate::models::audit::SERVICE_ORIGIN);

        headers.insert(ShortString::from("parent_id"), AMQPValue::Void);
        headers.insert(ShortString::from("group"), AMQPValue::Void);
        headers.insert(ShortString::from("eta"), AMQPValue::Void);
        headers.insert(ShortString::from("expires"), AMQPValue::Void);
        headers.insert(ShortString::from("retries"), AMQPValue::LongInt(0));
        headers.insert(
            ShortString::from("timelimit"),
            AMQPValue::FieldArray(FieldArray::from(vec![AMQPValue::Void, AMQPValue::Void])),
        );
        headers
    }

    fn properties(&self) -> BasicProperties {
        BasicProperties::default()
            .with_content_type(ShortString::from("application/json"))
            .with_content_encoding(ShortString::from("utf-8"))
            .with_correlation_id(ShortString::from(self.id.as_str()))
            .with_delivery_mode(2)
            .with_priority(0)
            .with_headers(self.headers())
    }
}

/// Delivers encoded task messages to the broker.
#[async_trait]
pub trait BrokerTransport: Send + Sync {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: &TaskMessage,
    ) -> Result<(), BrokerError>;
}

/// Retry schedule for transient broker failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Limit on a single attempt; an attempt that runs over counts as a transient failure.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(2),
            attempt_timeout: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Longest time `AuditPublisher::publish` can take before giving up.
    pub fn worst_case(&self) -> Duration {
        let attempts = self.attempt_timeout.saturating_mul(self.max_attempts);
        (1..self.max_attempts)
            .map(|retry| self.delay_for(retry))
            .fold(attempts, Duration::saturating_add)
    }
}

/// Publishes audit events, absorbing every failure.
#[derive(Clone)]
pub struct AuditPublisher {
    transport: Arc<dyn BrokerTransport>,
    policy: RetryPolicy,
}

impl AuditPublisher {
    pub fn new(transport: Arc<dyn BrokerTransport>) -> Self {
        Self::with_policy(transport, RetryPolicy::default())
    }

    pub fn with_policy(transport: Arc<dyn BrokerTransport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// Deliver `event`, retrying transient failures. Returns whether it was delivered.
    pub async fn publish(&self, event: &AuditEvent) -> bool {
        let message = match TaskMessage::for_event(event) {
            Ok(m) => m,
            Err(e) => {
                error!(event_type = %event.event_type, "Dropping audit event: {}", e);
                return false;
            }
        };
        let routing_key = event.routing_key();

        let mut attempt = 1;
        loop {
            let sent = tokio::time::timeout(
                self.policy.attempt_timeout,
                self.transport.publish(EVENTS_EXCHANGE, routing_key, &message),
            )
            .await
            .unwrap_or_else(|_| Err(BrokerError::Connection("publish timed out".to_string())));

            match sent {
                Ok(()) => {
                    debug!(
                        routing_key,
                        correlation_id = %event.correlation_id,
                        attempt,
                        "Published audit event"
                    );
                    return true;
                }
                Err(e) if e.is_transient() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        routing_key,
                        attempt,
                        "Audit publish failed, retrying in {:?}: {}",
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        routing_key,
                        correlation_id = %event.correlation_id,
                        attempts = attempt,
                        "Giving up on audit event: {}",
                        e
                    );
                    return false;
                }
            }
        }
    }

    /// Publish in the background so the caller's response is not delayed.
    pub fn dispatch(&self, event: AuditEvent) -> tokio::task::JoinHandle<bool> {
        let publisher = self.clone();
        tokio::spawn(async move { publisher.publish(&event).await })
    }
}

struct AmqpSession {
    connection: Connection,
    channel: Channel,
}

/// AMQP 0-9-1 transport. Connects lazily, declares the topology once per
/// connection and reconnects on the next publish after a failure.
pub struct AmqpTransport {
    url: String,
    session: Mutex<Option<AmqpSession>>,
}

impl AmqpTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            session: Mutex::new(None),
        }
    }

    /// Open the connection eagerly. Failure only delays the connection to the first publish.
    pub async fn warm_up(&self) {
        match self.channel().await {
            Ok(_) => info!("Connected to audit broker"),
            Err(e) => warn!("Audit broker not reachable at startup: {}", e),
        }
    }

    async fn connect(&self) -> Result<AmqpSession, BrokerError> {
        tokio::time::timeout(SETUP_TIMEOUT, self.open_session())
            .await
            .map_err(|_| BrokerError::Connection("broker setup timed out".to_string()))?
    }

    async fn open_session(&self) -> Result<AmqpSession, BrokerError> {
        let connection = Connection::connect(&self.url, ConnectionProperties::default()).await?;

        let channel = connection.create_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;
        channel
            .exchange_declare(
                EVENTS_EXCHANGE,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        channel
            .queue_declare(
                AUDIT_QUEUE,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        channel
            .queue_bind(
                AUDIT_QUEUE,
                EVENTS_EXCHANGE,
                AUDIT_BINDING_KEY,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        Ok(AmqpSession {
            connection,
            channel,
        })
    }

    async fn channel(&self) -> Result<Channel, BrokerError> {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_ref() {
            if session.connection.status().connected() && session.channel.status().connected() {
                return Ok(session.channel.clone());
            }
        }

        let session = self.connect().await?;
        let channel = session.channel.clone();
        *guard = Some(session);
        Ok(channel)
    }

    async fn reset(&self) {
        *self.session.lock().await = None;
    }
}

#[async_trait]
impl BrokerTransport for AmqpTransport {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: &TaskMessage,
    ) -> Result<(), BrokerError> {
        let channel = self.channel().await?;

        let result = publish_confirmed(&channel, exchange, routing_key, message).await;
        if matches!(result, Err(BrokerError::Connection(_))) {
            self.reset().await;
        }
        result
    }
}

async fn publish_confirmed(
    channel: &Channel,
    exchange: &str,
    routing_key: &str,
    message: &TaskMessage,
) -> Result<(), BrokerError> {
    let confirm = channel
        .basic_publish(
            exchange,
            routing_key,
            BasicPublishOptions::default(),
            &message.body,
            message.properties(),
        )
        .await?;
    let confirmation = tokio::time::timeout(CONFIRM_TIMEOUT, confirm)
        .await
        .map_err(|_| BrokerError::Connection("publish confirm timed out".to_string()))??;

    if confirmation.is_nack() {
        return Err(BrokerError::Rejected(format!("task {} nacked", message.id)));
    }
    Ok(())
}
