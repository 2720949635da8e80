//! Audit events published to the broker for the audit service.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::user::User;

/// Constant tag identifying this service in audit events.
pub const SERVICE_ORIGIN: &str = "auth-service";
/// Entity type of every event emitted here.
pub const ENTITY_TYPE_USER: &str = "user";
/// Routing key used when an event carries no event type.
pub const DEFAULT_ROUTING_KEY: &str = "log.info";
/// Address recorded when the client IP is unknown.
pub const FALLBACK_IP: &str = "127.0.0.1";

/// Security-relevant action recorded by the audit service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Login,
    Logout,
}

impl AuditAction {
    /// Dotted taxonomy, also the routing key.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Login => "auth.login",
            Self::Logout => "auth.logout",
        }
    }

    pub fn operation_type(&self) -> &'static str {
        match self {
            Self::Login => "LOGIN",
            Self::Logout => "LOGOUT",
        }
    }
}

/// Audit event payload, serialized as the single task argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: String,
    pub correlation_id: String,
    pub campus_code: Option<String>,
    pub user_id: String,
    pub service_origin: String,
    pub event_type: String,
    pub operation_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub old_data: Map<String, Value>,
    pub new_data: Map<String, Value>,
    pub ip_address: String,
}

impl AuditEvent {
    /// Build an event for `user` with a fresh correlation id.
    pub fn for_user(user: &User, action: AuditAction, ip_address: Option<&str>) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            correlation_id: Uuid::new_v4().to_string(),
            campus_code: user.campus.clone(),
            user_id: user.matricula.clone(),
            service_origin: SERVICE_ORIGIN.to_string(),
            event_type: action.event_type().to_string(),
            operation_type: action.operation_type().to_string(),
            entity_type: ENTITY_TYPE_USER.to_string(),
            entity_id: user.id.to_string(),
            old_data: Map::new(),
            new_data: Map::new(),
            ip_address: ip_address
                .filter(|ip| !ip.is_empty())
                .unwrap_or(FALLBACK_IP)
                .to_string(),
        }
    }

    /// Attach contextual data describing the outcome.
    pub fn with_new_data(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.new_data.insert(key.to_string(), value.into());
        self
    }

    /// Routing key for the topic exchange.
    pub fn routing_key(&self) -> &str {
        if self.event_type.trim().is_empty() {
            DEFAULT_ROUTING_KEY
        } else {
            &self.event_type
        }
    }
}
