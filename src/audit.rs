/// Audit sink - structured observability events
///
/// Every state transition records a fire-and-forget audit fact.
/// Sink failures are logged and discarded; they never roll back the
/// primary mutation.
use serde_json::{json, Value};

/// Get current timestamp in milliseconds (UTC)
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Structured audit event builder
///
/// Usage:
/// ```
/// use vibemarket::audit::AuditEvent;
///
/// let event = AuditEvent::new("BID_PLACED")
///     .actor(1001)
///     .field("listing_id", 42)
///     .field("amount", 5500)
///     .build();
///
/// log::info!("{}", event);
/// ```
pub struct AuditEvent {
    fields: serde_json::Map<String, Value>,
}

impl AuditEvent {
    pub fn new(action: &str) -> Self {
        let mut fields = serde_json::Map::new();
        fields.insert("action".to_string(), json!(action));
        fields.insert("timestamp_ms".to_string(), json!(now_ms()));

        Self { fields }
    }

    /// The authenticated user the action is attributed to
    pub fn actor(mut self, user_id: u64) -> Self {
        self.fields.insert("user_id".to_string(), json!(user_id));
        self
    }

    pub fn field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn build(self) -> Value {
        Value::Object(self.fields)
    }
}

/// Boundary capability: `record` must never fail the caller.
pub trait AuditSink: Send + Sync {
    fn record(&self, action: &str, user_id: u64, metadata: Value);
}

/// Default sink writing audit facts to the log pipeline.
pub struct LogAuditSink;

impl AuditSink for LogAuditSink {
    fn record(&self, action: &str, user_id: u64, metadata: Value) {
        let event = AuditEvent::new(action)
            .actor(user_id)
            .field("metadata", metadata)
            .build();
        log::info!(target: "audit", "{}", event);
    }
}

/// Sink that drops everything, for tests and tools.
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _action: &str, _user_id: u64, _metadata: Value) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_event_builder() {
        let event = AuditEvent::new("ESCROW_RELEASED")
            .actor(1001)
            .field("listing_id", 42)
            .field("net_amount", 4750)
            .build();

        assert_eq!(event["action"], "ESCROW_RELEASED");
        assert_eq!(event["user_id"], 1001);
        assert_eq!(event["listing_id"], 42);
        assert_eq!(event["net_amount"], 4750);
        assert!(event.get("timestamp_ms").is_some());
    }
}
