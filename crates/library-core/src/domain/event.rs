//! # `DomainEvent` — the wire/storage envelope
//!
//! Every event appended to the store, published on the bus, or folded by an
//! aggregate is a [`DomainEvent`]. The envelope is deliberately untyped in
//! its payload (`serde_json::Value`) — each aggregate's `apply_event` knows
//! how to interpret its own `eventType` values; the store and bus never
//! need to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Metadata carried by every event: at minimum a `correlationId` (defaulted
/// if absent) and a `stored` timestamp (set at persistence time).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    pub correlation_id: Uuid,
    pub stored: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: std::collections::HashMap<String, Value>,
}

impl EventMetadata {
    pub fn new(correlation_id: Uuid) -> Self {
        Self {
            correlation_id,
            stored: None,
            extra: std::collections::HashMap::new(),
        }
    }

    /// Metadata with a freshly-generated correlation id, used when a
    /// producer doesn't already have one to propagate.
    pub fn generated() -> Self {
        Self::new(Uuid::new_v4())
    }
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self::generated()
    }
}

/// The append-only, per-aggregate event envelope (spec §3).
///
/// `version`/`globalVersion` are assigned by the event store at persistence
/// time (spec §4.1); a freshly-produced, not-yet-persisted event carries
/// placeholder `0` for both, which callers must treat as "unassigned".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    pub aggregate_id: String,
    pub event_type: String,
    pub version: i64,
    pub global_version: i64,
    pub schema_version: i32,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
    pub metadata: EventMetadata,
}

impl DomainEvent {
    /// Construct an event with no version/globalVersion assigned yet — the
    /// shape produced by an aggregate's command methods before `saveEvents`.
    pub fn new(aggregate_id: impl Into<String>, event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            aggregate_id: aggregate_id.into(),
            event_type: event_type.into(),
            version: 0,
            global_version: 0,
            schema_version: 1,
            timestamp: Utc::now(),
            payload,
            metadata: EventMetadata::default(),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.metadata.correlation_id = correlation_id;
        self
    }

    pub fn with_schema_version(mut self, schema_version: i32) -> Self {
        self.schema_version = schema_version;
        self
    }

    /// True once the event store has assigned real sequence numbers.
    pub fn is_persisted(&self) -> bool {
        self.version > 0 && self.global_version > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_event_has_unassigned_versions() {
        let event = DomainEvent::new("book-1", "BOOK_CREATED", json!({"title": "Dune"}));
        assert!(!event.is_persisted());
        assert_eq!(event.schema_version, 1);
    }

    #[test]
    fn round_trip_preserves_correlation_id() {
        let correlation_id = Uuid::new_v4();
        let event = DomainEvent::new("book-1", "BOOK_CREATED", json!({"title": "Dune"}))
            .with_correlation_id(correlation_id);

        let wire = serde_json::to_string(&event).unwrap();
        let decoded: DomainEvent = serde_json::from_str(&wire).unwrap();
        assert_eq!(decoded.metadata.correlation_id, correlation_id);
        assert_eq!(decoded.event_type, "BOOK_CREATED");
    }

    #[test]
    fn unknown_wire_fields_round_trip_in_metadata() {
        let raw = serde_json::json!({
            "aggregateId": "book-1",
            "eventType": "BOOK_CREATED",
            "version": 1,
            "globalVersion": 1,
            "schemaVersion": 1,
            "timestamp": Utc::now().to_rfc3339(),
            "payload": {"title": "Dune"},
            "metadata": {
                "correlationId": Uuid::new_v4().to_string(),
                "stored": Utc::now().to_rfc3339(),
                "xSourceService": "reservations"
            }
        });

        let event: DomainEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(
            event.metadata.extra.get("xSourceService").and_then(|v| v.as_str()),
            Some("reservations")
        );
    }
}
