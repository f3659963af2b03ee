//! `publish(event)` (spec §4.4.2): routing key = `eventType`, durable
//! properties, `mandatory=true` so an unroutable message is returned to us
//! (and, via the alternate exchange, lands in the unroutable queue rather
//! than being silently dropped).

use chrono::Utc;
use lapin::options::BasicPublishOptions;
use lapin::types::{AMQPValue, FieldTable, LongString};
use lapin::{BasicProperties, Channel};
use library_core::domain::DomainEvent;
use uuid::Uuid;

use super::error::BusResult;
use super::topology::MAIN_EXCHANGE;

/// Publishes `event`, waiting for the broker's publish confirm (which also
/// covers the `mandatory=true` back-pressure/unroutable-return signal).
pub async fn publish(channel: &Channel, service: &str, environment: &str, event: &DomainEvent) -> BusResult<()> {
    let payload = serde_json::to_vec(event)?;
    let message_id = if event.aggregate_id.is_empty() {
        Uuid::new_v4().to_string()
    } else {
        format!("{}-{}", event.aggregate_id, Uuid::new_v4())
    };

    let mut headers = FieldTable::default();
    headers.insert(
        "x-source-service".into(),
        AMQPValue::LongString(LongString::from(service)),
    );
    headers.insert(
        "x-environment".into(),
        AMQPValue::LongString(LongString::from(environment)),
    );
    headers.insert(
        "x-correlation-id".into(),
        AMQPValue::LongString(LongString::from(event.metadata.correlation_id.to_string())),
    );
    headers.insert(
        "x-event-version".into(),
        AMQPValue::LongInt(event.schema_version),
    );

    let properties = BasicProperties::default()
        .with_delivery_mode(2) // persistent=true
        .with_message_id(message_id.into())
        .with_timestamp(Utc::now().timestamp() as u64)
        .with_app_id(service.to_string().into())
        .with_headers(headers);

    let confirm = channel
        .basic_publish(
            MAIN_EXCHANGE,
            &event.event_type,
            BasicPublishOptions {
                mandatory: true,
                immediate: false,
            },
            &payload,
            properties,
        )
        .await?;

    // Awaiting the confirm is also where lapin applies publisher
    // back-pressure: the future resolves once the channel has room and the
    // broker has acknowledged (or returned, for `mandatory`) the message.
    confirm.await?;
    Ok(())
}
