//! Per-message consumer algorithm (spec §4.4.3): parse, dispatch to
//! handlers sequentially, and on failure either re-publish into a
//! lazily-declared retry queue or let the broker dead-letter the message.

use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicNackOptions, BasicPublishOptions};
use lapin::types::{AMQPValue, FieldTable, LongString};
use lapin::Channel;
use library_core::domain::{DomainEvent, UpcasterRegistry};
use tracing::{error, warn};

use super::error::BusError;
use super::handlers::HandlerRegistry;
use super::topology::{declare_retry_queue, retry_queue};

pub const MAX_RETRY_ATTEMPTS: u32 = 3;

fn backoff_delay_ms(attempt: u32) -> i64 {
    1000i64 * 2i64.pow(attempt.saturating_sub(1))
}

fn retry_count(delivery: &Delivery) -> u32 {
    delivery
        .properties
        .headers()
        .as_ref()
        .and_then(|headers| headers.inner().get("x-retry-count"))
        .and_then(|v| match v {
            AMQPValue::LongInt(n) => Some(*n as u32),
            AMQPValue::LongLongInt(n) => Some(*n as u32),
            AMQPValue::ShortInt(n) => Some(*n as u32),
            _ => None,
        })
        .unwrap_or(0)
}

/// Handles one delivery end-to-end, following spec §4.4.3 exactly.
pub async fn handle_delivery(
    channel: &Channel,
    registry: &HandlerRegistry,
    upcasters: &UpcasterRegistry,
    service_queue: &str,
    delivery: Delivery,
) {
    let event: DomainEvent = match serde_json::from_slice(&delivery.data) {
        Ok(event) => event,
        Err(err) => {
            warn!(error = %err, "bus: undecodable message, dead-lettering");
            let _ = delivery.nack(BasicNackOptions { requeue: false, ..Default::default() }).await;
            return;
        }
    };
    let event = upcasters.upcast(event);

    let handlers = registry.handlers_for(&event.event_type);
    let mut failure: Option<String> = None;
    for handler in &handlers {
        if let Err(err) = handler(event.clone()).await {
            failure = Some(err.to_string());
            break;
        }
    }

    match failure {
        None => {
            let _ = delivery.ack(BasicAckOptions::default()).await;
        }
        Some(reason) => {
            if let Err(err) = reschedule_or_deadletter(channel, service_queue, &delivery, &event, &reason).await {
                error!(error = %err, "bus: failed to reschedule message onto retry queue");
            }
        }
    }
}

async fn reschedule_or_deadletter(
    channel: &Channel,
    service_queue: &str,
    delivery: &Delivery,
    event: &DomainEvent,
    reason: &str,
) -> Result<(), BusError> {
    let empty_headers = FieldTable::default();
    let existing_headers = delivery.properties.headers().as_ref().unwrap_or(&empty_headers);
    let count = retry_count(delivery) + 1;

    if count <= MAX_RETRY_ATTEMPTS {
        let queue_name = retry_queue(service_queue, count);
        let ttl = backoff_delay_ms(count);
        declare_retry_queue(channel, &queue_name, ttl, &event.event_type).await?;

        let mut headers = existing_headers.clone();
        headers.insert("x-retry-count".into(), AMQPValue::LongInt(count as i32));
        headers.insert("x-last-retry-reason".into(), AMQPValue::LongString(LongString::from(reason)));

        let properties = delivery.properties.clone().with_headers(headers);
        channel
            .basic_publish(
                "",
                &queue_name,
                BasicPublishOptions::default(),
                &delivery.data,
                properties,
            )
            .await?
            .await?;

        warn!(event_type = %event.event_type, attempt = count, "bus: rescheduled message onto retry queue");
        delivery.ack(BasicAckOptions::default()).await?;
    } else {
        error!(event_type = %event.event_type, reason, "bus: exhausted retries, dead-lettering");
        delivery.nack(BasicNackOptions { requeue: false, ..Default::default() }).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_delay_doubles_per_attempt() {
        assert_eq!(backoff_delay_ms(1), 1000);
        assert_eq!(backoff_delay_ms(2), 2000);
        assert_eq!(backoff_delay_ms(3), 4000);
    }
}
