//! Background unroutable-message salvager (spec §4.4.4). Started by
//! [`crate::bus::EventBus::start_consuming`], one task per consumer.

use std::sync::Arc;
use std::time::Duration;

use lapin::options::{BasicAckOptions, BasicGetOptions, BasicPublishOptions};
use lapin::types::AMQPValue;
use lapin::{BasicProperties, Channel};
use library_core::domain::DomainEvent;
use tracing::{error, info, warn};

use crate::bus::EventBus;

const MAX_MESSAGES_PER_CYCLE: usize = 10;
const BUSY_INTERVAL: Duration = Duration::from_secs(1);
const MAX_EMPTY_INTERVAL_SECS: f64 = 30.0;
const MAX_EMPTY_EXPONENT: i32 = 5;

fn empty_cycle_interval(consecutive_empty: u32) -> Duration {
    let exponent = consecutive_empty.min(MAX_EMPTY_EXPONENT as u32) as i32;
    let secs = (1.0_f64 * 1.5_f64.powi(exponent)).min(MAX_EMPTY_INTERVAL_SECS);
    Duration::from_secs_f64(secs)
}

/// Spawns the salvager loop for `bus`. A cycle-in-progress flag (implicit in
/// owning the only task that runs cycles) prevents concurrent runs.
pub fn spawn(bus: Arc<EventBus>) {
    tokio::spawn(async move {
        let mut consecutive_empty: u32 = 0;

        loop {
            if bus.is_shutting_down() {
                return;
            }

            let Some(channel) = bus.channel().await else {
                tokio::time::sleep(BUSY_INTERVAL).await;
                continue;
            };

            match run_cycle(&bus, &channel).await {
                Ok(processed) => {
                    if processed > 0 {
                        consecutive_empty = 0;
                        tokio::time::sleep(BUSY_INTERVAL).await;
                    } else {
                        consecutive_empty = consecutive_empty.saturating_add(1);
                        tokio::time::sleep(empty_cycle_interval(consecutive_empty)).await;
                    }
                }
                Err(err) => {
                    error!(error = %err, "bus: salvager cycle failed");
                    tokio::time::sleep(BUSY_INTERVAL).await;
                }
            }
        }
    });
}

/// Pulls up to [`MAX_MESSAGES_PER_CYCLE`] messages from the unroutable queue
/// and republishes each to the main exchange with `x-retry-count`
/// incremented, returning how many were processed.
async fn run_cycle(bus: &EventBus, channel: &Channel) -> Result<usize, lapin::Error> {
    let queue = bus.unroutable_queue_name();
    let mut processed = 0usize;

    for _ in 0..MAX_MESSAGES_PER_CYCLE {
        let Some(message) = channel.basic_get(&queue, BasicGetOptions { no_ack: false }).await? else {
            break;
        };

        let event: Option<DomainEvent> = match serde_json::from_slice(&message.data) {
            Ok(event) => Some(event),
            Err(err) => {
                warn!(error = %err, "bus: undecodable message in unroutable queue, acking and dropping");
                None
            }
        };

        let Some(event) = event else {
            message.ack(BasicAckOptions::default()).await?;
            processed += 1;
            continue;
        };

        let retry_count = message
            .properties
            .headers()
            .as_ref()
            .and_then(|headers| headers.inner().get("x-retry-count"))
            .and_then(|v| match v {
                AMQPValue::LongInt(n) => Some(*n),
                AMQPValue::LongLongInt(n) => Some(*n as i32),
                AMQPValue::ShortInt(n) => Some(*n as i32),
                _ => None,
            })
            .unwrap_or(0)
            + 1;

        let mut headers = message.properties.headers().clone().unwrap_or_default();
        headers.insert("x-retry-count".into(), AMQPValue::LongInt(retry_count));
        let properties: BasicProperties = message.properties.clone().with_headers(headers);

        channel
            .basic_publish(
                bus.main_exchange(),
                &event.event_type,
                BasicPublishOptions { mandatory: true, immediate: false },
                &message.data,
                properties,
            )
            .await?
            .await?;

        message.ack(BasicAckOptions::default()).await?;
        processed += 1;
        info!(
            service = %bus.service_name(),
            event_type = %event.event_type,
            retry_count,
            "bus: salvaged unroutable message"
        );
    }

    Ok(processed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_cycle_interval_grows_then_caps() {
        assert_eq!(empty_cycle_interval(0), Duration::from_secs_f64(1.0));
        assert_eq!(empty_cycle_interval(1), Duration::from_secs_f64(1.5));
        assert_eq!(empty_cycle_interval(2), Duration::from_secs_f64(2.25));
        assert_eq!(empty_cycle_interval(5), Duration::from_secs_f64(1.5f64.powi(5)));
        assert_eq!(empty_cycle_interval(5), Duration::from_secs_f64(7.59375));
        assert_eq!(empty_cycle_interval(100), Duration::from_secs_f64(30.0));
    }
}
