//! Exchange/queue topology declaration (spec §4.4.1). `declare` is
//! idempotent -- every call re-asserts the same durable shapes, which is
//! how RabbitMQ topology declarations are meant to be used.

use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{Channel, ExchangeKind};

use super::error::BusResult;

pub const MAIN_EXCHANGE: &str = "events";
pub const ALTERNATE_EXCHANGE: &str = "events.alternate";
pub const DEAD_LETTER_EXCHANGE: &str = "events.deadletter";

const SEVEN_DAYS_MS: i64 = 7 * 24 * 60 * 60 * 1000;
const MAX_QUEUE_LENGTH: i64 = 1_000_000;

pub fn service_queue(service: &str, environment: &str) -> String {
    format!("{service}.{environment}.queue")
}

pub fn dead_letter_queue(service: &str, environment: &str) -> String {
    format!("{}.deadletter", service_queue(service, environment))
}

pub fn unroutable_queue(service: &str) -> String {
    format!("{service}.unroutable")
}

pub fn retry_queue(service_queue: &str, attempt: u32) -> String {
    format!("{service_queue}.retry.{attempt}")
}

/// Declares the main/alternate/dead-letter exchanges and this service's
/// durable queue, dead-letter queue, and unroutable queue (spec §4.4.1).
/// Retry queues are declared lazily by the consumer, not here.
pub async fn declare(channel: &Channel, service: &str, environment: &str) -> BusResult<()> {
    let mut main_args = FieldTable::default();
    main_args.insert("alternate-exchange".into(), AMQPValue::LongString(ALTERNATE_EXCHANGE.into()));

    channel
        .exchange_declare(
            MAIN_EXCHANGE,
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            main_args,
        )
        .await?;

    channel
        .exchange_declare(
            ALTERNATE_EXCHANGE,
            ExchangeKind::Fanout,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;

    channel
        .exchange_declare(
            DEAD_LETTER_EXCHANGE,
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;

    let queue = service_queue(service, environment);
    let mut queue_args = FieldTable::default();
    queue_args.insert(
        "x-dead-letter-exchange".into(),
        AMQPValue::LongString(DEAD_LETTER_EXCHANGE.into()),
    );
    queue_args.insert("x-message-ttl".into(), AMQPValue::LongLongInt(SEVEN_DAYS_MS));
    queue_args.insert("x-max-length".into(), AMQPValue::LongLongInt(MAX_QUEUE_LENGTH));

    channel
        .queue_declare(
            &queue,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            queue_args,
        )
        .await?;

    let dlq = dead_letter_queue(service, environment);
    channel
        .queue_declare(
            &dlq,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;
    channel
        .queue_bind(&dlq, DEAD_LETTER_EXCHANGE, "#", QueueBindOptions::default(), FieldTable::default())
        .await?;

    let unroutable = unroutable_queue(service);
    channel
        .queue_declare(
            &unroutable,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;
    channel
        .queue_bind(
            &unroutable,
            ALTERNATE_EXCHANGE,
            "",
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;

    Ok(())
}

/// Lazily asserts a retry queue with the given backoff TTL (spec §4.4.3),
/// dead-lettering back into the main exchange with the original routing key.
pub async fn declare_retry_queue(
    channel: &Channel,
    queue_name: &str,
    ttl_ms: i64,
    original_routing_key: &str,
) -> BusResult<()> {
    let mut args = FieldTable::default();
    args.insert("x-dead-letter-exchange".into(), AMQPValue::LongString(MAIN_EXCHANGE.into()));
    args.insert(
        "x-dead-letter-routing-key".into(),
        AMQPValue::LongString(original_routing_key.into()),
    );
    args.insert("x-message-ttl".into(), AMQPValue::LongLongInt(ttl_ms));

    channel
        .queue_declare(
            queue_name,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            args,
        )
        .await?;
    Ok(())
}
