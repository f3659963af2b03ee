//! `EventBus` (spec §4.4.2): the single object a service builds at startup
//! and passes explicitly to every handler. Owns exactly one connection and
//! one channel (spec §5 "shared resource policy").

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lapin::options::{
    BasicConsumeOptions, BasicQosOptions, QueueBindOptions, QueueDeclareOptions, QueueUnbindOptions,
};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties};
use library_core::config::BrokerConfig;
use library_core::domain::{DomainEvent, UpcasterRegistry};
use library_core::error::{LibraryError, Result};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, info, warn};

use crate::consumer::handle_delivery;
use crate::error::BusError;
use crate::handlers::{binding_pattern, Handler, HandlerId, HandlerRegistry, WILDCARD};
use crate::publisher;
use crate::reconnect::ReconnectState;
use crate::salvager;
use crate::topology::{self, service_queue, unroutable_queue};

const PREFETCH_COUNT: u16 = 50;

/// Result of [`EventBus::check_health`] (spec §4.4.2).
#[derive(Debug, Clone)]
pub enum HealthStatus {
    Up { message_count: u32, consumer_count: u32 },
    Down { reason: String },
}

struct Session {
    connection: Connection,
    channel: Channel,
}

/// Topic-exchange publisher/consumer with one durable queue per service
/// (spec §4.4). Construct once per process and share it (behind an `Arc`)
/// with every choreography handler.
pub struct EventBus {
    broker: BrokerConfig,
    service: String,
    session: AsyncMutex<Option<Session>>,
    init_lock: AsyncMutex<()>,
    registry: Arc<HandlerRegistry>,
    upcasters: Arc<UpcasterRegistry>,
    reconnect: AsyncMutex<ReconnectState>,
    shutting_down: AtomicBool,
    consuming: AtomicBool,
    watcher_spawned: AtomicBool,
}

impl EventBus {
    pub fn new(broker: BrokerConfig, service: impl Into<String>) -> Arc<Self> {
        Self::with_upcasters(broker, service, UpcasterRegistry::new())
    }

    /// Construct with a non-default upcaster registry (spec §4.4.6).
    pub fn with_upcasters(broker: BrokerConfig, service: impl Into<String>, upcasters: UpcasterRegistry) -> Arc<Self> {
        Arc::new(Self {
            broker,
            service: service.into(),
            session: AsyncMutex::new(None),
            init_lock: AsyncMutex::new(()),
            registry: Arc::new(HandlerRegistry::new()),
            upcasters: Arc::new(upcasters),
            reconnect: AsyncMutex::new(ReconnectState::new()),
            shutting_down: AtomicBool::new(false),
            consuming: AtomicBool::new(false),
            watcher_spawned: AtomicBool::new(false),
        })
    }

    /// Idempotent topology declaration (spec §4.4.2). Concurrent callers
    /// wait on `init_lock` rather than racing the AMQP declares.
    pub async fn init(self: &Arc<Self>) -> Result<()> {
        let _guard = self.init_lock.lock().await;
        if self.session.lock().await.is_some() {
            return Ok(());
        }

        match self.connect_and_declare().await {
            Ok(session) => {
                *self.session.lock().await = Some(session);
                self.reconnect.lock().await.reset();
                self.apply_pending_bindings().await?;
                info!(service = %self.service, "bus: initialized");
                if self.watcher_spawned.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_ok() {
                    Self::spawn_reconnect_supervisor(self.clone());
                }
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "bus: init failed, closing any partially-open channel/connection");
                Err(err)
            }
        }
    }

    async fn connect_and_declare(&self) -> Result<Session> {
        let uri = self.broker.connection_uri();
        let connection = Connection::connect(&uri, ConnectionProperties::default())
            .await
            .map_err(BusError::from)?;
        let channel = connection.create_channel().await.map_err(BusError::from)?;
        channel
            .basic_qos(PREFETCH_COUNT, BasicQosOptions::default())
            .await
            .map_err(BusError::from)?;
        topology::declare(&channel, &self.service, &self.broker.environment)
            .await
            .map_err(LibraryError::from)?;
        Ok(Session { connection, channel })
    }

    /// Reconnection policy (spec §4.4.5): polls connection health, and on
    /// loss re-runs `init()` with capped exponential backoff. After **10**
    /// consecutive failures the process terminates to let the supervisor
    /// restart it.
    fn spawn_reconnect_supervisor(bus: Arc<Self>) {
        tokio::spawn(async move {
            const POLL_INTERVAL: Duration = Duration::from_secs(1);
            loop {
                tokio::time::sleep(POLL_INTERVAL).await;
                if bus.is_shutting_down() {
                    return;
                }

                let connected = {
                    let session = bus.session.lock().await;
                    session.as_ref().map(|s| s.connection.status().connected()).unwrap_or(false)
                };
                if connected {
                    continue;
                }

                warn!(service = %bus.service, "bus: connection lost, attempting reconnect");
                *bus.session.lock().await = None;

                loop {
                    if bus.is_shutting_down() {
                        return;
                    }
                    let delay = bus.reconnect.lock().await.backoff_delay();
                    tokio::time::sleep(delay).await;

                    match bus.connect_and_declare().await {
                        Ok(session) => {
                            *bus.session.lock().await = Some(session);
                            bus.reconnect.lock().await.reset();
                            if let Err(err) = bus.apply_pending_bindings().await {
                                error!(error = %err, "bus: failed to re-apply bindings after reconnect");
                            }
                            info!(service = %bus.service, "bus: reconnected");
                            break;
                        }
                        Err(err) => {
                            let attempts = bus.reconnect.lock().await.record_attempt();
                            error!(error = %err, attempts, "bus: reconnect attempt failed");
                            if bus.reconnect.lock().await.exhausted() {
                                error!(
                                    service = %bus.service,
                                    "bus: exhausted reconnect attempts, terminating process to let the supervisor restart it"
                                );
                                std::process::exit(1);
                            }
                        }
                    }
                }
            }
        });
    }

    async fn apply_pending_bindings(&self) -> Result<()> {
        let session = self.session.lock().await;
        let Some(session) = session.as_ref() else {
            return Err(BusError::NotInitialized.into());
        };
        let queue = service_queue(&self.service, &self.broker.environment);
        for event_type in self.registry.bound_event_types() {
            session
                .channel
                .queue_bind(
                    &queue,
                    topology::MAIN_EXCHANGE,
                    &binding_pattern(&event_type),
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(BusError::from)?;
        }
        Ok(())
    }

    /// `publish(event)` (spec §4.4.2). Routing key = `eventType`.
    pub async fn publish(&self, event: &DomainEvent) -> Result<()> {
        let session = self.session.lock().await;
        let Some(session) = session.as_ref() else {
            return Err(BusError::NotInitialized.into());
        };
        publisher::publish(&session.channel, &self.service, &self.broker.environment, event)
            .await
            .map_err(LibraryError::from)
    }

    /// Registers `handler` for `event_type` (spec §4.4.2). Subscriptions
    /// requested before `init()` are queued and bound once initialized.
    pub async fn subscribe(&self, event_type: &str, handler: Handler) -> Result<HandlerId> {
        let (id, is_first) = self.registry.subscribe(event_type, handler);
        if is_first {
            let session = self.session.lock().await;
            if let Some(session) = session.as_ref() {
                let queue = service_queue(&self.service, &self.broker.environment);
                session
                    .channel
                    .queue_bind(
                        &queue,
                        topology::MAIN_EXCHANGE,
                        &binding_pattern(event_type),
                        QueueBindOptions::default(),
                        FieldTable::default(),
                    )
                    .await
                    .map_err(BusError::from)?;
            }
            // If not yet initialized, `init()`'s `apply_pending_bindings`
            // picks this binding up from the registry.
        }
        Ok(id)
    }

    pub async fn subscribe_to_all(&self, handler: Handler) -> Result<HandlerId> {
        self.subscribe(WILDCARD, handler).await
    }

    pub async fn unsubscribe(&self, id: &HandlerId) -> Result<()> {
        let Some((event_type, now_empty)) = self.registry.unsubscribe(id) else {
            return Ok(());
        };
        if now_empty {
            let session = self.session.lock().await;
            if let Some(session) = session.as_ref() {
                let queue = service_queue(&self.service, &self.broker.environment);
                session
                    .channel
                    .queue_unbind(
                        &queue,
                        topology::MAIN_EXCHANGE,
                        &binding_pattern(&event_type),
                        FieldTable::default(),
                    )
                    .await
                    .map_err(BusError::from)?;
            }
        }
        Ok(())
    }

    /// Bulk-bind helper used during wiring (spec §4.4.2).
    pub async fn bind_event_types(&self, event_types: &[String]) -> Result<()> {
        let session = self.session.lock().await;
        let Some(session) = session.as_ref() else {
            return Err(BusError::NotInitialized.into());
        };
        let queue = service_queue(&self.service, &self.broker.environment);
        for event_type in event_types {
            session
                .channel
                .queue_bind(
                    &queue,
                    topology::MAIN_EXCHANGE,
                    &binding_pattern(event_type),
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(BusError::from)?;
        }
        Ok(())
    }

    /// Begins processing messages and starts the unroutable-salvager
    /// (spec §4.4.2/§4.4.4). Runs until `shutdown()` is called.
    pub async fn start_consuming(self: &Arc<Self>) -> Result<()> {
        self.consuming.store(true, Ordering::SeqCst);

        let channel = {
            let session = self.session.lock().await;
            let Some(session) = session.as_ref() else {
                return Err(BusError::NotInitialized.into());
            };
            session.channel.clone()
        };

        let queue = service_queue(&self.service, &self.broker.environment);
        let consumer = channel
            .basic_consume(
                &queue,
                &format!("{}-consumer", self.service),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(BusError::from)?;

        let registry = self.registry.clone();
        let upcasters = self.upcasters.clone();
        let service_queue_name = queue.clone();
        let bus = self.clone();
        tokio::spawn(async move {
            use futures_util::StreamExt;
            let mut consumer = consumer;
            while let Some(delivery) = consumer.next().await {
                if bus.shutting_down.load(Ordering::SeqCst) {
                    break;
                }
                match delivery {
                    Ok(delivery) => {
                        let channel = channel.clone();
                        let registry = registry.clone();
                        let upcasters = upcasters.clone();
                        let service_queue_name = service_queue_name.clone();
                        tokio::spawn(async move {
                            handle_delivery(&channel, &registry, &upcasters, &service_queue_name, delivery).await;
                        });
                    }
                    Err(err) => {
                        warn!(error = %err, "bus: consumer stream error");
                        break;
                    }
                }
            }
        });

        salvager::spawn(self.clone());
        Ok(())
    }

    pub(crate) fn unroutable_queue_name(&self) -> String {
        unroutable_queue(&self.service)
    }

    pub(crate) fn main_exchange(&self) -> &'static str {
        topology::MAIN_EXCHANGE
    }

    pub(crate) fn service_name(&self) -> &str {
        &self.service
    }

    pub(crate) fn environment(&self) -> &str {
        &self.broker.environment
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub(crate) async fn channel(&self) -> Option<Channel> {
        self.session.lock().await.as_ref().map(|s| s.channel.clone())
    }

    /// `checkHealth()` (spec §4.4.2): `UP` with queue stats when the
    /// connection is open and the queue is reachable, `DOWN` otherwise.
    pub async fn check_health(&self) -> HealthStatus {
        let session = self.session.lock().await;
        let Some(session) = session.as_ref() else {
            return HealthStatus::Down {
                reason: "bus not initialized".to_string(),
            };
        };
        if session.connection.status().connected() {
            let queue = service_queue(&self.service, &self.broker.environment);
            match session
                .channel
                .queue_declare(
                    &queue,
                    QueueDeclareOptions {
                        passive: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await
            {
                Ok(declared) => HealthStatus::Up {
                    message_count: declared.message_count(),
                    consumer_count: declared.consumer_count(),
                },
                Err(err) => HealthStatus::Down { reason: err.to_string() },
            }
        } else {
            HealthStatus::Down {
                reason: "connection not open".to_string(),
            }
        }
    }

    /// Sets the shutdown flag (suppressing reconnection), drains listeners,
    /// and closes the channel then the connection (spec §4.4.2/§5).
    pub async fn shutdown(&self) -> Result<()> {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.consuming.store(false, Ordering::SeqCst);
        let mut session = self.session.lock().await;
        if let Some(session) = session.take() {
            let _ = session.channel.close(200, "shutdown").await;
            let _ = session.connection.close(200, "shutdown").await;
        }
        Ok(())
    }
}
