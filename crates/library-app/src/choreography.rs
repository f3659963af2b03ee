//! Cross-aggregate choreography (spec §4.5): the handlers that move a
//! reservation from `CREATED` through book validation, payment, and
//! eventual return, each a bus subscription registered once at startup.
//!
//! Every handler follows the same shape: rehydrate the aggregate(s) it
//! needs from the event store, call a command method, persist the
//! resulting events through `append_batch`, project them, and publish —
//! stamping every produced event with the triggering event's
//! `CorrelationContext` so the whole chain shares one correlation id.

use std::sync::Arc;

use library_core::domain::{rehydrate, AggregateRoot, CorrelationContext, DomainEvent, Reservation, Wallet};
use library_core::error::{LibraryError, Result};
use library_store::{
    BookProjectionRepository, EventStore, ProjectionRepository, ProjectionWriter, ReservationProjectionRepository,
    WalletProjectionRepository,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use library_bus::EventBus;

/// Denormalized reservation read model (spec §4.3); the fields a caller
/// would query without rehydrating the full event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationProjection {
    pub user_id: String,
    pub book_id: String,
    pub status: String,
    pub retail_price: f64,
}

/// Denormalized wallet read model (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletProjection {
    pub user_id: String,
    pub balance: f64,
}

/// Everything a choreography handler needs: the store, the bus it publishes
/// back onto, the three projection repositories, and the business-rule
/// constants from config (late fee, reservation fee).
pub struct Choreography {
    pub event_store: Arc<dyn EventStore>,
    pub bus: Arc<EventBus>,
    pub books: Arc<BookProjectionRepository>,
    pub reservations: Arc<ReservationProjectionRepository>,
    pub wallets: Arc<WalletProjectionRepository>,
    pub reservation_fee: f64,
    pub late_fee_per_day: f64,
}

/// Subscribes every choreography handler on `bus` (spec §4.5). Call once
/// after `bus.init()` and before `bus.start_consuming()`.
pub async fn register(choreography: Arc<Choreography>) -> Result<()> {
    {
        let choreography = choreography.clone();
        choreography
            .bus
            .subscribe(
                "RESERVATION_CREATED",
                Arc::new(move |event| {
                    let choreography = choreography.clone();
                    Box::pin(async move { choreography.on_reservation_created(event).await })
                }),
            )
            .await?;
    }
    {
        let choreography = choreography.clone();
        choreography
            .bus
            .subscribe(
                "RESERVATION_BOOK_VALIDATION",
                Arc::new(move |event| {
                    let choreography = choreography.clone();
                    Box::pin(async move { choreography.on_book_validation_requested(event).await })
                }),
            )
            .await?;
    }
    {
        let choreography = choreography.clone();
        choreography
            .bus
            .subscribe(
                "BOOK_VALIDATION_RESULT",
                Arc::new(move |event| {
                    let choreography = choreography.clone();
                    Box::pin(async move { choreography.on_book_validation_result(event).await })
                }),
            )
            .await?;
    }
    {
        let choreography = choreography.clone();
        choreography
            .bus
            .subscribe(
                "RESERVATION_PENDING_PAYMENT",
                Arc::new(move |event| {
                    let choreography = choreography.clone();
                    Box::pin(async move { choreography.on_payment_requested(event).await })
                }),
            )
            .await?;
    }
    {
        let choreography = choreography.clone();
        choreography
            .bus
            .subscribe(
                "RESERVATION_RETURN_REQUESTED",
                Arc::new(move |event| {
                    let choreography = choreography.clone();
                    Box::pin(async move { choreography.on_return_requested(event).await })
                }),
            )
            .await?;
    }
    Ok(())
}

impl Choreography {
    async fn load_reservation(&self, id: &str) -> Result<Reservation> {
        let events = self.event_store.get_events_for_aggregate(id).await?;
        rehydrate(events)
    }

    async fn load_or_create_wallet(&self, user_id: &str) -> Result<Wallet> {
        let events = self.event_store.get_events_for_aggregate(user_id).await?;
        if events.is_empty() {
            Wallet::create(user_id)
        } else {
            rehydrate(events)
        }
    }

    /// Persists `aggregate`'s uncommitted events, projects them into
    /// `project`, and publishes each (stamped with `context`).
    async fn commit_and_publish<A, F>(&self, aggregate: &mut A, context: &CorrelationContext, mut project: F) -> Result<()>
    where
        A: AggregateRoot,
        F: FnMut(&DomainEvent),
    {
        let events = aggregate.take_uncommitted_events();
        if events.is_empty() {
            return Ok(());
        }
        let persisted = self.event_store.append_batch(aggregate.id(), events).await?;
        for event in &persisted {
            project(event);
            let stamped = context.stamp(event.clone());
            if let Err(err) = self.bus.publish(&stamped).await {
                warn!(error = %err, event_type = %stamped.event_type, "choreography: publish failed");
            }
        }
        Ok(())
    }

    /// Step 1->2: a freshly-created reservation asks the books service to
    /// validate the book it names. Also seeds the read-side projection row:
    /// nothing else in this substrate persists it, since the reservation's
    /// own creation happens upstream of this choreography.
    async fn on_reservation_created(&self, event: DomainEvent) -> Result<()> {
        let context = CorrelationContext::from_event(&event);
        let user_id = event.payload["userId"].as_str().unwrap_or_default().to_string();
        let book_id = event.payload["bookId"].as_str().unwrap_or_default().to_string();

        let projection = ReservationProjection {
            user_id,
            book_id: book_id.clone(),
            status: "CREATED".to_string(),
            retail_price: 0.0,
        };
        self.reservations.save(&event.aggregate_id, event.version, &projection).await?;

        let request = context.stamp(DomainEvent::new(
            event.aggregate_id.clone(),
            "RESERVATION_BOOK_VALIDATION",
            json!({"bookId": book_id}),
        ));
        self.bus.publish(&request).await
    }

    /// Step 3: the books-side handler reads the Book projection and reports
    /// whether the reservation may proceed.
    async fn on_book_validation_requested(&self, event: DomainEvent) -> Result<()> {
        let context = CorrelationContext::from_event(&event);
        let reservation_id = event.aggregate_id.clone();
        let book_id = event.payload["bookId"].as_str().unwrap_or_default().to_string();

        let book: Option<serde_json::Value> = self.books.get_by_id(&book_id, false).await.ok().flatten();
        let result = match book {
            Some(book) => context.stamp(DomainEvent::new(
                reservation_id,
                "BOOK_VALIDATION_RESULT",
                json!({"isValid": true, "reason": serde_json::Value::Null, "retailPrice": book_retail_price(&book)}),
            )),
            None => context.stamp(DomainEvent::new(
                reservation_id,
                "RESERVATION_BOOK_VALIDATION_FAILED",
                json!({"reason": format!("book {book_id} not found")}),
            )),
        };
        self.bus.publish(&result).await
    }

    /// Step 4: the reservation either rejects or moves to pending payment.
    async fn on_book_validation_result(&self, event: DomainEvent) -> Result<()> {
        let context = CorrelationContext::from_event(&event);
        let mut reservation = self.load_reservation(&event.aggregate_id).await?;

        match event.event_type.as_str() {
            "BOOK_VALIDATION_RESULT" => {
                let is_valid = event.payload["isValid"].as_bool().unwrap_or(false);
                if is_valid {
                    let retail_price = event.payload["retailPrice"].as_f64().unwrap_or(0.0);
                    reservation.update_retail_price(retail_price)?;
                    reservation.pending_payment()?;
                } else {
                    let reason = event.payload["reason"].as_str().unwrap_or("book validation failed");
                    reservation.reject(reason)?;
                }
            }
            "RESERVATION_BOOK_VALIDATION_FAILED" => {
                let reason = event.payload["reason"].as_str().unwrap_or("book validation failed");
                reservation.reject(reason)?;
            }
            other => {
                warn!(event_type = other, "choreography: unexpected event on validation-result handler");
                return Ok(());
            }
        }

        self.commit_and_publish(&mut reservation, &context, |e| project_reservation(self, e)).await
    }

    /// Step 5: debit the reserving user's wallet for the reservation fee.
    async fn on_payment_requested(&self, event: DomainEvent) -> Result<()> {
        let context = CorrelationContext::from_event(&event);
        let mut reservation = self.load_reservation(&event.aggregate_id).await?;
        let mut wallet = self.load_or_create_wallet(&reservation.user_id).await?;

        let amount = if reservation.retail_price > 0.0 {
            self.reservation_fee.min(reservation.retail_price)
        } else {
            self.reservation_fee
        };

        match wallet.debit(amount) {
            Ok(()) => {
                reservation.confirm()?;
                self.commit_and_publish(&mut wallet, &context, |e| project_wallet(self, e)).await?;
                self.commit_and_publish(&mut reservation, &context, |e| project_reservation(self, e)).await
            }
            Err(LibraryError::InvalidTransition { .. }) => {
                reservation.reject("payment declined: insufficient wallet balance")?;
                self.commit_and_publish(&mut reservation, &context, |e| project_reservation(self, e)).await
            }
            Err(other) => Err(other),
        }
    }

    /// Step 6: on return, the late-fee rule decides `RETURNED` vs
    /// `BOOK_BROUGHT` (spec §4.2.1): once the accumulated late fee reaches
    /// the book's retail price, the reservation is treated as a purchase;
    /// otherwise the book was still returned, just late, and `RETURNED`
    /// carries the late-fee figure rather than leaving the reservation
    /// parked in `LATE` (that status is for an overdue-but-not-yet-returned
    /// reservation, which this handler never sees since it only fires once
    /// a return has actually been requested).
    async fn on_return_requested(&self, event: DomainEvent) -> Result<()> {
        let context = CorrelationContext::from_event(&event);
        let mut reservation = self.load_reservation(&event.aggregate_id).await?;
        let days_late = event.payload["daysLate"].as_i64().unwrap_or(0).max(0);
        let retail_price = reservation.retail_price;
        let accrued_late_fee = self.late_fee_per_day * days_late as f64;

        if days_late > 0 && accrued_late_fee >= retail_price && retail_price > 0.0 {
            info!(
                reservation_id = %reservation.id(),
                accrued_late_fee,
                retail_price,
                "choreography: late fee reached retail price, treating as bought"
            );
            reservation.mark_bought()?;
        } else {
            reservation.mark_returned(days_late, retail_price, accrued_late_fee)?;
        }

        self.commit_and_publish(&mut reservation, &context, |e| project_reservation(self, e)).await
    }
}

fn book_retail_price(book: &serde_json::Value) -> f64 {
    book.get("retailPrice").and_then(|v| v.as_f64()).or_else(|| book.get("retail_price").and_then(|v| v.as_f64())).unwrap_or(0.0)
}

fn project_reservation(choreography: &Choreography, event: &DomainEvent) {
    let repo = choreography.reservations.clone();
    let event = event.clone();
    tokio::spawn(async move {
        let changes = json!({
            "status": reservation_status_after(&event.event_type),
            "retailPrice": event.payload.get("retailPrice"),
        });
        if let Err(err) = repo.update_if_newer(&event.aggregate_id, changes, event.version).await {
            warn!(error = %err, "choreography: reservation projection update failed");
        }
    });
}

fn project_wallet(choreography: &Choreography, event: &DomainEvent) {
    let repo = choreography.wallets.clone();
    let event = event.clone();
    tokio::spawn(async move {
        let result = if event.event_type == "WALLET_CREATED" {
            let user_id = event.payload["userId"].as_str().unwrap_or(&event.aggregate_id).to_string();
            let projection = WalletProjection { user_id, balance: 0.0 };
            repo.save(&event.aggregate_id, event.version, &projection).await.map(|_| 1)
        } else {
            let delta = event.payload.get("amount").and_then(|v| v.as_f64()).unwrap_or(0.0);
            let sign = if event.event_type == "WALLET_DEBITED" { -1.0 } else { 1.0 };
            let changes = json!({"balanceDelta": sign * delta});
            repo.simple_update(&event.aggregate_id, changes).await
        };
        if let Err(err) = result {
            warn!(error = %err, "choreography: wallet projection update failed");
        }
    });
}

fn reservation_status_after(event_type: &str) -> &'static str {
    match event_type {
        "RESERVATION_PENDING_PAYMENT" => "PENDING_PAYMENT",
        "RESERVATION_CONFIRMED" => "RESERVED",
        "RESERVATION_REJECTED" => "REJECTED",
        "RESERVATION_RETURNED" => "RETURNED",
        "RESERVATION_CANCELLED" => "CANCELLED",
        "RESERVATION_MARKED_LATE" => "LATE",
        "RESERVATION_BOOK_BROUGHT" => "BOUGHT",
        "RESERVATION_RETAIL_PRICE_UPDATED" => "RESERVED",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use library_store::testing::{InMemoryEventStore, InMemoryProjectionRepository};

    fn reservation_fixture() -> Reservation {
        Reservation::create("user-1", "book-1").unwrap()
    }

    #[test]
    fn reservation_status_after_maps_every_transition_event() {
        assert_eq!(reservation_status_after("RESERVATION_CONFIRMED"), "RESERVED");
        assert_eq!(reservation_status_after("RESERVATION_REJECTED"), "REJECTED");
        assert_eq!(reservation_status_after("RESERVATION_BOOK_BROUGHT"), "BOUGHT");
    }

    #[tokio::test]
    async fn late_fee_reaching_retail_price_is_decided_by_the_handler_not_the_aggregate() {
        // The aggregate itself has no opinion on BOUGHT vs LATE -- that
        // decision belongs to the choreography handler (spec §4.2.1).
        let mut reservation = reservation_fixture();
        reservation.pending_payment().unwrap();
        reservation.confirm().unwrap();
        reservation.update_retail_price(10.0).unwrap();

        let late_fee_per_day = 2.0;
        let days_late = 6; // 6 * 2.0 = 12.0 >= retail_price 10.0
        let accrued = late_fee_per_day * days_late as f64;
        assert!(accrued >= reservation.retail_price);

        reservation.mark_bought().unwrap();
        assert_eq!(reservation.status, library_core::domain::ReservationStatus::Bought);
    }

    #[tokio::test]
    async fn load_or_create_wallet_creates_lazily_when_no_stream_exists() {
        let store = InMemoryEventStore::new();
        let events = store.get_events_for_aggregate("user-42").await.unwrap();
        assert!(events.is_empty());

        // A user with no prior wallet events gets a fresh zero-balance wallet.
        let wallet = Wallet::create("user-42").unwrap();
        assert_eq!(wallet.balance, 0.0);
        assert_eq!(wallet.id(), "user-42");
    }

    #[tokio::test]
    async fn reservation_projection_rejects_stale_updates() {
        let repo = InMemoryProjectionRepository::new();
        let affected = repo.update_if_newer("res-1", json!({"status": "RESERVED"}), 1).await.unwrap();
        assert_eq!(affected, 0, "no row exists yet, so nothing is matched");
    }
}
