//! # Reservation Aggregate — state machine (spec §4.2.1)
//!
//! The representative aggregate: a strict state machine guarded by
//! `ReservationStatus` transitions. Every command method checks the guard
//! before emitting; a rejected command emits **no** event and mutates
//! **no** state (spec §8 property 5).

use crate::domain::aggregate::AggregateRoot;
use crate::domain::event::DomainEvent;
use crate::error::LibraryError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Created,
    PendingPayment,
    Reserved,
    Borrowed,
    Late,
    Returned,
    Cancelled,
    Rejected,
    Bought,
}

impl ReservationStatus {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::PendingPayment => "PENDING_PAYMENT",
            Self::Reserved => "RESERVED",
            Self::Borrowed => "BORROWED",
            Self::Late => "LATE",
            Self::Returned => "RETURNED",
            Self::Cancelled => "CANCELLED",
            Self::Rejected => "REJECTED",
            Self::Bought => "BOUGHT",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    id: String,
    version: i64,
    uncommitted: Vec<DomainEvent>,

    pub user_id: String,
    pub book_id: String,
    pub status: ReservationStatus,
    pub retail_price: f64,
    pub due_date: Option<DateTime<Utc>>,
}

impl Reservation {
    pub fn create(user_id: impl Into<String>, book_id: impl Into<String>) -> Result<Self, LibraryError> {
        let user_id = user_id.into();
        let book_id = book_id.into();
        if user_id.trim().is_empty() || book_id.trim().is_empty() {
            return Err(LibraryError::validation("reservation requires user_id and book_id"));
        }

        let id = Uuid::new_v4().to_string();
        let event = DomainEvent::new(
            id.clone(),
            Self::CREATED_EVENT_TYPE,
            json!({"userId": user_id, "bookId": book_id}),
        );

        let mut reservation = Self {
            id,
            version: 0,
            uncommitted: Vec::new(),
            user_id,
            book_id,
            status: ReservationStatus::Created,
            retail_price: 0.0,
            due_date: None,
        };
        reservation.record_event(event);
        Ok(reservation)
    }

    fn reject_transition(&self, target: &str) -> LibraryError {
        LibraryError::InvalidTransition {
            aggregate: Self::KIND.to_string(),
            from: self.status.as_str().to_string(),
            target: target.to_string(),
        }
    }

    /// CREATED -> PENDING_PAYMENT
    pub fn pending_payment(&mut self) -> Result<(), LibraryError> {
        if self.status != ReservationStatus::Created {
            return Err(self.reject_transition("PENDING_PAYMENT"));
        }
        let event = DomainEvent::new(self.id.clone(), "RESERVATION_PENDING_PAYMENT", json!({}));
        self.record_event(event);
        Ok(())
    }

    /// PENDING_PAYMENT -> RESERVED
    pub fn confirm(&mut self) -> Result<(), LibraryError> {
        if self.status != ReservationStatus::PendingPayment {
            return Err(self.reject_transition("RESERVED"));
        }
        let event = DomainEvent::new(self.id.clone(), "RESERVATION_CONFIRMED", json!({}));
        self.record_event(event);
        Ok(())
    }

    /// {CREATED, PENDING_PAYMENT, RESERVATION_BOOK_LIMIT_REACH} -> REJECTED
    pub fn reject(&mut self, reason: impl Into<String>) -> Result<(), LibraryError> {
        if !matches!(
            self.status,
            ReservationStatus::Created | ReservationStatus::PendingPayment
        ) {
            return Err(self.reject_transition("REJECTED"));
        }
        let event = DomainEvent::new(
            self.id.clone(),
            "RESERVATION_REJECTED",
            json!({"reason": reason.into()}),
        );
        self.record_event(event);
        Ok(())
    }

    /// {RESERVED, BORROWED, LATE} -> RETURNED. `days_late` is 0 for an
    /// on-time return; `late_fee_applied` is the fee the choreography
    /// already computed (and confirmed is under `retail_price`, since once
    /// it reaches `retail_price` the reservation is bought, not returned).
    pub fn mark_returned(
        &mut self,
        days_late: i64,
        retail_price: f64,
        late_fee_applied: f64,
    ) -> Result<(), LibraryError> {
        if !matches!(
            self.status,
            ReservationStatus::Reserved | ReservationStatus::Borrowed | ReservationStatus::Late
        ) {
            return Err(self.reject_transition("RETURNED"));
        }
        let event = DomainEvent::new(
            self.id.clone(),
            "RESERVATION_RETURNED",
            json!({
                "daysLate": days_late.max(0),
                "retailPrice": if retail_price.is_finite() { retail_price } else { 0.0 },
                "lateFeeApplied": format!("{:.1}", late_fee_applied.max(0.0)),
            }),
        );
        self.record_event(event);
        Ok(())
    }

    /// {RESERVED, BORROWED, LATE} -> CANCELLED
    pub fn cancel(&mut self) -> Result<(), LibraryError> {
        if !matches!(
            self.status,
            ReservationStatus::Reserved | ReservationStatus::Borrowed | ReservationStatus::Late
        ) {
            return Err(self.reject_transition("CANCELLED"));
        }
        let event = DomainEvent::new(self.id.clone(), "RESERVATION_CANCELLED", json!({}));
        self.record_event(event);
        Ok(())
    }

    /// {RESERVED, BORROWED} -> unchanged status, updates `retail_price`.
    pub fn update_retail_price(&mut self, retail_price: f64) -> Result<(), LibraryError> {
        if !matches!(self.status, ReservationStatus::Reserved | ReservationStatus::Borrowed) {
            return Err(self.reject_transition("RETAIL_PRICE_UPDATED"));
        }
        let event = DomainEvent::new(
            self.id.clone(),
            "RESERVATION_RETAIL_PRICE_UPDATED",
            json!({"retailPrice": retail_price}),
        );
        self.record_event(event);
        Ok(())
    }

    /// Emitted by the choreography's late-return handler rather than derived
    /// by the aggregate alone (spec §4.2.1). `days_late` and the resulting
    /// status (`LATE` vs still `RESERVED`/`BORROWED`) are caller-supplied.
    pub fn mark_late(&mut self, days_late: i64, retail_price: f64) -> Result<(), LibraryError> {
        if !matches!(self.status, ReservationStatus::Reserved | ReservationStatus::Borrowed) {
            return Err(self.reject_transition("LATE"));
        }
        let event = DomainEvent::new(
            self.id.clone(),
            "RESERVATION_MARKED_LATE",
            json!({"daysLate": days_late.max(0), "retailPrice": if retail_price.is_finite() { retail_price } else { 0.0 }}),
        );
        self.record_event(event);
        Ok(())
    }

    /// Downgrade: accumulated late fee reached `retail_price` (spec §4.2.1).
    pub fn mark_bought(&mut self) -> Result<(), LibraryError> {
        if !matches!(
            self.status,
            ReservationStatus::Reserved | ReservationStatus::Borrowed | ReservationStatus::Late
        ) {
            return Err(self.reject_transition("BOUGHT"));
        }
        let event = DomainEvent::new(self.id.clone(), "RESERVATION_BOOK_BROUGHT", json!({}));
        self.record_event(event);
        Ok(())
    }
}

impl AggregateRoot for Reservation {
    const KIND: &'static str = "Reservation";
    const CREATED_EVENT_TYPE: &'static str = "RESERVATION_CREATED";

    fn id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    fn uncommitted_events(&self) -> &[DomainEvent] {
        &self.uncommitted
    }

    fn take_uncommitted_events(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.uncommitted)
    }

    fn from_created_event(event: &DomainEvent) -> Result<Self, LibraryError> {
        Ok(Self {
            id: event.aggregate_id.clone(),
            version: 0,
            uncommitted: Vec::new(),
            user_id: event.payload["userId"].as_str().unwrap_or_default().to_string(),
            book_id: event.payload["bookId"].as_str().unwrap_or_default().to_string(),
            status: ReservationStatus::Created,
            retail_price: 0.0,
            due_date: None,
        })
    }

    fn apply_event(&mut self, event: &DomainEvent) {
        match event.event_type.as_str() {
            "RESERVATION_PENDING_PAYMENT" => self.status = ReservationStatus::PendingPayment,
            "RESERVATION_CONFIRMED" => self.status = ReservationStatus::Reserved,
            "RESERVATION_REJECTED" => self.status = ReservationStatus::Rejected,
            "RESERVATION_RETURNED" => self.status = ReservationStatus::Returned,
            "RESERVATION_CANCELLED" => self.status = ReservationStatus::Cancelled,
            "RESERVATION_MARKED_LATE" => self.status = ReservationStatus::Late,
            "RESERVATION_BOOK_BROUGHT" => self.status = ReservationStatus::Bought,
            "RESERVATION_RETAIL_PRICE_UPDATED" => {
                if let Some(price) = event.payload.get("retailPrice").and_then(|v| v.as_f64()) {
                    self.retail_price = price;
                }
            }
            other => {
                tracing::debug!(event_type = other, "reservation: ignoring unknown event type");
            }
        }
    }

    fn push_uncommitted(&mut self, event: DomainEvent) {
        self.uncommitted.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_create_to_reserved() {
        let mut reservation = Reservation::create("user-1", "book-1").unwrap();
        assert_eq!(reservation.status, ReservationStatus::Created);

        reservation.pending_payment().unwrap();
        assert_eq!(reservation.status, ReservationStatus::PendingPayment);

        reservation.confirm().unwrap();
        assert_eq!(reservation.status, ReservationStatus::Reserved);
    }

    #[test]
    fn illegal_transition_emits_no_event_and_no_mutation() {
        let mut reservation = Reservation::create("user-1", "book-1").unwrap();
        let before = reservation.clone();

        let result = reservation.confirm(); // CREATED -> RESERVED is not a legal direct transition
        assert!(matches!(result, Err(LibraryError::InvalidTransition { .. })));
        assert_eq!(reservation, before);
    }

    #[test]
    fn late_return_above_retail_price_downgrades_to_bought_via_choreography() {
        let mut reservation = Reservation::create("user-1", "book-1").unwrap();
        reservation.pending_payment().unwrap();
        reservation.confirm().unwrap();
        reservation.update_retail_price(10.0).unwrap();

        reservation.mark_late(60, 10.0).unwrap();
        assert_eq!(reservation.status, ReservationStatus::Late);

        // choreography decides accumulated late fee >= retail_price
        reservation.mark_bought().unwrap();
        assert_eq!(reservation.status, ReservationStatus::Bought);
    }

    #[test]
    fn late_return_under_retail_price_carries_fee_fields() {
        // spec §8 E3: dueDate=now-3d, retailPrice=36, fee/day=0.2 -> daysLate=3,
        // lateFeeApplied="0.6", final status RETURNED.
        let mut reservation = Reservation::create("user-1", "book-1").unwrap();
        reservation.pending_payment().unwrap();
        reservation.confirm().unwrap();
        reservation.update_retail_price(36.0).unwrap();

        reservation.mark_returned(3, 36.0, 0.6).unwrap();
        assert_eq!(reservation.status, ReservationStatus::Returned);

        let event = reservation.uncommitted_events().last().unwrap();
        assert_eq!(event.event_type, "RESERVATION_RETURNED");
        assert_eq!(event.payload["daysLate"], 3);
        assert_eq!(event.payload["retailPrice"], 36.0);
        assert_eq!(event.payload["lateFeeApplied"], "0.6");
    }

    #[test]
    fn on_time_return_reports_zero_late_fee() {
        // spec §8 boundary case: daysLate=0 -> late_fee_applied = "0.0".
        let mut reservation = Reservation::create("user-1", "book-1").unwrap();
        reservation.pending_payment().unwrap();
        reservation.confirm().unwrap();

        reservation.mark_returned(0, 0.0, 0.0).unwrap();
        let event = reservation.uncommitted_events().last().unwrap();
        assert_eq!(event.payload["daysLate"], 0);
        assert_eq!(event.payload["lateFeeApplied"], "0.0");
    }

    #[test]
    fn reject_allowed_from_created_or_pending_payment_only() {
        let mut reservation = Reservation::create("user-1", "book-1").unwrap();
        reservation.reject("book unavailable").unwrap();
        assert_eq!(reservation.status, ReservationStatus::Rejected);

        let mut confirmed = Reservation::create("user-1", "book-1").unwrap();
        confirmed.pending_payment().unwrap();
        confirmed.confirm().unwrap();
        assert!(matches!(confirmed.reject("too late"), Err(LibraryError::InvalidTransition { .. })));
    }
}
