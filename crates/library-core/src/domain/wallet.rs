//! # Wallet Aggregate (supplemented)
//!
//! Not named by the distilled reservation/book flows directly, but required
//! by the payment step of the reservation choreography (spec §4.5): a
//! reservation's `PENDING_PAYMENT` step debits a user's wallet, and a late
//! return's book-buy downgrade needs funds to have been available. Modeled
//! the same way as `Book`/`Reservation`: validate, emit one event, fold.

use crate::domain::aggregate::AggregateRoot;
use crate::domain::event::DomainEvent;
use crate::error::LibraryError;
use serde_json::json;

#[derive(Debug, Clone, PartialEq)]
pub struct Wallet {
    id: String,
    version: i64,
    uncommitted: Vec<DomainEvent>,

    pub user_id: String,
    pub balance: f64,
}

impl Wallet {
    /// One wallet per user, created lazily at balance zero on first funding
    /// or debit attempt. The wallet's aggregate id is the owning user's id
    /// rather than a fresh random UUID: there is exactly one wallet stream
    /// per user, so the payment choreography can locate it with a plain
    /// `getEventsForAggregate(userId)`/`get_by_id(userId)` rather than a
    /// secondary index from user to wallet.
    pub fn create(user_id: impl Into<String>) -> Result<Self, LibraryError> {
        let user_id = user_id.into();
        if user_id.trim().is_empty() {
            return Err(LibraryError::validation("wallet requires a user_id"));
        }

        let id = user_id.clone();
        let event = DomainEvent::new(id.clone(), Self::CREATED_EVENT_TYPE, json!({"userId": user_id}));

        let mut wallet = Self {
            id,
            version: 0,
            uncommitted: Vec::new(),
            user_id,
            balance: 0.0,
        };
        wallet.record_event(event);
        Ok(wallet)
    }

    /// Add funds. Rejects non-positive amounts rather than silently no-op'ing.
    pub fn fund(&mut self, amount: f64) -> Result<(), LibraryError> {
        if !(amount > 0.0) {
            return Err(LibraryError::validation("wallet fund amount must be positive"));
        }
        let event = DomainEvent::new(self.id.clone(), "WALLET_FUNDED", json!({"amount": amount}));
        self.record_event(event);
        Ok(())
    }

    /// Debit funds for a reservation payment or late-fee settlement.
    /// Insufficient balance is reported to the choreography rather than
    /// partially applied (spec §4.5's payment step treats this as a
    /// rejection, not a negative balance).
    pub fn debit(&mut self, amount: f64) -> Result<(), LibraryError> {
        if !(amount > 0.0) {
            return Err(LibraryError::validation("wallet debit amount must be positive"));
        }
        if amount > self.balance {
            return Err(LibraryError::InvalidTransition {
                aggregate: Self::KIND.to_string(),
                from: format!("balance {:.2}", self.balance),
                target: "WALLET_INSUFFICIENT_FUNDS".to_string(),
            });
        }
        let event = DomainEvent::new(self.id.clone(), "WALLET_DEBITED", json!({"amount": amount}));
        self.record_event(event);
        Ok(())
    }
}

impl AggregateRoot for Wallet {
    const KIND: &'static str = "Wallet";
    const CREATED_EVENT_TYPE: &'static str = "WALLET_CREATED";

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
            balance: 0.0,
        })
    }

    fn apply_event(&mut self, event: &DomainEvent) {
        match event.event_type.as_str() {
            "WALLET_FUNDED" => {
                if let Some(amount) = event.payload.get("amount").and_then(|v| v.as_f64()) {
                    self.balance += amount;
                }
            }
            "WALLET_DEBITED" => {
                if let Some(amount) = event.payload.get("amount").and_then(|v| v.as_f64()) {
                    self.balance -= amount;
                }
            }
            other => {
                tracing::debug!(event_type = other, "wallet: ignoring unknown event type");
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
    use crate::domain::aggregate::rehydrate;

    #[test]
    fn wallet_id_is_the_owning_user_id() {
        let wallet = Wallet::create("user-1").unwrap();
        assert_eq!(wallet.id(), "user-1");
    }

    #[test]
    fn fund_then_debit_updates_balance() {
        let mut wallet = Wallet::create("user-1").unwrap();
        wallet.fund(20.0).unwrap();
        assert_eq!(wallet.balance, 20.0);

        wallet.debit(12.99).unwrap();
        assert!((wallet.balance - 7.01).abs() < 1e-9);
    }

    #[test]
    fn debit_beyond_balance_is_rejected_without_mutation() {
        let mut wallet = Wallet::create("user-1").unwrap();
        wallet.fund(5.0).unwrap();
        let before = wallet.clone();

        let result = wallet.debit(10.0);
        assert!(matches!(result, Err(LibraryError::InvalidTransition { .. })));
        assert_eq!(wallet, before);
    }

    #[test]
    fn rehydrate_reconstructs_balance_from_events() {
        let mut wallet = Wallet::create("user-1").unwrap();
        wallet.fund(20.0).unwrap();
        wallet.debit(12.99).unwrap();
        let events = wallet.take_uncommitted_events();

        let rebuilt: Wallet = rehydrate(events).unwrap();
        assert!((rebuilt.balance - 7.01).abs() < 1e-9);
        assert_eq!(rebuilt.version(), 3);
    }
}
