mod choreography;
mod config;

use std::sync::Arc;

use library_bus::EventBus;
use library_core::config::LibraryConfig;
use library_store::connection::init_pool;
use library_store::{BookProjectionRepository, PgEventStore, ReservationProjectionRepository, WalletProjectionRepository};
use tracing::{error, info};

use crate::choreography::Choreography;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    config::init_tracing();

    if let Err(err) = run().await {
        error!(error = %err, "library-substrate: fatal startup error");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let settings = LibraryConfig::from_env()?;
    info!(log_level = %settings.log_level, "library-substrate: configuration loaded");

    let pool = init_pool(&settings.store)?;
    let event_store = Arc::new(PgEventStore::new(pool.clone()));
    let books = Arc::new(BookProjectionRepository::new(pool.clone()));
    let reservations = Arc::new(ReservationProjectionRepository::new(pool.clone()));
    let wallets = Arc::new(WalletProjectionRepository::new(pool));

    let bus = EventBus::new(settings.broker.clone(), "library-substrate");
    bus.init().await?;

    let choreography = Arc::new(Choreography {
        event_store,
        bus: bus.clone(),
        books,
        reservations,
        wallets,
        reservation_fee: settings.book_fees.reservation_fee,
        late_fee_per_day: settings.book_fees.late_fee_per_day,
    });
    choreography::register(choreography).await?;

    bus.start_consuming().await?;
    info!("library-substrate: consuming events, awaiting shutdown signal");

    tokio::signal::ctrl_c().await?;
    info!("library-substrate: shutdown signal received");
    bus.shutdown().await?;

    Ok(())
}
