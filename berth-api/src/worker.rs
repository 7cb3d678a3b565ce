use berth_booking::BookingService;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Periodically delete booking headers left without passengers.
pub async fn start_reconciliation_worker(
    bookings: Arc<BookingService>,
    interval: Duration,
    grace: chrono::Duration,
) {
    info!("Reconciliation worker started, sweeping every {:?}", interval);
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;
        match bookings.reconcile_orphans(grace).await {
            Ok(0) => {}
            Ok(removed) => info!("Reconciliation removed {} orphaned header(s)", removed),
            Err(e) => error!("Reconciliation sweep failed: {}", e),
        }
    }
}
