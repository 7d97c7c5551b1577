use log::*;
use taskpay_engine::{
    db_types::Order,
    events::EventProducers,
    LifecycleSettings,
    OrderLifecycleApi,
    SqliteDatabase,
};
use tokio::task::JoinHandle;

use crate::gateway::NullEmailGateway;

/// Starts the reconciliation worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// Each tick refunds every order whose confirmation window has lapsed. The scan is a deadline comparison, not an
/// edge-triggered event, so a tick that fails (or a server that was down) is caught up by the next one.
pub fn start_reconciliation_worker(
    db: SqliteDatabase,
    producers: EventProducers,
    settings: LifecycleSettings,
    interval: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        let api = OrderLifecycleApi::new(db, NullEmailGateway, producers, settings);
        info!("🕰️ Confirmation-window reconciliation worker started");
        loop {
            timer.tick().await;
            debug!("🕰️ Running the expired-order refund scan");
            match api.expire_overdue_orders().await {
                Ok(refunded) if refunded.is_empty() => {
                    trace!("🕰️ No lapsed confirmation windows");
                },
                Ok(refunded) => {
                    info!("🕰️ {} orders refunded: {}", refunded.len(), order_list(&refunded));
                },
                Err(e) => {
                    error!("🕰️ Error running the expired-order refund scan: {e}");
                },
            }
        }
    })
}

fn order_list(orders: &[Order]) -> String {
    orders
        .iter()
        .map(|o| format!("[#{}] requester: {} amount: {}", o.id, o.requester, o.amount))
        .collect::<Vec<String>>()
        .join(", ")
}
