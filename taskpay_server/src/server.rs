use log::*;
use taskpay_engine::{
    create_database_if_missing,
    events::{EventHandlers, EventHooks},
    run_migrations,
    traits::EscrowDatabase,
    LifecycleSettings,
    SqliteDatabase,
};

use crate::{config::ServerConfig, errors::ServerError, reconciliation_worker::start_reconciliation_worker};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    create_database_if_missing(&config.database_url)
        .await
        .map_err(|e| ServerError::InitializeError(format!("Could not create the database. {e}")))?;
    let mut db = SqliteDatabase::new_with_url(&config.database_url, 25).await?;
    if config.auto_migrate {
        run_migrations(db.pool())
            .await
            .map_err(|e| ServerError::InitializeError(format!("Could not run the database migrations. {e}")))?;
    }
    info!("🗃️ Connected to the database at {}", config.database_url);

    // Party notifications are advisory. Until a chat front-end is attached they go to the log.
    let mut hooks = EventHooks::default();
    hooks
        .on_order_completed(|ev| {
            Box::pin(async move {
                let worker = ev.order.worker.map(|w| w.to_string()).unwrap_or_else(|| "?".to_string());
                info!("📬️ Order #{} confirmed. {} paid out to worker {worker}.", ev.order.id, ev.order.amount);
            })
        })
        .on_order_refunded(|ev| {
            Box::pin(async move {
                info!(
                    "📬️ Order #{} expired. {} refunded to requester {}.",
                    ev.order.id, ev.order.amount, ev.order.requester
                );
            })
        });
    let handlers = EventHandlers::new(128, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let settings = LifecycleSettings { confirm_window: config.confirm_window, code_digits: config.code_length };
    let worker = start_reconciliation_worker(db.clone(), producers, settings, config.reconcile_interval);

    info!("🚀️ The taskpay gateway is running. Press Ctrl-C to shut down.");
    tokio::signal::ctrl_c().await?;
    info!("🚀️ Shutting down");
    worker.abort();
    db.close().await?;
    Ok(())
}
