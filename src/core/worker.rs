//! Background loops: the payment queue worker and the discount expiry sweep.
//!
//! Both poll on a fixed interval and stop when the shutdown channel flips to
//! `true` or its sender is dropped. A failed pass is logged and retried on the
//! next tick.

use crate::core::{
    cache::CacheInvalidator,
    discount::{deactivate_expired_discounts, forget_expired},
    payment::{PaymentGateway, process_payment_queue},
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info, instrument};

/// Runs payment queue passes until shutdown.
#[instrument(skip_all, fields(every = ?every))]
pub async fn run_payment_worker<G>(
    db: DatabaseConnection,
    gateway: G,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) where
    G: PaymentGateway,
{
    info!("Payment worker started");
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = process_payment_queue(&db, &gateway, Utc::now()).await {
                    error!("Payment pass failed: {}", e);
                }
            }
            changed = shutdown.changed() => {
                // A dropped sender counts as shutdown
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!("Payment worker stopped");
}

/// Switches off expired discounts until shutdown, dropping cached prices
/// whenever a rule goes away.
#[instrument(skip_all, fields(every = ?every))]
pub async fn run_discount_sweep<I>(
    db: DatabaseConnection,
    cache: I,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) where
    I: CacheInvalidator,
{
    info!("Discount sweep started");
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match deactivate_expired_discounts(&db, Utc::now()).await {
                    Ok(expired) => forget_expired(&cache, &expired).await,
                    Err(e) => error!("Discount sweep failed: {}", e),
                }
            }
            changed = shutdown.changed() => {
                // A dropped sender counts as shutdown
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!("Discount sweep stopped");
}
