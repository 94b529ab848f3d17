//! Payment queue - submission and processing of card payments.
//!
//! Submitting a payment only enqueues it. A background worker later charges
//! each entry through a [`PaymentGateway`], sets the order's status and deletes
//! the entry, all in one transaction per entry. Status is set absolutely, so a
//! redelivered entry never moves an order past its final status.

use crate::{
    core::order::{get_order, update_order_status},
    entities::{OrderStatus, PaymentQueue, payment_queue},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{QueryOrder, QuerySelect, Set, TransactionTrait, prelude::*};
use tracing::{debug, error, info, warn};

/// Smallest accepted card token
pub const CARD_NUMBER_MIN: u64 = 10_000_000;
/// Largest accepted card token
pub const CARD_NUMBER_MAX: u64 = 99_999_999;

/// Result of charging a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// The charge went through
    Paid,
    /// The charge was declined
    Failed,
}

impl PaymentOutcome {
    /// Order status this outcome leads to.
    #[must_use]
    pub const fn order_status(self) -> OrderStatus {
        match self {
            Self::Paid => OrderStatus::Paid,
            Self::Failed => OrderStatus::PaymentFailed,
        }
    }
}

/// Something that can charge a card token.
pub trait PaymentGateway {
    /// Charges `card_number` and reports the outcome.
    fn charge(&self, card_number: u64) -> PaymentOutcome;
}

/// Stand-in gateway: a token is paid when it is even and does not end in 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct FakeGateway;

impl PaymentGateway for FakeGateway {
    fn charge(&self, card_number: u64) -> PaymentOutcome {
        if card_number % 2 == 0 && card_number % 10 != 0 {
            PaymentOutcome::Paid
        } else {
            PaymentOutcome::Failed
        }
    }
}

/// Checks that a card token has exactly eight digits.
pub fn validate_card_number(card_number: u64) -> Result<()> {
    if (CARD_NUMBER_MIN..=CARD_NUMBER_MAX).contains(&card_number) {
        Ok(())
    } else {
        Err(Error::InvalidCardNumber { card_number })
    }
}

/// Enqueues a payment for an order awaiting payment.
///
/// # Errors
/// [`Error::InvalidCardNumber`] for a malformed token, [`Error::OrderNotFound`]
/// for an unknown order and [`Error::PaymentNotAllowed`] when the order is not
/// `pending_payment` or `payment_failed`.
pub async fn submit_payment(
    db: &DatabaseConnection,
    order_id: i64,
    card_number: u64,
    now: DateTime<Utc>,
) -> Result<payment_queue::Model> {
    validate_card_number(card_number)?;

    let order = get_order(db, order_id).await?;
    if !order.status.accepts_payment() {
        return Err(Error::PaymentNotAllowed {
            order_id,
            status: order.status.as_str().to_string(),
        });
    }

    let entry = payment_queue::ActiveModel {
        order_id: Set(order_id),
        card_number: Set(i64::try_from(card_number)?),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!("Queued payment {} for order {}", entry.id, order_id);
    Ok(entry)
}

/// Processes one queue entry in its own transaction.
///
/// Returns `None` when the entry is already gone, which makes redelivery a no-op.
pub async fn process_entry<G>(
    db: &DatabaseConnection,
    gateway: &G,
    entry_id: i64,
    now: DateTime<Utc>,
) -> Result<Option<PaymentOutcome>>
where
    G: PaymentGateway,
{
    let txn = db.begin().await?;

    let Some(entry) = PaymentQueue::find_by_id(entry_id).one(&txn).await? else {
        debug!("Payment {} already processed", entry_id);
        return Ok(None);
    };

    let card_number = u64::try_from(entry.card_number)?;
    let outcome = gateway.charge(card_number);
    update_order_status(&txn, entry.order_id, outcome.order_status(), now).await?;
    PaymentQueue::delete_by_id(entry.id).exec(&txn).await?;

    txn.commit().await?;

    match outcome {
        PaymentOutcome::Paid => info!("Order {} paid", entry.order_id),
        PaymentOutcome::Failed => warn!("Payment for order {} failed", entry.order_id),
    }
    Ok(Some(outcome))
}

/// Counts from one pass over the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueuePassSummary {
    /// Entries charged successfully
    pub paid: usize,
    /// Entries declined
    pub failed: usize,
    /// Entries left in place because processing errored
    pub errors: usize,
}

impl QueuePassSummary {
    /// Entries that reached an outcome.
    #[must_use]
    pub const fn processed(&self) -> usize {
        self.paid + self.failed
    }
}

/// Processes every entry queued at the start of the pass, oldest first.
///
/// An entry that errors is logged and left for the next pass; the remaining
/// entries are still processed.
pub async fn process_payment_queue<G>(
    db: &DatabaseConnection,
    gateway: &G,
    now: DateTime<Utc>,
) -> Result<QueuePassSummary>
where
    G: PaymentGateway,
{
    let ids: Vec<i64> = PaymentQueue::find()
        .select_only()
        .column(payment_queue::Column::Id)
        .order_by_asc(payment_queue::Column::Id)
        .into_tuple()
        .all(db)
        .await?;

    let mut summary = QueuePassSummary::default();
    for id in ids {
        match process_entry(db, gateway, id, now).await {
            Ok(Some(PaymentOutcome::Paid)) => summary.paid += 1,
            Ok(Some(PaymentOutcome::Failed)) => summary.failed += 1,
            Ok(None) => {}
            Err(e) => {
                error!("Failed to process payment {}: {}", id, e);
                summary.errors += 1;
            }
        }
    }

    if summary.processed() > 0 || summary.errors > 0 {
        info!(
            "Payment pass done: {} paid, {} failed, {} errors",
            summary.paid, summary.failed, summary.errors
        );
    }
    Ok(summary)
}
