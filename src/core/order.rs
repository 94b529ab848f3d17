//! Order assembly - turns a priced cart into a durable order.
//!
//! [`place_order`] runs as a single database transaction: header, frozen lines,
//! the first status change and finally the deletion of the durable cart. The
//! session cart is cleared only after the commit, so a failure at any step
//! leaves the customer's cart exactly as it was.

use crate::{
    config::Settings,
    core::{
        cache::{CacheInvalidator, CacheKey},
        cart::{CartLine, CartSnapshot, delete_durable},
        discount::{forget_expired, load_rule_set},
        discount_service::DiscountService,
        money::to_cents,
    },
    entities::{
        DeliveryKind, Order, OrderLine, OrderStatus, OrderStatusChange, order, order_line,
        order_status_change,
    },
    errors::{Error, Result, ValidationErrors},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Where the order ships.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryAddress {
    /// Delivery city
    pub city: String,
    /// Street address
    pub address: String,
}

impl DeliveryAddress {
    fn validate(&self) -> Result<()> {
        let mut errors = ValidationErrors::new();
        if self.city.trim().is_empty() {
            errors.add(Some("city"), "City is required");
        }
        if self.address.trim().is_empty() {
            errors.add(Some("address"), "Address is required");
        }
        errors.into_result()
    }
}

/// Totals the checkout page shows for each delivery option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryQuote {
    /// Discounted cart total before delivery
    pub items_total: Decimal,
    /// Total with ordinary delivery
    pub ordinary_total: Decimal,
    /// Total with express delivery
    pub express_total: Decimal,
    /// True when ordinary delivery is free
    pub free_shipping: bool,
}

/// Ordinary delivery is free when every line comes from one shop and the cart
/// total is strictly above the threshold.
#[must_use]
pub fn qualifies_for_free_shipping(
    settings: &Settings,
    lines: &[CartLine],
    total_price: Decimal,
) -> bool {
    let shops: BTreeSet<i64> = lines.iter().map(|line| line.offer.shop_id).collect();
    shops.len() == 1 && total_price > settings.free_shipping_threshold
}

/// Fee charged for `delivery`.
#[must_use]
pub fn delivery_fee(
    settings: &Settings,
    lines: &[CartLine],
    total_price: Decimal,
    delivery: DeliveryKind,
) -> Decimal {
    match delivery {
        DeliveryKind::Express => settings.express_delivery_fee,
        DeliveryKind::Ordinary if qualifies_for_free_shipping(settings, lines, total_price) => {
            Decimal::ZERO
        }
        DeliveryKind::Ordinary => settings.standard_delivery_fee,
    }
}

/// Prices both delivery options for the current cart.
pub async fn delivery_quote<C>(
    conn: &C,
    settings: &Settings,
    snapshot: &CartSnapshot,
    now: DateTime<Utc>,
) -> Result<DeliveryQuote>
where
    C: ConnectionTrait,
{
    let lines = snapshot.to_priced_view(conn).await?;
    if lines.is_empty() {
        return Err(Error::EmptyCart);
    }
    let rules = load_rule_set(conn, now).await?;
    let service = DiscountService::new(&lines, &rules, now);
    let items_total = service.total_after_discount();
    let total_price = service.total_price();

    Ok(DeliveryQuote {
        items_total,
        ordinary_total: items_total
            + delivery_fee(settings, &lines, total_price, DeliveryKind::Ordinary),
        express_total: items_total
            + delivery_fee(settings, &lines, total_price, DeliveryKind::Express),
        free_shipping: qualifies_for_free_shipping(settings, &lines, total_price),
    })
}

/// Places an order for the user's cart.
///
/// Each line freezes the current unit price and quantity. The order records
/// the undiscounted subtotal, the winning discount, the delivery fee and the
/// amount to pay, and moves from `created` to `pending_payment`.
///
/// # Errors
/// [`Error::EmptyCart`] when the cart has no resolvable lines, a validation
/// error for a blank address, or any database error. Nothing is written in
/// any of these cases.
#[allow(clippy::too_many_arguments)]
pub async fn place_order<I>(
    db: &DatabaseConnection,
    settings: &Settings,
    cache: &I,
    user_id: i64,
    snapshot: &mut CartSnapshot,
    delivery: DeliveryKind,
    address: DeliveryAddress,
    now: DateTime<Utc>,
) -> Result<order::Model>
where
    I: CacheInvalidator,
{
    address.validate()?;

    let txn = db.begin().await?;

    let lines = snapshot.to_priced_view(&txn).await?;
    if lines.is_empty() {
        return Err(Error::EmptyCart);
    }
    let rules = load_rule_set(&txn, now).await?;
    let service = DiscountService::new(&lines, &rules, now);
    let fee = delivery_fee(settings, &lines, service.total_price(), delivery);

    let header = order::ActiveModel {
        user_id: Set(user_id),
        status: Set(OrderStatus::Created),
        delivery: Set(delivery),
        city: Set(address.city.trim().to_string()),
        address: Set(address.address.trim().to_string()),
        subtotal_cents: Set(to_cents(service.total_price())?),
        discount_cents: Set(to_cents(service.total_price() - service.total_after_discount())?),
        delivery_cents: Set(to_cents(fee)?),
        total_cents: Set(to_cents(service.total_after_discount() + fee)?),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    for line in &lines {
        order_line::ActiveModel {
            order_id: Set(header.id),
            offer_id: Set(line.offer.offer_id),
            quantity: Set(i32::try_from(line.quantity)?),
            unit_price_cents: Set(to_cents(line.offer.price)?),
            line_total_cents: Set(to_cents(line.line_total())?),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
    }

    let placed = transition(&txn, header, OrderStatus::PendingPayment, now).await?;

    delete_durable(&txn, user_id).await?;
    txn.commit().await?;

    snapshot.clear();
    cache.invalidate(CacheKey::Cart(user_id)).await;
    forget_expired(cache, &rules.expired).await;

    info!(
        "Placed order {} for user {}: {} lines, total {}",
        placed.id,
        user_id,
        lines.len(),
        service.total_after_discount() + fee
    );
    Ok(placed)
}

async fn transition<C>(
    conn: &C,
    current: order::Model,
    status: OrderStatus,
    now: DateTime<Utc>,
) -> Result<order::Model>
where
    C: ConnectionTrait,
{
    if current.status == status {
        return Ok(current);
    }

    let from_status = current.status;
    let order_id = current.id;
    let mut active: order::ActiveModel = current.into();
    active.status = Set(status);
    let updated = active.update(conn).await?;

    order_status_change::ActiveModel {
        order_id: Set(order_id),
        from_status: Set(from_status),
        to_status: Set(status),
        changed_at: Set(now),
        ..Default::default()
    }
    .insert(conn)
    .await?;

    debug!(
        "Order {} moved from {} to {}",
        order_id,
        from_status.as_str(),
        status.as_str()
    );
    Ok(updated)
}

/// Sets an order's status and logs the change.
///
/// Setting the status an order already has changes nothing and logs nothing.
pub async fn update_order_status<C>(
    conn: &C,
    order_id: i64,
    status: OrderStatus,
    now: DateTime<Utc>,
) -> Result<order::Model>
where
    C: ConnectionTrait,
{
    let current = get_order(conn, order_id).await?;
    transition(conn, current, status, now).await
}

/// Loads an order header.
pub async fn get_order<C>(conn: &C, order_id: i64) -> Result<order::Model>
where
    C: ConnectionTrait,
{
    Order::find_by_id(order_id)
        .one(conn)
        .await?
        .ok_or(Error::OrderNotFound { order_id })
}

/// Frozen lines of an order.
pub async fn order_lines<C>(conn: &C, order_id: i64) -> Result<Vec<order_line::Model>>
where
    C: ConnectionTrait,
{
    OrderLine::find()
        .filter(order_line::Column::OrderId.eq(order_id))
        .order_by_asc(order_line::Column::Id)
        .all(conn)
        .await
        .map_err(Into::into)
}

/// Status changes of an order, oldest first.
pub async fn status_history<C>(conn: &C, order_id: i64) -> Result<Vec<order_status_change::Model>>
where
    C: ConnectionTrait,
{
    OrderStatusChange::find()
        .filter(order_status_change::Column::OrderId.eq(order_id))
        .order_by_asc(order_status_change::Column::Id)
        .all(conn)
        .await
        .map_err(Into::into)
}
