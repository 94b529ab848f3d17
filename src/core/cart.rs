//! Cart snapshot - the session cart and its durable per-user mirror.
//!
//! A [`CartSnapshot`] maps offer ids to a quantity and the time the offer was
//! first added. It travels in the session as JSON under [`SESSION_KEY`]. For
//! signed-in users every mutation is mirrored into the `carts`/`cart_items`
//! tables inside one transaction through [`mutate_cart`].
//!
//! On login the session wins over the durable cart unless the session is empty
//! (see [`hydrate_from_durable`]).

use crate::{
    core::{
        cache::{CacheInvalidator, CacheKey},
        offer_pricing::OfferPrice,
    },
    entities::{Cart, CartItem, Offer, Product, cart, cart_item, offer},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{Set, TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

/// Session key the serialized cart is stored under
pub const SESSION_KEY: &str = "cart";

/// One offer held in the cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartEntry {
    /// Quantity, always at least 1
    pub quantity: u32,
    /// When the offer was first added
    pub added_at: DateTime<Utc>,
}

/// How [`CartSnapshot::add`] changes a quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityChange {
    /// Plus one
    Increment,
    /// Minus one
    Decrement,
    /// Arbitrary signed change
    Delta(i64),
    /// Absolute quantity
    Set(u32),
}

/// Session cart: offer id to quantity and first-added time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CartSnapshot {
    entries: BTreeMap<i64, CartEntry>,
}

/// One resolved line of a priced cart view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartLine {
    /// Offer with its current undiscounted price
    pub offer: OfferPrice,
    /// Quantity in the cart
    pub quantity: u32,
    /// When the offer was first added
    pub added_at: DateTime<Utc>,
}

impl CartLine {
    /// Unit price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.offer.price * Decimal::from(self.quantity)
    }
}

impl CartSnapshot {
    /// Creates an empty cart.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an offer or changes its quantity.
    ///
    /// An absent offer is inserted with the resulting quantity and `now` as its
    /// timestamp. Any result of zero or less removes the entry.
    ///
    /// # Errors
    /// Returns [`Error::InvalidQuantity`] if the resulting quantity does not fit.
    pub fn add(&mut self, offer_id: i64, change: QuantityChange, now: DateTime<Utc>) -> Result<()> {
        let current = self.entries.get(&offer_id).map_or(0, |e| i64::from(e.quantity));
        let next = match change {
            QuantityChange::Increment => current.saturating_add(1),
            QuantityChange::Decrement => current.saturating_sub(1),
            QuantityChange::Delta(delta) => current.saturating_add(delta),
            QuantityChange::Set(quantity) => i64::from(quantity),
        };

        if next <= 0 {
            self.entries.remove(&offer_id);
            return Ok(());
        }

        let quantity =
            u32::try_from(next).map_err(|_| Error::InvalidQuantity { quantity: next })?;
        self.entries
            .entry(offer_id)
            .and_modify(|entry| entry.quantity = quantity)
            .or_insert(CartEntry {
                quantity,
                added_at: now,
            });
        Ok(())
    }

    /// Removes an offer. Returns false, changing nothing, when it was absent.
    pub fn remove(&mut self, offer_id: i64) -> bool {
        self.entries.remove(&offer_id).is_some()
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// True when `offer_id` is in the cart.
    #[must_use]
    pub fn contains(&self, offer_id: i64) -> bool {
        self.entries.contains_key(&offer_id)
    }

    /// Entry for `offer_id`, if present.
    #[must_use]
    pub fn get(&self, offer_id: i64) -> Option<&CartEntry> {
        self.entries.get(&offer_id)
    }

    /// Number of distinct offers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the cart holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all quantities.
    #[must_use]
    pub fn total_quantity(&self) -> u64 {
        self.entries.values().map(|e| u64::from(e.quantity)).sum()
    }

    /// Entries ordered by offer id.
    pub fn iter(&self) -> impl Iterator<Item = (i64, &CartEntry)> {
        self.entries.iter().map(|(id, entry)| (*id, entry))
    }

    /// Serializes the cart for the session transport.
    pub fn to_session_value(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(Into::into)
    }

    /// Restores a cart from the session transport. A missing value is an empty cart.
    pub fn from_session_value(value: Option<&serde_json::Value>) -> Result<Self> {
        value.map_or_else(
            || Ok(Self::default()),
            |value| serde_json::from_value(value.clone()).map_err(Into::into),
        )
    }

    /// Resolves every entry against the live catalog.
    ///
    /// Lines are ordered by `added_at`, then offer id. If any offer no longer
    /// resolves the whole view is empty; a partial cart is never returned.
    pub async fn to_priced_view<C>(&self, conn: &C) -> Result<Vec<CartLine>>
    where
        C: ConnectionTrait,
    {
        if self.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = self.entries.keys().copied().collect();
        let resolved: HashMap<i64, OfferPrice> = Offer::find()
            .filter(offer::Column::Id.is_in(ids))
            .find_also_related(Product)
            .all(conn)
            .await?
            .into_iter()
            .filter_map(|(offer, product)| {
                product.map(|product| (offer.id, OfferPrice::from_models(&offer, &product)))
            })
            .collect();

        let mut lines = Vec::with_capacity(self.entries.len());
        for (offer_id, entry) in &self.entries {
            let Some(offer) = resolved.get(offer_id) else {
                warn!(
                    "Offer {} in cart no longer resolves, discarding cart view",
                    offer_id
                );
                return Ok(Vec::new());
            };
            lines.push(CartLine {
                offer: *offer,
                quantity: entry.quantity,
                added_at: entry.added_at,
            });
        }

        lines.sort_by_key(|line| (line.added_at, line.offer.offer_id));
        Ok(lines)
    }
}

async fn find_or_create_cart<C>(conn: &C, user_id: i64) -> Result<cart::Model>
where
    C: ConnectionTrait,
{
    if let Some(existing) = Cart::find()
        .filter(cart::Column::UserId.eq(user_id))
        .one(conn)
        .await?
    {
        return Ok(existing);
    }

    cart::ActiveModel {
        user_id: Set(user_id),
        ..Default::default()
    }
    .insert(conn)
    .await
    .map_err(Into::into)
}

/// Mirrors `snapshot` into the user's durable cart.
///
/// Lines absent from the snapshot are deleted; the rest are updated in place or
/// inserted with the snapshot's timestamp. Afterwards both hold the same
/// offers with the same quantities.
pub async fn sync_to_durable<C>(conn: &C, user_id: i64, snapshot: &CartSnapshot) -> Result<()>
where
    C: ConnectionTrait,
{
    let cart = find_or_create_cart(conn, user_id).await?;
    let stored = CartItem::find()
        .filter(cart_item::Column::CartId.eq(cart.id))
        .all(conn)
        .await?;

    let mut existing: HashMap<i64, cart_item::Model> = HashMap::new();
    let mut stale = Vec::new();
    for item in stored {
        if snapshot.contains(item.offer_id) {
            existing.insert(item.offer_id, item);
        } else {
            stale.push(item.id);
        }
    }

    if !stale.is_empty() {
        CartItem::delete_many()
            .filter(cart_item::Column::Id.is_in(stale.clone()))
            .exec(conn)
            .await?;
    }

    for (offer_id, entry) in snapshot.iter() {
        let quantity = i32::try_from(entry.quantity)?;
        match existing.remove(&offer_id) {
            Some(item) if item.quantity == quantity => {}
            Some(item) => {
                let mut active: cart_item::ActiveModel = item.into();
                active.quantity = Set(quantity);
                active.update(conn).await?;
            }
            None => {
                cart_item::ActiveModel {
                    cart_id: Set(cart.id),
                    offer_id: Set(offer_id),
                    quantity: Set(quantity),
                    created_at: Set(entry.added_at),
                    ..Default::default()
                }
                .insert(conn)
                .await?;
            }
        }
    }

    debug!(
        "Synced cart of user {}: {} lines, {} removed",
        user_id,
        snapshot.len(),
        stale.len()
    );
    Ok(())
}

/// Reads the user's durable cart into a snapshot; no cart reads as empty.
pub async fn load_durable<C>(conn: &C, user_id: i64) -> Result<CartSnapshot>
where
    C: ConnectionTrait,
{
    let Some(cart) = Cart::find()
        .filter(cart::Column::UserId.eq(user_id))
        .one(conn)
        .await?
    else {
        return Ok(CartSnapshot::default());
    };

    let items = CartItem::find()
        .filter(cart_item::Column::CartId.eq(cart.id))
        .all(conn)
        .await?;

    let mut snapshot = CartSnapshot::default();
    for item in items {
        let quantity = u32::try_from(item.quantity)?;
        snapshot.entries.insert(
            item.offer_id,
            CartEntry {
                quantity,
                added_at: item.created_at,
            },
        );
    }
    Ok(snapshot)
}

/// Reconciles the session cart with the durable cart at login.
///
/// An empty session is filled from the durable cart. A non-empty session is
/// pushed to durable storage instead, replacing whatever was there, and the
/// user's cached cart total is dropped.
pub async fn hydrate_from_durable<I>(
    db: &DatabaseConnection,
    cache: &I,
    user_id: i64,
    snapshot: &mut CartSnapshot,
) -> Result<()>
where
    I: CacheInvalidator,
{
    if snapshot.is_empty() {
        *snapshot = load_durable(db, user_id).await?;
        info!(
            "Restored {} cart lines for user {} from durable storage",
            snapshot.len(),
            user_id
        );
        return Ok(());
    }

    let txn = db.begin().await?;
    sync_to_durable(&txn, user_id, snapshot).await?;
    txn.commit().await?;
    cache.invalidate(CacheKey::Cart(user_id)).await;
    info!("Session cart of user {} replaced its durable cart", user_id);
    Ok(())
}

/// Deletes the user's durable cart and all of its lines.
pub async fn delete_durable<C>(conn: &C, user_id: i64) -> Result<()>
where
    C: ConnectionTrait,
{
    let Some(cart) = Cart::find()
        .filter(cart::Column::UserId.eq(user_id))
        .one(conn)
        .await?
    else {
        return Ok(());
    };

    CartItem::delete_many()
        .filter(cart_item::Column::CartId.eq(cart.id))
        .exec(conn)
        .await?;
    Cart::delete_by_id(cart.id).exec(conn).await?;
    Ok(())
}

/// Applies `mutation` to the session cart and, for a signed-in user, mirrors
/// the result to durable storage in the same transaction.
///
/// The session cart only changes once the durable write has committed, so a
/// failed sync leaves both sides as they were.
pub async fn mutate_cart<I, F>(
    db: &DatabaseConnection,
    cache: &I,
    user_id: Option<i64>,
    snapshot: &mut CartSnapshot,
    mutation: F,
) -> Result<()>
where
    I: CacheInvalidator,
    F: FnOnce(&mut CartSnapshot) -> Result<()>,
{
    let mut next = snapshot.clone();
    mutation(&mut next)?;

    if let Some(user_id) = user_id {
        let txn = db.begin().await?;
        sync_to_durable(&txn, user_id, &next).await?;
        txn.commit().await?;
        cache.invalidate(CacheKey::Cart(user_id)).await;
    }

    *snapshot = next;
    Ok(())
}
