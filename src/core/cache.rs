//! Pricing cache with explicit invalidation.
//!
//! Sale prices per offer and discounted cart totals per user are cached here.
//! Whoever changes an input to a cached value calls
//! [`CacheInvalidator::invalidate`] with the matching [`CacheKey`]. Entries
//! also carry the end time of the earliest discount that priced them and are
//! ignored from then on.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Which cached values to drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Sale price of one offer
    Offer(i64),
    /// Sale prices of every offer
    AllOffers,
    /// Discounted cart total of one user
    Cart(i64),
    /// Discounted cart totals of every user
    AllCarts,
}

/// Receives invalidation events from code that mutates pricing inputs.
#[allow(async_fn_in_trait)]
pub trait CacheInvalidator {
    /// Drops the values named by `key`.
    async fn invalidate(&self, key: CacheKey);
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    value: Decimal,
    valid_until: Option<DateTime<Utc>>,
}

impl Entry {
    fn live_at(self, now: DateTime<Utc>) -> Option<Decimal> {
        self.valid_until
            .is_none_or(|until| now < until)
            .then_some(self.value)
    }
}

/// In-process cache shared by cloning; clones see the same maps.
#[derive(Debug, Clone, Default)]
pub struct PricingCache {
    sale_prices: Arc<RwLock<HashMap<i64, Entry>>>,
    cart_totals: Arc<RwLock<HashMap<i64, Entry>>>,
}

impl PricingCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached sale price of `offer_id`, unless missing or past its end time.
    pub async fn sale_price(&self, offer_id: i64, now: DateTime<Utc>) -> Option<Decimal> {
        let entry = self.sale_prices.read().await.get(&offer_id).copied()?;
        entry.live_at(now)
    }

    /// Stores the sale price of `offer_id`, usable until `valid_until` when set.
    pub async fn store_sale_price(
        &self,
        offer_id: i64,
        price: Decimal,
        valid_until: Option<DateTime<Utc>>,
    ) {
        let entry = Entry {
            value: price,
            valid_until,
        };
        self.sale_prices.write().await.insert(offer_id, entry);
    }

    /// Cached discounted cart total of `user_id`, unless missing or past its end time.
    pub async fn cart_total(&self, user_id: i64, now: DateTime<Utc>) -> Option<Decimal> {
        let entry = self.cart_totals.read().await.get(&user_id).copied()?;
        entry.live_at(now)
    }

    /// Stores the discounted cart total of `user_id`, usable until `valid_until` when set.
    pub async fn store_cart_total(
        &self,
        user_id: i64,
        total: Decimal,
        valid_until: Option<DateTime<Utc>>,
    ) {
        let entry = Entry {
            value: total,
            valid_until,
        };
        self.cart_totals.write().await.insert(user_id, entry);
    }
}

impl CacheInvalidator for PricingCache {
    async fn invalidate(&self, key: CacheKey) {
        match key {
            CacheKey::Offer(offer_id) => {
                self.sale_prices.write().await.remove(&offer_id);
                debug!("Invalidated cached sale price of offer {}", offer_id);
            }
            CacheKey::AllOffers => {
                let mut prices = self.sale_prices.write().await;
                info!("Clearing {} cached sale prices", prices.len());
                prices.clear();
            }
            CacheKey::Cart(user_id) => {
                self.cart_totals.write().await.remove(&user_id);
                debug!("Invalidated cached cart total of user {}", user_id);
            }
            CacheKey::AllCarts => {
                let mut totals = self.cart_totals.write().await;
                info!("Clearing {} cached cart totals", totals.len());
                totals.clear();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_offer_invalidation_is_targeted() {
        let cache = PricingCache::new();
        let now = Utc::now();
        cache.store_sale_price(1, Decimal::new(90, 0), None).await;
        cache.store_sale_price(2, Decimal::new(50, 0), None).await;

        cache.invalidate(CacheKey::Offer(1)).await;
        assert_eq!(cache.sale_price(1, now).await, None);
        assert_eq!(cache.sale_price(2, now).await, Some(Decimal::new(50, 0)));

        cache.invalidate(CacheKey::AllOffers).await;
        assert_eq!(cache.sale_price(2, now).await, None);
    }

    #[tokio::test]
    async fn test_cart_keys_leave_offers_alone() {
        let cache = PricingCache::new();
        let now = Utc::now();
        cache.store_sale_price(1, Decimal::new(90, 0), None).await;
        cache.store_cart_total(7, Decimal::new(300, 0), None).await;

        let shared = cache.clone();
        shared.invalidate(CacheKey::AllCarts).await;

        assert_eq!(cache.cart_total(7, now).await, None);
        assert_eq!(cache.sale_price(1, now).await, Some(Decimal::new(90, 0)));
    }

    #[tokio::test]
    async fn test_entries_lapse_at_their_end_time() {
        let cache = PricingCache::new();
        let now = Utc::now();
        let until = now + Duration::hours(1);
        cache.store_sale_price(1, Decimal::new(85, 0), Some(until)).await;
        cache.store_cart_total(7, Decimal::new(250, 0), Some(until)).await;

        assert_eq!(cache.sale_price(1, now).await, Some(Decimal::new(85, 0)));
        assert_eq!(cache.sale_price(1, until).await, None);
        assert_eq!(cache.cart_total(7, now).await, Some(Decimal::new(250, 0)));
        assert_eq!(cache.cart_total(7, until + Duration::seconds(1)).await, None);
    }
}
