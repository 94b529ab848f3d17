//! Shop discount resolution for single offers.
//!
//! The best currently active shop rule targeting the offer's product or its
//! category wins; rules never stack. The resulting sale price never drops
//! below [`PRICE_FLOOR`](crate::core::money::PRICE_FLOOR).

use crate::{
    core::{
        cache::PricingCache,
        discount::{DiscountTerms, RuleSet, forget_expired, load_rule_set},
        money::{floor_price, from_cents},
    },
    entities::{Offer, OfferModel, Product, ProductModel},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::prelude::*;
use tracing::trace;

/// The pricing-relevant view of an offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfferPrice {
    /// Offer id
    pub offer_id: i64,
    /// Product being offered
    pub product_id: i64,
    /// Category of that product
    pub category_id: Option<i64>,
    /// Shop making the offer
    pub shop_id: i64,
    /// Undiscounted unit price
    pub price: Decimal,
}

impl OfferPrice {
    /// Joins an offer with its product.
    #[must_use]
    pub fn from_models(offer: &OfferModel, product: &ProductModel) -> Self {
        Self {
            offer_id: offer.id,
            product_id: offer.product_id,
            category_id: product.category_id,
            shop_id: offer.shop_id,
            price: from_cents(offer.price_cents),
        }
    }
}

/// Largest discount any active shop rule grants on one unit of `offer`.
///
/// Rules with an empty scope never apply here. Returns zero when nothing matches.
#[must_use]
pub fn resolve_product_discount(
    offer: &OfferPrice,
    shop_rules: &[DiscountTerms],
    now: DateTime<Utc>,
) -> Decimal {
    shop_rules
        .iter()
        .filter(|rule| rule.is_currently_active(now))
        .filter(|rule| rule.scope.targets(offer.product_id, offer.category_id))
        .map(|rule| rule.amount.against(offer.price))
        .max()
        .unwrap_or(Decimal::ZERO)
}

/// Unit price after the best shop discount, floored at one currency unit.
#[must_use]
pub fn resolve_sale_price(
    offer: &OfferPrice,
    shop_rules: &[DiscountTerms],
    now: DateTime<Utc>,
) -> Decimal {
    floor_price(offer.price, resolve_product_discount(offer, shop_rules, now))
}

/// Loads one offer joined with its product.
pub async fn load_offer_price<C>(conn: &C, offer_id: i64) -> Result<OfferPrice>
where
    C: ConnectionTrait,
{
    let (offer, product) = Offer::find_by_id(offer_id)
        .find_also_related(Product)
        .one(conn)
        .await?
        .ok_or(Error::OfferNotFound { offer_id })?;
    let product = product.ok_or(Error::ProductNotFound {
        product_id: offer.product_id,
    })?;
    Ok(OfferPrice::from_models(&offer, &product))
}

/// Sale price of one offer, read through `cache`.
pub async fn sale_price<C>(
    conn: &C,
    cache: &PricingCache,
    offer_id: i64,
    now: DateTime<Utc>,
) -> Result<Decimal>
where
    C: ConnectionTrait,
{
    if let Some(price) = cache.sale_price(offer_id, now).await {
        trace!("Sale price cache hit for offer {}", offer_id);
        return Ok(price);
    }

    let offer = load_offer_price(conn, offer_id).await?;
    let rules: RuleSet = load_rule_set(conn, now).await?;
    forget_expired(cache, &rules.expired).await;
    let price = resolve_sale_price(&offer, &rules.shop, now);
    cache
        .store_sale_price(offer_id, price, rules.valid_until())
        .await;
    Ok(price)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::cache::{CacheInvalidator, CacheKey};
    use crate::core::discount::{Amount, Scope, deactivate_expired_discounts};
    use crate::test_utils::*;
    use chrono::Duration;
    use std::collections::BTreeSet;

    fn offer(price: i64) -> OfferPrice {
        OfferPrice {
            offer_id: 1,
            product_id: 10,
            category_id: Some(100),
            shop_id: 1,
            price: Decimal::new(price, 0),
        }
    }

    fn shop_rule(id: i64, amount: Amount, products: &[i64], categories: &[i64]) -> DiscountTerms {
        let now = Utc::now();
        DiscountTerms {
            id,
            name: format!("rule {id}"),
            description: String::new(),
            amount,
            active: true,
            start_time: now - Duration::days(1),
            end_time: now + Duration::days(1),
            scope: Scope {
                products: products.iter().copied().collect::<BTreeSet<_>>(),
                categories: categories.iter().copied().collect::<BTreeSet<_>>(),
            },
        }
    }

    #[test]
    fn test_best_rule_wins_without_stacking() {
        let rules = vec![
            shop_rule(1, Amount::Percentage(Decimal::new(10, 0)), &[10], &[]),
            shop_rule(2, Amount::Flat(Decimal::new(5, 0)), &[], &[100]),
        ];
        let now = Utc::now();
        assert_eq!(resolve_product_discount(&offer(100), &rules, now), Decimal::new(10, 0));
        assert_eq!(resolve_sale_price(&offer(100), &rules, now), Decimal::new(90, 0));
    }

    #[test]
    fn test_sale_price_never_below_one() {
        let rules = vec![shop_rule(1, Amount::Flat(Decimal::new(500, 0)), &[10], &[])];
        assert_eq!(resolve_sale_price(&offer(100), &rules, Utc::now()), Decimal::ONE);

        let full = vec![shop_rule(1, Amount::Percentage(Decimal::new(99, 0)), &[10], &[])];
        assert_eq!(resolve_sale_price(&offer(1), &full, Utc::now()), Decimal::ONE);
    }

    #[test]
    fn test_unscoped_and_inactive_rules_do_not_apply() {
        let now = Utc::now();
        let unscoped = shop_rule(1, Amount::Flat(Decimal::new(20, 0)), &[], &[]);
        let mut expired = shop_rule(2, Amount::Flat(Decimal::new(30, 0)), &[10], &[]);
        expired.end_time = now - Duration::seconds(1);
        let mut switched_off = shop_rule(3, Amount::Flat(Decimal::new(40, 0)), &[10], &[]);
        switched_off.active = false;
        let other_product = shop_rule(4, Amount::Flat(Decimal::new(50, 0)), &[11], &[101]);

        let rules = vec![unscoped, expired, switched_off, other_product];
        assert_eq!(resolve_product_discount(&offer(100), &rules, now), Decimal::ZERO);
        assert_eq!(resolve_sale_price(&offer(100), &rules, now), Decimal::new(100, 0));
    }

    #[tokio::test]
    async fn test_sale_price_reads_through_cache() -> Result<()> {
        let db = setup_test_db().await?;
        let fixture = seed_catalog(&db).await?;
        let cache = PricingCache::new();
        let now = Utc::now();

        insert_shop_discount(
            &db,
            Amount::Percentage(Decimal::new(15, 0)),
            &[fixture.laptop.id],
            &[],
            now + Duration::days(1),
        )
        .await?;

        let offer_id = fixture.laptop_offer.id;
        let price = sale_price(&db, &cache, offer_id, now).await?;
        assert_eq!(price, Decimal::new(170, 0));
        assert_eq!(cache.sale_price(offer_id, now).await, Some(price));

        cache.invalidate(CacheKey::Offer(offer_id)).await;
        assert_eq!(cache.sale_price(offer_id, now).await, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_cached_price_ends_with_its_discount() -> Result<()> {
        let db = setup_test_db().await?;
        let fixture = seed_catalog(&db).await?;
        let cache = PricingCache::new();
        let now = Utc::now();

        insert_shop_discount(
            &db,
            Amount::Percentage(Decimal::new(15, 0)),
            &[fixture.laptop.id],
            &[],
            now + Duration::days(1),
        )
        .await?;

        let offer_id = fixture.laptop_offer.id;
        assert_eq!(sale_price(&db, &cache, offer_id, now).await?, Decimal::new(170, 0));

        // Another reader expires the rule lazily, so the sweep finds nothing left to do
        let later = now + Duration::days(2);
        load_rule_set(&db, later).await?;
        assert!(deactivate_expired_discounts(&db, later).await?.is_empty());

        assert_eq!(sale_price(&db, &cache, offer_id, later).await?, Decimal::new(200, 0));
        Ok(())
    }

    #[tokio::test]
    async fn test_lazy_expiry_drops_cached_prices() -> Result<()> {
        let db = setup_test_db().await?;
        let fixture = seed_catalog(&db).await?;
        let cache = PricingCache::new();
        let now = Utc::now();

        insert_shop_discount(
            &db,
            Amount::Flat(Decimal::new(10, 0)),
            &[fixture.laptop.id],
            &[],
            now + Duration::hours(1),
        )
        .await?;
        cache
            .store_sale_price(fixture.novel_offer.id, Decimal::new(45, 0), None)
            .await;
        cache.store_cart_total(1, Decimal::new(245, 0), None).await;

        let later = now + Duration::hours(2);
        let price = sale_price(&db, &cache, fixture.laptop_offer.id, later).await?;
        assert_eq!(price, Decimal::new(200, 0));
        assert_eq!(cache.sale_price(fixture.novel_offer.id, later).await, None);
        assert_eq!(cache.cart_total(1, later).await, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_sale_price_of_missing_offer() -> Result<()> {
        let db = setup_test_db().await?;
        let cache = PricingCache::new();
        let result = sale_price(&db, &cache, 999, Utc::now()).await;
        assert!(matches!(result, Err(Error::OfferNotFound { offer_id: 999 })));
        Ok(())
    }
}
