//! Cart discount resolution.
//!
//! [`DiscountService`] prices a cart once, at construction, against the shop
//! and cart discount families, and keeps only the family granting the larger
//! discount. Consumers read the precomputed results.
//!
//! Resolution order:
//! 1. shop rules per line (best per-unit discount times quantity)
//! 2. scoped cart rules whose categories appear in the cart, per line (best
//!    per-unit discount times quantity)
//! 3. unscoped cart rules against the whole cart total
//! 4. the larger family wins outright; the two never stack
//! 5. the discounted total is floored: at the number of discounted lines for
//!    the shop family and at one currency unit for the cart family

use crate::{
    core::{
        cache::PricingCache,
        cart::{CartLine, CartSnapshot},
        discount::{CartDiscount, RuleSet, forget_expired, load_rule_set},
        money::{PRICE_FLOOR, floor_price},
        offer_pricing::resolve_product_discount,
    },
    errors::Result,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::ConnectionTrait;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace};

/// Which discount family priced the cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscountFamily {
    /// No rule applied
    None,
    /// Shop rules, line by line
    Shop,
    /// Cart rules, scoped or cart-wide
    Cart,
}

/// Discounted price of one cart line under the winning family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscountedLine {
    /// Product of the line's offer
    pub product_id: i64,
    /// Unit price after the per-unit discount, floored at one
    pub unit_price: Decimal,
    /// Line total after the per-line discount, floored at one
    pub line_total: Decimal,
}

#[derive(Debug, Default)]
struct FamilyResult {
    discount: Decimal,
    lines: BTreeMap<i64, DiscountedLine>,
}

/// Eagerly computed discount result for one cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscountService {
    total_price: Decimal,
    total_quantity: u64,
    shop_discount: Decimal,
    cart_discount: Decimal,
    winner: DiscountFamily,
    discounted_lines: BTreeMap<i64, DiscountedLine>,
    total_after_discount: Decimal,
}

impl DiscountService {
    /// Prices `lines` against `rules` as of `now`.
    #[must_use]
    pub fn new(lines: &[CartLine], rules: &RuleSet, now: DateTime<Utc>) -> Self {
        let total_price: Decimal = lines.iter().map(CartLine::line_total).sum();
        let total_quantity: u64 = lines.iter().map(|line| u64::from(line.quantity)).sum();

        let shop = shop_family(lines, rules, now);
        let cart = cart_family(lines, rules, total_price, total_quantity, now);
        let (shop_discount, cart_discount) = (shop.discount, cart.discount);

        let (winner, winning) = if shop_discount > cart_discount {
            (DiscountFamily::Shop, shop)
        } else if cart_discount > Decimal::ZERO {
            (DiscountFamily::Cart, cart)
        } else {
            (DiscountFamily::None, FamilyResult::default())
        };

        let floor = match winner {
            DiscountFamily::Shop => Decimal::from(winning.lines.len()),
            DiscountFamily::Cart => PRICE_FLOOR,
            DiscountFamily::None => Decimal::ZERO,
        };
        let total_after_discount = (total_price - winning.discount).max(floor);

        debug!(
            "Cart of {} lines priced at {} ({:?} discount {})",
            lines.len(),
            total_after_discount,
            winner,
            winning.discount
        );

        Self {
            total_price,
            total_quantity,
            shop_discount,
            cart_discount,
            winner,
            discounted_lines: winning.lines,
            total_after_discount,
        }
    }

    /// Loads the live rules and prices the snapshot.
    ///
    /// A snapshot whose view fails closed prices as an empty cart.
    pub async fn for_cart<C>(conn: &C, snapshot: &CartSnapshot, now: DateTime<Utc>) -> Result<Self>
    where
        C: ConnectionTrait,
    {
        let lines = snapshot.to_priced_view(conn).await?;
        let rules = load_rule_set(conn, now).await?;
        Ok(Self::new(&lines, &rules, now))
    }

    /// Sum of undiscounted line totals.
    #[must_use]
    pub const fn total_price(&self) -> Decimal {
        self.total_price
    }

    /// Number of items in the cart.
    #[must_use]
    pub const fn total_quantity(&self) -> u64 {
        self.total_quantity
    }

    /// Total the shop family would grant.
    #[must_use]
    pub const fn shop_discount(&self) -> Decimal {
        self.shop_discount
    }

    /// Total the cart family would grant.
    #[must_use]
    pub const fn cart_discount(&self) -> Decimal {
        self.cart_discount
    }

    /// Family that priced the cart.
    #[must_use]
    pub const fn winning_family(&self) -> DiscountFamily {
        self.winner
    }

    /// Discount granted by the winning family.
    #[must_use]
    pub fn winning_discount(&self) -> Decimal {
        match self.winner {
            DiscountFamily::Shop => self.shop_discount,
            DiscountFamily::Cart => self.cart_discount,
            DiscountFamily::None => Decimal::ZERO,
        }
    }

    /// Cart total after the winning discount.
    #[must_use]
    pub const fn total_after_discount(&self) -> Decimal {
        self.total_after_discount
    }

    /// Discounted line for `offer_id`, if the winning family touched it.
    #[must_use]
    pub fn discounted_line(&self, offer_id: i64) -> Option<&DiscountedLine> {
        self.discounted_lines.get(&offer_id)
    }

    /// Every discounted line, keyed by offer id.
    #[must_use]
    pub const fn discounted_lines(&self) -> &BTreeMap<i64, DiscountedLine> {
        &self.discounted_lines
    }
}

fn discounted_line(line: &CartLine, unit_discount: Decimal) -> (Decimal, DiscountedLine) {
    let line_discount = unit_discount * Decimal::from(line.quantity);
    let discounted = DiscountedLine {
        product_id: line.offer.product_id,
        unit_price: floor_price(line.offer.price, unit_discount),
        line_total: floor_price(line.line_total(), line_discount),
    };
    (line_discount, discounted)
}

fn shop_family(lines: &[CartLine], rules: &RuleSet, now: DateTime<Utc>) -> FamilyResult {
    let mut result = FamilyResult::default();
    for line in lines {
        let unit_discount = resolve_product_discount(&line.offer, &rules.shop, now);
        if unit_discount > Decimal::ZERO {
            let (line_discount, discounted) = discounted_line(line, unit_discount);
            trace!("Shop discount {} on offer {}", line_discount, line.offer.offer_id);
            result.discount += line_discount;
            result.lines.insert(line.offer.offer_id, discounted);
        }
    }
    result
}

fn cart_rule_applies(
    rule: &CartDiscount,
    total_price: Decimal,
    total_quantity: u64,
    now: DateTime<Utc>,
) -> bool {
    let count = u32::try_from(total_quantity).unwrap_or(u32::MAX);
    rule.terms.is_currently_active(now)
        && rule.conditions.total_met(total_price)
        && rule.conditions.item_count_met(count)
}

fn scoped_cart_family(
    lines: &[CartLine],
    rules: &RuleSet,
    total_price: Decimal,
    total_quantity: u64,
    now: DateTime<Utc>,
) -> FamilyResult {
    let cart_categories: BTreeSet<i64> =
        lines.iter().filter_map(|line| line.offer.category_id).collect();

    let scoped: Vec<&CartDiscount> = rules
        .cart
        .iter()
        .filter(|rule| !rule.terms.scope.categories.is_disjoint(&cart_categories))
        .filter(|rule| cart_rule_applies(rule, total_price, total_quantity, now))
        .collect();

    let mut result = FamilyResult::default();
    for line in lines {
        let unit_discount = scoped
            .iter()
            .filter(|rule| {
                rule.terms
                    .scope
                    .targets(line.offer.product_id, line.offer.category_id)
            })
            .map(|rule| rule.terms.amount.against(line.offer.price))
            .max()
            .unwrap_or(Decimal::ZERO);

        if unit_discount > Decimal::ZERO {
            let (line_discount, discounted) = discounted_line(line, unit_discount);
            trace!("Cart discount {} on offer {}", line_discount, line.offer.offer_id);
            result.discount += line_discount;
            result.lines.insert(line.offer.offer_id, discounted);
        }
    }
    result
}

fn global_cart_discount(
    rules: &RuleSet,
    total_price: Decimal,
    total_quantity: u64,
    now: DateTime<Utc>,
) -> Decimal {
    rules
        .cart
        .iter()
        .filter(|rule| rule.terms.scope.is_empty() && !rule.conditions.is_unconditional())
        .filter(|rule| cart_rule_applies(rule, total_price, total_quantity, now))
        .map(|rule| rule.terms.amount.against(total_price))
        .max()
        .unwrap_or(Decimal::ZERO)
}

fn cart_family(
    lines: &[CartLine],
    rules: &RuleSet,
    total_price: Decimal,
    total_quantity: u64,
    now: DateTime<Utc>,
) -> FamilyResult {
    let scoped = scoped_cart_family(lines, rules, total_price, total_quantity, now);
    let global = global_cart_discount(rules, total_price, total_quantity, now);

    // A cart-wide discount does not adjust individual lines
    if global > scoped.discount {
        FamilyResult {
            discount: global,
            lines: BTreeMap::new(),
        }
    } else {
        scoped
    }
}

/// Discounted total of a signed-in user's cart, read through `cache`.
pub async fn cached_cart_total<C>(
    conn: &C,
    cache: &PricingCache,
    user_id: i64,
    snapshot: &CartSnapshot,
    now: DateTime<Utc>,
) -> Result<Decimal>
where
    C: ConnectionTrait,
{
    if let Some(total) = cache.cart_total(user_id, now).await {
        trace!("Cart total cache hit for user {}", user_id);
        return Ok(total);
    }

    let lines = snapshot.to_priced_view(conn).await?;
    let rules = load_rule_set(conn, now).await?;
    forget_expired(cache, &rules.expired).await;
    let total = DiscountService::new(&lines, &rules, now).total_after_discount();
    cache
        .store_cart_total(user_id, total, rules.valid_until())
        .await;
    Ok(total)
}
