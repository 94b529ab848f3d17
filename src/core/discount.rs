//! Discount rules - the shared rule model and its repository.
//!
//! A rule is either a shop discount (applied to single offers) or a cart
//! discount (applied while pricing a cart, optionally gated on cart total and
//! item count). Both carry the same [`DiscountTerms`]; cart rules add
//! [`CartConditions`].
//!
//! Expiry is lazy: whenever rules are loaded for pricing, any rule whose end
//! time has passed is switched off and the flag is written back. The flip is
//! idempotent, so concurrent readers at worst repeat the same update. The ids
//! switched off are reported in [`RuleSet::expired`]; callers holding a cache
//! hand them to [`forget_expired`].

use crate::{
    config::Settings,
    core::{
        cache::{CacheInvalidator, CacheKey},
        money::{from_cents, percent_of, to_cents},
    },
    entities::{
        AmountKind, Discount, DiscountCategory, DiscountKind, DiscountProduct, discount,
        discount_category, discount_product,
    },
    errors::{Error, Result, ValidationErrors},
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*, sea_query::Expr};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

/// Discount size, interpreted against whatever price it is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Amount {
    /// Percent of the base price
    Percentage(Decimal),
    /// Fixed currency amount, independent of the base price
    Flat(Decimal),
}

impl Amount {
    fn from_stored(kind: AmountKind, amount_minor: i64) -> Self {
        let value = from_cents(amount_minor);
        match kind {
            AmountKind::Percentage => Self::Percentage(value),
            AmountKind::Flat => Self::Flat(value),
        }
    }

    /// Discount in currency units when applied to `base`.
    ///
    /// Percentages round to two places before they are compared or summed.
    #[must_use]
    pub fn against(self, base: Decimal) -> Decimal {
        match self {
            Self::Percentage(percent) => percent_of(base, percent),
            Self::Flat(value) => value,
        }
    }
}

/// Products and categories a rule targets. Both empty means unscoped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    /// Targeted product ids
    pub products: BTreeSet<i64>,
    /// Targeted category ids
    pub categories: BTreeSet<i64>,
}

impl Scope {
    /// True when the rule names no product and no category.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.products.is_empty() && self.categories.is_empty()
    }

    /// True when the rule lists `product_id` directly.
    #[must_use]
    pub fn has_product(&self, product_id: i64) -> bool {
        self.products.contains(&product_id)
    }

    /// True when the rule lists `category_id`.
    #[must_use]
    pub fn has_category(&self, category_id: Option<i64>) -> bool {
        category_id.is_some_and(|id| self.categories.contains(&id))
    }

    /// True when the rule lists the product or its category.
    #[must_use]
    pub fn targets(&self, product_id: i64, category_id: Option<i64>) -> bool {
        self.has_product(product_id) || self.has_category(category_id)
    }
}

/// Fields every discount rule carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscountTerms {
    /// Rule id
    pub id: i64,
    /// Rule name
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Discount size
    pub amount: Amount,
    /// Stored active flag
    pub active: bool,
    /// Start of the activation window
    pub start_time: DateTime<Utc>,
    /// End of the activation window
    pub end_time: DateTime<Utc>,
    /// Targeted products and categories
    pub scope: Scope,
}

impl DiscountTerms {
    /// A rule applies only while its flag is set and its window has not closed.
    #[must_use]
    pub fn is_currently_active(&self, now: DateTime<Utc>) -> bool {
        self.active && now < self.end_time
    }

    /// Time left before the rule expires; zero once it is inactive.
    #[must_use]
    pub fn remaining_time(&self, now: DateTime<Utc>) -> Duration {
        if self.is_currently_active(now) {
            self.end_time - now
        } else {
            Duration::zero()
        }
    }
}

/// Optional thresholds a cart rule can require.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CartConditions {
    /// Minimum cart total, inclusive
    pub min_cart_total: Option<Decimal>,
    /// Minimum number of items in the cart, inclusive
    pub min_cart_item_count: Option<u32>,
}

impl CartConditions {
    /// True when neither threshold is set.
    #[must_use]
    pub const fn is_unconditional(&self) -> bool {
        self.min_cart_total.is_none() && self.min_cart_item_count.is_none()
    }

    /// Checks the total threshold; an absent threshold is satisfied.
    #[must_use]
    pub fn total_met(&self, cart_total: Decimal) -> bool {
        self.min_cart_total.is_none_or(|min| cart_total >= min)
    }

    /// Checks the item-count threshold; an absent threshold is satisfied.
    #[must_use]
    pub fn item_count_met(&self, item_count: u32) -> bool {
        self.min_cart_item_count.is_none_or(|min| item_count >= min)
    }
}

/// A cart-scoped rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartDiscount {
    /// Shared rule fields
    pub terms: DiscountTerms,
    /// Cart thresholds
    pub conditions: CartConditions,
}

/// A discount rule of either family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscountRule {
    /// Applied to single offers
    Shop(DiscountTerms),
    /// Applied while pricing a cart
    Cart(CartDiscount),
}

impl DiscountRule {
    /// Shared rule fields.
    #[must_use]
    pub const fn terms(&self) -> &DiscountTerms {
        match self {
            Self::Shop(terms) => terms,
            Self::Cart(cart) => &cart.terms,
        }
    }

    /// Stored family of the rule.
    #[must_use]
    pub const fn kind(&self) -> DiscountKind {
        match self {
            Self::Shop(_) => DiscountKind::Shop,
            Self::Cart(_) => DiscountKind::Cart,
        }
    }
}

/// Currently active rules, split by family, ready for pricing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    /// Active shop rules
    pub shop: Vec<DiscountTerms>,
    /// Active cart rules
    pub cart: Vec<CartDiscount>,
    /// Rules switched off while this set was loaded
    pub expired: Vec<i64>,
}

impl RuleSet {
    /// Earliest end time among the loaded rules.
    ///
    /// Prices computed from this set stay valid until then.
    #[must_use]
    pub fn valid_until(&self) -> Option<DateTime<Utc>> {
        self.shop
            .iter()
            .chain(self.cart.iter().map(|rule| &rule.terms))
            .map(|terms| terms.end_time)
            .min()
    }
}

/// Drops every cached price once at least one rule in `expired` was switched off.
pub async fn forget_expired<I>(cache: &I, expired: &[i64])
where
    I: CacheInvalidator,
{
    if expired.is_empty() {
        return;
    }
    debug!("Discounts {:?} expired, dropping cached prices", expired);
    cache.invalidate(CacheKey::AllOffers).await;
    cache.invalidate(CacheKey::AllCarts).await;
}

/// Kind-specific input for a new rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewDiscountKind {
    /// Shop rule; needs at least one product or category
    Shop,
    /// Cart rule with optional thresholds
    Cart(CartConditions),
}

/// Input for [`create_discount`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDiscount {
    /// Rule name
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Amount as entered
    pub amount: Decimal,
    /// How to read `amount`
    pub amount_kind: AmountKind,
    /// Requested start; clamped to now when in the past
    pub start_time: DateTime<Utc>,
    /// End of the activation window
    pub end_time: DateTime<Utc>,
    /// Targeted products
    pub products: Vec<i64>,
    /// Targeted categories
    pub categories: Vec<i64>,
    /// Family and family-specific fields
    pub kind: NewDiscountKind,
}

/// Checks a new rule and returns every field-level problem found.
pub fn validate_new_discount(new: &NewDiscount, percentage_cap: u32) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    let has_scope = !new.products.is_empty() || !new.categories.is_empty();

    if new.name.trim().is_empty() {
        errors.add(Some("name"), "Discount name cannot be empty");
    }
    if new.amount < Decimal::ONE {
        errors.add(Some("amount"), "Discount amount must be at least 1");
    }
    if new.amount_kind == AmountKind::Percentage && new.amount > Decimal::from(percentage_cap) {
        errors.add(
            Some("amount"),
            format!("Percentage discount cannot exceed {percentage_cap}%"),
        );
    }
    if new.start_time > new.end_time {
        errors.add(Some("end_time"), "End time must not be before start time");
    }

    match new.kind {
        NewDiscountKind::Shop => {
            if !has_scope {
                errors.add(None, "Select at least one product or category");
            }
        }
        NewDiscountKind::Cart(conditions) => {
            if !has_scope && conditions.is_unconditional() {
                errors.add(None, "Provide at least one condition for the discount");
            }
            if conditions.min_cart_total.is_some() && has_scope {
                if new.categories.is_empty() {
                    errors.add(
                        Some("categories"),
                        "Categories are required when products are selected",
                    );
                } else if new.products.is_empty() {
                    errors.add(
                        Some("products"),
                        "Products are required when categories are selected",
                    );
                }
            }
            if conditions
                .min_cart_total
                .is_some_and(|total| total.is_sign_negative())
            {
                errors.add(Some("min_cart_total"), "Minimum cart total cannot be negative");
            }
        }
    }

    errors
}

/// Validates and stores a new rule together with its scope rows.
///
/// Nothing is written when validation fails. Cached offer and cart prices are
/// invalidated once the rule is committed.
pub async fn create_discount<I>(
    db: &DatabaseConnection,
    settings: &Settings,
    cache: &I,
    new: NewDiscount,
    now: DateTime<Utc>,
) -> Result<DiscountRule>
where
    I: CacheInvalidator,
{
    validate_new_discount(&new, settings.percentage_cap).into_result()?;

    let start_time = new.start_time.max(now);
    let (kind, conditions) = match new.kind {
        NewDiscountKind::Shop => (DiscountKind::Shop, CartConditions::default()),
        NewDiscountKind::Cart(conditions) => (DiscountKind::Cart, conditions),
    };
    let min_cart_total_cents = conditions.min_cart_total.map(to_cents).transpose()?;
    let min_cart_item_count = conditions
        .min_cart_item_count
        .map(i32::try_from)
        .transpose()?;

    let txn = db.begin().await?;

    let model = discount::ActiveModel {
        kind: Set(kind),
        name: Set(new.name.trim().to_string()),
        description: Set(new.description),
        amount_minor: Set(to_cents(new.amount)?),
        amount_kind: Set(new.amount_kind),
        active: Set(now < new.end_time),
        start_time: Set(start_time),
        end_time: Set(new.end_time),
        min_cart_total_cents: Set(min_cart_total_cents),
        min_cart_item_count: Set(min_cart_item_count),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    let products: BTreeSet<i64> = new.products.into_iter().collect();
    let categories: BTreeSet<i64> = new.categories.into_iter().collect();
    for product_id in &products {
        discount_product::ActiveModel {
            discount_id: Set(model.id),
            product_id: Set(*product_id),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
    }
    for category_id in &categories {
        discount_category::ActiveModel {
            discount_id: Set(model.id),
            category_id: Set(*category_id),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
    }

    txn.commit().await?;
    info!("Created {:?} discount {} ({})", kind, model.id, model.name);

    cache.invalidate(CacheKey::AllOffers).await;
    cache.invalidate(CacheKey::AllCarts).await;

    Ok(build_rule(model, Scope { products, categories }))
}

/// Loads one rule by id, whatever its state.
pub async fn get_discount<C>(conn: &C, discount_id: i64) -> Result<DiscountRule>
where
    C: ConnectionTrait,
{
    let model = Discount::find_by_id(discount_id)
        .one(conn)
        .await?
        .ok_or(Error::DiscountNotFound { discount_id })?;
    let mut scopes = load_scopes(conn, vec![model.id]).await?;
    let scope = scopes.remove(&model.id).unwrap_or_default();
    Ok(build_rule(model, scope))
}

/// Loads every currently active rule, expiring stale ones on the way.
pub async fn load_rule_set<C>(conn: &C, now: DateTime<Utc>) -> Result<RuleSet>
where
    C: ConnectionTrait,
{
    let flagged = Discount::find()
        .filter(discount::Column::Active.eq(true))
        .order_by_asc(discount::Column::Id)
        .all(conn)
        .await?;

    let (live, expired): (Vec<_>, Vec<_>) =
        flagged.into_iter().partition(|model| now < model.end_time);

    let expired: Vec<i64> = expired.iter().map(|model| model.id).collect();
    if !expired.is_empty() {
        mark_inactive(conn, &expired).await?;
    }

    let mut scopes = load_scopes(conn, live.iter().map(|model| model.id).collect()).await?;
    let mut rules = RuleSet {
        expired,
        ..RuleSet::default()
    };
    for model in live {
        let scope = scopes.remove(&model.id).unwrap_or_default();
        match build_rule(model, scope) {
            DiscountRule::Shop(terms) => rules.shop.push(terms),
            DiscountRule::Cart(cart) => rules.cart.push(cart),
        }
    }

    debug!(
        "Loaded {} shop and {} cart discounts",
        rules.shop.len(),
        rules.cart.len()
    );
    Ok(rules)
}

/// Switches off every rule whose window has closed and returns their ids.
///
/// Run periodically by the worker; pricing reads do the same lazily.
pub async fn deactivate_expired_discounts<C>(conn: &C, now: DateTime<Utc>) -> Result<Vec<i64>>
where
    C: ConnectionTrait,
{
    let ids: Vec<i64> = Discount::find()
        .filter(discount::Column::Active.eq(true))
        .all(conn)
        .await?
        .into_iter()
        .filter(|model| model.end_time <= now)
        .map(|model| model.id)
        .collect();

    if !ids.is_empty() {
        mark_inactive(conn, &ids).await?;
    }
    Ok(ids)
}

async fn mark_inactive<C>(conn: &C, ids: &[i64]) -> Result<()>
where
    C: ConnectionTrait,
{
    Discount::update_many()
        .col_expr(discount::Column::Active, Expr::value(false))
        .filter(discount::Column::Id.is_in(ids.to_vec()))
        .filter(discount::Column::Active.eq(true))
        .exec(conn)
        .await?;
    info!("Deactivated expired discounts: {:?}", ids);
    Ok(())
}

async fn load_scopes<C>(conn: &C, ids: Vec<i64>) -> Result<HashMap<i64, Scope>>
where
    C: ConnectionTrait,
{
    let mut scopes: HashMap<i64, Scope> = HashMap::new();
    if ids.is_empty() {
        return Ok(scopes);
    }

    let products = DiscountProduct::find()
        .filter(discount_product::Column::DiscountId.is_in(ids.clone()))
        .all(conn)
        .await?;
    for row in products {
        scopes
            .entry(row.discount_id)
            .or_default()
            .products
            .insert(row.product_id);
    }

    let categories = DiscountCategory::find()
        .filter(discount_category::Column::DiscountId.is_in(ids))
        .all(conn)
        .await?;
    for row in categories {
        scopes
            .entry(row.discount_id)
            .or_default()
            .categories
            .insert(row.category_id);
    }

    Ok(scopes)
}

fn build_rule(model: discount::Model, scope: Scope) -> DiscountRule {
    let terms = DiscountTerms {
        id: model.id,
        name: model.name,
        description: model.description,
        amount: Amount::from_stored(model.amount_kind, model.amount_minor),
        active: model.active,
        start_time: model.start_time,
        end_time: model.end_time,
        scope,
    };
    match model.kind {
        DiscountKind::Shop => DiscountRule::Shop(terms),
        DiscountKind::Cart => DiscountRule::Cart(CartDiscount {
            terms,
            conditions: CartConditions {
                min_cart_total: model.min_cart_total_cents.map(from_cents),
                min_cart_item_count: model
                    .min_cart_item_count
                    .and_then(|count| u32::try_from(count).ok()),
            },
        }),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::cache::PricingCache;
    use crate::test_utils::*;

    fn shop_input(now: DateTime<Utc>) -> NewDiscount {
        NewDiscount {
            name: "Spring sale".to_string(),
            description: String::new(),
            amount: Decimal::new(15, 0),
            amount_kind: AmountKind::Percentage,
            start_time: now,
            end_time: now + Duration::days(1),
            products: vec![1],
            categories: vec![],
            kind: NewDiscountKind::Shop,
        }
    }

    #[test]
    fn test_amount_against_base() {
        let percent = Amount::Percentage(Decimal::new(10, 0));
        assert_eq!(percent.against(Decimal::new(100, 0)), Decimal::new(10, 0));
        let flat = Amount::Flat(Decimal::new(5, 0));
        assert_eq!(flat.against(Decimal::new(100, 0)), Decimal::new(5, 0));
    }

    #[test]
    fn test_validation_reports_each_field() {
        let now = Utc::now();
        let mut input = shop_input(now);
        input.name = "  ".to_string();
        input.amount = Decimal::new(100, 0);
        input.start_time = now + Duration::days(2);
        input.products.clear();

        let errors = validate_new_discount(&input, 99);
        assert!(errors.has_field(Some("name")));
        assert!(errors.has_field(Some("amount")));
        assert!(errors.has_field(Some("end_time")));
        assert!(errors.has_field(None), "missing scope is a form-wide error");
        assert_eq!(errors.errors().len(), 4);
    }

    #[test]
    fn test_amount_below_one_is_rejected() {
        let now = Utc::now();
        let mut input = shop_input(now);
        input.amount = Decimal::ZERO;
        let errors = validate_new_discount(&input, 99);
        assert!(errors.has_field(Some("amount")));
        assert_eq!(errors.errors().len(), 1);

        input.amount = Decimal::new(5, 1);
        assert!(validate_new_discount(&input, 99).has_field(Some("amount")));

        input.amount = Decimal::ONE;
        assert!(validate_new_discount(&input, 99).is_empty());
    }

    #[test]
    fn test_percentage_cap_is_inclusive() {
        let now = Utc::now();
        let mut input = shop_input(now);
        input.amount = Decimal::new(99, 0);
        assert!(validate_new_discount(&input, 99).is_empty());
    }

    #[test]
    fn test_cart_rule_needs_a_condition() {
        let now = Utc::now();
        let mut input = shop_input(now);
        input.products.clear();
        input.kind = NewDiscountKind::Cart(CartConditions::default());
        let errors = validate_new_discount(&input, 99);
        assert!(errors.has_field(None));

        input.kind = NewDiscountKind::Cart(CartConditions {
            min_cart_total: None,
            min_cart_item_count: Some(3),
        });
        assert!(validate_new_discount(&input, 99).is_empty());
    }

    #[test]
    fn test_cart_rule_with_total_and_products_needs_categories() {
        let now = Utc::now();
        let mut input = shop_input(now);
        input.kind = NewDiscountKind::Cart(CartConditions {
            min_cart_total: Some(Decimal::new(500, 0)),
            min_cart_item_count: None,
        });
        let errors = validate_new_discount(&input, 99);
        assert!(errors.has_field(Some("categories")));

        input.categories = vec![7];
        assert!(validate_new_discount(&input, 99).is_empty());
    }

    #[tokio::test]
    async fn test_create_discount_persists_rule_and_scope() -> Result<()> {
        let db = setup_test_db().await?;
        let fixture = seed_catalog(&db).await?;
        let cache = PricingCache::new();
        let now = fixed_time();

        let mut input = shop_input(now);
        input.products = vec![fixture.laptop.id];
        input.categories = vec![fixture.electronics.id];
        let rule = create_discount(&db, &Settings::default(), &cache, input, now).await?;

        let loaded = get_discount(&db, rule.terms().id).await?;
        assert_eq!(loaded, rule);
        assert_eq!(loaded.kind(), DiscountKind::Shop);
        assert!(loaded.terms().scope.has_product(fixture.laptop.id));
        assert!(loaded.terms().scope.has_category(Some(fixture.electronics.id)));
        assert_eq!(loaded.terms().amount, Amount::Percentage(Decimal::new(15, 0)));
        Ok(())
    }

    #[tokio::test]
    async fn test_create_discount_rejects_invalid_without_writing() -> Result<()> {
        let db = setup_test_db().await?;
        let cache = PricingCache::new();
        let now = Utc::now();

        let mut input = shop_input(now);
        input.products.clear();
        let result = create_discount(&db, &Settings::default(), &cache, input, now).await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(Discount::find().count(&db).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_past_start_time_is_clamped_to_now() -> Result<()> {
        let db = setup_test_db().await?;
        let fixture = seed_catalog(&db).await?;
        let cache = PricingCache::new();
        let now = Utc::now();

        let mut input = shop_input(now);
        input.products = vec![fixture.laptop.id];
        input.start_time = now - Duration::days(10);
        let rule = create_discount(&db, &Settings::default(), &cache, input, now).await?;
        assert_eq!(rule.terms().start_time, now);
        Ok(())
    }

    #[tokio::test]
    async fn test_load_rule_set_expires_lazily() -> Result<()> {
        let db = setup_test_db().await?;
        let fixture = seed_catalog(&db).await?;
        let now = Utc::now();

        let live = insert_shop_discount(
            &db,
            Amount::Flat(Decimal::new(5, 0)),
            &[fixture.laptop.id],
            &[],
            now + Duration::hours(1),
        )
        .await?;
        let stale = insert_shop_discount(
            &db,
            Amount::Flat(Decimal::new(7, 0)),
            &[fixture.laptop.id],
            &[],
            now + Duration::minutes(5),
        )
        .await?;

        // Ten minutes later the second rule has expired
        let later = now + Duration::minutes(10);
        let rules = load_rule_set(&db, later).await?;
        assert_eq!(rules.shop.len(), 1);
        assert_eq!(rules.shop[0].id, live);
        assert_eq!(rules.expired, vec![stale]);
        assert_eq!(rules.valid_until(), Some(rules.shop[0].end_time));

        let stored = Discount::find_by_id(stale).one(&db).await?.unwrap();
        assert!(!stored.active, "expired flag must be written back");

        // A second read is a no-op and never reactivates
        let again = load_rule_set(&db, later).await?;
        assert_eq!(again.shop.len(), 1);
        assert!(again.expired.is_empty());
        let stored = Discount::find_by_id(stale).one(&db).await?.unwrap();
        assert!(!stored.active);
        Ok(())
    }

    #[tokio::test]
    async fn test_deactivate_expired_discounts_returns_flipped_ids() -> Result<()> {
        let db = setup_test_db().await?;
        let fixture = seed_catalog(&db).await?;
        let now = Utc::now();

        let expiring = insert_shop_discount(
            &db,
            Amount::Percentage(Decimal::new(10, 0)),
            &[],
            &[fixture.electronics.id],
            now + Duration::seconds(30),
        )
        .await?;

        assert!(deactivate_expired_discounts(&db, now).await?.is_empty());
        let flipped = deactivate_expired_discounts(&db, now + Duration::minutes(1)).await?;
        assert_eq!(flipped, vec![expiring]);
        assert!(
            deactivate_expired_discounts(&db, now + Duration::minutes(2))
                .await?
                .is_empty()
        );
        Ok(())
    }

    #[test]
    fn test_remaining_time() {
        let now = Utc::now();
        let terms = DiscountTerms {
            id: 1,
            name: "x".to_string(),
            description: String::new(),
            amount: Amount::Flat(Decimal::ONE),
            active: true,
            start_time: now,
            end_time: now + Duration::hours(2),
            scope: Scope::default(),
        };
        assert_eq!(terms.remaining_time(now), Duration::hours(2));
        assert_eq!(terms.remaining_time(now + Duration::hours(3)), Duration::zero());

        let inactive = DiscountTerms {
            active: false,
            ..terms
        };
        assert_eq!(inactive.remaining_time(now), Duration::zero());
    }
}
