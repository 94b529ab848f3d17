//! Catalog - categories, products, shops and their offers.
//!
//! Only what the pricing core needs from the catalog lives here: creation
//! helpers, lookups, price updates and offer browsing with sale prices.

use crate::{
    config::Settings,
    core::{
        cache::{CacheInvalidator, CacheKey},
        discount::load_rule_set,
        money::to_cents,
        offer_pricing::{OfferPrice, resolve_product_discount, resolve_sale_price},
    },
    entities::{Offer, Product, category, offer, product, shop},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{Set, prelude::*};
use tracing::info;

/// Creates a category.
pub async fn create_category(db: &DatabaseConnection, name: &str) -> Result<category::Model> {
    category::ActiveModel {
        name: Set(name.to_string()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Creates a product, optionally in a category.
pub async fn create_product(
    db: &DatabaseConnection,
    name: &str,
    category_id: Option<i64>,
) -> Result<product::Model> {
    product::ActiveModel {
        name: Set(name.to_string()),
        category_id: Set(category_id),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Creates a shop.
pub async fn create_shop(db: &DatabaseConnection, name: &str) -> Result<shop::Model> {
    shop::ActiveModel {
        name: Set(name.to_string()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Input for [`create_offer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewOffer {
    /// Product offered
    pub product_id: i64,
    /// Shop making the offer
    pub shop_id: i64,
    /// Undiscounted unit price, must be positive
    pub price: Decimal,
    /// Stock flag
    pub in_stock: bool,
    /// Whether the shop ships it for free
    pub free_shipping: bool,
}

fn check_price(price: Decimal) -> Result<i64> {
    if price <= Decimal::ZERO {
        return Err(Error::InvalidAmount {
            amount: price.to_string(),
        });
    }
    to_cents(price)
}

/// Lists an offer.
///
/// # Errors
/// [`Error::InvalidAmount`] for a non-positive price, [`Error::ProductNotFound`]
/// for an unknown product.
pub async fn create_offer(
    db: &DatabaseConnection,
    new: NewOffer,
    now: DateTime<Utc>,
) -> Result<offer::Model> {
    let price_cents = check_price(new.price)?;
    get_product(db, new.product_id).await?;

    offer::ActiveModel {
        product_id: Set(new.product_id),
        shop_id: Set(new.shop_id),
        price_cents: Set(price_cents),
        in_stock: Set(new.in_stock),
        free_shipping: Set(new.free_shipping),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Loads a product.
pub async fn get_product<C>(conn: &C, product_id: i64) -> Result<product::Model>
where
    C: ConnectionTrait,
{
    Product::find_by_id(product_id)
        .one(conn)
        .await?
        .ok_or(Error::ProductNotFound { product_id })
}

/// Loads an offer.
pub async fn get_offer<C>(conn: &C, offer_id: i64) -> Result<offer::Model>
where
    C: ConnectionTrait,
{
    Offer::find_by_id(offer_id)
        .one(conn)
        .await?
        .ok_or(Error::OfferNotFound { offer_id })
}

/// Changes an offer's price and drops every cached value derived from it.
///
/// Lines of orders already placed keep the price they were frozen with.
pub async fn update_offer_price<I>(
    db: &DatabaseConnection,
    cache: &I,
    offer_id: i64,
    price: Decimal,
) -> Result<offer::Model>
where
    I: CacheInvalidator,
{
    let price_cents = check_price(price)?;
    let current = get_offer(db, offer_id).await?;

    let mut active: offer::ActiveModel = current.into();
    active.price_cents = Set(price_cents);
    let updated = active.update(db).await?;

    cache.invalidate(CacheKey::Offer(offer_id)).await;
    cache.invalidate(CacheKey::AllCarts).await;
    info!("Offer {} repriced to {}", offer_id, price);
    Ok(updated)
}

/// Order of browse results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OfferSort {
    /// Cheapest sale price first
    #[default]
    PriceAscending,
    /// Most recently listed first
    Newest,
}

/// Browse filters; `None` and `false` mean "any".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OfferFilter {
    /// Case-insensitive substring of the product name
    pub name: Option<String>,
    /// Product category
    pub category_id: Option<i64>,
    /// Lowest sale price, inclusive
    pub min_price: Option<Decimal>,
    /// Highest sale price, inclusive
    pub max_price: Option<Decimal>,
    /// Only offers in stock
    pub in_stock_only: bool,
    /// Only offers with free shipping
    pub free_shipping_only: bool,
}

/// One offer as the catalog shows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferListing {
    /// Stored offer
    pub offer: offer::Model,
    /// Product name
    pub product_name: String,
    /// Best active shop discount per unit
    pub discount: Decimal,
    /// Price after that discount
    pub sale_price: Decimal,
}

/// One page of browse results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferPage {
    /// Offers on this page
    pub items: Vec<OfferListing>,
    /// 1-based page number
    pub page: u64,
    /// Number of pages
    pub total_pages: u64,
    /// Number of matching offers
    pub total_items: u64,
}

/// Filters, sorts and pages offers by their current sale price.
///
/// `page` is 1-based; a page past the end comes back empty.
pub async fn browse_offers<C>(
    conn: &C,
    settings: &Settings,
    filter: &OfferFilter,
    sort: OfferSort,
    page: u64,
    now: DateTime<Utc>,
) -> Result<OfferPage>
where
    C: ConnectionTrait,
{
    let mut query = Offer::find().find_also_related(Product);
    if let Some(name) = filter.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        query = query.filter(product::Column::Name.contains(name));
    }
    if let Some(category_id) = filter.category_id {
        query = query.filter(product::Column::CategoryId.eq(category_id));
    }
    if filter.in_stock_only {
        query = query.filter(offer::Column::InStock.eq(true));
    }
    if filter.free_shipping_only {
        query = query.filter(offer::Column::FreeShipping.eq(true));
    }

    let rules = load_rule_set(conn, now).await?;
    let mut listings: Vec<OfferListing> = query
        .all(conn)
        .await?
        .into_iter()
        .filter_map(|(offer, product)| {
            let product = product?;
            let priced = OfferPrice::from_models(&offer, &product);
            Some(OfferListing {
                discount: resolve_product_discount(&priced, &rules.shop, now),
                sale_price: resolve_sale_price(&priced, &rules.shop, now),
                product_name: product.name,
                offer,
            })
        })
        .filter(|listing| filter.min_price.is_none_or(|min| listing.sale_price >= min))
        .filter(|listing| filter.max_price.is_none_or(|max| listing.sale_price <= max))
        .collect();

    match sort {
        OfferSort::PriceAscending => {
            listings.sort_by(|a, b| {
                a.sale_price
                    .cmp(&b.sale_price)
                    .then(a.offer.id.cmp(&b.offer.id))
            });
        }
        OfferSort::Newest => {
            listings.sort_by(|a, b| {
                b.offer
                    .created_at
                    .cmp(&a.offer.created_at)
                    .then(b.offer.id.cmp(&a.offer.id))
            });
        }
    }

    let page_size = settings.page_size();
    let total_items = u64::try_from(listings.len())?;
    let total_pages = total_items.div_ceil(page_size);
    let page = page.max(1);
    let skip = usize::try_from((page - 1).saturating_mul(page_size))?;
    let take = usize::try_from(page_size)?;
    let items = listings.into_iter().skip(skip).take(take).collect();

    Ok(OfferPage {
        items,
        page,
        total_pages,
        total_items,
    })
}
