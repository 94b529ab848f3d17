//! Shared test utilities for the marketplace core.
//!
//! This module provides helpers for setting up an in-memory database and
//! seeding it with a small catalog, discount rules and placed orders.

use crate::{
    config::Settings,
    core::{
        cache::PricingCache,
        cart::{CartSnapshot, QuantityChange, mutate_cart},
        catalog::{NewOffer, create_category, create_offer, create_product, create_shop},
        discount::Amount,
        order::{DeliveryAddress, place_order},
    },
    entities::{
        AmountKind, DeliveryKind, DiscountKind, category, discount, discount_category,
        discount_product, offer, order, product, shop,
    },
    errors::Result,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// A whole-second timestamp, for tests that compare values read back from the database.
pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Rows created by [`seed_catalog`].
pub struct CatalogFixture {
    /// "Electronics" category
    pub electronics: category::Model,
    /// "Books" category
    pub books: category::Model,
    /// Laptop, in electronics
    pub laptop: product::Model,
    /// Novel, in books
    pub novel: product::Model,
    /// First shop
    pub shop_a: shop::Model,
    /// Second shop
    pub shop_b: shop::Model,
    /// Laptop from shop A at 200.00, in stock
    pub laptop_offer: offer::Model,
    /// Laptop from shop B at 220.00, out of stock
    pub laptop_offer_b: offer::Model,
    /// Novel from shop A at 50.00, in stock, free shipping
    pub novel_offer: offer::Model,
}

/// Seeds two categories, two products, two shops and three offers.
pub async fn seed_catalog(db: &DatabaseConnection) -> Result<CatalogFixture> {
    let now = Utc::now();
    let electronics = create_category(db, "Electronics").await?;
    let books = create_category(db, "Books").await?;
    let laptop = create_product(db, "Laptop", Some(electronics.id)).await?;
    let novel = create_product(db, "Novel", Some(books.id)).await?;
    let shop_a = create_shop(db, "Shop A").await?;
    let shop_b = create_shop(db, "Shop B").await?;

    let laptop_offer = create_offer(
        db,
        NewOffer {
            product_id: laptop.id,
            shop_id: shop_a.id,
            price: Decimal::new(200, 0),
            in_stock: true,
            free_shipping: false,
        },
        now - Duration::hours(3),
    )
    .await?;
    let laptop_offer_b = create_offer(
        db,
        NewOffer {
            product_id: laptop.id,
            shop_id: shop_b.id,
            price: Decimal::new(220, 0),
            in_stock: false,
            free_shipping: false,
        },
        now - Duration::hours(2),
    )
    .await?;
    let novel_offer = create_offer(
        db,
        NewOffer {
            product_id: novel.id,
            shop_id: shop_a.id,
            price: Decimal::new(50, 0),
            in_stock: true,
            free_shipping: true,
        },
        now - Duration::hours(1),
    )
    .await?;

    Ok(CatalogFixture {
        electronics,
        books,
        laptop,
        novel,
        shop_a,
        shop_b,
        laptop_offer,
        laptop_offer_b,
        novel_offer,
    })
}

fn stored_amount(amount: Amount) -> (AmountKind, i64) {
    let (kind, value) = match amount {
        Amount::Percentage(value) => (AmountKind::Percentage, value),
        Amount::Flat(value) => (AmountKind::Flat, value),
    };
    (kind, crate::core::money::to_cents(value).unwrap_or_default())
}

/// Inserts an active shop rule directly, skipping validation.
///
/// # Defaults
/// * `start_time`: one day ago
pub async fn insert_shop_discount(
    db: &DatabaseConnection,
    amount: Amount,
    products: &[i64],
    categories: &[i64],
    end_time: DateTime<Utc>,
) -> Result<i64> {
    let (amount_kind, amount_minor) = stored_amount(amount);
    let model = discount::ActiveModel {
        kind: Set(DiscountKind::Shop),
        name: Set("Test shop discount".to_string()),
        description: Set(String::new()),
        amount_minor: Set(amount_minor),
        amount_kind: Set(amount_kind),
        active: Set(true),
        start_time: Set(Utc::now() - Duration::days(1)),
        end_time: Set(end_time),
        min_cart_total_cents: Set(None),
        min_cart_item_count: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await?;

    for product_id in products {
        discount_product::ActiveModel {
            discount_id: Set(model.id),
            product_id: Set(*product_id),
            ..Default::default()
        }
        .insert(db)
        .await?;
    }
    for category_id in categories {
        discount_category::ActiveModel {
            discount_id: Set(model.id),
            category_id: Set(*category_id),
            ..Default::default()
        }
        .insert(db)
        .await?;
    }
    Ok(model.id)
}

/// Inserts an active, unscoped cart rule directly, skipping validation.
pub async fn insert_cart_discount(
    db: &DatabaseConnection,
    amount: Amount,
    min_cart_total: Option<Decimal>,
    min_cart_item_count: Option<i32>,
    end_time: DateTime<Utc>,
) -> Result<i64> {
    let (amount_kind, amount_minor) = stored_amount(amount);
    let min_cart_total_cents = min_cart_total
        .map(crate::core::money::to_cents)
        .transpose()?;
    let model = discount::ActiveModel {
        kind: Set(DiscountKind::Cart),
        name: Set("Test cart discount".to_string()),
        description: Set(String::new()),
        amount_minor: Set(amount_minor),
        amount_kind: Set(amount_kind),
        active: Set(true),
        start_time: Set(Utc::now() - Duration::days(1)),
        end_time: Set(end_time),
        min_cart_total_cents: Set(min_cart_total_cents),
        min_cart_item_count: Set(min_cart_item_count),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(model.id)
}

/// Places an order for one unit of a freshly listed offer priced 100.00.
/// Returns the order in `pending_payment`.
pub async fn place_test_order(db: &DatabaseConnection, user_id: i64) -> Result<order::Model> {
    let now = Utc::now();
    let cache = PricingCache::new();
    let product = create_product(db, "Test Product", None).await?;
    let shop = create_shop(db, "Test Shop").await?;
    let offer = create_offer(
        db,
        NewOffer {
            product_id: product.id,
            shop_id: shop.id,
            price: Decimal::new(100, 0),
            in_stock: true,
            free_shipping: false,
        },
        now,
    )
    .await?;

    let mut session = CartSnapshot::new();
    mutate_cart(db, &cache, Some(user_id), &mut session, |cart| {
        cart.add(offer.id, QuantityChange::Set(1), now)
    })
    .await?;

    place_order(
        db,
        &Settings::default(),
        &cache,
        user_id,
        &mut session,
        DeliveryKind::Ordinary,
        DeliveryAddress {
            city: "Kyiv".to_string(),
            address: "Khreshchatyk 1".to_string(),
        },
        now,
    )
    .await
}
