//! Discount entity - shop-scoped and cart-scoped discount rules in one table.
//!
//! `kind` tells the two families apart; the cart thresholds are only ever set on
//! cart rules. Scope rows live in `discount_products` and `discount_categories`.
//! `amount_minor` holds the amount scaled by 100: 15% is `1500`, a flat 5.00 is `500`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Which discount family a rule belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(8))")]
pub enum DiscountKind {
    /// Applied to offers in the catalog
    #[sea_orm(string_value = "shop")]
    Shop,
    /// Applied while pricing a cart
    #[sea_orm(string_value = "cart")]
    Cart,
}

/// How `amount_minor` is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(12))")]
pub enum AmountKind {
    /// Percent of the price being discounted
    #[sea_orm(string_value = "percentage")]
    Percentage,
    /// Fixed currency amount
    #[sea_orm(string_value = "flat")]
    Flat,
}

/// Discount rule database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "discounts")]
pub struct Model {
    /// Unique identifier for the rule
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Rule family
    pub kind: DiscountKind,
    /// Short rule name
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Amount scaled by 100
    pub amount_minor: i64,
    /// Percentage or flat amount
    pub amount_kind: AmountKind,
    /// Cleared once the rule expires; never set back
    pub active: bool,
    /// Start of the activation window
    pub start_time: DateTimeUtc,
    /// End of the activation window
    pub end_time: DateTimeUtc,
    /// Cart rules only: minimum cart total in cents
    pub min_cart_total_cents: Option<i64>,
    /// Cart rules only: minimum number of items in the cart
    pub min_cart_item_count: Option<i32>,
}

/// Discount rules own their scope rows
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Products this rule targets
    #[sea_orm(has_many = "super::discount_product::Entity")]
    Products,
    /// Categories this rule targets
    #[sea_orm(has_many = "super::discount_category::Entity")]
    Categories,
}

impl Related<super::discount_product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Products.def()
    }
}

impl Related<super::discount_category::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Categories.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
