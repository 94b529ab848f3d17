//! Discount-to-product scope rows.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One product targeted by one discount rule
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "discount_products")]
pub struct Model {
    /// Unique identifier for the scope row
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning discount rule
    pub discount_id: i64,
    /// Targeted product
    pub product_id: i64,
}

/// Defines relationships between scope rows and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each row belongs to one discount
    #[sea_orm(
        belongs_to = "super::discount::Entity",
        from = "Column::DiscountId",
        to = "super::discount::Column::Id",
        on_delete = "Cascade"
    )]
    Discount,
    /// Each row names one product
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id",
        on_delete = "Cascade"
    )]
    Product,
}

impl Related<super::discount::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Discount.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
