//! Discount-to-category scope rows.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One category targeted by one discount rule
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "discount_categories")]
pub struct Model {
    /// Unique identifier for the scope row
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning discount rule
    pub discount_id: i64,
    /// Targeted category
    pub category_id: i64,
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
    /// Each row names one category
    #[sea_orm(
        belongs_to = "super::category::Entity",
        from = "Column::CategoryId",
        to = "super::category::Column::Id",
        on_delete = "Cascade"
    )]
    Category,
}

impl Related<super::discount::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Discount.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
