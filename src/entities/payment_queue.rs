//! Payment queue entity - pending payment jobs picked up by the background worker.
//!
//! A row is deleted once the worker has decided the payment, whatever the outcome.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Payment queue database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payment_queue")]
pub struct Model {
    /// Unique identifier for the job
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Order being paid
    pub order_id: i64,
    /// 8-digit card token
    pub card_number: i64,
    /// When the payment was submitted
    pub created_at: DateTimeUtc,
}

/// Defines relationships between queue entries and orders
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each job pays one order
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id",
        on_delete = "Cascade"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
