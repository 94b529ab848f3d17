//! Order entity - header row for a placed order.
//!
//! Totals are frozen at placement time. `status` moves through
//! [`OrderStatus`] and every move is logged in `order_status_changes`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum OrderStatus {
    /// Header written, checkout not finished
    #[sea_orm(string_value = "created")]
    Created,
    /// Waiting for a payment to be submitted and processed
    #[sea_orm(string_value = "pending_payment")]
    PendingPayment,
    /// Payment accepted
    #[sea_orm(string_value = "paid")]
    Paid,
    /// Payment rejected; a new payment may be submitted
    #[sea_orm(string_value = "payment_failed")]
    PaymentFailed,
}

impl OrderStatus {
    /// Returns true when a new payment submission is accepted in this status.
    #[must_use]
    pub const fn accepts_payment(self) -> bool {
        matches!(self, Self::PendingPayment | Self::PaymentFailed)
    }

    /// Stored name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::PendingPayment => "pending_payment",
            Self::Paid => "paid",
            Self::PaymentFailed => "payment_failed",
        }
    }
}

/// Delivery option chosen at checkout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
pub enum DeliveryKind {
    /// Standard delivery, free above the threshold for single-shop carts
    #[sea_orm(string_value = "ordinary")]
    Ordinary,
    /// Express delivery, always charged
    #[sea_orm(string_value = "express")]
    Express,
}

/// Order database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    /// Unique identifier for the order
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Customer who placed the order
    pub user_id: i64,
    /// Current status
    pub status: OrderStatus,
    /// Chosen delivery option
    pub delivery: DeliveryKind,
    /// Delivery city
    pub city: String,
    /// Delivery street address
    pub address: String,
    /// Sum of frozen line totals, before discounts
    pub subtotal_cents: i64,
    /// Discount granted by the winning discount family
    pub discount_cents: i64,
    /// Delivery fee charged
    pub delivery_cents: i64,
    /// Amount to pay: discounted subtotal plus delivery
    pub total_cents: i64,
    /// When the order was placed
    pub created_at: DateTimeUtc,
}

/// One order has many lines and status changes
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Frozen lines
    #[sea_orm(has_many = "super::order_line::Entity")]
    Lines,
    /// Status history
    #[sea_orm(has_many = "super::order_status_change::Entity")]
    StatusChanges,
}

impl Related<super::order_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lines.def()
    }
}

impl Related<super::order_status_change::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StatusChanges.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
