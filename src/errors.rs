//! Unified error types for the marketplace core.
//!
//! Every fallible operation in the crate returns [`Result`]. Database, serialization
//! and configuration failures convert into [`Error`] through `#[from]`, so call sites
//! propagate with `?`.

use std::fmt;
use thiserror::Error;

/// All errors produced by the marketplace core.
#[derive(Debug, Error)]
pub enum Error {
    /// Settings could not be read or were inconsistent
    #[error("Configuration error: {message}")]
    Config {
        /// Human-readable description of the problem
        message: String,
    },

    /// Any failure reported by the database layer
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Referenced offer does not exist in the catalog
    #[error("Offer not found: {offer_id}")]
    OfferNotFound {
        /// Offer id that failed to resolve
        offer_id: i64,
    },

    /// Referenced product does not exist in the catalog
    #[error("Product not found: {product_id}")]
    ProductNotFound {
        /// Product id that failed to resolve
        product_id: i64,
    },

    /// Referenced order does not exist
    #[error("Order not found: {order_id}")]
    OrderNotFound {
        /// Order id that failed to resolve
        order_id: i64,
    },

    /// Referenced discount rule does not exist
    #[error("Discount not found: {discount_id}")]
    DiscountNotFound {
        /// Discount id that failed to resolve
        discount_id: i64,
    },

    /// Checkout was attempted on a cart with no resolvable lines
    #[error("Cart is empty")]
    EmptyCart,

    /// A quantity outside the accepted range was supplied
    #[error("Invalid quantity: {quantity}")]
    InvalidQuantity {
        /// Offending quantity
        quantity: i64,
    },

    /// A price or amount outside the accepted range was supplied
    #[error("Invalid amount: {amount}")]
    InvalidAmount {
        /// Offending amount, as entered
        amount: String,
    },

    /// Card token is not an 8-digit number
    #[error("Invalid card number: {card_number}")]
    InvalidCardNumber {
        /// Offending card token
        card_number: u64,
    },

    /// Payment was submitted for an order that cannot accept it
    #[error("Order {order_id} cannot accept payment in status {status}")]
    PaymentNotAllowed {
        /// Order the payment was submitted for
        order_id: i64,
        /// Current status of that order
        status: String,
    },

    /// Field-level validation failures for a submitted record
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// Session payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML settings file could not be parsed
    #[error("Settings parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Environment variable lookup failure
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    /// Integer conversion overflow
    #[error("Integer conversion error: {0}")]
    IntConversion(#[from] std::num::TryFromIntError),
}

/// One validation message, optionally bound to a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Field the message belongs to; `None` for form-wide messages
    pub field: Option<&'static str>,
    /// Message shown to the caller
    pub message: String,
}

/// Collection of field-level validation messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    /// Creates an empty collection.
    #[must_use]
    pub const fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Records a message for `field` (or for the whole form when `None`).
    pub fn add(&mut self, field: Option<&'static str>, message: impl Into<String>) {
        self.errors.push(FieldError {
            field,
            message: message.into(),
        });
    }

    /// Returns true when no message has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// All recorded messages in insertion order.
    #[must_use]
    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// Returns true when at least one message is bound to `field`.
    #[must_use]
    pub fn has_field(&self, field: Option<&'static str>) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    /// Converts into `Ok(())` when empty, `Err(Error::Validation)` otherwise.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for error in &self.errors {
            if !first {
                write!(f, "; ")?;
            }
            first = false;
            match error.field {
                Some(field) => write!(f, "{field}: {}", error.message)?,
                None => write!(f, "{}", error.message)?,
            }
        }
        Ok(())
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
