//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod cart;
pub mod cart_item;
pub mod category;
pub mod discount;
pub mod discount_category;
pub mod discount_product;
pub mod offer;
pub mod order;
pub mod order_line;
pub mod order_status_change;
pub mod payment_queue;
pub mod product;
pub mod shop;

// Re-export specific types to avoid conflicts
pub use cart::{Entity as Cart, Model as CartModel};
pub use cart_item::{Entity as CartItem, Model as CartItemModel};
pub use category::{Entity as Category, Model as CategoryModel};
pub use discount::{AmountKind, DiscountKind, Entity as Discount, Model as DiscountModel};
pub use discount_category::Entity as DiscountCategory;
pub use discount_product::Entity as DiscountProduct;
pub use offer::{Entity as Offer, Model as OfferModel};
pub use order::{DeliveryKind, Entity as Order, Model as OrderModel, OrderStatus};
pub use order_line::{Entity as OrderLine, Model as OrderLineModel};
pub use order_status_change::{Entity as OrderStatusChange, Model as OrderStatusChangeModel};
pub use payment_queue::{Entity as PaymentQueue, Model as PaymentQueueModel};
pub use product::{Entity as Product, Model as ProductModel};
pub use shop::{Entity as Shop, Model as ShopModel};
