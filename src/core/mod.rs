/// Pricing cache and the invalidation interface
pub mod cache;
/// Session cart and its durable mirror
pub mod cart;
/// Catalog lookups, price updates and browsing
pub mod catalog;
/// Discount rules and their repository
pub mod discount;
/// Cart discount resolution
pub mod discount_service;
/// Money conversion and rounding helpers
pub mod money;
/// Shop discount resolution for single offers
pub mod offer_pricing;
/// Order placement and status history
pub mod order;
/// Payment submission and queue processing
pub mod payment;
/// Background polling loops
pub mod worker;
