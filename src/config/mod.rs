/// Database configuration and connection management
pub mod database;

/// Marketplace settings loaded from marketplace.toml
pub mod settings;

pub use settings::Settings;
