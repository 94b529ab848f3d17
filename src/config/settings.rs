//! Marketplace settings loaded from `marketplace.toml`.
//!
//! Settings are read once at startup and handed to each component explicitly.
//! Missing keys fall back to the defaults below, and a missing file yields
//! [`Settings::default`].

use crate::errors::{Error, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Site-wide settings consumed read-only by the pricing and checkout code.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Cart total above which a single-shop order ships for free
    pub free_shipping_threshold: Decimal,
    /// Fee for ordinary delivery
    pub standard_delivery_fee: Decimal,
    /// Fee for express delivery
    pub express_delivery_fee: Decimal,
    /// Largest accepted percentage discount
    pub percentage_cap: u32,
    /// Offers per catalog page
    pub pagination_size: u64,
    /// Seconds between payment queue passes
    pub payment_poll_interval_secs: u64,
    /// Seconds between discount expiry sweeps
    pub discount_sweep_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            free_shipping_threshold: Decimal::new(2000_00, 2),
            standard_delivery_fee: Decimal::new(200_00, 2),
            express_delivery_fee: Decimal::new(500_00, 2),
            percentage_cap: 99,
            pagination_size: 4,
            payment_poll_interval_secs: 30,
            discount_sweep_interval_secs: 300,
        }
    }
}

impl Settings {
    /// Parses settings from TOML text and checks them for consistency.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let settings: Self = toml::from_str(contents)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Offers per catalog page, never less than one.
    #[must_use]
    pub fn page_size(&self) -> u64 {
        self.pagination_size.max(1)
    }

    /// Interval between payment worker passes, never shorter than a second.
    #[must_use]
    pub fn payment_poll_interval(&self) -> Duration {
        Duration::from_secs(self.payment_poll_interval_secs.max(1))
    }

    /// Interval between discount expiry sweeps, never shorter than a second.
    #[must_use]
    pub fn discount_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.discount_sweep_interval_secs.max(1))
    }

    fn validate(&self) -> Result<()> {
        if self.free_shipping_threshold.is_sign_negative()
            || self.standard_delivery_fee.is_sign_negative()
            || self.express_delivery_fee.is_sign_negative()
        {
            return Err(Error::Config {
                message: "Delivery fees and thresholds cannot be negative".to_string(),
            });
        }
        if self.percentage_cap == 0 || self.percentage_cap > 100 {
            return Err(Error::Config {
                message: format!(
                    "percentage_cap must be between 1 and 100, got {}",
                    self.percentage_cap
                ),
            });
        }
        if self.pagination_size == 0 {
            return Err(Error::Config {
                message: "pagination_size must be positive".to_string(),
            });
        }
        if self.payment_poll_interval_secs == 0 || self.discount_sweep_interval_secs == 0 {
            return Err(Error::Config {
                message: "Worker intervals must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Loads settings from a TOML file.
///
/// # Errors
/// Returns an error if the file exists but cannot be read, parsed, or validated.
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path_ref = path.as_ref();
    if !path_ref.exists() {
        tracing::info!(
            "Settings file {:?} not found, using defaults",
            path_ref
        );
        return Ok(Settings::default());
    }

    tracing::debug!("Loading settings from: {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read settings file {path_ref:?}: {e}"),
    })?;
    Settings::from_toml_str(&contents)
}

/// Loads settings from the default location (./marketplace.toml)
pub fn load_default_settings() -> Result<Settings> {
    load_settings("marketplace.toml")
}
