//! Quantity value object: a non-negative decimal amount.
//!
//! Stock levels and component requirements are decimals (parts can be
//! consumed in fractional units: wire lengths, adhesives, etc.), so plain
//! integer counts are not enough. Compared by value, immutable once built.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Non-negative decimal quantity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(Decimal);

impl Quantity {
    pub const ZERO: Quantity = Quantity(Decimal::ZERO);
    pub const ONE: Quantity = Quantity(Decimal::ONE);

    /// Build a quantity, rejecting negative values.
    pub fn new(value: Decimal) -> DomainResult<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(DomainError::validation(format!(
                "quantity cannot be negative (got {value})"
            )));
        }
        Ok(Self(value))
    }

    /// Build a quantity from a whole unit count.
    pub fn from_units(units: u32) -> Self {
        Self(Decimal::from(units))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// True if this quantity can satisfy `required` (>= comparison).
    pub fn meets(&self, required: Quantity) -> bool {
        self.0 >= required.0
    }

    /// Saturating subtraction; never goes below zero.
    pub fn saturating_sub(&self, other: Quantity) -> Quantity {
        if self.0 > other.0 {
            Quantity(self.0 - other.0)
        } else {
            Quantity::ZERO
        }
    }

    /// Scale by a whole multiplier (e.g. per-unit BOM quantity × kits built).
    pub fn scale(&self, factor: u32) -> Quantity {
        Quantity(self.0 * Decimal::from(factor))
    }
}

impl core::fmt::Display for Quantity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl TryFrom<Decimal> for Quantity {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Quantity::new(value)
    }
}
