//! Value objects: equality by value, not identity.
//!
//! Value objects are domain objects that have **no identity** - they are defined entirely
//! by their attribute values. Two value objects with the same values are considered equal.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. To "modify" one,
/// build a new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

/// External reference to a catalog resource (e.g. `"MAT-001"`).
///
/// The catalog itself is an external collaborator; the ledger only keeps the
/// trimmed, non-blank code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceRef(String);

impl ResourceRef {
    pub fn new(code: impl AsRef<str>) -> DomainResult<Self> {
        let code = code.as_ref().trim();
        if code.is_empty() {
            return Err(DomainError::validation("resource reference cannot be blank"));
        }
        Ok(Self(code.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValueObject for ResourceRef {}

impl TryFrom<String> for ResourceRef {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ResourceRef> for String {
    fn from(value: ResourceRef) -> Self {
        value.0
    }
}

impl core::fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unit of measure (e.g. `"BAG"`, `"M3"`).
///
/// Stock is keyed by unit: 50 bags and 2 tonnes of the same cement are two
/// different inventory items.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UnitOfMeasure(String);

impl UnitOfMeasure {
    pub fn new(unit: impl AsRef<str>) -> DomainResult<Self> {
        let unit = unit.as_ref().trim();
        if unit.is_empty() {
            return Err(DomainError::validation("unit of measure cannot be blank"));
        }
        Ok(Self(unit.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValueObject for UnitOfMeasure {}

impl TryFrom<String> for UnitOfMeasure {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UnitOfMeasure> for String {
    fn from(value: UnitOfMeasure) -> Self {
        value.0
    }
}

impl core::fmt::Display for UnitOfMeasure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reject zero and negative quantities.
pub fn ensure_positive(field: &str, value: Decimal) -> DomainResult<()> {
    if value <= Decimal::ZERO {
        return Err(DomainError::validation(format!(
            "{field} must be positive (got {value})"
        )));
    }
    Ok(())
}

/// Round half-up (away from zero on the midpoint) to `scale` decimal places.
pub fn round_half_up(value: Decimal, scale: u32) -> Decimal {
    value.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn resource_ref_is_trimmed() {
        let r = ResourceRef::new("  MAT-001 ").unwrap();
        assert_eq!(r.as_str(), "MAT-001");
    }

    #[test]
    fn blank_unit_is_rejected() {
        assert!(matches!(
            UnitOfMeasure::new("   "),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn deserializing_blank_resource_fails() {
        let parsed: Result<ResourceRef, _> = serde_json::from_str("\"  \"");
        assert!(parsed.is_err());
    }

    #[test]
    fn rounding_is_half_up() {
        assert_eq!(round_half_up(dec!(13.335), 2), dec!(13.34));
        assert_eq!(round_half_up(dec!(13.3333), 2), dec!(13.33));
        assert_eq!(round_half_up(dec!(0.125), 2), dec!(0.13));
    }

    #[test]
    fn zero_is_not_positive() {
        assert!(ensure_positive("quantity", Decimal::ZERO).is_err());
        assert!(ensure_positive("quantity", dec!(0.001)).is_ok());
    }
}
