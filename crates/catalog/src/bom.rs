use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use kitforge_core::{AggregateId, DomainError, DomainResult, Quantity};

use crate::part::PartId;

/// Bill-of-materials line identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BomLineId(pub AggregateId);

impl BomLineId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for BomLineId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// One line of a bill of materials: building one unit of `part` consumes
/// `quantity` units of `sub_part`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomLine {
    pub id: BomLineId,
    pub part: PartId,
    pub sub_part: PartId,
    pub quantity: Quantity,
}

impl BomLine {
    pub fn new(
        id: BomLineId,
        part: PartId,
        sub_part: PartId,
        quantity: Quantity,
    ) -> DomainResult<Self> {
        if part == sub_part {
            return Err(DomainError::field(
                "sub_part",
                "a part cannot appear in its own bill of materials",
            ));
        }
        if quantity.is_zero() {
            return Err(DomainError::field("quantity", "quantity must be positive"));
        }
        Ok(Self {
            id,
            part,
            sub_part,
            quantity,
        })
    }
}

/// Lookup surface for bills of materials. One instance per tenant.
pub trait BomCatalog: Send + Sync {
    /// All lines whose parent is `part`, in insertion order.
    fn lines_for(&self, part: PartId) -> DomainResult<Vec<BomLine>>;

    fn line(&self, id: BomLineId) -> DomainResult<Option<BomLine>>;

    fn add(&self, line: BomLine) -> DomainResult<()>;
}

/// In-memory catalog backed by `RwLock`, for tests and wiring without a
/// database.
#[derive(Debug, Default)]
pub struct InMemoryBomCatalog {
    lines: RwLock<Vec<BomLine>>,
    by_id: RwLock<HashMap<BomLineId, usize>>,
}

impl InMemoryBomCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BomCatalog for InMemoryBomCatalog {
    fn lines_for(&self, part: PartId) -> DomainResult<Vec<BomLine>> {
        let lines = self
            .lines
            .read()
            .map_err(|_| DomainError::invariant("bom catalog lock poisoned"))?;
        Ok(lines.iter().filter(|l| l.part == part).cloned().collect())
    }

    fn line(&self, id: BomLineId) -> DomainResult<Option<BomLine>> {
        let by_id = self
            .by_id
            .read()
            .map_err(|_| DomainError::invariant("bom catalog lock poisoned"))?;
        let lines = self
            .lines
            .read()
            .map_err(|_| DomainError::invariant("bom catalog lock poisoned"))?;
        Ok(by_id.get(&id).map(|&idx| lines[idx].clone()))
    }

    fn add(&self, line: BomLine) -> DomainResult<()> {
        let mut lines = self
            .lines
            .write()
            .map_err(|_| DomainError::invariant("bom catalog lock poisoned"))?;
        let mut by_id = self
            .by_id
            .write()
            .map_err(|_| DomainError::invariant("bom catalog lock poisoned"))?;

        if by_id.contains_key(&line.id) {
            return Err(DomainError::conflict("bom line already exists"));
        }
        if lines
            .iter()
            .any(|l| l.part == line.part && l.sub_part == line.sub_part)
        {
            return Err(DomainError::field(
                "sub_part",
                "bill of materials already lists this sub part",
            ));
        }

        by_id.insert(line.id, lines.len());
        lines.push(line);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn part_id() -> PartId {
        PartId::new(AggregateId::new())
    }

    fn line_id() -> BomLineId {
        BomLineId::new(AggregateId::new())
    }

    fn qty(d: rust_decimal::Decimal) -> Quantity {
        Quantity::new(d).unwrap()
    }

    #[test]
    fn bom_line_rejects_self_reference() {
        let part = part_id();
        let err = BomLine::new(line_id(), part, part, qty(dec!(1))).unwrap_err();
        match err {
            DomainError::FieldValidation { field, .. } => assert_eq!(field, "sub_part"),
            _ => panic!("Expected FieldValidation on sub_part"),
        }
    }

    #[test]
    fn bom_line_rejects_zero_quantity() {
        let err = BomLine::new(line_id(), part_id(), part_id(), Quantity::ZERO).unwrap_err();
        match err {
            DomainError::FieldValidation { field, .. } => assert_eq!(field, "quantity"),
            _ => panic!("Expected FieldValidation on quantity"),
        }
    }

    #[test]
    fn lines_for_returns_lines_in_insertion_order() {
        let catalog = InMemoryBomCatalog::new();
        let parent = part_id();
        let first = BomLine::new(line_id(), parent, part_id(), qty(dec!(2))).unwrap();
        let second = BomLine::new(line_id(), parent, part_id(), qty(dec!(5))).unwrap();

        catalog.add(first.clone()).unwrap();
        catalog.add(second.clone()).unwrap();
        // A line for an unrelated parent must not show up.
        catalog
            .add(BomLine::new(line_id(), part_id(), part_id(), qty(dec!(1))).unwrap())
            .unwrap();

        assert_eq!(catalog.lines_for(parent).unwrap(), vec![first, second]);
    }

    #[test]
    fn add_rejects_duplicate_part_pair() {
        let catalog = InMemoryBomCatalog::new();
        let parent = part_id();
        let sub = part_id();

        catalog
            .add(BomLine::new(line_id(), parent, sub, qty(dec!(1))).unwrap())
            .unwrap();
        let err = catalog
            .add(BomLine::new(line_id(), parent, sub, qty(dec!(3))).unwrap())
            .unwrap_err();
        match err {
            DomainError::FieldValidation { field, .. } => assert_eq!(field, "sub_part"),
            _ => panic!("Expected FieldValidation on duplicate pair"),
        }
    }

    #[test]
    fn line_lookup_by_id() {
        let catalog = InMemoryBomCatalog::new();
        let line = BomLine::new(line_id(), part_id(), part_id(), qty(dec!(4))).unwrap();
        catalog.add(line.clone()).unwrap();

        assert_eq!(catalog.line(line.id).unwrap(), Some(line));
        assert_eq!(catalog.line(line_id()).unwrap(), None);
    }
}
