use serde::{Deserialize, Serialize};
use tracing::info;

use kitforge_core::{AggregateId, DomainResult};

use crate::tree::{Category, CategoryId, CategoryTree};

/// One already-parsed row of a category import batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRow {
    pub name: String,
    pub description: String,
    pub parent_name: Option<String>,
}

/// A validation failure for one row, mapped to the offending field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    pub row: usize,
    pub field: String,
    pub message: String,
}

/// Outcome of an import batch. `created` is empty whenever `errors` is not:
/// a batch applies all-or-nothing.
#[derive(Debug, Default)]
pub struct ImportReport {
    pub created: Vec<CategoryId>,
    pub errors: Vec<RowError>,
}

impl ImportReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate and apply a batch of category rows against the tree.
///
/// Every row is validated before anything is written: required name, no
/// duplicate names within the batch, no collision with an existing sibling,
/// and parents resolving either to an existing category or to an earlier row
/// of the same batch. Any error fails the whole batch.
pub fn import_categories(tree: &CategoryTree, rows: &[ImportRow]) -> DomainResult<ImportReport> {
    let mut report = ImportReport::default();

    // Pass 1: validate everything.
    for (index, row) in rows.iter().enumerate() {
        let name = row.name.trim();
        if name.is_empty() {
            report.errors.push(RowError {
                row: index,
                field: "name".to_string(),
                message: "name is required".to_string(),
            });
            continue;
        }

        let duplicate_in_batch = rows[..index]
            .iter()
            .any(|earlier| earlier.name.trim().eq_ignore_ascii_case(name));
        if duplicate_in_batch {
            report.errors.push(RowError {
                row: index,
                field: "name".to_string(),
                message: "duplicate name within batch".to_string(),
            });
            continue;
        }
        if tree.find_by_name(name)?.is_some() {
            report.errors.push(RowError {
                row: index,
                field: "name".to_string(),
                message: "category with this name already exists".to_string(),
            });
            continue;
        }

        if let Some(parent_name) = row.parent_name.as_deref() {
            let in_tree = tree.find_by_name(parent_name)?.is_some();
            let in_batch = rows[..index]
                .iter()
                .any(|earlier| earlier.name.trim().eq_ignore_ascii_case(parent_name));
            if !in_tree && !in_batch {
                report.errors.push(RowError {
                    row: index,
                    field: "parent".to_string(),
                    message: format!("unknown parent category '{parent_name}'"),
                });
            }
        }
    }

    if !report.errors.is_empty() {
        return Ok(report);
    }

    // Pass 2: apply in row order so batch-internal parents exist when their
    // children arrive.
    for row in rows {
        let parent = match row.parent_name.as_deref() {
            Some(parent_name) => tree.find_by_name(parent_name)?.map(|c| c.id),
            None => None,
        };
        let category = Category {
            id: CategoryId::new(AggregateId::new()),
            name: row.name.trim().to_string(),
            description: row.description.clone(),
            parent,
        };
        let id = category.id;
        tree.insert(category)?;
        report.created.push(id);
    }

    info!(created = report.created.len(), "imported vendor categories");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, parent: Option<&str>) -> ImportRow {
        ImportRow {
            name: name.to_string(),
            description: String::new(),
            parent_name: parent.map(str::to_string),
        }
    }

    #[test]
    fn valid_batch_creates_all_rows() {
        let tree = CategoryTree::new();
        let report = import_categories(
            &tree,
            &[
                row("Electronics", None),
                row("Passives", Some("Electronics")),
                row("Resistors", Some("Passives")),
            ],
        )
        .unwrap();

        assert!(report.is_ok());
        assert_eq!(report.created.len(), 3);

        let passives = tree.find_by_name("Passives").unwrap().unwrap();
        let electronics = tree.find_by_name("Electronics").unwrap().unwrap();
        assert_eq!(passives.parent, Some(electronics.id));
    }

    #[test]
    fn missing_name_fails_the_batch() {
        let tree = CategoryTree::new();
        let report =
            import_categories(&tree, &[row("Valid", None), row("   ", None)]).unwrap();

        assert!(!report.is_ok());
        assert!(report.created.is_empty());
        assert_eq!(report.errors[0].row, 1);
        assert_eq!(report.errors[0].field, "name");
        // Nothing was written, not even the valid row.
        assert!(tree.find_by_name("Valid").unwrap().is_none());
    }

    #[test]
    fn duplicate_within_batch_is_rejected() {
        let tree = CategoryTree::new();
        let report =
            import_categories(&tree, &[row("Motors", None), row("motors", None)]).unwrap();

        assert!(!report.is_ok());
        assert_eq!(report.errors[0].row, 1);
        assert_eq!(report.errors[0].field, "name");
    }

    #[test]
    fn collision_with_existing_category_is_rejected() {
        let tree = CategoryTree::new();
        tree.insert(Category {
            id: CategoryId::new(AggregateId::new()),
            name: "Motors".to_string(),
            description: String::new(),
            parent: None,
        })
        .unwrap();

        let report = import_categories(&tree, &[row("Motors", None)]).unwrap();
        assert!(!report.is_ok());
        assert_eq!(report.errors[0].field, "name");
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let tree = CategoryTree::new();
        let report = import_categories(&tree, &[row("Child", Some("Nowhere"))]).unwrap();

        assert!(!report.is_ok());
        assert_eq!(report.errors[0].field, "parent");
    }

    #[test]
    fn parent_later_in_batch_does_not_count() {
        let tree = CategoryTree::new();
        let report = import_categories(
            &tree,
            &[row("Child", Some("Parent")), row("Parent", None)],
        )
        .unwrap();

        assert!(!report.is_ok());
        assert_eq!(report.errors[0].row, 0);
        assert_eq!(report.errors[0].field, "parent");
    }

    #[test]
    fn multiple_errors_are_all_reported() {
        let tree = CategoryTree::new();
        let report = import_categories(
            &tree,
            &[row("", None), row("A", Some("Missing")), row("A", None)],
        )
        .unwrap();

        // Empty name, unknown parent, and the duplicate of "A".
        assert_eq!(report.errors.len(), 3);
    }
}
