//! Vendor domain module.
//!
//! Companies and their category hierarchy, with the structural guards around
//! renames, re-parenting, and deletion, plus all-or-nothing batch import of
//! categories.

pub mod import;
pub mod tree;

pub use import::{ImportReport, ImportRow, RowError, import_categories};
pub use tree::{Category, CategoryId, CategoryTree, Company, CompanyId};
