use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use kitforge_core::{AggregateId, DomainError, DomainResult};

/// Vendor category identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub AggregateId);

impl CategoryId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for CategoryId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Company identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompanyId(pub AggregateId);

impl CompanyId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for CompanyId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// A node of the vendor category hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub description: String,
    pub parent: Option<CategoryId>,
}

/// A vendor company, optionally filed under a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
    pub category: Option<CategoryId>,
}

/// The vendor category hierarchy for one tenant.
///
/// Structural rules: category names are unique among siblings, a category can
/// never become its own ancestor, and a category carrying companies or child
/// categories cannot be deleted.
#[derive(Debug, Default)]
pub struct CategoryTree {
    inner: RwLock<TreeState>,
}

#[derive(Debug, Default)]
struct TreeState {
    categories: HashMap<CategoryId, Category>,
    companies: HashMap<CompanyId, Company>,
}

impl TreeState {
    fn sibling_name_taken(&self, name: &str, parent: Option<CategoryId>, except: Option<CategoryId>) -> bool {
        self.categories.values().any(|c| {
            c.parent == parent
                && c.name.eq_ignore_ascii_case(name)
                && Some(c.id) != except
        })
    }

    fn is_descendant(&self, candidate: CategoryId, of: CategoryId) -> bool {
        let mut cursor = Some(candidate);
        while let Some(current) = cursor {
            if current == of {
                return true;
            }
            cursor = self.categories.get(&current).and_then(|c| c.parent);
        }
        false
    }
}

impl CategoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> DomainResult<std::sync::RwLockReadGuard<'_, TreeState>> {
        self.inner
            .read()
            .map_err(|_| DomainError::invariant("category tree lock poisoned"))
    }

    fn write(&self) -> DomainResult<std::sync::RwLockWriteGuard<'_, TreeState>> {
        self.inner
            .write()
            .map_err(|_| DomainError::invariant("category tree lock poisoned"))
    }

    pub fn get(&self, id: CategoryId) -> DomainResult<Option<Category>> {
        Ok(self.read()?.categories.get(&id).cloned())
    }

    pub fn find_by_name(&self, name: &str) -> DomainResult<Option<Category>> {
        Ok(self
            .read()?
            .categories
            .values()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    pub fn children(&self, parent: CategoryId) -> DomainResult<Vec<Category>> {
        let state = self.read()?;
        let mut children: Vec<Category> = state
            .categories
            .values()
            .filter(|c| c.parent == Some(parent))
            .cloned()
            .collect();
        children.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(children)
    }

    pub fn insert(&self, category: Category) -> DomainResult<()> {
        let mut state = self.write()?;

        if category.name.trim().is_empty() {
            return Err(DomainError::field("name", "name cannot be empty"));
        }
        if state.categories.contains_key(&category.id) {
            return Err(DomainError::conflict("category already exists"));
        }
        if let Some(parent) = category.parent {
            if parent == category.id {
                return Err(DomainError::field("parent", "category cannot be its own parent"));
            }
            if !state.categories.contains_key(&parent) {
                return Err(DomainError::field("parent", "parent category does not exist"));
            }
        }
        if state.sibling_name_taken(&category.name, category.parent, None) {
            return Err(DomainError::field(
                "name",
                "a sibling category with this name already exists",
            ));
        }

        state.categories.insert(category.id, category);
        Ok(())
    }

    pub fn rename(&self, id: CategoryId, name: &str) -> DomainResult<()> {
        let mut state = self.write()?;

        if name.trim().is_empty() {
            return Err(DomainError::field("name", "name cannot be empty"));
        }
        let parent = state
            .categories
            .get(&id)
            .ok_or(DomainError::NotFound)?
            .parent;
        if state.sibling_name_taken(name, parent, Some(id)) {
            return Err(DomainError::field(
                "name",
                "a sibling category with this name already exists",
            ));
        }

        if let Some(category) = state.categories.get_mut(&id) {
            category.name = name.to_string();
        }
        Ok(())
    }

    /// Move a category under a new parent (or to the root with `None`).
    pub fn reparent(&self, id: CategoryId, new_parent: Option<CategoryId>) -> DomainResult<()> {
        let mut state = self.write()?;

        let name = state
            .categories
            .get(&id)
            .ok_or(DomainError::NotFound)?
            .name
            .clone();

        if let Some(parent) = new_parent {
            if parent == id {
                return Err(DomainError::field("parent", "category cannot be its own parent"));
            }
            if !state.categories.contains_key(&parent) {
                return Err(DomainError::field("parent", "parent category does not exist"));
            }
            // Walking up from the new parent must not reach the category
            // itself, or the tree would gain a cycle.
            if state.is_descendant(parent, id) {
                return Err(DomainError::field(
                    "parent",
                    "cannot move a category under one of its own descendants",
                ));
            }
        }
        if state.sibling_name_taken(&name, new_parent, Some(id)) {
            return Err(DomainError::field(
                "name",
                "a sibling category with this name already exists",
            ));
        }

        if let Some(category) = state.categories.get_mut(&id) {
            category.parent = new_parent;
        }
        Ok(())
    }

    pub fn delete(&self, id: CategoryId) -> DomainResult<()> {
        let mut state = self.write()?;

        if !state.categories.contains_key(&id) {
            return Err(DomainError::NotFound);
        }
        if state.companies.values().any(|c| c.category == Some(id)) {
            return Err(DomainError::field(
                "category",
                "category has companies assigned",
            ));
        }
        if state.categories.values().any(|c| c.parent == Some(id)) {
            return Err(DomainError::field(
                "category",
                "category has child categories",
            ));
        }

        state.categories.remove(&id);
        Ok(())
    }

    pub fn add_company(&self, company: Company) -> DomainResult<()> {
        let mut state = self.write()?;

        if company.name.trim().is_empty() {
            return Err(DomainError::field("name", "name cannot be empty"));
        }
        if let Some(category) = company.category {
            if !state.categories.contains_key(&category) {
                return Err(DomainError::field("category", "category does not exist"));
            }
        }
        state.companies.insert(company.id, company);
        Ok(())
    }

    pub fn company(&self, id: CompanyId) -> DomainResult<Option<Company>> {
        Ok(self.read()?.companies.get(&id).cloned())
    }

    pub fn assign_company(&self, company: CompanyId, category: Option<CategoryId>) -> DomainResult<()> {
        let mut state = self.write()?;

        if let Some(category) = category {
            if !state.categories.contains_key(&category) {
                return Err(DomainError::field("category", "category does not exist"));
            }
        }
        let entry = state.companies.get_mut(&company).ok_or(DomainError::NotFound)?;
        entry.category = category;
        Ok(())
    }
}
