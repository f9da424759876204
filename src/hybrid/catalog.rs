use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::error::{RecoError, Result};
use crate::io::{AisleId, DepartmentId, ProductId, ProductName};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub product_id: ProductId,
    pub product_name: ProductName,
    pub aisle_id: AisleId,
    pub aisle: String,
    pub department_id: DepartmentId,
}

/// Static product reference data. Rows keep the order of the products file and the row
/// position doubles as the row of the content index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductCatalog {
    entries: Vec<CatalogEntry>,
    row_for_product: HashMap<ProductId, usize>,
    row_for_name: HashMap<String, usize>,
}

impl ProductCatalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        let mut row_for_product = HashMap::with_capacity(entries.len());
        let mut row_for_name = HashMap::with_capacity(entries.len());
        for (row, entry) in entries.iter().enumerate() {
            row_for_product.entry(entry.product_id).or_insert(row);
            row_for_name
                .entry(normalize_name(&entry.product_name))
                .or_insert(row);
        }
        ProductCatalog {
            entries,
            row_for_product,
            row_for_name,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, product_id: ProductId) -> bool {
        self.row_for_product.contains_key(&product_id)
    }

    pub fn get(&self, product_id: ProductId) -> Option<&CatalogEntry> {
        self.row_for_product
            .get(&product_id)
            .map(|row| &self.entries[*row])
    }

    pub fn entry_at(&self, row: usize) -> Option<&CatalogEntry> {
        self.entries.get(row)
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn product_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.product_name.as_str())
    }

    /// Case-insensitive exact match; the first catalog row wins when names repeat.
    pub fn find_by_name(&self, product_name: &str) -> Result<usize> {
        self.row_for_name
            .get(&normalize_name(product_name))
            .copied()
            .ok_or_else(|| RecoError::ProductNotFound(product_name.to_string()))
    }
}

fn normalize_name(product_name: &str) -> String {
    product_name.trim().to_lowercase()
}
