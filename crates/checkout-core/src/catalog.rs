//! Product Catalog
//!
//! Abstraction over the merchant's catalog and search index. The engine only
//! needs item resolution and inventory checks; the real index lives behind
//! this trait.

use serde::{Deserialize, Serialize};

use crate::error::{CheckoutError, Result};
use crate::model::Item;

/// A catalog product with inventory
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Product {
    pub id: String,

    pub title: String,

    pub description: String,

    /// Unit price in cents
    pub price: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    /// Units available for purchase
    pub available: u32,
}

impl Product {
    /// Item reference stored on a checkout line
    pub fn to_item(&self) -> Item {
        Item {
            id: self.id.clone(),
            title: self.title.clone(),
            price: self.price,
            image_url: self.image_url.clone(),
        }
    }
}

/// Catalog lookup trait
pub trait Catalog: Send + Sync {
    /// Get a product by identifier
    fn get_product(&self, id: &str) -> Result<Option<Product>>;

    /// Search products by free-text query
    fn search(&self, query: &str) -> Result<Vec<Product>>;

    /// Resolve an item for a checkout line, checking inventory
    fn resolve(&self, id: &str, quantity: u32) -> Result<Item> {
        let product = self
            .get_product(id)?
            .ok_or_else(|| CheckoutError::InvalidRequest(format!("unknown item id: {id}")))?;

        if product.available < quantity {
            return Err(CheckoutError::MerchandiseUnavailable(format!(
                "only {} unit(s) of {} available",
                product.available, product.id
            )));
        }

        Ok(product.to_item())
    }
}

/// In-memory catalog for tests and the demo server
pub struct MemoryCatalog {
    products: Vec<Product>,
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self { products: Vec::new() }
    }

    /// Catalog seeded with demo merchandise
    pub fn with_demo_products() -> Self {
        let mut catalog = Self::new();
        catalog.add(Product {
            id: "sku_espresso_maker".into(),
            title: "Stovetop Espresso Maker".into(),
            description: "6-cup aluminum stovetop espresso maker".into(),
            price: 3499,
            image_url: None,
            available: 24,
        });
        catalog.add(Product {
            id: "sku_grinder".into(),
            title: "Burr Coffee Grinder".into(),
            description: "Conical burr grinder with 18 settings".into(),
            price: 5999,
            image_url: None,
            available: 12,
        });
        catalog.add(Product {
            id: "sku_beans_1kg".into(),
            title: "Single Origin Beans 1kg".into(),
            description: "Medium roast, whole bean".into(),
            price: 1899,
            image_url: None,
            available: 200,
        });
        catalog.add(Product {
            id: "sku_mug".into(),
            title: "Ceramic Mug".into(),
            description: "350ml ceramic mug".into(),
            price: 500,
            image_url: None,
            available: 60,
        });
        catalog
    }

    pub fn add(&mut self, product: Product) {
        self.products.push(product);
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

impl Catalog for MemoryCatalog {
    fn get_product(&self, id: &str) -> Result<Option<Product>> {
        Ok(self.products.iter().find(|p| p.id == id).cloned())
    }

    fn search(&self, query: &str) -> Result<Vec<Product>> {
        let needle = query.to_lowercase();
        Ok(self
            .products
            .iter()
            .filter(|p| {
                p.title.to_lowercase().contains(&needle)
                    || p.description.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_matches_title_and_description() {
        let catalog = MemoryCatalog::with_demo_products();
        let hits = catalog.search("grinder").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "sku_grinder");

        let hits = catalog.search("roast").unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_resolve_unknown_item() {
        let catalog = MemoryCatalog::with_demo_products();
        let err = catalog.resolve("sku_missing", 1).unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");
    }

    #[test]
    fn test_resolve_insufficient_inventory() {
        let catalog = MemoryCatalog::with_demo_products();
        let err = catalog.resolve("sku_grinder", 500).unwrap_err();
        assert_eq!(err.code(), "MERCHANDISE_NOT_AVAILABLE");
    }
}
