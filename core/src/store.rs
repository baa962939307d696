use anyhow::Result;

use crate::models::{Category, CategoryDraft, Location, LocationDraft, Product, ProductDraft};

/// Persistence operations the snapshot and restore engines depend on.
///
/// Name lookups are case-insensitive. Inserts accept an optional
/// caller-assigned id; stores that cannot honour it should ignore it and
/// assign their own.
///
/// The batch hooks let the restore engine group the clear step and the
/// category/location writes into one unit. Stores without transactions can
/// keep the no-op defaults.
pub trait RecordStore {
    fn all_categories(&self) -> Result<Vec<Category>>;
    fn all_locations(&self) -> Result<Vec<Location>>;
    fn all_products(&self) -> Result<Vec<Product>>;

    fn find_category(&self, id: i64) -> Result<Option<Category>>;
    fn find_category_by_name(&self, name: &str) -> Result<Option<Category>>;
    fn find_location(&self, id: i64) -> Result<Option<Location>>;
    fn find_location_by_name(&self, name: &str) -> Result<Option<Location>>;

    fn insert_category(&self, category: &CategoryDraft, id: Option<i64>) -> Result<Category>;
    fn update_category(&self, id: i64, category: &CategoryDraft) -> Result<Category>;
    fn insert_location(&self, location: &LocationDraft, id: Option<i64>) -> Result<Location>;
    fn update_location(&self, id: i64, location: &LocationDraft) -> Result<Location>;
    fn insert_product(&self, product: &ProductDraft, id: Option<i64>) -> Result<Product>;

    fn delete_all_products(&self) -> Result<usize>;
    fn delete_all_categories(&self) -> Result<usize>;
    fn delete_all_locations(&self) -> Result<usize>;

    fn begin_batch(&self) -> Result<()> {
        Ok(())
    }

    fn commit_batch(&self) -> Result<()> {
        Ok(())
    }

    fn rollback_batch(&self) -> Result<()> {
        Ok(())
    }
}

/// Delete every record, products first so no reference is left dangling.
pub fn clear_store(store: &dyn RecordStore) -> Result<()> {
    let products = store.delete_all_products()?;
    let categories = store.delete_all_categories()?;
    let locations = store.delete_all_locations()?;
    log::info!(
        "Cleared store: {products} products, {categories} categories, {locations} locations"
    );
    Ok(())
}
