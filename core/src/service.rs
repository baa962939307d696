use std::fmt;
use std::path::Path;

use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime};

use crate::archive::{self, BackupFormat, BackupSummary};
use crate::db::Database;
use crate::models::{
    Category, CategoryDraft, CategoryWithCount, DEFAULT_CATEGORIES, DEFAULT_CATEGORY_ICON,
    DEFAULT_LOCATIONS, DEFAULT_UNIT, EXPIRING_SOON_DAYS, Location, LocationDraft,
    LocationWithCount, NewCategory, NewLocation, NewProduct, Product, ProductDraft, ProductFilter,
    ProductStatistics, add_days, validate_category, validate_location, validate_product,
};
use crate::restore::{RestoreOptions, RestoreOutcome, RestoreRequest, restore};
use crate::snapshot::{Snapshot, build_snapshot};
use crate::store::{RecordStore, clear_store};

/// Business-rule failures, distinguishable from store failures by downcasting
/// the `anyhow::Error` a service method returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    NotFound(String),
    Invalid(String),
    Conflict(String),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(msg) | Self::Invalid(msg) | Self::Conflict(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for ServiceError {}

fn invalid(err: &anyhow::Error) -> anyhow::Error {
    ServiceError::Invalid(format!("{err:#}")).into()
}

/// A serialized backup ready to be written or sent.
#[derive(Debug, Clone)]
pub struct ExportedBackup {
    pub filename: String,
    pub format: BackupFormat,
    pub bytes: Vec<u8>,
}

pub struct FreezerService {
    db: Database,
}

impl FreezerService {
    pub fn new(db_path: &Path) -> Result<Self> {
        let db = Database::open(db_path)?;
        Ok(Self { db })
    }

    pub fn new_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self { db })
    }

    // --- Categories ---

    pub fn list_categories(&self) -> Result<Vec<Category>> {
        self.db.all_categories()
    }

    pub fn get_category(&self, id: i64) -> Result<Category> {
        self.db
            .find_category(id)?
            .ok_or_else(|| ServiceError::NotFound(format!("Category {id} not found")).into())
    }

    pub fn create_category(&self, category: &NewCategory) -> Result<Category> {
        validate_category(category).map_err(|e| invalid(&e))?;
        let draft = CategoryDraft::from(category);
        if self.db.find_category_by_name(&draft.name)?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Category with name '{}' already exists",
                draft.name
            ))
            .into());
        }
        let created = self.db.insert_category(&draft, None)?;
        log::info!("Created category '{}' ({})", created.name, created.id);
        Ok(created)
    }

    /// Absent optional fields keep their current values.
    pub fn update_category(&self, id: i64, category: &NewCategory) -> Result<Category> {
        validate_category(category).map_err(|e| invalid(&e))?;
        let existing = self.get_category(id)?;
        let name = category.name.trim().to_string();
        if let Some(other) = self.db.find_category_by_name(&name)? {
            if other.id != id {
                return Err(ServiceError::Conflict(format!(
                    "Category with name '{name}' already exists"
                ))
                .into());
            }
        }
        let draft = CategoryDraft {
            name,
            color: category.color.clone().unwrap_or(existing.color),
            default_storage_days: category
                .default_storage_days
                .unwrap_or(existing.default_storage_days),
            description: category.description.clone().or(existing.description),
            icon: category.icon.clone().or(existing.icon),
        };
        self.db.update_category(id, &draft)
    }

    pub fn delete_category(&self, id: i64) -> Result<()> {
        let category = self.get_category(id)?;
        let count = self.db.count_products_in_category(id)?;
        if count > 0 {
            return Err(ServiceError::Conflict(format!(
                "Cannot delete category that contains {count} products"
            ))
            .into());
        }
        self.db.delete_category(id)?;
        log::info!("Deleted category '{}' ({id})", category.name);
        Ok(())
    }

    pub fn category_product_counts(&self) -> Result<Vec<CategoryWithCount>> {
        self.db.category_product_counts()
    }

    /// Insert any of the built-in categories that are missing. Returns how many were added.
    pub fn reinitialize_default_categories(&self) -> Result<usize> {
        let mut created = 0;
        for default in &DEFAULT_CATEGORIES {
            if self.db.find_category_by_name(default.name)?.is_some() {
                continue;
            }
            self.db.insert_category(
                &CategoryDraft {
                    name: default.name.to_string(),
                    color: default.color.to_string(),
                    default_storage_days: default.default_storage_days,
                    description: Some(default.description.to_string()),
                    icon: Some(DEFAULT_CATEGORY_ICON.to_string()),
                },
                None,
            )?;
            created += 1;
        }
        log::info!("Initialized {created} default categories");
        Ok(created)
    }

    // --- Locations ---

    pub fn list_locations(&self) -> Result<Vec<Location>> {
        self.db.all_locations()
    }

    pub fn get_location(&self, id: i64) -> Result<Location> {
        self.db
            .find_location(id)?
            .ok_or_else(|| ServiceError::NotFound(format!("Location {id} not found")).into())
    }

    pub fn list_locations_by_section(&self, section: &str) -> Result<Vec<Location>> {
        self.db.list_locations_by_section(section)
    }

    pub fn create_location(&self, location: &NewLocation) -> Result<Location> {
        validate_location(location).map_err(|e| invalid(&e))?;
        let draft = LocationDraft::from(location);
        if self.db.find_location_by_name(&draft.name)?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Location with name '{}' already exists",
                draft.name
            ))
            .into());
        }
        let created = self.db.insert_location(&draft, None)?;
        log::info!("Created location '{}' ({})", created.name, created.id);
        Ok(created)
    }

    pub fn update_location(&self, id: i64, location: &NewLocation) -> Result<Location> {
        validate_location(location).map_err(|e| invalid(&e))?;
        let existing = self.get_location(id)?;
        let name = location.name.trim().to_string();
        if let Some(other) = self.db.find_location_by_name(&name)? {
            if other.id != id {
                return Err(ServiceError::Conflict(format!(
                    "Location with name '{name}' already exists"
                ))
                .into());
            }
        }
        let draft = LocationDraft {
            name,
            description: location.description.clone().or(existing.description),
            freezer_section: location
                .freezer_section
                .clone()
                .or(existing.freezer_section),
            sort_order: location.sort_order.unwrap_or(existing.sort_order),
        };
        self.db.update_location(id, &draft)
    }

    pub fn delete_location(&self, id: i64) -> Result<()> {
        let location = self.get_location(id)?;
        let count = self.db.count_products_in_location(id)?;
        if count > 0 {
            return Err(ServiceError::Conflict(format!(
                "Cannot delete location that contains {count} products"
            ))
            .into());
        }
        self.db.delete_location(id)?;
        log::info!("Deleted location '{}' ({id})", location.name);
        Ok(())
    }

    pub fn location_product_counts(&self) -> Result<Vec<LocationWithCount>> {
        self.db.location_product_counts()
    }

    /// Seed the built-in locations, but only into an empty location table.
    pub fn initialize_default_locations(&self) -> Result<usize> {
        if !self.db.all_locations()?.is_empty() {
            return Ok(0);
        }
        for (name, description, section, sort_order) in DEFAULT_LOCATIONS {
            self.db.insert_location(
                &LocationDraft {
                    name: name.to_string(),
                    description: Some(description.to_string()),
                    freezer_section: Some(section.to_string()),
                    sort_order,
                },
                None,
            )?;
        }
        log::info!("Initialized {} default locations", DEFAULT_LOCATIONS.len());
        Ok(DEFAULT_LOCATIONS.len())
    }

    // --- Products ---

    pub fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>> {
        self.db.list_products(filter)
    }

    pub fn get_product(&self, id: i64) -> Result<Product> {
        self.db
            .get_product(id)
            .map_err(|_| ServiceError::NotFound(format!("Product {id} not found")).into())
    }

    /// Resolve references and defaults for a caller-supplied product.
    fn product_draft(&self, product: &NewProduct, today: NaiveDate) -> Result<ProductDraft> {
        validate_product(product, today).map_err(|e| invalid(&e))?;

        let category = match product.category_id {
            Some(id) => Some(
                self.db
                    .find_category(id)?
                    .ok_or_else(|| ServiceError::Invalid(format!("Category {id} not found")))?,
            ),
            None => None,
        };
        if let Some(id) = product.location_id {
            if self.db.find_location(id)?.is_none() {
                return Err(ServiceError::Invalid(format!("Location {id} not found")).into());
            }
        }

        let frozen_date = product.frozen_date.unwrap_or(today);
        let expiration_date = match (product.expiration_date, category) {
            (Some(date), _) => Some(date),
            (None, Some(c)) => {
                let derived = add_days(frozen_date, c.default_storage_days).ok_or_else(|| {
                    ServiceError::Invalid(format!(
                        "Category '{}' has out-of-range storage days ({})",
                        c.name, c.default_storage_days
                    ))
                })?;
                Some(derived)
            }
            (None, None) => None,
        };

        Ok(ProductDraft {
            name: product.name.trim().to_string(),
            category_id: product.category_id,
            location_id: product.location_id,
            quantity: product.quantity,
            unit: product
                .unit
                .clone()
                .unwrap_or_else(|| DEFAULT_UNIT.to_string()),
            frozen_date,
            expiration_date,
            notes: product.notes.clone(),
            image_url: product.image_url.clone(),
            barcode: product.barcode.clone(),
            user_id: None,
        })
    }

    /// Without an explicit expiration date, one is derived from the
    /// category's storage days.
    pub fn create_product(&self, product: &NewProduct, today: NaiveDate) -> Result<Product> {
        let draft = self.product_draft(product, today)?;
        let created = self.db.insert_product(&draft, None)?;
        log::info!("Created product '{}' ({})", created.name, created.id);
        Ok(created)
    }

    pub fn update_product(
        &self,
        id: i64,
        product: &NewProduct,
        today: NaiveDate,
    ) -> Result<Product> {
        let existing = self.get_product(id)?;
        let mut draft = self.product_draft(product, today)?;
        draft.user_id = existing.user_id;
        self.db.update_product(id, &draft)
    }

    pub fn delete_product(&self, id: i64) -> Result<()> {
        if !self.db.delete_product(id)? {
            return Err(ServiceError::NotFound(format!("Product {id} not found")).into());
        }
        Ok(())
    }

    /// End of a `days`-long window starting at `today`.
    fn window_end(days: i64, today: NaiveDate) -> Result<NaiveDate> {
        if days < 0 {
            return Err(ServiceError::Invalid("days must not be negative".to_string()).into());
        }
        add_days(today, days)
            .ok_or_else(|| ServiceError::Invalid(format!("days is out of range: {days}")).into())
    }

    /// Products expiring on or before `today + days`, expired ones included.
    pub fn expiring_soon(&self, days: i64, today: NaiveDate) -> Result<Vec<Product>> {
        let until = Self::window_end(days, today)?;
        self.db.products_expiring_between(None, until)
    }

    pub fn expired(&self, today: NaiveDate) -> Result<Vec<Product>> {
        self.db.products_expired_before(today)
    }

    /// Products expiring between today and `today + days`, both inclusive.
    pub fn expiring_within(&self, days: i64, today: NaiveDate) -> Result<Vec<Product>> {
        let until = Self::window_end(days, today)?;
        self.db.products_expiring_between(Some(today), until)
    }

    pub fn statistics(&self, today: NaiveDate) -> Result<ProductStatistics> {
        let until = Self::window_end(EXPIRING_SOON_DAYS, today)?;
        Ok(ProductStatistics {
            total_products: self.db.count_products()?,
            expired_products: self.db.count_expired(today)?,
            expiring_soon: self.db.count_expiring_between(today, until)?,
        })
    }

    // --- Backup / Restore ---

    pub fn export_snapshot(&self) -> Result<Snapshot> {
        build_snapshot(&self.db)
    }

    pub fn export_backup(&self, format: BackupFormat, at: NaiveDateTime) -> Result<ExportedBackup> {
        let snapshot = self.export_snapshot()?;
        let bytes = archive::encode_backup(&snapshot, format)?;
        Ok(ExportedBackup {
            filename: archive::backup_filename(format, at),
            format,
            bytes,
        })
    }

    pub fn validate_backup(&self, bytes: &[u8], format: BackupFormat) -> Result<BackupSummary> {
        archive::validate_backup(bytes, format).map_err(|e| invalid(&e))
    }

    pub fn import_backup(
        &self,
        bytes: &[u8],
        format: BackupFormat,
        options: &RestoreOptions,
    ) -> RestoreOutcome {
        archive::import_backup(&self.db, bytes, format, options)
    }

    pub fn restore(&self, request: &RestoreRequest) -> RestoreOutcome {
        restore(&self.db, request.backup.as_ref(), &request.options)
    }

    /// Delete every product, category and location as one unit.
    pub fn clear_all_data(&self) -> Result<()> {
        self.db.begin_batch()?;
        if let Err(e) = clear_store(&self.db).and_then(|()| self.db.commit_batch()) {
            self.db.rollback_batch()?;
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::ConflictPolicy;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn today() -> NaiveDate {
        date(2024, 6, 15)
    }

    fn new_category(name: &str) -> NewCategory {
        NewCategory {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn new_product(name: &str, category_id: Option<i64>) -> NewProduct {
        NewProduct {
            name: name.to_string(),
            category_id,
            quantity: 1.0,
            frozen_date: Some(date(2024, 6, 1)),
            ..Default::default()
        }
    }

    fn service_error(err: &anyhow::Error) -> &ServiceError {
        err.downcast_ref::<ServiceError>().unwrap()
    }

    #[test]
    fn test_create_category_applies_defaults() {
        let svc = FreezerService::new_in_memory().unwrap();
        let c = svc.create_category(&new_category("  Eis  ")).unwrap();
        assert_eq!(c.name, "Eis");
        assert_eq!(c.color, "#3B82F6");
        assert_eq!(c.default_storage_days, 90);
        assert_eq!(c.icon.as_deref(), Some("ArchiveBoxIcon"));
    }

    #[test]
    fn test_create_category_duplicate_name_conflicts() {
        let svc = FreezerService::new_in_memory().unwrap();
        svc.create_category(&new_category("Fleisch")).unwrap();
        let err = svc.create_category(&new_category("fleisch")).unwrap_err();
        assert!(matches!(service_error(&err), ServiceError::Conflict(_)));
        assert_eq!(err.to_string(), "Category with name 'fleisch' already exists");
    }

    #[test]
    fn test_create_category_invalid_color() {
        let svc = FreezerService::new_in_memory().unwrap();
        let err = svc
            .create_category(&NewCategory {
                name: "Fleisch".to_string(),
                color: Some("rot".to_string()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(service_error(&err), ServiceError::Invalid(_)));
    }

    #[test]
    fn test_create_category_rejects_unbounded_storage_days() {
        let svc = FreezerService::new_in_memory().unwrap();
        let err = svc
            .create_category(&NewCategory {
                name: "Fleisch".to_string(),
                default_storage_days: Some(200_000_000),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(service_error(&err), ServiceError::Invalid(_)));
        assert!(svc.list_categories().unwrap().is_empty());
    }

    #[test]
    fn test_update_category_keeps_unset_fields() {
        let svc = FreezerService::new_in_memory().unwrap();
        let c = svc
            .create_category(&NewCategory {
                name: "Fleisch".to_string(),
                color: Some("#EF4444".to_string()),
                default_storage_days: Some(180),
                ..Default::default()
            })
            .unwrap();
        let updated = svc
            .update_category(c.id, &new_category("Fleisch & Wurst"))
            .unwrap();
        assert_eq!(updated.name, "Fleisch & Wurst");
        assert_eq!(updated.color, "#EF4444");
        assert_eq!(updated.default_storage_days, 180);
    }

    #[test]
    fn test_update_category_rename_onto_other_conflicts() {
        let svc = FreezerService::new_in_memory().unwrap();
        svc.create_category(&new_category("Fleisch")).unwrap();
        let veg = svc.create_category(&new_category("Gemüse")).unwrap();
        let err = svc
            .update_category(veg.id, &new_category("Fleisch"))
            .unwrap_err();
        assert!(matches!(service_error(&err), ServiceError::Conflict(_)));
        // Renaming to its own name is fine
        assert!(svc.update_category(veg.id, &new_category("Gemüse")).is_ok());
    }

    #[test]
    fn test_get_missing_category_is_not_found() {
        let svc = FreezerService::new_in_memory().unwrap();
        let err = svc.get_category(42).unwrap_err();
        assert_eq!(
            service_error(&err),
            &ServiceError::NotFound("Category 42 not found".to_string())
        );
    }

    #[test]
    fn test_delete_category_refused_while_in_use() {
        let svc = FreezerService::new_in_memory().unwrap();
        let c = svc.create_category(&new_category("Fleisch")).unwrap();
        let p = svc
            .create_product(&new_product("Steak", Some(c.id)), today())
            .unwrap();
        let err = svc.delete_category(c.id).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot delete category that contains 1 products"
        );
        svc.delete_product(p.id).unwrap();
        svc.delete_category(c.id).unwrap();
        assert!(svc.list_categories().unwrap().is_empty());
    }

    #[test]
    fn test_reinitialize_default_categories_skips_existing() {
        let svc = FreezerService::new_in_memory().unwrap();
        svc.create_category(&new_category("Reste")).unwrap();
        assert_eq!(svc.reinitialize_default_categories().unwrap(), 5);
        assert_eq!(svc.reinitialize_default_categories().unwrap(), 0);
        assert_eq!(svc.list_categories().unwrap().len(), 6);
        let meat = svc
            .list_categories()
            .unwrap()
            .into_iter()
            .find(|c| c.name == "Fleisch")
            .unwrap();
        assert_eq!(meat.default_storage_days, 180);
        assert_eq!(meat.color, "#EF4444");
    }

    #[test]
    fn test_initialize_default_locations_only_when_empty() {
        let svc = FreezerService::new_in_memory().unwrap();
        assert_eq!(svc.initialize_default_locations().unwrap(), 6);
        assert_eq!(svc.initialize_default_locations().unwrap(), 0);
        let locations = svc.list_locations().unwrap();
        assert_eq!(locations[0].name, "Oberes Fach");
        assert_eq!(locations[5].name, "Türfach");
        assert_eq!(locations[5].freezer_section.as_deref(), Some("door"));
        assert_eq!(svc.list_locations_by_section("drawer2").unwrap().len(), 1);
    }

    #[test]
    fn test_location_crud() {
        let svc = FreezerService::new_in_memory().unwrap();
        let l = svc
            .create_location(&NewLocation {
                name: "Oben".to_string(),
                sort_order: Some(2),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(l.sort_order, 2);
        let err = svc
            .create_location(&NewLocation {
                name: "OBEN".to_string(),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(service_error(&err), ServiceError::Conflict(_)));

        let updated = svc
            .update_location(
                l.id,
                &NewLocation {
                    name: "Ganz oben".to_string(),
                    freezer_section: Some("upper".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.sort_order, 2);
        assert_eq!(updated.freezer_section.as_deref(), Some("upper"));

        svc.delete_location(l.id).unwrap();
        assert!(svc.get_location(l.id).is_err());
    }

    #[test]
    fn test_delete_location_refused_while_in_use() {
        let svc = FreezerService::new_in_memory().unwrap();
        svc.initialize_default_locations().unwrap();
        let top = svc.list_locations().unwrap().remove(0);
        let mut product = new_product("Erbsen", None);
        product.location_id = Some(top.id);
        svc.create_product(&product, today()).unwrap();
        let err = svc.delete_location(top.id).unwrap_err();
        assert!(matches!(service_error(&err), ServiceError::Conflict(_)));
        assert_eq!(svc.location_product_counts().unwrap()[0].product_count, 1);
    }

    #[test]
    fn test_create_product_derives_expiration_from_category() {
        let svc = FreezerService::new_in_memory().unwrap();
        let c = svc
            .create_category(&NewCategory {
                name: "Reste".to_string(),
                default_storage_days: Some(30),
                ..Default::default()
            })
            .unwrap();
        let p = svc
            .create_product(&new_product("Gulasch", Some(c.id)), today())
            .unwrap();
        assert_eq!(p.expiration_date, Some(date(2024, 7, 1)));
        assert_eq!(p.unit, "pieces");
        assert_eq!(p.category_name.as_deref(), Some("Reste"));
    }

    #[test]
    fn test_create_product_with_out_of_range_storage_days_is_invalid() {
        let svc = FreezerService::new_in_memory().unwrap();
        let stored = svc
            .db
            .insert_category(
                &CategoryDraft {
                    name: "Ewigkeit".to_string(),
                    color: "#3B82F6".to_string(),
                    default_storage_days: 200_000_000,
                    description: None,
                    icon: None,
                },
                None,
            )
            .unwrap();
        let err = svc
            .create_product(&new_product("Gulasch", Some(stored.id)), today())
            .unwrap_err();
        assert!(matches!(service_error(&err), ServiceError::Invalid(_)));
        assert_eq!(svc.db.count_products().unwrap(), 0);
    }

    #[test]
    fn test_create_product_explicit_expiration_wins() {
        let svc = FreezerService::new_in_memory().unwrap();
        let c = svc.create_category(&new_category("Reste")).unwrap();
        let mut product = new_product("Gulasch", Some(c.id));
        product.expiration_date = Some(date(2024, 6, 20));
        let p = svc.create_product(&product, today()).unwrap();
        assert_eq!(p.expiration_date, Some(date(2024, 6, 20)));
    }

    #[test]
    fn test_create_product_without_category_never_expires() {
        let svc = FreezerService::new_in_memory().unwrap();
        let mut product = new_product("Eiswürfel", None);
        product.frozen_date = None;
        let p = svc.create_product(&product, today()).unwrap();
        assert_eq!(p.frozen_date, today());
        assert_eq!(p.expiration_date, None);
        assert_eq!(p.days_until_expiration(today()), crate::models::NEVER_EXPIRES);
    }

    #[test]
    fn test_create_product_rejects_unknown_references() {
        let svc = FreezerService::new_in_memory().unwrap();
        let err = svc
            .create_product(&new_product("Steak", Some(99)), today())
            .unwrap_err();
        assert!(matches!(service_error(&err), ServiceError::Invalid(_)));

        let mut product = new_product("Steak", None);
        product.location_id = Some(99);
        let err = svc.create_product(&product, today()).unwrap_err();
        assert_eq!(err.to_string(), "Location 99 not found");
    }

    #[test]
    fn test_create_product_rejects_future_frozen_date() {
        let svc = FreezerService::new_in_memory().unwrap();
        let mut product = new_product("Steak", None);
        product.frozen_date = Some(date(2024, 6, 16));
        let err = svc.create_product(&product, today()).unwrap_err();
        assert!(matches!(service_error(&err), ServiceError::Invalid(_)));
    }

    #[test]
    fn test_update_product_clears_missing_references() {
        let svc = FreezerService::new_in_memory().unwrap();
        let c = svc.create_category(&new_category("Fleisch")).unwrap();
        let p = svc
            .create_product(&new_product("Steak", Some(c.id)), today())
            .unwrap();
        let mut update = new_product("Steak", None);
        update.quantity = 3.0;
        let updated = svc.update_product(p.id, &update, today()).unwrap();
        assert_eq!(updated.category_id, None);
        assert_eq!(updated.expiration_date, None);
        assert_eq!(updated.quantity, 3.0);

        let err = svc.update_product(999, &update, today()).unwrap_err();
        assert!(matches!(service_error(&err), ServiceError::NotFound(_)));
    }

    #[test]
    fn test_expiry_views_and_statistics() {
        let svc = FreezerService::new_in_memory().unwrap();
        for (name, expires) in [
            ("Alt", Some(date(2024, 6, 1))),
            ("Bald", Some(date(2024, 6, 18))),
            ("Woche", Some(date(2024, 6, 22))),
            ("Später", Some(date(2024, 8, 1))),
            ("Ewig", None),
        ] {
            let mut product = new_product(name, None);
            product.expiration_date = expires;
            svc.create_product(&product, today()).unwrap();
        }

        let soon: Vec<String> = svc
            .expiring_soon(7, today())
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(soon, vec!["Alt", "Bald", "Woche"]);

        let within: Vec<String> = svc
            .expiring_within(7, today())
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(within, vec!["Bald", "Woche"]);

        let expired = svc.expired(today()).unwrap();
        assert_eq!(expired.len(), 1);
        assert!(expired[0].is_expired(today()));

        assert!(svc.expiring_soon(-1, today()).is_err());

        assert_eq!(
            svc.statistics(today()).unwrap(),
            ProductStatistics {
                total_products: 5,
                expired_products: 1,
                expiring_soon: 2,
            }
        );
    }

    #[test]
    fn test_expiry_window_out_of_range_is_invalid() {
        let svc = FreezerService::new_in_memory().unwrap();
        let err = svc.expiring_soon(200_000_000, today()).unwrap_err();
        assert!(matches!(service_error(&err), ServiceError::Invalid(_)));
        let err = svc.expiring_within(i64::MAX, today()).unwrap_err();
        assert!(matches!(service_error(&err), ServiceError::Invalid(_)));

        let end_of_time = NaiveDate::MAX;
        let err = svc.statistics(end_of_time).unwrap_err();
        assert!(matches!(service_error(&err), ServiceError::Invalid(_)));
    }

    #[test]
    fn test_export_import_between_services() {
        let source = FreezerService::new_in_memory().unwrap();
        source.reinitialize_default_categories().unwrap();
        source.initialize_default_locations().unwrap();
        let first = source.list_categories().unwrap().remove(0);
        source
            .create_product(&new_product("Toast", Some(first.id)), today())
            .unwrap();

        let at = date(2024, 6, 15).and_hms_opt(12, 0, 0).unwrap();
        let exported = source.export_backup(BackupFormat::Archive, at).unwrap();
        assert_eq!(exported.filename, "frostbox-backup-2024-06-15_12-00-00.tar.gz");

        let summary = source
            .validate_backup(&exported.bytes, exported.format)
            .unwrap();
        assert_eq!((summary.categories, summary.locations, summary.products), (6, 6, 1));

        let target = FreezerService::new_in_memory().unwrap();
        let outcome = target.import_backup(
            &exported.bytes,
            exported.format,
            &RestoreOptions::default(),
        );
        assert!(outcome.success, "{outcome:?}");
        assert_eq!(outcome.stats.products_imported, 1);
        let products = target.list_products(&ProductFilter::default()).unwrap();
        assert_eq!(products[0].category_name.as_deref(), Some(first.name.as_str()));
    }

    #[test]
    fn test_validate_backup_rejects_garbage_as_invalid() {
        let svc = FreezerService::new_in_memory().unwrap();
        let err = svc
            .validate_backup(b"not a backup", BackupFormat::Json)
            .unwrap_err();
        assert!(matches!(service_error(&err), ServiceError::Invalid(_)));
    }

    #[test]
    fn test_restore_request_with_clear() {
        let svc = FreezerService::new_in_memory().unwrap();
        svc.reinitialize_default_categories().unwrap();
        let request = RestoreRequest {
            backup: Some(svc.export_snapshot().unwrap()),
            options: RestoreOptions {
                clear_existing_data: true,
                conflict_resolution: ConflictPolicy::Rename,
                preserve_ids: false,
            },
        };
        let outcome = svc.restore(&request);
        assert!(outcome.success);
        // Cleared first, so nothing collides
        assert!(outcome.conflicts.is_empty());
        assert_eq!(outcome.stats.categories_imported, 6);
        assert_eq!(svc.list_categories().unwrap().len(), 6);
    }

    #[test]
    fn test_clear_all_data() {
        let svc = FreezerService::new_in_memory().unwrap();
        svc.reinitialize_default_categories().unwrap();
        svc.initialize_default_locations().unwrap();
        let meat = svc.list_categories().unwrap().remove(0);
        svc.create_product(&new_product("Steak", Some(meat.id)), today())
            .unwrap();

        svc.clear_all_data().unwrap();
        assert!(svc.list_categories().unwrap().is_empty());
        assert!(svc.list_locations().unwrap().is_empty());
        assert!(svc.list_products(&ProductFilter::default()).unwrap().is_empty());
    }
}
