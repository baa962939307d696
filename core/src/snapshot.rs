use anyhow::{Result, bail};
use chrono::{Local, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::models::{
    Category, CategoryDraft, DEFAULT_CATEGORY_COLOR, DEFAULT_STORAGE_DAYS, DEFAULT_UNIT, Location,
    LocationDraft, Product, ProductDraft,
};
use crate::store::RecordStore;

/// Format version written into every snapshot and expected on restore.
pub const BACKUP_VERSION: &str = "1.0";
pub const BACKUP_DESCRIPTION: &str = "Complete data backup";

/// Point-in-time copy of every category, location and product.
///
/// Collections are optional on the wire so that a truncated or hand-edited
/// file deserializes and can then be rejected with a clear message instead
/// of a parse error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default, with = "timestamp_format")]
    pub backup_timestamp: Option<NaiveDateTime>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub metadata: Option<SnapshotMetadata>,
    #[serde(default)]
    pub categories: Option<Vec<CategoryRecord>>,
    #[serde(default)]
    pub locations: Option<Vec<LocationRecord>>,
    #[serde(default)]
    pub products: Option<Vec<ProductRecord>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SnapshotMetadata {
    pub total_products: usize,
    pub total_categories: usize,
    pub total_locations: usize,
    pub application_version: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CategoryRecord {
    pub id: Option<i64>,
    pub name: String,
    pub color: Option<String>,
    pub default_storage_days: Option<i64>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocationRecord {
    pub id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
    pub freezer_section: Option<String>,
    pub sort_order: Option<i64>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// Product as exported. `category_name` and `location_name` are display
/// hints only; restore remaps references through the source ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProductRecord {
    pub id: Option<i64>,
    pub name: String,
    pub category_id: Option<i64>,
    pub category_name: Option<String>,
    pub location_id: Option<i64>,
    pub location_name: Option<String>,
    pub quantity: f64,
    pub unit: Option<String>,
    pub frozen_date: Option<NaiveDate>,
    pub expiration_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub image_url: Option<String>,
    pub barcode: Option<String>,
    pub user_id: Option<i64>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl From<&Category> for CategoryRecord {
    fn from(c: &Category) -> Self {
        CategoryRecord {
            id: Some(c.id),
            name: c.name.clone(),
            color: Some(c.color.clone()),
            default_storage_days: Some(c.default_storage_days),
            description: c.description.clone(),
            icon: c.icon.clone(),
            created_at: Some(c.created_at.clone()),
            updated_at: Some(c.updated_at.clone()),
        }
    }
}

impl From<&Location> for LocationRecord {
    fn from(l: &Location) -> Self {
        LocationRecord {
            id: Some(l.id),
            name: l.name.clone(),
            description: l.description.clone(),
            freezer_section: l.freezer_section.clone(),
            sort_order: Some(l.sort_order),
            created_at: Some(l.created_at.clone()),
            updated_at: Some(l.updated_at.clone()),
        }
    }
}

impl From<&Product> for ProductRecord {
    fn from(p: &Product) -> Self {
        ProductRecord {
            id: Some(p.id),
            name: p.name.clone(),
            category_id: p.category_id,
            category_name: p.category_name.clone(),
            location_id: p.location_id,
            location_name: p.location_name.clone(),
            quantity: p.quantity,
            unit: Some(p.unit.clone()),
            frozen_date: Some(p.frozen_date),
            expiration_date: p.expiration_date,
            notes: p.notes.clone(),
            image_url: p.image_url.clone(),
            barcode: p.barcode.clone(),
            user_id: p.user_id,
            created_at: Some(p.created_at.clone()),
            updated_at: Some(p.updated_at.clone()),
        }
    }
}

impl CategoryRecord {
    /// Store-ready fields under `name`, filling gaps with the category defaults.
    #[must_use]
    pub fn to_draft(&self, name: &str) -> CategoryDraft {
        CategoryDraft {
            name: name.to_string(),
            color: self
                .color
                .clone()
                .unwrap_or_else(|| DEFAULT_CATEGORY_COLOR.to_string()),
            default_storage_days: self.default_storage_days.unwrap_or(DEFAULT_STORAGE_DAYS),
            description: self.description.clone(),
            icon: self.icon.clone(),
        }
    }
}

impl LocationRecord {
    #[must_use]
    pub fn to_draft(&self, name: &str) -> LocationDraft {
        LocationDraft {
            name: name.to_string(),
            description: self.description.clone(),
            freezer_section: self.freezer_section.clone(),
            sort_order: self.sort_order.unwrap_or(0),
        }
    }
}

impl ProductRecord {
    /// Store-ready fields with already-translated category and location ids.
    pub fn to_draft(
        &self,
        category_id: Option<i64>,
        location_id: Option<i64>,
    ) -> Result<ProductDraft> {
        let Some(frozen_date) = self.frozen_date else {
            bail!("Frozen date is required");
        };
        Ok(ProductDraft {
            name: self.name.clone(),
            category_id,
            location_id,
            quantity: self.quantity,
            unit: self
                .unit
                .clone()
                .unwrap_or_else(|| DEFAULT_UNIT.to_string()),
            frozen_date,
            expiration_date: self.expiration_date,
            notes: self.notes.clone(),
            image_url: self.image_url.clone(),
            barcode: self.barcode.clone(),
            user_id: self.user_id,
        })
    }
}

impl Snapshot {
    /// Names of the collections missing from this snapshot.
    #[must_use]
    pub fn missing_collections(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.categories.is_none() {
            missing.push("categories");
        }
        if self.locations.is_none() {
            missing.push("locations");
        }
        if self.products.is_none() {
            missing.push("products");
        }
        missing
    }

    #[must_use]
    pub fn category_count(&self) -> usize {
        self.categories.as_ref().map_or(0, Vec::len)
    }

    #[must_use]
    pub fn location_count(&self) -> usize {
        self.locations.as_ref().map_or(0, Vec::len)
    }

    #[must_use]
    pub fn product_count(&self) -> usize {
        self.products.as_ref().map_or(0, Vec::len)
    }
}

/// Read every record from `store` into a new snapshot. Read-only.
pub fn build_snapshot(store: &dyn RecordStore) -> Result<Snapshot> {
    let categories: Vec<CategoryRecord> = store
        .all_categories()?
        .iter()
        .map(CategoryRecord::from)
        .collect();
    let locations: Vec<LocationRecord> = store
        .all_locations()?
        .iter()
        .map(LocationRecord::from)
        .collect();
    let products: Vec<ProductRecord> = store
        .all_products()?
        .iter()
        .map(ProductRecord::from)
        .collect();

    log::info!(
        "Built snapshot: {} categories, {} locations, {} products",
        categories.len(),
        locations.len(),
        products.len()
    );

    let now = Local::now().naive_local();
    Ok(Snapshot {
        backup_timestamp: now.with_nanosecond(0),
        version: Some(BACKUP_VERSION.to_string()),
        metadata: Some(SnapshotMetadata {
            total_products: products.len(),
            total_categories: categories.len(),
            total_locations: locations.len(),
            application_version: BACKUP_VERSION.to_string(),
            description: BACKUP_DESCRIPTION.to_string(),
        }),
        categories: Some(categories),
        locations: Some(locations),
        products: Some(products),
    })
}

/// `yyyy-MM-ddTHH:mm:ss` on the wire. Fractional seconds are accepted when reading.
mod timestamp_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::models::TIMESTAMP_FORMAT;

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        value: &Option<NaiveDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(ts) => serializer.serialize_str(&ts.format(TIMESTAMP_FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDateTime>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|s| {
            NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT)
                .or_else(|_| s.parse::<NaiveDateTime>())
                .map_err(serde::de::Error::custom)
        })
        .transpose()
    }
}
