use anyhow::{Result, bail};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

/// Local date-time layout used for entity timestamps and snapshot timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub const DEFAULT_CATEGORY_COLOR: &str = "#3B82F6";
pub const DEFAULT_STORAGE_DAYS: i64 = 90;
pub const DEFAULT_CATEGORY_ICON: &str = "ArchiveBoxIcon";
pub const DEFAULT_UNIT: &str = "pieces";

/// Returned by [`Product::days_until_expiration`] when a product has no expiration date.
pub const NEVER_EXPIRES: i64 = i64::MAX;

/// Threshold used by the product statistics for "expiring soon".
pub const EXPIRING_SOON_DAYS: i64 = 7;

/// Upper bound on a category's storage days (about a century).
pub const MAX_STORAGE_DAYS: i64 = 36_500;

/// `date` moved forward by `days`, or `None` when the result leaves chrono's range.
#[must_use]
pub fn add_days(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    chrono::Duration::try_days(days).and_then(|d| date.checked_add_signed(d))
}

pub struct DefaultCategory {
    pub name: &'static str,
    pub color: &'static str,
    pub default_storage_days: i64,
    pub description: &'static str,
}

pub const DEFAULT_CATEGORIES: [DefaultCategory; 6] = [
    DefaultCategory {
        name: "Fleisch",
        color: "#EF4444",
        default_storage_days: 180,
        description: "Fleisch und Geflügel",
    },
    DefaultCategory {
        name: "Gemüse",
        color: "#22C55E",
        default_storage_days: 365,
        description: "Gefrorenes Gemüse",
    },
    DefaultCategory {
        name: "Fertiggerichte",
        color: "#F59E0B",
        default_storage_days: 90,
        description: "Fertige Mahlzeiten",
    },
    DefaultCategory {
        name: "Brot & Backwaren",
        color: "#8B5CF6",
        default_storage_days: 90,
        description: "Brot, Brötchen und Backwaren",
    },
    DefaultCategory {
        name: "Eis & Desserts",
        color: "#EC4899",
        default_storage_days: 365,
        description: "Eis und gefrorene Nachspeisen",
    },
    DefaultCategory {
        name: "Reste",
        color: "#6B7280",
        default_storage_days: 30,
        description: "Übriggebliebene Mahlzeiten",
    },
];

/// (name, description, freezer section, sort order)
pub const DEFAULT_LOCATIONS: [(&str, &str, &str, i64); 6] = [
    ("Oberes Fach", "Oberes Gefrierfach", "upper", 1),
    ("Mittleres Fach", "Mittleres Gefrierfach", "middle", 2),
    ("Unteres Fach", "Unteres Gefrierfach", "lower", 3),
    ("Schublade 1", "Erste Gefrierschublade", "drawer1", 4),
    ("Schublade 2", "Zweite Gefrierschublade", "drawer2", 5),
    ("Türfach", "Gefrierfach in der Tür", "door", 6),
];

const MAX_NAME_LEN: usize = 100;
const MAX_PRODUCT_NAME_LEN: usize = 200;
const MAX_DESCRIPTION_LEN: usize = 500;
const MAX_SECTION_LEN: usize = 50;
const MAX_UNIT_LEN: usize = 20;
const MAX_NOTES_LEN: usize = 1000;
const MAX_IMAGE_URL_LEN: usize = 500;
const MAX_BARCODE_LEN: usize = 50;

#[must_use]
pub fn now_timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

// --- Categories ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub color: String,
    pub default_storage_days: i64,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Category fields supplied by a caller. Absent values fall back to the store defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewCategory {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub default_storage_days: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

/// Category fields as written to the store, with defaults already applied.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryDraft {
    pub name: String,
    pub color: String,
    pub default_storage_days: i64,
    pub description: Option<String>,
    pub icon: Option<String>,
}

impl From<&NewCategory> for CategoryDraft {
    fn from(c: &NewCategory) -> Self {
        CategoryDraft {
            name: c.name.trim().to_string(),
            color: c
                .color
                .clone()
                .unwrap_or_else(|| DEFAULT_CATEGORY_COLOR.to_string()),
            default_storage_days: c.default_storage_days.unwrap_or(DEFAULT_STORAGE_DAYS),
            description: c.description.clone(),
            icon: Some(
                c.icon
                    .clone()
                    .unwrap_or_else(|| DEFAULT_CATEGORY_ICON.to_string()),
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryWithCount {
    #[serde(flatten)]
    pub category: Category,
    pub product_count: i64,
}

// --- Locations ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Location {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub freezer_section: Option<String>,
    pub sort_order: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewLocation {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub freezer_section: Option<String>,
    #[serde(default)]
    pub sort_order: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationDraft {
    pub name: String,
    pub description: Option<String>,
    pub freezer_section: Option<String>,
    pub sort_order: i64,
}

impl From<&NewLocation> for LocationDraft {
    fn from(l: &NewLocation) -> Self {
        LocationDraft {
            name: l.name.trim().to_string(),
            description: l.description.clone(),
            freezer_section: l.freezer_section.clone(),
            sort_order: l.sort_order.unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LocationWithCount {
    #[serde(flatten)]
    pub location: Location,
    pub product_count: i64,
}

// --- Products ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub category_id: Option<i64>,
    pub location_id: Option<i64>,
    pub quantity: f64,
    pub unit: String,
    pub frozen_date: NaiveDate,
    pub expiration_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub image_url: Option<String>,
    pub barcode: Option<String>,
    /// Reserved for multi-user support; carried through backups untouched.
    pub user_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
    // Joined fields for display
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub category_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub location_name: Option<String>,
}

impl Product {
    #[must_use]
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiration_date.is_some_and(|d| d < today)
    }

    #[must_use]
    pub fn is_expiring_soon(&self, days: i64, today: NaiveDate) -> bool {
        self.expiration_date
            .is_some_and(|d| (d - today).num_days() < days)
    }

    /// Days from `today` until the expiration date; negative once expired.
    #[must_use]
    pub fn days_until_expiration(&self, today: NaiveDate) -> i64 {
        self.expiration_date
            .map_or(NEVER_EXPIRES, |d| (d - today).num_days())
    }
}

/// Product fields as written to the store. No defaults are applied at this level.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductDraft {
    pub name: String,
    pub category_id: Option<i64>,
    pub location_id: Option<i64>,
    pub quantity: f64,
    pub unit: String,
    pub frozen_date: NaiveDate,
    pub expiration_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub image_url: Option<String>,
    pub barcode: Option<String>,
    pub user_id: Option<i64>,
}

/// Product fields supplied by a caller of the service layer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub location_id: Option<i64>,
    pub quantity: f64,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub frozen_date: Option<NaiveDate>,
    #[serde(default)]
    pub expiration_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub barcode: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub category_id: Option<i64>,
    pub location_id: Option<i64>,
    pub name: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProductStatistics {
    pub total_products: i64,
    pub expired_products: i64,
    pub expiring_soon: i64,
}

// --- Validation ---

fn check_len(field: &str, value: Option<&str>, max: usize) -> Result<()> {
    if let Some(v) = value {
        if v.chars().count() > max {
            bail!("{field} must be less than {max} characters");
        }
    }
    Ok(())
}

/// `#RRGGBB`, case-insensitive.
#[must_use]
pub fn is_hex_color(color: &str) -> bool {
    color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit())
}

pub fn validate_category(category: &NewCategory) -> Result<()> {
    if category.name.trim().is_empty() {
        bail!("Category name is required");
    }
    check_len("Category name", Some(&category.name), MAX_NAME_LEN)?;
    if let Some(color) = category.color.as_deref() {
        check_color(color)?;
    }
    if let Some(days) = category.default_storage_days {
        check_storage_days(days)?;
    }
    check_len("Description", category.description.as_deref(), MAX_DESCRIPTION_LEN)?;
    Ok(())
}

fn check_color(color: &str) -> Result<()> {
    if !is_hex_color(color) {
        bail!("Invalid color '{color}'. Must be a hex color like #3B82F6");
    }
    Ok(())
}

fn check_storage_days(days: i64) -> Result<()> {
    if !(0..=MAX_STORAGE_DAYS).contains(&days) {
        bail!("default_storage_days must be between 0 and {MAX_STORAGE_DAYS}");
    }
    Ok(())
}

pub fn validate_location(location: &NewLocation) -> Result<()> {
    if location.name.trim().is_empty() {
        bail!("Location name is required");
    }
    check_location_fields(
        &location.name,
        location.description.as_deref(),
        location.freezer_section.as_deref(),
    )
}

fn check_location_fields(
    name: &str,
    description: Option<&str>,
    freezer_section: Option<&str>,
) -> Result<()> {
    check_len("Location name", Some(name), MAX_NAME_LEN)?;
    check_len("Description", description, MAX_DESCRIPTION_LEN)?;
    check_len("Freezer section", freezer_section, MAX_SECTION_LEN)?;
    Ok(())
}

/// Validate caller-supplied product fields against `today`.
pub fn validate_product(product: &NewProduct, today: NaiveDate) -> Result<()> {
    if product.name.trim().is_empty() {
        bail!("Product name is required");
    }
    check_len("Product name", Some(&product.name), MAX_PRODUCT_NAME_LEN)?;
    if product.quantity.is_nan() || product.quantity <= 0.0 {
        bail!("Quantity must be greater than 0");
    }
    check_len("Unit", product.unit.as_deref(), MAX_UNIT_LEN)?;
    if product.frozen_date.is_some_and(|d| d > today) {
        bail!("Frozen date cannot be in the future");
    }
    check_len("Notes", product.notes.as_deref(), MAX_NOTES_LEN)?;
    check_len("Image URL", product.image_url.as_deref(), MAX_IMAGE_URL_LEN)?;
    check_len("Barcode", product.barcode.as_deref(), MAX_BARCODE_LEN)?;
    Ok(())
}

/// Same field rules as [`validate_category`], applied to a fully resolved draft
/// such as one built from a backup record.
pub fn validate_category_draft(draft: &CategoryDraft) -> Result<()> {
    if draft.name.trim().is_empty() {
        bail!("Category name is required");
    }
    check_len("Category name", Some(&draft.name), MAX_NAME_LEN)?;
    check_color(&draft.color)?;
    check_storage_days(draft.default_storage_days)?;
    check_len("Description", draft.description.as_deref(), MAX_DESCRIPTION_LEN)?;
    Ok(())
}

pub fn validate_location_draft(draft: &LocationDraft) -> Result<()> {
    if draft.name.trim().is_empty() {
        bail!("Location name is required");
    }
    check_location_fields(
        &draft.name,
        draft.description.as_deref(),
        draft.freezer_section.as_deref(),
    )
}

/// Minimal checks a product must pass before it is written, whatever its origin.
pub fn validate_product_draft(draft: &ProductDraft) -> Result<()> {
    if draft.name.trim().is_empty() {
        bail!("Product name is required");
    }
    if draft.quantity.is_nan() || draft.quantity <= 0.0 {
        bail!("Quantity must be greater than 0");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_product(expiration_date: Option<NaiveDate>) -> Product {
        Product {
            id: 1,
            name: "Steak".to_string(),
            category_id: None,
            location_id: None,
            quantity: 1.5,
            unit: "kg".to_string(),
            frozen_date: date(2024, 6, 1),
            expiration_date,
            notes: None,
            image_url: None,
            barcode: None,
            user_id: None,
            created_at: String::new(),
            updated_at: String::new(),
            category_name: None,
            location_name: None,
        }
    }

    #[test]
    fn test_product_without_expiration_never_expires() {
        let p = sample_product(None);
        let today = date(2024, 6, 15);
        assert!(!p.is_expired(today));
        assert!(!p.is_expiring_soon(365, today));
        assert_eq!(p.days_until_expiration(today), NEVER_EXPIRES);
    }

    #[test]
    fn test_product_expired() {
        let p = sample_product(Some(date(2024, 6, 14)));
        let today = date(2024, 6, 15);
        assert!(p.is_expired(today));
        assert_eq!(p.days_until_expiration(today), -1);
    }

    #[test]
    fn test_product_expiring_today_is_not_expired() {
        let p = sample_product(Some(date(2024, 6, 15)));
        assert!(!p.is_expired(date(2024, 6, 15)));
        assert_eq!(p.days_until_expiration(date(2024, 6, 15)), 0);
    }

    #[test]
    fn test_product_expiring_soon_is_strict() {
        let p = sample_product(Some(date(2024, 6, 22)));
        let today = date(2024, 6, 15);
        // 22 < 15 + 7 is false, 22 < 15 + 8 is true
        assert!(!p.is_expiring_soon(7, today));
        assert!(p.is_expiring_soon(8, today));
        assert_eq!(p.days_until_expiration(today), 7);
    }

    #[test]
    fn test_expiring_soon_with_huge_window() {
        let p = sample_product(Some(date(2024, 6, 22)));
        assert!(p.is_expiring_soon(i64::MAX, date(2024, 6, 15)));
        assert!(!p.is_expiring_soon(i64::MIN, date(2024, 6, 15)));
    }

    #[test]
    fn test_add_days_out_of_range() {
        assert_eq!(add_days(date(2024, 6, 15), 7), Some(date(2024, 6, 22)));
        assert_eq!(add_days(date(2024, 6, 15), 200_000_000), None);
        assert_eq!(add_days(date(2024, 6, 15), i64::MAX), None);
    }

    #[test]
    fn test_is_hex_color() {
        assert!(is_hex_color("#3B82F6"));
        assert!(is_hex_color("#ef4444"));
        assert!(!is_hex_color("3B82F6"));
        assert!(!is_hex_color("#3B82F"));
        assert!(!is_hex_color("#GGGGGG"));
        assert!(!is_hex_color(""));
    }

    #[test]
    fn test_validate_category_valid() {
        let c = NewCategory {
            name: "Fleisch".to_string(),
            color: Some("#EF4444".to_string()),
            default_storage_days: Some(180),
            ..Default::default()
        };
        assert!(validate_category(&c).is_ok());
    }

    #[test]
    fn test_validate_category_blank_name() {
        let c = NewCategory {
            name: "   ".to_string(),
            ..Default::default()
        };
        assert!(validate_category(&c).is_err());
    }

    #[test]
    fn test_validate_category_bad_color() {
        let c = NewCategory {
            name: "Fleisch".to_string(),
            color: Some("red".to_string()),
            ..Default::default()
        };
        assert!(validate_category(&c).is_err());
    }

    #[test]
    fn test_validate_category_negative_days() {
        let c = NewCategory {
            name: "Fleisch".to_string(),
            default_storage_days: Some(-1),
            ..Default::default()
        };
        assert!(validate_category(&c).is_err());
    }

    #[test]
    fn test_validate_category_storage_days_upper_bound() {
        let mut c = NewCategory {
            name: "Fleisch".to_string(),
            default_storage_days: Some(MAX_STORAGE_DAYS),
            ..Default::default()
        };
        assert!(validate_category(&c).is_ok());
        c.default_storage_days = Some(200_000_000);
        let err = validate_category(&c).unwrap_err();
        assert!(err.to_string().contains("between 0 and 36500"));
    }

    #[test]
    fn test_validate_category_draft_field_rules() {
        let good = CategoryDraft {
            name: "Fleisch".to_string(),
            color: "#EF4444".to_string(),
            default_storage_days: 180,
            description: None,
            icon: None,
        };
        assert!(validate_category_draft(&good).is_ok());

        let bad_color = CategoryDraft {
            color: "red".to_string(),
            ..good.clone()
        };
        assert!(validate_category_draft(&bad_color).is_err());

        let negative_days = CategoryDraft {
            default_storage_days: -30,
            ..good.clone()
        };
        assert!(validate_category_draft(&negative_days).is_err());

        let long_description = CategoryDraft {
            description: Some("d".repeat(501)),
            ..good
        };
        assert!(validate_category_draft(&long_description).is_err());
    }

    #[test]
    fn test_validate_location_draft_lengths() {
        let mut draft = LocationDraft {
            name: "Schublade 1".to_string(),
            description: None,
            freezer_section: Some("drawer1".to_string()),
            sort_order: 1,
        };
        assert!(validate_location_draft(&draft).is_ok());
        draft.freezer_section = Some("s".repeat(51));
        assert!(validate_location_draft(&draft).is_err());
        draft.freezer_section = None;
        draft.name = "n".repeat(101);
        assert!(validate_location_draft(&draft).is_err());
    }

    #[test]
    fn test_validate_category_name_too_long() {
        let c = NewCategory {
            name: "x".repeat(101),
            ..Default::default()
        };
        assert!(validate_category(&c).is_err());
    }

    #[test]
    fn test_validate_location() {
        let ok = NewLocation {
            name: "Schublade 1".to_string(),
            freezer_section: Some("drawer1".to_string()),
            ..Default::default()
        };
        assert!(validate_location(&ok).is_ok());

        let long_section = NewLocation {
            name: "Schublade 1".to_string(),
            freezer_section: Some("d".repeat(51)),
            ..Default::default()
        };
        assert!(validate_location(&long_section).is_err());

        let blank = NewLocation::default();
        assert!(validate_location(&blank).is_err());
    }

    #[test]
    fn test_validate_product_valid() {
        let p = NewProduct {
            name: "Erbsen".to_string(),
            quantity: 0.5,
            frozen_date: Some(date(2024, 6, 15)),
            ..Default::default()
        };
        assert!(validate_product(&p, date(2024, 6, 15)).is_ok());
    }

    #[test]
    fn test_validate_product_zero_quantity() {
        let p = NewProduct {
            name: "Erbsen".to_string(),
            quantity: 0.0,
            ..Default::default()
        };
        assert!(validate_product(&p, date(2024, 6, 15)).is_err());
    }

    #[test]
    fn test_validate_product_future_frozen_date() {
        let p = NewProduct {
            name: "Erbsen".to_string(),
            quantity: 1.0,
            frozen_date: Some(date(2024, 6, 16)),
            ..Default::default()
        };
        assert!(validate_product(&p, date(2024, 6, 15)).is_err());
    }

    #[test]
    fn test_validate_product_long_unit() {
        let p = NewProduct {
            name: "Erbsen".to_string(),
            quantity: 1.0,
            unit: Some("u".repeat(21)),
            ..Default::default()
        };
        assert!(validate_product(&p, date(2024, 6, 15)).is_err());
    }

    #[test]
    fn test_validate_product_draft() {
        let mut draft = ProductDraft {
            name: "Steak".to_string(),
            category_id: None,
            location_id: None,
            quantity: 1.0,
            unit: DEFAULT_UNIT.to_string(),
            frozen_date: date(2024, 6, 1),
            expiration_date: None,
            notes: None,
            image_url: None,
            barcode: None,
            user_id: None,
        };
        assert!(validate_product_draft(&draft).is_ok());
        draft.quantity = -2.0;
        assert!(validate_product_draft(&draft).is_err());
        draft.quantity = 1.0;
        draft.name = String::new();
        assert!(validate_product_draft(&draft).is_err());
    }
}
