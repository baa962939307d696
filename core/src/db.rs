use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{Connection, params};

use crate::models::{
    Category, CategoryDraft, CategoryWithCount, DATE_FORMAT, Location, LocationDraft,
    LocationWithCount, Product, ProductDraft, ProductFilter, now_timestamp,
};
use crate::store::RecordStore;

const PRODUCT_SELECT: &str = "SELECT p.id, p.name, p.category_id, p.location_id, p.quantity, p.unit,
        p.frozen_date, p.expiration_date, p.notes, p.image_url, p.barcode, p.user_id,
        p.created_at, p.updated_at, c.name, l.name
     FROM products p
     LEFT JOIN categories c ON p.category_id = c.id
     LEFT JOIN locations l ON p.location_id = l.id";

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS categories (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE COLLATE NOCASE,
                    color TEXT NOT NULL,
                    default_storage_days INTEGER NOT NULL,
                    description TEXT,
                    icon TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS locations (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE COLLATE NOCASE,
                    description TEXT,
                    freezer_section TEXT,
                    sort_order INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS products (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    category_id INTEGER REFERENCES categories(id),
                    location_id INTEGER REFERENCES locations(id),
                    quantity REAL NOT NULL CHECK (quantity > 0),
                    unit TEXT NOT NULL,
                    frozen_date TEXT NOT NULL,
                    expiration_date TEXT,
                    notes TEXT,
                    image_url TEXT,
                    barcode TEXT,
                    user_id INTEGER,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_products_category ON products(category_id);
                CREATE INDEX IF NOT EXISTS idx_products_location ON products(location_id);
                CREATE INDEX IF NOT EXISTS idx_products_expiration ON products(expiration_date);

                PRAGMA user_version = 1;",
            )?;
        }

        if version < 2 {
            self.conn.execute_batch(
                "CREATE INDEX IF NOT EXISTS idx_products_barcode ON products(barcode);
                 CREATE INDEX IF NOT EXISTS idx_locations_section ON locations(freezer_section);
                 PRAGMA user_version = 2;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    fn date_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDate> {
        let text: String = row.get(idx)?;
        NaiveDate::parse_from_str(&text, DATE_FORMAT).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
    }

    fn category_from_row(row: &rusqlite::Row) -> rusqlite::Result<Category> {
        Ok(Category {
            id: row.get(0)?,
            name: row.get(1)?,
            color: row.get(2)?,
            default_storage_days: row.get(3)?,
            description: row.get(4)?,
            icon: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn location_from_row(row: &rusqlite::Row) -> rusqlite::Result<Location> {
        Ok(Location {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            freezer_section: row.get(3)?,
            sort_order: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    // Expects the column order of PRODUCT_SELECT
    fn product_from_row(row: &rusqlite::Row) -> rusqlite::Result<Product> {
        let expiration_date = match row.get::<_, Option<String>>(7)? {
            Some(_) => Some(Self::date_column(row, 7)?),
            None => None,
        };
        Ok(Product {
            id: row.get(0)?,
            name: row.get(1)?,
            category_id: row.get(2)?,
            location_id: row.get(3)?,
            quantity: row.get(4)?,
            unit: row.get(5)?,
            frozen_date: Self::date_column(row, 6)?,
            expiration_date,
            notes: row.get(8)?,
            image_url: row.get(9)?,
            barcode: row.get(10)?,
            user_id: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
            category_name: row.get(14)?,
            location_name: row.get(15)?,
        })
    }

    fn query_products(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Product>> {
        let mut stmt = self.conn.prepare(sql)?;
        let products = stmt
            .query_map(params, Self::product_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(products)
    }

    // --- Categories ---

    pub fn get_category(&self, id: i64) -> Result<Category> {
        self.find_category(id)?.context("Category not found")
    }

    pub fn delete_category(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM categories WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    pub fn count_products_in_category(&self, id: i64) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM products WHERE category_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn category_product_counts(&self) -> Result<Vec<CategoryWithCount>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.id, c.name, c.color, c.default_storage_days, c.description, c.icon,
                    c.created_at, c.updated_at, COUNT(p.id)
             FROM categories c
             LEFT JOIN products p ON p.category_id = c.id
             GROUP BY c.id
             ORDER BY c.name",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(CategoryWithCount {
                    category: Self::category_from_row(row)?,
                    product_count: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // --- Locations ---

    pub fn get_location(&self, id: i64) -> Result<Location> {
        self.find_location(id)?.context("Location not found")
    }

    pub fn list_locations_by_section(&self, section: &str) -> Result<Vec<Location>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, description, freezer_section, sort_order, created_at, updated_at
             FROM locations WHERE freezer_section = ?1 COLLATE NOCASE
             ORDER BY sort_order, name",
        )?;
        let locations = stmt
            .query_map(params![section], Self::location_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(locations)
    }

    pub fn delete_location(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM locations WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    pub fn count_products_in_location(&self, id: i64) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM products WHERE location_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn location_product_counts(&self) -> Result<Vec<LocationWithCount>> {
        let mut stmt = self.conn.prepare(
            "SELECT l.id, l.name, l.description, l.freezer_section, l.sort_order,
                    l.created_at, l.updated_at, COUNT(p.id)
             FROM locations l
             LEFT JOIN products p ON p.location_id = l.id
             GROUP BY l.id
             ORDER BY l.sort_order, l.name",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(LocationWithCount {
                    location: Self::location_from_row(row)?,
                    product_count: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // --- Products ---

    pub fn get_product(&self, id: i64) -> Result<Product> {
        self.conn
            .query_row(
                &format!("{PRODUCT_SELECT} WHERE p.id = ?1"),
                params![id],
                Self::product_from_row,
            )
            .context("Product not found")
    }

    /// Newest first. A missing limit returns every match.
    pub fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>> {
        let pattern = filter.name.as_deref().map(|q| {
            let escaped = q
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_");
            format!("%{escaped}%")
        });
        self.query_products(
            &format!(
                "{PRODUCT_SELECT}
                 WHERE (?1 IS NULL OR p.category_id = ?1)
                   AND (?2 IS NULL OR p.location_id = ?2)
                   AND (?3 IS NULL OR p.name LIKE ?3 ESCAPE '\\')
                 ORDER BY p.created_at DESC, p.id DESC
                 LIMIT ?4 OFFSET ?5"
            ),
            params![
                filter.category_id,
                filter.location_id,
                pattern,
                filter.limit.unwrap_or(-1),
                filter.offset.unwrap_or(0),
            ],
        )
    }

    pub fn update_product(&self, id: i64, product: &ProductDraft) -> Result<Product> {
        let now = now_timestamp();
        let rows = self.conn.execute(
            "UPDATE products SET name = ?1, category_id = ?2, location_id = ?3, quantity = ?4,
                unit = ?5, frozen_date = ?6, expiration_date = ?7, notes = ?8, image_url = ?9,
                barcode = ?10, user_id = ?11, updated_at = ?12
             WHERE id = ?13",
            params![
                product.name,
                product.category_id,
                product.location_id,
                product.quantity,
                product.unit,
                product.frozen_date.format(DATE_FORMAT).to_string(),
                product
                    .expiration_date
                    .map(|d| d.format(DATE_FORMAT).to_string()),
                product.notes,
                product.image_url,
                product.barcode,
                product.user_id,
                now,
                id,
            ],
        )?;
        if rows == 0 {
            anyhow::bail!("Product not found");
        }
        self.get_product(id)
    }

    pub fn delete_product(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM products WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    /// Products whose expiration date falls within `from..=to`, soonest first.
    pub fn products_expiring_between(
        &self,
        from: Option<NaiveDate>,
        to: NaiveDate,
    ) -> Result<Vec<Product>> {
        self.query_products(
            &format!(
                "{PRODUCT_SELECT}
                 WHERE p.expiration_date IS NOT NULL
                   AND (?1 IS NULL OR p.expiration_date >= ?1)
                   AND p.expiration_date <= ?2
                 ORDER BY p.expiration_date, p.name"
            ),
            params![
                from.map(|d| d.format(DATE_FORMAT).to_string()),
                to.format(DATE_FORMAT).to_string(),
            ],
        )
    }

    pub fn products_expired_before(&self, today: NaiveDate) -> Result<Vec<Product>> {
        self.query_products(
            &format!(
                "{PRODUCT_SELECT}
                 WHERE p.expiration_date IS NOT NULL AND p.expiration_date < ?1
                 ORDER BY p.expiration_date, p.name"
            ),
            params![today.format(DATE_FORMAT).to_string()],
        )
    }

    pub fn count_products(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM products", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn count_expired(&self, today: NaiveDate) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM products
             WHERE expiration_date IS NOT NULL AND expiration_date < ?1",
            params![today.format(DATE_FORMAT).to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn count_expiring_between(&self, from: NaiveDate, to: NaiveDate) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM products
             WHERE expiration_date IS NOT NULL
               AND expiration_date >= ?1 AND expiration_date <= ?2",
            params![
                from.format(DATE_FORMAT).to_string(),
                to.format(DATE_FORMAT).to_string()
            ],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

impl RecordStore for Database {
    fn all_categories(&self) -> Result<Vec<Category>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, color, default_storage_days, description, icon, created_at, updated_at
             FROM categories ORDER BY name",
        )?;
        let categories = stmt
            .query_map([], Self::category_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(categories)
    }

    fn all_locations(&self) -> Result<Vec<Location>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, description, freezer_section, sort_order, created_at, updated_at
             FROM locations ORDER BY sort_order, name",
        )?;
        let locations = stmt
            .query_map([], Self::location_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(locations)
    }

    fn all_products(&self) -> Result<Vec<Product>> {
        self.query_products(&format!("{PRODUCT_SELECT} ORDER BY p.id"), [])
    }

    fn find_category(&self, id: i64) -> Result<Option<Category>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, color, default_storage_days, description, icon, created_at, updated_at
             FROM categories WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::category_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    fn find_category_by_name(&self, name: &str) -> Result<Option<Category>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, color, default_storage_days, description, icon, created_at, updated_at
             FROM categories WHERE name = ?1",
        )?;
        let mut rows = stmt.query(params![name])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::category_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    fn find_location(&self, id: i64) -> Result<Option<Location>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, description, freezer_section, sort_order, created_at, updated_at
             FROM locations WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::location_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    fn find_location_by_name(&self, name: &str) -> Result<Option<Location>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, description, freezer_section, sort_order, created_at, updated_at
             FROM locations WHERE name = ?1",
        )?;
        let mut rows = stmt.query(params![name])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::location_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    fn insert_category(&self, category: &CategoryDraft, id: Option<i64>) -> Result<Category> {
        let now = now_timestamp();
        self.conn.execute(
            "INSERT INTO categories (id, name, color, default_storage_days, description, icon, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                category.name,
                category.color,
                category.default_storage_days,
                category.description,
                category.icon,
                now,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_category(id)
    }

    fn update_category(&self, id: i64, category: &CategoryDraft) -> Result<Category> {
        let now = now_timestamp();
        let rows = self.conn.execute(
            "UPDATE categories SET name = ?1, color = ?2, default_storage_days = ?3,
                description = ?4, icon = ?5, updated_at = ?6
             WHERE id = ?7",
            params![
                category.name,
                category.color,
                category.default_storage_days,
                category.description,
                category.icon,
                now,
                id,
            ],
        )?;
        if rows == 0 {
            anyhow::bail!("Category not found");
        }
        self.get_category(id)
    }

    fn insert_location(&self, location: &LocationDraft, id: Option<i64>) -> Result<Location> {
        let now = now_timestamp();
        self.conn.execute(
            "INSERT INTO locations (id, name, description, freezer_section, sort_order, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                location.name,
                location.description,
                location.freezer_section,
                location.sort_order,
                now,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_location(id)
    }

    fn update_location(&self, id: i64, location: &LocationDraft) -> Result<Location> {
        let now = now_timestamp();
        let rows = self.conn.execute(
            "UPDATE locations SET name = ?1, description = ?2, freezer_section = ?3,
                sort_order = ?4, updated_at = ?5
             WHERE id = ?6",
            params![
                location.name,
                location.description,
                location.freezer_section,
                location.sort_order,
                now,
                id,
            ],
        )?;
        if rows == 0 {
            anyhow::bail!("Location not found");
        }
        self.get_location(id)
    }

    fn insert_product(&self, product: &ProductDraft, id: Option<i64>) -> Result<Product> {
        let now = now_timestamp();
        self.conn.execute(
            "INSERT INTO products (id, name, category_id, location_id, quantity, unit, frozen_date,
                expiration_date, notes, image_url, barcode, user_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                id,
                product.name,
                product.category_id,
                product.location_id,
                product.quantity,
                product.unit,
                product.frozen_date.format(DATE_FORMAT).to_string(),
                product
                    .expiration_date
                    .map(|d| d.format(DATE_FORMAT).to_string()),
                product.notes,
                product.image_url,
                product.barcode,
                product.user_id,
                now,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_product(id)
    }

    fn delete_all_products(&self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM products", [])?)
    }

    fn delete_all_categories(&self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM categories", [])?)
    }

    fn delete_all_locations(&self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM locations", [])?)
    }

    fn begin_batch(&self) -> Result<()> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    fn commit_batch(&self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback_batch(&self) -> Result<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DEFAULT_CATEGORY_COLOR, DEFAULT_UNIT};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn category(name: &str) -> CategoryDraft {
        CategoryDraft {
            name: name.to_string(),
            color: DEFAULT_CATEGORY_COLOR.to_string(),
            default_storage_days: 90,
            description: None,
            icon: None,
        }
    }

    fn location(name: &str, sort_order: i64) -> LocationDraft {
        LocationDraft {
            name: name.to_string(),
            description: None,
            freezer_section: Some("upper".to_string()),
            sort_order,
        }
    }

    fn product(name: &str, expiration_date: Option<NaiveDate>) -> ProductDraft {
        ProductDraft {
            name: name.to_string(),
            category_id: None,
            location_id: None,
            quantity: 1.0,
            unit: DEFAULT_UNIT.to_string(),
            frozen_date: date(2024, 6, 1),
            expiration_date,
            notes: None,
            image_url: None,
            barcode: None,
            user_id: None,
        }
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frostbox.db");
        {
            let db = Database::open(&path).unwrap();
            db.insert_category(&category("Fleisch"), None).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.all_categories().unwrap().len(), 1);
    }

    #[test]
    fn test_insert_and_find_category() {
        let db = Database::open_in_memory().unwrap();
        let created = db.insert_category(&category("Fleisch"), None).unwrap();
        assert_eq!(created.name, "Fleisch");
        assert_eq!(created.color, DEFAULT_CATEGORY_COLOR);

        let by_id = db.find_category(created.id).unwrap().unwrap();
        assert_eq!(by_id, created);
        assert!(db.find_category(created.id + 100).unwrap().is_none());
    }

    #[test]
    fn test_category_name_lookup_is_case_insensitive() {
        let db = Database::open_in_memory().unwrap();
        let created = db.insert_category(&category("Fleisch"), None).unwrap();
        let found = db.find_category_by_name("fLEISCH").unwrap().unwrap();
        assert_eq!(found.id, created.id);
    }

    #[test]
    fn test_category_name_unique_case_insensitive() {
        let db = Database::open_in_memory().unwrap();
        db.insert_category(&category("Fleisch"), None).unwrap();
        assert!(db.insert_category(&category("FLEISCH"), None).is_err());
    }

    #[test]
    fn test_insert_with_caller_assigned_id() {
        let db = Database::open_in_memory().unwrap();
        let c = db.insert_category(&category("Fleisch"), Some(42)).unwrap();
        assert_eq!(c.id, 42);
        let l = db.insert_location(&location("Oben", 1), Some(7)).unwrap();
        assert_eq!(l.id, 7);
        let p = db.insert_product(&product("Steak", None), Some(99)).unwrap();
        assert_eq!(p.id, 99);
    }

    #[test]
    fn test_update_category_in_place() {
        let db = Database::open_in_memory().unwrap();
        let c = db.insert_category(&category("Fleisch"), None).unwrap();
        let mut draft = category("Fleisch");
        draft.color = "#EF4444".to_string();
        draft.default_storage_days = 180;
        let updated = db.update_category(c.id, &draft).unwrap();
        assert_eq!(updated.id, c.id);
        assert_eq!(updated.color, "#EF4444");
        assert_eq!(updated.default_storage_days, 180);

        assert!(db.update_category(c.id + 1, &draft).is_err());
    }

    #[test]
    fn test_locations_ordered_by_sort_order() {
        let db = Database::open_in_memory().unwrap();
        db.insert_location(&location("Unten", 3), None).unwrap();
        db.insert_location(&location("Oben", 1), None).unwrap();
        db.insert_location(&location("Mitte", 2), None).unwrap();
        let names: Vec<String> = db
            .all_locations()
            .unwrap()
            .into_iter()
            .map(|l| l.name)
            .collect();
        assert_eq!(names, vec!["Oben", "Mitte", "Unten"]);
    }

    #[test]
    fn test_list_locations_by_section() {
        let db = Database::open_in_memory().unwrap();
        db.insert_location(&location("Oben", 1), None).unwrap();
        let mut drawer = location("Schublade", 2);
        drawer.freezer_section = Some("drawer1".to_string());
        db.insert_location(&drawer, None).unwrap();

        let upper = db.list_locations_by_section("UPPER").unwrap();
        assert_eq!(upper.len(), 1);
        assert_eq!(upper[0].name, "Oben");
    }

    #[test]
    fn test_product_joins_names() {
        let db = Database::open_in_memory().unwrap();
        let c = db.insert_category(&category("Fleisch"), None).unwrap();
        let l = db.insert_location(&location("Oben", 1), None).unwrap();
        let mut draft = product("Steak", Some(date(2024, 12, 1)));
        draft.category_id = Some(c.id);
        draft.location_id = Some(l.id);
        let p = db.insert_product(&draft, None).unwrap();

        assert_eq!(p.category_name.as_deref(), Some("Fleisch"));
        assert_eq!(p.location_name.as_deref(), Some("Oben"));
        assert_eq!(p.frozen_date, date(2024, 6, 1));
        assert_eq!(p.expiration_date, Some(date(2024, 12, 1)));
    }

    #[test]
    fn test_product_quantity_must_be_positive() {
        let db = Database::open_in_memory().unwrap();
        let mut draft = product("Steak", None);
        draft.quantity = 0.0;
        assert!(db.insert_product(&draft, None).is_err());
    }

    #[test]
    fn test_product_unknown_category_rejected() {
        let db = Database::open_in_memory().unwrap();
        let mut draft = product("Steak", None);
        draft.category_id = Some(12345);
        assert!(db.insert_product(&draft, None).is_err());
    }

    #[test]
    fn test_list_products_filters_and_pages() {
        let db = Database::open_in_memory().unwrap();
        let c = db.insert_category(&category("Gemüse"), None).unwrap();
        for name in ["Erbsen", "Bohnen", "Spinat"] {
            let mut draft = product(name, None);
            draft.category_id = Some(c.id);
            db.insert_product(&draft, None).unwrap();
        }
        db.insert_product(&product("Steak", None), None).unwrap();

        let all = db.list_products(&ProductFilter::default()).unwrap();
        assert_eq!(all.len(), 4);
        // Newest first
        assert_eq!(all[0].name, "Steak");

        let veg = db
            .list_products(&ProductFilter {
                category_id: Some(c.id),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(veg.len(), 3);

        let by_name = db
            .list_products(&ProductFilter {
                name: Some("bohn".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].name, "Bohnen");

        let page = db
            .list_products(&ProductFilter {
                limit: Some(2),
                offset: Some(2),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[1].name, "Erbsen");
    }

    #[test]
    fn test_list_products_name_filter_escapes_wildcards() {
        let db = Database::open_in_memory().unwrap();
        db.insert_product(&product("100% Rind", None), None).unwrap();
        db.insert_product(&product("Rind", None), None).unwrap();
        let found = db
            .list_products(&ProductFilter {
                name: Some("0%".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_expiry_queries() {
        let db = Database::open_in_memory().unwrap();
        let today = date(2024, 6, 15);
        db.insert_product(&product("Alt", Some(date(2024, 6, 10))), None)
            .unwrap();
        db.insert_product(&product("Heute", Some(today)), None).unwrap();
        db.insert_product(&product("Bald", Some(date(2024, 6, 20))), None)
            .unwrap();
        db.insert_product(&product("Später", Some(date(2024, 9, 1))), None)
            .unwrap();
        db.insert_product(&product("Ewig", None), None).unwrap();

        let expired = db.products_expired_before(today).unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].name, "Alt");

        let soon = db
            .products_expiring_between(None, date(2024, 6, 22))
            .unwrap();
        let names: Vec<&str> = soon.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Alt", "Heute", "Bald"]);

        let within = db
            .products_expiring_between(Some(today), date(2024, 6, 22))
            .unwrap();
        assert_eq!(within.len(), 2);

        assert_eq!(db.count_products().unwrap(), 5);
        assert_eq!(db.count_expired(today).unwrap(), 1);
        assert_eq!(
            db.count_expiring_between(today, date(2024, 6, 22)).unwrap(),
            2
        );
    }

    #[test]
    fn test_product_counts_per_category_and_location() {
        let db = Database::open_in_memory().unwrap();
        let meat = db.insert_category(&category("Fleisch"), None).unwrap();
        db.insert_category(&category("Reste"), None).unwrap();
        let top = db.insert_location(&location("Oben", 1), None).unwrap();
        let mut draft = product("Steak", None);
        draft.category_id = Some(meat.id);
        draft.location_id = Some(top.id);
        db.insert_product(&draft, None).unwrap();
        db.insert_product(&draft, None).unwrap();

        let counts = db.category_product_counts().unwrap();
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[0].category.name, "Fleisch");
        assert_eq!(counts[0].product_count, 2);
        assert_eq!(counts[1].product_count, 0);
        assert_eq!(db.count_products_in_category(meat.id).unwrap(), 2);

        let counts = db.location_product_counts().unwrap();
        assert_eq!(counts[0].product_count, 2);
        assert_eq!(db.count_products_in_location(top.id).unwrap(), 2);
    }

    #[test]
    fn test_update_and_delete_product() {
        let db = Database::open_in_memory().unwrap();
        let p = db.insert_product(&product("Steak", None), None).unwrap();
        let mut draft = product("Rumpsteak", Some(date(2024, 12, 1)));
        draft.quantity = 2.5;
        let updated = db.update_product(p.id, &draft).unwrap();
        assert_eq!(updated.name, "Rumpsteak");
        assert_eq!(updated.quantity, 2.5);

        assert!(db.delete_product(p.id).unwrap());
        assert!(!db.delete_product(p.id).unwrap());
        assert!(db.get_product(p.id).is_err());
    }

    #[test]
    fn test_delete_all_in_reference_order() {
        let db = Database::open_in_memory().unwrap();
        let c = db.insert_category(&category("Fleisch"), None).unwrap();
        let mut draft = product("Steak", None);
        draft.category_id = Some(c.id);
        db.insert_product(&draft, None).unwrap();

        // Products still reference the category
        assert!(db.delete_all_categories().is_err());

        assert_eq!(db.delete_all_products().unwrap(), 1);
        assert_eq!(db.delete_all_categories().unwrap(), 1);
        assert_eq!(db.delete_all_locations().unwrap(), 0);
    }

    #[test]
    fn test_batch_rollback_discards_writes() {
        let db = Database::open_in_memory().unwrap();
        db.insert_category(&category("Fleisch"), None).unwrap();

        db.begin_batch().unwrap();
        db.delete_all_categories().unwrap();
        db.insert_category(&category("Gemüse"), None).unwrap();
        db.rollback_batch().unwrap();

        let names: Vec<String> = db
            .all_categories()
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Fleisch"]);
    }

    #[test]
    fn test_batch_commit_keeps_writes() {
        let db = Database::open_in_memory().unwrap();
        db.begin_batch().unwrap();
        db.insert_category(&category("Fleisch"), None).unwrap();
        db.commit_batch().unwrap();
        // Rolling back outside a batch is a no-op
        db.rollback_batch().unwrap();
        assert_eq!(db.all_categories().unwrap().len(), 1);
    }
}
