use anyhow::Result;
use chrono::NaiveDate;
use serde_json::json;

use frostbox_core::models::{DATE_FORMAT, NewProduct, Product, ProductFilter};
use frostbox_core::service::FreezerService;

use super::helpers::{describe_days_left, format_quantity, print_json, print_product_table, today};

/// Field changes requested on the command line. Unset fields keep the
/// product's current value.
#[derive(Debug, Default)]
pub(crate) struct ProductChanges {
    pub name: Option<String>,
    pub category_id: Option<i64>,
    pub clear_category: bool,
    pub location_id: Option<i64>,
    pub clear_location: bool,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub frozen_date: Option<NaiveDate>,
    pub expiration_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub barcode: Option<String>,
}

impl ProductChanges {
    fn apply(self, existing: &Product) -> NewProduct {
        let pick_ref = |new: Option<i64>, clear: bool, current: Option<i64>| {
            if clear { None } else { new.or(current) }
        };
        NewProduct {
            name: self.name.unwrap_or_else(|| existing.name.clone()),
            category_id: pick_ref(self.category_id, self.clear_category, existing.category_id),
            location_id: pick_ref(self.location_id, self.clear_location, existing.location_id),
            quantity: self.quantity.unwrap_or(existing.quantity),
            unit: Some(self.unit.unwrap_or_else(|| existing.unit.clone())),
            frozen_date: Some(self.frozen_date.unwrap_or(existing.frozen_date)),
            expiration_date: self.expiration_date.or(existing.expiration_date),
            notes: self.notes.or_else(|| existing.notes.clone()),
            image_url: existing.image_url.clone(),
            barcode: self.barcode.or_else(|| existing.barcode.clone()),
        }
    }
}

pub(crate) fn cmd_product_list(
    svc: &FreezerService,
    filter: &ProductFilter,
    json: bool,
) -> Result<()> {
    let products = svc.list_products(filter)?;

    if json {
        print_json(&products)?;
    } else if products.is_empty() {
        eprintln!("No products found. Use `frostbox product add` to store something.");
    } else {
        print_product_table(&products, today());
    }

    Ok(())
}

pub(crate) fn cmd_product_show(svc: &FreezerService, id: i64, json: bool) -> Result<()> {
    let product = svc.get_product(id)?;

    if json {
        print_json(&product)?;
        return Ok(());
    }

    let today = today();
    println!("{} (ID {})", product.name, product.id);
    println!("  Quantity:  {}", format_quantity(product.quantity, &product.unit));
    if let Some(ref c) = product.category_name {
        println!("  Category:  {c}");
    }
    if let Some(ref l) = product.location_name {
        println!("  Location:  {l}");
    }
    println!("  Frozen:    {}", product.frozen_date.format(DATE_FORMAT));
    match product.expiration_date {
        Some(d) => println!(
            "  Expires:   {} ({})",
            d.format(DATE_FORMAT),
            describe_days_left(product.days_until_expiration(today))
        ),
        None => println!("  Expires:   never"),
    }
    if let Some(ref b) = product.barcode {
        println!("  Barcode:   {b}");
    }
    if let Some(ref n) = product.notes {
        println!("  Notes:     {n}");
    }

    Ok(())
}

pub(crate) fn cmd_product_add(
    svc: &FreezerService,
    product: &NewProduct,
    json: bool,
) -> Result<()> {
    let created = svc.create_product(product, today())?;

    if json {
        print_json(&created)?;
    } else {
        let expires = created
            .expiration_date
            .map_or_else(|| "never".to_string(), |d| d.format(DATE_FORMAT).to_string());
        println!(
            "Added {} of '{}' (ID {}), expires {expires}",
            format_quantity(created.quantity, &created.unit),
            created.name,
            created.id
        );
    }

    Ok(())
}

pub(crate) fn cmd_product_update(
    svc: &FreezerService,
    id: i64,
    changes: ProductChanges,
    json: bool,
) -> Result<()> {
    let existing = svc.get_product(id)?;
    let updated = svc.update_product(id, &changes.apply(&existing), today())?;

    if json {
        print_json(&updated)?;
    } else {
        println!("Updated product '{}' (ID {})", updated.name, updated.id);
    }

    Ok(())
}

pub(crate) fn cmd_product_delete(svc: &FreezerService, id: i64, json: bool) -> Result<()> {
    svc.delete_product(id)?;

    if json {
        println!("{}", json!({ "deleted": id }));
    } else {
        println!("Deleted product {id}");
    }

    Ok(())
}

pub(crate) fn cmd_product_expiring(svc: &FreezerService, days: i64, json: bool) -> Result<()> {
    let today = today();
    let products = svc.expiring_soon(days, today)?;

    if json {
        print_json(&products)?;
    } else if products.is_empty() {
        println!("Nothing expires within {days} days");
    } else {
        print_product_table(&products, today);
    }

    Ok(())
}

pub(crate) fn cmd_product_expired(svc: &FreezerService, json: bool) -> Result<()> {
    let today = today();
    let products = svc.expired(today)?;

    if json {
        print_json(&products)?;
    } else if products.is_empty() {
        println!("No expired products");
    } else {
        print_product_table(&products, today);
    }

    Ok(())
}

pub(crate) fn cmd_product_stats(svc: &FreezerService, json: bool) -> Result<()> {
    let stats = svc.statistics(today())?;

    if json {
        print_json(&stats)?;
    } else {
        println!("Products:       {}", stats.total_products);
        println!("Expired:        {}", stats.expired_products);
        println!("Expiring soon:  {}", stats.expiring_soon);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn existing() -> Product {
        Product {
            id: 7,
            name: "Steak".to_string(),
            category_id: Some(1),
            location_id: Some(2),
            quantity: 2.0,
            unit: "pieces".to_string(),
            frozen_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            expiration_date: NaiveDate::from_ymd_opt(2024, 10, 28),
            notes: Some("vom Metzger".to_string()),
            image_url: None,
            barcode: None,
            user_id: None,
            created_at: "2024-05-01T10:00:00".to_string(),
            updated_at: "2024-05-01T10:00:00".to_string(),
            category_name: Some("Fleisch".to_string()),
            location_name: Some("Schublade 1".to_string()),
        }
    }

    #[test]
    fn test_apply_keeps_unset_fields() {
        let product = ProductChanges {
            quantity: Some(1.0),
            ..Default::default()
        }
        .apply(&existing());
        assert_eq!(product.name, "Steak");
        assert_eq!(product.quantity, 1.0);
        assert_eq!(product.category_id, Some(1));
        assert_eq!(product.location_id, Some(2));
        assert_eq!(product.unit.as_deref(), Some("pieces"));
        assert_eq!(product.expiration_date, NaiveDate::from_ymd_opt(2024, 10, 28));
        assert_eq!(product.notes.as_deref(), Some("vom Metzger"));
    }

    #[test]
    fn test_apply_clears_references() {
        let product = ProductChanges {
            clear_category: true,
            location_id: Some(5),
            ..Default::default()
        }
        .apply(&existing());
        assert_eq!(product.category_id, None);
        assert_eq!(product.location_id, Some(5));
    }
}
