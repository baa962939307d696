use anyhow::Result;
use serde_json::json;

use frostbox_core::models::NewCategory;
use frostbox_core::service::FreezerService;

use super::helpers::{print_category_table, print_json};

pub(crate) fn cmd_category_list(svc: &FreezerService, json: bool) -> Result<()> {
    let categories = svc.category_product_counts()?;

    if json {
        print_json(&categories)?;
    } else if categories.is_empty() {
        eprintln!("No categories yet. Use `frostbox category defaults` to add the built-in ones.");
    } else {
        print_category_table(&categories);
    }

    Ok(())
}

pub(crate) fn cmd_category_add(
    svc: &FreezerService,
    category: &NewCategory,
    json: bool,
) -> Result<()> {
    let created = svc.create_category(category)?;

    if json {
        print_json(&created)?;
    } else {
        println!(
            "Added category '{}' (ID {}, {} storage days)",
            created.name, created.id, created.default_storage_days
        );
    }

    Ok(())
}

/// An empty `changes.name` keeps the current name.
pub(crate) fn cmd_category_update(
    svc: &FreezerService,
    id: i64,
    mut changes: NewCategory,
    json: bool,
) -> Result<()> {
    if changes.name.trim().is_empty() {
        changes.name = svc.get_category(id)?.name;
    }
    let updated = svc.update_category(id, &changes)?;

    if json {
        print_json(&updated)?;
    } else {
        println!("Updated category '{}' (ID {})", updated.name, updated.id);
    }

    Ok(())
}

pub(crate) fn cmd_category_delete(svc: &FreezerService, id: i64, json: bool) -> Result<()> {
    svc.delete_category(id)?;

    if json {
        println!("{}", json!({ "deleted": id }));
    } else {
        println!("Deleted category {id}");
    }

    Ok(())
}

pub(crate) fn cmd_category_defaults(svc: &FreezerService, json: bool) -> Result<()> {
    let created = svc.reinitialize_default_categories()?;

    if json {
        println!("{}", json!({ "created": created }));
    } else if created == 0 {
        println!("All default categories already exist");
    } else {
        println!("Added {created} default categories");
    }

    Ok(())
}
