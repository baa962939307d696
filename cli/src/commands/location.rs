use anyhow::Result;
use serde_json::json;

use frostbox_core::models::{LocationWithCount, NewLocation};
use frostbox_core::service::FreezerService;

use super::helpers::{print_json, print_location_table};

pub(crate) fn cmd_location_list(
    svc: &FreezerService,
    section: Option<&str>,
    json: bool,
) -> Result<()> {
    let mut locations = svc.location_product_counts()?;
    if let Some(section) = section {
        let wanted: Vec<i64> = svc
            .list_locations_by_section(section)?
            .iter()
            .map(|l| l.id)
            .collect();
        locations.retain(|l: &LocationWithCount| wanted.contains(&l.location.id));
    }

    if json {
        print_json(&locations)?;
    } else if locations.is_empty() {
        eprintln!("No locations found. Use `frostbox location defaults` to add the built-in ones.");
    } else {
        print_location_table(&locations);
    }

    Ok(())
}

pub(crate) fn cmd_location_add(
    svc: &FreezerService,
    location: &NewLocation,
    json: bool,
) -> Result<()> {
    let created = svc.create_location(location)?;

    if json {
        print_json(&created)?;
    } else {
        println!("Added location '{}' (ID {})", created.name, created.id);
    }

    Ok(())
}

/// An empty `changes.name` keeps the current name.
pub(crate) fn cmd_location_update(
    svc: &FreezerService,
    id: i64,
    mut changes: NewLocation,
    json: bool,
) -> Result<()> {
    if changes.name.trim().is_empty() {
        changes.name = svc.get_location(id)?.name;
    }
    let updated = svc.update_location(id, &changes)?;

    if json {
        print_json(&updated)?;
    } else {
        println!("Updated location '{}' (ID {})", updated.name, updated.id);
    }

    Ok(())
}

pub(crate) fn cmd_location_delete(svc: &FreezerService, id: i64, json: bool) -> Result<()> {
    svc.delete_location(id)?;

    if json {
        println!("{}", json!({ "deleted": id }));
    } else {
        println!("Deleted location {id}");
    }

    Ok(())
}

pub(crate) fn cmd_location_defaults(svc: &FreezerService, json: bool) -> Result<()> {
    let created = svc.initialize_default_locations()?;

    if json {
        println!("{}", json!({ "created": created }));
    } else if created == 0 {
        println!("Locations already exist, defaults not added");
    } else {
        println!("Added {created} default locations");
    }

    Ok(())
}
