use std::collections::HashMap;
use std::fmt;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::conflict::{self, ConflictPolicy, EntityKind, NamedRecord, Resolved};
use crate::models::validate_product_draft;
use crate::snapshot::{BACKUP_VERSION, CategoryRecord, LocationRecord, ProductRecord, Snapshot};
use crate::store::{RecordStore, clear_store};

pub const RESTORE_COMPLETED: &str = "Restore completed successfully";
pub const VALIDATION_FAILED: &str = "Backup validation failed";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RestoreOptions {
    pub clear_existing_data: bool,
    #[serde(alias = "conflictPolicy")]
    pub conflict_resolution: ConflictPolicy,
    pub preserve_ids: bool,
}

/// Body of a restore call: the snapshot to apply and how to apply it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RestoreRequest {
    pub backup: Option<Snapshot>,
    pub options: RestoreOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreStats {
    pub categories_imported: usize,
    pub categories_skipped: usize,
    pub locations_imported: usize,
    pub locations_skipped: usize,
    pub products_imported: usize,
    pub products_skipped: usize,
    pub total_processed: usize,
}

impl RestoreStats {
    fn tally(&mut self, kind: EntityKind, imported: bool) {
        let counter = match (kind, imported) {
            (EntityKind::Category, true) => &mut self.categories_imported,
            (EntityKind::Category, false) => &mut self.categories_skipped,
            (EntityKind::Location, true) => &mut self.locations_imported,
            (EntityKind::Location, false) => &mut self.locations_skipped,
            (EntityKind::Product, true) => &mut self.products_imported,
            (EntityKind::Product, false) => &mut self.products_skipped,
        };
        *counter += 1;
        self.total_processed += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictInfo {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub resolution: String,
    pub details: Option<String>,
}

/// Report of one restore call. Always returned, even on failure; a failed
/// outcome can still carry the stats gathered before the failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreOutcome {
    pub success: bool,
    pub message: String,
    pub stats: RestoreStats,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub conflicts: Vec<ConflictInfo>,
}

impl RestoreOutcome {
    /// Outcome for input that never reached the restore engine.
    #[must_use]
    pub fn failed(message: impl Into<String>, error: impl Into<String>) -> Self {
        RestoreOutcome {
            success: false,
            message: message.into(),
            errors: vec![error.into()],
            ..Default::default()
        }
    }
}

/// Source id to destination id, built fresh for each restore call.
#[derive(Debug, Default)]
pub struct IdMap(HashMap<i64, i64>);

impl IdMap {
    fn record(&mut self, source: Option<i64>, target: i64) {
        if let Some(source) = source {
            self.0.insert(source, target);
        }
    }

    #[must_use]
    pub fn translate(&self, source: Option<i64>) -> Option<i64> {
        source.and_then(|id| self.0.get(&id).copied())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RestorePhase {
    Clearing,
    Categories,
    Locations,
    Products,
}

impl fmt::Display for RestorePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RestorePhase::Clearing => "clearing existing data",
            RestorePhase::Categories => "restoring categories",
            RestorePhase::Locations => "restoring locations",
            RestorePhase::Products => "restoring products",
        })
    }
}

struct Collections<'a> {
    categories: &'a [CategoryRecord],
    locations: &'a [LocationRecord],
    products: &'a [ProductRecord],
}

/// What happened to one named record.
enum Placement {
    Inserted(i64),
    Resolved(Resolved),
}

/// Apply `snapshot` to `store`.
///
/// Per-record failures are collected into the outcome and never abort the
/// run. A failure of the store itself ends the run with `success == false`.
/// Callers must not run two restores against the same store at once.
pub fn restore(
    store: &dyn RecordStore,
    snapshot: Option<&Snapshot>,
    options: &RestoreOptions,
) -> RestoreOutcome {
    let mut outcome = RestoreOutcome::default();

    let Some(collections) = validate(snapshot, &mut outcome) else {
        log::error!("Backup validation failed: {}", outcome.errors.join("; "));
        outcome.message = VALIDATION_FAILED.to_string();
        return outcome;
    };

    log::info!(
        "Starting restore: {} categories, {} locations, {} products (policy {}, clear {}, preserve ids {})",
        collections.categories.len(),
        collections.locations.len(),
        collections.products.len(),
        options.conflict_resolution,
        options.clear_existing_data,
        options.preserve_ids
    );

    match run(store, &collections, options, &mut outcome) {
        Ok(()) => {
            outcome.success = true;
            outcome.message = RESTORE_COMPLETED.to_string();
            log::info!(
                "Restore completed: {} categories, {} locations, {} products imported",
                outcome.stats.categories_imported,
                outcome.stats.locations_imported,
                outcome.stats.products_imported
            );
        }
        Err(e) => {
            log::error!("Restore failed: {e:#}");
            outcome.success = false;
            outcome.message = format!("Restore failed: {e:#}");
            outcome.errors.push(format!("{e:#}"));
        }
    }
    outcome
}

fn validate<'a>(
    snapshot: Option<&'a Snapshot>,
    outcome: &mut RestoreOutcome,
) -> Option<Collections<'a>> {
    let Some(snapshot) = snapshot else {
        outcome.errors.push("Backup data is null".to_string());
        return None;
    };

    if snapshot.version.as_deref() != Some(BACKUP_VERSION) {
        let found = snapshot.version.as_deref().unwrap_or("none");
        log::warn!("Backup version mismatch: expected {BACKUP_VERSION}, found {found}");
        outcome.warnings.push(format!(
            "Backup version mismatch. Expected: {BACKUP_VERSION}, Found: {found}"
        ));
    }

    match (&snapshot.categories, &snapshot.locations, &snapshot.products) {
        (Some(categories), Some(locations), Some(products)) => Some(Collections {
            categories,
            locations,
            products,
        }),
        _ => {
            outcome.errors.push(format!(
                "Backup contains null data collections: {}",
                snapshot.missing_collections().join(", ")
            ));
            None
        }
    }
}

fn run(
    store: &dyn RecordStore,
    collections: &Collections<'_>,
    options: &RestoreOptions,
    outcome: &mut RestoreOutcome,
) -> Result<()> {
    store.begin_batch().context("Could not start restore batch")?;

    let maps = restore_reference_data(store, collections, options, outcome).and_then(|maps| {
        store
            .commit_batch()
            .context("Could not commit categories and locations")?;
        Ok(maps)
    });
    let (categories, locations) = match maps {
        Ok(maps) => maps,
        Err(e) => {
            match store.rollback_batch() {
                Ok(()) => outcome
                    .warnings
                    .push("Changes to categories and locations were rolled back".to_string()),
                Err(rollback) => log::error!("Rollback failed: {rollback:#}"),
            }
            return Err(e);
        }
    };

    log::info!("Phase: {}", RestorePhase::Products);
    for record in collections.products {
        let result = restore_product(store, record, &categories, &locations, options);
        match result {
            Ok(id) => {
                log::debug!("Restored product '{}' as id {id}", record.name);
                outcome.stats.tally(EntityKind::Product, true);
            }
            Err(e) => {
                log::error!("Error restoring product '{}': {e:#}", record.name);
                outcome.errors.push(format!(
                    "Failed to restore product '{}': {e:#}",
                    record.name
                ));
                outcome.stats.tally(EntityKind::Product, false);
            }
        }
    }
    Ok(())
}

/// Clear step plus categories and locations; runs inside the store batch.
fn restore_reference_data(
    store: &dyn RecordStore,
    collections: &Collections<'_>,
    options: &RestoreOptions,
    outcome: &mut RestoreOutcome,
) -> Result<(IdMap, IdMap)> {
    if options.clear_existing_data {
        log::info!("Phase: {}", RestorePhase::Clearing);
        clear_store(store).with_context(|| RestorePhase::Clearing.to_string())?;
    }

    log::info!("Phase: {}", RestorePhase::Categories);
    let categories = restore_named(store, collections.categories, options, outcome);

    log::info!("Phase: {}", RestorePhase::Locations);
    let locations = restore_named(store, collections.locations, options, outcome);

    Ok((categories, locations))
}

fn restore_named<R: NamedRecord>(
    store: &dyn RecordStore,
    records: &[R],
    options: &RestoreOptions,
    outcome: &mut RestoreOutcome,
) -> IdMap {
    let mut ids = IdMap::default();
    for record in records {
        match place(store, record, options) {
            Ok(Placement::Inserted(id)) => {
                log::debug!("Restored {} '{}' as id {id}", R::KIND, record.name());
                ids.record(record.source_id(), id);
                outcome.stats.tally(R::KIND, true);
            }
            Ok(Placement::Resolved(resolved)) => {
                let tag = resolved.resolution.tag();
                log::warn!("Conflict on {} '{}': {tag}", R::KIND, record.name());
                ids.record(record.source_id(), resolved.target_id);
                outcome
                    .stats
                    .tally(R::KIND, resolved.resolution.counts_as_import());
                outcome.conflicts.push(ConflictInfo {
                    kind: R::KIND.to_string(),
                    name: record.name().to_string(),
                    resolution: tag,
                    details: Some(format!("Mapped to {} id {}", R::KIND, resolved.target_id)),
                });
            }
            Err(e) => {
                log::error!("Error restoring {} '{}': {e:#}", R::KIND, record.name());
                outcome.errors.push(format!(
                    "Failed to restore {} '{}': {e:#}",
                    R::KIND,
                    record.name()
                ));
                outcome.stats.tally(R::KIND, false);
            }
        }
    }
    ids
}

fn place<R: NamedRecord>(
    store: &dyn RecordStore,
    record: &R,
    options: &RestoreOptions,
) -> Result<Placement> {
    if let Some(existing) = R::find_by_name(store, record.name())? {
        log::debug!(
            "{} '{}' collides with existing '{}'",
            R::KIND,
            record.name(),
            R::stored_name(&existing)
        );
        let resolved = conflict::resolve(
            store,
            &existing,
            record,
            options.conflict_resolution,
            options.preserve_ids,
        )?;
        return Ok(Placement::Resolved(resolved));
    }
    let id = record.source_id().filter(|_| options.preserve_ids);
    Ok(Placement::Inserted(record.insert(store, record.name(), id)?))
}

fn restore_product(
    store: &dyn RecordStore,
    record: &ProductRecord,
    categories: &IdMap,
    locations: &IdMap,
    options: &RestoreOptions,
) -> Result<i64> {
    let category_id = match categories.translate(record.category_id) {
        Some(id) => store.find_category(id)?.map(|c| c.id),
        None => None,
    };
    let location_id = match locations.translate(record.location_id) {
        Some(id) => store.find_location(id)?.map(|l| l.id),
        None => None,
    };
    let draft = record.to_draft(category_id, location_id)?;
    validate_product_draft(&draft)?;
    let id = record.id.filter(|_| options.preserve_ids);
    Ok(store.insert_product(&draft, id)?.id)
}
