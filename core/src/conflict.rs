use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::models::{
    Category, CategoryDraft, Location, LocationDraft, validate_category_draft,
    validate_location_draft,
};
use crate::snapshot::{CategoryRecord, LocationRecord};
use crate::store::RecordStore;

/// Upper bound on " (n)" suffixes tried before a rename gives up.
pub const MAX_RENAME_ATTEMPTS: u32 = 1000;

/// What to do when an incoming record's name is already taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictPolicy {
    #[default]
    #[serde(alias = "skip")]
    Skip,
    #[serde(alias = "overwrite")]
    Overwrite,
    #[serde(alias = "rename")]
    Rename,
    #[serde(alias = "merge")]
    Merge,
}

impl ConflictPolicy {
    pub const ALL: [ConflictPolicy; 4] = [
        ConflictPolicy::Skip,
        ConflictPolicy::Overwrite,
        ConflictPolicy::Rename,
        ConflictPolicy::Merge,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ConflictPolicy::Skip => "skip",
            ConflictPolicy::Overwrite => "overwrite",
            ConflictPolicy::Rename => "rename",
            ConflictPolicy::Merge => "merge",
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_lowercase();
        ConflictPolicy::ALL
            .into_iter()
            .find(|p| p.as_str() == lower)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Invalid conflict policy '{s}'. Must be one of: skip, overwrite, rename, merge"
                )
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Category,
    Location,
    Product,
}

impl EntityKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Category => "category",
            EntityKind::Location => "location",
            EntityKind::Product => "product",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A snapshot record whose name must be unique in the store.
pub trait NamedRecord {
    type Stored;
    const KIND: EntityKind;

    fn source_id(&self) -> Option<i64>;
    fn name(&self) -> &str;

    fn find_by_name(store: &dyn RecordStore, name: &str) -> Result<Option<Self::Stored>>;
    fn stored_id(stored: &Self::Stored) -> i64;
    fn stored_name(stored: &Self::Stored) -> &str;

    /// Insert under `name`, returning the id the store assigned.
    fn insert(&self, store: &dyn RecordStore, name: &str, id: Option<i64>) -> Result<i64>;
    /// Replace every field of `existing` except name and id.
    fn overwrite(&self, store: &dyn RecordStore, existing: &Self::Stored) -> Result<()>;
    /// Replace only the fields of `existing` that this record carries a value for.
    fn merge(&self, store: &dyn RecordStore, existing: &Self::Stored) -> Result<()>;
}

impl NamedRecord for CategoryRecord {
    type Stored = Category;
    const KIND: EntityKind = EntityKind::Category;

    fn source_id(&self) -> Option<i64> {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn find_by_name(store: &dyn RecordStore, name: &str) -> Result<Option<Category>> {
        store.find_category_by_name(name)
    }

    fn stored_id(stored: &Category) -> i64 {
        stored.id
    }

    fn stored_name(stored: &Category) -> &str {
        &stored.name
    }

    fn insert(&self, store: &dyn RecordStore, name: &str, id: Option<i64>) -> Result<i64> {
        let draft = self.to_draft(name);
        validate_category_draft(&draft)?;
        Ok(store.insert_category(&draft, id)?.id)
    }

    fn overwrite(&self, store: &dyn RecordStore, existing: &Category) -> Result<()> {
        let draft = self.to_draft(&existing.name);
        validate_category_draft(&draft)?;
        store.update_category(existing.id, &draft)?;
        Ok(())
    }

    fn merge(&self, store: &dyn RecordStore, existing: &Category) -> Result<()> {
        let draft = CategoryDraft {
            name: existing.name.clone(),
            color: self.color.clone().unwrap_or_else(|| existing.color.clone()),
            default_storage_days: self
                .default_storage_days
                .unwrap_or(existing.default_storage_days),
            description: self
                .description
                .clone()
                .or_else(|| existing.description.clone()),
            icon: self.icon.clone().or_else(|| existing.icon.clone()),
        };
        validate_category_draft(&draft)?;
        store.update_category(existing.id, &draft)?;
        Ok(())
    }
}

impl NamedRecord for LocationRecord {
    type Stored = Location;
    const KIND: EntityKind = EntityKind::Location;

    fn source_id(&self) -> Option<i64> {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn find_by_name(store: &dyn RecordStore, name: &str) -> Result<Option<Location>> {
        store.find_location_by_name(name)
    }

    fn stored_id(stored: &Location) -> i64 {
        stored.id
    }

    fn stored_name(stored: &Location) -> &str {
        &stored.name
    }

    fn insert(&self, store: &dyn RecordStore, name: &str, id: Option<i64>) -> Result<i64> {
        let draft = self.to_draft(name);
        validate_location_draft(&draft)?;
        Ok(store.insert_location(&draft, id)?.id)
    }

    fn overwrite(&self, store: &dyn RecordStore, existing: &Location) -> Result<()> {
        let draft = self.to_draft(&existing.name);
        validate_location_draft(&draft)?;
        store.update_location(existing.id, &draft)?;
        Ok(())
    }

    fn merge(&self, store: &dyn RecordStore, existing: &Location) -> Result<()> {
        let draft = LocationDraft {
            name: existing.name.clone(),
            description: self
                .description
                .clone()
                .or_else(|| existing.description.clone()),
            freezer_section: self
                .freezer_section
                .clone()
                .or_else(|| existing.freezer_section.clone()),
            sort_order: self.sort_order.unwrap_or(existing.sort_order),
        };
        validate_location_draft(&draft)?;
        store.update_location(existing.id, &draft)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Skipped,
    Overwritten,
    Renamed(String),
    Merged,
}

impl Resolution {
    /// Label reported back to the caller, e.g. `renamed to Fleisch (1)`.
    #[must_use]
    pub fn tag(&self) -> String {
        match self {
            Resolution::Skipped => "skipped".to_string(),
            Resolution::Overwritten => "overwritten".to_string(),
            Resolution::Renamed(name) => format!("renamed to {name}"),
            Resolution::Merged => "merged".to_string(),
        }
    }

    /// Whether the resolution wrote the incoming record, as opposed to discarding it.
    #[must_use]
    pub fn counts_as_import(&self) -> bool {
        !matches!(self, Resolution::Skipped)
    }
}

/// Result of resolving one conflict: the destination id the incoming
/// record's source id should map to, and what was done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub target_id: i64,
    pub resolution: Resolution,
}

/// Apply `policy` to `incoming`, which collides with `existing`.
///
/// Either the whole resolution is applied or an error is returned and
/// nothing about the mapping should be recorded.
pub fn resolve<R: NamedRecord>(
    store: &dyn RecordStore,
    existing: &R::Stored,
    incoming: &R,
    policy: ConflictPolicy,
    preserve_ids: bool,
) -> Result<Resolved> {
    match policy {
        ConflictPolicy::Skip => Ok(skip::<R>(existing)),
        ConflictPolicy::Overwrite => overwrite(store, existing, incoming),
        ConflictPolicy::Rename => rename(store, incoming, preserve_ids),
        ConflictPolicy::Merge => merge(store, existing, incoming),
    }
}

fn skip<R: NamedRecord>(existing: &R::Stored) -> Resolved {
    Resolved {
        target_id: R::stored_id(existing),
        resolution: Resolution::Skipped,
    }
}

fn overwrite<R: NamedRecord>(
    store: &dyn RecordStore,
    existing: &R::Stored,
    incoming: &R,
) -> Result<Resolved> {
    incoming.overwrite(store, existing)?;
    Ok(Resolved {
        target_id: R::stored_id(existing),
        resolution: Resolution::Overwritten,
    })
}

fn rename<R: NamedRecord>(
    store: &dyn RecordStore,
    incoming: &R,
    preserve_ids: bool,
) -> Result<Resolved> {
    let name = available_name::<R>(store, incoming.name())?;
    let id = incoming.source_id().filter(|_| preserve_ids);
    let target_id = incoming.insert(store, &name, id)?;
    Ok(Resolved {
        target_id,
        resolution: Resolution::Renamed(name),
    })
}

fn merge<R: NamedRecord>(
    store: &dyn RecordStore,
    existing: &R::Stored,
    incoming: &R,
) -> Result<Resolved> {
    incoming.merge(store, existing)?;
    Ok(Resolved {
        target_id: R::stored_id(existing),
        resolution: Resolution::Merged,
    })
}

/// First of `base`, `base (1)`, `base (2)`, ... that no stored record uses.
pub fn available_name<R: NamedRecord>(store: &dyn RecordStore, base: &str) -> Result<String> {
    if R::find_by_name(store, base)?.is_none() {
        return Ok(base.to_string());
    }
    for n in 1..=MAX_RENAME_ATTEMPTS {
        let candidate = format!("{base} ({n})");
        if R::find_by_name(store, &candidate)?.is_none() {
            return Ok(candidate);
        }
    }
    bail!(
        "No free name for {} '{base}' after {MAX_RENAME_ATTEMPTS} attempts",
        R::KIND
    )
}
