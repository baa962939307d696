use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Local;
use serde_json::json;

use frostbox_core::archive::BackupFormat;
use frostbox_core::conflict::ConflictPolicy;
use frostbox_core::restore::{RestoreOptions, RestoreOutcome};
use frostbox_core::service::FreezerService;

use super::helpers::print_json;

/// An explicit `--format` wins, otherwise the file name decides.
fn resolve_format(explicit: Option<&str>, path: Option<&Path>) -> Result<BackupFormat> {
    match (explicit, path) {
        (Some(name), _) => name.parse(),
        (None, Some(path)) => Ok(BackupFormat::from_filename(&path.to_string_lossy())),
        (None, None) => Ok(BackupFormat::default()),
    }
}

fn read_backup(file: &Path) -> Result<Vec<u8>> {
    std::fs::read(file).with_context(|| format!("Failed to read backup file {}", file.display()))
}

pub(crate) fn cmd_backup_export(
    svc: &FreezerService,
    format: Option<&str>,
    output: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let format = resolve_format(format, output.as_deref())?;
    let exported = svc.export_backup(format, Local::now().naive_local())?;
    let path = output.unwrap_or_else(|| PathBuf::from(&exported.filename));

    std::fs::write(&path, &exported.bytes)
        .with_context(|| format!("Failed to write backup to {}", path.display()))?;

    if json {
        println!(
            "{}",
            json!({
                "file": path.display().to_string(),
                "format": exported.format.to_string(),
                "bytes": exported.bytes.len(),
            })
        );
    } else {
        println!(
            "Wrote {} backup to {} ({} bytes)",
            exported.format,
            path.display(),
            exported.bytes.len()
        );
    }

    Ok(())
}

pub(crate) fn cmd_backup_import(
    svc: &FreezerService,
    file: &Path,
    format: Option<&str>,
    options: ImportFlags<'_>,
    json: bool,
) -> Result<()> {
    let format = resolve_format(format, Some(file))?;
    let options = options.into_options()?;
    let bytes = read_backup(file)?;

    let outcome = svc.import_backup(&bytes, format, &options);

    if json {
        print_json(&outcome)?;
    } else {
        print_outcome(&outcome);
    }

    if !outcome.success {
        bail!("{}", outcome.message);
    }
    Ok(())
}

/// Restore switches as given on the command line.
pub(crate) struct ImportFlags<'a> {
    pub clear: bool,
    pub policy: Option<&'a str>,
    pub preserve_ids: bool,
}

impl ImportFlags<'_> {
    fn into_options(self) -> Result<RestoreOptions> {
        let conflict_resolution = match self.policy {
            Some(p) => p.parse::<ConflictPolicy>()?,
            None => ConflictPolicy::default(),
        };
        Ok(RestoreOptions {
            clear_existing_data: self.clear,
            conflict_resolution,
            preserve_ids: self.preserve_ids,
        })
    }
}

fn print_outcome(outcome: &RestoreOutcome) {
    let stats = &outcome.stats;
    println!("{}", outcome.message);
    println!(
        "  Categories: {} imported, {} skipped",
        stats.categories_imported, stats.categories_skipped
    );
    println!(
        "  Locations:  {} imported, {} skipped",
        stats.locations_imported, stats.locations_skipped
    );
    println!(
        "  Products:   {} imported, {} skipped",
        stats.products_imported, stats.products_skipped
    );
    for conflict in &outcome.conflicts {
        println!(
            "  Conflict: {} '{}' {}",
            conflict.kind, conflict.name, conflict.resolution
        );
    }
    for warning in &outcome.warnings {
        eprintln!("Warning: {warning}");
    }
    for error in &outcome.errors {
        eprintln!("Error: {error}");
    }
}

pub(crate) fn cmd_backup_validate(
    svc: &FreezerService,
    file: &Path,
    format: Option<&str>,
    json: bool,
) -> Result<()> {
    let format = resolve_format(format, Some(file))?;
    let bytes = read_backup(file)?;
    let summary = svc.validate_backup(&bytes, format)?;

    if json {
        print_json(&summary)?;
    } else {
        println!("{summary}");
        if let Some(ref version) = summary.version {
            println!("  Version: {version}");
        }
    }

    Ok(())
}

pub(crate) fn cmd_backup_clear(svc: &FreezerService, yes: bool, json: bool) -> Result<()> {
    if !yes {
        bail!("Refusing to delete all data without --yes");
    }
    svc.clear_all_data()?;

    if json {
        println!("{}", json!({ "cleared": true }));
    } else {
        println!("Deleted all products, categories and locations");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_format() {
        assert_eq!(resolve_format(None, None).unwrap(), BackupFormat::Json);
        assert_eq!(
            resolve_format(None, Some(Path::new("out/freezer.tar.gz"))).unwrap(),
            BackupFormat::Archive
        );
        assert_eq!(
            resolve_format(Some("json"), Some(Path::new("freezer.tgz"))).unwrap(),
            BackupFormat::Json
        );
        assert!(resolve_format(Some("zip"), None).is_err());
    }

    #[test]
    fn test_import_flags_policy() {
        let options = ImportFlags {
            clear: true,
            policy: Some("merge"),
            preserve_ids: false,
        }
        .into_options()
        .unwrap();
        assert!(options.clear_existing_data);
        assert_eq!(options.conflict_resolution, ConflictPolicy::Merge);

        let bad = ImportFlags {
            clear: false,
            policy: Some("replace"),
            preserve_ids: false,
        };
        assert!(bad.into_options().is_err());
    }

    #[test]
    fn test_export_then_import_files() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("freezer.tar.gz");

        let source = FreezerService::new_in_memory().unwrap();
        source.reinitialize_default_categories().unwrap();
        cmd_backup_export(&source, None, Some(path.clone()), true).unwrap();
        assert!(path.exists());

        let target = FreezerService::new_in_memory().unwrap();
        cmd_backup_validate(&target, &path, None, true).unwrap();
        let flags = ImportFlags {
            clear: false,
            policy: None,
            preserve_ids: false,
        };
        cmd_backup_import(&target, &path, None, flags, true).unwrap();
        assert_eq!(target.list_categories().unwrap().len(), 6);
    }

    #[test]
    fn test_clear_requires_yes() {
        let svc = FreezerService::new_in_memory().unwrap();
        assert!(cmd_backup_clear(&svc, false, true).is_err());
        assert!(cmd_backup_clear(&svc, true, true).is_ok());
    }
}
