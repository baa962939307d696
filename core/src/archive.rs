use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use chrono::NaiveDateTime;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::models::TIMESTAMP_FORMAT;
use crate::restore::{RestoreOptions, RestoreOutcome, restore};
use crate::snapshot::Snapshot;
use crate::store::RecordStore;

pub const SNAPSHOT_ENTRY: &str = "backup.json";
pub const METADATA_ENTRY: &str = "metadata.txt";
const DIGEST_KEY: &str = "SHA-256";

/// Serialized forms a snapshot can travel in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackupFormat {
    /// Plain JSON document.
    #[default]
    Json,
    /// Gzip-compressed tar holding the JSON document and a text summary.
    Archive,
}

impl BackupFormat {
    /// Guess the format from a file name. Anything not a tarball is read as JSON.
    #[must_use]
    pub fn from_filename(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            BackupFormat::Archive
        } else {
            BackupFormat::Json
        }
    }

    #[must_use]
    pub fn file_extension(self) -> &'static str {
        match self {
            BackupFormat::Json => "json",
            BackupFormat::Archive => "tar.gz",
        }
    }

    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            BackupFormat::Json => "application/json",
            BackupFormat::Archive => "application/gzip",
        }
    }
}

impl fmt::Display for BackupFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackupFormat::Json => "json",
            BackupFormat::Archive => "archive",
        })
    }
}

impl FromStr for BackupFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(BackupFormat::Json),
            "archive" | "tar.gz" | "tgz" => Ok(BackupFormat::Archive),
            other => bail!("Invalid backup format '{other}'. Must be one of: json, archive"),
        }
    }
}

/// Counts reported by [`validate_backup`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupSummary {
    pub version: Option<String>,
    pub categories: usize,
    pub locations: usize,
    pub products: usize,
}

impl fmt::Display for BackupSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Valid backup found: {} categories, {} locations, {} products",
            self.categories, self.locations, self.products
        )
    }
}

/// `frostbox-backup-YYYY-MM-DD_HH-MM-SS.<ext>`
#[must_use]
pub fn backup_filename(format: BackupFormat, at: NaiveDateTime) -> String {
    format!(
        "frostbox-backup-{}.{}",
        at.format("%Y-%m-%d_%H-%M-%S"),
        format.file_extension()
    )
}

pub fn encode_backup(snapshot: &Snapshot, format: BackupFormat) -> Result<Vec<u8>> {
    let json = serde_json::to_vec_pretty(snapshot).context("Failed to serialize backup")?;
    match format {
        BackupFormat::Json => Ok(json),
        BackupFormat::Archive => write_archive(snapshot, &json),
    }
}

pub fn decode_backup(bytes: &[u8], format: BackupFormat) -> Result<Snapshot> {
    if bytes.is_empty() {
        bail!("File is empty");
    }
    let json = match format {
        BackupFormat::Json => bytes.to_vec(),
        BackupFormat::Archive => read_archive(bytes)?,
    };
    serde_json::from_slice(&json).context("Invalid backup file")
}

/// Parse `bytes` and report what they contain, without touching any store.
pub fn validate_backup(bytes: &[u8], format: BackupFormat) -> Result<BackupSummary> {
    let snapshot = decode_backup(bytes, format)?;
    let missing = snapshot.missing_collections();
    if !missing.is_empty() {
        bail!(
            "Backup contains null data collections: {}",
            missing.join(", ")
        );
    }
    Ok(BackupSummary {
        version: snapshot.version.clone(),
        categories: snapshot.category_count(),
        locations: snapshot.location_count(),
        products: snapshot.product_count(),
    })
}

/// Decode `bytes` and restore them into `store`. Decode failures come back as
/// a failed outcome rather than an error.
pub fn import_backup(
    store: &dyn RecordStore,
    bytes: &[u8],
    format: BackupFormat,
    options: &RestoreOptions,
) -> RestoreOutcome {
    match decode_backup(bytes, format) {
        Ok(snapshot) => restore(store, Some(&snapshot), options),
        Err(e) => {
            log::error!("Import of {format} backup failed: {e:#}");
            RestoreOutcome::failed(format!("Import failed: {e:#}"), format!("{e:#}"))
        }
    }
}

fn metadata_text(snapshot: &Snapshot, digest: &str) -> String {
    let created = snapshot
        .backup_timestamp
        .map(|ts| ts.format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_default();
    format!(
        "Frostbox Backup\n\
         Created: {created}\n\
         Version: {}\n\
         Categories: {}\n\
         Locations: {}\n\
         Products: {}\n\
         {DIGEST_KEY}: {digest}\n",
        snapshot.version.as_deref().unwrap_or_default(),
        snapshot.category_count(),
        snapshot.location_count(),
        snapshot.product_count(),
    )
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn append_entry<W: Write>(tar: &mut tar::Builder<W>, name: &str, data: &[u8]) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    tar.append_data(&mut header, name, data)
        .with_context(|| format!("Failed to write {name} to archive"))?;
    Ok(())
}

fn write_archive(snapshot: &Snapshot, json: &[u8]) -> Result<Vec<u8>> {
    let enc = GzEncoder::new(Vec::new(), Compression::default());
    let mut tar = tar::Builder::new(enc);

    append_entry(&mut tar, SNAPSHOT_ENTRY, json)?;
    let metadata = metadata_text(snapshot, &sha256_hex(json));
    append_entry(&mut tar, METADATA_ENTRY, metadata.as_bytes())?;

    let enc = tar.into_inner().context("Failed to finish archive")?;
    enc.finish().context("Failed to compress archive")
}

fn read_archive(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    let mut json = None;
    let mut metadata = None;

    for entry in archive.entries().context("Invalid backup archive")? {
        let mut entry = entry.context("Invalid backup archive")?;
        let path = entry.path()?.to_string_lossy().into_owned();
        let name = path.rsplit('/').next().unwrap_or_default().to_string();
        let mut buf = Vec::new();
        entry
            .read_to_end(&mut buf)
            .with_context(|| format!("Failed to read {name} from archive"))?;
        match name.as_str() {
            SNAPSHOT_ENTRY => json = Some(buf),
            METADATA_ENTRY => metadata = Some(String::from_utf8_lossy(&buf).into_owned()),
            _ => log::debug!("Ignoring archive entry {path}"),
        }
    }

    let Some(json) = json else {
        bail!("Archive does not contain {SNAPSHOT_ENTRY}");
    };
    if let Some(expected) = metadata.as_deref().and_then(metadata_digest) {
        let actual = sha256_hex(&json);
        if !expected.eq_ignore_ascii_case(&actual) {
            bail!("Checksum mismatch for {SNAPSHOT_ENTRY}: expected {expected}, found {actual}");
        }
    }
    Ok(json)
}

fn metadata_digest(metadata: &str) -> Option<&str> {
    metadata.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        (key.trim() == DIGEST_KEY).then_some(value.trim())
    })
}
