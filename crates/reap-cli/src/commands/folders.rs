use std::path::{Path, PathBuf};

use reap_core::db::{MetadataRepository, TypedMetadata, LAST_SUCCESSFUL_GC_SEQ_KEY};
use reap_core::{Database, DatabaseOptions};
use serde::Serialize;

use crate::error::CliError;
use crate::lock::StoreLock;

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct FolderSummary {
    pub folder: String,
    pub database: PathBuf,
    pub files: i64,
    pub tombstones: i64,
    pub top_sequence: i64,
    pub last_gc_sequence: Option<i64>,
}

pub fn run_folders(data_dir: &Path, as_json: bool) -> Result<(), CliError> {
    let summaries = folder_summaries(data_dir)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        for line in format_summary_lines(&summaries) {
            println!("{line}");
        }
    }

    Ok(())
}

/// Read every folder's counts and watermark.
///
/// Opening the store runs migrations, so this takes the store lock as well.
pub fn folder_summaries(data_dir: &Path) -> Result<Vec<FolderSummary>, CliError> {
    let _lock = StoreLock::acquire(data_dir)?;
    let db = Database::open(data_dir, DatabaseOptions::default())?;

    let mut summaries = Vec::new();
    for folder_id in db.list_folders()? {
        let Some(folder) = db.folder(&folder_id)? else {
            continue;
        };
        let counts = folder.counts()?;
        summaries.push(FolderSummary {
            database: folder.path().to_path_buf(),
            top_sequence: folder.top_sequence()?,
            last_gc_sequence: TypedMetadata::internal(&folder).int64(LAST_SUCCESSFUL_GC_SEQ_KEY)?,
            folder: folder_id,
            files: counts.files,
            tombstones: counts.tombstones,
        });
    }

    db.close()?;
    Ok(summaries)
}

pub fn format_summary_lines(summaries: &[FolderSummary]) -> Vec<String> {
    if summaries.is_empty() {
        return vec!["No folders".to_string()];
    }

    summaries
        .iter()
        .map(|summary| {
            let watermark = summary
                .last_gc_sequence
                .map_or_else(|| "never".to_string(), |seq| seq.to_string());
            format!(
                "{}  files={} tombstones={} seq={} last-gc={watermark}",
                summary.folder, summary.files, summary.tombstones, summary.top_sequence
            )
        })
        .collect()
}
