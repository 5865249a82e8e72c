//! Combine per-batch CSVs into one trade-keyed table (`combined.json`).
//!
//! Files are walked in filename order; the first record of each file is
//! treated as the model's header row and dropped.

use tracing::{debug, info};

use super::PipelineError;
use crate::models::{CombinedTable, RawEvidence};
use crate::storage::{FileStore, StorageRef};

/// Combine all batch CSVs for a job into `json/combined.json`, returning
/// the job's JSON directory ref.
pub fn combine(
    store: &FileStore,
    owner_id: &str,
    job_id: &str,
    csvs_ref: &StorageRef,
) -> Result<StorageRef, PipelineError> {
    let files = store.list_csv_files(csvs_ref)?;

    let mut table = CombinedTable::new();
    for filename in &files {
        let bytes = store.read_file_in(csvs_ref, filename)?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(bytes.as_slice());

        for (index, record) in reader.records().enumerate() {
            let record = record?;
            if index == 0 {
                continue; // header row
            }
            if record.len() < 3 {
                continue;
            }
            let trade = record[0].trim();
            if trade.is_empty() {
                continue;
            }
            let pages = record[1]
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
            // everything after the second column is note text
            let note = record
                .iter()
                .skip(2)
                .collect::<Vec<_>>()
                .join(",")
                .trim()
                .to_string();
            table.push(trade, RawEvidence { note, pages });
        }
        debug!(job_id, file = %filename, "Merged batch CSV");
    }

    let json_dir = store.json_dir(owner_id, job_id)?;
    store.write_json(&json_dir, "combined.json", &table)?;
    info!(job_id, trades = table.len(), files = files.len(), "Combined CSV batches");
    Ok(json_dir)
}
