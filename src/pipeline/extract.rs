//! Vision extraction: feed page-image batches to the vision model and
//! recover CSV rows from its free-text replies.
//!
//! A failed batch is skipped, not fatal: the run reports exactly which
//! batches produced a CSV and which were lost, and the caller decides
//! whether partial coverage is acceptable.

use tracing::{debug, info, warn};

use super::vision::{ContentPart, VisionClient};
use super::PipelineError;
use crate::storage::file_store::page_ordinal;
use crate::storage::{FileStore, StorageRef};

/// Minimum fields for a recovered row: trade, pages, note.
const MIN_FIELDS: usize = 3;

/// Result of an extraction run over all page batches.
#[derive(Debug)]
pub struct ExtractionOutcome {
    pub csvs_ref: StorageRef,
    /// 1-based ordinals of batches that produced a CSV file.
    pub written: Vec<usize>,
    /// 1-based ordinals of batches whose model call failed.
    pub skipped: Vec<usize>,
}

/// Run the vision model over the job's page images in batches of
/// `batch_size`, writing one `batch_<n>.csv` per successful batch.
pub fn extract(
    store: &FileStore,
    client: &dyn VisionClient,
    owner_id: &str,
    job_id: &str,
    images_ref: &StorageRef,
    prompt: &str,
    batch_size: usize,
) -> Result<ExtractionOutcome, PipelineError> {
    let files = store.list_page_images(images_ref)?;
    let batch_size = batch_size.max(1);

    let mut written = Vec::new();
    let mut skipped = Vec::new();

    for (batch_index, chunk) in files.chunks(batch_size).enumerate() {
        let ordinal = batch_index + 1;

        let mut parts = vec![ContentPart::text(prompt)];
        for (offset, filename) in chunk.iter().enumerate() {
            let bytes = store.read_file_in(images_ref, filename)?;
            let page = page_ordinal(filename)
                .map(|n| n as usize)
                .unwrap_or(batch_index * batch_size + offset + 1);
            parts.push(ContentPart::image_png(&bytes));
            parts.push(ContentPart::text(format!("(This is page {page}.)")));
        }

        let reply = match client.complete(&parts) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(job_id, batch = ordinal, error = %e, "Vision batch failed, skipping");
                skipped.push(ordinal);
                continue;
            }
        };

        let rows = recover_csv_rows(&reply);
        debug!(job_id, batch = ordinal, rows = rows.len(), "Recovered CSV rows");
        let csv_bytes = rows_to_csv(&rows)?;
        store.save_csv(owner_id, job_id, &format!("batch_{ordinal}.csv"), &csv_bytes)?;
        written.push(ordinal);
    }

    info!(
        job_id,
        batches = written.len() + skipped.len(),
        written = written.len(),
        skipped = skipped.len(),
        "Extraction run complete"
    );

    Ok(ExtractionOutcome {
        csvs_ref: store.csvs_dir(owner_id, job_id)?,
        written,
        skipped,
    })
}

/// Recover CSV rows from a model reply: fence lines are dropped, each
/// remaining line is parsed as one quoted-CSV record, and records with
/// fewer than three fields are discarded. Fields are trimmed.
pub fn recover_csv_rows(reply: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    for line in reply.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("```") {
            continue;
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(line.as_bytes());
        let record = match reader.records().next() {
            Some(Ok(record)) => record,
            _ => continue,
        };
        if record.len() < MIN_FIELDS {
            debug!(line, "Dropping row with too few fields");
            continue;
        }
        rows.push(record.iter().map(|f| f.trim().to_string()).collect());
    }
    rows
}

fn rows_to_csv(rows: &[Vec<String>]) -> Result<Vec<u8>, PipelineError> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());
    for row in rows {
        writer.write_record(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| PipelineError::Validation(format!("CSV write failed: {e}")))
}
