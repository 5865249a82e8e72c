//! Normalize the combined table against an alias schema: every raw trade
//! label becomes a canonical trade or lands in the `undefined` bucket with
//! its original label preserved.

use tracing::{debug, info};

use super::schema::{AliasSchema, UNDEFINED_TRADE};
use super::PipelineError;
use crate::models::trade_map::fold_trade;
use crate::models::{CombinedTable, EvidenceEntry, JobIdentity, MapMetadata, TradeMap};
use crate::storage::{FileStore, StorageRef};

/// Read `combined.json` from the job's JSON directory and write the
/// normalized trade map as `normalized.json`, returning the directory ref.
pub fn normalize(
    store: &FileStore,
    owner_id: &str,
    job_id: &str,
    json_dir: &StorageRef,
    schema: &AliasSchema,
) -> Result<StorageRef, PipelineError> {
    let table: CombinedTable = store.read_json_in(json_dir, "combined.json")?;
    let map = normalize_table(&table, schema, owner_id, job_id);
    store.write_json(json_dir, "normalized.json", &map)?;
    info!(job_id, trades = map.trade_count(), "Normalized trade map");
    Ok(json_dir.clone())
}

/// Pure normalization step, separated for testability.
pub fn normalize_table(
    table: &CombinedTable,
    schema: &AliasSchema,
    owner_id: &str,
    job_id: &str,
) -> TradeMap {
    let lookup = schema.alias_lookup();
    let mut map = TradeMap::new();

    for (raw_trade, rows) in table.iter() {
        let canonical = lookup.get(&fold_trade(raw_trade));
        let (target, original_name) = match canonical {
            Some(name) => (name.as_str(), None),
            None => {
                debug!(trade = raw_trade, "No schema match, bucketing as undefined");
                (UNDEFINED_TRADE, Some(raw_trade.to_string()))
            }
        };
        let entries = rows
            .iter()
            .map(|row| EvidenceEntry {
                note: row.note.clone(),
                pages: row.pages.clone(),
                contacts: Vec::new(),
                original_name: original_name.clone(),
            })
            .collect();
        map.push_entries(target, entries);
    }

    map.metadata = Some(MapMetadata {
        processing_steps: vec!["normalized".to_string()],
        job: Some(JobIdentity {
            owner_id: owner_id.to_string(),
            job_id: job_id.to_string(),
        }),
    });
    map
}
