//! Contact map editor with optimistic concurrency.
//!
//! An edit names the snapshot it was based on. If the job's pointer has
//! moved since, the whole edit is rejected with a conflict; the client
//! refetches and reapplies. Ops are validated and applied entirely in
//! memory, so a failing op leaves no partial snapshot behind.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

use super::contacts::ContactDirectory;
use super::PipelineError;
use crate::db::repository::job::{get_contacts_map_ref, get_owner_id, update_status_contacts_map};
use crate::models::{Contact, TradeMap};
use crate::storage::{canonical_location, FileStore, StorageRef};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapOp {
    pub op: String,
    pub trade: String,
    pub block: usize,
    pub contact_id: String,
}

/// Result of a successful edit: the advanced pointer, the cleaned map, and
/// the referenced contacts resolved for display.
#[derive(Debug, Serialize)]
pub struct EditOutcome {
    pub new_ref: String,
    pub map: TradeMap,
    pub contacts_by_id: HashMap<String, Contact>,
}

/// Apply a batch of `add_contact`/`remove_contact` ops against the job's
/// current contact map.
///
/// `base_ref` must equal the job's current snapshot pointer (compared after
/// separator and whitespace normalization); otherwise the edit conflicts.
pub fn apply_ops(
    conn: &Connection,
    store: &FileStore,
    directory: &dyn ContactDirectory,
    job_id: &str,
    base_ref: &str,
    ops: &[MapOp],
) -> Result<EditOutcome, PipelineError> {
    let current = get_contacts_map_ref(conn, job_id)?.ok_or_else(|| {
        PipelineError::Conflict(format!("job {job_id} has no contact map snapshot"))
    })?;

    if canonical_location(base_ref) != canonical_location(&current) {
        warn!(job_id, base_ref, current = %current, "Rejecting edit against stale snapshot");
        return Err(PipelineError::Conflict(format!(
            "base ref {base_ref} does not match current snapshot {current}"
        )));
    }

    let mut map: TradeMap = store.read_json(&StorageRef::local(current))?;

    // Validate and apply everything before any write.
    for op in ops {
        apply_op(&mut map, op)?;
    }

    let owner_id = get_owner_id(conn, job_id)?;
    let filename = format!(
        "contacts_map_{}.json",
        chrono::Utc::now().format("%Y-%m-%dT%H-%M-%S%.f")
    );
    let new_ref = store.save_json_as(&owner_id, job_id, &filename, &map)?;
    update_status_contacts_map(conn, job_id, &new_ref.location)?;
    info!(job_id, ops = ops.len(), new_ref = %new_ref.location, "Applied contact map edit");

    let ids = map.collect_contact_ids();
    let contacts_by_id = directory
        .get_by_ids(&ids)?
        .into_iter()
        .map(|c| (c.id.clone(), c))
        .collect();

    Ok(EditOutcome {
        new_ref: new_ref.location,
        map: map.without_metadata(),
        contacts_by_id,
    })
}

fn apply_op(map: &mut TradeMap, op: &MapOp) -> Result<(), PipelineError> {
    let entries = map.entries_mut(&op.trade).ok_or_else(|| {
        PipelineError::Validation(format!("unknown trade '{}'", op.trade))
    })?;
    let len = entries.len();
    let block = entries.get_mut(op.block).ok_or_else(|| {
        PipelineError::Validation(format!(
            "block {} out of range for trade '{}' ({len} blocks)",
            op.block, op.trade
        ))
    })?;

    match op.op.as_str() {
        "add_contact" => {
            if !block.contacts.contains(&op.contact_id) {
                block.contacts.push(op.contact_id.clone());
            }
        }
        "remove_contact" => block.contacts.retain(|id| id != &op.contact_id),
        other => {
            return Err(PipelineError::Validation(format!(
                "unknown op '{other}' (expected add_contact or remove_contact)"
            )))
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::job::insert_new_job;
    use crate::db::sqlite::open_memory_database;
    use crate::models::{EvidenceEntry, MapMetadata};
    use crate::pipeline::contacts::InMemoryContactDirectory;

    fn op(kind: &str, trade: &str, block: usize, contact_id: &str) -> MapOp {
        MapOp {
            op: kind.into(),
            trade: trade.into(),
            block,
            contact_id: contact_id.into(),
        }
    }

    /// Seeds a job with a saved snapshot and an advanced pointer.
    fn fixture() -> (
        rusqlite::Connection,
        tempfile::TempDir,
        FileStore,
        String,
        String,
    ) {
        let conn = open_memory_database().unwrap();
        let job_id = insert_new_job(&conn, "u1", "j", None).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::local(dir.path()).unwrap();

        let mut map = TradeMap::new();
        let mut entry = EvidenceEntry::new("supply", vec!["2".into()]);
        entry.contacts = vec!["c1".into()];
        map.push_entries("Plumbing", vec![entry, EvidenceEntry::new("waste", vec![])]);
        map.metadata = Some(MapMetadata {
            processing_steps: vec!["normalized".into(), "contacts_mapped".into()],
            job: None,
        });

        let json_dir = store.json_dir("u1", &job_id).unwrap();
        let snapshot = store.save_snapshot(&json_dir, &map).unwrap();
        update_status_contacts_map(&conn, &job_id, &snapshot.location).unwrap();

        (conn, dir, store, job_id, snapshot.location)
    }

    #[test]
    fn applies_ops_and_advances_pointer() {
        let (conn, _dir, store, job_id, base) = fixture();
        let mut directory = InMemoryContactDirectory::new();
        directory.add(
            Contact {
                id: "c2".into(),
                name: Some("Ada".into()),
                email: None,
                phone: None,
                service_area: None,
            },
            &["Plumbing"],
        );

        let outcome = apply_ops(
            &conn,
            &store,
            &directory,
            &job_id,
            &base,
            &[
                op("add_contact", "Plumbing", 1, "c2"),
                op("remove_contact", "Plumbing", 0, "c1"),
            ],
        )
        .unwrap();

        assert!(outcome.new_ref.contains("contacts_map_"));
        assert_ne!(outcome.new_ref, base);
        assert_eq!(
            get_contacts_map_ref(&conn, &job_id).unwrap().as_deref(),
            Some(outcome.new_ref.as_str())
        );

        let entries = outcome.map.entries("Plumbing").unwrap();
        assert!(entries[0].contacts.is_empty());
        assert_eq!(entries[1].contacts, vec!["c2"]);
        // response map is cleaned, persisted map keeps metadata
        assert!(outcome.map.metadata.is_none());
        let persisted: TradeMap = store
            .read_json(&StorageRef::local(outcome.new_ref.clone()))
            .unwrap();
        assert!(persisted.metadata.is_some());
        assert_eq!(outcome.contacts_by_id["c2"].name.as_deref(), Some("Ada"));
    }

    #[test]
    fn stale_base_ref_conflicts() {
        let (conn, _dir, store, job_id, base) = fixture();
        let directory = InMemoryContactDirectory::new();

        // First edit moves the pointer.
        apply_ops(&conn, &store, &directory, &job_id, &base, &[]).unwrap();

        // Second edit against the original ref must conflict.
        let err = apply_ops(
            &conn,
            &store,
            &directory,
            &job_id,
            &base,
            &[op("add_contact", "Plumbing", 0, "c9")],
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Conflict(_)));
    }

    #[test]
    fn base_ref_comparison_ignores_separators_and_whitespace() {
        let (conn, _dir, store, job_id, base) = fixture();
        let directory = InMemoryContactDirectory::new();
        let windows_style = format!(" {} ", base.replace('/', "\\"));
        assert!(apply_ops(&conn, &store, &directory, &job_id, &windows_style, &[]).is_ok());
    }

    #[test]
    fn invalid_op_leaves_everything_untouched() {
        let (conn, _dir, store, job_id, base) = fixture();
        let directory = InMemoryContactDirectory::new();

        for bad in [
            op("add_contact", "Roofing", 0, "c2"),      // unknown trade
            op("add_contact", "Plumbing", 5, "c2"),     // block out of range
            op("merge", "Plumbing", 0, "c2"),   // unknown op kind
        ] {
            let err = apply_ops(
                &conn,
                &store,
                &directory,
                &job_id,
                &base,
                &[op("add_contact", "Plumbing", 0, "c2"), bad],
            )
            .unwrap_err();
            assert!(matches!(err, PipelineError::Validation(_)));
            // pointer unchanged, no partial snapshot
            assert_eq!(
                get_contacts_map_ref(&conn, &job_id).unwrap().as_deref(),
                Some(base.as_str())
            );
        }
    }

    #[test]
    fn add_is_idempotent() {
        let (conn, _dir, store, job_id, base) = fixture();
        let directory = InMemoryContactDirectory::new();
        let outcome = apply_ops(
            &conn,
            &store,
            &directory,
            &job_id,
            &base,
            &[op("add_contact", "Plumbing", 0, "c1"), op("add_contact", "Plumbing", 0, "c1")],
        )
        .unwrap();
        assert_eq!(outcome.map.entries("Plumbing").unwrap()[0].contacts, vec!["c1"]);
    }

    #[test]
    fn missing_snapshot_is_a_conflict() {
        let conn = open_memory_database().unwrap();
        let job_id = insert_new_job(&conn, "u1", "j", None).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::local(dir.path()).unwrap();
        let directory = InMemoryContactDirectory::new();

        let err = apply_ops(&conn, &store, &directory, &job_id, "whatever", &[]).unwrap_err();
        assert!(matches!(err, PipelineError::Conflict(_)));
    }
}
