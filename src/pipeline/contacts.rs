//! Contact mapping: attach directory contact ids to every evidence block of
//! each trade, then persist the result as a new immutable snapshot.

use std::collections::HashMap;

use rusqlite::Connection;
use tracing::{debug, info};

use super::PipelineError;
use crate::db::repository::contact::{find_ids_by_trade, get_contacts_by_ids};
use crate::models::trade_map::fold_trade;
use crate::models::{Contact, TradeMap};
use crate::storage::{FileStore, StorageRef};

/// Read-only view of the contact directory, so pipeline stages can run
/// against SQLite or a test fixture. Single-threaded like the rest of the
/// pipeline; implementations may borrow a live `Connection`.
pub trait ContactDirectory {
    fn find_ids_by_trade(
        &self,
        trade: &str,
        limit: Option<usize>,
    ) -> Result<Vec<String>, PipelineError>;

    fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Contact>, PipelineError>;
}

pub struct SqliteContactDirectory<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteContactDirectory<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl ContactDirectory for SqliteContactDirectory<'_> {
    fn find_ids_by_trade(
        &self,
        trade: &str,
        limit: Option<usize>,
    ) -> Result<Vec<String>, PipelineError> {
        Ok(find_ids_by_trade(self.conn, trade, limit)?)
    }

    fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Contact>, PipelineError> {
        Ok(get_contacts_by_ids(self.conn, ids)?)
    }
}

/// Assign each trade's matching contact ids to all of its evidence blocks,
/// append the `contacts_mapped` step, and save a `latest_<uuid>.json`
/// snapshot. Returns the snapshot ref.
pub fn map_contacts(
    store: &FileStore,
    directory: &dyn ContactDirectory,
    owner_id: &str,
    job_id: &str,
    json_dir: &StorageRef,
    limit_per_trade: Option<usize>,
) -> Result<StorageRef, PipelineError> {
    let mut map: TradeMap = store.read_json_in(json_dir, "normalized.json")?;

    let trades: Vec<String> = map.sorted_trades().iter().map(|t| t.to_string()).collect();
    for trade in trades {
        let ids = directory.find_ids_by_trade(&trade, limit_per_trade)?;
        debug!(job_id, trade = %trade, matches = ids.len(), "Matched directory contacts");
        if let Some(entries) = map.entries_mut(&trade) {
            for entry in entries {
                entry.contacts = ids.clone();
            }
        }
    }

    map.append_processing_step("contacts_mapped");
    let snapshot = store.save_snapshot(json_dir, &map)?;
    info!(job_id, snapshot = %snapshot.location, "Saved contact map snapshot");
    Ok(snapshot)
}

// ── In-memory fixture ──────────────────────────────────────

/// Test directory backed by vectors; trades match case-insensitively.
#[derive(Default)]
pub struct InMemoryContactDirectory {
    contacts: Vec<Contact>,
    trades: HashMap<String, Vec<String>>,
}

impl InMemoryContactDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, contact: Contact, trades: &[&str]) {
        for trade in trades {
            self.trades
                .entry(fold_trade(trade))
                .or_default()
                .push(contact.id.clone());
        }
        self.contacts.push(contact);
    }
}

impl ContactDirectory for InMemoryContactDirectory {
    fn find_ids_by_trade(
        &self,
        trade: &str,
        limit: Option<usize>,
    ) -> Result<Vec<String>, PipelineError> {
        let mut ids = self
            .trades
            .get(&fold_trade(trade))
            .cloned()
            .unwrap_or_default();
        ids.sort();
        if let Some(n) = limit {
            ids.truncate(n);
        }
        Ok(ids)
    }

    fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Contact>, PipelineError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.contacts.iter().find(|c| &c.id == id).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EvidenceEntry, MapMetadata};

    fn contact(id: &str) -> Contact {
        Contact {
            id: id.into(),
            name: None,
            email: None,
            phone: None,
            service_area: None,
        }
    }

    fn seeded_store(map: &TradeMap) -> (tempfile::TempDir, FileStore, StorageRef) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::local(dir.path()).unwrap();
        let json_dir = store.json_dir("u1", "j1").unwrap();
        store.write_json(&json_dir, "normalized.json", map).unwrap();
        (dir, store, json_dir)
    }

    #[test]
    fn every_block_of_a_trade_gets_the_same_ids() {
        let mut map = TradeMap::new();
        map.push_entries(
            "Plumbing",
            vec![
                EvidenceEntry::new("supply", vec!["2".into()]),
                EvidenceEntry::new("waste", vec!["3".into()]),
            ],
        );
        map.push_entries("undefined", vec![EvidenceEntry::new("?", vec![])]);
        map.metadata = Some(MapMetadata {
            processing_steps: vec!["normalized".into()],
            job: None,
        });
        let (_dir, store, json_dir) = seeded_store(&map);

        let mut directory = InMemoryContactDirectory::new();
        directory.add(contact("c1"), &["Plumbing"]);
        directory.add(contact("c2"), &["plumbing", "HVAC"]);

        let snapshot =
            map_contacts(&store, &directory, "u1", "j1", &json_dir, None).unwrap();
        let mapped: TradeMap = store.read_json(&snapshot).unwrap();

        let entries = mapped.entries("Plumbing").unwrap();
        assert_eq!(entries[0].contacts, vec!["c1", "c2"]);
        assert_eq!(entries[1].contacts, vec!["c1", "c2"]);
        assert!(mapped.entries("undefined").unwrap()[0].contacts.is_empty());
        assert_eq!(
            mapped.metadata.unwrap().processing_steps,
            vec!["normalized", "contacts_mapped"]
        );
    }

    #[test]
    fn sqlite_directory_works_through_the_trait_object() {
        use crate::db::repository::contact::{assign_trade, insert_contact};
        use crate::db::sqlite::open_memory_database;

        let conn = open_memory_database().unwrap();
        insert_contact(&conn, &contact("c1")).unwrap();
        assign_trade(&conn, "c1", "Plumbing").unwrap();

        let sqlite_dir = SqliteContactDirectory::new(&conn);
        let directory: &dyn ContactDirectory = &sqlite_dir;
        assert_eq!(
            directory.find_ids_by_trade("plumbing", None).unwrap(),
            vec!["c1"]
        );
        let resolved = directory.get_by_ids(&["c1".into()]).unwrap();
        assert_eq!(resolved[0].id, "c1");
    }

    #[test]
    fn limit_caps_fanout_per_trade() {
        let mut map = TradeMap::new();
        map.push_entries("Electrical", vec![EvidenceEntry::new("panel", vec![])]);
        let (_dir, store, json_dir) = seeded_store(&map);

        let mut directory = InMemoryContactDirectory::new();
        for id in ["c1", "c2", "c3"] {
            directory.add(contact(id), &["Electrical"]);
        }

        let snapshot =
            map_contacts(&store, &directory, "u1", "j1", &json_dir, Some(2)).unwrap();
        let mapped: TradeMap = store.read_json(&snapshot).unwrap();
        assert_eq!(mapped.entries("Electrical").unwrap()[0].contacts.len(), 2);
    }

    #[test]
    fn snapshot_does_not_touch_normalized_json() {
        let mut map = TradeMap::new();
        map.push_entries("HVAC", vec![EvidenceEntry::new("ducts", vec![])]);
        let (_dir, store, json_dir) = seeded_store(&map);
        let directory = InMemoryContactDirectory::new();

        let snapshot =
            map_contacts(&store, &directory, "u1", "j1", &json_dir, None).unwrap();
        assert!(snapshot.location.contains("latest_"));

        let original: TradeMap = store.read_json_in(&json_dir, "normalized.json").unwrap();
        assert!(original.metadata.is_none() || !original
            .metadata
            .unwrap()
            .processing_steps
            .contains(&"contacts_mapped".to_string()));
    }
}
