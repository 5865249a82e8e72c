//! Document models for the evidence pipeline: the combined per-trade table
//! produced from recovered CSV rows, and the normalized trade map that every
//! later stage (contact mapping, editing, email generation) operates on.

use std::collections::HashMap;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Case-fold used everywhere trade names are compared or ordered.
pub fn fold_trade(name: &str) -> String {
    name.to_lowercase()
}

// ────────────────────────────────────────────────────────────────────────────
// Combined table (pre-normalization)
// ────────────────────────────────────────────────────────────────────────────

/// One recovered CSV row, before alias resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvidence {
    pub note: String,
    pub pages: Vec<String>,
}

/// Trade-keyed rows in document order: trades appear in the order they were
/// first seen while walking the batch files, and rows within a trade keep
/// their file order. Serializes as a JSON object in that same order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CombinedTable {
    entries: Vec<(String, Vec<RawEvidence>)>,
}

impl CombinedTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, trade: &str, evidence: RawEvidence) {
        match self.entries.iter_mut().find(|(t, _)| t == trade) {
            Some((_, rows)) => rows.push(evidence),
            None => self.entries.push((trade.to_string(), vec![evidence])),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[RawEvidence])> {
        self.entries.iter().map(|(t, rows)| (t.as_str(), rows.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for CombinedTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (trade, rows) in &self.entries {
            map.serialize_entry(trade, rows)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for CombinedTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = CombinedTable;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of trade name to evidence rows")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::new();
                while let Some((trade, rows)) =
                    access.next_entry::<String, Vec<RawEvidence>>()?
                {
                    entries.push((trade, rows));
                }
                Ok(CombinedTable { entries })
            }
        }

        deserializer.deserialize_map(TableVisitor)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Normalized trade map
// ────────────────────────────────────────────────────────────────────────────

/// One evidence block under a canonical trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceEntry {
    #[serde(default)]
    pub note: String,
    #[serde(default, deserialize_with = "de_pages")]
    pub pages: Vec<String>,
    #[serde(default, deserialize_with = "de_contacts")]
    pub contacts: Vec<String>,
    /// The pre-normalization trade label, kept only for `undefined` entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
}

impl EvidenceEntry {
    pub fn new(note: impl Into<String>, pages: Vec<String>) -> Self {
        Self {
            note: note.into(),
            pages,
            contacts: Vec::new(),
            original_name: None,
        }
    }
}

/// Pages arrive as strings or numbers depending on who wrote the JSON.
fn de_pages<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let values = Vec::<Value>::deserialize(deserializer)?;
    values.iter().map(scalar_to_string::<D>).collect()
}

/// Contacts may be absent, null, a scalar, or a list of scalars.
fn de_contacts<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::Array(values) => values.iter().map(scalar_to_string::<D>).collect(),
        scalar => Ok(vec![scalar_to_string::<D>(&scalar)?]),
    }
}

fn scalar_to_string<'de, D: Deserializer<'de>>(value: &Value) -> Result<String, D::Error> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected scalar, got {other}"
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobIdentity {
    pub owner_id: String,
    pub job_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapMetadata {
    #[serde(default)]
    pub processing_steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job: Option<JobIdentity>,
}

/// The normalized contact map: canonical trade names to evidence blocks,
/// plus a `metadata` member carried alongside the trades.
///
/// Serializes with trade keys ordered case-insensitively and `metadata`
/// always last, so snapshots diff cleanly across platforms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TradeMap {
    trades: Vec<(String, Vec<EvidenceEntry>)>,
    pub metadata: Option<MapMetadata>,
}

impl TradeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append entries under `trade`, creating the trade if new. The trade
    /// key match is exact; callers normalize names before inserting.
    pub fn push_entries(&mut self, trade: &str, entries: Vec<EvidenceEntry>) {
        match self.trades.iter_mut().find(|(t, _)| t == trade) {
            Some((_, existing)) => existing.extend(entries),
            None => self.trades.push((trade.to_string(), entries)),
        }
    }

    pub fn entries(&self, trade: &str) -> Option<&[EvidenceEntry]> {
        self.trades
            .iter()
            .find(|(t, _)| t == trade)
            .map(|(_, e)| e.as_slice())
    }

    pub fn entries_mut(&mut self, trade: &str) -> Option<&mut Vec<EvidenceEntry>> {
        self.trades
            .iter_mut()
            .find(|(t, _)| t == trade)
            .map(|(_, e)| e)
    }

    /// Trade names in the canonical (case-insensitive) order.
    pub fn sorted_trades(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.trades.iter().map(|(t, _)| t.as_str()).collect();
        names.sort_by(|a, b| fold_trade(a).cmp(&fold_trade(b)).then(a.cmp(b)));
        names
    }

    pub fn trade_count(&self) -> usize {
        self.trades.len()
    }

    pub fn append_processing_step(&mut self, step: &str) {
        self.metadata
            .get_or_insert_with(MapMetadata::default)
            .processing_steps
            .push(step.to_string());
    }

    /// Copy of the map with `metadata` removed, for API responses.
    pub fn without_metadata(&self) -> TradeMap {
        TradeMap {
            trades: self.trades.clone(),
            metadata: None,
        }
    }

    /// Unique contact ids across all trades, first-seen order over the
    /// canonical trade ordering.
    pub fn collect_contact_ids(&self) -> Vec<String> {
        let mut seen = HashMap::new();
        let mut ids = Vec::new();
        for trade in self.sorted_trades() {
            if let Some(entries) = self.entries(trade) {
                for entry in entries {
                    for id in &entry.contacts {
                        if seen.insert(id.clone(), ()).is_none() {
                            ids.push(id.clone());
                        }
                    }
                }
            }
        }
        ids
    }
}

impl Serialize for TradeMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let extra = usize::from(self.metadata.is_some());
        let mut map = serializer.serialize_map(Some(self.trades.len() + extra))?;
        for trade in self.sorted_trades() {
            // sorted_trades only yields keys present in self.trades
            if let Some(entries) = self.entries(trade) {
                map.serialize_entry(trade, entries)?;
            }
        }
        if let Some(meta) = &self.metadata {
            map.serialize_entry("metadata", meta)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for TradeMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MapVisitor;

        impl<'de> Visitor<'de> for MapVisitor {
            type Value = TradeMap;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of trade name to entries, optionally with metadata")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut map = TradeMap::new();
                while let Some(key) = access.next_key::<String>()? {
                    if key == "metadata" {
                        map.metadata = Some(access.next_value()?);
                    } else {
                        let entries: Vec<EvidenceEntry> = access.next_value()?;
                        map.push_entries(&key, entries);
                    }
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(MapVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_table_keeps_first_seen_order() {
        let mut table = CombinedTable::new();
        table.push("Plumbing", RawEvidence { note: "a".into(), pages: vec!["1".into()] });
        table.push("Electrical", RawEvidence { note: "b".into(), pages: vec![] });
        table.push("Plumbing", RawEvidence { note: "c".into(), pages: vec!["2".into()] });

        let order: Vec<&str> = table.iter().map(|(t, _)| t).collect();
        assert_eq!(order, vec!["Plumbing", "Electrical"]);
        assert_eq!(table.iter().next().unwrap().1.len(), 2);

        let json = serde_json::to_string(&table).unwrap();
        assert!(json.find("Plumbing").unwrap() < json.find("Electrical").unwrap());
        let back: CombinedTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn trade_map_serializes_sorted_with_metadata_last() {
        let mut map = TradeMap::new();
        map.push_entries("undefined", vec![EvidenceEntry::new("x", vec![])]);
        map.push_entries("Electrical", vec![EvidenceEntry::new("y", vec![])]);
        map.push_entries("HVAC", vec![EvidenceEntry::new("z", vec![])]);
        map.metadata = Some(MapMetadata {
            processing_steps: vec!["normalized".into()],
            job: None,
        });

        let json = serde_json::to_string(&map).unwrap();
        let e = json.find("\"Electrical\"").unwrap();
        let h = json.find("\"HVAC\"").unwrap();
        let u = json.find("\"undefined\"").unwrap();
        let m = json.find("\"metadata\"").unwrap();
        assert!(e < h && h < u && u < m);
    }

    #[test]
    fn lenient_contacts_and_pages() {
        let json = r#"{
            "Plumbing": [
                {"note": "water lines", "pages": [2, "5"], "contacts": "c-1"},
                {"note": "", "pages": [], "contacts": null},
                {"pages": ["7"], "contacts": ["c-2", 3]}
            ]
        }"#;
        let map: TradeMap = serde_json::from_str(json).unwrap();
        let entries = map.entries("Plumbing").unwrap();
        assert_eq!(entries[0].pages, vec!["2", "5"]);
        assert_eq!(entries[0].contacts, vec!["c-1"]);
        assert!(entries[1].contacts.is_empty());
        assert_eq!(entries[2].note, "");
        assert_eq!(entries[2].contacts, vec!["c-2", "3"]);
    }

    #[test]
    fn collect_contact_ids_dedupes_in_order() {
        let mut map = TradeMap::new();
        let mut a = EvidenceEntry::new("", vec![]);
        a.contacts = vec!["c2".into(), "c1".into()];
        let mut b = EvidenceEntry::new("", vec![]);
        b.contacts = vec!["c1".into(), "c3".into()];
        map.push_entries("Electrical", vec![a]);
        map.push_entries("Plumbing", vec![b]);
        assert_eq!(map.collect_contact_ids(), vec!["c2", "c1", "c3"]);
    }

    #[test]
    fn without_metadata_drops_only_metadata() {
        let mut map = TradeMap::new();
        map.push_entries("HVAC", vec![EvidenceEntry::new("ducts", vec!["3".into()])]);
        map.append_processing_step("normalized");
        let cleaned = map.without_metadata();
        assert!(cleaned.metadata.is_none());
        assert_eq!(cleaned.entries("HVAC"), map.entries("HVAC"));
    }
}
