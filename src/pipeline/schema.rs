//! Alias schema: maps the free-form trade labels the model emits onto the
//! canonical trade names the contact directory is organized by.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::PipelineError;
use crate::models::trade_map::fold_trade;

/// Bucket for trade labels no schema entry claims.
pub const UNDEFINED_TRADE: &str = "undefined";

pub const DEFAULT_ALIAS_SCHEMA: &str = include_str!("../../resources/default_schema.json");

/// Ref recorded on the job when the built-in schema was used.
pub const BUILTIN_SCHEMA_REF: &str = "builtin:default_schema@2025-08-06";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeAlias {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasSchema {
    pub schema_version: String,
    pub trades: Vec<TradeAlias>,
}

impl AliasSchema {
    pub fn parse(raw: &str) -> Result<Self, PipelineError> {
        let schema: AliasSchema =
            serde_json::from_str(raw).map_err(|e| PipelineError::Schema(e.to_string()))?;
        if schema.trades.is_empty() {
            return Err(PipelineError::Schema("schema has no trades".into()));
        }
        for trade in &schema.trades {
            if trade.name.trim().is_empty() {
                return Err(PipelineError::Schema("schema trade with empty name".into()));
            }
        }
        Ok(schema)
    }

    /// The compiled-in default schema. Infallible by construction; covered
    /// by a test so a bad edit to the resource file fails CI.
    pub fn builtin() -> Result<Self, PipelineError> {
        Self::parse(DEFAULT_ALIAS_SCHEMA)
    }

    /// Case-folded alias (and canonical name) to canonical name.
    pub fn alias_lookup(&self) -> HashMap<String, String> {
        let mut lookup = HashMap::new();
        for trade in &self.trades {
            lookup.insert(fold_trade(&trade.name), trade.name.clone());
            for alias in &trade.aliases {
                lookup.insert(fold_trade(alias), trade.name.clone());
            }
        }
        lookup
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_schema_parses() {
        let schema = AliasSchema::builtin().unwrap();
        assert!(schema.trades.iter().any(|t| t.name == "Plumbing"));
    }

    #[test]
    fn lookup_folds_aliases_and_canonical_names() {
        let schema = AliasSchema::parse(
            r#"{
                "schema_version": "1",
                "trades": [
                    {"name": "Plumbing", "aliases": ["Water Lines", "Piping"]}
                ]
            }"#,
        )
        .unwrap();
        let lookup = schema.alias_lookup();
        assert_eq!(lookup.get("plumbing").map(String::as_str), Some("Plumbing"));
        assert_eq!(lookup.get("water lines").map(String::as_str), Some("Plumbing"));
        assert_eq!(lookup.get("piping").map(String::as_str), Some("Plumbing"));
        assert_eq!(lookup.get("electrical"), None);
    }

    #[test]
    fn empty_or_invalid_schema_is_rejected() {
        assert!(matches!(
            AliasSchema::parse(r#"{"schema_version": "1", "trades": []}"#),
            Err(PipelineError::Schema(_))
        ));
        assert!(matches!(
            AliasSchema::parse("not json"),
            Err(PipelineError::Schema(_))
        ));
        assert!(matches!(
            AliasSchema::parse(r#"{"schema_version": "1", "trades": [{"name": "  "}]}"#),
            Err(PipelineError::Schema(_))
        ));
    }
}
