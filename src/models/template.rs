use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Per-trade replacement for the base subject and/or body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// Outreach email template. Subject and body may contain the placeholders
/// `{name}`, `{trade}`, `{pages}` and `{notes}`; unknown placeholders are
/// left untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub subject: String,
    pub body: String,
    /// Keyed by canonical trade name, matched case-insensitively.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub overrides: HashMap<String, TemplateOverride>,
}

impl EmailTemplate {
    /// Subject and body for a trade, with any per-trade override applied.
    pub fn for_trade(&self, trade: &str) -> (&str, &str) {
        let lowered = trade.to_lowercase();
        let ov = self
            .overrides
            .iter()
            .find(|(k, _)| k.to_lowercase() == lowered)
            .map(|(_, v)| v);
        let subject = ov
            .and_then(|o| o.subject.as_deref())
            .unwrap_or(&self.subject);
        let body = ov.and_then(|o| o.body.as_deref()).unwrap_or(&self.body);
        (subject, body)
    }

    pub fn render(
        &self,
        trade: &str,
        name: &str,
        pages: &str,
        notes: &str,
    ) -> (String, String) {
        let (subject, body) = self.for_trade(trade);
        (
            fill(subject, trade, name, pages, notes),
            fill(body, trade, name, pages, notes),
        )
    }
}

fn fill(text: &str, trade: &str, name: &str, pages: &str, notes: &str) -> String {
    text.replace("{name}", name)
        .replace("{trade}", trade)
        .replace("{pages}", pages)
        .replace("{notes}", notes)
}
