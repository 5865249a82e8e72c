use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{BatchStatus, DraftStatus};

/// A generation run over one contact-map snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailBatch {
    pub batch_id: String,
    pub job_id: String,
    pub contacts_map_ref: String,
    pub template_version: Option<String>,
    pub status: BatchStatus,
    pub created_at: DateTime<Utc>,
}

/// One rendered outreach email awaiting review. Drafts are only editable
/// while in `draft` or `ready` state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailDraft {
    pub id: String,
    pub batch_id: String,
    pub job_id: String,
    pub contact_id: String,
    pub to_email: String,
    pub subject: String,
    pub body: String,
    pub status: DraftStatus,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub dedupe_key: String,
}
