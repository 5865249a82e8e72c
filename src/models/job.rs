use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::JobStatus;
use crate::storage::StorageRef;

/// One document-processing job: a plan set owned by a user, plus the refs
/// each completed stage recorded. Ref fields stay `None` until the
/// corresponding stage has persisted its artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub owner_id: String,
    pub name: String,
    pub notes: Option<String>,
    pub status: JobStatus,
    pub pdf_ref: Option<StorageRef>,
    pub images_ref: Option<StorageRef>,
    pub prompt_ref: Option<StorageRef>,
    pub csvs_ref: Option<StorageRef>,
    pub jsons_ref: Option<StorageRef>,
    pub schema_ref: Option<StorageRef>,
    /// Pointer to the current contact-map snapshot. Moves forward on every
    /// successful edit; never rewritten in place.
    pub current_mapped_contacts_ref: Option<String>,
    pub last_email_batch_id: Option<String>,
    pub last_email_batch_created_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
