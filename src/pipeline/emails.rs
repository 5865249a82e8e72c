//! Email generation: render one outreach draft per (evidence block, contact)
//! pair from the job's current contact map snapshot.
//!
//! Contacts without an email address are skipped with a warning rather than
//! failing the batch; drafts are queued for review, never sent from here.

use rusqlite::Connection;
use tracing::{info, warn};

use super::contacts::ContactDirectory;
use super::PipelineError;
use crate::db::repository::email::{create_batch, create_draft};
use crate::db::repository::job::{get_contacts_map_ref, mark_last_email_batch};
use crate::models::{EmailTemplate, TradeMap};
use crate::storage::{FileStore, StorageRef};

/// Summary of a generation run.
#[derive(Debug)]
pub struct EmailRun {
    pub batch_id: String,
    pub drafts_created: usize,
    pub contacts_skipped: usize,
}

/// Generate drafts from the job's current contact map. Blocks with no
/// contacts are skipped; `undefined` blocks with manually attached
/// contacts draft like any other trade.
pub fn generate_emails(
    conn: &Connection,
    store: &FileStore,
    directory: &dyn ContactDirectory,
    job_id: &str,
    template: &EmailTemplate,
) -> Result<EmailRun, PipelineError> {
    let map_ref = get_contacts_map_ref(conn, job_id)?.ok_or_else(|| {
        PipelineError::NotFound(format!("job {job_id} has no contact map snapshot"))
    })?;
    let map: TradeMap = store.read_json(&StorageRef::local(map_ref.clone()))?;

    // Resolve every referenced contact up front, in one chunked lookup.
    let ids = map.collect_contact_ids();
    let contacts = directory.get_by_ids(&ids)?;
    let by_id: std::collections::HashMap<&str, _> =
        contacts.iter().map(|c| (c.id.as_str(), c)).collect();

    let batch_id = create_batch(conn, job_id, &map_ref, template.version.as_deref())?;

    let mut drafts_created = 0;
    let mut contacts_skipped = 0;
    for trade in map.sorted_trades() {
        let Some(entries) = map.entries(trade) else {
            continue;
        };
        for block in entries {
            if block.contacts.is_empty() {
                continue;
            }
            let pages = block.pages.join(", ");
            for contact_id in &block.contacts {
                let Some(contact) = by_id.get(contact_id.as_str()) else {
                    warn!(job_id, contact_id = %contact_id, "Contact no longer in directory, skipping");
                    contacts_skipped += 1;
                    continue;
                };
                let Some(email) = contact.email.as_deref().filter(|e| !e.trim().is_empty())
                else {
                    warn!(job_id, contact_id = %contact_id, "Contact has no email address, skipping");
                    contacts_skipped += 1;
                    continue;
                };
                let (subject, body) =
                    template.render(trade, contact.display_name(), &pages, &block.note);
                create_draft(conn, &batch_id, job_id, contact_id, email, &subject, &body)?;
                drafts_created += 1;
            }
        }
    }

    mark_last_email_batch(conn, job_id, &batch_id, chrono::Utc::now())?;
    info!(job_id, batch_id = %batch_id, drafts_created, contacts_skipped, "Generated email batch");

    Ok(EmailRun {
        batch_id,
        drafts_created,
        contacts_skipped,
    })
}
