use chrono::Utc;
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use crate::db::repository::parse_timestamp;
use crate::db::DatabaseError;
use crate::models::{BatchStatus, DraftStatus, EmailBatch, EmailDraft};

pub fn create_batch(
    conn: &Connection,
    job_id: &str,
    contacts_map_ref: &str,
    template_version: Option<&str>,
) -> Result<String, DatabaseError> {
    let batch_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO email_batches (batch_id, job_id, contacts_map_ref, template_version, \
         status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            batch_id,
            job_id,
            contacts_map_ref,
            template_version,
            BatchStatus::Generated.as_str(),
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(batch_id)
}

pub fn get_batch(conn: &Connection, batch_id: &str) -> Result<EmailBatch, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT batch_id, job_id, contacts_map_ref, template_version, status, created_at
         FROM email_batches WHERE batch_id = ?1",
    )?;
    match stmt.query_row(params![batch_id], batch_from_row) {
        Ok(batch) => batch,
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(DatabaseError::NotFound {
            entity_type: "email_batch".into(),
            id: batch_id.into(),
        }),
        Err(e) => Err(e.into()),
    }
}

pub fn update_batch_status(
    conn: &Connection,
    batch_id: &str,
    status: BatchStatus,
) -> Result<(), DatabaseError> {
    let affected = conn.execute(
        "UPDATE email_batches SET status = ?2 WHERE batch_id = ?1",
        params![batch_id, status.as_str()],
    )?;
    if affected == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "email_batch".into(),
            id: batch_id.into(),
        });
    }
    Ok(())
}

/// Queue one rendered draft. The dedupe key is a fresh UUID: retries of the
/// same generation run insert new rows rather than silently overwriting.
pub fn create_draft(
    conn: &Connection,
    batch_id: &str,
    job_id: &str,
    contact_id: &str,
    to_email: &str,
    subject: &str,
    body: &str,
) -> Result<String, DatabaseError> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO email_queue (id, batch_id, job_id, contact_id, to_email, subject, body, \
         status, attempts, dedupe_key)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9)",
        params![
            id,
            batch_id,
            job_id,
            contact_id,
            to_email,
            subject,
            body,
            DraftStatus::Draft.as_str(),
            Uuid::new_v4().to_string(),
        ],
    )?;
    Ok(id)
}

pub fn get_drafts_by_batch(
    conn: &Connection,
    batch_id: &str,
) -> Result<Vec<EmailDraft>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, batch_id, job_id, contact_id, to_email, subject, body, status, attempts, \
         last_error, sent_at, dedupe_key
         FROM email_queue WHERE batch_id = ?1 ORDER BY rowid",
    )?;
    let rows = stmt.query_map(params![batch_id], draft_from_row)?;
    let mut drafts = Vec::new();
    for row in rows {
        drafts.push(row??);
    }
    Ok(drafts)
}

/// Edit a draft's subject and body. Only drafts still awaiting send may be
/// edited; returns whether a row changed.
pub fn update_draft(
    conn: &Connection,
    draft_id: &str,
    subject: &str,
    body: &str,
) -> Result<bool, DatabaseError> {
    let affected = conn.execute(
        "UPDATE email_queue SET subject = ?2, body = ?3
         WHERE id = ?1 AND status IN ('draft', 'ready')",
        params![draft_id, subject, body],
    )?;
    Ok(affected > 0)
}

pub fn update_draft_status(
    conn: &Connection,
    draft_id: &str,
    status: DraftStatus,
) -> Result<bool, DatabaseError> {
    let sent_at = match status {
        DraftStatus::MockSent => Some(Utc::now().to_rfc3339()),
        _ => None,
    };
    let affected = conn.execute(
        "UPDATE email_queue SET status = ?2, sent_at = COALESCE(?3, sent_at)
         WHERE id = ?1 AND status IN ('draft', 'ready')",
        params![draft_id, status.as_str(), sent_at],
    )?;
    Ok(affected > 0)
}

pub fn mark_draft_failed(
    conn: &Connection,
    draft_id: &str,
    error: &str,
) -> Result<(), DatabaseError> {
    let affected = conn.execute(
        "UPDATE email_queue SET status = ?2, attempts = attempts + 1, last_error = ?3
         WHERE id = ?1",
        params![draft_id, DraftStatus::Failed.as_str(), error],
    )?;
    if affected == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "email_draft".into(),
            id: draft_id.into(),
        });
    }
    Ok(())
}

fn batch_from_row(row: &Row) -> Result<Result<EmailBatch, DatabaseError>, rusqlite::Error> {
    let status_raw: String = row.get(4)?;
    let created_at: String = row.get(5)?;
    Ok((|| -> Result<EmailBatch, DatabaseError> {
        Ok(EmailBatch {
            batch_id: row.get(0)?,
            job_id: row.get(1)?,
            contacts_map_ref: row.get(2)?,
            template_version: row.get(3)?,
            status: status_raw.parse()?,
            created_at: parse_timestamp(&created_at),
        })
    })())
}

fn draft_from_row(row: &Row) -> Result<Result<EmailDraft, DatabaseError>, rusqlite::Error> {
    let status_raw: String = row.get(7)?;
    let sent_at: Option<String> = row.get(10)?;
    Ok((|| -> Result<EmailDraft, DatabaseError> {
        Ok(EmailDraft {
            id: row.get(0)?,
            batch_id: row.get(1)?,
            job_id: row.get(2)?,
            contact_id: row.get(3)?,
            to_email: row.get(4)?,
            subject: row.get(5)?,
            body: row.get(6)?,
            status: status_raw.parse()?,
            attempts: row.get(8)?,
            last_error: row.get(9)?,
            sent_at: sent_at.map(|s| parse_timestamp(&s)),
            dedupe_key: row.get(11)?,
        })
    })())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::job::insert_new_job;
    use crate::db::sqlite::open_memory_database;

    fn batch_with_draft(conn: &Connection) -> (String, String) {
        let job_id = insert_new_job(conn, "u1", "j", None).unwrap();
        let batch_id = create_batch(conn, &job_id, "u/j/json/latest_aa.json", Some("v1")).unwrap();
        let draft_id = create_draft(
            conn,
            &batch_id,
            &job_id,
            "c1",
            "c1@x.test",
            "Bid request",
            "Hello",
        )
        .unwrap();
        (batch_id, draft_id)
    }

    #[test]
    fn drafts_start_in_draft_state() {
        let conn = open_memory_database().unwrap();
        let (batch_id, _) = batch_with_draft(&conn);
        let drafts = get_drafts_by_batch(&conn, &batch_id).unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].status, DraftStatus::Draft);
        assert_eq!(drafts[0].attempts, 0);
    }

    #[test]
    fn sent_drafts_are_immutable() {
        let conn = open_memory_database().unwrap();
        let (batch_id, draft_id) = batch_with_draft(&conn);

        assert!(update_draft_status(&conn, &draft_id, DraftStatus::MockSent).unwrap());
        assert!(!update_draft(&conn, &draft_id, "new subject", "new body").unwrap());
        assert!(!update_draft_status(&conn, &draft_id, DraftStatus::Ready).unwrap());

        let drafts = get_drafts_by_batch(&conn, &batch_id).unwrap();
        assert_eq!(drafts[0].subject, "Bid request");
        assert!(drafts[0].sent_at.is_some());
    }

    #[test]
    fn failure_increments_attempts() {
        let conn = open_memory_database().unwrap();
        let (batch_id, draft_id) = batch_with_draft(&conn);
        mark_draft_failed(&conn, &draft_id, "smtp timeout").unwrap();
        let drafts = get_drafts_by_batch(&conn, &batch_id).unwrap();
        assert_eq!(drafts[0].status, DraftStatus::Failed);
        assert_eq!(drafts[0].attempts, 1);
        assert_eq!(drafts[0].last_error.as_deref(), Some("smtp timeout"));
    }

    #[test]
    fn batch_status_lifecycle() {
        let conn = open_memory_database().unwrap();
        let (batch_id, _) = batch_with_draft(&conn);
        assert_eq!(
            get_batch(&conn, &batch_id).unwrap().status,
            BatchStatus::Generated
        );
        update_batch_status(&conn, &batch_id, BatchStatus::Superseded).unwrap();
        assert_eq!(
            get_batch(&conn, &batch_id).unwrap().status,
            BatchStatus::Superseded
        );
    }
}
