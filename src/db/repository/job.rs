use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use crate::db::repository::parse_timestamp;
use crate::db::DatabaseError;
use crate::models::{Job, JobStatus};
use crate::storage::{StorageMode, StorageRef};

const JOB_COLUMNS: &str = "job_id, owner_id, name, notes, status, \
     pdf_ref, pdf_mode, images_ref, images_mode, prompt_ref, prompt_mode, \
     csvs_ref, csvs_mode, jsons_ref, jsons_mode, schema_ref, schema_mode, \
     current_mapped_contacts_ref, last_email_batch_id, last_email_batch_created_at, created_at";

pub fn insert_new_job(
    conn: &Connection,
    owner_id: &str,
    name: &str,
    notes: Option<&str>,
) -> Result<String, DatabaseError> {
    let job_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO jobs (job_id, owner_id, name, notes, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            job_id,
            owner_id,
            name,
            notes,
            JobStatus::Created.as_str(),
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(job_id)
}

pub fn get_job(conn: &Connection, job_id: &str) -> Result<Job, DatabaseError> {
    let mut stmt =
        conn.prepare(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE job_id = ?1"))?;
    match stmt.query_row(params![job_id], job_from_row) {
        Ok(job) => job,
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(DatabaseError::NotFound {
            entity_type: "job".into(),
            id: job_id.into(),
        }),
        Err(e) => Err(e.into()),
    }
}

/// All non-deleted jobs for an owner, newest first.
pub fn get_jobs_by_owner(conn: &Connection, owner_id: &str) -> Result<Vec<Job>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {JOB_COLUMNS} FROM jobs
         WHERE owner_id = ?1 AND status != 'DELETED'
         ORDER BY created_at DESC"
    ))?;
    let rows = stmt.query_map(params![owner_id], job_from_row)?;
    let mut jobs = Vec::new();
    for row in rows {
        jobs.push(row??);
    }
    Ok(jobs)
}

pub fn get_owner_id(conn: &Connection, job_id: &str) -> Result<String, DatabaseError> {
    conn.query_row(
        "SELECT owner_id FROM jobs WHERE job_id = ?1",
        params![job_id],
        |row| row.get(0),
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => DatabaseError::NotFound {
            entity_type: "job".into(),
            id: job_id.into(),
        },
        other => other.into(),
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Stage transitions. Each sets the stage's artifact ref and advances the
// status in the same statement; callers persist the artifact first.
// ────────────────────────────────────────────────────────────────────────────

pub fn update_status_pdf_saved(
    conn: &Connection,
    job_id: &str,
    pdf_ref: &StorageRef,
) -> Result<(), DatabaseError> {
    update_job(
        conn,
        job_id,
        "UPDATE jobs SET pdf_ref = ?2, pdf_mode = ?3, status = ?4 WHERE job_id = ?1",
        params![
            job_id,
            pdf_ref.location,
            pdf_ref.mode.as_str(),
            JobStatus::PdfSaved.as_str(),
        ],
    )
}

pub fn update_status_images_extracted(
    conn: &Connection,
    job_id: &str,
    images_ref: &StorageRef,
) -> Result<(), DatabaseError> {
    update_job(
        conn,
        job_id,
        "UPDATE jobs SET images_ref = ?2, images_mode = ?3, status = ?4 WHERE job_id = ?1",
        params![
            job_id,
            images_ref.location,
            images_ref.mode.as_str(),
            JobStatus::ImagesExtracted.as_str(),
        ],
    )
}

pub fn update_status_llm_run(
    conn: &Connection,
    job_id: &str,
    csvs_ref: &StorageRef,
    prompt_ref: &StorageRef,
) -> Result<(), DatabaseError> {
    update_job(
        conn,
        job_id,
        "UPDATE jobs SET csvs_ref = ?2, csvs_mode = ?3, prompt_ref = ?4, prompt_mode = ?5, \
         status = ?6 WHERE job_id = ?1",
        params![
            job_id,
            csvs_ref.location,
            csvs_ref.mode.as_str(),
            prompt_ref.location,
            prompt_ref.mode.as_str(),
            JobStatus::LlmRun.as_str(),
        ],
    )
}

pub fn update_status_csvs_combined(conn: &Connection, job_id: &str) -> Result<(), DatabaseError> {
    update_job(
        conn,
        job_id,
        "UPDATE jobs SET status = ?2 WHERE job_id = ?1",
        params![job_id, JobStatus::CsvsCombined.as_str()],
    )
}

pub fn update_status_json_normalized(
    conn: &Connection,
    job_id: &str,
    jsons_ref: &StorageRef,
    schema_ref: &StorageRef,
) -> Result<(), DatabaseError> {
    update_job(
        conn,
        job_id,
        "UPDATE jobs SET jsons_ref = ?2, jsons_mode = ?3, schema_ref = ?4, schema_mode = ?5, \
         status = ?6 WHERE job_id = ?1",
        params![
            job_id,
            jsons_ref.location,
            jsons_ref.mode.as_str(),
            schema_ref.location,
            schema_ref.mode.as_str(),
            JobStatus::JsonNormalized.as_str(),
        ],
    )
}

/// Advance the contact-map pointer to a freshly written snapshot.
pub fn update_status_contacts_map(
    conn: &Connection,
    job_id: &str,
    mapped_ref: &str,
) -> Result<(), DatabaseError> {
    update_job(
        conn,
        job_id,
        "UPDATE jobs SET current_mapped_contacts_ref = ?2, status = ?3 WHERE job_id = ?1",
        params![job_id, mapped_ref, JobStatus::ContactMapSet.as_str()],
    )
}

pub fn get_contacts_map_ref(
    conn: &Connection,
    job_id: &str,
) -> Result<Option<String>, DatabaseError> {
    conn.query_row(
        "SELECT current_mapped_contacts_ref FROM jobs WHERE job_id = ?1",
        params![job_id],
        |row| row.get(0),
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => DatabaseError::NotFound {
            entity_type: "job".into(),
            id: job_id.into(),
        },
        other => other.into(),
    })
}

pub fn get_jsons_ref(
    conn: &Connection,
    job_id: &str,
) -> Result<Option<StorageRef>, DatabaseError> {
    let (location, mode): (Option<String>, Option<String>) = conn
        .query_row(
            "SELECT jsons_ref, jsons_mode FROM jobs WHERE job_id = ?1",
            params![job_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => DatabaseError::NotFound {
                entity_type: "job".into(),
                id: job_id.into(),
            },
            other => DatabaseError::from(other),
        })?;
    ref_from_columns(location, mode)
}

/// Soft delete: the row survives for audit, the job disappears from listings.
pub fn delete_job(conn: &Connection, job_id: &str) -> Result<(), DatabaseError> {
    update_job(
        conn,
        job_id,
        "UPDATE jobs SET status = ?2 WHERE job_id = ?1",
        params![job_id, JobStatus::Deleted.as_str()],
    )
}

pub fn delete_job_hard(conn: &Connection, job_id: &str) -> Result<(), DatabaseError> {
    let affected = conn.execute("DELETE FROM jobs WHERE job_id = ?1", params![job_id])?;
    if affected == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "job".into(),
            id: job_id.into(),
        });
    }
    Ok(())
}

pub fn mark_last_email_batch(
    conn: &Connection,
    job_id: &str,
    batch_id: &str,
    created_at: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    update_job(
        conn,
        job_id,
        "UPDATE jobs SET last_email_batch_id = ?2, last_email_batch_created_at = ?3 \
         WHERE job_id = ?1",
        params![job_id, batch_id, created_at.to_rfc3339()],
    )
}

fn update_job(
    conn: &Connection,
    job_id: &str,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<(), DatabaseError> {
    let affected = conn.execute(sql, params)?;
    if affected == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "job".into(),
            id: job_id.into(),
        });
    }
    Ok(())
}

fn job_from_row(row: &Row) -> Result<Result<Job, DatabaseError>, rusqlite::Error> {
    let status_raw: String = row.get(4)?;
    let created_at: String = row.get(20)?;
    let last_batch_at: Option<String> = row.get(19)?;

    Ok(build_job(
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        status_raw,
        [
            (row.get(5)?, row.get(6)?),
            (row.get(7)?, row.get(8)?),
            (row.get(9)?, row.get(10)?),
            (row.get(11)?, row.get(12)?),
            (row.get(13)?, row.get(14)?),
            (row.get(15)?, row.get(16)?),
        ],
        row.get(17)?,
        row.get(18)?,
        last_batch_at,
        created_at,
    ))
}

#[allow(clippy::too_many_arguments)]
fn build_job(
    job_id: String,
    owner_id: String,
    name: String,
    notes: Option<String>,
    status_raw: String,
    refs: [(Option<String>, Option<String>); 6],
    current_mapped_contacts_ref: Option<String>,
    last_email_batch_id: Option<String>,
    last_batch_at: Option<String>,
    created_at: String,
) -> Result<Job, DatabaseError> {
    let status: JobStatus = status_raw.parse()?;
    let [pdf, images, prompt, csvs, jsons, schema] = refs;
    Ok(Job {
        job_id,
        owner_id,
        name,
        notes,
        status,
        pdf_ref: ref_from_columns(pdf.0, pdf.1)?,
        images_ref: ref_from_columns(images.0, images.1)?,
        prompt_ref: ref_from_columns(prompt.0, prompt.1)?,
        csvs_ref: ref_from_columns(csvs.0, csvs.1)?,
        jsons_ref: ref_from_columns(jsons.0, jsons.1)?,
        schema_ref: ref_from_columns(schema.0, schema.1)?,
        current_mapped_contacts_ref,
        last_email_batch_id,
        last_email_batch_created_at: last_batch_at.map(|s| parse_timestamp(&s)),
        created_at: parse_timestamp(&created_at),
    })
}

fn ref_from_columns(
    location: Option<String>,
    mode: Option<String>,
) -> Result<Option<StorageRef>, DatabaseError> {
    match location {
        None => Ok(None),
        Some(location) => {
            let mode = match mode.as_deref() {
                None | Some("local") => StorageMode::Local,
                Some("s3") => StorageMode::S3,
                Some(other) => {
                    return Err(DatabaseError::InvalidEnum {
                        field: "storage_mode".into(),
                        value: other.into(),
                    })
                }
            };
            Ok(Some(StorageRef { location, mode }))
        }
    }
}
