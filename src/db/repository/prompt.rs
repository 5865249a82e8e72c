use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use crate::db::repository::parse_timestamp;
use crate::db::DatabaseError;

/// A stored extraction prompt. The pipeline falls back to the built-in
/// prompt when no stored prompt is active.
#[derive(Debug, Clone)]
pub struct PromptRecord {
    pub id: String,
    pub name: String,
    pub content: String,
    pub version: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Store a new prompt, versioned per name. Creation does not activate it.
pub fn create_prompt(conn: &Connection, name: &str, content: &str) -> Result<String, DatabaseError> {
    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) + 1 FROM prompts WHERE name = ?1",
        params![name],
        |row| row.get(0),
    )?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO prompts (id, name, content, version, is_active, created_at)
         VALUES (?1, ?2, ?3, ?4, 0, ?5)",
        params![id, name, content, version, Utc::now().to_rfc3339()],
    )?;
    Ok(id)
}

/// Activate a prompt, deactivating all others. At most one prompt is active.
pub fn set_active_prompt(conn: &Connection, id: &str) -> Result<(), DatabaseError> {
    conn.execute("UPDATE prompts SET is_active = 0 WHERE is_active = 1", [])?;
    let affected = conn.execute(
        "UPDATE prompts SET is_active = 1 WHERE id = ?1",
        params![id],
    )?;
    if affected == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "prompt".into(),
            id: id.into(),
        });
    }
    Ok(())
}

pub fn get_active_prompt(conn: &Connection) -> Result<Option<PromptRecord>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, content, version, is_active, created_at
         FROM prompts WHERE is_active = 1 LIMIT 1",
    )?;
    match stmt.query_row([], prompt_from_row) {
        Ok(record) => Ok(Some(record)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_prompt(conn: &Connection, id: &str) -> Result<PromptRecord, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, content, version, is_active, created_at
         FROM prompts WHERE id = ?1",
    )?;
    match stmt.query_row(params![id], prompt_from_row) {
        Ok(record) => Ok(record),
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(DatabaseError::NotFound {
            entity_type: "prompt".into(),
            id: id.into(),
        }),
        Err(e) => Err(e.into()),
    }
}

fn prompt_from_row(row: &Row) -> Result<PromptRecord, rusqlite::Error> {
    let created_at: String = row.get(5)?;
    Ok(PromptRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        content: row.get(2)?,
        version: row.get(3)?,
        is_active: row.get::<_, i64>(4)? != 0,
        created_at: parse_timestamp(&created_at),
    })
}
