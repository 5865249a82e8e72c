use std::collections::{HashMap, HashSet};

use rusqlite::{params, params_from_iter, Connection};

use crate::db::DatabaseError;
use crate::models::Contact;

/// SQLite's default variable limit is 999; stay under it when chunking
/// IN-clause lookups.
const PARAM_LIMIT: usize = 900;

pub fn insert_contact(conn: &Connection, contact: &Contact) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO contacts (id, name, email, phone, service_area)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            contact.id,
            contact.name,
            contact.email,
            contact.phone,
            contact.service_area,
        ],
    )?;
    Ok(())
}

pub fn assign_trade(conn: &Connection, contact_id: &str, trade: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO contact_trades (contact_id, trade) VALUES (?1, ?2)",
        params![contact_id, trade],
    )?;
    Ok(())
}

/// Contact ids serving a trade, matched case-insensitively, in stable id
/// order. `limit` caps the result for fan-out control.
pub fn find_ids_by_trade(
    conn: &Connection,
    trade: &str,
    limit: Option<usize>,
) -> Result<Vec<String>, DatabaseError> {
    let sql = match limit {
        Some(_) => {
            "SELECT contact_id FROM contact_trades
             WHERE LOWER(trade) = LOWER(?1) ORDER BY contact_id LIMIT ?2"
        }
        None => {
            "SELECT contact_id FROM contact_trades
             WHERE LOWER(trade) = LOWER(?1) ORDER BY contact_id"
        }
    };
    let mut stmt = conn.prepare(sql)?;
    let mut ids = Vec::new();
    match limit {
        Some(n) => {
            let rows = stmt.query_map(params![trade, n as i64], |row| row.get(0))?;
            for row in rows {
                ids.push(row?);
            }
        }
        None => {
            let rows = stmt.query_map(params![trade], |row| row.get(0))?;
            for row in rows {
                ids.push(row?);
            }
        }
    }
    Ok(ids)
}

/// Resolve contacts by id, preserving the input order and silently dropping
/// ids that no longer exist. Input is deduplicated; lookups run in chunks to
/// respect the SQLite parameter limit.
pub fn get_contacts_by_ids(
    conn: &Connection,
    ids: &[String],
) -> Result<Vec<Contact>, DatabaseError> {
    let mut seen = HashSet::new();
    let unique: Vec<&String> = ids.iter().filter(|id| seen.insert(id.as_str())).collect();
    if unique.is_empty() {
        return Ok(Vec::new());
    }

    let mut by_id: HashMap<String, Contact> = HashMap::new();
    for chunk in unique.chunks(PARAM_LIMIT) {
        let placeholders = (1..=chunk.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT id, name, email, phone, service_area FROM contacts WHERE id IN ({placeholders})"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
            Ok(Contact {
                id: row.get(0)?,
                name: row.get(1)?,
                email: row.get(2)?,
                phone: row.get(3)?,
                service_area: row.get(4)?,
            })
        })?;
        for row in rows {
            let contact = row?;
            by_id.insert(contact.id.clone(), contact);
        }
    }

    Ok(unique
        .into_iter()
        .filter_map(|id| by_id.remove(id.as_str()))
        .collect())
}
