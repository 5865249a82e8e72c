//! Extraction prompt selection: the active prompt from the prompt library,
//! or the compiled-in default when none is active.

use rusqlite::Connection;
use tracing::debug;

use super::PipelineError;
use crate::db::repository::prompt::get_active_prompt;
use crate::storage::StorageRef;

pub const DEFAULT_EXTRACTION_PROMPT: &str = include_str!("../../resources/extraction_prompt.txt");

/// Ref recorded on the job when the built-in prompt was used.
pub const BUILTIN_PROMPT_REF: &str = "builtin:extraction_prompt@v1";

/// Resolve the prompt text to run and the ref to record on the job.
pub fn active_prompt(conn: &Connection) -> Result<(String, StorageRef), PipelineError> {
    match get_active_prompt(conn)? {
        Some(record) => {
            debug!(prompt_id = %record.id, version = record.version, "Using library prompt");
            let prompt_ref = StorageRef::local(format!("db:prompts/{}@v{}", record.id, record.version));
            Ok((record.content, prompt_ref))
        }
        None => Ok((
            DEFAULT_EXTRACTION_PROMPT.to_string(),
            StorageRef::local(BUILTIN_PROMPT_REF),
        )),
    }
}
