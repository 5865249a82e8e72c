//! Document pipeline: PDF pages in, normalized contact map and email drafts
//! out. Each stage module exposes one entry function; `driver` chains them
//! and advances the job status after every successful artifact write.

pub mod combine;
pub mod contacts;
pub mod driver;
pub mod editor;
pub mod emails;
pub mod extract;
pub mod normalize;
pub mod prompt;
pub mod rasterize;
pub mod schema;
pub mod vision;

use thiserror::Error;

use crate::db::DatabaseError;
use crate::storage::StorageError;
use vision::VisionError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Vision(#[from] VisionError),

    #[error("Page range {start}..={end} invalid for document with {page_count} pages")]
    Range {
        start: usize,
        end: usize,
        page_count: usize,
    },

    #[error("Failed to render page {page}: {reason}")]
    Render { page: usize, reason: String },

    #[error("PDF is password-protected")]
    PdfEncrypted,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid alias schema: {0}")]
    Schema(String),
}
