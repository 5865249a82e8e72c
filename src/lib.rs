//! PlanScout: construction-plan document processing.
//!
//! Takes an uploaded plan set (PDF), renders its pages, extracts the trade
//! table with a vision model, normalizes trades against an alias schema,
//! attaches matching contractor contacts, and drafts outreach emails. Jobs,
//! contacts, prompts and email drafts live in SQLite; page images, CSVs and
//! contact-map snapshots live in a per-job file store.

pub mod config;
pub mod db;
pub mod models;
pub mod pipeline;
pub mod storage;

use tracing_subscriber::EnvFilter;

/// Initialize tracing; safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();
}
