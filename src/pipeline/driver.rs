//! Full pipeline run for one uploaded plan set.
//!
//! Stage order: save PDF → rasterize → vision extraction → combine →
//! normalize → contact mapping. The job's status row advances only after
//! the stage's artifact is on disk, so a crash resumes from a consistent
//! state and the status always understates, never overstates, progress.

use rusqlite::Connection;
use tracing::{info, instrument};

use super::combine::combine;
use super::contacts::{map_contacts, ContactDirectory};
use super::extract::extract;
use super::normalize::normalize;
use super::prompt::active_prompt;
use super::rasterize::{rasterize, PageRenderer, DEFAULT_RENDER_DPI};
use super::schema::AliasSchema;
use super::vision::VisionClient;
use super::PipelineError;
use crate::db::repository::job;
use crate::storage::{FileStore, StorageRef};

/// Tunables for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Pages per vision call.
    pub batch_size: usize,
    pub dpi: u32,
    /// 1-based inclusive page range; `None` processes the whole document.
    pub page_range: Option<(usize, usize)>,
    /// Cap on directory contacts attached per trade.
    pub limit_per_trade: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            dpi: DEFAULT_RENDER_DPI,
            page_range: None,
            limit_per_trade: None,
        }
    }
}

/// Summary of a completed run.
#[derive(Debug)]
pub struct PipelineRun {
    pub job_id: String,
    pub images_ref: StorageRef,
    pub mapped_ref: StorageRef,
    /// Batch ordinals that produced a CSV.
    pub batches_written: Vec<usize>,
    /// Batch ordinals lost to vision failures.
    pub batches_skipped: Vec<usize>,
}

/// Run every stage for a freshly uploaded PDF.
#[instrument(skip_all, fields(job_id))]
#[allow(clippy::too_many_arguments)]
pub fn run_pipeline(
    conn: &Connection,
    store: &FileStore,
    renderer: &dyn PageRenderer,
    vision: &dyn VisionClient,
    directory: &dyn ContactDirectory,
    job_id: &str,
    pdf_filename: &str,
    pdf_bytes: &[u8],
    schema: &AliasSchema,
    schema_ref: &StorageRef,
    config: &PipelineConfig,
) -> Result<PipelineRun, PipelineError> {
    let owner_id = job::get_owner_id(conn, job_id)?;

    let pdf_ref = store.save_pdf(&owner_id, job_id, pdf_filename, pdf_bytes)?;
    job::update_status_pdf_saved(conn, job_id, &pdf_ref)?;

    let images_ref = rasterize(
        store,
        renderer,
        &owner_id,
        job_id,
        &pdf_ref,
        config.page_range,
        config.dpi,
    )?;
    job::update_status_images_extracted(conn, job_id, &images_ref)?;

    let (prompt, prompt_ref) = active_prompt(conn)?;
    let outcome = extract(
        store,
        vision,
        &owner_id,
        job_id,
        &images_ref,
        &prompt,
        config.batch_size,
    )?;
    job::update_status_llm_run(conn, job_id, &outcome.csvs_ref, &prompt_ref)?;

    let json_dir = combine(store, &owner_id, job_id, &outcome.csvs_ref)?;
    job::update_status_csvs_combined(conn, job_id)?;

    normalize(store, &owner_id, job_id, &json_dir, schema)?;
    job::update_status_json_normalized(conn, job_id, &json_dir, schema_ref)?;

    let mapped_ref = map_contacts(
        store,
        directory,
        &owner_id,
        job_id,
        &json_dir,
        config.limit_per_trade,
    )?;
    job::update_status_contacts_map(conn, job_id, &mapped_ref.location)?;

    info!(job_id, mapped_ref = %mapped_ref.location, "Pipeline run complete");
    Ok(PipelineRun {
        job_id: job_id.to_string(),
        images_ref,
        mapped_ref,
        batches_written: outcome.written,
        batches_skipped: outcome.skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::job::{get_job, insert_new_job};
    use crate::db::sqlite::open_memory_database;
    use crate::models::{Contact, JobStatus, TradeMap};
    use crate::pipeline::contacts::InMemoryContactDirectory;
    use crate::pipeline::rasterize::MockPageRenderer;
    use crate::pipeline::vision::MockVisionClient;

    fn schema() -> AliasSchema {
        AliasSchema::parse(
            r#"{
                "schema_version": "1",
                "trades": [{"name": "Plumbing", "aliases": ["Water Lines"]}]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn full_run_reaches_contact_map_set() {
        let conn = open_memory_database().unwrap();
        let job_id = insert_new_job(&conn, "u1", "Riverside plans", None).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::local(dir.path()).unwrap();

        let renderer = MockPageRenderer::new(3);
        let vision = MockVisionClient::new(
            "Trade,Pages,Note\nWater Lines,\"1, 2\",supply piping\nRoofing,3,membrane",
        );
        let mut directory = InMemoryContactDirectory::new();
        directory.add(
            Contact {
                id: "c1".into(),
                name: Some("Ada".into()),
                email: Some("ada@x.test".into()),
                phone: None,
                service_area: None,
            },
            &["Plumbing"],
        );

        let run = run_pipeline(
            &conn,
            &store,
            &renderer,
            &vision,
            &directory,
            &job_id,
            "plan.pdf",
            b"%PDF",
            &schema(),
            &StorageRef::local("schemas/riverside@v3"),
            &PipelineConfig::default(),
        )
        .unwrap();

        assert_eq!(run.batches_written, vec![1]);
        assert!(run.batches_skipped.is_empty());

        let job = get_job(&conn, &job_id).unwrap();
        assert_eq!(job.status, JobStatus::ContactMapSet);
        assert!(job.pdf_ref.is_some());
        assert!(job.images_ref.is_some());
        assert!(job.csvs_ref.is_some());
        // provenance records the schema the run actually used
        assert_eq!(
            job.schema_ref.as_ref().map(|r| r.location.as_str()),
            Some("schemas/riverside@v3")
        );
        assert_eq!(
            job.current_mapped_contacts_ref.as_deref(),
            Some(run.mapped_ref.location.as_str())
        );

        let mapped: TradeMap = store.read_json(&run.mapped_ref).unwrap();
        assert_eq!(mapped.entries("Plumbing").unwrap()[0].contacts, vec!["c1"]);
        // unmatched trade landed in the undefined bucket
        assert_eq!(
            mapped.entries("undefined").unwrap()[0].original_name.as_deref(),
            Some("Roofing")
        );
        assert_eq!(
            mapped.metadata.unwrap().processing_steps,
            vec!["normalized", "contacts_mapped"]
        );
    }

    #[test]
    fn page_range_failure_stops_before_any_status_change_past_pdf() {
        let conn = open_memory_database().unwrap();
        let job_id = insert_new_job(&conn, "u1", "j", None).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::local(dir.path()).unwrap();

        let renderer = MockPageRenderer::new(2);
        let vision = MockVisionClient::new("");
        let directory = InMemoryContactDirectory::new();
        let config = PipelineConfig {
            page_range: Some((1, 9)),
            ..PipelineConfig::default()
        };

        let err = run_pipeline(
            &conn,
            &store,
            &renderer,
            &vision,
            &directory,
            &job_id,
            "plan.pdf",
            b"%PDF",
            &schema(),
            &StorageRef::local(crate::pipeline::schema::BUILTIN_SCHEMA_REF),
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Range { page_count: 2, .. }));

        let job = get_job(&conn, &job_id).unwrap();
        assert_eq!(job.status, JobStatus::PdfSaved);
        assert!(job.images_ref.is_none());
    }
}
