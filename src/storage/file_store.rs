//! Local hierarchical file store, keyed by `(owner, job, category)`.
//!
//! Layout under the base directory:
//!
//! ```text
//! user_<owner>/job_<job>/pdfs/<name>.pdf
//! user_<owner>/job_<job>/images/page_<n>.png
//! user_<owner>/job_<job>/csvs/batch_<n>.csv
//! user_<owner>/job_<job>/json/{combined,normalized}.json
//! user_<owner>/job_<job>/json/latest_<uuid>.json          (snapshots)
//! user_<owner>/job_<job>/json/contacts_map_<ts>.json      (editor outputs)
//! ```
//!
//! Snapshot files are write-once: a new version is always a new file, and the
//! job row's pointer is what advances. That property is what makes the map
//! editor's base-ref comparison a valid optimistic version check.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use super::{StorageError, StorageMode, StorageRef};

pub struct FileStore {
    base_dir: PathBuf,
    mode: StorageMode,
}

impl FileStore {
    /// Open a local store rooted at `base_dir`, creating it if needed.
    pub fn local(base_dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self {
            base_dir,
            mode: StorageMode::Local,
        })
    }

    pub fn mode(&self) -> StorageMode {
        self.mode
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn ensure_local(&self) -> Result<(), StorageError> {
        match self.mode {
            StorageMode::Local => Ok(()),
            other => Err(StorageError::UnsupportedMode(other.as_str().to_string())),
        }
    }

    fn job_dir(&self, owner_id: &str, job_id: &str) -> PathBuf {
        self.base_dir
            .join(format!("user_{owner_id}"))
            .join(format!("job_{job_id}"))
    }

    fn relative_ref(&self, path: &Path) -> StorageRef {
        let rel = path
            .strip_prefix(&self.base_dir)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        StorageRef {
            location: rel,
            mode: self.mode,
        }
    }

    /// Resolve a ref back to a filesystem path under the base directory.
    pub fn resolve(&self, r: &StorageRef) -> PathBuf {
        self.base_dir.join(r.canonical_location())
    }

    /// Create the per-job directory skeleton; returns a ref to the job root.
    pub fn create_job_dirs(&self, owner_id: &str, job_id: &str) -> Result<StorageRef, StorageError> {
        self.ensure_local()?;
        let job = self.job_dir(owner_id, job_id);
        for category in ["pdfs", "images", "csvs", "json"] {
            std::fs::create_dir_all(job.join(category))?;
        }
        Ok(self.relative_ref(&job))
    }

    fn category_dir(
        &self,
        owner_id: &str,
        job_id: &str,
        category: &str,
    ) -> Result<StorageRef, StorageError> {
        self.ensure_local()?;
        let dir = self.job_dir(owner_id, job_id).join(category);
        std::fs::create_dir_all(&dir)?;
        Ok(self.relative_ref(&dir))
    }

    pub fn images_dir(&self, owner_id: &str, job_id: &str) -> Result<StorageRef, StorageError> {
        self.category_dir(owner_id, job_id, "images")
    }

    pub fn csvs_dir(&self, owner_id: &str, job_id: &str) -> Result<StorageRef, StorageError> {
        self.category_dir(owner_id, job_id, "csvs")
    }

    pub fn json_dir(&self, owner_id: &str, job_id: &str) -> Result<StorageRef, StorageError> {
        self.category_dir(owner_id, job_id, "json")
    }

    fn write_file(
        &self,
        owner_id: &str,
        job_id: &str,
        category: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<StorageRef, StorageError> {
        self.ensure_local()?;
        let dir = self.job_dir(owner_id, job_id).join(category);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(filename);
        std::fs::write(&path, bytes)?;
        debug!(path = %path.display(), size = bytes.len(), "Wrote artifact");
        Ok(self.relative_ref(&path))
    }

    pub fn save_pdf(
        &self,
        owner_id: &str,
        job_id: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<StorageRef, StorageError> {
        self.write_file(owner_id, job_id, "pdfs", filename, bytes)
    }

    pub fn save_image(
        &self,
        owner_id: &str,
        job_id: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<StorageRef, StorageError> {
        self.write_file(owner_id, job_id, "images", filename, bytes)
    }

    pub fn save_csv(
        &self,
        owner_id: &str,
        job_id: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<StorageRef, StorageError> {
        self.write_file(owner_id, job_id, "csvs", filename, bytes)
    }

    /// List page images in a directory, sorted numerically by page ordinal
    /// (`page_10.png` sorts after `page_9.png`, not lexicographically).
    pub fn list_page_images(&self, images_ref: &StorageRef) -> Result<Vec<String>, StorageError> {
        let mut files = self.list_with_extension(images_ref, "png")?;
        files.sort_by_key(|name| (page_ordinal(name).unwrap_or(u32::MAX), name.clone()));
        if files.is_empty() {
            return Err(StorageError::NotFound(format!(
                "no .png files in {}",
                images_ref.location
            )));
        }
        Ok(files)
    }

    /// List CSV files sorted by filename for deterministic processing order.
    pub fn list_csv_files(&self, csvs_ref: &StorageRef) -> Result<Vec<String>, StorageError> {
        let mut files = self.list_with_extension(csvs_ref, "csv")?;
        files.sort();
        if files.is_empty() {
            return Err(StorageError::NotFound(format!(
                "no .csv files in {}",
                csvs_ref.location
            )));
        }
        Ok(files)
    }

    fn list_with_extension(
        &self,
        dir_ref: &StorageRef,
        extension: &str,
    ) -> Result<Vec<String>, StorageError> {
        self.ensure_local()?;
        let dir = self.resolve(dir_ref);
        if !dir.is_dir() {
            return Err(StorageError::NotFound(format!(
                "directory {} does not exist",
                dir_ref.location
            )));
        }
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.to_lowercase().ends_with(&format!(".{extension}")) {
                files.push(name);
            }
        }
        Ok(files)
    }

    pub fn read_bytes(&self, r: &StorageRef) -> Result<Vec<u8>, StorageError> {
        self.ensure_local()?;
        let path = self.resolve(r);
        if !path.is_file() {
            return Err(StorageError::NotFound(r.location.clone()));
        }
        Ok(std::fs::read(path)?)
    }

    pub fn read_file_in(
        &self,
        dir_ref: &StorageRef,
        filename: &str,
    ) -> Result<Vec<u8>, StorageError> {
        self.ensure_local()?;
        let path = self.resolve(dir_ref).join(filename);
        if !path.is_file() {
            return Err(StorageError::NotFound(format!(
                "{}/{filename}",
                dir_ref.location
            )));
        }
        Ok(std::fs::read(path)?)
    }

    /// Load and deserialize a JSON artifact addressed by a file ref.
    pub fn read_json<T: DeserializeOwned>(&self, r: &StorageRef) -> Result<T, StorageError> {
        let bytes = self.read_bytes(r)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Load and deserialize `<dir>/<filename>`.
    pub fn read_json_in<T: DeserializeOwned>(
        &self,
        dir_ref: &StorageRef,
        filename: &str,
    ) -> Result<T, StorageError> {
        let bytes = self.read_file_in(dir_ref, filename)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Serialize `value` as pretty JSON into `<dir>/<filename>`; returns a file ref.
    pub fn write_json<T: Serialize>(
        &self,
        dir_ref: &StorageRef,
        filename: &str,
        value: &T,
    ) -> Result<StorageRef, StorageError> {
        self.ensure_local()?;
        let dir = self.resolve(dir_ref);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(filename);
        let bytes = serde_json::to_vec_pretty(value)?;
        std::fs::write(&path, bytes)?;
        Ok(self.relative_ref(&path))
    }

    /// Persist a new, uniquely named snapshot (`latest_<uuid>.json`) in `dir_ref`.
    ///
    /// Existing snapshots are never overwritten.
    pub fn save_snapshot<T: Serialize>(
        &self,
        dir_ref: &StorageRef,
        value: &T,
    ) -> Result<StorageRef, StorageError> {
        let filename = format!("latest_{}.json", Uuid::new_v4().simple());
        self.write_json(dir_ref, &filename, value)
    }

    /// Persist a named JSON document in the job's `json/` directory.
    pub fn save_json_as<T: Serialize>(
        &self,
        owner_id: &str,
        job_id: &str,
        filename: &str,
        value: &T,
    ) -> Result<StorageRef, StorageError> {
        let dir_ref = self.json_dir(owner_id, job_id)?;
        self.write_json(&dir_ref, filename, value)
    }
}

/// Extract the 1-based page ordinal from a `page_<n>.png` filename.
pub fn page_ordinal(filename: &str) -> Option<u32> {
    filename
        .strip_prefix("page_")?
        .strip_suffix(".png")?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::local(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn page_ordinal_parses_only_page_pngs() {
        assert_eq!(page_ordinal("page_7.png"), Some(7));
        assert_eq!(page_ordinal("page_10.png"), Some(10));
        assert_eq!(page_ordinal("batch_1.csv"), None);
        assert_eq!(page_ordinal("page_x.png"), None);
    }

    #[test]
    fn page_images_sort_numerically_not_lexicographically() {
        let (_dir, store) = store();
        for n in [9, 10, 1, 2] {
            store
                .save_image("u1", "j1", &format!("page_{n}.png"), b"png")
                .unwrap();
        }
        let images_ref = store.images_dir("u1", "j1").unwrap();
        let files = store.list_page_images(&images_ref).unwrap();
        assert_eq!(files, ["page_1.png", "page_2.png", "page_9.png", "page_10.png"]);
    }

    #[test]
    fn empty_image_dir_is_not_found() {
        let (_dir, store) = store();
        let images_ref = store.images_dir("u1", "j1").unwrap();
        let err = store.list_page_images(&images_ref).unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[test]
    fn csv_files_sort_by_name() {
        let (_dir, store) = store();
        store.save_csv("u1", "j1", "batch_2.csv", b"b").unwrap();
        store.save_csv("u1", "j1", "batch_1.csv", b"a").unwrap();
        let csvs_ref = store.csvs_dir("u1", "j1").unwrap();
        assert_eq!(
            store.list_csv_files(&csvs_ref).unwrap(),
            ["batch_1.csv", "batch_2.csv"]
        );
    }

    #[test]
    fn refs_are_relative_with_forward_slashes() {
        let (_dir, store) = store();
        let r = store.save_pdf("u1", "j1", "plan.pdf", b"%PDF").unwrap();
        assert_eq!(r.location, "user_u1/job_j1/pdfs/plan.pdf");
        assert_eq!(r.mode, StorageMode::Local);
    }

    #[test]
    fn json_round_trip_through_dir_ref() {
        let (_dir, store) = store();
        let json_ref = store.json_dir("u1", "j1").unwrap();
        let value = serde_json::json!({"Electrical": [{"note": "x", "pages": ["1"]}]});
        let file_ref = store.write_json(&json_ref, "combined.json", &value).unwrap();
        assert_eq!(file_ref.location, "user_u1/job_j1/json/combined.json");

        let loaded: serde_json::Value = store.read_json_in(&json_ref, "combined.json").unwrap();
        assert_eq!(loaded, value);
    }

    #[test]
    fn snapshots_get_unique_names() {
        let (_dir, store) = store();
        let json_ref = store.json_dir("u1", "j1").unwrap();
        let a = store.save_snapshot(&json_ref, &serde_json::json!({})).unwrap();
        let b = store.save_snapshot(&json_ref, &serde_json::json!({})).unwrap();
        assert_ne!(a.location, b.location);
        assert!(a.location.contains("/json/latest_"));
    }

    #[test]
    fn missing_file_read_is_not_found() {
        let (_dir, store) = store();
        let json_ref = store.json_dir("u1", "j1").unwrap();
        let err = store
            .read_json_in::<serde_json::Value>(&json_ref, "combined.json")
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }
}
