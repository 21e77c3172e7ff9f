//! Artifact persistence for fitted models
//!
//! One JSON file per saved model under the store directory, named
//! `{model_id}_{YYYYMMDD_HHMMSS}.json`. The directory is append-only;
//! filenames are unique by id plus timestamp, with a numeric suffix when a
//! second save lands within the same second.

use crate::error::{MlError, Result};
use crate::models::Estimator;
use crate::params::ParamMap;
use chrono::Local;
use serde_json::json;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone)]
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .map_err(|e| MlError::Persistence(format!("cannot create model directory: {e}")))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist a fitted model; returns the artifact filename.
    pub fn save(
        &self,
        model_id: &str,
        params: &ParamMap,
        model: &dyn Estimator,
    ) -> Result<String> {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let mut filename = format!("{model_id}_{stamp}.json");
        let mut suffix = 1u32;
        while self.dir.join(&filename).exists() {
            filename = format!("{model_id}_{stamp}_{suffix}.json");
            suffix += 1;
        }

        let body = json!({
            "model_id": model_id,
            "saved_at": Local::now().to_rfc3339(),
            "params": params,
            "model": model.artifact()?,
        });

        let path = self.dir.join(&filename);
        let file = File::create(&path)
            .map_err(|e| MlError::Persistence(format!("cannot create {filename}: {e}")))?;
        serde_json::to_writer(BufWriter::new(file), &body)
            .map_err(|e| MlError::Persistence(format!("cannot write {filename}: {e}")))?;
        info!(model = model_id, %filename, "model artifact saved");
        Ok(filename)
    }

    /// Load a previously saved artifact by filename. The name must be a bare
    /// filename; path separators and parent references are rejected.
    pub fn open(&self, filename: &str) -> Result<serde_json::Value> {
        if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
            return Err(MlError::Persistence(format!(
                "invalid model filename: {filename}"
            )));
        }
        let path = self.dir.join(filename);
        if !path.is_file() {
            return Err(MlError::Persistence(format!(
                "model file not found: {filename}"
            )));
        }
        let file = File::open(&path)
            .map_err(|e| MlError::Persistence(format!("cannot open {filename}: {e}")))?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| MlError::Persistence(format!("cannot parse {filename}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::lookup;
    use ndarray::{array, Array1, Array2};

    fn fitted_model() -> (Box<dyn crate::models::Estimator>, ParamMap) {
        let family = lookup("nb").unwrap();
        let mut model = family.construct(&ParamMap::new()).unwrap();
        let x: Array2<f64> = array![[0.0], [0.1], [5.0], [5.1]];
        let y: Array1<f64> = array![0.0, 0.0, 1.0, 1.0];
        model.fit(&x, &y).unwrap();
        let params = model.params();
        (model, params)
    }

    #[test]
    fn test_save_and_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ModelStore::new(tmp.path()).unwrap();
        let (model, params) = fitted_model();

        let filename = store.save("nb", &params, model.as_ref()).unwrap();
        assert!(filename.starts_with("nb_"));
        assert!(filename.ends_with(".json"));

        let body = store.open(&filename).unwrap();
        assert_eq!(body["model_id"], "nb");
        assert!(body["model"].is_object());
        assert!(body["params"].is_object());
    }

    #[test]
    fn test_duplicate_timestamps_get_suffixed() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ModelStore::new(tmp.path()).unwrap();
        let (model, params) = fitted_model();

        let first = store.save("nb", &params, model.as_ref()).unwrap();
        let second = store.save("nb", &params, model.as_ref()).unwrap();
        assert_ne!(first, second);
        assert!(store.open(&second).is_ok());
    }

    #[test]
    fn test_path_traversal_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ModelStore::new(tmp.path()).unwrap();
        for name in ["../etc/passwd", "a/b.json", "..\\secret", ".."] {
            assert!(matches!(
                store.open(name),
                Err(MlError::Persistence(_))
            ));
        }
    }

    #[test]
    fn test_missing_file_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ModelStore::new(tmp.path()).unwrap();
        assert!(store.open("nb_19700101_000000.json").is_err());
    }
}
