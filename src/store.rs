use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::domain::GeoSeriesAccession;
use crate::error::KiraError;

/// Shared download cache for remote series-matrix files.
#[derive(Debug, Clone)]
pub struct Store {
    cache_root: Utf8PathBuf,
}

impl Store {
    pub fn new() -> Result<Self, KiraError> {
        let cache_root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(
                    dirs.home_dir().join(".cache").join("kira-expression-set"),
                )
                .ok()
            })
            .ok_or_else(|| {
                KiraError::Filesystem("unable to resolve cache directory".to_string())
            })?;
        Ok(Self { cache_root })
    }

    pub fn new_with_root(cache_root: Utf8PathBuf) -> Self {
        Self { cache_root }
    }

    pub fn cache_root(&self) -> &Utf8Path {
        &self.cache_root
    }

    pub fn cache_geo_dir(&self, accession: &GeoSeriesAccession) -> Utf8PathBuf {
        self.cache_root.join("geo").join(accession.as_str())
    }

    pub fn cache_geo_path(&self, accession: &GeoSeriesAccession, file_name: &str) -> Utf8PathBuf {
        self.cache_geo_dir(accession).join(file_name)
    }

    pub fn cache_metadata_path(&self, dataset_type: &str, id: &str) -> Utf8PathBuf {
        self.cache_root
            .join("metadata")
            .join(dataset_type)
            .join(format!("{id}.json"))
    }

    pub fn ensure_cache_root(&self) -> Result<(), KiraError> {
        fs::create_dir_all(self.cache_root.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))
    }

    pub fn cache_exists(&self, path: &Utf8Path) -> bool {
        path.as_std_path().exists()
    }

    pub fn write_metadata(path: &Utf8Path, metadata: &Metadata) -> Result<(), KiraError> {
        let content = serde_json::to_vec_pretty(metadata)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        Self::write_bytes_atomic(path, &content)
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), KiraError> {
        let parent = path
            .parent()
            .ok_or_else(|| KiraError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let mut temp = tempfile::Builder::new()
            .prefix("kira-es-file")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        temp.write_all(content)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        Ok(())
    }

    /// Run `fill` against a temporary file next to `dest`, then move it into
    /// place. A failed fill leaves `dest` untouched.
    pub fn fill_file_atomic<F>(dest: &Utf8Path, fill: F) -> Result<(), KiraError>
    where
        F: FnOnce(&Path) -> Result<(), KiraError>,
    {
        let parent = dest
            .parent()
            .ok_or_else(|| KiraError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let temp = tempfile::Builder::new()
            .prefix("kira-es-download")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        fill(temp.path())?;
        temp.persist(dest.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn list_metadata(root: &Utf8Path) -> Result<Vec<Metadata>, KiraError> {
        let metadata_root = root.join("metadata");
        if !metadata_root.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for path in walk_dir(metadata_root.as_std_path())? {
            if path.is_file() && path.extension().map(|ext| ext == "json").unwrap_or(false) {
                let content = fs::read_to_string(&path)
                    .map_err(|err| KiraError::Filesystem(err.to_string()))?;
                let metadata: Metadata = serde_json::from_str(&content)
                    .map_err(|err| KiraError::Filesystem(err.to_string()))?;
                entries.push(metadata);
            }
        }
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(entries)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub source: String,
    pub dataset_type: String,
    pub id: String,
    pub accession: String,
    pub downloaded_at: String,
    pub tool: String,
    pub resolved_path: String,
}

fn walk_dir(root: &Path) -> Result<Vec<PathBuf>, KiraError> {
    let mut items = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries = fs::read_dir(&path).map_err(|err| KiraError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| KiraError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path.clone());
            }
            items.push(path);
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, Store) {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().join("cache")).unwrap();
        (temp, Store::new_with_root(root))
    }

    #[test]
    fn layout_paths() {
        let (_temp, store) = temp_store();
        let acc: GeoSeriesAccession = "GSE2553".parse().unwrap();
        let path = store.cache_geo_path(&acc, "GSE2553_series_matrix.txt.gz");
        assert!(path.ends_with("geo/GSE2553/GSE2553_series_matrix.txt.gz"));
        let meta = store.cache_metadata_path("series_matrix", "GSE2553_series_matrix.txt.gz");
        assert!(meta.to_string().contains("metadata/series_matrix/"));
    }

    #[test]
    fn metadata_round_trip_through_listing() {
        let (_temp, store) = temp_store();
        let meta = Metadata {
            source: "geo".into(),
            dataset_type: "series_matrix".into(),
            id: "GSE1_series_matrix.txt.gz".into(),
            accession: "GSE1".into(),
            downloaded_at: "2026-01-01T00:00:00+00:00".into(),
            tool: "kira-es".into(),
            resolved_path: "/tmp/x".into(),
        };
        Store::write_metadata(&store.cache_metadata_path("series_matrix", &meta.id), &meta)
            .unwrap();
        let listed = Store::list_metadata(store.cache_root()).unwrap();
        assert_eq!(listed, vec![meta]);
    }

    #[test]
    fn failed_fill_leaves_destination_absent() {
        let (_temp, store) = temp_store();
        let dest = store.cache_root().join("geo/file.gz");
        let result = Store::fill_file_atomic(&dest, |_| Err(KiraError::GeoHttp("boom".into())));
        assert!(result.is_err());
        assert!(!store.cache_exists(&dest));

        Store::fill_file_atomic(&dest, |path| {
            fs::write(path, b"ok").map_err(|err| KiraError::Filesystem(err.to_string()))
        })
        .unwrap();
        assert!(store.cache_exists(&dest));
    }
}
