use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use flate2::Compression;
use flate2::write::GzEncoder;

use kira_expression_set::domain::GeoSeriesAccession;
use kira_expression_set::error::KiraError;
use kira_expression_set::geo::{FetchSource, GeoClient, GeoFetcher, read_series_matrix};
use kira_expression_set::store::Store;

fn series_matrix(platform: &str, samples: &[&str]) -> String {
    let quoted = |values: Vec<String>| {
        values
            .iter()
            .map(|v| format!("\"{v}\""))
            .collect::<Vec<_>>()
            .join("\t")
    };
    let ids: Vec<String> = samples.iter().map(|s| s.to_string()).collect();
    let platforms: Vec<String> = samples.iter().map(|_| platform.to_string()).collect();
    let sexes: Vec<String> = samples
        .iter()
        .enumerate()
        .map(|(i, _)| if i % 2 == 0 { "Sex: female" } else { "Sex: male" }.to_string())
        .collect();
    let values: Vec<String> = (0..samples.len()).map(|i| format!("{}.5", i + 1)).collect();

    format!(
        "!Series_title\t\"Smoking and lung expression\"\n\
!Series_geo_accession\t\"GSE42\"\n\
!Series_summary\t\"First part.\"\n\
!Series_summary\t\"Second part.\"\n\
!Sample_geo_accession\t{}\n\
!Sample_platform_id\t{}\n\
!Sample_characteristics_ch1\t{}\n\
!series_matrix_table_begin\n\
\"ID_REF\"\t{}\n\
\"AFFX-1\"\t{}\n\
!series_matrix_table_end\n",
        quoted(ids.clone()),
        quoted(platforms),
        quoted(sexes),
        quoted(ids),
        values.join("\t"),
    )
}

fn write_gz(path: &Path, text: &str) {
    let file = File::create(path).unwrap();
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    encoder.finish().unwrap();
}

#[derive(Default)]
struct MockGeo {
    files: BTreeMap<String, String>,
    downloads: Mutex<Vec<String>>,
}

impl MockGeo {
    fn with_file(mut self, name: &str, text: String) -> Self {
        self.files.insert(name.to_string(), text);
        self
    }

    fn download_count(&self) -> usize {
        self.downloads.lock().unwrap().len()
    }
}

impl GeoClient for MockGeo {
    fn list_series_matrix_files(
        &self,
        _accession: &GeoSeriesAccession,
    ) -> Result<Vec<String>, KiraError> {
        Ok(self.files.keys().cloned().collect())
    }

    fn download_series_matrix(
        &self,
        _accession: &GeoSeriesAccession,
        file_name: &str,
        destination: &Path,
    ) -> Result<(), KiraError> {
        let text = self
            .files
            .get(file_name)
            .ok_or_else(|| KiraError::GeoStatus {
                status: 404,
                message: file_name.to_string(),
            })?;
        write_gz(destination, text);
        self.downloads.lock().unwrap().push(file_name.to_string());
        Ok(())
    }
}

fn temp_store() -> (tempfile::TempDir, Store) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, Store::new_with_root(root))
}

fn accession() -> GeoSeriesAccession {
    "GSE42".parse().unwrap()
}

#[test]
fn fetch_downloads_then_reuses_cache() {
    let (_temp, store) = temp_store();
    let geo = MockGeo::default().with_file(
        "GSE42_series_matrix.txt.gz",
        series_matrix("GPL570", &["GSM1", "GSM2", "GSM3"]),
    );
    let fetcher = GeoFetcher::new(&geo, store.clone());

    let first = fetcher.fetch(&accession(), false).unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].source, FetchSource::Download);
    assert_eq!(first[0].platform, "GPL570");
    assert!(first[0].path.ends_with("geo/GSE42/GSE42_series_matrix.txt.gz"));

    let dataset = &first[0].dataset;
    assert_eq!(dataset.n_samples(), 3);
    assert_eq!(dataset.feature_ids().unwrap(), &["AFFX-1".to_string()]);
    assert_eq!(
        dataset.samples_where("Sex", "female").unwrap(),
        vec!["GSM1".to_string(), "GSM3".to_string()]
    );
    assert_eq!(
        dataset.metadata().summary.as_deref(),
        Some("First part. Second part.")
    );

    let second = fetcher.fetch(&accession(), false).unwrap();
    assert_eq!(second[0].source, FetchSource::Cache);
    assert_eq!(second[0].dataset, first[0].dataset);
    assert_eq!(geo.download_count(), 1);

    let forced = fetcher.fetch(&accession(), true).unwrap();
    assert_eq!(forced[0].source, FetchSource::Download);
    assert_eq!(geo.download_count(), 2);

    let cached = Store::list_metadata(store.cache_root()).unwrap();
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].accession, "GSE42");
}

#[test]
fn multi_platform_series_keyed_by_platform() {
    let (_temp, store) = temp_store();
    let geo = MockGeo::default()
        .with_file(
            "GSE42-GPL96_series_matrix.txt.gz",
            series_matrix("GPL96", &["GSM1", "GSM2"]),
        )
        .with_file(
            "GSE42-GPL97_series_matrix.txt.gz",
            series_matrix("GPL97", &["GSM3"]),
        );
    let fetcher = GeoFetcher::new(geo, store);

    let datasets = fetcher.fetch_by_platform(&accession(), false).unwrap();
    let platforms: Vec<&str> = datasets.keys().map(String::as_str).collect();
    assert_eq!(platforms, vec!["GPL96", "GPL97"]);
    assert_eq!(datasets["GPL96"].n_samples(), 2);
    assert_eq!(datasets["GPL97"].sample_ids(), &["GSM3".to_string()]);
}

#[test]
fn empty_listing_is_an_error() {
    let (_temp, store) = temp_store();
    let fetcher = GeoFetcher::new(MockGeo::default(), store);
    let err = fetcher.fetch(&accession(), false).unwrap_err();
    assert_matches!(err, KiraError::GeoNoSeriesMatrix(ref acc) if acc == "GSE42");
}

#[test]
fn failed_download_leaves_no_cache_file() {
    struct Failing;

    impl GeoClient for Failing {
        fn list_series_matrix_files(
            &self,
            _accession: &GeoSeriesAccession,
        ) -> Result<Vec<String>, KiraError> {
            Ok(vec!["GSE42_series_matrix.txt.gz".to_string()])
        }

        fn download_series_matrix(
            &self,
            _accession: &GeoSeriesAccession,
            _file_name: &str,
            _destination: &Path,
        ) -> Result<(), KiraError> {
            Err(KiraError::GeoHttp("connection reset".to_string()))
        }
    }

    let (_temp, store) = temp_store();
    let fetcher = GeoFetcher::new(Failing, store.clone());
    let err = fetcher.fetch(&accession(), false).unwrap_err();
    assert_matches!(err, KiraError::GeoHttp(_));
    let path = store.cache_geo_path(&accession(), "GSE42_series_matrix.txt.gz");
    assert!(!store.cache_exists(&path));
}

#[test]
fn read_plain_series_matrix_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("GSE42_series_matrix.txt");
    std::fs::write(&path, series_matrix("GPL1", &["GSM9"])).unwrap();
    let matrix = read_series_matrix(&path).unwrap();
    assert_eq!(matrix.platform, "GPL1");
    assert_eq!(matrix.info.name.as_deref(), Some("GSE42"));
    assert_eq!(matrix.grid.row_labels, vec!["AFFX-1".to_string()]);
}
