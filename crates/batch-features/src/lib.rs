//! Feature Extractor (FE): converts a stored training-data window into
//! a transposed feature-vector CSV and a small metadata file used by
//! the learner (spec.md §4.8).

use batch_common::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// The external feature library (tsfresh-equivalent) is specified only
/// by its call contract: a function from `(id, timestamp, value)` rows
/// to a wide set of named scalar features (spec.md §1, §4.8 step 3).
pub trait FeatureLibrary {
    fn extract(&self, rows: &[(String, i64, f64)]) -> Vec<(String, f64)>;
    fn version(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct FeatureExtractionResult {
    pub transposed_csv_path: PathBuf,
    pub ok: bool,
    pub fp_created: bool,
    pub fp_id: Option<i64>,
    pub fail_msg: Option<String>,
    pub calc_time_secs: f64,
}

fn base_directory(root: &Path, timestamp: i64, base_name: &str) -> PathBuf {
    root.join(timestamp.to_string()).join(base_name.replace('.', "/"))
}

/// Training JSON series are stored the way the Anomaly Router writes
/// its mirage pre-materialized window — a parenthesized list of
/// `(ts, val)` pairs (spec.md §4.5) — so reading it back means undoing
/// that substitution before a JSON parse, mirroring the original's
/// `str(...).replace('(','[').replace(')',']')` step.
fn parse_training_series(text: &str) -> Result<Vec<(i64, f64)>> {
    let bracketed = text.replace('(', "[").replace(')', "]");
    serde_json::from_str(&bracketed).map_err(|e| Error::Features(format!("unparseable training series: {e}")))
}

/// Idempotent pipeline: if the transposed feature CSV already exists,
/// return it immediately without recomputation (spec.md §4.8, §8).
pub fn extract_features(
    root: &Path,
    timestamp: i64,
    base_name: &str,
    feature_lib: &dyn FeatureLibrary,
    now_epoch: i64,
    full_duration_secs: i64,
) -> Result<FeatureExtractionResult> {
    let dir = base_directory(root, timestamp, base_name);
    let transposed_path = dir.join(format!("{base_name}.tsfresh.input.csv.features.transposed.csv"));
    let created_sentinel_path = dir.join(format!("{timestamp}.{base_name}.fp.created.txt"));
    let (fp_created, fp_id) = read_created_sentinel(&created_sentinel_path);

    if transposed_path.exists() {
        debug!(base_name, %timestamp, "transposed feature csv already present, skipping recomputation");
        return Ok(FeatureExtractionResult {
            transposed_csv_path: transposed_path,
            ok: true,
            fp_created,
            fp_id,
            fail_msg: None,
            calc_time_secs: 0.0,
        });
    }

    let start = std::time::Instant::now();
    let hours = (full_duration_secs / 3600).max(1);
    let input_json_path = dir.join(format!("{base_name}.mirage.redis.{hours}h.json"));
    let series_text = std::fs::read_to_string(&input_json_path).map_err(Error::Io)?;
    let series = parse_training_series(&series_text)?;

    let intermediate_csv_path = dir.join(format!("{base_name}.tsfresh.input.csv"));
    write_intermediate_csv(&intermediate_csv_path, base_name, &series)?;

    let rows: Vec<(String, i64, f64)> = series.iter().map(|(t, v)| (base_name.to_string(), *t, *v)).collect();
    let features = feature_lib.extract(&rows);

    write_transposed_csv(&transposed_path, &features)?;

    let features_count = features.len() as u64;
    let features_sum: f64 = features.iter().map(|(_, v)| v).sum();
    let calc_time_secs = start.elapsed().as_secs_f64();

    let details_path = dir.join(format!("{timestamp}.{base_name}.fp.details.txt"));
    std::fs::write(
        &details_path,
        format!(
            "[{now_epoch}, '{version}', {calc_time_secs}, {features_count}, {features_sum}]",
            version = feature_lib.version(),
        ),
    )
    .map_err(Error::Io)?;

    std::fs::remove_file(&intermediate_csv_path).map_err(Error::Io)?;

    info!(base_name, %timestamp, features_count, "feature extraction complete");
    Ok(FeatureExtractionResult {
        transposed_csv_path: transposed_path,
        ok: true,
        fp_created,
        fp_id,
        fail_msg: None,
        calc_time_secs,
    })
}

fn read_created_sentinel(path: &Path) -> (bool, Option<i64>) {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let trimmed = contents.trim().trim_start_matches('[').trim_end_matches(']');
            let fp_id = trimmed.split(',').next().and_then(|s| s.trim().parse().ok());
            (true, fp_id)
        }
        Err(_) => (false, None),
    }
}

fn write_intermediate_csv(path: &Path, metric: &str, series: &[(i64, f64)]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(Error::Io)?;
    }
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(path).map_err(|e| Error::Features(e.to_string()))?;
    for (ts, value) in series {
        writer
            .write_record([metric, &ts.to_string(), &value.to_string()])
            .map_err(|e| Error::Features(e.to_string()))?;
    }
    writer.flush().map_err(Error::Io)
}

fn write_transposed_csv(path: &Path, features: &[(String, f64)]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(Error::Io)?;
    }
    let mut writer = csv::WriterBuilder::new().from_path(path).map_err(|e| Error::Features(e.to_string()))?;
    writer.write_record(["feature_name", "value"]).map_err(|e| Error::Features(e.to_string()))?;
    for (name, value) in features {
        writer.write_record([name.as_str(), &value.to_string()]).map_err(|e| Error::Features(e.to_string()))?;
    }
    writer.flush().map_err(Error::Io)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    struct StubFeatureLibrary;
    impl FeatureLibrary for StubFeatureLibrary {
        fn extract(&self, rows: &[(String, i64, f64)]) -> Vec<(String, f64)> {
            vec![
                ("mean".to_string(), rows.iter().map(|(_, _, v)| v).sum::<f64>() / rows.len() as f64),
                ("count".to_string(), rows.len() as f64),
            ]
        }
        fn version(&self) -> &str {
            "stub-0.1"
        }
    }

    fn write_training_json(root: &Path, ts: i64, base: &str, series: &[(i64, f64)]) {
        let dir = base_directory(root, ts, base);
        std::fs::create_dir_all(&dir).unwrap();
        let body = series.iter().map(|(t, v)| format!("({t}, {v})")).collect::<Vec<_>>().join(", ");
        std::fs::write(dir.join(format!("{base}.mirage.redis.24h.json")), format!("({body})")).unwrap();
    }

    #[test]
    fn computes_features_and_cleans_up_intermediate_csv() {
        let dir = tempdir().unwrap();
        write_training_json(dir.path(), 280, "metrics.foo", &[(100, 1.0), (160, 2.0), (220, 3.0)]);
        let lib = StubFeatureLibrary;
        let result = extract_features(dir.path(), 280, "metrics.foo", &lib, 1_700_000_000, 86_400).unwrap();

        assert!(result.ok);
        assert!(result.transposed_csv_path.exists());
        let intermediate = base_directory(dir.path(), 280, "metrics.foo").join("metrics.foo.tsfresh.input.csv");
        assert!(!intermediate.exists());

        let contents = std::fs::read_to_string(&result.transposed_csv_path).unwrap();
        assert!(contents.contains("mean"));
        assert!(contents.contains("count"));
    }

    #[test]
    fn idempotent_when_transposed_csv_already_present() {
        let dir = tempdir().unwrap();
        write_training_json(dir.path(), 280, "metrics.foo", &[(100, 1.0), (160, 2.0)]);
        let lib = StubFeatureLibrary;
        let first = extract_features(dir.path(), 280, "metrics.foo", &lib, 1_700_000_000, 86_400).unwrap();
        assert!(first.calc_time_secs >= 0.0);

        std::fs::remove_file(base_directory(dir.path(), 280, "metrics.foo").join("metrics.foo.mirage.redis.24h.json")).unwrap();
        let second = extract_features(dir.path(), 280, "metrics.foo", &lib, 1_700_000_001, 86_400).unwrap();
        assert!(second.ok);
        assert_eq!(second.calc_time_secs, 0.0);
    }
}
