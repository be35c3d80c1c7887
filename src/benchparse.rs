// In: src/benchparse.rs

//! Parsing of pytest-benchmark JSON result files into grouped tabular form.
//!
//! Benchmark names arrive as `test_name[<params>]` where the parameter
//! segment is a Python literal repr, not JSON: single quotes, and on old
//! runs `u`-prefixed strings. `parse_benchmark_name` splits and normalizes
//! that segment so records can be grouped by parameter set and the segment
//! itself parsed as JSON downstream.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::MinibenchError;

/// Splits a qualified benchmark name into its test name and normalized
/// parameter string.
///
/// The parameter segment sits between the first `[` and the last `]`;
/// normalization rewrites single-quoted and `u`-prefixed reprs into valid
/// JSON. A name without a complete bracket pair comes back whole, with an
/// empty parameter string.
pub fn parse_benchmark_name(name: &str) -> (&str, String) {
    let (open, close) = match (name.find('['), name.rfind(']')) {
        (Some(open), Some(close)) if close > open => (open, close),
        _ => return (name, String::new()),
    };
    let raw = &name[open + 1..close];
    let normalized = raw.replace('\'', "\"").replace("u\"", "\"");
    (&name[..open], normalized)
}

/// One benchmark record: the qualified name plus whatever statistics the
/// run recorded. Stat names vary across pytest-benchmark versions, so they
/// stay dynamic.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct BenchmarkRecord {
    pub name: String,
    #[serde(default)]
    pub stats: BTreeMap<String, Value>,
}

/// A parsed pytest-benchmark result file.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct BenchmarkFile {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub commit_info: Value,
    pub benchmarks: Vec<BenchmarkRecord>,
}

impl BenchmarkFile {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, MinibenchError> {
        let text = std::fs::read_to_string(path)?;
        let file: BenchmarkFile = serde_json::from_str(&text)?;
        Ok(file)
    }

    /// Groups records by normalized parameter string: the tabular split.
    /// Each group holds `(test_name, stats)` rows; group keys iterate in
    /// sorted order.
    pub fn split_on_params(&self) -> BTreeMap<String, Vec<(&str, &BTreeMap<String, Value>)>> {
        let mut groups: BTreeMap<String, Vec<(&str, &BTreeMap<String, Value>)>> = BTreeMap::new();
        for record in &self.benchmarks {
            let (test, params) = parse_benchmark_name(&record.name);
            groups.entry(params).or_default().push((test, &record.stats));
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_splits_and_normalizes_quotes() {
        let (test, params) =
            parse_benchmark_name("test_touch_npy_load_random[{'shape': [64, 64], 'num_items': 100}]");
        assert_eq!(test, "test_touch_npy_load_random");
        assert_eq!(params, r#"{"shape": [64, 64], "num_items": 100}"#);

        // The normalized segment is real JSON.
        let value: Value = serde_json::from_str(&params).unwrap();
        assert_eq!(value["shape"][0], 64);
        assert_eq!(value["num_items"], 100);
    }

    #[test]
    fn test_parse_normalizes_u_prefixed_reprs() {
        let (test, params) = parse_benchmark_name("test_a[{u'shape': [8, 8]}]");
        assert_eq!(test, "test_a");
        assert_eq!(params, r#"{"shape": [8, 8]}"#);
        assert!(serde_json::from_str::<Value>(&params).is_ok());
    }

    #[test]
    fn test_parse_without_params_is_whole_name() {
        assert_eq!(parse_benchmark_name("test_plain"), ("test_plain", String::new()));
        assert_eq!(
            parse_benchmark_name("test_broken[{'shape': [4]}"),
            ("test_broken[{'shape': [4]}", String::new())
        );
        assert_eq!(parse_benchmark_name("]test_odd["), ("]test_odd[", String::new()));
    }

    #[test]
    fn test_load_and_split_groups_by_params() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        std::fs::write(
            &path,
            r#"{
                "version": "3.4.1",
                "commit_info": {"id": "abc123", "dirty": false},
                "benchmarks": [
                    {"name": "test_flat[{'shape': [64, 64]}]", "stats": {"mean": 0.5, "rounds": 10}},
                    {"name": "test_archive[{'shape': [64, 64]}]", "stats": {"mean": 0.9, "rounds": 10}},
                    {"name": "test_flat[{'shape': [128, 128]}]", "stats": {"mean": 1.5, "rounds": 5}}
                ]
            }"#,
        )
        .unwrap();

        let file = BenchmarkFile::load(&path).unwrap();
        assert_eq!(file.version, "3.4.1");
        assert_eq!(file.benchmarks.len(), 3);

        let groups = file.split_on_params();
        assert_eq!(groups.len(), 2);

        let small = &groups[r#"{"shape": [64, 64]}"#];
        assert_eq!(small.len(), 2);
        assert_eq!(small[0].0, "test_flat");
        assert_eq!(small[1].0, "test_archive");
        assert_eq!(small[0].1["mean"], 0.5);

        let large = &groups[r#"{"shape": [128, 128]}"#];
        assert_eq!(large.len(), 1);
    }

    #[test]
    fn test_missing_stats_default_to_empty() {
        let file: BenchmarkFile =
            serde_json::from_str(r#"{"benchmarks": [{"name": "test_bare"}]}"#).unwrap();
        assert!(file.benchmarks[0].stats.is_empty());
        assert_eq!(file.version, "");
        assert_eq!(file.commit_info, Value::Null);
    }
}
