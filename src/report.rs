use serde::Serialize;
use serde::ser::Serializer;

use crate::error::KiraError;
use crate::tree::{FileTree, file_name};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationReport {
    pub series: usize,
    pub avg_samples_per_series: f64,
    pub min_samples_per_series: usize,
    pub max_samples_per_series: usize,
    pub file_counts: LevelCounts,
    pub file_locations: Placement,
    pub file_types: TypeHistograms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LevelCounts {
    pub series_level: usize,
    pub sample_level: usize,
}

/// Fraction of series per placement bucket, rounded to two decimals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Placement {
    pub series_only: f64,
    pub sample_only: f64,
    pub both: f64,
    pub neither: f64,
}

impl Placement {
    pub fn total(&self) -> f64 {
        self.series_only + self.sample_only + self.both + self.neither
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeHistograms {
    pub series_level: TypeHistogram,
    pub sample_level: TypeHistogram,
}

/// Counts keyed by file type, kept in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeHistogram(Vec<(String, usize)>);

impl TypeHistogram {
    pub fn add(&mut self, file_type: &str) {
        match self.0.iter_mut().find(|(key, _)| key == file_type) {
            Some((_, count)) => *count += 1,
            None => self.0.push((file_type.to_string(), 1)),
        }
    }

    pub fn get(&self, file_type: &str) -> Option<usize> {
        self.0
            .iter()
            .find(|(key, _)| key == file_type)
            .map(|(_, count)| *count)
    }

    pub fn entries(&self) -> &[(String, usize)] {
        &self.0
    }

    pub fn total(&self) -> usize {
        self.0.iter().map(|(_, count)| count).sum()
    }
}

impl Serialize for TypeHistogram {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(key, count)| (key, count)))
    }
}

/// File type from the base name: the last two dot segments when the name has
/// more than two (`x.tsv.gz` -> `tsv.gz`), otherwise the last one.
pub fn file_type(url: &str) -> String {
    let parts: Vec<&str> = file_name(url).split('.').collect();
    if parts.len() > 2 {
        parts[parts.len() - 2..].join(".")
    } else {
        parts.last().copied().unwrap_or_default().to_string()
    }
}

/// Statistics over the series of a tree. Orphan samples have no series to be
/// compared against and are left out.
pub fn analyze(tree: &FileTree) -> Result<ReconciliationReport, KiraError> {
    let n = tree.series.len();
    if n == 0 {
        return Err(KiraError::EmptyTree);
    }

    let sample_counts: Vec<usize> = tree.series.iter().map(|s| s.samples.len()).collect();
    let total_samples: usize = sample_counts.iter().sum();

    let (mut series_only, mut sample_only, mut both, mut neither) = (0usize, 0usize, 0usize, 0usize);
    let mut file_counts = LevelCounts {
        series_level: 0,
        sample_level: 0,
    };
    let mut series_types = TypeHistogram::default();
    let mut sample_types = TypeHistogram::default();

    for series in &tree.series {
        match (series.has_series_files(), series.has_sample_files()) {
            (true, true) => both += 1,
            (true, false) => series_only += 1,
            (false, true) => sample_only += 1,
            (false, false) => neither += 1,
        }

        file_counts.series_level += series.files.len();
        for url in &series.files {
            series_types.add(&file_type(url));
        }
        for sample in &series.samples {
            file_counts.sample_level += sample.files.len();
            for url in &sample.files {
                sample_types.add(&file_type(url));
            }
        }
    }

    let ratio = |count: usize| round2(count as f64 / n as f64);

    Ok(ReconciliationReport {
        series: n,
        avg_samples_per_series: ratio(total_samples),
        min_samples_per_series: sample_counts.iter().copied().min().unwrap_or(0),
        max_samples_per_series: sample_counts.iter().copied().max().unwrap_or(0),
        file_counts,
        file_locations: Placement {
            series_only: ratio(series_only),
            sample_only: ratio(sample_only),
            both: ratio(both),
            neither: ratio(neither),
        },
        file_types: TypeHistograms {
            series_level: series_types,
            sample_level: sample_types,
        },
    })
}

/// Two-decimal rounding of the exact binary value, ties to even: 1/8 gives
/// 0.12 and 3/8 gives 0.38. `{:.2}` formats with exactly that rule.
fn round2(value: f64) -> f64 {
    format!("{value:.2}").parse().unwrap_or(value)
}
