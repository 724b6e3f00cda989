use std::collections::HashSet;

use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};

use crate::domain::Accession;
use crate::error::KiraError;
use crate::record::{MetadataRecord, NO_FILE, RecordBatch};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleFileSet {
    pub id: Accession,
    pub files: Vec<String>,
}

impl SampleFileSet {
    /// Flattens every `supplementary_file_<N>` slot, dropping `NONE` entries.
    pub fn from_record(id: Accession, record: &MetadataRecord) -> Self {
        let files = record
            .file_slots()
            .flat_map(|(_, values)| values.iter())
            .filter(|value| value.as_str() != NO_FILE)
            .cloned()
            .collect();
        Self { id, files }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeriesFileSet {
    pub id: Accession,
    pub files: Vec<String>,
    pub samples: Vec<SampleFileSet>,
}

impl SeriesFileSet {
    pub fn has_series_files(&self) -> bool {
        !self.files.is_empty()
    }

    pub fn has_sample_files(&self) -> bool {
        self.samples.iter().any(|sample| !sample.files.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileTree {
    pub series: Vec<SeriesFileSet>,
    pub orphans: Vec<SampleFileSet>,
}

impl FileTree {
    /// Builds the tree from a batch, keeping batch order and every declared
    /// reference, duplicates included.
    pub fn build(records: &RecordBatch) -> Result<Self, KiraError> {
        let mut tree = FileTree::default();
        let mut owned_samples: HashSet<Accession> = HashSet::new();

        for (id, record) in records.iter() {
            match parse_tagged(id)? {
                id @ Accession::Series(_) => {
                    let series = build_series(id, record, &mut owned_samples)?;
                    tree.series.push(series);
                }
                id @ Accession::Sample(_) => {
                    tree.orphans.push(SampleFileSet::from_record(id, record));
                }
            }
        }
        Ok(tree)
    }

    pub fn sample_count(&self) -> usize {
        self.series.iter().map(|series| series.samples.len()).sum::<usize>() + self.orphans.len()
    }

    /// Nested name-only view: series -> own files and per-sample files.
    pub fn listing(&self) -> FileTreeListing<'_> {
        FileTreeListing(self)
    }
}

fn parse_tagged(id: &str) -> Result<Accession, KiraError> {
    id.parse().map_err(|_| KiraError::MalformedRecord {
        id: id.to_string(),
        reason: "accession is neither a GSE series nor a GSM sample".to_string(),
    })
}

fn build_series(
    id: Accession,
    record: &MetadataRecord,
    owned_samples: &mut HashSet<Accession>,
) -> Result<SeriesFileSet, KiraError> {
    let mut samples = Vec::new();
    for (child_id, child) in record.sub_records().unwrap_or(&[]) {
        let child_id = parse_tagged(child_id)?;
        if !child_id.is_sample() {
            return Err(KiraError::MalformedRecord {
                id: id.to_string(),
                reason: format!("sub-record {child_id} is not a sample"),
            });
        }
        if !owned_samples.insert(child_id.clone()) {
            return Err(KiraError::MalformedRecord {
                id: id.to_string(),
                reason: format!("sample {child_id} already belongs to another series"),
            });
        }
        samples.push(SampleFileSet::from_record(child_id, child));
    }
    Ok(SeriesFileSet {
        files: record.series_files().to_vec(),
        id,
        samples,
    })
}

/// Base name of a URL or path: the text after the last `/`, without query.
pub fn file_name(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().unwrap_or(path)
}

pub struct FileTreeListing<'a>(&'a FileTree);

struct SeriesListing<'a>(&'a SeriesFileSet);

struct SampleListing<'a>(&'a [SampleFileSet]);

struct Names<'a>(&'a [String]);

impl Serialize for FileTreeListing<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("series", &SeriesMap(&self.0.series))?;
        map.serialize_entry("orphans", &SampleListing(&self.0.orphans))?;
        map.end()
    }
}

struct SeriesMap<'a>(&'a [SeriesFileSet]);

impl Serialize for SeriesMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(
            self.0
                .iter()
                .map(|series| (series.id.as_str(), SeriesListing(series))),
        )
    }
}

impl Serialize for SeriesListing<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("files", &Names(&self.0.files))?;
        map.serialize_entry("samples", &SampleListing(&self.0.samples))?;
        map.end()
    }
}

impl Serialize for SampleListing<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(
            self.0
                .iter()
                .map(|sample| (sample.id.as_str(), Names(&sample.files))),
        )
    }
}

impl Serialize for Names<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter().map(|url| file_name(url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_strips_directories_and_query() {
        assert_eq!(file_name("ftp://host/a/b/GSE1_counts.tsv.gz"), "GSE1_counts.tsv.gz");
        assert_eq!(file_name("https://host/x.txt?raw=1"), "x.txt");
        assert_eq!(file_name("https://host/dir/"), "");
    }

    #[test]
    fn sample_slots_flatten_in_order() {
        let record = MetadataRecord::new()
            .with_field("supplementary_file_1", ["ftp://h/b.txt", "NONE"])
            .with_field("title", ["ignored"])
            .with_field("supplementary_file_2", ["ftp://h/a.txt", "ftp://h/b.txt"]);
        let id: Accession = "GSM7".parse().unwrap();
        let set = SampleFileSet::from_record(id, &record);
        assert_eq!(set.files, ["ftp://h/b.txt", "ftp://h/a.txt", "ftp://h/b.txt"]);
    }
}
