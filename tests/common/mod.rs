#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use camino::Utf8PathBuf;

use kira_geo::app::{ProgressEvent, ProgressSink};
use kira_geo::domain::Accession;
use kira_geo::error::KiraError;
use kira_geo::geo::MetadataFetcher;
use kira_geo::record::MetadataRecord;
use kira_geo::transfer::{TransferOptions, Transport, VerifyMode};

pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn event(&self, _event: ProgressEvent) {}
}

pub fn utf8_tempdir() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, path)
}

pub fn fast_options(max_attempts: u32) -> TransferOptions {
    TransferOptions {
        read_timeout: Duration::from_secs(1),
        max_attempts,
        backoff: Duration::ZERO,
        verify: VerifyMode::None,
    }
}

pub fn payload(url: &str) -> String {
    format!("payload:{url}")
}

/// In-memory transport: writes `payload:<url>` unless told to fail.
#[derive(Default)]
pub struct MockTransport {
    calls: Mutex<Vec<String>>,
    flaky: Mutex<HashMap<String, usize>>,
    broken: HashSet<String>,
    sizes: HashMap<String, u64>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the first `times` attempts for `url`.
    pub fn flaky(self, url: &str, times: usize) -> Self {
        self.flaky.lock().unwrap().insert(url.to_string(), times);
        self
    }

    pub fn broken(mut self, url: &str) -> Self {
        self.broken.insert(url.to_string());
        self
    }

    pub fn with_remote_size(mut self, url: &str, size: u64) -> Self {
        self.sizes.insert(url.to_string(), size);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.as_str() == url)
            .count()
    }
}

impl Transport for MockTransport {
    fn fetch_to(&self, url: &str, destination: &Path, _timeout: Duration) -> Result<(), KiraError> {
        self.calls.lock().unwrap().push(url.to_string());
        if self.broken.contains(url) {
            return Err(KiraError::Transfer {
                url: url.to_string(),
                message: "connection reset".to_string(),
            });
        }
        if let Some(remaining) = self.flaky.lock().unwrap().get_mut(url) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(KiraError::Transfer {
                    url: url.to_string(),
                    message: "read timed out".to_string(),
                });
            }
        }
        std::fs::write(destination, payload(url))
            .map_err(|err| KiraError::Filesystem(err.to_string()))
    }

    fn remote_size(&self, url: &str) -> Result<Option<u64>, KiraError> {
        Ok(self.sizes.get(url).copied())
    }
}

/// Serves canned records; accessions listed as failing raise an HTTP error.
#[derive(Default)]
pub struct MockFetcher {
    records: HashMap<String, MetadataRecord>,
    failing: HashSet<String>,
    calls: Mutex<usize>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, id: &str, record: MetadataRecord) -> Self {
        self.records.insert(id.to_string(), record);
        self
    }

    pub fn failing(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl MetadataFetcher for MockFetcher {
    fn fetch(&self, id: &Accession, include_children: bool) -> Result<MetadataRecord, KiraError> {
        *self.calls.lock().unwrap() += 1;
        // Later IDs finish first so completion order differs from input order.
        let digits: u64 = id.as_str()[3..].parse().unwrap_or(0);
        thread::sleep(Duration::from_millis(20u64.saturating_sub(digits.min(20))));
        if self.failing.contains(id.as_str()) {
            return Err(KiraError::GeoStatus {
                status: 502,
                message: "bad gateway".to_string(),
            });
        }
        let record = self
            .records
            .get(id.as_str())
            .cloned()
            .unwrap_or_else(|| MetadataRecord::new().with_field("geo_accession", [id.as_str()]));
        if include_children {
            Ok(record)
        } else {
            Ok(strip_children(record))
        }
    }
}

fn strip_children(record: MetadataRecord) -> MetadataRecord {
    let mut stripped = MetadataRecord::new();
    for (name, values) in record.fields() {
        stripped = stripped.with_field(name, values.iter().cloned());
    }
    stripped
}

pub fn series_record(id: &str, files: &[&str], samples: &[(&str, Vec<&str>)]) -> MetadataRecord {
    let mut record = MetadataRecord::new()
        .with_field("geo_accession", [id])
        .with_field("supplementary_file", files.iter().copied());
    record.ensure_sub_records();
    for (sample_id, sample_files) in samples {
        record.push_sub_record(*sample_id, sample_record(sample_id, sample_files));
    }
    record
}

pub fn sample_record(id: &str, files: &[&str]) -> MetadataRecord {
    let mut record = MetadataRecord::new().with_field("geo_accession", [id]);
    if files.is_empty() {
        return record.with_field("supplementary_file_1", ["NONE"]);
    }
    for (index, file) in files.iter().enumerate() {
        record = record.with_field(&format!("supplementary_file_{}", index + 1), [*file]);
    }
    record
}
