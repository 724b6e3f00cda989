use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::batch::{BatchResult, fetch_requests};
use crate::domain::AccessionRequest;
use crate::download::{DownloadSummary, Downloader};
use crate::error::KiraError;
use crate::geo::MetadataFetcher;
use crate::record::RecordBatch;
use crate::report::{ReconciliationReport, analyze};
use crate::store::Store;
use crate::transfer::{TransferClient, TransferOptions, Transport};
use crate::tree::FileTree;

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Forwards progress events to the `tracing` subscriber.
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message),
            None => info!("{}", event.message),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetadataResult {
    pub requested: usize,
    pub fetched: usize,
    pub failed: Vec<FailedAccession>,
    pub metadata_path: String,
    pub table_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedAccession {
    pub id: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeResult {
    pub report: ReconciliationReport,
    pub report_path: String,
    pub file_tree_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadResult {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cache_root: String,
    pub summary: DownloadSummary,
}

impl DownloadResult {
    fn new(summary: DownloadSummary, cache_root: String) -> Self {
        Self {
            downloaded: summary.downloaded(),
            skipped: summary.skipped(),
            failed: summary.failed(),
            cache_root,
            summary,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub metadata: MetadataResult,
    pub report: Option<ReconciliationReport>,
    pub downloads: DownloadResult,
}

pub struct App<F: MetadataFetcher, T: Transport> {
    store: Store,
    fetcher: F,
    downloader: Downloader<T>,
}

impl<F: MetadataFetcher, T: Transport> App<F, T> {
    pub fn new(store: Store, fetcher: F, transport: T, options: TransferOptions) -> Self {
        Self {
            store,
            fetcher,
            downloader: Downloader::new(TransferClient::new(transport, options)),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Fetches metadata and writes `metadata.json` and `metadata.csv` into the
    /// workspace. Failed accessions are reported, not fatal.
    pub fn fetch_metadata(
        &self,
        requests: &[AccessionRequest],
        parallelism: usize,
        sink: &dyn ProgressSink,
    ) -> Result<(MetadataResult, RecordBatch), KiraError> {
        sink.event(ProgressEvent {
            message: format!(
                "phase=Resolve; fetching {} accessions with {parallelism} workers",
                requests.len()
            ),
            elapsed: None,
        });
        let start = Instant::now();
        let batch = fetch_requests(&self.fetcher, requests, parallelism)?;
        sink.event(ProgressEvent {
            message: "phase=Resolve; metadata fetched".to_string(),
            elapsed: Some(start.elapsed()),
        });

        let records = batch.records();
        self.store.ensure_workspace()?;
        let metadata_path = self.store.metadata_path();
        let table_path = self.store.metadata_table_path();
        Store::write_json(&metadata_path, &records)?;
        Store::write_metadata_table(&table_path, &records)?;

        let result = MetadataResult {
            requested: batch.len(),
            fetched: records.len(),
            failed: failed_accessions(&batch),
            metadata_path: metadata_path.to_string(),
            table_path: table_path.to_string(),
        };
        Ok((result, records))
    }

    /// Builds the tree from the stored metadata batch.
    pub fn load_tree(&self) -> Result<FileTree, KiraError> {
        let records = Store::read_records(&self.store.metadata_path())?;
        FileTree::build(&records)
    }

    pub fn analyze(&self, sink: &dyn ProgressSink) -> Result<AnalyzeResult, KiraError> {
        sink.event(ProgressEvent {
            message: "phase=Analyze; building file tree".to_string(),
            elapsed: None,
        });
        let tree = self.load_tree()?;
        let report = analyze(&tree)?;
        let (report_path, file_tree_path) = self.write_tree_artifacts(&tree, Some(&report))?;
        Ok(AnalyzeResult {
            report,
            report_path,
            file_tree_path,
        })
    }

    pub fn download(&self, sink: &dyn ProgressSink) -> Result<DownloadResult, KiraError> {
        let tree = self.load_tree()?;
        self.download_tree(&tree, sink)
    }

    /// Metadata, statistics and downloads in one pass. A batch without any
    /// series still downloads its orphan samples; it just has no report.
    pub fn run(
        &self,
        requests: &[AccessionRequest],
        parallelism: usize,
        sink: &dyn ProgressSink,
    ) -> Result<RunResult, KiraError> {
        let (metadata, records) = self.fetch_metadata(requests, parallelism, sink)?;
        let tree = FileTree::build(&records)?;
        let report = match analyze(&tree) {
            Ok(report) => Some(report),
            Err(KiraError::EmptyTree) => {
                warn!("no series in batch, skipping statistics");
                None
            }
            Err(err) => return Err(err),
        };
        self.write_tree_artifacts(&tree, report.as_ref())?;
        let downloads = self.download_tree(&tree, sink)?;
        Ok(RunResult {
            metadata,
            report,
            downloads,
        })
    }

    fn download_tree(
        &self,
        tree: &FileTree,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadResult, KiraError> {
        self.store.ensure_cache_root()?;
        let cache_root = self.store.cache_root();
        sink.event(ProgressEvent {
            message: format!("phase=Download; writing into {cache_root}"),
            elapsed: None,
        });
        let summary = self.downloader.download_all(tree, cache_root, sink)?;
        Ok(DownloadResult::new(summary, cache_root.to_string()))
    }

    fn write_tree_artifacts(
        &self,
        tree: &FileTree,
        report: Option<&ReconciliationReport>,
    ) -> Result<(String, String), KiraError> {
        self.store.ensure_workspace()?;
        let report_path = self.store.report_path();
        let file_tree_path = self.store.file_tree_path();
        if let Some(report) = report {
            Store::write_json(&report_path, report)?;
        }
        Store::write_json(&file_tree_path, &tree.listing())?;
        Ok((report_path.to_string(), file_tree_path.to_string()))
    }
}

fn failed_accessions(batch: &BatchResult) -> Vec<FailedAccession> {
    batch
        .errors()
        .map(|(id, err)| FailedAccession {
            id: id.to_string(),
            error: err.to_string(),
        })
        .collect()
}
