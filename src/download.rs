use std::fs;
use std::time::Instant;

use camino::Utf8Path;
use serde::Serialize;
use tracing::info;

use crate::app::{ProgressEvent, ProgressSink};
use crate::error::KiraError;
use crate::transfer::{DownloadLog, TransferClient, TransferOutcome, Transport};
use crate::tree::FileTree;

/// Directory under `<cache_root>/<series>/` holding series-level files.
pub const SERIES_SUPP_DIR: &str = "Supp";

#[derive(Debug, Clone, Default, Serialize)]
pub struct DownloadSummary {
    pub outcomes: Vec<TransferOutcome>,
}

impl DownloadSummary {
    pub fn downloaded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.succeeded && !outcome.skipped)
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.skipped).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| !outcome.succeeded)
            .count()
    }
}

pub struct Downloader<T: Transport> {
    client: TransferClient<T>,
}

impl<T: Transport> Downloader<T> {
    pub fn new(client: TransferClient<T>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &TransferClient<T> {
        &self.client
    }

    /// Walks the tree in order and transfers every referenced file:
    ///
    /// - series files into `<cache_root>/<series>/Supp/`
    /// - sample files into `<cache_root>/<series>/<sample>/`
    /// - orphan sample files into `<cache_root>/<sample>/`
    ///
    /// Failed transfers are recorded and the walk continues. Only filesystem
    /// errors abort the run.
    pub fn download_all(
        &self,
        tree: &FileTree,
        cache_root: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadSummary, KiraError> {
        let log = DownloadLog::open(cache_root)?;
        let mut summary = DownloadSummary::default();
        let start = Instant::now();

        for series in &tree.series {
            let series_dir = cache_root.join(series.id.as_str());
            fs::create_dir_all(series_dir.as_std_path())
                .map_err(|err| KiraError::Filesystem(format!("create {series_dir}: {err}")))?;
            sink.event(ProgressEvent {
                message: format!("phase=Download; series {}", series.id),
                elapsed: Some(start.elapsed()),
            });

            if !series.files.is_empty() {
                let supp_dir = series_dir.join(SERIES_SUPP_DIR);
                for url in &series.files {
                    summary
                        .outcomes
                        .push(self.client.transfer(url, &supp_dir, &log)?);
                }
            }

            for sample in series.samples.iter().filter(|s| !s.files.is_empty()) {
                let sample_dir = series_dir.join(sample.id.as_str());
                for url in &sample.files {
                    summary
                        .outcomes
                        .push(self.client.transfer(url, &sample_dir, &log)?);
                }
            }
        }

        for orphan in tree.orphans.iter().filter(|s| !s.files.is_empty()) {
            sink.event(ProgressEvent {
                message: format!("phase=Download; sample {}", orphan.id),
                elapsed: Some(start.elapsed()),
            });
            let sample_dir = cache_root.join(orphan.id.as_str());
            for url in &orphan.files {
                summary
                    .outcomes
                    .push(self.client.transfer(url, &sample_dir, &log)?);
            }
        }

        info!(
            downloaded = summary.downloaded(),
            skipped = summary.skipped(),
            failed = summary.failed(),
            "download run finished"
        );
        Ok(summary)
    }
}
