use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::KiraError;
use crate::tree::file_name;

pub const PROGRESS_LOG: &str = "download.logs";
pub const FAILURE_LOG: &str = "download_failures.log";

/// One network transfer, no retries. Implementations write the body to
/// `destination`, replacing anything already there. `read_timeout` bounds
/// each wait for data, never the transfer as a whole.
pub trait Transport: Send + Sync {
    fn fetch_to(
        &self,
        url: &str,
        destination: &Path,
        read_timeout: Duration,
    ) -> Result<(), KiraError>;

    /// Size advertised by the remote, when it advertises one.
    fn remote_size(&self, url: &str) -> Result<Option<u64>, KiraError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum VerifyMode {
    /// Any existing file with the target name counts as downloaded. Its
    /// contents are never checked.
    #[default]
    None,
    /// Existing files are kept only when their size matches the remote
    /// `Content-Length`.
    RemoteSize,
}

#[derive(Debug, Clone)]
pub struct TransferOptions {
    pub read_timeout: Duration,
    pub max_attempts: u32,
    pub backoff: Duration,
    pub verify: VerifyMode,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(60),
            max_attempts: 3,
            backoff: Duration::from_millis(2000),
            verify: VerifyMode::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferOutcome {
    pub url: String,
    pub destination: Option<Utf8PathBuf>,
    pub attempt_count: u32,
    pub succeeded: bool,
    pub skipped: bool,
    pub error: Option<String>,
}

impl TransferOutcome {
    fn completed(url: &str, destination: Utf8PathBuf, attempt_count: u32) -> Self {
        Self {
            url: url.to_string(),
            destination: Some(destination),
            attempt_count,
            succeeded: true,
            skipped: false,
            error: None,
        }
    }

    fn skipped(url: &str, destination: Utf8PathBuf) -> Self {
        Self {
            url: url.to_string(),
            destination: Some(destination),
            attempt_count: 0,
            succeeded: true,
            skipped: true,
            error: None,
        }
    }

    fn failed(
        url: &str,
        destination: Option<Utf8PathBuf>,
        attempt_count: u32,
        error: String,
    ) -> Self {
        Self {
            url: url.to_string(),
            destination,
            attempt_count,
            succeeded: false,
            skipped: false,
            error: Some(error),
        }
    }
}

/// Append-only progress and failure logs for one directory. Clones share the
/// same writer lock, so concurrent users never interleave partial lines.
#[derive(Debug, Clone)]
pub struct DownloadLog {
    dir: Utf8PathBuf,
    writer: Arc<Mutex<()>>,
}

impl DownloadLog {
    pub fn open(dir: &Utf8Path) -> Result<Self, KiraError> {
        fs::create_dir_all(dir.as_std_path())
            .map_err(|err| KiraError::Filesystem(format!("create {dir}: {err}")))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            writer: Arc::new(Mutex::new(())),
        })
    }

    pub fn progress_path(&self) -> Utf8PathBuf {
        self.dir.join(PROGRESS_LOG)
    }

    pub fn failure_path(&self) -> Utf8PathBuf {
        self.dir.join(FAILURE_LOG)
    }

    fn progress(&self, status: &str, url: &str, attempt: u32, detail: &str) -> Result<(), KiraError> {
        let line = log_line(status, url, attempt, detail);
        let _guard = self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        append_line(&self.progress_path(), &line)
    }

    fn failure(&self, url: &str, attempts: u32, detail: &str) -> Result<(), KiraError> {
        let line = log_line("failed", url, attempts, detail);
        let _guard = self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        append_line(&self.failure_path(), &line)?;
        append_line(&self.progress_path(), &line)
    }
}

fn log_line(status: &str, url: &str, attempt: u32, detail: &str) -> String {
    let detail = detail.replace(['\t', '\n', '\r'], " ");
    format!(
        "{}\t{status}\t{url}\t{attempt}\t{detail}\n",
        chrono::Utc::now().to_rfc3339()
    )
}

fn append_line(path: &Utf8Path, line: &str) -> Result<(), KiraError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path.as_std_path())
        .map_err(|err| KiraError::Filesystem(format!("open {path}: {err}")))?;
    file.write_all(line.as_bytes())
        .map_err(|err| KiraError::Filesystem(format!("write {path}: {err}")))
}

pub struct TransferClient<T: Transport> {
    transport: T,
    options: TransferOptions,
}

impl<T: Transport> TransferClient<T> {
    pub fn new(transport: T, options: TransferOptions) -> Self {
        Self { transport, options }
    }

    pub fn options(&self) -> &TransferOptions {
        &self.options
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Transfers `url` into `destination_dir` under its URL base name.
    ///
    /// Only filesystem failures are returned as errors. Remote failures are
    /// retried with a constant backoff and end up in the returned outcome and
    /// the failure log.
    pub fn transfer(
        &self,
        url: &str,
        destination_dir: &Utf8Path,
        log: &DownloadLog,
    ) -> Result<TransferOutcome, KiraError> {
        fs::create_dir_all(destination_dir.as_std_path())
            .map_err(|err| KiraError::Filesystem(format!("create {destination_dir}: {err}")))?;

        let name = file_name(url);
        if matches!(name, "" | "." | "..") {
            let message = KiraError::InvalidUrl(url.to_string()).to_string();
            warn!(url, "no file name in supplementary URL");
            log.failure(url, 0, &message)?;
            return Ok(TransferOutcome::failed(url, None, 0, message));
        }
        let destination = destination_dir.join(name);

        if destination.as_std_path().exists() && self.keep_existing(url, &destination) {
            debug!(url, path = %destination, "already downloaded, skipping");
            log.progress("skipped", url, 0, destination.as_str())?;
            return Ok(TransferOutcome::skipped(url, destination));
        }

        let max_attempts = self.options.max_attempts.max(1);
        let mut last_error = String::new();
        for attempt in 1..=max_attempts {
            let part = tempfile::Builder::new()
                .prefix(".kira-geo-part")
                .tempfile_in(destination_dir.as_std_path())
                .map_err(|err| KiraError::Filesystem(err.to_string()))?;
            match self
                .transport
                .fetch_to(url, part.path(), self.options.read_timeout)
            {
                Ok(()) => {
                    part.persist(destination.as_std_path())
                        .map_err(|err| KiraError::Filesystem(err.to_string()))?;
                    info!(url, attempt, "downloaded");
                    log.progress("downloaded", url, attempt, destination.as_str())?;
                    return Ok(TransferOutcome::completed(url, destination, attempt));
                }
                Err(err) => {
                    last_error = err.to_string();
                    warn!(url, attempt, max_attempts, error = %last_error, "transfer attempt failed");
                    log.progress("retry", url, attempt, &last_error)?;
                    if attempt < max_attempts {
                        thread::sleep(self.options.backoff);
                    }
                }
            }
        }

        warn!(url, attempts = max_attempts, "giving up on transfer");
        log.failure(url, max_attempts, &last_error)?;
        Ok(TransferOutcome::failed(
            url,
            Some(destination),
            max_attempts,
            last_error,
        ))
    }

    fn keep_existing(&self, url: &str, destination: &Utf8Path) -> bool {
        match self.options.verify {
            VerifyMode::None => true,
            VerifyMode::RemoteSize => {
                let local = fs::metadata(destination.as_std_path()).map(|meta| meta.len());
                match (local, self.transport.remote_size(url)) {
                    (Ok(local), Ok(Some(remote))) => {
                        if local != remote {
                            info!(url, local, remote, "size mismatch, downloading again");
                        }
                        local == remote
                    }
                    (Ok(_), Ok(None)) => true,
                    (_, Err(err)) => {
                        warn!(url, error = %err, "could not verify existing file, downloading again");
                        false
                    }
                    (Err(_), _) => false,
                }
            }
        }
    }
}
