use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::Serialize;

use crate::error::KiraError;
use crate::record::{RecordBatch, SUB_RECORDS_FIELD};

/// Where a run keeps its artifacts. The workspace holds metadata, report and
/// tree listing; the cache root holds downloaded files and download logs.
#[derive(Debug, Clone)]
pub struct Store {
    workspace: Utf8PathBuf,
    cache_root: Utf8PathBuf,
}

impl Store {
    pub fn new() -> Result<Self, KiraError> {
        let cwd = std::env::current_dir().map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let workspace = Utf8PathBuf::from_path_buf(cwd.join(".kira-geo"))
            .map_err(|_| KiraError::Filesystem("invalid workspace path".to_string()))?;
        Ok(Self {
            workspace,
            cache_root: default_cache_root()?,
        })
    }

    pub fn new_with_paths(workspace: Utf8PathBuf, cache_root: Utf8PathBuf) -> Self {
        Self {
            workspace,
            cache_root,
        }
    }

    pub fn workspace(&self) -> &Utf8Path {
        &self.workspace
    }

    pub fn cache_root(&self) -> &Utf8Path {
        &self.cache_root
    }

    pub fn metadata_path(&self) -> Utf8PathBuf {
        self.workspace.join("metadata.json")
    }

    pub fn metadata_table_path(&self) -> Utf8PathBuf {
        self.workspace.join("metadata.csv")
    }

    pub fn report_path(&self) -> Utf8PathBuf {
        self.workspace.join("report.json")
    }

    pub fn file_tree_path(&self) -> Utf8PathBuf {
        self.workspace.join("file_tree.json")
    }

    pub fn soft_cache_dir(&self) -> Utf8PathBuf {
        self.cache_root.join("soft")
    }

    pub fn ensure_workspace(&self) -> Result<(), KiraError> {
        fs::create_dir_all(self.workspace.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))
    }

    pub fn ensure_cache_root(&self) -> Result<(), KiraError> {
        fs::create_dir_all(self.cache_root.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))
    }

    pub fn write_json<T: Serialize + ?Sized>(path: &Utf8Path, value: &T) -> Result<(), KiraError> {
        let content = serde_json::to_vec_pretty(value)
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
            .prefix("kira-geo-file")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        temp.write_all(content)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn read_records(path: &Utf8Path) -> Result<RecordBatch, KiraError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| KiraError::Filesystem(format!("read {path}: {err}")))?;
        RecordBatch::from_json_str(&content)
    }

    /// One row per accession, one column per raw field in first-seen order.
    /// List values are joined with `; ` and sub-records are stored as JSON.
    pub fn write_metadata_table(path: &Utf8Path, batch: &RecordBatch) -> Result<(), KiraError> {
        let mut columns: Vec<&str> = Vec::new();
        let mut has_children = false;
        for (_, record) in batch.iter() {
            for (name, _) in record.fields() {
                if !columns.contains(&name) {
                    columns.push(name);
                }
            }
            has_children |= record.sub_records().is_some();
        }

        let mut writer = csv::Writer::from_writer(Vec::new());
        let mut header = vec!["accession"];
        header.extend(columns.iter().copied());
        if has_children {
            header.push(SUB_RECORDS_FIELD);
        }
        writer
            .write_record(&header)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;

        for (id, record) in batch.iter() {
            let mut row = vec![id.to_string()];
            for column in &columns {
                row.push(record.field(column).map(|v| v.join("; ")).unwrap_or_default());
            }
            if has_children {
                let children = match record.sub_records() {
                    Some(children) => {
                        let children: RecordBatch = children.iter().cloned().collect();
                        serde_json::to_string(&children)
                            .map_err(|err| KiraError::Filesystem(err.to_string()))?
                    }
                    None => String::new(),
                };
                row.push(children);
            }
            writer
                .write_record(&row)
                .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        }

        let content = writer
            .into_inner()
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        Self::write_bytes_atomic(path, &content)
    }
}

pub fn default_cache_root() -> Result<Utf8PathBuf, KiraError> {
    BaseDirs::new()
        .and_then(|dirs| {
            Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("kira-geo")).ok()
        })
        .ok_or_else(|| KiraError::Filesystem("unable to resolve cache directory".to_string()))
}
