use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::AccessionRequest;
use crate::error::KiraError;
use crate::store::default_cache_root;
use crate::transfer::{TransferOptions, VerifyMode};

pub const DEFAULT_CONFIG_FILE: &str = "kira-geo.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub accessions: Vec<AccessionEntry>,
    #[serde(default)]
    pub parallelism: Option<usize>,
    #[serde(default)]
    pub cache_root: Option<Utf8PathBuf>,
    #[serde(default)]
    pub transfer: Option<TransferSection>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum AccessionEntry {
    Shorthand(String),
    Detailed(AccessionEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AccessionEntryObject {
    pub id: String,
    #[serde(default)]
    pub include_children: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct TransferSection {
    #[serde(default)]
    pub read_timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub backoff_ms: Option<u64>,
    #[serde(default)]
    pub verify: Option<VerifyMode>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub accessions: Vec<AccessionRequest>,
    pub parallelism: usize,
    pub cache_root: Utf8PathBuf,
    pub transfer: TransferOptions,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, KiraError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Err(KiraError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| KiraError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| KiraError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    /// Like [`ConfigLoader::resolve`], but a missing default file yields the
    /// built-in defaults.
    pub fn resolve_or_default(path: Option<&str>) -> Result<ResolvedConfig, KiraError> {
        match Self::resolve(path) {
            Err(KiraError::MissingConfig) => Self::resolve_config(Config::default()),
            other => other,
        }
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, KiraError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let accessions = config
            .accessions
            .into_iter()
            .map(|entry| match entry {
                AccessionEntry::Shorthand(value) => Ok(AccessionRequest {
                    id: value.parse()?,
                    include_children: true,
                }),
                AccessionEntry::Detailed(obj) => Ok(AccessionRequest {
                    id: obj.id.parse()?,
                    include_children: obj.include_children.unwrap_or(true),
                }),
            })
            .collect::<Result<Vec<_>, KiraError>>()?;

        let parallelism = config.parallelism.unwrap_or(1);
        if parallelism == 0 {
            return Err(KiraError::InvalidParallelism(parallelism));
        }

        let cache_root = match config.cache_root {
            Some(root) => root,
            None => default_cache_root()?,
        };

        let defaults = TransferOptions::default();
        let section = config.transfer.unwrap_or_default();
        let transfer = TransferOptions {
            read_timeout: section
                .read_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.read_timeout),
            max_attempts: section.max_attempts.unwrap_or(defaults.max_attempts).max(1),
            backoff: section
                .backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff),
            verify: section.verify.unwrap_or(defaults.verify),
        };

        Ok(ResolvedConfig {
            schema_version,
            accessions,
            parallelism,
            cache_root,
            transfer,
        })
    }
}
