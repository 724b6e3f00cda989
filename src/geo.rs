use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use camino::Utf8PathBuf;
use flate2::read::GzDecoder;
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_LENGTH, HeaderMap, HeaderValue, USER_AGENT};
use tracing::debug;

use crate::domain::Accession;
use crate::error::KiraError;
use crate::record::MetadataRecord;
use crate::soft;
use crate::store::Store;
use crate::transfer::{TransferOptions, Transport};

/// Produces the metadata record for one accession. With `include_children`,
/// a series record carries its samples as sub-records.
pub trait MetadataFetcher: Send + Sync {
    fn fetch(&self, id: &Accession, include_children: bool) -> Result<MetadataRecord, KiraError>;
}

#[derive(Clone)]
pub struct GeoHttpClient {
    client: Client,
    transfer: Client,
    read_timeout: Duration,
    soft_cache: Option<Utf8PathBuf>,
}

impl GeoHttpClient {
    pub fn new() -> Result<Self, KiraError> {
        let client = Client::builder()
            .default_headers(default_headers()?)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| KiraError::GeoHttp(err.to_string()))?;
        let read_timeout = TransferOptions::default().read_timeout;
        Ok(Self {
            client,
            transfer: transfer_client(read_timeout)?,
            read_timeout,
            soft_cache: None,
        })
    }

    /// Sets how long a file transfer may wait for the next chunk of data.
    /// The transfer as a whole has no deadline.
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Result<Self, KiraError> {
        self.transfer = transfer_client(read_timeout)?;
        self.read_timeout = read_timeout;
        Ok(self)
    }

    /// Keeps raw SOFT responses under `dir` and reuses them on later fetches.
    pub fn with_soft_cache(mut self, dir: Utf8PathBuf) -> Self {
        self.soft_cache = Some(dir);
        self
    }

    pub fn family_soft_url(accession: &Accession) -> String {
        format!(
            "https://ftp.ncbi.nlm.nih.gov/geo/series/{bucket}/{acc}/soft/{acc}_family.soft.gz",
            bucket = accession.ftp_bucket(),
            acc = accession.as_str()
        )
    }

    pub fn brief_soft_url(accession: &Accession) -> String {
        format!(
            "https://www.ncbi.nlm.nih.gov/geo/query/acc.cgi?acc={}&targ=self&form=text&view=brief",
            accession.as_str()
        )
    }

    /// GEO advertises FTP links; the same paths are served over HTTPS.
    pub fn normalize_url(url: &str) -> String {
        if let Some(rest) = url.strip_prefix("ftp://ftp.ncbi.nlm.nih.gov/") {
            return format!("https://ftp.ncbi.nlm.nih.gov/{}", rest);
        }
        url.to_string()
    }

    fn fetch_soft_text(
        &self,
        accession: &Accession,
        with_family: bool,
    ) -> Result<String, KiraError> {
        let cache_path = self.soft_cache.as_ref().map(|dir| {
            let suffix = if with_family { "_family" } else { "" };
            dir.join(format!("{}{suffix}.soft", accession.as_str()))
        });
        if let Some(path) = &cache_path {
            if path.as_std_path().exists() {
                debug!(%accession, path = %path, "using cached SOFT text");
                return fs::read_to_string(path.as_std_path())
                    .map_err(|err| KiraError::Filesystem(err.to_string()));
            }
        }

        let text = if with_family {
            let bytes = self.get_bytes(&Self::family_soft_url(accession))?;
            let mut decoder = GzDecoder::new(bytes.as_slice());
            let mut text = String::new();
            decoder
                .read_to_string(&mut text)
                .map_err(|err| KiraError::GeoHttp(err.to_string()))?;
            text
        } else {
            let bytes = self.get_bytes(&Self::brief_soft_url(accession))?;
            String::from_utf8_lossy(&bytes).into_owned()
        };

        if let Some(path) = &cache_path {
            Store::write_bytes_atomic(path, text.as_bytes())?;
        }
        Ok(text)
    }

    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, KiraError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| KiraError::GeoHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "GEO request failed".to_string());
            return Err(KiraError::GeoStatus { status, message });
        }
        let bytes = response
            .bytes()
            .map_err(|err| KiraError::GeoHttp(err.to_string()))?;
        Ok(bytes.to_vec())
    }

    fn write_response_to_file(
        mut response: reqwest::blocking::Response,
        url: &str,
        destination: &Path,
    ) -> Result<(), KiraError> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "GEO request failed".to_string());
            return Err(KiraError::GeoStatus { status, message });
        }
        let mut file =
            File::create(destination).map_err(|err| KiraError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, &mut file).map_err(|err| KiraError::Transfer {
            url: url.to_string(),
            message: err.to_string(),
        })?;
        Ok(())
    }
}

fn default_headers() -> Result<HeaderMap, KiraError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&format!("kira-geo/{}", env!("CARGO_PKG_VERSION")))
            .map_err(|err| KiraError::GeoHttp(err.to_string()))?,
    );
    Ok(headers)
}

/// The blocking client applies its timeout to the response headers and to
/// every body read separately, so slow but live transfers keep going.
fn transfer_client(read_timeout: Duration) -> Result<Client, KiraError> {
    Client::builder()
        .default_headers(default_headers()?)
        .timeout(read_timeout)
        .build()
        .map_err(|err| KiraError::GeoHttp(err.to_string()))
}

impl MetadataFetcher for GeoHttpClient {
    fn fetch(&self, id: &Accession, include_children: bool) -> Result<MetadataRecord, KiraError> {
        let with_family = include_children && id.is_series();
        let text = self.fetch_soft_text(id, with_family)?;
        soft::parse_record(&text, id, include_children)
    }
}

impl Transport for GeoHttpClient {
    fn fetch_to(
        &self,
        url: &str,
        destination: &Path,
        read_timeout: Duration,
    ) -> Result<(), KiraError> {
        let url = Self::normalize_url(url);
        let adjusted;
        let client = if read_timeout == self.read_timeout {
            &self.transfer
        } else {
            adjusted = transfer_client(read_timeout)?;
            &adjusted
        };
        let response = client.get(&url).send().map_err(|err| KiraError::Transfer {
            url: url.clone(),
            message: err.to_string(),
        })?;
        Self::write_response_to_file(response, &url, destination)
    }

    fn remote_size(&self, url: &str) -> Result<Option<u64>, KiraError> {
        let url = Self::normalize_url(url);
        let response = self
            .transfer
            .head(&url)
            .send()
            .map_err(|err| KiraError::Transfer {
                url: url.clone(),
                message: err.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(KiraError::GeoStatus {
                status: response.status().as_u16(),
                message: format!("HEAD {url}"),
            });
        }
        Ok(response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_url_layout() {
        let acc: Accession = "GSE276581".parse().unwrap();
        assert_eq!(
            GeoHttpClient::family_soft_url(&acc),
            "https://ftp.ncbi.nlm.nih.gov/geo/series/GSE276nnn/GSE276581/soft/GSE276581_family.soft.gz"
        );
    }

    #[test]
    fn ftp_links_become_https() {
        assert_eq!(
            GeoHttpClient::normalize_url("ftp://ftp.ncbi.nlm.nih.gov/geo/samples/GSM1nnn/GSM1/suppl/a.txt"),
            "https://ftp.ncbi.nlm.nih.gov/geo/samples/GSM1nnn/GSM1/suppl/a.txt"
        );
        assert_eq!(GeoHttpClient::normalize_url("https://x/y"), "https://x/y");
    }
}
