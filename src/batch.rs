use rayon::prelude::*;
use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};
use tracing::{debug, warn};

use crate::domain::{Accession, AccessionRequest};
use crate::error::KiraError;
use crate::geo::MetadataFetcher;
use crate::record::{MetadataRecord, RecordBatch};

#[derive(Debug, Clone)]
pub struct FetchEntry {
    pub id: Accession,
    pub result: Result<MetadataRecord, KiraError>,
}

/// Per-accession fetch results in the order the accessions were requested.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    entries: Vec<FetchEntry>,
}

impl BatchResult {
    pub fn entries(&self) -> &[FetchEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &Accession) -> Option<&Result<MetadataRecord, KiraError>> {
        self.entries
            .iter()
            .find(|entry| &entry.id == id)
            .map(|entry| &entry.result)
    }

    pub fn errors(&self) -> impl Iterator<Item = (&Accession, &KiraError)> {
        self.entries
            .iter()
            .filter_map(|entry| entry.result.as_ref().err().map(|err| (&entry.id, err)))
    }

    /// The successful records, ready for the tree builder.
    pub fn records(&self) -> RecordBatch {
        self.entries
            .iter()
            .filter_map(|entry| {
                entry
                    .result
                    .as_ref()
                    .ok()
                    .map(|record| (entry.id.to_string(), record.clone()))
            })
            .collect()
    }
}

impl Serialize for BatchResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Failure<'a> {
            error: &'a str,
        }

        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            match &entry.result {
                Ok(record) => map.serialize_entry(entry.id.as_str(), record)?,
                Err(err) => map.serialize_entry(
                    entry.id.as_str(),
                    &Failure {
                        error: &err.to_string(),
                    },
                )?,
            }
        }
        map.end()
    }
}

/// Fetches every accession on a pool of `parallelism` workers. Repeated
/// accessions are fetched once.
///
/// A failing accession becomes a [`KiraError::Fetch`] entry for that ID; it
/// never stops the other fetches. The call itself only fails when the pool
/// cannot be built.
pub fn fetch_all<F: MetadataFetcher>(
    fetcher: &F,
    ids: &[Accession],
    include_children: bool,
    parallelism: usize,
) -> Result<BatchResult, KiraError> {
    let requests: Vec<AccessionRequest> = ids
        .iter()
        .map(|id| AccessionRequest {
            id: id.clone(),
            include_children,
        })
        .collect();
    fetch_requests(fetcher, &requests, parallelism)
}

/// [`fetch_all`] with a per-accession `include_children` flag.
pub fn fetch_requests<F: MetadataFetcher>(
    fetcher: &F,
    requests: &[AccessionRequest],
    parallelism: usize,
) -> Result<BatchResult, KiraError> {
    if parallelism == 0 {
        return Err(KiraError::InvalidParallelism(parallelism));
    }
    let requests = unique_requests(requests);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(parallelism)
        .thread_name(|index| format!("kira-geo-fetch-{index}"))
        .build()
        .map_err(|err| KiraError::WorkerPool(err.to_string()))?;

    let entries = pool.install(|| {
        requests
            .par_iter()
            .map(|request| {
                let id = &request.id;
                debug!(%id, "fetching metadata");
                let result = fetcher
                    .fetch(id, request.include_children)
                    .map_err(|err| {
                        warn!(%id, error = %err, "metadata fetch failed");
                        into_fetch_error(id, err)
                    });
                FetchEntry {
                    id: id.clone(),
                    result,
                }
            })
            .collect::<Vec<_>>()
    });

    Ok(BatchResult { entries })
}

/// First occurrence wins its position; repeats only widen `include_children`.
fn unique_requests(requests: &[AccessionRequest]) -> Vec<AccessionRequest> {
    let mut unique: Vec<AccessionRequest> = Vec::with_capacity(requests.len());
    for request in requests {
        match unique.iter_mut().find(|seen| seen.id == request.id) {
            Some(seen) => {
                debug!(id = %request.id, "dropping repeated accession");
                seen.include_children |= request.include_children;
            }
            None => unique.push(request.clone()),
        }
    }
    unique
}

fn into_fetch_error(id: &Accession, err: KiraError) -> KiraError {
    match err {
        KiraError::Fetch { .. } => err,
        other => KiraError::Fetch {
            id: id.to_string(),
            message: other.to_string(),
        },
    }
}
