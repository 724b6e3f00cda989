mod common;

use assert_matches::assert_matches;

use common::{MockFetcher, series_record};
use kira_geo::batch::{fetch_all, fetch_requests};
use kira_geo::domain::{Accession, AccessionRequest, parse_accession_list};
use kira_geo::error::KiraError;

fn ids(count: usize) -> Vec<Accession> {
    (1..=count)
        .map(|index| format!("GSM{index}").parse().unwrap())
        .collect()
}

#[test]
fn failures_are_isolated_per_accession() {
    let fetcher = MockFetcher::new()
        .failing("GSM2")
        .failing("GSM5")
        .failing("GSM9");
    let ids = ids(10);

    let result = fetch_all(&fetcher, &ids, true, 4).unwrap();
    assert_eq!(result.len(), 10);
    assert_eq!(fetcher.calls(), 10);

    let order: Vec<_> = result.entries().iter().map(|entry| entry.id.clone()).collect();
    assert_eq!(order, ids);

    let ok = result.entries().iter().filter(|entry| entry.result.is_ok()).count();
    assert_eq!(ok, 7);

    let failed: Vec<&str> = result.errors().map(|(id, _)| id.as_str()).collect();
    assert_eq!(failed, ["GSM2", "GSM5", "GSM9"]);
    for (id, err) in result.errors() {
        assert_matches!(err, KiraError::Fetch { id: tagged, .. } if tagged == id.as_str());
    }

    let records = result.records();
    assert_eq!(records.len(), 7);
    assert!(records.get("GSM2").is_none());
    assert_eq!(records.get("GSM10").unwrap().accession(), Some("GSM10"));
}

#[test]
fn single_worker_gives_the_same_result() {
    let fetcher = MockFetcher::new().failing("GSM3");
    let ids = ids(5);

    let sequential = fetch_all(&fetcher, &ids, true, 1).unwrap();
    let parallel = fetch_all(&fetcher, &ids, true, 5).unwrap();
    let sequential = serde_json::to_value(&sequential).unwrap();
    let parallel = serde_json::to_value(&parallel).unwrap();
    assert_eq!(sequential, parallel);
    assert!(sequential["GSM3"]["error"].as_str().unwrap().contains("GSM3"));
}

#[test]
fn zero_parallelism_is_rejected() {
    let fetcher = MockFetcher::new();
    assert_matches!(
        fetch_all(&fetcher, &ids(2), true, 0),
        Err(KiraError::InvalidParallelism(0))
    );
    assert_eq!(fetcher.calls(), 0);
}

#[test]
fn include_children_is_passed_per_request() {
    let series = series_record("GSE1", &[], &[("GSM1", vec!["ftp://h/a.txt"])]);
    let fetcher = MockFetcher::new()
        .with_record("GSE1", series.clone())
        .with_record("GSE2", series_record("GSE2", &[], &[("GSM2", vec![])]));
    let requests = vec![
        AccessionRequest {
            id: "GSE1".parse().unwrap(),
            include_children: true,
        },
        AccessionRequest {
            id: "GSE2".parse().unwrap(),
            include_children: false,
        },
    ];

    let records = fetch_requests(&fetcher, &requests, 2).unwrap().records();
    assert_eq!(records.get("GSE1"), Some(&series));
    assert!(records.get("GSE2").unwrap().sub_records().is_none());
}

#[test]
fn empty_request_list() {
    let fetcher = MockFetcher::new();
    let ids = parse_accession_list(" , ").unwrap();
    let result = fetch_all(&fetcher, &ids, true, 3).unwrap();
    assert!(result.is_empty());
}

#[test]
fn repeated_accessions_are_fetched_once() {
    let fetcher = MockFetcher::new();
    let requests: Vec<AccessionRequest> = ["GSE1", "GSM2", "gse1", "GSM2"]
        .iter()
        .enumerate()
        .map(|(index, id)| AccessionRequest {
            id: id.parse().unwrap(),
            include_children: index == 2,
        })
        .collect();

    let result = fetch_requests(&fetcher, &requests, 2).unwrap();
    assert_eq!(fetcher.calls(), 2);
    let order: Vec<&str> = result.entries().iter().map(|entry| entry.id.as_str()).collect();
    assert_eq!(order, ["GSE1", "GSM2"]);
}
