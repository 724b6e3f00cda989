mod common;

use assert_matches::assert_matches;
use serde_json::json;

use common::{sample_record, series_record};
use kira_geo::domain::Accession;
use kira_geo::error::KiraError;
use kira_geo::record::{MetadataRecord, RecordBatch};
use kira_geo::tree::FileTree;

fn acc(id: &str) -> Accession {
    id.parse().unwrap()
}

#[test]
fn build_preserves_input_order() {
    let mut batch = RecordBatch::new();
    batch.push("GSE3", series_record("GSE3", &["ftp://h/GSE3_raw.tar"], &[]));
    batch.push("GSM9", sample_record("GSM9", &["ftp://h/GSM9.txt"]));
    batch.push(
        "GSE1",
        series_record(
            "GSE1",
            &[],
            &[("GSM2", vec!["ftp://h/b.txt"]), ("GSM1", vec!["ftp://h/a.txt"])],
        ),
    );

    let tree = FileTree::build(&batch).unwrap();
    let series: Vec<_> = tree.series.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(series, ["GSE3", "GSE1"]);
    let samples: Vec<_> = tree.series[1].samples.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(samples, ["GSM2", "GSM1"]);
    assert_eq!(tree.orphans.len(), 1);
    assert_eq!(tree.orphans[0].id, acc("GSM9"));
}

#[test]
fn children_match_sub_records_one_to_one() {
    let mut batch = RecordBatch::new();
    batch.push(
        "GSE1",
        series_record("GSE1", &[], &[("GSM1", vec![]), ("GSM2", vec!["ftp://h/x.bw"])]),
    );
    let tree = FileTree::build(&batch).unwrap();
    let series = &tree.series[0];
    assert_eq!(series.samples.len(), 2);
    assert!(series.samples[0].files.is_empty());
    assert_eq!(series.samples[1].files, ["ftp://h/x.bw"]);
    assert!(tree.orphans.is_empty());
}

#[test]
fn duplicate_references_are_kept() {
    let record = MetadataRecord::new().with_field(
        "supplementary_file",
        ["ftp://h/GSE1_a.txt", "ftp://h/GSE1_a.txt"],
    );
    let mut batch = RecordBatch::new();
    batch.push("GSE1", record);
    let tree = FileTree::build(&batch).unwrap();
    assert_eq!(tree.series[0].files.len(), 2);
}

#[test]
fn samples_only_batch_is_all_orphans() {
    let mut batch = RecordBatch::new();
    batch.push("GSM1", sample_record("GSM1", &["ftp://h/1.txt"]));
    batch.push("GSM2", sample_record("GSM2", &[]));
    let tree = FileTree::build(&batch).unwrap();
    assert!(tree.series.is_empty());
    assert_eq!(tree.orphans.len(), 2);
    assert!(tree.orphans[1].files.is_empty());
}

#[test]
fn unknown_prefix_is_malformed() {
    let mut batch = RecordBatch::new();
    batch.push("GSE1", series_record("GSE1", &[], &[]));
    batch.push("GPL570", MetadataRecord::new());
    let err = FileTree::build(&batch).unwrap_err();
    assert_matches!(err, KiraError::MalformedRecord { id, .. } if id == "GPL570");
}

#[test]
fn sample_cannot_belong_to_two_series() {
    let mut batch = RecordBatch::new();
    batch.push("GSE1", series_record("GSE1", &[], &[("GSM1", vec![])]));
    batch.push("GSE2", series_record("GSE2", &[], &[("GSM1", vec![])]));
    let err = FileTree::build(&batch).unwrap_err();
    assert_matches!(err, KiraError::MalformedRecord { id, .. } if id == "GSE2");
}

#[test]
fn series_sub_record_must_be_a_sample() {
    let record = MetadataRecord::new().with_sub_record("GSE9", MetadataRecord::new());
    let mut batch = RecordBatch::new();
    batch.push("GSE1", record);
    assert_matches!(
        FileTree::build(&batch),
        Err(KiraError::MalformedRecord { .. })
    );
}

#[test]
fn listing_uses_base_names() {
    let mut batch = RecordBatch::new();
    batch.push(
        "GSE1",
        series_record(
            "GSE1",
            &["ftp://h/suppl/GSE1_RAW.tar"],
            &[("GSM1", vec!["ftp://h/GSM1/a.tsv.gz"])],
        ),
    );
    batch.push("GSM5", sample_record("GSM5", &["ftp://h/GSM5/b.txt"]));
    let tree = FileTree::build(&batch).unwrap();
    let listing = serde_json::to_value(tree.listing()).unwrap();
    assert_eq!(
        listing,
        json!({
            "series": {
                "GSE1": {
                    "files": ["GSE1_RAW.tar"],
                    "samples": { "GSM1": ["a.tsv.gz"] }
                }
            },
            "orphans": { "GSM5": ["b.txt"] }
        })
    );
}
