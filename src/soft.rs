use crate::domain::Accession;
use crate::error::KiraError;
use crate::record::MetadataRecord;

enum Entity {
    Series,
    Sample(usize),
    Other,
}

/// Parses GEO SOFT text into the record for `accession`.
///
/// `^SERIES` and `^SAMPLE` lines open an entity, `!Series_<field> = value` and
/// `!Sample_<field> = value` lines append to it. Samples found in a family file
/// become the series' sub-records when `include_children` is set.
pub fn parse_record(
    text: &str,
    accession: &Accession,
    include_children: bool,
) -> Result<MetadataRecord, KiraError> {
    let mut series: Option<(String, MetadataRecord)> = None;
    let mut samples: Vec<(String, MetadataRecord)> = Vec::new();
    let mut current = Entity::Other;

    for line in text.lines() {
        let line = line.trim_end();
        if let Some(rest) = line.strip_prefix('^') {
            let (kind, id) = split_assignment(rest)
                .ok_or_else(|| KiraError::SoftParse(format!("bad entity line: {line}")))?;
            current = match kind.to_ascii_uppercase().as_str() {
                "SERIES" => {
                    series = Some((id.to_string(), MetadataRecord::new()));
                    Entity::Series
                }
                "SAMPLE" => {
                    samples.push((id.to_string(), MetadataRecord::new()));
                    Entity::Sample(samples.len() - 1)
                }
                _ => Entity::Other,
            };
            continue;
        }
        let Some(rest) = line.strip_prefix('!') else {
            continue;
        };
        let Some((key, value)) = split_assignment(rest) else {
            continue;
        };
        match current {
            Entity::Series => {
                if let (Some(field), Some((_, record))) =
                    (key.strip_prefix("Series_"), series.as_mut())
                {
                    record.push_value(field, value);
                }
            }
            Entity::Sample(index) => {
                if let Some(field) = key.strip_prefix("Sample_") {
                    samples[index].1.push_value(field, value);
                }
            }
            Entity::Other => {}
        }
    }

    match accession {
        Accession::Series(id) => {
            let (_, mut record) = series
                .filter(|(found, _)| found.eq_ignore_ascii_case(id))
                .ok_or_else(|| KiraError::SoftParse(format!("series {id} not found")))?;
            if include_children {
                record.ensure_sub_records();
                for (sample_id, sample) in samples {
                    record.push_sub_record(sample_id, sample);
                }
            }
            Ok(record)
        }
        Accession::Sample(id) => samples
            .into_iter()
            .find(|(found, _)| found.eq_ignore_ascii_case(id))
            .map(|(_, record)| record)
            .ok_or_else(|| KiraError::SoftParse(format!("sample {id} not found"))),
    }
}

fn split_assignment(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once('=')?;
    Some((key.trim(), value.trim()))
}
