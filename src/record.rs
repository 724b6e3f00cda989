use std::sync::LazyLock;

use regex::Regex;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::KiraError;

pub const SERIES_FILE_FIELD: &str = "supplementary_file";
pub const SUB_RECORDS_FIELD: &str = "sub_records";
pub const ACCESSION_FIELD: &str = "geo_accession";
/// Slot value GEO uses for "this sample has no supplementary file".
pub const NO_FILE: &str = "NONE";

static FILE_SLOT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^supplementary_file_\d+$").unwrap());

pub fn is_file_slot(name: &str) -> bool {
    FILE_SLOT.is_match(name)
}

/// Metadata for one accession. Every raw field holds a list of strings, in the
/// order the fields were first seen. Series records may carry their samples'
/// records under `sub_records`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataRecord {
    fields: Vec<(String, Vec<String>)>,
    sub_records: Option<Vec<(String, MetadataRecord)>>,
}

impl MetadataRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field<I, S>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for value in values {
            self.push_value(name, value);
        }
        if self.field(name).is_none() {
            self.fields.push((name.to_string(), Vec::new()));
        }
        self
    }

    pub fn with_sub_record(mut self, id: impl Into<String>, record: MetadataRecord) -> Self {
        self.push_sub_record(id, record);
        self
    }

    pub fn push_value(&mut self, name: &str, value: impl Into<String>) {
        match self.fields.iter_mut().find(|(key, _)| key == name) {
            Some((_, values)) => values.push(value.into()),
            None => self.fields.push((name.to_string(), vec![value.into()])),
        }
    }

    pub fn push_sub_record(&mut self, id: impl Into<String>, record: MetadataRecord) {
        self.sub_records
            .get_or_insert_with(Vec::new)
            .push((id.into(), record));
    }

    /// Marks the record as carrying children even when there are none.
    pub fn ensure_sub_records(&mut self) {
        self.sub_records.get_or_insert_with(Vec::new);
    }

    pub fn field(&self, name: &str) -> Option<&[String]> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, values)| values.as_slice())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.fields
            .iter()
            .map(|(key, values)| (key.as_str(), values.as_slice()))
    }

    pub fn accession(&self) -> Option<&str> {
        self.field(ACCESSION_FIELD)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Series-level declared references.
    pub fn series_files(&self) -> &[String] {
        self.field(SERIES_FILE_FIELD).unwrap_or(&[])
    }

    /// Sample-level `supplementary_file_<N>` slots, in record order.
    pub fn file_slots(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.fields().filter(|(name, _)| is_file_slot(name))
    }

    pub fn sub_records(&self) -> Option<&[(String, MetadataRecord)]> {
        self.sub_records.as_deref()
    }

    /// Validates a JSON object into a record. `id` only labels errors.
    pub fn from_value(id: &str, value: &Value) -> Result<Self, KiraError> {
        let object = value.as_object().ok_or_else(|| KiraError::MalformedRecord {
            id: id.to_string(),
            reason: "record is not a JSON object".to_string(),
        })?;
        Self::from_object(id, object)
    }

    fn from_object(id: &str, object: &Map<String, Value>) -> Result<Self, KiraError> {
        let mut record = MetadataRecord::new();
        for (name, value) in object {
            if name == SUB_RECORDS_FIELD {
                let children = match value {
                    Value::Null => continue,
                    Value::Object(children) => children,
                    _ => {
                        return Err(KiraError::MalformedRecord {
                            id: id.to_string(),
                            reason: format!("`{SUB_RECORDS_FIELD}` must be an object"),
                        });
                    }
                };
                record.ensure_sub_records();
                for (child_id, child) in children {
                    let child = Self::from_value(child_id, child)?;
                    record.push_sub_record(child_id.clone(), child);
                }
                continue;
            }
            let values = field_values(id, name, value)?;
            record.fields.push((name.clone(), values));
        }
        Ok(record)
    }
}

fn field_values(id: &str, name: &str, value: &Value) -> Result<Vec<String>, KiraError> {
    let malformed = || KiraError::MalformedRecord {
        id: id.to_string(),
        reason: format!("field `{name}` must be a string or a list of strings"),
    };
    match value {
        Value::Null => Ok(Vec::new()),
        Value::String(text) => Ok(vec![text.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string).ok_or_else(malformed))
            .collect(),
        _ => Err(malformed()),
    }
}

impl Serialize for MetadataRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = self.fields.len() + usize::from(self.sub_records.is_some());
        let mut map = serializer.serialize_map(Some(len))?;
        for (name, values) in &self.fields {
            map.serialize_entry(name, values)?;
        }
        if let Some(children) = &self.sub_records {
            map.serialize_entry(SUB_RECORDS_FIELD, &OrderedRecords(children))?;
        }
        map.end()
    }
}

struct OrderedRecords<'a>(&'a [(String, MetadataRecord)]);

impl Serialize for OrderedRecords<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(id, record)| (id, record)))
    }
}

/// Records keyed by the accession they were fetched for, in request order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordBatch {
    entries: Vec<(String, MetadataRecord)>,
}

impl RecordBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record, replacing the one already stored under `id` in place.
    pub fn push(&mut self, id: impl Into<String>, record: MetadataRecord) {
        let id = id.into();
        match self.entries.iter_mut().find(|(key, _)| *key == id) {
            Some((_, existing)) => *existing = record,
            None => self.entries.push((id, record)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetadataRecord)> {
        self.entries
            .iter()
            .map(|(id, record)| (id.as_str(), record))
    }

    pub fn get(&self, id: &str) -> Option<&MetadataRecord> {
        self.entries
            .iter()
            .find(|(key, _)| key == id)
            .map(|(_, record)| record)
    }

    pub fn from_json_str(text: &str) -> Result<Self, KiraError> {
        let value: Value =
            serde_json::from_str(text).map_err(|err| KiraError::ConfigParse(err.to_string()))?;
        let object = value.as_object().ok_or_else(|| KiraError::MalformedRecord {
            id: "<batch>".to_string(),
            reason: "metadata batch must be a JSON object keyed by accession".to_string(),
        })?;
        object
            .iter()
            .map(|(id, record)| Ok((id.clone(), MetadataRecord::from_value(id, record)?)))
            .collect()
    }
}

impl FromIterator<(String, MetadataRecord)> for RecordBatch {
    fn from_iter<T: IntoIterator<Item = (String, MetadataRecord)>>(iter: T) -> Self {
        let mut batch = Self::new();
        for (id, record) in iter {
            batch.push(id, record);
        }
        batch
    }
}

impl Serialize for RecordBatch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        OrderedRecords(&self.entries).serialize(serializer)
    }
}
