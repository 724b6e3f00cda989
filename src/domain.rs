use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::KiraError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessionKind {
    Series,
    Sample,
}

impl AccessionKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            AccessionKind::Series => "GSE",
            AccessionKind::Sample => "GSM",
        }
    }
}

impl fmt::Display for AccessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessionKind::Series => write!(f, "series"),
            AccessionKind::Sample => write!(f, "sample"),
        }
    }
}

/// A GEO accession tagged by its prefix: `GSE` series or `GSM` samples.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Accession {
    Series(String),
    Sample(String),
}

impl Accession {
    pub fn as_str(&self) -> &str {
        match self {
            Accession::Series(id) | Accession::Sample(id) => id,
        }
    }

    pub fn kind(&self) -> AccessionKind {
        match self {
            Accession::Series(_) => AccessionKind::Series,
            Accession::Sample(_) => AccessionKind::Sample,
        }
    }

    pub fn is_series(&self) -> bool {
        matches!(self, Accession::Series(_))
    }

    pub fn is_sample(&self) -> bool {
        matches!(self, Accession::Sample(_))
    }

    /// Numeric directory bucket used by the GEO FTP layout, e.g. `GSE102nnn`.
    pub fn ftp_bucket(&self) -> String {
        let prefix = self.kind().prefix();
        let digits = &self.as_str()[prefix.len()..];
        if digits.len() <= 3 {
            return format!("{prefix}nnn");
        }
        let head = &digits[..digits.len() - 3];
        format!("{prefix}{head}nnn")
    }
}

impl fmt::Display for Accession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Accession {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        let (kind, digits) = if let Some(rest) = normalized.strip_prefix("GSE") {
            (AccessionKind::Series, rest)
        } else if let Some(rest) = normalized.strip_prefix("GSM") {
            (AccessionKind::Sample, rest)
        } else {
            return Err(KiraError::InvalidAccession(value.to_string()));
        };
        if digits.is_empty() || !digits.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(KiraError::InvalidAccession(value.to_string()));
        }
        Ok(match kind {
            AccessionKind::Series => Accession::Series(normalized),
            AccessionKind::Sample => Accession::Sample(normalized),
        })
    }
}

impl Serialize for Accession {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Accession {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

/// An accession to fetch, and whether a series should bring its samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessionRequest {
    pub id: Accession,
    pub include_children: bool,
}

/// Splits a user-supplied list such as `"GSE1, GSM2 GSM3"` into accessions.
pub fn parse_accession_list(input: &str) -> Result<Vec<Accession>, KiraError> {
    input
        .split(|ch: char| ch == ',' || ch.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(str::parse)
        .collect()
}
