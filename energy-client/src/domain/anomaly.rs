use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Categorized anomaly kinds. Plain out-of-threshold values are not a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AnomalyKind {
    Missing,
    Spike,
    Flat,
}

impl AnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Missing => "MISSING",
            Self::Spike => "SPIKE",
            Self::Flat => "FLAT",
        }
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {what} '{value}'")]
pub struct ParseKindError {
    what: &'static str,
    value: String,
}

impl FromStr for AnomalyKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MISSING" => Ok(Self::Missing),
            "SPIKE" => Ok(Self::Spike),
            "FLAT" => Ok(Self::Flat),
            _ => Err(ParseKindError {
                what: "anomaly kind",
                value: s.to_string(),
            }),
        }
    }
}

/// Review state of a stored anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalyStatus {
    Open,
    Corrected,
    Dismissed,
}

impl AnomalyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Corrected => "corrected",
            Self::Dismissed => "dismissed",
        }
    }
}

impl FromStr for AnomalyStatus {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "corrected" => Ok(Self::Corrected),
            "dismissed" => Ok(Self::Dismissed),
            _ => Err(ParseKindError {
                what: "anomaly status",
                value: s.to_string(),
            }),
        }
    }
}

/// Row of the `anomalies` table. `kind` and `status` are kept as text columns.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Anomaly {
    pub id: i64,
    pub meter_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub kind: String,
    pub delta_pct: Option<f64>,
    pub status: String,
    pub comment: Option<String>,
    pub corrected_value: Option<f64>,
}

impl Anomaly {
    pub fn kind(&self) -> Result<AnomalyKind, ParseKindError> {
        self.kind.parse()
    }

    pub fn status(&self) -> Result<AnomalyStatus, ParseKindError> {
        self.status.parse()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAnomaly {
    pub meter_id: String,
    pub ts: OffsetDateTime,
    pub kind: AnomalyKind,
    pub delta_pct: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("spike".parse::<AnomalyKind>(), Ok(AnomalyKind::Spike));
        assert_eq!(" FLAT ".parse::<AnomalyKind>(), Ok(AnomalyKind::Flat));
        assert!("OUT_OF_RANGE".parse::<AnomalyKind>().is_err());
    }

    #[test]
    fn kind_displays_as_stored_text() {
        assert_eq!(AnomalyKind::Missing.to_string(), "MISSING");
        assert_eq!(AnomalyStatus::Corrected.as_str(), "corrected");
    }

    #[test]
    fn stored_anomaly_exposes_typed_state() {
        let a = Anomaly {
            id: 7,
            meter_id: "m-1".to_string(),
            ts: time::macros::datetime!(2024-01-01 00:00:00 UTC),
            kind: "SPIKE".to_string(),
            delta_pct: Some(52.0),
            status: "open".to_string(),
            comment: None,
            corrected_value: None,
        };
        assert_eq!(a.kind(), Ok(AnomalyKind::Spike));
        assert_eq!(a.status(), Ok(AnomalyStatus::Open));
    }
}
