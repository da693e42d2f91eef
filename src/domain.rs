use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

static STUDY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(MGYS\d{8}|[EDS]RP\d+|PRJ[EDN][A-Z]\d+)$").unwrap());
static SAMPLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([EDS]RS\d+|SAM[EDN][A-Z]?\d+)$").unwrap());
static RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[EDS]RR\d+$").unwrap());
static ASSEMBLY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(ERZ\d+|GCA_\d+\.\d+|[A-Z]{4,6}\d{2}(\d{6,})?(\.\d+)?)$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Study,
    Sample,
    Run,
    Assembly,
    #[value(name = "analysis")]
    AnalysisJob,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Study => "study",
            EntityKind::Sample => "sample",
            EntityKind::Run => "run",
            EntityKind::Assembly => "assembly",
            EntityKind::AnalysisJob => "analysis",
        }
    }

    pub fn parse_accession(&self, value: &str) -> Result<String, CatalogError> {
        let normalized = value.trim().to_uppercase();
        let regex: &Regex = match self {
            EntityKind::Study => &*STUDY_RE,
            EntityKind::Sample => &*SAMPLE_RE,
            EntityKind::Run => &*RUN_RE,
            EntityKind::Assembly => &*ASSEMBLY_RE,
            EntityKind::AnalysisJob => {
                return normalized.parse::<AnalysisAccession>().map(|acc| acc.to_string());
            }
        };
        if regex.is_match(&normalized) {
            return Ok(normalized);
        }
        let raw = value.to_string();
        Err(match self {
            EntityKind::Study => CatalogError::InvalidStudyAccession(raw),
            EntityKind::Sample => CatalogError::InvalidSampleAccession(raw),
            EntityKind::Run => CatalogError::InvalidRunAccession(raw),
            EntityKind::Assembly | EntityKind::AnalysisJob => {
                CatalogError::InvalidAssemblyAccession(raw)
            }
        })
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnalysisAccession(u64);

impl AnalysisAccession {
    pub fn new(job_id: u64) -> Self {
        Self(job_id)
    }

    pub fn job_id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for AnalysisAccession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MGYA{:08}", self.0)
    }
}

impl FromStr for AnalysisAccession {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        let digits = normalized
            .strip_prefix("MGYA")
            .ok_or_else(|| CatalogError::InvalidAnalysisAccession(value.to_string()))?;
        if digits.len() < 8 || !digits.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(CatalogError::InvalidAnalysisAccession(value.to_string()));
        }
        digits
            .parse()
            .map(Self)
            .map_err(|_| CatalogError::InvalidAnalysisAccession(value.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EnaStatus {
    Private,
    Cancelled,
    Public,
    Suppressed,
    Killed,
}

impl EnaStatus {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 | 2 => Some(EnaStatus::Private),
            3 => Some(EnaStatus::Cancelled),
            4 => Some(EnaStatus::Public),
            5 | 7 => Some(EnaStatus::Suppressed),
            6 | 8 => Some(EnaStatus::Killed),
            _ => None,
        }
    }

    pub fn suppression_reason(&self) -> Option<SuppressionReason> {
        match self {
            EnaStatus::Cancelled => Some(SuppressionReason::Cancelled),
            EnaStatus::Suppressed => Some(SuppressionReason::Suppressed),
            EnaStatus::Killed => Some(SuppressionReason::Killed),
            EnaStatus::Private | EnaStatus::Public => None,
        }
    }
}

impl FromStr for EnaStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if let Ok(code) = trimmed.parse::<u8>() {
            return Self::from_code(code).ok_or_else(|| trimmed.to_string());
        }
        match trimmed.to_uppercase().as_str() {
            "DRAFT" | "PRIVATE" => Ok(EnaStatus::Private),
            "CANCELLED" => Ok(EnaStatus::Cancelled),
            "PUBLIC" => Ok(EnaStatus::Public),
            "SUPPRESSED" | "TEMPORARY_SUPPRESSED" => Ok(EnaStatus::Suppressed),
            "KILLED" | "TEMPORARY_KILLED" => Ok(EnaStatus::Killed),
            _ => Err(trimmed.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionReason {
    Killed,
    Cancelled,
    Suppressed,
    AncestorSuppressed,
}

impl fmt::Display for SuppressionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuppressionReason::Killed => write!(f, "killed"),
            SuppressionReason::Cancelled => write!(f, "cancelled"),
            SuppressionReason::Suppressed => write!(f, "suppressed"),
            SuppressionReason::AncestorSuppressed => write!(f, "ancestor_suppressed"),
        }
    }
}
