use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{AnalysisAccession, EntityKind, SuppressionReason};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuppressionState {
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub is_suppressed: bool,
    #[serde(default)]
    pub suppression_reason: Option<SuppressionReason>,
    #[serde(default)]
    pub suppressed_at: Option<DateTime<Utc>>,
}

impl SuppressionState {
    pub fn public() -> Self {
        Self::default()
    }

    pub fn private() -> Self {
        Self {
            is_private: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Study {
    pub id: u64,
    pub accession: String,
    pub secondary_accession: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub submission_account: Option<String>,
    #[serde(default)]
    pub public_release_date: Option<NaiveDate>,
    #[serde(flatten)]
    pub state: SuppressionState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub id: u64,
    pub accession: String,
    #[serde(default)]
    pub primary_accession: Option<String>,
    #[serde(default)]
    pub studies: BTreeSet<u64>,
    #[serde(default)]
    pub submission_account: Option<String>,
    #[serde(flatten)]
    pub state: SuppressionState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: u64,
    pub accession: String,
    #[serde(default)]
    pub secondary_accession: Option<String>,
    #[serde(default)]
    pub study: Option<u64>,
    #[serde(default)]
    pub sample: Option<u64>,
    #[serde(default)]
    pub experiment_type: Option<String>,
    #[serde(flatten)]
    pub state: SuppressionState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assembly {
    pub id: u64,
    pub accession: String,
    #[serde(default)]
    pub legacy_accession: Option<String>,
    #[serde(default)]
    pub study: Option<u64>,
    #[serde(default)]
    pub runs: BTreeSet<u64>,
    #[serde(default)]
    pub samples: BTreeSet<u64>,
    #[serde(flatten)]
    pub state: SuppressionState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "id")]
pub enum AnalysisTarget {
    Run(u64),
    Assembly(u64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub id: u64,
    pub study: u64,
    #[serde(default)]
    pub sample: Option<u64>,
    pub target: AnalysisTarget,
    pub pipeline_version: String,
    pub last_update: DateTime<Utc>,
    #[serde(default)]
    pub mgx_accession: Option<String>,
    #[serde(default)]
    pub last_mgx_indexed: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub state: SuppressionState,
}

impl AnalysisJob {
    pub fn accession(&self) -> AnalysisAccession {
        AnalysisAccession::new(self.id)
    }

    pub fn is_mgx_indexable(&self) -> bool {
        if self.state.is_suppressed {
            return false;
        }
        match self.last_mgx_indexed {
            None => true,
            Some(indexed) => indexed < self.last_update,
        }
    }

    pub fn is_mgx_removable(&self) -> bool {
        let Some(indexed) = self.last_mgx_indexed else {
            return false;
        };
        if !self.state.is_suppressed {
            return false;
        }
        self.state.suppressed_at.unwrap_or(self.last_update) > indexed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "id")]
pub enum DownloadParent {
    Study(u64),
    Sample(u64),
    Run(u64),
    Analysis(u64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadFile {
    pub id: u64,
    pub alias: String,
    pub parent: DownloadParent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum EntityRef {
    Study(u64),
    Sample(u64),
    Run(u64),
    Assembly(u64),
    AnalysisJob(u64),
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: u64) -> Self {
        match kind {
            EntityKind::Study => EntityRef::Study(id),
            EntityKind::Sample => EntityRef::Sample(id),
            EntityKind::Run => EntityRef::Run(id),
            EntityKind::Assembly => EntityRef::Assembly(id),
            EntityKind::AnalysisJob => EntityRef::AnalysisJob(id),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            EntityRef::Study(_) => EntityKind::Study,
            EntityRef::Sample(_) => EntityKind::Sample,
            EntityRef::Run(_) => EntityKind::Run,
            EntityRef::Assembly(_) => EntityKind::Assembly,
            EntityRef::AnalysisJob(_) => EntityKind::AnalysisJob,
        }
    }

    pub fn id(&self) -> u64 {
        match self {
            EntityRef::Study(id)
            | EntityRef::Sample(id)
            | EntityRef::Run(id)
            | EntityRef::Assembly(id)
            | EntityRef::AnalysisJob(id) => *id,
        }
    }
}

pub trait Record {
    const KIND: EntityKind;

    fn id(&self) -> u64;
    fn accession(&self) -> String;
    fn state(&self) -> &SuppressionState;

    fn entity_ref(&self) -> EntityRef {
        EntityRef::new(Self::KIND, self.id())
    }
}

impl Record for Study {
    const KIND: EntityKind = EntityKind::Study;

    fn id(&self) -> u64 {
        self.id
    }

    fn accession(&self) -> String {
        self.accession.clone()
    }

    fn state(&self) -> &SuppressionState {
        &self.state
    }
}

impl Record for Sample {
    const KIND: EntityKind = EntityKind::Sample;

    fn id(&self) -> u64 {
        self.id
    }

    fn accession(&self) -> String {
        self.accession.clone()
    }

    fn state(&self) -> &SuppressionState {
        &self.state
    }
}

impl Record for Run {
    const KIND: EntityKind = EntityKind::Run;

    fn id(&self) -> u64 {
        self.id
    }

    fn accession(&self) -> String {
        self.accession.clone()
    }

    fn state(&self) -> &SuppressionState {
        &self.state
    }
}

impl Record for Assembly {
    const KIND: EntityKind = EntityKind::Assembly;

    fn id(&self) -> u64 {
        self.id
    }

    fn accession(&self) -> String {
        self.accession.clone()
    }

    fn state(&self) -> &SuppressionState {
        &self.state
    }
}

impl Record for AnalysisJob {
    const KIND: EntityKind = EntityKind::AnalysisJob;

    fn id(&self) -> u64 {
        self.id
    }

    fn accession(&self) -> String {
        AnalysisJob::accession(self).to_string()
    }

    fn state(&self) -> &SuppressionState {
        &self.state
    }
}
