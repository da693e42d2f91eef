use std::collections::BTreeMap;
use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, NaiveDate, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tempfile::Builder;

use crate::error::CatalogError;
use crate::model::{
    AnalysisJob, AnalysisTarget, Assembly, DownloadFile, EntityRef, Record, Run, Sample, Study,
    SuppressionState,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub studies: BTreeMap<u64, Study>,
    #[serde(default)]
    pub samples: BTreeMap<u64, Sample>,
    #[serde(default)]
    pub runs: BTreeMap<u64, Run>,
    #[serde(default)]
    pub assemblies: BTreeMap<u64, Assembly>,
    #[serde(default)]
    pub analyses: BTreeMap<u64, AnalysisJob>,
    #[serde(default)]
    pub downloads: BTreeMap<u64, DownloadFile>,
}

pub trait Table: Record + Sized {
    fn table(catalog: &Catalog) -> &BTreeMap<u64, Self>;
    fn table_mut(catalog: &mut Catalog) -> &mut BTreeMap<u64, Self>;
}

impl Table for Study {
    fn table(catalog: &Catalog) -> &BTreeMap<u64, Self> {
        &catalog.studies
    }

    fn table_mut(catalog: &mut Catalog) -> &mut BTreeMap<u64, Self> {
        &mut catalog.studies
    }
}

impl Table for Sample {
    fn table(catalog: &Catalog) -> &BTreeMap<u64, Self> {
        &catalog.samples
    }

    fn table_mut(catalog: &mut Catalog) -> &mut BTreeMap<u64, Self> {
        &mut catalog.samples
    }
}

impl Table for Run {
    fn table(catalog: &Catalog) -> &BTreeMap<u64, Self> {
        &catalog.runs
    }

    fn table_mut(catalog: &mut Catalog) -> &mut BTreeMap<u64, Self> {
        &mut catalog.runs
    }
}

impl Table for Assembly {
    fn table(catalog: &Catalog) -> &BTreeMap<u64, Self> {
        &catalog.assemblies
    }

    fn table_mut(catalog: &mut Catalog) -> &mut BTreeMap<u64, Self> {
        &mut catalog.assemblies
    }
}

impl Table for AnalysisJob {
    fn table(catalog: &Catalog) -> &BTreeMap<u64, Self> {
        &catalog.analyses
    }

    fn table_mut(catalog: &mut Catalog) -> &mut BTreeMap<u64, Self> {
        &mut catalog.analyses
    }
}

impl Catalog {
    pub fn insert<E: Table>(&mut self, record: E) {
        E::table_mut(self).insert(record.id(), record);
    }

    pub fn insert_download(&mut self, download: DownloadFile) {
        self.downloads.insert(download.id, download);
    }

    pub fn get<E: Table>(&self, id: u64) -> Option<&E> {
        E::table(self).get(&id)
    }

    pub fn find_by_accession<E: Table>(&self, accession: &str) -> Option<&E> {
        E::table(self)
            .values()
            .find(|record| record.accession().eq_ignore_ascii_case(accession))
    }

    pub fn state(&self, entity: EntityRef) -> Option<&SuppressionState> {
        match entity {
            EntityRef::Study(id) => self.studies.get(&id).map(|r| &r.state),
            EntityRef::Sample(id) => self.samples.get(&id).map(|r| &r.state),
            EntityRef::Run(id) => self.runs.get(&id).map(|r| &r.state),
            EntityRef::Assembly(id) => self.assemblies.get(&id).map(|r| &r.state),
            EntityRef::AnalysisJob(id) => self.analyses.get(&id).map(|r| &r.state),
        }
    }

    fn state_mut(&mut self, entity: EntityRef) -> Option<&mut SuppressionState> {
        match entity {
            EntityRef::Study(id) => self.studies.get_mut(&id).map(|r| &mut r.state),
            EntityRef::Sample(id) => self.samples.get_mut(&id).map(|r| &mut r.state),
            EntityRef::Run(id) => self.runs.get_mut(&id).map(|r| &mut r.state),
            EntityRef::Assembly(id) => self.assemblies.get_mut(&id).map(|r| &mut r.state),
            EntityRef::AnalysisJob(id) => self.analyses.get_mut(&id).map(|r| &mut r.state),
        }
    }

    pub fn effective_state<'a>(
        &'a self,
        entity: EntityRef,
        pending: &'a ChangeSet,
    ) -> Option<&'a SuppressionState> {
        pending.state(entity).or_else(|| self.state(entity))
    }

    pub fn sequence_accession(&self, job: &AnalysisJob) -> Option<&str> {
        match job.target {
            AnalysisTarget::Run(id) => self.runs.get(&id).map(|run| run.accession.as_str()),
            AnalysisTarget::Assembly(id) => self
                .assemblies
                .get(&id)
                .map(|assembly| assembly.accession.as_str()),
        }
    }

    pub fn bulk_update(&mut self, changes: &ChangeSet) -> usize {
        let mut changed = std::collections::BTreeSet::new();

        for (entity, next) in &changes.states {
            let Some(state) = self.state_mut(*entity) else {
                continue;
            };
            if state != next {
                *state = next.clone();
                changed.insert(*entity);
                if let EntityRef::AnalysisJob(id) = entity {
                    if let Some(job) = self.analyses.get_mut(id) {
                        job.last_update = changes.updated_at;
                    }
                }
            }
        }

        for (id, date) in &changes.release_dates {
            if let Some(study) = self.studies.get_mut(id) {
                if study.public_release_date != *date {
                    study.public_release_date = *date;
                    changed.insert(EntityRef::Study(*id));
                }
            }
        }

        for (id, mark) in &changes.registry {
            if let Some(job) = self.analyses.get_mut(id) {
                let mut dirty = false;
                if let Some(accession) = &mark.mgx_accession {
                    if job.mgx_accession.as_ref() != Some(accession) {
                        job.mgx_accession = Some(accession.clone());
                        dirty = true;
                    }
                }
                if job.last_mgx_indexed != Some(mark.indexed_at) {
                    job.last_mgx_indexed = Some(mark.indexed_at);
                    dirty = true;
                }
                if dirty {
                    changed.insert(EntityRef::AnalysisJob(*id));
                }
            }
        }

        changed.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryMark {
    pub mgx_accession: Option<String>,
    pub indexed_at: DateTime<Utc>,
}

/// Writes queued for one page. Each batch job only fills the fields it owns:
/// the ENA sync touches suppression state and release dates, the registry sync
/// touches registry bookkeeping.
#[derive(Debug, Clone)]
pub struct ChangeSet {
    states: BTreeMap<EntityRef, SuppressionState>,
    release_dates: BTreeMap<u64, Option<NaiveDate>>,
    registry: BTreeMap<u64, RegistryMark>,
    updated_at: DateTime<Utc>,
}

impl ChangeSet {
    pub fn new(updated_at: DateTime<Utc>) -> Self {
        Self {
            states: BTreeMap::new(),
            release_dates: BTreeMap::new(),
            registry: BTreeMap::new(),
            updated_at,
        }
    }

    pub fn set_state(&mut self, entity: EntityRef, state: SuppressionState) {
        self.states.insert(entity, state);
    }

    pub fn state(&self, entity: EntityRef) -> Option<&SuppressionState> {
        self.states.get(&entity)
    }

    pub fn set_release_date(&mut self, study_id: u64, date: Option<NaiveDate>) {
        self.release_dates.insert(study_id, date);
    }

    pub fn mark_indexed(&mut self, job_id: u64, mark: RegistryMark) {
        self.registry.insert(job_id, mark);
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty() && self.release_dates.is_empty() && self.registry.is_empty()
    }
}

pub trait Checkpoint {
    fn commit(&self, catalog: &Catalog) -> Result<(), CatalogError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InMemory;

impl Checkpoint for InMemory {
    fn commit(&self, _catalog: &Catalog) -> Result<(), CatalogError> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Store {
    path: Utf8PathBuf,
}

impl Store {
    pub fn new(path: Utf8PathBuf) -> Self {
        Self { path }
    }

    pub fn default_path() -> Result<Utf8PathBuf, CatalogError> {
        ProjectDirs::from("org", "EMBL-EBI", "mgnify-catalog")
            .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.data_dir().join("catalog.json")).ok())
            .ok_or_else(|| CatalogError::Filesystem("unable to resolve data directory".to_string()))
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn load(&self) -> Result<Catalog, CatalogError> {
        if !self.path.as_std_path().exists() {
            return Err(CatalogError::MissingCatalog(self.path.clone().into_std_path_buf()));
        }
        let content = fs::read_to_string(self.path.as_std_path())
            .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
        serde_json::from_str(&content).map_err(|err| CatalogError::CatalogParse(err.to_string()))
    }

    pub fn save(&self, catalog: &Catalog) -> Result<(), CatalogError> {
        let content = serde_json::to_vec_pretty(catalog)
            .map_err(|err| CatalogError::CatalogParse(err.to_string()))?;
        write_bytes_atomic(&self.path, &content)
    }
}

impl Checkpoint for Store {
    fn commit(&self, catalog: &Catalog) -> Result<(), CatalogError> {
        self.save(catalog)
    }
}

pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), CatalogError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
    let mut temp = Builder::new()
        .prefix("mgnify-catalog")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
    Ok(())
}
