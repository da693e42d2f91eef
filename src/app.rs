use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::domain::{EntityKind, SuppressionReason};
use crate::ena::EnaClient;
use crate::error::CatalogError;
use crate::mgx::{MetagenomicsExchange, MgxTransport};
use crate::model::{AnalysisJob, Assembly, EntityRef, Record, Run, Sample, Study};
use crate::populate::{PopulateOptions, PopulateReport, populate_mgx};
use crate::store::{Catalog, ChangeSet, Checkpoint, Store, Table};
use crate::suppression;
use crate::sync::{SyncOptions, SyncReport, sync_kind};
use crate::visibility::{Caller, Visible, VisibilityFilter};

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub kind: EntityKind,
    pub records: Vec<ListEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListEntry {
    pub accession: String,
    pub is_private: bool,
    pub is_suppressed: bool,
    pub suppression_reason: Option<SuppressionReason>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnsuppressResult {
    pub kind: EntityKind,
    pub accession: String,
    pub changed: bool,
}

pub struct App<K: Checkpoint> {
    catalog: Catalog,
    checkpoint: K,
}

impl App<Store> {
    pub fn open(store: Store) -> Result<Self, CatalogError> {
        let catalog = store.load()?;
        info!(path = %store.path(), "catalog loaded");
        Ok(Self::new(catalog, store))
    }
}

impl<K: Checkpoint> App<K> {
    pub fn new(catalog: Catalog, checkpoint: K) -> Self {
        Self {
            catalog,
            checkpoint,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn sync(
        &mut self,
        kind: EntityKind,
        ena: &dyn EnaClient,
        options: &SyncOptions,
    ) -> Result<SyncReport, CatalogError> {
        sync_kind(kind, &mut self.catalog, ena, &self.checkpoint, options)
    }

    pub fn populate<T: MgxTransport>(
        &mut self,
        mgx: &MetagenomicsExchange<T>,
        options: &PopulateOptions,
    ) -> Result<PopulateReport, CatalogError> {
        populate_mgx(&mut self.catalog, mgx, &self.checkpoint, options)
    }

    pub fn unsuppress(
        &mut self,
        kind: EntityKind,
        accession: &str,
        now: DateTime<Utc>,
    ) -> Result<UnsuppressResult, CatalogError> {
        let accession = accession.trim();
        let entity = match kind {
            EntityKind::Study => locate::<Study>(&self.catalog, accession).or_else(|| {
                self.catalog
                    .studies
                    .values()
                    .find(|study| study.secondary_accession.eq_ignore_ascii_case(accession))
                    .map(Record::entity_ref)
            }),
            EntityKind::Sample => locate::<Sample>(&self.catalog, accession),
            EntityKind::Run => locate::<Run>(&self.catalog, accession),
            EntityKind::Assembly => locate::<Assembly>(&self.catalog, accession),
            EntityKind::AnalysisJob => locate::<AnalysisJob>(&self.catalog, accession),
        }
        .ok_or_else(|| CatalogError::EntityNotFound {
            kind: kind.to_string(),
            accession: accession.to_string(),
        })?;

        let Some(current) = self.catalog.state(entity) else {
            return Err(CatalogError::EntityNotFound {
                kind: kind.to_string(),
                accession: accession.to_string(),
            });
        };
        let next = suppression::unsuppress(current);

        let mut changes = ChangeSet::new(now);
        changes.set_state(entity, next);
        let changed = self.catalog.bulk_update(&changes) > 0;
        if changed {
            self.checkpoint.commit(&self.catalog)?;
            info!(%kind, accession, "suppression lifted");
        } else {
            info!(%kind, accession, "not suppressed, nothing to do");
        }

        Ok(UnsuppressResult {
            kind,
            accession: accession.to_string(),
            changed,
        })
    }

    pub fn list(&self, kind: EntityKind, caller: &Caller, audit: bool) -> ListResult {
        let mut filter = VisibilityFilter::new(caller);
        if audit {
            filter = filter.audit();
        }
        let records = match kind {
            EntityKind::Study => entries::<Study>(&self.catalog, filter),
            EntityKind::Sample => entries::<Sample>(&self.catalog, filter),
            EntityKind::Run => entries::<Run>(&self.catalog, filter),
            EntityKind::Assembly => entries::<Assembly>(&self.catalog, filter),
            EntityKind::AnalysisJob => entries::<AnalysisJob>(&self.catalog, filter),
        };
        ListResult { kind, records }
    }
}

fn locate<E: Table>(catalog: &Catalog, accession: &str) -> Option<EntityRef> {
    catalog
        .find_by_accession::<E>(accession)
        .map(|record| record.entity_ref())
}

fn entries<'a, E: Table + Visible + 'a>(
    catalog: &'a Catalog,
    filter: VisibilityFilter<'a>,
) -> Vec<ListEntry> {
    catalog
        .available::<E>(filter)
        .map(|record| {
            let state = record.state();
            ListEntry {
                accession: record.accession(),
                is_private: state.is_private,
                is_suppressed: state.is_suppressed,
                suppression_reason: state.suppression_reason,
            }
        })
        .collect()
}
