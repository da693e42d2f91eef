use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::domain::EntityKind;
use crate::ena::{EnaClient, EnaRecord};
use crate::error::CatalogError;
use crate::model::{Assembly, Run, Sample, Study};
use crate::store::{Catalog, ChangeSet, Checkpoint, Table};
use crate::suppression::{DependencyIndex, apply_upstream_status, queue_cascade};

pub const DEFAULT_PAGE_SIZE: usize = 1000;

pub trait Syncable: Table {
    fn upstream_accession(&self) -> Option<&str>;

    fn in_study(&self, study_id: u64) -> bool;

    fn queue_upstream_fields(&self, _upstream: &EnaRecord, _changes: &mut ChangeSet) {}
}

impl Syncable for Study {
    fn upstream_accession(&self) -> Option<&str> {
        Some(self.secondary_accession.as_str())
    }

    fn in_study(&self, study_id: u64) -> bool {
        self.id == study_id
    }

    fn queue_upstream_fields(&self, upstream: &EnaRecord, changes: &mut ChangeSet) {
        if upstream.hold_date.is_some() && upstream.hold_date != self.public_release_date {
            changes.set_release_date(self.id, upstream.hold_date);
        }
    }
}

impl Syncable for Sample {
    fn upstream_accession(&self) -> Option<&str> {
        Some(self.accession.as_str())
    }

    fn in_study(&self, study_id: u64) -> bool {
        self.studies.contains(&study_id)
    }
}

impl Syncable for Run {
    fn upstream_accession(&self) -> Option<&str> {
        Some(self.accession.as_str())
    }

    fn in_study(&self, study_id: u64) -> bool {
        self.study == Some(study_id)
    }
}

impl Syncable for Assembly {
    fn upstream_accession(&self) -> Option<&str> {
        self.legacy_accession
            .as_deref()
            .or(Some(self.accession.as_str()))
    }

    fn in_study(&self, study_id: u64) -> bool {
        self.study == Some(study_id)
    }
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub page_size: usize,
    pub accessions: Vec<String>,
    pub study: Option<String>,
    pub now: DateTime<Utc>,
}

impl SyncOptions {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            accessions: Vec::new(),
            study: None,
            now,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SyncReport {
    pub kind: String,
    pub scanned: usize,
    pub updated: usize,
    pub suppressed: usize,
    pub cascaded: usize,
    pub not_found: usize,
    pub unparseable: usize,
    pub failed_pages: usize,
    pub pages_written: usize,
    pub rows_changed: usize,
}

pub fn sync_with_ena<E: Syncable>(
    catalog: &mut Catalog,
    ena: &dyn EnaClient,
    checkpoint: &dyn Checkpoint,
    options: &SyncOptions,
) -> Result<SyncReport, CatalogError> {
    let mut report = SyncReport {
        kind: E::KIND.to_string(),
        ..SyncReport::default()
    };

    let study_scope = match &options.study {
        Some(accession) => Some(resolve_study(catalog, accession)?),
        None => None,
    };
    let wanted: Vec<String> = options
        .accessions
        .iter()
        .map(|acc| acc.trim().to_uppercase())
        .collect();

    let ids: Vec<u64> = E::table(catalog)
        .values()
        .filter(|record| study_scope.is_none_or(|study| record.in_study(study)))
        .filter(|record| {
            wanted.is_empty()
                || record
                    .upstream_accession()
                    .is_some_and(|acc| wanted.contains(&acc.to_uppercase()))
        })
        .map(|record| record.id())
        .collect();

    info!(kind = %E::KIND, total = ids.len(), "syncing with ENA");

    let index = DependencyIndex::build(catalog);
    let page_size = options.page_size.max(1);

    for (page_no, page) in ids.chunks(page_size).enumerate() {
        let accessions: Vec<String> = page
            .iter()
            .filter_map(|id| catalog.get::<E>(*id))
            .filter_map(|record| record.upstream_accession())
            .map(|acc| acc.to_uppercase())
            .collect();

        let upstream = match ena.fetch_records(E::KIND, &accessions) {
            Ok(records) => records,
            Err(err) => {
                error!(
                    kind = %E::KIND,
                    page = page_no,
                    error = %err,
                    "ENA lookup failed, skipping page"
                );
                report.failed_pages += 1;
                continue;
            }
        };
        let by_accession: HashMap<String, EnaRecord> = upstream
            .into_iter()
            .map(|record| (record.accession.to_uppercase(), record))
            .collect();

        let mut changes = ChangeSet::new(options.now);
        for id in page {
            let Some(record) = catalog.get::<E>(*id) else {
                continue;
            };
            report.scanned += 1;
            process_record(
                catalog,
                &index,
                record,
                &by_accession,
                &mut changes,
                options.now,
                &mut report,
            );
        }

        if changes.is_empty() {
            continue;
        }
        let changed = catalog.bulk_update(&changes);
        checkpoint.commit(catalog)?;
        report.pages_written += 1;
        report.rows_changed += changed;
    }

    info!(
        kind = %E::KIND,
        scanned = report.scanned,
        updated = report.updated,
        suppressed = report.suppressed,
        cascaded = report.cascaded,
        not_found = report.not_found,
        unparseable = report.unparseable,
        "ENA sync finished"
    );
    Ok(report)
}

fn process_record<E: Syncable>(
    catalog: &Catalog,
    index: &DependencyIndex,
    record: &E,
    upstream: &HashMap<String, EnaRecord>,
    changes: &mut ChangeSet,
    now: DateTime<Utc>,
    report: &mut SyncReport,
) {
    let accession = record.accession();
    let Some(upstream_acc) = record.upstream_accession() else {
        warn!(kind = %E::KIND, %accession, "no upstream accession, skipping");
        report.not_found += 1;
        return;
    };
    let Some(ena_record) = upstream.get(&upstream_acc.to_uppercase()) else {
        warn!(kind = %E::KIND, %accession, upstream = upstream_acc, "not found in ENA");
        report.not_found += 1;
        return;
    };
    let Some(status) = ena_record.status() else {
        warn!(
            kind = %E::KIND,
            %accession,
            upstream = upstream_acc,
            status_id = ?ena_record.status_id,
            "unparseable ENA status"
        );
        report.unparseable += 1;
        return;
    };

    record.queue_upstream_fields(ena_record, changes);

    let entity = record.entity_ref();
    let Some(current) = catalog.effective_state(entity, changes).cloned() else {
        return;
    };
    let Some(transition) = apply_upstream_status(&current, status, now) else {
        debug!(kind = %E::KIND, %accession, ?status, "already in sync");
        return;
    };

    changes.set_state(entity, transition.next);
    report.updated += 1;
    if transition.entered_suppression {
        report.suppressed += 1;
        let withdrawn = queue_cascade(catalog, index, changes, entity, now);
        if !withdrawn.is_empty() {
            info!(
                kind = %E::KIND,
                %accession,
                descendants = withdrawn.len(),
                "suppression cascaded to descendants"
            );
        }
        report.cascaded += withdrawn.len();
    }
}

fn resolve_study(catalog: &Catalog, accession: &str) -> Result<u64, CatalogError> {
    catalog
        .studies
        .values()
        .find(|study| {
            study.accession.eq_ignore_ascii_case(accession)
                || study.secondary_accession.eq_ignore_ascii_case(accession)
        })
        .map(|study| study.id)
        .ok_or_else(|| CatalogError::EntityNotFound {
            kind: EntityKind::Study.to_string(),
            accession: accession.to_string(),
        })
}

pub fn sync_kind(
    kind: EntityKind,
    catalog: &mut Catalog,
    ena: &dyn EnaClient,
    checkpoint: &dyn Checkpoint,
    options: &SyncOptions,
) -> Result<SyncReport, CatalogError> {
    match kind {
        EntityKind::Study => sync_with_ena::<Study>(catalog, ena, checkpoint, options),
        EntityKind::Sample => sync_with_ena::<Sample>(catalog, ena, checkpoint, options),
        EntityKind::Run => sync_with_ena::<Run>(catalog, ena, checkpoint, options),
        EntityKind::Assembly => sync_with_ena::<Assembly>(catalog, ena, checkpoint, options),
        EntityKind::AnalysisJob => Err(CatalogError::InvalidEntityKind(
            "analysis jobs are not synced with ENA".to_string(),
        )),
    }
}
