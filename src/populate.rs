use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::CatalogError;
use crate::mgx::{MetagenomicsExchange, MgxTransport};
use crate::model::AnalysisJob;
use crate::store::{Catalog, ChangeSet, Checkpoint, RegistryMark};
use crate::sync::DEFAULT_PAGE_SIZE;

#[derive(Debug, Clone)]
pub struct PopulateOptions {
    pub study_accessions: Vec<String>,
    pub pipeline_version: Option<String>,
    pub dry_run: bool,
    pub page_size: usize,
    pub now: DateTime<Utc>,
}

impl PopulateOptions {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            study_accessions: Vec::new(),
            pipeline_version: None,
            dry_run: false,
            page_size: DEFAULT_PAGE_SIZE,
            now,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct PopulateReport {
    pub dry_run: bool,
    pub indexable: usize,
    pub added: usize,
    pub patched: usize,
    pub unchanged: usize,
    pub removable: usize,
    pub deleted: usize,
    pub already_absent: usize,
    pub failed: usize,
    pub pages_written: usize,
}

enum Outcome {
    Mark(RegistryMark),
    Skip,
    Failed,
}

pub fn populate_mgx<T: MgxTransport>(
    catalog: &mut Catalog,
    mgx: &MetagenomicsExchange<T>,
    checkpoint: &dyn Checkpoint,
    options: &PopulateOptions,
) -> Result<PopulateReport, CatalogError> {
    let mut report = PopulateReport {
        dry_run: options.dry_run,
        ..PopulateReport::default()
    };
    let studies = scoped_studies(catalog, &options.study_accessions);

    let indexable = select(catalog, options, studies.as_deref(), AnalysisJob::is_mgx_indexable);
    report.indexable = indexable.len();
    info!("Indexing {} new analyses", indexable.len());
    run_pass(catalog, checkpoint, options, &indexable, &mut report, |catalog, job, report| {
        index_analysis(catalog, mgx, job, options, report)
    })?;

    let removable = select(catalog, options, studies.as_deref(), AnalysisJob::is_mgx_removable);
    report.removable = removable.len();
    info!("Processing {} analyses to remove", removable.len());
    run_pass(catalog, checkpoint, options, &removable, &mut report, |catalog, job, report| {
        remove_analysis(catalog, mgx, job, options, report)
    })?;

    info!(
        added = report.added,
        patched = report.patched,
        deleted = report.deleted,
        failed = report.failed,
        dry_run = report.dry_run,
        "Metagenomics Exchange sync finished"
    );
    Ok(report)
}

fn scoped_studies(catalog: &Catalog, accessions: &[String]) -> Option<Vec<u64>> {
    if accessions.is_empty() {
        return None;
    }
    let ids = accessions
        .iter()
        .filter_map(|accession| {
            let found = catalog.studies.values().find(|study| {
                study.accession.eq_ignore_ascii_case(accession)
                    || study.secondary_accession.eq_ignore_ascii_case(accession)
            });
            if found.is_none() {
                warn!(study = %accession, "study not in catalog, ignoring");
            }
            found.map(|study| study.id)
        })
        .collect();
    Some(ids)
}

fn select(
    catalog: &Catalog,
    options: &PopulateOptions,
    studies: Option<&[u64]>,
    eligible: fn(&AnalysisJob) -> bool,
) -> Vec<u64> {
    catalog
        .analyses
        .values()
        .filter(|job| eligible(job))
        .filter(|job| studies.is_none_or(|ids| ids.contains(&job.study)))
        .filter(|job| {
            options
                .pipeline_version
                .as_ref()
                .is_none_or(|version| &job.pipeline_version == version)
        })
        .map(|job| job.id)
        .collect()
}

fn run_pass<F>(
    catalog: &mut Catalog,
    checkpoint: &dyn Checkpoint,
    options: &PopulateOptions,
    ids: &[u64],
    report: &mut PopulateReport,
    mut handle: F,
) -> Result<(), CatalogError>
where
    F: FnMut(&Catalog, &AnalysisJob, &mut PopulateReport) -> Outcome,
{
    for page in ids.chunks(options.page_size.max(1)) {
        let mut changes = ChangeSet::new(options.now);
        for id in page {
            let Some(job) = catalog.analyses.get(id) else {
                continue;
            };
            match handle(catalog, job, report) {
                Outcome::Mark(mark) => changes.mark_indexed(*id, mark),
                Outcome::Skip => {}
                Outcome::Failed => report.failed += 1,
            }
        }
        if changes.is_empty() {
            continue;
        }
        catalog.bulk_update(&changes);
        checkpoint.commit(catalog)?;
        report.pages_written += 1;
    }
    Ok(())
}

fn index_analysis<T: MgxTransport>(
    catalog: &Catalog,
    mgx: &MetagenomicsExchange<T>,
    job: &AnalysisJob,
    options: &PopulateOptions,
    report: &mut PopulateReport,
) -> Outcome {
    let mgya = job.accession().to_string();
    let Some(sequence) = catalog.sequence_accession(job) else {
        error!(analysis = %mgya, "analysis has no run or assembly in the catalog");
        return Outcome::Failed;
    };
    let is_public = !job.state.is_private;
    let metadata = mgx.generate_metadata(&mgya, sequence, is_public);

    let check = match mgx.check_analysis(&mgya, sequence, Some(&metadata)) {
        Ok(check) => check,
        Err(err) => {
            error!(analysis = %mgya, sequence, error = %err, "registry lookup failed");
            return Outcome::Failed;
        }
    };

    match check.registry_id {
        None => {
            if options.dry_run {
                info!(analysis = %mgya, sequence, "dry run: would add to registry");
                return Outcome::Skip;
            }
            if mgx.add_analysis(&mgya, sequence, is_public).is_none() {
                return Outcome::Failed;
            }
            match mgx.check_analysis(&mgya, sequence, None) {
                Ok(check) => match check.registry_id {
                    Some(registry_id) => {
                        report.added += 1;
                        Outcome::Mark(RegistryMark {
                            mgx_accession: Some(registry_id),
                            indexed_at: options.now,
                        })
                    }
                    None => {
                        error!(analysis = %mgya, sequence, "added dataset not found on re-check");
                        Outcome::Failed
                    }
                },
                Err(err) => {
                    error!(analysis = %mgya, sequence, error = %err, "registry re-check failed");
                    Outcome::Failed
                }
            }
        }
        Some(registry_id) if !check.metadata_matches => {
            if options.dry_run {
                info!(analysis = %mgya, %registry_id, "dry run: would patch registry dataset");
                return Outcome::Skip;
            }
            if !mgx.patch_analysis(&registry_id, &metadata) {
                return Outcome::Failed;
            }
            report.patched += 1;
            Outcome::Mark(RegistryMark {
                mgx_accession: Some(registry_id),
                indexed_at: options.now,
            })
        }
        Some(registry_id) => {
            debug!(analysis = %mgya, %registry_id, "registry metadata already current");
            report.unchanged += 1;
            if options.dry_run {
                return Outcome::Skip;
            }
            Outcome::Mark(RegistryMark {
                mgx_accession: Some(registry_id),
                indexed_at: options.now,
            })
        }
    }
}

fn remove_analysis<T: MgxTransport>(
    catalog: &Catalog,
    mgx: &MetagenomicsExchange<T>,
    job: &AnalysisJob,
    options: &PopulateOptions,
    report: &mut PopulateReport,
) -> Outcome {
    let mgya = job.accession().to_string();
    let Some(sequence) = catalog.sequence_accession(job) else {
        error!(analysis = %mgya, "analysis has no run or assembly in the catalog");
        return Outcome::Failed;
    };

    let check = match mgx.check_analysis(&mgya, sequence, None) {
        Ok(check) => check,
        Err(err) => {
            error!(analysis = %mgya, sequence, error = %err, "registry lookup failed");
            return Outcome::Failed;
        }
    };

    let Some(registry_id) = check.registry_id else {
        info!(analysis = %mgya, sequence, "nothing to delete");
        report.already_absent += 1;
        if options.dry_run {
            return Outcome::Skip;
        }
        return Outcome::Mark(RegistryMark {
            mgx_accession: None,
            indexed_at: options.now,
        });
    };

    if options.dry_run {
        info!(analysis = %mgya, %registry_id, "dry run: would delete registry dataset");
        return Outcome::Skip;
    }
    if !mgx.delete_analysis(&registry_id) {
        return Outcome::Failed;
    }
    report.deleted += 1;
    Outcome::Mark(RegistryMark {
        mgx_accession: None,
        indexed_at: options.now,
    })
}
