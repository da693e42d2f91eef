mod common;

use assert_matches::assert_matches;
use serde_json::json;

use common::*;
use mgnify_catalog::domain::{EntityKind, SuppressionReason};
use mgnify_catalog::ena::EnaRecord;
use mgnify_catalog::error::CatalogError;
use mgnify_catalog::mgx::MetagenomicsExchange;
use mgnify_catalog::model::{AnalysisTarget, SuppressionState};
use mgnify_catalog::populate::{PopulateOptions, populate_mgx};
use mgnify_catalog::store::{Catalog, InMemory};
use mgnify_catalog::suppression::suppress_by_ancestor;
use mgnify_catalog::sync::{SyncOptions, sync_kind};

const BROKER: &str = "EMG";
const ENDPOINT: &str = "https://www.ebi.ac.uk/metagenomics/analyses";

fn exchange() -> MetagenomicsExchange<MemoryRegistry> {
    MetagenomicsExchange::new(MemoryRegistry::default(), BROKER, ENDPOINT)
}

/// One study with `count` runs, each analysed once. Job ids start at 1.
fn analysed_runs(count: u64) -> Catalog {
    let mut catalog = Catalog::default();
    catalog.insert(study(1, "alice"));
    for id in 1..=count {
        catalog.insert(run(100 + id, 1, None));
        catalog.insert(job(id, 1, AnalysisTarget::Run(100 + id)));
    }
    catalog
}

fn options_at(days: i64) -> PopulateOptions {
    PopulateOptions::new(days_after(days))
}

#[test]
fn new_analysis_is_registered_once() {
    let mut catalog = analysed_runs(1);
    let mgx = exchange();

    let report = populate_mgx(&mut catalog, &mgx, &InMemory, &options_at(1)).unwrap();

    assert_eq!(report.indexable, 1);
    assert_eq!(report.added, 1);
    let stored = mgx.transport().dataset_for("MGYA00000001").unwrap();
    assert_eq!(stored["sequenceID"], "ERR000101");
    assert_eq!(stored["brokerID"], BROKER);
    assert_eq!(stored["status"], "public");
    assert_eq!(stored["endpoint"], format!("{ENDPOINT}/MGYA00000001"));

    let job = &catalog.analyses[&1];
    assert_eq!(job.last_mgx_indexed, Some(days_after(1)));
    assert_eq!(job.mgx_accession.as_deref(), stored["registryID"].as_str());

    let again = populate_mgx(&mut catalog, &mgx, &InMemory, &options_at(2)).unwrap();
    assert_eq!(again.indexable, 0);
    assert_eq!(mgx.transport().writes().len(), 1);
}

#[test]
fn suppressed_analysis_is_withdrawn() {
    let mut catalog = analysed_runs(1);
    let mgx = exchange();
    populate_mgx(&mut catalog, &mgx, &InMemory, &options_at(1)).unwrap();

    let job = catalog.analyses.get_mut(&1).unwrap();
    job.state = suppress_by_ancestor(&job.state, days_after(2));

    let report = populate_mgx(&mut catalog, &mgx, &InMemory, &options_at(3)).unwrap();

    assert_eq!(report.indexable, 0);
    assert_eq!(report.removable, 1);
    assert_eq!(report.deleted, 1);
    assert!(mgx.transport().datasets().is_empty());
    let job = &catalog.analyses[&1];
    assert_eq!(job.last_mgx_indexed, Some(days_after(3)));
    assert!(!job.is_mgx_removable());

    let again = populate_mgx(&mut catalog, &mgx, &InMemory, &options_at(4)).unwrap();
    assert_eq!(again.removable, 0);
}

#[test]
fn withdrawn_analysis_already_gone_is_still_marked() {
    let mut catalog = analysed_runs(1);
    let job = catalog.analyses.get_mut(&1).unwrap();
    job.last_mgx_indexed = Some(days_after(1));
    job.state = suppress_by_ancestor(&SuppressionState::public(), days_after(2));
    let mgx = exchange();

    let report = populate_mgx(&mut catalog, &mgx, &InMemory, &options_at(3)).unwrap();

    assert_eq!(report.already_absent, 1);
    assert_eq!(report.deleted, 0);
    assert!(mgx.transport().writes().is_empty());
    assert_eq!(catalog.analyses[&1].last_mgx_indexed, Some(days_after(3)));
}

#[test]
fn dry_run_changes_nothing() {
    let mut catalog = analysed_runs(3);
    let removable = catalog.analyses.get_mut(&3).unwrap();
    removable.last_mgx_indexed = Some(days_after(1));
    removable.state = suppress_by_ancestor(&SuppressionState::public(), days_after(2));
    let mgx = exchange();
    mgx.transport().seed(json!({
        "sourceID": "MGYA00000003",
        "sequenceID": "ERR000103",
        "brokerID": BROKER,
    }));
    let before = serde_json::to_value(&catalog).unwrap();
    let checkpoint = CountingCheckpoint::default();
    let mut options = options_at(3);
    options.dry_run = true;

    let report = populate_mgx(&mut catalog, &mgx, &checkpoint, &options).unwrap();

    assert!(report.dry_run);
    assert_eq!(report.indexable, 2);
    assert_eq!(report.removable, 1);
    assert_eq!(report.added + report.patched + report.deleted, 0);
    assert!(mgx.transport().writes().is_empty());
    assert_eq!(mgx.transport().datasets().len(), 1);
    assert_eq!(checkpoint.commits(), 0);
    assert_eq!(serde_json::to_value(&catalog).unwrap(), before);
}

#[test]
fn one_failing_analysis_does_not_block_the_rest() {
    let mut catalog = analysed_runs(5);
    let mgx = exchange();
    mgx.transport().reject_source("MGYA00000003");

    let report = populate_mgx(&mut catalog, &mgx, &InMemory, &options_at(1)).unwrap();

    assert_eq!(report.added, 4);
    assert_eq!(report.failed, 1);
    assert_eq!(catalog.analyses[&3].last_mgx_indexed, None);
    assert_eq!(catalog.analyses[&4].last_mgx_indexed, Some(days_after(1)));

    mgx.transport().accept_all();
    let retry = populate_mgx(&mut catalog, &mgx, &InMemory, &options_at(2)).unwrap();

    assert_eq!(retry.indexable, 1);
    assert_eq!(retry.added, 1);
    assert_eq!(mgx.transport().datasets().len(), 5);
}

#[test]
fn stale_registry_metadata_is_patched() {
    let mut catalog = analysed_runs(1);
    let mgx = exchange();
    let stale = mgx.generate_metadata("MGYA00000001", "ERR000101", false);
    let registry_id = mgx.transport().seed(serde_json::to_value(&stale).unwrap());

    let report = populate_mgx(&mut catalog, &mgx, &InMemory, &options_at(1)).unwrap();

    assert_eq!(report.patched, 1);
    assert_eq!(report.added, 0);
    assert_eq!(mgx.transport().writes(), vec![format!("PATCH datasets/{registry_id}")]);
    assert_eq!(mgx.transport().dataset_for("MGYA00000001").unwrap()["status"], "public");
    assert_eq!(catalog.analyses[&1].mgx_accession.as_deref(), Some(registry_id.as_str()));
}

#[test]
fn matching_registry_entry_is_left_alone() {
    let mut catalog = analysed_runs(1);
    let mgx = exchange();
    let current = mgx.generate_metadata("MGYA00000001", "ERR000101", true);
    mgx.transport().seed(serde_json::to_value(&current).unwrap());

    let report = populate_mgx(&mut catalog, &mgx, &InMemory, &options_at(1)).unwrap();

    assert_eq!(report.unchanged, 1);
    assert!(mgx.transport().writes().is_empty());
    assert_eq!(catalog.analyses[&1].last_mgx_indexed, Some(days_after(1)));
}

#[test]
fn study_and_pipeline_filters_narrow_the_selection() {
    let mut catalog = analysed_runs(2);
    catalog.insert(study(2, "bob"));
    catalog.insert(run(300, 2, None));
    catalog.insert(job(30, 2, AnalysisTarget::Run(300)));
    catalog.analyses.get_mut(&2).unwrap().pipeline_version = "4.1".to_string();
    let mgx = exchange();
    let mut options = options_at(1);
    options.study_accessions = vec!["ERP000001".to_string()];
    options.pipeline_version = Some("5.0".to_string());

    let report = populate_mgx(&mut catalog, &mgx, &InMemory, &options).unwrap();

    assert_eq!(report.indexable, 1);
    assert!(catalog.analyses[&1].last_mgx_indexed.is_some());
    assert!(catalog.analyses[&2].last_mgx_indexed.is_none());
    assert!(catalog.analyses[&30].last_mgx_indexed.is_none());
}

#[test]
fn killed_study_removes_its_assembly_analyses_from_the_registry() {
    let mut catalog = Catalog::default();
    catalog.insert(study(1, "alice"));
    for id in 1..=32 {
        catalog.insert(assembly(500 + id, 1, &[]));
        catalog.insert(job(id, 1, AnalysisTarget::Assembly(500 + id)));
    }
    let mgx = exchange();
    let checkpoint = CountingCheckpoint::default();
    let mut options = options_at(1);
    options.page_size = 10;

    let indexed = populate_mgx(&mut catalog, &mgx, &checkpoint, &options).unwrap();
    assert_eq!(indexed.added, 32);
    assert_eq!(indexed.pages_written, 4);
    assert_eq!(mgx.transport().datasets().len(), 32);

    let ena = MockEna::with([EnaRecord::new("ERP000001", Some(6))]);
    let synced = sync_kind(
        EntityKind::Study,
        &mut catalog,
        &ena,
        &InMemory,
        &SyncOptions::new(days_after(2)),
    )
    .unwrap();
    assert_eq!(synced.cascaded, 64);
    assert!(catalog.analyses.values().all(|job| job.is_mgx_removable()));

    let mut options = options_at(3);
    options.page_size = 10;
    let withdrawn = populate_mgx(&mut catalog, &mgx, &checkpoint, &options).unwrap();

    assert_eq!(withdrawn.indexable, 0);
    assert_eq!(withdrawn.removable, 32);
    assert_eq!(withdrawn.deleted, 32);
    assert!(mgx.transport().datasets().is_empty());
    assert_eq!(checkpoint.commits(), 8);
}

#[test]
fn registry_outage_during_withdrawal_is_retried() {
    let mut catalog = analysed_runs(1);
    let mgx = exchange();
    populate_mgx(&mut catalog, &mgx, &InMemory, &options_at(1)).unwrap();
    let job = catalog.analyses.get_mut(&1).unwrap();
    job.state = suppress_by_ancestor(&job.state, days_after(2));
    mgx.transport().fail_reads(503);

    let outage = populate_mgx(&mut catalog, &mgx, &InMemory, &options_at(3)).unwrap();

    assert_eq!(outage.removable, 1);
    assert_eq!(outage.failed, 1);
    assert_eq!(outage.already_absent, 0);
    assert_eq!(outage.deleted, 0);
    assert_eq!(catalog.analyses[&1].last_mgx_indexed, Some(days_after(1)));
    assert_eq!(mgx.transport().datasets().len(), 1);

    mgx.transport().restore_reads();
    let retry = populate_mgx(&mut catalog, &mgx, &InMemory, &options_at(4)).unwrap();

    assert_eq!(retry.removable, 1);
    assert_eq!(retry.deleted, 1);
    assert!(mgx.transport().datasets().is_empty());
}

#[test]
fn registry_outage_during_indexing_sends_no_duplicate() {
    let mut catalog = analysed_runs(1);
    let mgx = exchange();
    let current = mgx.generate_metadata("MGYA00000001", "ERR000101", true);
    mgx.transport().seed(serde_json::to_value(&current).unwrap());
    mgx.transport().fail_reads(503);

    let outage = populate_mgx(&mut catalog, &mgx, &InMemory, &options_at(1)).unwrap();

    assert_eq!(outage.indexable, 1);
    assert_eq!(outage.failed, 1);
    assert_eq!(outage.added, 0);
    assert!(mgx.transport().writes().is_empty());
    assert_eq!(catalog.analyses[&1].last_mgx_indexed, None);

    mgx.transport().restore_reads();
    let retry = populate_mgx(&mut catalog, &mgx, &InMemory, &options_at(2)).unwrap();

    assert_eq!(retry.unchanged, 1);
    assert!(mgx.transport().writes().is_empty());
    assert_eq!(mgx.transport().datasets().len(), 1);
}

#[test]
fn untimed_suppression_is_withdrawn_once() {
    let mut catalog = analysed_runs(1);
    let job = catalog.analyses.get_mut(&1).unwrap();
    job.last_mgx_indexed = Some(days_after(1));
    job.last_update = days_after(2);
    job.state.is_suppressed = true;
    job.state.suppression_reason = Some(SuppressionReason::Suppressed);
    job.state.suppressed_at = None;
    let mgx = exchange();
    let checkpoint = CountingCheckpoint::default();

    let first = populate_mgx(&mut catalog, &mgx, &checkpoint, &options_at(3)).unwrap();
    assert_eq!(first.removable, 1);
    assert_eq!(first.already_absent, 1);

    let second = populate_mgx(&mut catalog, &mgx, &checkpoint, &options_at(4)).unwrap();
    assert_eq!(second.removable, 0);
    assert_eq!(second.pages_written, 0);
    assert_eq!(checkpoint.commits(), 1);
}

#[test]
fn added_dataset_is_found_with_matching_metadata() {
    let mgx = exchange();

    let created = mgx.add_analysis("MGYA00000001", "ERR000101", true);
    assert!(created.is_some());

    let metadata = mgx.generate_metadata("MGYA00000001", "ERR000101", true);
    let check = mgx
        .check_analysis("MGYA00000001", "ERR000101", Some(&metadata))
        .unwrap();
    assert!(check.registry_id.is_some());
    assert!(check.metadata_matches);

    let other = mgx.check_analysis("MGYA00000002", "ERR000101", None).unwrap();
    assert_eq!(other.registry_id, None);
}

#[test]
fn listed_dataset_without_registry_id_is_an_error() {
    let mgx = exchange();
    let metadata = mgx.generate_metadata("MGYA00000001", "ERR000101", true);
    mgx.transport()
        .seed_without_id(serde_json::to_value(&metadata).unwrap());

    let err = mgx
        .check_analysis("MGYA00000001", "ERR000101", Some(&metadata))
        .unwrap_err();
    assert_matches!(err, CatalogError::MissingRegistryId { .. });

    let absent = mgx.check_analysis("MGYA00000001", "ERR000999", None).unwrap();
    assert_eq!(absent.registry_id, None);
}
