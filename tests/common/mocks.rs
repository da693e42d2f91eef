use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use serde_json::{Value, json};

use mgnify_catalog::domain::EntityKind;
use mgnify_catalog::ena::{EnaClient, EnaRecord};
use mgnify_catalog::error::CatalogError;
use mgnify_catalog::mgx::{MgxResponse, MgxTransport};
use mgnify_catalog::store::{Catalog, Checkpoint};

/// ENA stand-in answering from a fixed table of records.
#[derive(Default)]
pub struct MockEna {
    records: Mutex<HashMap<String, EnaRecord>>,
    failing: Mutex<BTreeSet<String>>,
    calls: Mutex<usize>,
}

impl MockEna {
    pub fn with(records: impl IntoIterator<Item = EnaRecord>) -> Self {
        let ena = Self::default();
        for record in records {
            ena.set(record);
        }
        ena
    }

    pub fn set(&self, record: EnaRecord) {
        self.records
            .lock()
            .unwrap()
            .insert(record.accession.to_uppercase(), record);
    }

    /// Any page containing `accession` fails as if ENA timed out.
    pub fn fail_on(&self, accession: &str) {
        self.failing.lock().unwrap().insert(accession.to_uppercase());
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl EnaClient for MockEna {
    fn fetch_records(
        &self,
        _kind: EntityKind,
        accessions: &[String],
    ) -> Result<Vec<EnaRecord>, CatalogError> {
        *self.calls.lock().unwrap() += 1;
        let failing = self.failing.lock().unwrap();
        if accessions.iter().any(|acc| failing.contains(acc)) {
            return Err(CatalogError::EnaHttp("operation timed out".to_string()));
        }
        let records = self.records.lock().unwrap();
        Ok(accessions
            .iter()
            .filter_map(|acc| records.get(acc).cloned())
            .collect())
    }
}

#[derive(Default)]
pub struct CountingCheckpoint {
    commits: Mutex<usize>,
}

impl CountingCheckpoint {
    pub fn commits(&self) -> usize {
        *self.commits.lock().unwrap()
    }
}

impl Checkpoint for CountingCheckpoint {
    fn commit(&self, _catalog: &Catalog) -> Result<(), CatalogError> {
        *self.commits.lock().unwrap() += 1;
        Ok(())
    }
}

/// In-memory Metagenomics Exchange. Datasets are stored as the JSON the
/// registry would return, with a `registryID` assigned on insert.
#[derive(Default)]
pub struct MemoryRegistry {
    datasets: Mutex<Vec<Value>>,
    next_id: Mutex<u64>,
    rejected_sources: Mutex<BTreeSet<String>>,
    failing_reads: Mutex<Option<u16>>,
    writes: Mutex<Vec<String>>,
}

impl MemoryRegistry {
    pub fn seed(&self, mut dataset: Value) -> String {
        let registry_id = self.allocate_id();
        dataset["registryID"] = json!(registry_id);
        self.datasets.lock().unwrap().push(dataset);
        registry_id
    }

    pub fn seed_without_id(&self, dataset: Value) {
        self.datasets.lock().unwrap().push(dataset);
    }

    /// Every GET answers with `status` until [`MemoryRegistry::restore_reads`].
    pub fn fail_reads(&self, status: u16) {
        *self.failing_reads.lock().unwrap() = Some(status);
    }

    pub fn restore_reads(&self) {
        *self.failing_reads.lock().unwrap() = None;
    }

    /// POSTs for this `sourceID` get a 500.
    pub fn reject_source(&self, source_id: &str) {
        self.rejected_sources
            .lock()
            .unwrap()
            .insert(source_id.to_string());
    }

    pub fn accept_all(&self) {
        self.rejected_sources.lock().unwrap().clear();
    }

    pub fn datasets(&self) -> Vec<Value> {
        self.datasets.lock().unwrap().clone()
    }

    pub fn dataset_for(&self, source_id: &str) -> Option<Value> {
        self.datasets
            .lock()
            .unwrap()
            .iter()
            .find(|item| item["sourceID"] == source_id)
            .cloned()
    }

    /// Every POST, PATCH and DELETE as `METHOD path`.
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    fn allocate_id(&self) -> String {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        format!("MGX{:07}", *next)
    }

    fn respond(status: u16, body: Value) -> Result<MgxResponse, CatalogError> {
        Ok(MgxResponse {
            status,
            body: body.to_string(),
        })
    }
}

impl MgxTransport for MemoryRegistry {
    fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<MgxResponse, CatalogError> {
        if let Some(status) = *self.failing_reads.lock().unwrap() {
            return Self::respond(status, json!({"detail": "service unavailable"}));
        }
        let Some(sequence) = path
            .strip_prefix("sequences/")
            .and_then(|rest| rest.strip_suffix("/datasets"))
        else {
            return Self::respond(404, json!({"detail": "not found"}));
        };
        let broker = query
            .iter()
            .find(|(key, _)| *key == "broker")
            .map(|(_, value)| *value);
        let datasets: Vec<Value> = self
            .datasets
            .lock()
            .unwrap()
            .iter()
            .filter(|item| item["sequenceID"] == sequence)
            .filter(|item| broker.is_none_or(|broker| item["brokerID"] == broker))
            .cloned()
            .collect();
        if datasets.is_empty() {
            return Self::respond(404, json!({"detail": "no datasets"}));
        }
        Self::respond(200, json!({ "datasets": datasets }))
    }

    fn post(&self, path: &str, body: &Value) -> Result<MgxResponse, CatalogError> {
        self.writes.lock().unwrap().push(format!("POST {path}"));
        let source = body["sourceID"].as_str().unwrap_or_default().to_string();
        if self.rejected_sources.lock().unwrap().contains(&source) {
            return Self::respond(500, json!({"detail": "internal error"}));
        }
        let registry_id = self.seed(body.clone());
        Self::respond(201, json!({ "registryID": registry_id }))
    }

    fn patch(&self, path: &str, body: &Value) -> Result<MgxResponse, CatalogError> {
        self.writes.lock().unwrap().push(format!("PATCH {path}"));
        let id = path.trim_start_matches("datasets/");
        let mut datasets = self.datasets.lock().unwrap();
        let Some(existing) = datasets.iter_mut().find(|item| item["registryID"] == id) else {
            return Self::respond(404, json!({"detail": "not found"}));
        };
        if let (Some(target), Some(fields)) = (existing.as_object_mut(), body.as_object()) {
            for (key, value) in fields {
                target.insert(key.clone(), value.clone());
            }
        }
        Self::respond(200, existing.clone())
    }

    fn delete(&self, path: &str) -> Result<MgxResponse, CatalogError> {
        self.writes.lock().unwrap().push(format!("DELETE {path}"));
        let id = path.trim_start_matches("datasets/");
        let mut datasets = self.datasets.lock().unwrap();
        let before = datasets.len();
        datasets.retain(|item| item["registryID"] != id);
        if datasets.len() == before {
            return Self::respond(404, json!({"detail": "not found"}));
        }
        Self::respond(204, Value::Null)
    }
}
