use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::error::CatalogError;

pub const DEFAULT_ENDPOINT_BASE: &str = "https://www.ebi.ac.uk/metagenomics/analyses";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MgxResponse {
    pub status: u16,
    pub body: String,
}

impl MgxResponse {
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }

    pub fn describe(&self) -> String {
        match self.json() {
            Some(value) => value.to_string(),
            None => self.body.clone(),
        }
    }
}

pub trait MgxTransport: Send + Sync {
    fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<MgxResponse, CatalogError>;
    fn post(&self, path: &str, body: &Value) -> Result<MgxResponse, CatalogError>;
    fn patch(&self, path: &str, body: &Value) -> Result<MgxResponse, CatalogError>;
    fn delete(&self, path: &str) -> Result<MgxResponse, CatalogError>;
}

#[derive(Clone)]
pub struct MgxHttpTransport {
    client: Client,
    base_url: String,
}

impl MgxHttpTransport {
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self, CatalogError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("mgnify-catalog/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| CatalogError::MgxHttp(err.to_string()))?,
        );
        if let Some(token) = token.map(str::trim).filter(|token| !token.is_empty()) {
            let mut value = HeaderValue::from_str(&format!("mgx {token}"))
                .map_err(|err| CatalogError::MgxHttp(err.to_string()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| CatalogError::MgxHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<MgxResponse, CatalogError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    let body = resp
                        .text()
                        .map_err(|err| CatalogError::MgxHttp(err.to_string()))?;
                    return Ok(MgxResponse { status, body });
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && (err.is_timeout() || err.is_connect()) {
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Err(CatalogError::MgxHttp(err.to_string()));
                }
            }
        }
    }
}

impl MgxTransport for MgxHttpTransport {
    fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<MgxResponse, CatalogError> {
        let url = self.url(path);
        self.send_with_retries(|| self.client.get(&url).query(query))
    }

    fn post(&self, path: &str, body: &Value) -> Result<MgxResponse, CatalogError> {
        let url = self.url(path);
        self.send_with_retries(|| self.client.post(&url).json(body))
    }

    fn patch(&self, path: &str, body: &Value) -> Result<MgxResponse, CatalogError> {
        let url = self.url(path);
        self.send_with_retries(|| self.client.patch(&url).json(body))
    }

    fn delete(&self, path: &str) -> Result<MgxResponse, CatalogError> {
        let url = self.url(path);
        self.send_with_retries(|| self.client.delete(&url))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub confidence: String,
    pub endpoint: String,
    pub method: Vec<String>,
    #[serde(rename = "sourceID")]
    pub source_id: String,
    #[serde(rename = "sequenceID")]
    pub sequence_id: String,
    pub status: String,
    #[serde(rename = "brokerID")]
    pub broker_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryCheck {
    pub registry_id: Option<String>,
    pub metadata_matches: bool,
}

impl RegistryCheck {
    fn absent() -> Self {
        Self {
            registry_id: None,
            metadata_matches: false,
        }
    }
}

pub struct MetagenomicsExchange<T: MgxTransport> {
    transport: T,
    broker: String,
    endpoint_base: String,
}

impl<T: MgxTransport> MetagenomicsExchange<T> {
    pub fn new(transport: T, broker: &str, endpoint_base: &str) -> Self {
        Self {
            transport,
            broker: broker.to_string(),
            endpoint_base: endpoint_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn generate_metadata(
        &self,
        job_accession: &str,
        sequence_accession: &str,
        is_public: bool,
    ) -> DatasetRecord {
        DatasetRecord {
            confidence: "full".to_string(),
            endpoint: format!("{}/{job_accession}", self.endpoint_base),
            method: vec!["other_metadata".to_string()],
            source_id: job_accession.to_string(),
            sequence_id: sequence_accession.to_string(),
            status: if is_public { "public" } else { "private" }.to_string(),
            broker_id: self.broker.clone(),
        }
    }

    pub fn check_analysis(
        &self,
        job_accession: &str,
        sequence_accession: &str,
        metadata: Option<&DatasetRecord>,
    ) -> Result<RegistryCheck, CatalogError> {
        let path = format!("sequences/{sequence_accession}/datasets");
        let response = self
            .transport
            .get(&path, &[("broker", self.broker.as_str())])?;
        if response.status == 404 {
            debug!(sequence = sequence_accession, "no datasets for sequence");
            return Ok(RegistryCheck::absent());
        }
        if !response.ok() {
            return Err(CatalogError::MgxStatus {
                status: response.status,
                message: response.describe(),
            });
        }
        let Some(payload) = response.json() else {
            return Err(CatalogError::MgxStatus {
                status: response.status,
                message: format!("undecodable dataset listing: {}", response.body),
            });
        };
        let datasets = payload
            .get("datasets")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let Some(found) = datasets
            .iter()
            .find(|item| item.get("sourceID").and_then(Value::as_str) == Some(job_accession))
        else {
            debug!(
                analysis = job_accession,
                sequence = sequence_accession,
                "analysis not registered for sequence"
            );
            return Ok(RegistryCheck::absent());
        };

        let registry_id = match found.get("registryID") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => {
                return Err(CatalogError::MissingRegistryId {
                    source_id: job_accession.to_string(),
                    sequence_id: sequence_accession.to_string(),
                });
            }
        };

        let metadata_matches = match metadata {
            Some(metadata) => metadata_matches(metadata, found),
            None => true,
        };
        Ok(RegistryCheck {
            registry_id: Some(registry_id),
            metadata_matches,
        })
    }

    pub fn add_analysis(
        &self,
        job_accession: &str,
        sequence_accession: &str,
        is_public: bool,
    ) -> Option<Value> {
        let record = self.generate_metadata(job_accession, sequence_accession, is_public);
        let body = match serde_json::to_value(&record) {
            Ok(body) => body,
            Err(err) => {
                error!(analysis = job_accession, error = %err, "failed to encode dataset");
                return None;
            }
        };
        match self.transport.post("datasets", &body) {
            Ok(response) if response.ok() => {
                info!(analysis = job_accession, sequence = sequence_accession, "added to registry");
                Some(response.json().unwrap_or(Value::Null))
            }
            Ok(response) => {
                error!(
                    analysis = job_accession,
                    status = response.status,
                    body = %response.describe(),
                    "registry rejected new dataset"
                );
                None
            }
            Err(err) => {
                error!(analysis = job_accession, error = %err, "registry POST failed");
                None
            }
        }
    }

    pub fn patch_analysis(&self, registry_id: &str, data: &DatasetRecord) -> bool {
        let body = match serde_json::to_value(data) {
            Ok(body) => body,
            Err(err) => {
                error!(registry_id, error = %err, "failed to encode dataset");
                return false;
            }
        };
        match self.transport.patch(&format!("datasets/{registry_id}"), &body) {
            Ok(response) if response.ok() => {
                info!(registry_id, "registry dataset updated");
                true
            }
            Ok(response) => {
                let reason = match response.status {
                    400 => "bad request",
                    401 => "unauthorised, check the broker token",
                    409 => "conflict with existing dataset",
                    _ => "unexpected status",
                };
                error!(
                    registry_id,
                    status = response.status,
                    body = %response.describe(),
                    "registry PATCH failed: {reason}"
                );
                false
            }
            Err(err) => {
                error!(registry_id, error = %err, "registry PATCH failed");
                false
            }
        }
    }

    pub fn delete_analysis(&self, registry_id: &str) -> bool {
        match self.transport.delete(&format!("datasets/{registry_id}")) {
            Ok(response) if response.ok() => {
                info!(registry_id, "registry dataset deleted");
                true
            }
            Ok(response) => {
                error!(
                    registry_id,
                    status = response.status,
                    body = %response.describe(),
                    "registry DELETE failed"
                );
                false
            }
            Err(err) => {
                error!(registry_id, error = %err, "registry DELETE failed");
                false
            }
        }
    }
}

pub fn metadata_matches(metadata: &DatasetRecord, found: &Value) -> bool {
    let Ok(Value::Object(expected)) = serde_json::to_value(metadata) else {
        return false;
    };
    expected.iter().all(|(key, value)| {
        let matches = found.get(key) == Some(value);
        if !matches {
            debug!(field = %key, expected = %value, "registry field differs");
        }
        matches
    })
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}
