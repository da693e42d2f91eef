use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;

use crate::domain::{EnaStatus, EntityKind};
use crate::error::CatalogError;

pub const DEFAULT_ENA_BASE: &str = "https://www.ebi.ac.uk/ena/portal/api";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnaRecord {
    pub accession: String,
    pub status_id: Option<String>,
    pub hold_date: Option<NaiveDate>,
}

impl EnaRecord {
    pub fn new(accession: &str, status_id: Option<u8>) -> Self {
        Self {
            accession: accession.to_string(),
            status_id: status_id.map(|code| code.to_string()),
            hold_date: None,
        }
    }

    pub fn with_hold_date(mut self, hold_date: NaiveDate) -> Self {
        self.hold_date = Some(hold_date);
        self
    }

    pub fn status(&self) -> Option<EnaStatus> {
        self.status_id.as_deref()?.parse().ok()
    }
}

pub trait EnaClient: Send + Sync {
    fn fetch_records(
        &self,
        kind: EntityKind,
        accessions: &[String],
    ) -> Result<Vec<EnaRecord>, CatalogError>;
}

#[derive(Clone)]
pub struct EnaHttpClient {
    client: Client,
    base_url: String,
}

impl EnaHttpClient {
    pub fn new(base_url: &str) -> Result<Self, CatalogError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("mgnify-catalog/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| CatalogError::EnaHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|err| CatalogError::EnaHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, CatalogError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 500;
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
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && (err.is_timeout() || err.is_connect()) {
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Err(CatalogError::EnaHttp(err.to_string()));
                }
            }
        }
    }
}

impl EnaClient for EnaHttpClient {
    fn fetch_records(
        &self,
        kind: EntityKind,
        accessions: &[String],
    ) -> Result<Vec<EnaRecord>, CatalogError> {
        if accessions.is_empty() {
            return Ok(Vec::new());
        }
        let result = result_type(kind)?;
        let fields = if kind == EntityKind::Study {
            "accession,status_id,hold_date"
        } else {
            "accession,status_id"
        };
        let url = format!("{}/search", self.base_url);
        let include = accessions.join(",");
        let form = [
            ("result", result),
            ("includeAccessions", include.as_str()),
            ("fields", fields),
            ("format", "json"),
            ("limit", "0"),
        ];
        let response = self.send_with_retries(|| self.client.post(&url).form(&form))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "ENA request failed".to_string());
            return Err(CatalogError::EnaStatus { status, message });
        }
        let text = response
            .text()
            .map_err(|err| CatalogError::EnaHttp(err.to_string()))?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let payload: Value =
            serde_json::from_str(&text).map_err(|err| CatalogError::EnaHttp(err.to_string()))?;
        Ok(parse_records(&payload))
    }
}

fn result_type(kind: EntityKind) -> Result<&'static str, CatalogError> {
    match kind {
        EntityKind::Study => Ok("study"),
        EntityKind::Sample => Ok("sample"),
        EntityKind::Run => Ok("read_run"),
        EntityKind::Assembly => Ok("analysis"),
        EntityKind::AnalysisJob => Err(CatalogError::InvalidEntityKind(
            "analysis jobs have no ENA counterpart".to_string(),
        )),
    }
}

pub fn parse_records(payload: &Value) -> Vec<EnaRecord> {
    let Some(rows) = payload.as_array() else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(|row| {
            let accession = row.get("accession")?.as_str()?.trim().to_uppercase();
            let status_id = match row.get("status_id") {
                Some(Value::String(value)) if !value.trim().is_empty() => {
                    Some(value.trim().to_string())
                }
                Some(Value::Number(value)) => Some(value.to_string()),
                _ => None,
            };
            let hold_date = row
                .get("hold_date")
                .and_then(|value| value.as_str())
                .and_then(|value| NaiveDate::parse_from_str(value.get(..10)?, "%Y-%m-%d").ok());
            Some(EnaRecord {
                accession,
                status_id,
                hold_date,
            })
        })
        .collect()
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}
