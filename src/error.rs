use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CatalogError {
    #[error("invalid study accession: {0}")]
    InvalidStudyAccession(String),

    #[error("invalid sample accession: {0}")]
    InvalidSampleAccession(String),

    #[error("invalid run accession: {0}")]
    InvalidRunAccession(String),

    #[error("invalid assembly accession: {0}")]
    InvalidAssemblyAccession(String),

    #[error("invalid analysis accession: {0}")]
    InvalidAnalysisAccession(String),

    #[error("invalid entity kind: {0}")]
    InvalidEntityKind(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("missing configuration value: {0}")]
    #[diagnostic(help("set it in mgnify-catalog.json or through the environment"))]
    MissingConfigValue(&'static str),

    #[error("catalog not found at {0}")]
    MissingCatalog(PathBuf),

    #[error("failed to parse catalog: {0}")]
    CatalogParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("{kind} not found in catalog: {accession}")]
    EntityNotFound { kind: String, accession: String },

    #[error("ENA request failed: {0}")]
    EnaHttp(String),

    #[error("ENA returned status {status}: {message}")]
    EnaStatus { status: u16, message: String },

    #[error("Metagenomics Exchange request failed: {0}")]
    MgxHttp(String),

    #[error("Metagenomics Exchange returned status {status}: {message}")]
    MgxStatus { status: u16, message: String },

    #[error("Metagenomics Exchange lists {source_id} for {sequence_id} without a registry id")]
    MissingRegistryId {
        source_id: String,
        sequence_id: String,
    },
}
