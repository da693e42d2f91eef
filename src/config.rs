use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::ena::DEFAULT_ENA_BASE;
use crate::error::CatalogError;
use crate::mgx::DEFAULT_ENDPOINT_BASE;
use crate::store::Store;
use crate::sync::DEFAULT_PAGE_SIZE;

pub const CONFIG_FILE: &str = "mgnify-catalog.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub catalog_path: Option<Utf8PathBuf>,
    #[serde(default)]
    pub page_size: Option<usize>,
    #[serde(default)]
    pub ena: EnaSection,
    #[serde(default)]
    pub mgx: MgxSection,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct EnaSection {
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct MgxSection {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub broker: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub endpoint_base: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MgxSettings {
    pub base_url: String,
    pub broker: String,
    pub token: Option<String>,
    pub endpoint_base: String,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub catalog_path: Utf8PathBuf,
    pub page_size: usize,
    pub ena_base_url: String,
    mgx_base_url: Option<String>,
    mgx_broker: Option<String>,
    mgx_token: Option<String>,
    mgx_endpoint_base: String,
}

impl ResolvedConfig {
    pub fn mgx(&self) -> Result<MgxSettings, CatalogError> {
        let base_url = self
            .mgx_base_url
            .clone()
            .ok_or(CatalogError::MissingConfigValue("mgx.base_url"))?;
        let broker = self
            .mgx_broker
            .clone()
            .ok_or(CatalogError::MissingConfigValue("mgx.broker"))?;
        Ok(MgxSettings {
            base_url,
            broker,
            token: self.mgx_token.clone(),
            endpoint_base: self.mgx_endpoint_base.clone(),
        })
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, CatalogError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(CONFIG_FILE),
        };

        let config = if path.is_none() && !config_path.exists() {
            Config::default()
        } else {
            let content = fs::read_to_string(&config_path)
                .map_err(|_| CatalogError::ConfigRead(config_path.clone()))?;
            serde_json::from_str(&content)
                .map_err(|err| CatalogError::ConfigParse(err.to_string()))?
        };

        Self::resolve_config(config, |key| std::env::var(key).ok())
    }

    pub fn resolve_config<F>(config: Config, env: F) -> Result<ResolvedConfig, CatalogError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).filter(|value| !value.trim().is_empty());

        let catalog_path = match config.catalog_path {
            Some(path) => path,
            None => Store::default_path()?,
        };
        let page_size = config.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page_size == 0 {
            return Err(CatalogError::ConfigParse(
                "page_size must be greater than zero".to_string(),
            ));
        }

        Ok(ResolvedConfig {
            catalog_path,
            page_size,
            ena_base_url: config
                .ena
                .base_url
                .unwrap_or_else(|| DEFAULT_ENA_BASE.to_string()),
            mgx_base_url: env("MGX_BASE_URL").or(config.mgx.base_url),
            mgx_broker: env("MGX_BROKER").or(config.mgx.broker),
            mgx_token: env("MGX_TOKEN").or(config.mgx.token),
            mgx_endpoint_base: config
                .mgx
                .endpoint_base
                .unwrap_or_else(|| DEFAULT_ENDPOINT_BASE.to_string()),
        })
    }
}
