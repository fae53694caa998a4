//! Catalog of installable entries.
//!
//! The catalog is a JSON document fetched from a remote endpoint (or read
//! from disk) describing every entry the installer knows about. The wire
//! shape is kept separate from the validated in-memory form.

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::engine::HttpClient;

/// Top-level wire document: `{"dlcs": [...]}`.
#[derive(Debug, Deserialize)]
pub struct CatalogDocument {
    pub dlcs: Vec<CatalogRecord>,
}

/// One entry as it appears on the wire.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub urls: Vec<String>,
    #[serde(default)]
    pub image_file_name: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub is_offline_mode: bool,
}

/// Validated catalog entry.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Download URLs in part order. More than one means a multipart archive.
    pub sources: Vec<String>,
    pub image_file_name: String,
    pub price: f64,
    pub offline_mode: bool,
}

impl CatalogEntry {
    /// Entries split across several archives are downloaded part by part and
    /// extracted in source order.
    pub fn is_multipart(&self) -> bool {
        self.sources.len() > 1
    }
}

/// Validated catalog with id lookup.
#[derive(Debug, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    by_id: HashMap<String, usize>,
}

impl Catalog {
    pub fn from_document(doc: CatalogDocument) -> Result<Self> {
        let mut entries = Vec::with_capacity(doc.dlcs.len());
        let mut by_id = HashMap::with_capacity(doc.dlcs.len());
        for record in doc.dlcs {
            if record.urls.is_empty() {
                bail!("catalog entry {} has no download URLs", record.id);
            }
            if record.price < 0.0 {
                bail!("catalog entry {} has a negative price", record.id);
            }
            if by_id.insert(record.id.clone(), entries.len()).is_some() {
                bail!("duplicate catalog entry id: {}", record.id);
            }
            entries.push(CatalogEntry {
                id: record.id,
                name: record.name,
                description: record.description,
                sources: record.urls,
                image_file_name: record.image_file_name,
                price: record.price,
                offline_mode: record.is_offline_mode,
            });
        }
        Ok(Self { entries, by_id })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let doc: CatalogDocument =
            serde_json::from_str(json).context("failed to parse catalog JSON")?;
        Self::from_document(doc)
    }

    /// Fetch and parse the catalog from a remote endpoint.
    pub async fn fetch(client: &HttpClient, url: &str) -> Result<Self> {
        info!("fetching catalog from {url}");
        let body = client
            .inner()
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed to reach catalog endpoint {url}"))?
            .error_for_status()
            .context("catalog endpoint returned an error status")?
            .text()
            .await
            .context("failed to read catalog response body")?;
        Self::from_json(&body)
    }

    pub fn get(&self, id: &str) -> Option<&CatalogEntry> {
        self.by_id.get(id).map(|&i| &self.entries[i])
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
