//! STAC catalog lookup for DOI and citation metadata.
//!
//! The public data catalog is a static tree of JSON documents: a root
//! catalog linking one sub-catalog per project, each linking the
//! collections it hosts. Entries are located by `title` match in the
//! `links` arrays, never by URL construction.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::{CloudError, Result};

const ROOT_URL: &str = "https://earthengine-stac.storage.googleapis.com/catalog/catalog.json";

/// Configuration for [`CatalogClient`].
pub struct CatalogClientOptions {
    /// Per-request timeout (default 30 s).
    pub request_timeout: Duration,
    /// Maximum retries on transient failures (default 3). Client errors
    /// (4xx) are never retried.
    pub max_retries: u32,
    /// Root catalog URL.
    pub root_url: String,
}

impl Default for CatalogClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            root_url: ROOT_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogLink {
    #[serde(default)]
    title: Option<String>,
    href: String,
}

/// The subset of a catalog document this client reads.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    #[serde(default)]
    links: Vec<CatalogLink>,
    #[serde(rename = "sci:doi", default)]
    doi: Option<String>,
    #[serde(rename = "sci:citation", default)]
    citation: Option<String>,
}

/// Resolves asset ids to their catalog entries.
pub struct CatalogClient {
    client: reqwest::Client,
    options: CatalogClientOptions,
}

impl CatalogClient {
    pub fn new(options: CatalogClientOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| CloudError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, options })
    }

    /// Resolve the catalog entry of `asset_id` (e.g. `"COPERNICUS/S2_SR"`).
    ///
    /// The project is the id's first segment; the collection entry carries
    /// the full id with `/` replaced by `_` as its title.
    pub async fn collection(&self, asset_id: &str) -> Result<CatalogEntry> {
        let project = asset_id.split('/').next().unwrap_or(asset_id);
        let root: CatalogEntry = self.get_json(&self.options.root_url).await?;
        let project_link = find_link(&root.links, project).ok_or(CloudError::NotFound {
            kind: "project",
            name: project.to_string(),
        })?;

        let project_doc: CatalogEntry = self.get_json(&project_link.href).await?;
        let title = asset_id.replace('/', "_");
        let collection_link =
            find_link(&project_doc.links, &title).ok_or(CloudError::NotFound {
                kind: "collection",
                name: asset_id.to_string(),
            })?;
        self.get_json(&collection_link.href).await
    }

    /// The `sci:doi` field of the resolved collection.
    pub async fn doi(&self, asset_id: &str) -> Result<String> {
        self.collection(asset_id).await?.doi.ok_or(CloudError::NotFound {
            kind: "DOI of collection",
            name: asset_id.to_string(),
        })
    }

    /// The `sci:citation` field of the resolved collection.
    pub async fn citation(&self, asset_id: &str) -> Result<String> {
        self.collection(asset_id)
            .await?
            .citation
            .ok_or(CloudError::NotFound {
                kind: "citation of collection",
                name: asset_id.to_string(),
            })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let mut last_err = None;

        for attempt in 0..=self.options.max_retries {
            if attempt > 0 {
                // Exponential backoff: 500ms, 1s, 2s, ...
                let delay = Duration::from_millis(500 * (1 << (attempt - 1)));
                tokio::time::sleep(delay).await;
            }
            debug!(url, attempt, "catalog GET");

            match self.client.get(url).send().await {
                Ok(r) if r.status().is_success() => {
                    let body = r
                        .text()
                        .await
                        .map_err(|e| CloudError::Network(format!("reading response body: {e}")))?;
                    return serde_json::from_str(&body)
                        .map_err(|e| CloudError::Network(format!("parsing catalog document: {e}")));
                }
                Ok(r) => {
                    let status = r.status();
                    let body = r.text().await.unwrap_or_default();
                    last_err = Some(CloudError::Network(format!(
                        "catalog GET returned HTTP {}: {}",
                        status,
                        body.chars().take(500).collect::<String>()
                    )));
                    if status.is_client_error() {
                        break;
                    }
                }
                Err(e) => {
                    last_err = Some(CloudError::Network(format!("catalog GET failed: {e}")));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| CloudError::Network("catalog GET failed".into())))
    }
}

fn find_link<'a>(links: &'a [CatalogLink], title: &str) -> Option<&'a CatalogLink> {
    links.iter().find(|l| l.title.as_deref() == Some(title))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(title: Option<&str>, href: &str) -> CatalogLink {
        CatalogLink {
            title: title.map(str::to_string),
            href: href.to_string(),
        }
    }

    #[test]
    fn links_match_on_exact_title() {
        let links = vec![
            link(None, "https://example.com/self"),
            link(Some("COPERNICUS"), "https://example.com/copernicus.json"),
            link(Some("USGS"), "https://example.com/usgs.json"),
        ];
        assert_eq!(
            find_link(&links, "COPERNICUS").map(|l| l.href.as_str()),
            Some("https://example.com/copernicus.json")
        );
        assert!(find_link(&links, "COPER").is_none());
        assert!(find_link(&links, "MODIS").is_none());
    }

    #[test]
    fn entry_reads_scientific_extension_fields() {
        let entry: CatalogEntry = serde_json::from_str(
            r#"{
                "links": [],
                "sci:doi": "10.5066/P9OGBGM6",
                "sci:citation": "Landsat 8 Collection 2"
            }"#,
        )
        .unwrap();
        assert_eq!(entry.doi.as_deref(), Some("10.5066/P9OGBGM6"));
        assert_eq!(entry.citation.as_deref(), Some("Landsat 8 Collection 2"));
    }

    #[test]
    fn entry_tolerates_missing_fields() {
        let entry: CatalogEntry = serde_json::from_str("{}").unwrap();
        assert!(entry.links.is_empty());
        assert!(entry.doi.is_none());
        assert!(entry.citation.is_none());
    }
}
