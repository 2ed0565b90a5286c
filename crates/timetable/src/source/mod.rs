//! Discovers and downloads the timetable spreadsheet.
//!
//! The institution publishes the timetable as one or more Excel files linked
//! from a listing page:
//! 1. GET the listing page
//! 2. Collect anchors pointing at `.xlsx`/`.xlsm`/`.xls` documents
//! 3. Pick the first link matching the configured filter
//! 4. Download it
//!
//! There is no retry here; a failed run is retried by the next trigger.

mod error;

pub use error::FetchError;

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::SourceConfig;
use crate::model::RawSpreadsheet;

const DOCUMENT_EXTENSIONS: [&str; 3] = [".xlsx", ".xlsm", ".xls"];

static LINK_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

/// Anything that can produce the current spreadsheet.
pub trait ScheduleSource: Send + Sync {
    fn fetch<'a>(&'a self, filter: Option<&'a str>) -> BoxFuture<'a, Result<RawSpreadsheet, FetchError>>;
}

/// Document links on the listing page, resolved against `base` and
/// de-duplicated in document order.
pub fn extract_document_links(html: &str, base: &Url) -> Vec<Url> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for anchor in document.select(&LINK_SELECTOR) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Ok(url) = base.join(href.trim()) else {
            debug!(href, "Skipping unresolvable link");
            continue;
        };
        let path = url.path().to_lowercase();
        if !DOCUMENT_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
            continue;
        }
        if seen.insert(url.as_str().to_string()) {
            links.push(url);
        }
    }

    links
}

/// First link containing `filter` (case-insensitive), or the first link when
/// there is no filter or nothing matches.
pub fn select_link<'a>(links: &'a [Url], filter: Option<&str>) -> Option<&'a Url> {
    let filter = filter.map(str::trim).filter(|f| !f.is_empty());
    if let Some(filter) = filter {
        let needle = filter.to_lowercase();
        if let Some(link) = links
            .iter()
            .find(|l| l.as_str().to_lowercase().contains(&needle))
        {
            return Some(link);
        }
        warn!(filter, "No schedule link matches the filter, using the first one");
    }
    links.first()
}

/// Last path segment of a document URL.
fn file_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty())
        .unwrap_or("schedule.xlsx")
        .to_string()
}

/// Fetches the spreadsheet over HTTP.
pub struct SourceFetcher {
    client: Client,
    listing_url: Url,
}

impl SourceFetcher {
    pub fn new(config: &SourceConfig) -> Result<Self, FetchError> {
        let listing_url = Url::parse(&config.listing_url)?;
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| FetchError::Network {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            listing_url,
        })
    }

    /// Downloads the spreadsheet selected by `filter`.
    pub async fn fetch_spreadsheet(&self, filter: Option<&str>) -> Result<RawSpreadsheet, FetchError> {
        let links = self.list_documents().await?;
        let url = select_link(&links, filter)
            .ok_or_else(|| FetchError::NoDocuments {
                url: self.listing_url.to_string(),
            })?
            .clone();
        self.download(url).await
    }

    async fn list_documents(&self) -> Result<Vec<Url>, FetchError> {
        let listing_error = |message: String| FetchError::Listing { message };

        let response = self
            .client
            .get(self.listing_url.clone())
            .send()
            .await
            .map_err(|e| listing_error(e.to_string()))?;
        if !response.status().is_success() {
            return Err(listing_error(format!(
                "listing page returned status {}",
                response.status()
            )));
        }
        let html = response
            .text()
            .await
            .map_err(|e| listing_error(e.to_string()))?;

        let links = extract_document_links(&html, &self.listing_url);
        debug!(count = links.len(), "Discovered schedule documents");
        if links.is_empty() {
            return Err(FetchError::NoDocuments {
                url: self.listing_url.to_string(),
            });
        }
        Ok(links)
    }

    async fn download(&self, url: Url) -> Result<RawSpreadsheet, FetchError> {
        let start = Instant::now();
        let download_error = |message: String| FetchError::Download {
            url: url.to_string(),
            message,
        };

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| download_error(e.to_string()))?;
        if !response.status().is_success() {
            return Err(download_error(format!("status {}", response.status())));
        }
        let buffer = response
            .bytes()
            .await
            .map_err(|e| download_error(e.to_string()))?
            .to_vec();

        info!(
            url = %url,
            bytes = buffer.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Downloaded schedule spreadsheet"
        );

        Ok(RawSpreadsheet {
            filename: file_name(&url),
            url: url.to_string(),
            buffer,
        })
    }
}

impl ScheduleSource for SourceFetcher {
    fn fetch<'a>(&'a self, filter: Option<&'a str>) -> BoxFuture<'a, Result<RawSpreadsheet, FetchError>> {
        self.fetch_spreadsheet(filter).boxed()
    }
}
