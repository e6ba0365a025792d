//! Book catalog client: one Google Books volume search per run, with a
//! synthetic fallback whenever the live catalog cannot be used.

use std::num::NonZeroUsize;
use std::time::Duration;

use bookflow_core::{BookRecord, NOT_AVAILABLE, PRICE_FREE, UNKNOWN_AUTHOR, UNKNOWN_TITLE};
use bookflow_storage::{FetchError, HttpClientConfig, HttpFetcher};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{error, info};

pub const CRATE_NAME: &str = "bookflow-catalog";

pub const DEFAULT_ENDPOINT: &str = "https://www.googleapis.com/books/v1/volumes";
pub const DEFAULT_QUERY: &str = "data engineering";
/// Largest `maxResults` the volume search accepts.
pub const MAX_PAGE_SIZE: usize = 40;
const PRINT_TYPE: &str = "books";
const DEFAULT_CURRENCY: &str = "$";

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub endpoint: String,
    pub query: String,
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            query: DEFAULT_QUERY.to_string(),
            timeout: Duration::from_secs(30),
            user_agent: None,
        }
    }
}

/// Why a fetch fell back to sample data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "cause", content = "detail", rename_all = "snake_case")]
pub enum FetchDegraded {
    #[error("network error: {0}")]
    Network(String),
    #[error("catalog responded with status {0}")]
    BadStatus(u16),
    #[error("unexpected payload: {0}")]
    Parse(String),
    #[error("catalog returned no items")]
    EmptyResult,
}

impl From<FetchError> for FetchDegraded {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Request(err) => Self::Network(err.to_string()),
            FetchError::HttpStatus { status, .. } => Self::BadStatus(status),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CatalogFetch {
    pub records: Vec<BookRecord>,
    pub degraded: Option<FetchDegraded>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: HttpFetcher,
    endpoint: String,
    query: String,
}

impl CatalogClient {
    pub fn new(config: CatalogConfig) -> anyhow::Result<Self> {
        let http = HttpFetcher::new(HttpClientConfig {
            timeout: config.timeout,
            user_agent: config.user_agent,
        })?;
        Ok(Self {
            http,
            endpoint: config.endpoint,
            query: config.query,
        })
    }

    /// Best-effort `count` books. Never fails: any problem with the live
    /// catalog yields `count` sample books instead.
    pub async fn fetch(&self, count: NonZeroUsize) -> Vec<BookRecord> {
        self.fetch_with_outcome(count).await.records
    }

    pub async fn fetch_with_outcome(&self, count: NonZeroUsize) -> CatalogFetch {
        let fetched_at = Utc::now();
        match self.fetch_live(count).await {
            Ok(records) => {
                info!(count = records.len(), "processed books from catalog");
                CatalogFetch {
                    records,
                    degraded: None,
                    fetched_at,
                }
            }
            Err(cause) => {
                error!(%cause, "catalog fetch degraded");
                let records = sample_books(count.get());
                info!(count = records.len(), "using sample books as fallback");
                CatalogFetch {
                    records,
                    degraded: Some(cause),
                    fetched_at,
                }
            }
        }
    }

    async fn fetch_live(&self, count: NonZeroUsize) -> Result<Vec<BookRecord>, FetchDegraded> {
        let page_size = count.get().min(MAX_PAGE_SIZE);
        info!(
            endpoint = %self.endpoint,
            query = %self.query,
            max_results = page_size,
            "requesting books from catalog"
        );

        let body = self
            .http
            .fetch_bytes(
                &self.endpoint,
                &[
                    ("q", self.query.clone()),
                    ("maxResults", page_size.to_string()),
                    ("printType", PRINT_TYPE.to_string()),
                ],
            )
            .await?;

        let payload: JsonValue = serde_json::from_slice(&body)
            .map_err(|err| FetchDegraded::Parse(err.to_string()))?;
        let records = parse_volumes(&payload, count.get())?;
        if records.is_empty() {
            return Err(FetchDegraded::EmptyResult);
        }
        Ok(records)
    }
}

/// Extracts up to `limit` books from a volume-search response document.
///
/// A missing `items` key reads as zero items; anything else that is not the
/// expected object/array shape is a parse failure. Per-item fields are
/// optional and fall back to their documented defaults.
pub fn parse_volumes(payload: &JsonValue, limit: usize) -> Result<Vec<BookRecord>, FetchDegraded> {
    if !payload.is_object() {
        return Err(FetchDegraded::Parse("response is not a JSON object".to_string()));
    }
    let items = match payload.get("items") {
        None | Some(JsonValue::Null) => &[][..],
        Some(JsonValue::Array(items)) => items.as_slice(),
        Some(_) => return Err(FetchDegraded::Parse("`items` is not an array".to_string())),
    };
    info!(count = items.len(), "catalog returned items");

    Ok(items.iter().take(limit).map(volume_to_record).collect())
}

fn volume_to_record(item: &JsonValue) -> BookRecord {
    BookRecord {
        title: extract_title(item),
        author: extract_authors(item),
        price: extract_price(item),
        rating: extract_rating(item),
    }
    .truncated()
}

fn json_at<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a JsonValue> {
    let mut cur = value;
    for segment in path {
        cur = cur.get(*segment)?;
    }
    Some(cur)
}

fn json_str<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a str> {
    json_at(value, path)?.as_str()
}

/// Renders a string or number the way it appears in the payload.
fn scalar_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn extract_title(item: &JsonValue) -> String {
    json_str(item, &["volumeInfo", "title"])
        .unwrap_or(UNKNOWN_TITLE)
        .to_string()
}

fn extract_authors(item: &JsonValue) -> String {
    let authors = json_at(item, &["volumeInfo", "authors"])
        .and_then(JsonValue::as_array)
        .map(|arr| arr.iter().filter_map(JsonValue::as_str).collect::<Vec<_>>())
        .unwrap_or_default();
    if authors.is_empty() {
        UNKNOWN_AUTHOR.to_string()
    } else {
        authors.join(", ")
    }
}

fn extract_price(item: &JsonValue) -> String {
    match json_str(item, &["saleInfo", "saleability"]) {
        Some("FOR_SALE") => {
            let retail = json_at(item, &["saleInfo", "retailPrice"])
                .and_then(JsonValue::as_object)
                .filter(|retail| !retail.is_empty());
            let Some(retail) = retail else {
                return NOT_AVAILABLE.to_string();
            };
            let Some(amount) = retail.get("amount").and_then(scalar_text) else {
                return NOT_AVAILABLE.to_string();
            };
            let currency = retail
                .get("currencyCode")
                .and_then(scalar_text)
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
            format!("{amount} {currency}")
        }
        Some("FREE") => PRICE_FREE.to_string(),
        _ => NOT_AVAILABLE.to_string(),
    }
}

fn extract_rating(item: &JsonValue) -> String {
    // Only a numeric rating renders; placeholders such as "N/A" count as absent.
    let Some(rating) = json_at(item, &["volumeInfo", "averageRating"])
        .filter(|value| value.is_number())
        .and_then(scalar_text)
    else {
        return NOT_AVAILABLE.to_string();
    };
    let reviews = json_at(item, &["volumeInfo", "ratingsCount"])
        .and_then(scalar_text)
        .unwrap_or_else(|| "0".to_string());
    format!("{rating}/5 ({reviews} reviews)")
}

const SAMPLE_TOPICS: &[&str] = &[
    "Data Engineering",
    "Stream Processing",
    "Data Warehousing",
    "Distributed Systems",
    "Data Pipelines",
    "Cloud Data Platforms",
    "Batch Processing",
    "Data Modeling",
];

const SAMPLE_SUBTITLES: &[&str] = &[
    "Foundations",
    "Patterns and Practices",
    "A Field Guide",
    "In Production",
    "Design Principles",
];

const SAMPLE_AUTHORS: &[&str] = &[
    "Avery Lindqvist",
    "Jordan Okafor",
    "Sam Takahashi",
    "Riley Moreau",
    "Morgan Castellanos",
    "Quinn Abernathy",
    "Devon Haraldsen",
];

/// Deterministic placeholder books. Titles carry their ordinal, so any
/// `count` of them survives title dedup intact.
pub fn sample_books(count: usize) -> Vec<BookRecord> {
    (0..count)
        .map(|i| {
            let topic = SAMPLE_TOPICS[i % SAMPLE_TOPICS.len()];
            let subtitle = SAMPLE_SUBTITLES[(i / SAMPLE_TOPICS.len()) % SAMPLE_SUBTITLES.len()];
            let title = format!("{topic}: {subtitle} (Sample Edition {})", i + 1);

            let lead = SAMPLE_AUTHORS[i % SAMPLE_AUTHORS.len()];
            let author = if i % 2 == 0 {
                format!("{lead}, {}", SAMPLE_AUTHORS[(i + 3) % SAMPLE_AUTHORS.len()])
            } else {
                lead.to_string()
            };

            let price = match i % 3 {
                0 => format!("{}.99 USD", 19 + (i % 5) * 5),
                1 => PRICE_FREE.to_string(),
                _ => NOT_AVAILABLE.to_string(),
            };

            let rating = if i % 4 == 3 {
                NOT_AVAILABLE.to_string()
            } else {
                format!("{}.{}/5 ({} reviews)", 3 + i % 2, (i * 7) % 10, 5 + i * 3)
            };

            BookRecord {
                title,
                author,
                price,
                rating,
            }
        })
        .collect()
}
