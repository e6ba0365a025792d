//! HTTP fetch utility and the `book` table stores.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use bookflow_core::{BookRecord, PersistSummary};
use reqwest::StatusCode;
use sqlx::{Connection, PgConnection};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, info_span, warn, Instrument};

pub const CRATE_NAME: &str = "bookflow-storage";

const DROP_BOOK_SQL: &str = "DROP TABLE IF EXISTS book";

/// Table DDL, one statement per entry: `book` plus lookup indexes on
/// `title` and `authors`.
pub const CREATE_BOOK_STATEMENTS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS book (
    id SERIAL PRIMARY KEY,
    title TEXT NOT NULL UNIQUE,
    authors TEXT,
    price TEXT,
    rating TEXT
)"#,
    "CREATE INDEX IF NOT EXISTS idx_books_title ON book(title)",
    "CREATE INDEX IF NOT EXISTS idx_books_authors ON book(authors)",
];

const UPSERT_BOOK_SQL: &str = r#"
INSERT INTO book (title, authors, price, rating)
VALUES ($1, $2, $3, $4)
ON CONFLICT (title) DO UPDATE SET
    authors = EXCLUDED.authors,
    price = EXCLUDED.price,
    rating = EXCLUDED.rating
"#;

const COUNT_BOOKS_SQL: &str = "SELECT COUNT(*) FROM book";

/// Statements run by [`BookStore::bootstrap`], in order.
pub fn bootstrap_statements(reset: bool) -> Vec<&'static str> {
    let mut statements = Vec::with_capacity(CREATE_BOOK_STATEMENTS.len() + 1);
    if reset {
        statements.push(DROP_BOOK_SQL);
    }
    statements.extend_from_slice(CREATE_BOOK_STATEMENTS);
    statements
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
}

/// Single-attempt GET client with a bounded timeout. Retrying is the
/// caller's decision; the catalog client degrades instead of retrying.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self { client })
    }

    /// Returns the body of a 200 response.
    pub async fn fetch_bytes(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<u8>, FetchError> {
        let span = info_span!("http_fetch", url);
        async move {
            let resp = self.client.get(url).query(query).send().await?;
            let status = resp.status();
            if status != StatusCode::OK {
                return Err(FetchError::HttpStatus {
                    status: status.as_u16(),
                    url: resp.url().to_string(),
                });
            }

            Ok(resp.bytes().await?.to_vec())
        }
        .instrument(span)
        .await
    }
}

/// Per-record write failure. Counted, never fatal for the batch.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("record rejected: {reason}")]
    Rejected { reason: String },
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("no book data to persist: upstream produced an empty dataset")]
    EmptyInput,
    #[error("no book data found from upstream step {step}")]
    MissingUpstream { step: &'static str },
    #[error("{context}: {source}")]
    Unhandled {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

impl PersistError {
    pub fn unhandled(context: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Unhandled {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Whether re-running the step could change the outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unhandled { .. })
    }
}

/// A `book` table reachable for the duration of one run.
#[async_trait]
pub trait BookStore: Send {
    /// Inserts `record`, or overwrites authors/price/rating of the row with
    /// the same title.
    async fn upsert(&mut self, record: &BookRecord) -> Result<(), StoreError>;

    async fn count_rows(&mut self) -> Result<i64, StoreError>;

    /// Creates the table and indexes; `reset` drops an existing table first.
    async fn bootstrap(&mut self, reset: bool) -> Result<(), StoreError>;
}

/// Opens a fresh [`BookStore`] for each persist attempt.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self) -> anyhow::Result<Box<dyn BookStore>>;
}

/// Postgres-backed store holding one connection, reused for every upsert.
#[derive(Debug)]
pub struct PgBookStore {
    conn: PgConnection,
}

impl PgBookStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let conn = PgConnection::connect(database_url)
            .await
            .context("connecting to postgres")?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl BookStore for PgBookStore {
    async fn upsert(&mut self, record: &BookRecord) -> Result<(), StoreError> {
        sqlx::query(UPSERT_BOOK_SQL)
            .bind(&record.title)
            .bind(&record.author)
            .bind(&record.price)
            .bind(&record.rating)
            .execute(&mut self.conn)
            .await?;
        Ok(())
    }

    async fn count_rows(&mut self) -> Result<i64, StoreError> {
        let total = sqlx::query_scalar::<_, i64>(COUNT_BOOKS_SQL)
            .fetch_one(&mut self.conn)
            .await?;
        Ok(total)
    }

    async fn bootstrap(&mut self, reset: bool) -> Result<(), StoreError> {
        for statement in bootstrap_statements(reset) {
            sqlx::query(statement).execute(&mut self.conn).await?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PgConnector {
    database_url: String,
}

impl PgConnector {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
        }
    }
}

#[async_trait]
impl StoreConnector for PgConnector {
    async fn connect(&self) -> anyhow::Result<Box<dyn BookStore>> {
        Ok(Box::new(PgBookStore::connect(&self.database_url).await?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBook {
    pub id: i64,
    pub record: BookRecord,
}

#[derive(Debug, Default)]
struct MemoryTable {
    next_id: i64,
    rows: Vec<StoredBook>,
    by_title: HashMap<String, usize>,
}

/// In-process `book` table with the same upsert semantics as Postgres.
/// Clones share one table, so a connector can hand out handles per run.
#[derive(Debug, Clone, Default)]
pub struct MemoryBookStore {
    table: Arc<Mutex<MemoryTable>>,
}

impl MemoryBookStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows in insertion (id) order.
    pub async fn rows(&self) -> Vec<StoredBook> {
        self.table.lock().await.rows.clone()
    }

    pub async fn get(&self, title: &str) -> Option<StoredBook> {
        let table = self.table.lock().await;
        table
            .by_title
            .get(title)
            .and_then(|&idx| table.rows.get(idx))
            .cloned()
    }
}

#[async_trait]
impl BookStore for MemoryBookStore {
    async fn upsert(&mut self, record: &BookRecord) -> Result<(), StoreError> {
        // Postgres text columns cannot hold NUL.
        if [&record.title, &record.author, &record.price, &record.rating]
            .iter()
            .any(|field| field.contains('\0'))
        {
            return Err(StoreError::Rejected {
                reason: "text field contains a NUL byte".to_string(),
            });
        }

        let mut table = self.table.lock().await;
        if let Some(&idx) = table.by_title.get(&record.title) {
            table.rows[idx].record = record.clone();
            return Ok(());
        }

        table.next_id += 1;
        let id = table.next_id;
        let idx = table.rows.len();
        table.rows.push(StoredBook {
            id,
            record: record.clone(),
        });
        table.by_title.insert(record.title.clone(), idx);
        Ok(())
    }

    async fn count_rows(&mut self) -> Result<i64, StoreError> {
        Ok(self.table.lock().await.rows.len() as i64)
    }

    async fn bootstrap(&mut self, reset: bool) -> Result<(), StoreError> {
        if reset {
            *self.table.lock().await = MemoryTable::default();
        }
        Ok(())
    }
}

#[async_trait]
impl StoreConnector for MemoryBookStore {
    async fn connect(&self) -> anyhow::Result<Box<dyn BookStore>> {
        Ok(Box::new(self.clone()))
    }
}

/// Upserts every record, tolerating per-record failures.
pub async fn persist(
    store: &mut dyn BookStore,
    records: &[BookRecord],
) -> Result<PersistSummary, PersistError> {
    persist_with_verification(store, records)
        .await
        .map(|(summary, _)| summary)
}

/// Like [`persist`], also returning the post-batch row count when the
/// verification query succeeded.
pub async fn persist_with_verification(
    store: &mut dyn BookStore,
    records: &[BookRecord],
) -> Result<(PersistSummary, Option<i64>), PersistError> {
    if records.is_empty() {
        return Err(PersistError::EmptyInput);
    }

    info!(count = records.len(), "upserting books");
    let mut summary = PersistSummary::default();
    for record in records {
        match store.upsert(record).await {
            Ok(()) => summary.inserted_or_updated += 1,
            Err(err) => {
                error!(title = %record.title, error = %err, "error upserting book");
                summary.failed += 1;
            }
        }
    }
    info!(
        inserted_or_updated = summary.inserted_or_updated,
        failed = summary.failed,
        "processed books"
    );

    let total = match store.count_rows().await {
        Ok(total) => {
            info!(total, "total books in table");
            Some(total)
        }
        Err(err) => {
            warn!(error = %err, "book count verification query failed");
            None
        }
    };

    Ok((summary, total))
}
