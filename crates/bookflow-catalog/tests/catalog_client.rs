//! Catalog client against a local stand-in for the volume search API.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bookflow_catalog::{CatalogClient, CatalogConfig, FetchDegraded};
use bookflow_core::BookRecord;
use serde_json::json;

#[derive(Clone, Copy)]
enum ServerMode {
    Volumes,
    ServerError,
    NoItems,
    Garbage,
}

#[derive(Clone)]
struct ServerState {
    mode: ServerMode,
    seen_queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
}

async fn volumes_handler(
    State(state): State<ServerState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    state.seen_queries.lock().unwrap().push(params);
    match state.mode {
        ServerMode::Volumes => Json(json!({
            "kind": "books#volumes",
            "totalItems": 3,
            "items": [
                {
                    "volumeInfo": {
                        "title": "Kubernetes in Action",
                        "authors": ["Marko Luksa"],
                        "averageRating": 4.5,
                        "ratingsCount": 31
                    },
                    "saleInfo": {
                        "saleability": "FOR_SALE",
                        "retailPrice": { "amount": 35.99, "currencyCode": "USD" }
                    }
                },
                {
                    "volumeInfo": { "title": "Data Pipelines Pocket Reference" },
                    "saleInfo": { "saleability": "FREE" }
                },
                {
                    "volumeInfo": { "title": "Kubernetes in Action", "authors": ["Someone Else"] },
                    "saleInfo": { "saleability": "NOT_FOR_SALE" }
                }
            ]
        }))
        .into_response(),
        ServerMode::ServerError => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        ServerMode::NoItems => Json(json!({ "kind": "books#volumes", "totalItems": 0 })).into_response(),
        ServerMode::Garbage => "<html>not json</html>".into_response(),
    }
}

async fn start_test_server(mode: ServerMode) -> (String, ServerState) {
    let state = ServerState {
        mode,
        seen_queries: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .route("/books/v1/volumes", get(volumes_handler))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr: SocketAddr = listener.local_addr().expect("listener addr");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve test server");
    });

    (format!("http://{addr}/books/v1/volumes"), state)
}

fn client_for(endpoint: String) -> CatalogClient {
    CatalogClient::new(CatalogConfig {
        endpoint,
        timeout: Duration::from_secs(5),
        ..CatalogConfig::default()
    })
    .expect("catalog client")
}

fn count(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).expect("non-zero count")
}

fn assert_well_formed(records: &[BookRecord]) {
    for record in records {
        assert!(record.within_limits(), "over limit: {record:?}");
        assert!(!record.title.is_empty());
        assert!(
            record.rating == "N/A" || record.rating.ends_with(" reviews)"),
            "bad rating: {}",
            record.rating
        );
    }
}

#[tokio::test]
async fn live_response_is_parsed_without_fallback() {
    let (endpoint, _state) = start_test_server(ServerMode::Volumes).await;
    let fetch = client_for(endpoint).fetch_with_outcome(count(25)).await;

    assert!(fetch.degraded.is_none());
    assert_eq!(fetch.records.len(), 3);
    assert_eq!(
        fetch.records[0],
        BookRecord::new("Kubernetes in Action", "Marko Luksa", "35.99 USD", "4.5/5 (31 reviews)")
    );
    assert_eq!(
        fetch.records[1],
        BookRecord::new("Data Pipelines Pocket Reference", "Unknown Author", "Free", "N/A")
    );
    assert_well_formed(&fetch.records);
}

#[tokio::test]
async fn request_caps_page_size_and_sends_fixed_query() {
    let (endpoint, state) = start_test_server(ServerMode::Volumes).await;
    let records = client_for(endpoint).fetch(count(100)).await;
    assert!(records.len() <= 100);

    let seen = state.seen_queries.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].get("maxResults").map(String::as_str), Some("40"));
    assert_eq!(seen[0].get("q").map(String::as_str), Some("data engineering"));
    assert_eq!(seen[0].get("printType").map(String::as_str), Some("books"));
}

#[tokio::test]
async fn fewer_requested_than_returned_truncates_results() {
    let (endpoint, state) = start_test_server(ServerMode::Volumes).await;
    let records = client_for(endpoint).fetch(count(2)).await;

    assert_eq!(records.len(), 2);
    let seen = state.seen_queries.lock().unwrap();
    assert_eq!(seen[0].get("maxResults").map(String::as_str), Some("2"));
}

#[tokio::test]
async fn server_error_falls_back_to_requested_count() {
    let (endpoint, _state) = start_test_server(ServerMode::ServerError).await;
    let fetch = client_for(endpoint).fetch_with_outcome(count(25)).await;

    assert_eq!(fetch.degraded, Some(FetchDegraded::BadStatus(500)));
    assert_eq!(fetch.records.len(), 25);
    assert_eq!(fetch.records, bookflow_catalog::sample_books(25));
    assert_well_formed(&fetch.records);
}

#[tokio::test]
async fn empty_result_falls_back() {
    let (endpoint, _state) = start_test_server(ServerMode::NoItems).await;
    let fetch = client_for(endpoint).fetch_with_outcome(count(7)).await;

    assert_eq!(fetch.degraded, Some(FetchDegraded::EmptyResult));
    assert_eq!(fetch.records.len(), 7);
}

#[tokio::test]
async fn malformed_body_falls_back() {
    let (endpoint, _state) = start_test_server(ServerMode::Garbage).await;
    let fetch = client_for(endpoint).fetch_with_outcome(count(5)).await;

    assert!(matches!(fetch.degraded, Some(FetchDegraded::Parse(_))));
    assert_eq!(fetch.records.len(), 5);
    assert_well_formed(&fetch.records);
}

#[tokio::test]
async fn unreachable_catalog_falls_back() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("listener addr");
    drop(listener);

    let fetch = client_for(format!("http://{addr}/books/v1/volumes"))
        .fetch_with_outcome(count(25))
        .await;

    assert!(matches!(fetch.degraded, Some(FetchDegraded::Network(_))));
    assert_eq!(fetch.records.len(), 25);
    assert_well_formed(&fetch.records);
}
