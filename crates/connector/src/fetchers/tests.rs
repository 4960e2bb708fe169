//! Tests for resource fetchers

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use futures_util::{StreamExt, TryStreamExt};
use serde_json::{Value, json};

use super::export::parse_transactional_data;
use super::*;
use crate::client::IterableClient;
use crate::test_utils::{ScriptedResponse, ScriptedTransport, test_config};

fn client_with(transport: &Arc<ScriptedTransport>) -> IterableClient {
    IterableClient::with_transport(&test_config(), transport.clone())
}

fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

fn request(bookmark: &str, now: DateTime<Utc>) -> FetchRequest {
    FetchRequest {
        bookmark: bookmark.to_string(),
        now,
        window_days: 30,
    }
}

async fn collect(stream: RecordStream<'_>) -> Vec<Value> {
    stream.try_collect().await.unwrap()
}

// =============================================================================
// export_windows tests
// =============================================================================

#[test]
fn test_export_windows_75_days_by_30() {
    let start = utc(2024, 1, 1);
    let end = start + Duration::days(75);
    let windows = export_windows(start, end, 30);

    assert_eq!(windows.len(), 3);
    assert_eq!(windows[0], (start, start + Duration::days(30)));
    assert_eq!(
        windows[1],
        (start + Duration::days(30), start + Duration::days(60))
    );
    assert_eq!(windows[2], (start + Duration::days(60), end));
}

#[test]
fn test_export_windows_are_contiguous() {
    let start = utc(2023, 6, 15);
    let end = start + Duration::days(100) + Duration::hours(5);
    let windows = export_windows(start, end, 7);

    assert_eq!(windows.first().unwrap().0, start);
    assert_eq!(windows.last().unwrap().1, end);
    for pair in windows.windows(2) {
        assert_eq!(pair[0].1, pair[1].0);
    }
    for (from, to) in &windows {
        assert!(*to - *from <= Duration::days(7));
        assert!(from < to);
    }
}

#[test]
fn test_export_windows_shorter_than_one_window() {
    let start = utc(2024, 1, 1);
    let end = start + Duration::hours(3);
    assert_eq!(export_windows(start, end, 30), vec![(start, end)]);
}

#[test]
fn test_export_windows_empty_range() {
    let start = utc(2024, 1, 1);
    assert!(export_windows(start, start, 30).is_empty());
    assert!(export_windows(start, start - Duration::days(1), 30).is_empty());
}

#[test]
fn test_export_windows_zero_days_treated_as_one() {
    let start = utc(2024, 1, 1);
    let end = start + Duration::days(3);
    assert_eq!(export_windows(start, end, 0).len(), 3);
}

// =============================================================================
// transactionalData
// =============================================================================

#[test]
fn test_parse_transactional_data_valid() {
    let mut record = json!({"transactionalData": "{\"orderId\": 7}"});
    parse_transactional_data(&mut record);
    assert_eq!(record["transactionalData"], json!({"orderId": 7}));
}

#[test]
fn test_parse_transactional_data_invalid_kept() {
    let mut record = json!({"transactionalData": "not json {"});
    parse_transactional_data(&mut record);
    assert_eq!(record["transactionalData"], json!("not json {"));
}

#[test]
fn test_parse_transactional_data_absent() {
    let mut record = json!({"email": "a@example.com"});
    parse_transactional_data(&mut record);
    assert_eq!(record, json!({"email": "a@example.com"}));
}

// =============================================================================
// Collection
// =============================================================================

#[tokio::test]
async fn test_collection_yields_array_and_normalizes_epochs() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.respond(
        "lists",
        ScriptedResponse::json(&json!({"lists": [
            {"id": 1, "name": "a", "createdAt": 1609459200000_i64},
            {"id": 2, "name": "b", "createdAt": "2021-02-01T00:00:00Z"},
        ]})),
    );
    let client = client_with(&transport);
    let fetcher = Fetcher::Collection {
        path: "lists",
        field: "lists",
        epoch_fields: &["createdAt"],
    };

    let records = collect(fetcher.fetch(&client, &request("2024-01-01T00:00:00Z", utc(2024, 2, 1)))).await;

    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["createdAt"], json!("2021-01-01T00:00:00Z"));
    assert_eq!(records[1]["createdAt"], json!("2021-02-01T00:00:00Z"));
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn test_collection_missing_field_is_error() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.respond("channels", ScriptedResponse::json(&json!({"other": []})));
    let client = client_with(&transport);
    let fetcher = Fetcher::Collection {
        path: "channels",
        field: "channels",
        epoch_fields: &[],
    };

    let result: crate::error::Result<Vec<Value>> = fetcher
        .fetch(&client, &request("2024-01-01T00:00:00Z", utc(2024, 2, 1)))
        .try_collect()
        .await;
    assert!(matches!(
        result,
        Err(crate::error::IterableError::UnexpectedResponse { .. })
    ));
}

#[tokio::test]
async fn test_fetch_is_lazy() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.respond("lists", ScriptedResponse::json(&json!({"lists": []})));
    let client = client_with(&transport);
    let fetcher = Fetcher::Collection {
        path: "lists",
        field: "lists",
        epoch_fields: &[],
    };

    let stream = fetcher.fetch(&client, &request("2024-01-01T00:00:00Z", utc(2024, 2, 1)));
    assert!(transport.requests().is_empty());
    drop(stream);
    assert!(transport.requests().is_empty());
}

// =============================================================================
// Templates
// =============================================================================

#[tokio::test]
async fn test_templates_issues_sixteen_ordered_requests() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.respond("templates", ScriptedResponse::json(&json!({"templates": []})));
    transport.respond_with_params(
        "templates",
        &[("templateTypes", "Blast"), ("messageMedium", "Push")],
        ScriptedResponse::json(&json!({"templates": [
            {"templateId": 10, "updatedAt": 1609459200000_i64}
        ]})),
    );
    let client = client_with(&transport);

    let records = collect(Fetcher::Templates.fetch(&client, &request("2024-01-01T00:00:00Z", utc(2024, 2, 1)))).await;

    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["templateId"], json!(10));
    assert_eq!(records[0]["updatedAt"], json!("2021-01-01T00:00:00Z"));

    let requests = transport.requests_for("templates");
    assert_eq!(requests.len(), 16);
    let mut expected = Vec::new();
    for kind in TEMPLATE_TYPES {
        for medium in MESSAGE_MEDIUMS {
            expected.push((kind, medium));
        }
    }
    let seen: Vec<(&str, &str)> = requests
        .iter()
        .map(|r| {
            (
                r.param("templateTypes").unwrap(),
                r.param("messageMedium").unwrap(),
            )
        })
        .collect();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn test_templates_missing_array_means_empty() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.respond("templates", ScriptedResponse::json(&json!({})));
    let client = client_with(&transport);

    let records = collect(Fetcher::Templates.fetch(&client, &request("2024-01-01T00:00:00Z", utc(2024, 2, 1)))).await;
    assert!(records.is_empty());
    assert_eq!(transport.requests_for("templates").len(), 16);
}

// =============================================================================
// ListUsers
// =============================================================================

#[tokio::test]
async fn test_list_users_wraps_members() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.respond(
        "lists",
        ScriptedResponse::json(&json!({"lists": [{"id": 1}, {"id": 2}]})),
    );
    transport.respond_with_params(
        "lists/getUsers",
        &[("listId", "1")],
        ScriptedResponse::lines(&["a@example.com", "b@example.com"]),
    );
    transport.respond_with_params(
        "lists/getUsers",
        &[("listId", "2")],
        ScriptedResponse::lines(&["c@example.com"]),
    );
    let client = client_with(&transport);
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();

    let records = collect(Fetcher::ListUsers.fetch(&client, &request("2024-01-01T00:00:00Z", now))).await;

    assert_eq!(
        records,
        vec![
            json!({"email": "a@example.com", "listId": 1, "updatedAt": "2024-03-01T12:30:00Z"}),
            json!({"email": "b@example.com", "listId": 1, "updatedAt": "2024-03-01T12:30:00Z"}),
            json!({"email": "c@example.com", "listId": 2, "updatedAt": "2024-03-01T12:30:00Z"}),
        ]
    );
}

#[tokio::test]
async fn test_list_users_drop_stops_requests() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.respond(
        "lists",
        ScriptedResponse::json(&json!({"lists": [{"id": 1}, {"id": 2}]})),
    );
    transport.respond(
        "lists/getUsers",
        ScriptedResponse::lines(&["a@example.com", "b@example.com"]),
    );
    let client = client_with(&transport);

    let mut stream = Fetcher::ListUsers.fetch(&client, &request("2024-01-01T00:00:00Z", utc(2024, 2, 1)));
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first["email"], json!("a@example.com"));
    drop(stream);

    let members = transport.requests_for("lists/getUsers");
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].param("listId"), Some("1"));
}

// =============================================================================
// Metadata
// =============================================================================

#[tokio::test]
async fn test_metadata_walks_three_levels() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.respond(
        "metadata",
        ScriptedResponse::json(&json!({"results": [{"name": "products"}]})),
    );
    transport.respond(
        "metadata/products",
        ScriptedResponse::json(&json!({"results": [
            {"table": "products", "key": "sku-1"},
            {"table": "products", "key": "sku-2"},
        ]})),
    );
    transport.respond(
        "metadata/products/sku-1",
        ScriptedResponse::json(&json!({"table": "products", "key": "sku-1", "value": {"price": 1}})),
    );
    transport.respond(
        "metadata/products/sku-2",
        ScriptedResponse::json(&json!({"table": "products", "key": "sku-2", "value": {"price": 2}})),
    );
    let client = client_with(&transport);

    let records = collect(Fetcher::Metadata.fetch(&client, &request("2024-01-01T00:00:00Z", utc(2024, 2, 1)))).await;

    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["value"], json!({"price": 1}));
    assert_eq!(records[1]["key"], json!("sku-2"));
    let paths: Vec<String> = transport.requests().into_iter().map(|r| r.path).collect();
    assert_eq!(
        paths,
        vec![
            "metadata",
            "metadata/products",
            "metadata/products/sku-1",
            "metadata/products/sku-2",
        ]
    );
}

#[tokio::test]
async fn test_metadata_no_tables() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.respond("metadata", ScriptedResponse::json(&json!({"results": []})));
    let client = client_with(&transport);

    let records = collect(Fetcher::Metadata.fetch(&client, &request("2024-01-01T00:00:00Z", utc(2024, 2, 1)))).await;
    assert!(records.is_empty());
    assert_eq!(transport.requests().len(), 1);
}

// =============================================================================
// Export
// =============================================================================

#[tokio::test]
async fn test_export_requests_each_window() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.respond(
        "export/data.json",
        ScriptedResponse::lines(&[r#"{"email":"a@example.com","createdAt":"2024-01-02 00:00:00 +00:00"}"#]),
    );
    let client = client_with(&transport);
    let fetcher = Fetcher::Export {
        data_type: "emailBounce",
        parse_transactional: false,
    };
    let start = utc(2024, 1, 1);
    let now = start + Duration::days(75);

    let records = collect(fetcher.fetch(&client, &request("2024-01-01T00:00:00Z", now))).await;

    assert_eq!(records.len(), 3);
    let requests = transport.requests_for("export/data.json");
    let ranges: Vec<(&str, &str)> = requests
        .iter()
        .map(|r| {
            assert_eq!(r.param("dataTypeName"), Some("emailBounce"));
            (
                r.param("startDateTime").unwrap(),
                r.param("endDateTime").unwrap(),
            )
        })
        .collect();
    assert_eq!(
        ranges,
        vec![
            ("2024-01-01 00:00:00", "2024-01-31 00:00:00"),
            ("2024-01-31 00:00:00", "2024-03-01 00:00:00"),
            ("2024-03-01 00:00:00", "2024-03-16 00:00:00"),
        ]
    );
}

#[tokio::test]
async fn test_export_parses_transactional_data() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.respond(
        "export/data.json",
        ScriptedResponse::lines(&[
            r#"{"email":"a@example.com","transactionalData":"{\"total\":3}"}"#,
            r#"{"email":"b@example.com","transactionalData":"oops"}"#,
        ]),
    );
    let client = client_with(&transport);
    let fetcher = Fetcher::Export {
        data_type: "emailSend",
        parse_transactional: true,
    };

    let records = collect(fetcher.fetch(&client, &request("2024-01-01T00:00:00Z", utc(2024, 1, 2)))).await;

    assert_eq!(records[0]["transactionalData"], json!({"total": 3}));
    assert_eq!(records[1]["transactionalData"], json!("oops"));
}

#[tokio::test]
async fn test_export_bookmark_at_now_issues_nothing() {
    let transport = Arc::new(ScriptedTransport::new());
    let client = client_with(&transport);
    let fetcher = Fetcher::Export {
        data_type: "user",
        parse_transactional: false,
    };

    let records = collect(fetcher.fetch(&client, &request("2024-01-01T00:00:00Z", utc(2024, 1, 1)))).await;
    assert!(records.is_empty());
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_export_bad_line_fails_stream() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.respond(
        "export/data.json",
        ScriptedResponse::lines(&[r#"{"email":"a@example.com"}"#, "not json"]),
    );
    let client = client_with(&transport);
    let fetcher = Fetcher::Export {
        data_type: "emailOpen",
        parse_transactional: false,
    };

    let mut stream = fetcher.fetch(&client, &request("2024-01-01T00:00:00Z", utc(2024, 1, 2)));
    assert!(stream.next().await.unwrap().is_ok());
    assert!(matches!(
        stream.next().await.unwrap(),
        Err(crate::error::IterableError::Decode { .. })
    ));
}

#[tokio::test]
async fn test_export_invalid_bookmark() {
    let transport = Arc::new(ScriptedTransport::new());
    let client = client_with(&transport);
    let fetcher = Fetcher::Export {
        data_type: "user",
        parse_transactional: false,
    };

    let result: crate::error::Result<Vec<Value>> = fetcher
        .fetch(&client, &request("yesterday-ish", utc(2024, 1, 2)))
        .try_collect()
        .await;
    assert!(matches!(
        result,
        Err(crate::error::IterableError::InvalidDatetime(_))
    ));
    assert!(transport.requests().is_empty());
}
