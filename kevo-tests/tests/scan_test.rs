/// Scan and cursor tests for the Kevo client
///
/// Covers prefix, suffix and range filters, limits, pagination anchored on
/// the last key, and failures in the middle of a scan.

use futures::TryStreamExt;
use kevo_client::{ClientError, ScanOptions};
use kevo_test_utils::{keys_of, seed, TestServer};

#[tokio::test]
async fn test_prefix_scan() {
    let server = TestServer::new();
    let client = server.client().await;
    seed(
        &client,
        &[("user:1001", "alice"), ("user:1002", "bob"), ("config:theme", "dark")],
    )
    .await;

    let entries = client
        .scan(ScanOptions::new().prefix("user:"))
        .unwrap()
        .collect()
        .await
        .unwrap();

    assert_eq!(keys_of(&entries), vec!["user:1001", "user:1002"]);
    assert_eq!(entries[0].value.as_ref(), b"alice");
}

#[tokio::test]
async fn test_range_scan_is_half_open() {
    let server = TestServer::new();
    let client = server.client().await;
    seed(
        &client,
        &[
            ("log:2023-01-05", "a"),
            ("log:2023-01-20", "b"),
            ("log:2023-02-14", "c"),
            ("log:2023-03-01", "d"),
            ("log:2023-03-15", "e"),
        ],
    )
    .await;

    let entries = client
        .scan(ScanOptions::new().range("log:2023-01", "log:2023-03"))
        .unwrap()
        .collect()
        .await
        .unwrap();

    assert_eq!(
        keys_of(&entries),
        vec!["log:2023-01-05", "log:2023-01-20", "log:2023-02-14"]
    );
}

#[tokio::test]
async fn test_limit_caps_results() {
    let server = TestServer::new();
    let client = server.client().await;
    for i in 0..10 {
        client
            .put(format!("item:{:02}", i).as_bytes(), b"x", false)
            .await
            .unwrap();
    }

    let entries = client
        .scan(ScanOptions::new().prefix("item:").limit(3))
        .unwrap()
        .collect()
        .await
        .unwrap();

    assert_eq!(keys_of(&entries), vec!["item:00", "item:01", "item:02"]);
}

#[tokio::test]
async fn test_suffix_scan_walks_everything() {
    let server = TestServer::new();
    let client = server.client().await;
    seed(
        &client,
        &[
            ("document_1.pdf", "1"),
            ("document_2.csv", "2"),
            ("report.pdf", "3"),
            ("zeta.pdf", "4"),
        ],
    )
    .await;

    let entries = client
        .scan(ScanOptions::new().suffix(".pdf"))
        .unwrap()
        .collect()
        .await
        .unwrap();
    assert_eq!(keys_of(&entries), vec!["document_1.pdf", "report.pdf", "zeta.pdf"]);

    let combined = client
        .scan(ScanOptions::new().prefix("document").suffix(".pdf"))
        .unwrap()
        .collect()
        .await
        .unwrap();
    assert_eq!(keys_of(&combined), vec!["document_1.pdf"]);
}

#[tokio::test]
async fn test_zero_limit_is_rejected() {
    let server = TestServer::new();
    let client = server.client().await;

    let err = client.scan(ScanOptions::new().limit(0)).err().unwrap();
    assert!(matches!(err, ClientError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_cursor_is_lazy() {
    let server = TestServer::new();
    let client = server.client().await;

    let mut cursor = client.scan(ScanOptions::new()).unwrap();
    assert_eq!(server.store.call_count("Scan"), 0);

    assert!(cursor.next().await.unwrap().is_none());
    assert_eq!(server.store.call_count("Scan"), 1);
    // Exhausted cursors stay exhausted
    assert!(cursor.next().await.unwrap().is_none());
    assert_eq!(server.store.call_count("Scan"), 1);
}

#[tokio::test]
async fn test_pages_join_without_gaps_or_duplicates() {
    let server = TestServer::new();
    let client = server
        .connected(server.options().with_scan_page_size(2))
        .await;
    for i in 0..7 {
        client
            .put(format!("k{}", i).as_bytes(), b"v", false)
            .await
            .unwrap();
    }

    let entries = client.scan(ScanOptions::new()).unwrap().collect().await.unwrap();

    assert_eq!(keys_of(&entries), vec!["k0", "k1", "k2", "k3", "k4", "k5", "k6"]);
    // Three full pages plus a short final one
    assert_eq!(server.store.call_count("Scan"), 4);
}

#[tokio::test]
async fn test_pagination_with_interleaved_writes() {
    let server = TestServer::new();
    let client = server
        .connected(server.options().with_scan_page_size(2))
        .await;
    let writer = server.client().await;
    seed(&client, &[("b", "1"), ("d", "1"), ("f", "1"), ("h", "1")]).await;

    let mut cursor = client.scan(ScanOptions::new()).unwrap();
    let mut seen = Vec::new();
    while let Some(entry) = cursor.next().await.unwrap() {
        seen.push(String::from_utf8_lossy(&entry.key).into_owned());
        if seen.len() == 2 {
            // One key behind the cursor, one ahead of it
            writer.put(b"a", b"2", false).await.unwrap();
            writer.put(b"e", b"2", false).await.unwrap();
        }
    }

    assert_eq!(seen, vec!["b", "d", "e", "f", "h"]);
}

#[tokio::test]
async fn test_paginated_limit_spans_pages() {
    let server = TestServer::new();
    let client = server
        .connected(server.options().with_scan_page_size(2))
        .await;
    for i in 0..10 {
        client
            .put(format!("n{}", i).as_bytes(), b"v", false)
            .await
            .unwrap();
    }

    let mut cursor = client.scan(ScanOptions::new().limit(5)).unwrap();
    let mut count = 0;
    while cursor.next().await.unwrap().is_some() {
        count += 1;
    }

    assert_eq!(count, 5);
    assert_eq!(cursor.yielded(), 5);
    assert_eq!(server.store.call_count("Scan"), 3);
}

#[tokio::test]
async fn test_mid_scan_failure_keeps_yielded_entries() {
    let server = TestServer::new();
    let client = server.client().await;
    seed(&client, &[("a", "1"), ("b", "2"), ("c", "3"), ("d", "4")]).await;
    server
        .store
        .fail_scan_after(2, ClientError::Connection("stream reset".to_string()));

    let mut cursor = client.scan(ScanOptions::new()).unwrap();
    let first = cursor.next().await.unwrap().unwrap();
    let second = cursor.next().await.unwrap().unwrap();
    let err = cursor.next().await.unwrap_err();

    assert_eq!(first.key.as_ref(), b"a");
    assert_eq!(second.key.as_ref(), b"b");
    assert!(matches!(err, ClientError::Connection(_)));
    // No automatic retry; the cursor is finished
    assert!(cursor.next().await.unwrap().is_none());
    assert_eq!(server.store.call_count("Scan"), 1);
}

#[tokio::test]
async fn test_cursor_as_stream() {
    let server = TestServer::new();
    let client = server.client().await;
    seed(&client, &[("s:1", "a"), ("s:2", "b"), ("t:1", "c")]).await;

    let entries: Vec<_> = client
        .scan(ScanOptions::new().prefix("s:"))
        .unwrap()
        .into_stream()
        .try_collect()
        .await
        .unwrap();

    assert_eq!(keys_of(&entries), vec!["s:1", "s:2"]);
}
