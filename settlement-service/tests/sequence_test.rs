//! Integration tests for the per-tenant document sequence generator.

mod common;

use common::TestApp;
use uuid::Uuid;

#[tokio::test]
async fn concurrent_increments_yield_distinct_contiguous_numbers() {
    let Some(app) = TestApp::spawn().await else {
        return;
    };
    let tenant_id = Uuid::new_v4();

    let mut handles = Vec::new();
    for _ in 0..20 {
        let db = app.db.clone();
        handles.push(tokio::spawn(async move {
            db.next_sequence(tenant_id, "subtrip").await.unwrap()
        }));
    }

    let mut numbers = Vec::new();
    for handle in handles {
        numbers.push(handle.await.unwrap());
    }
    numbers.sort_unstable();

    // No gaps, no duplicates, even under contention.
    assert_eq!(numbers, (1..=20).collect::<Vec<i64>>());

    app.cleanup().await;
}

#[tokio::test]
async fn counters_are_scoped_per_tenant_and_model() {
    let Some(app) = TestApp::spawn().await else {
        return;
    };
    let tenant_a = Uuid::new_v4();
    let tenant_b = Uuid::new_v4();

    assert_eq!(app.db.next_sequence(tenant_a, "subtrip").await.unwrap(), 1);
    assert_eq!(app.db.next_sequence(tenant_a, "subtrip").await.unwrap(), 2);

    // A different model under the same tenant starts fresh.
    assert_eq!(app.db.next_sequence(tenant_a, "invoice").await.unwrap(), 1);

    // Another tenant is unaffected by either.
    assert_eq!(app.db.next_sequence(tenant_b, "subtrip").await.unwrap(), 1);

    app.cleanup().await;
}
