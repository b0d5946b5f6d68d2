//! Integration tests for the subtrip lifecycle: creation, numbering,
//! material entry with auto-expenses, receipt, error handling and the audit
//! trail.

mod common;

use common::{create_loaded_subtrip, create_received_subtrip, date, seed_master_data, TestApp};
use rust_decimal::Decimal;
use service_core::error::AppError;
use settlement_service::models::{
    CreateSubtrip, ExpenseType, MaterialInfo, ReceiveInfo, SubtripPatch, SubtripStatus,
};
use uuid::Uuid;

fn bare_subtrip_input(seed: &common::Seed, vehicle_id: Uuid) -> CreateSubtrip {
    CreateSubtrip {
        tenant_id: seed.tenant_id,
        customer_id: seed.customer_id,
        vehicle_id,
        driver_id: seed.driver_id,
        route_id: seed.route_id,
        loading_point: "Jaipur".to_string(),
        unloading_point: "Surat".to_string(),
        start_date: date(2026, 8, 1),
        is_empty: false,
        remarks: None,
        material: None,
    }
}

#[tokio::test]
async fn subtrips_are_numbered_sequentially_per_tenant() {
    let Some(app) = TestApp::spawn().await else {
        return;
    };
    let seed = seed_master_data(&app.db).await;

    let first = app
        .db
        .create_subtrip(&bare_subtrip_input(&seed, seed.own_vehicle_id), None)
        .await
        .unwrap();
    let second = app
        .db
        .create_subtrip(&bare_subtrip_input(&seed, seed.own_vehicle_id), None)
        .await
        .unwrap();

    assert_eq!(first.subtrip_no, "st-1");
    assert_eq!(second.subtrip_no, "st-2");
    assert_eq!(first.status(), SubtripStatus::InQueue);

    // Owned vehicles link to their open trip.
    assert!(first.trip_id.is_some());

    app.cleanup().await;
}

#[tokio::test]
async fn market_vehicle_subtrips_skip_trip_association() {
    let Some(app) = TestApp::spawn().await else {
        return;
    };
    let seed = seed_master_data(&app.db).await;

    let subtrip = app
        .db
        .create_subtrip(&bare_subtrip_input(&seed, seed.market_vehicle_id), None)
        .await
        .unwrap();

    assert!(subtrip.trip_id.is_none());

    app.cleanup().await;
}

#[tokio::test]
async fn creating_with_material_starts_loaded() {
    let Some(app) = TestApp::spawn().await else {
        return;
    };
    let seed = seed_master_data(&app.db).await;

    let subtrip = create_loaded_subtrip(&app.db, &seed, seed.market_vehicle_id, 500, 20).await;
    assert_eq!(subtrip.status(), SubtripStatus::Loaded);
    assert_eq!(subtrip.rate, Some(Decimal::from(500)));

    app.cleanup().await;
}

#[tokio::test]
async fn unknown_reference_is_rejected_at_creation() {
    let Some(app) = TestApp::spawn().await else {
        return;
    };
    let seed = seed_master_data(&app.db).await;

    let mut input = bare_subtrip_input(&seed, seed.own_vehicle_id);
    input.driver_id = Uuid::new_v4();
    let err = app.db.create_subtrip(&input, None).await.unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));

    app.cleanup().await;
}

#[tokio::test]
async fn material_entry_generates_route_expenses_for_owned_vehicle() {
    let Some(app) = TestApp::spawn().await else {
        return;
    };
    let seed = seed_master_data(&app.db).await;

    let subtrip = app
        .db
        .create_subtrip(&bare_subtrip_input(&seed, seed.own_vehicle_id), None)
        .await
        .unwrap();

    let material = MaterialInfo {
        material_name: "Limestone".to_string(),
        loading_weight: Decimal::from(20),
        rate: Decimal::from(500),
        driver_advance: Some(Decimal::from(2000)),
    };
    let updated = app
        .db
        .add_material_info(seed.tenant_id, subtrip.subtrip_id, &material, None)
        .await
        .unwrap();

    assert_eq!(updated.status(), SubtripStatus::Loaded);

    let expenses = app
        .db
        .list_expenses(seed.tenant_id, subtrip.subtrip_id)
        .await
        .unwrap();
    assert_eq!(expenses.len(), 4);

    let amount_of = |t: ExpenseType| {
        expenses
            .iter()
            .find(|e| e.expense_type == t.as_str())
            .map(|e| e.amount)
    };
    assert_eq!(amount_of(ExpenseType::DriverSalary), Some(Decimal::from(500)));
    assert_eq!(amount_of(ExpenseType::Toll), Some(Decimal::from(300)));
    assert_eq!(amount_of(ExpenseType::RouteAdvance), Some(Decimal::from(1000)));
    assert_eq!(
        amount_of(ExpenseType::DriverAdvance),
        Some(Decimal::from(2000))
    );

    app.cleanup().await;
}

#[tokio::test]
async fn material_entry_skips_auto_expenses_for_market_vehicle() {
    let Some(app) = TestApp::spawn().await else {
        return;
    };
    let seed = seed_master_data(&app.db).await;

    let subtrip = app
        .db
        .create_subtrip(&bare_subtrip_input(&seed, seed.market_vehicle_id), None)
        .await
        .unwrap();

    let material = MaterialInfo {
        material_name: "Limestone".to_string(),
        loading_weight: Decimal::from(20),
        rate: Decimal::from(500),
        driver_advance: None,
    };
    app.db
        .add_material_info(seed.tenant_id, subtrip.subtrip_id, &material, None)
        .await
        .unwrap();

    let expenses = app
        .db
        .list_expenses(seed.tenant_id, subtrip.subtrip_id)
        .await
        .unwrap();
    assert!(expenses.is_empty());

    app.cleanup().await;
}

#[tokio::test]
async fn receipt_with_error_routes_through_error_state() {
    let Some(app) = TestApp::spawn().await else {
        return;
    };
    let seed = seed_master_data(&app.db).await;

    let subtrip = create_loaded_subtrip(&app.db, &seed, seed.market_vehicle_id, 500, 20).await;
    let receipt = ReceiveInfo {
        unloading_weight: Decimal::from(18),
        end_date: date(2026, 8, 3),
        shortage_weight: Some(Decimal::from(2)),
        shortage_rate: Some(Decimal::from(100)),
        has_error: true,
        error_remarks: Some("weighbridge mismatch".to_string()),
    };
    let received = app
        .db
        .receive_subtrip(seed.tenant_id, subtrip.subtrip_id, &receipt, None)
        .await
        .unwrap();
    assert_eq!(received.status(), SubtripStatus::Error);

    let resolved = app
        .db
        .resolve_error(seed.tenant_id, subtrip.subtrip_id, "re-weighed and confirmed", None)
        .await
        .unwrap();
    assert_eq!(resolved.status(), SubtripStatus::Received);
    assert!(!resolved.has_error);

    app.cleanup().await;
}

#[tokio::test]
async fn receiving_requires_loaded_state() {
    let Some(app) = TestApp::spawn().await else {
        return;
    };
    let seed = seed_master_data(&app.db).await;

    let subtrip = app
        .db
        .create_subtrip(&bare_subtrip_input(&seed, seed.own_vehicle_id), None)
        .await
        .unwrap();

    let receipt = ReceiveInfo {
        unloading_weight: Decimal::from(20),
        end_date: date(2026, 8, 3),
        shortage_weight: None,
        shortage_rate: None,
        has_error: false,
        error_remarks: None,
    };
    let err = app
        .db
        .receive_subtrip(seed.tenant_id, subtrip.subtrip_id, &receipt, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    app.cleanup().await;
}

#[tokio::test]
async fn empty_leg_closes_to_billed_and_rejects_updates() {
    let Some(app) = TestApp::spawn().await else {
        return;
    };
    let seed = seed_master_data(&app.db).await;

    let mut input = bare_subtrip_input(&seed, seed.own_vehicle_id);
    input.is_empty = true;
    input.material = Some(MaterialInfo {
        material_name: "Empty".to_string(),
        loading_weight: Decimal::ZERO,
        rate: Decimal::ZERO,
        driver_advance: None,
    });
    let subtrip = app.db.create_subtrip(&input, None).await.unwrap();

    let receipt = ReceiveInfo {
        unloading_weight: Decimal::ZERO,
        end_date: date(2026, 8, 2),
        shortage_weight: None,
        shortage_rate: None,
        has_error: false,
        error_remarks: None,
    };
    app.db
        .receive_subtrip(seed.tenant_id, subtrip.subtrip_id, &receipt, None)
        .await
        .unwrap();

    let closed = app
        .db
        .close_subtrip(seed.tenant_id, subtrip.subtrip_id, None)
        .await
        .unwrap();
    assert_eq!(closed.status(), SubtripStatus::Billed);

    let patch = SubtripPatch {
        remarks: Some("late edit".to_string()),
        ..Default::default()
    };
    let err = app
        .db
        .update_subtrip(seed.tenant_id, subtrip.subtrip_id, &patch, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Locked(_)));

    app.cleanup().await;
}

#[tokio::test]
async fn closing_a_loaded_leg_is_rejected() {
    let Some(app) = TestApp::spawn().await else {
        return;
    };
    let seed = seed_master_data(&app.db).await;

    let subtrip = create_loaded_subtrip(&app.db, &seed, seed.own_vehicle_id, 500, 20).await;
    let err = app
        .db
        .close_subtrip(seed.tenant_id, subtrip.subtrip_id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    app.cleanup().await;
}

#[tokio::test]
async fn update_records_field_level_diff_in_audit_trail() {
    let Some(app) = TestApp::spawn().await else {
        return;
    };
    let seed = seed_master_data(&app.db).await;

    let subtrip =
        create_received_subtrip(&app.db, &seed, seed.market_vehicle_id, 500, 20, 0, 0).await;

    let patch = SubtripPatch {
        rate: Some(Decimal::from(550)),
        ..Default::default()
    };
    let updated = app
        .db
        .update_subtrip(seed.tenant_id, subtrip.subtrip_id, &patch, None)
        .await
        .unwrap();
    assert_eq!(updated.rate, Some(Decimal::from(550)));

    let events = app
        .db
        .list_subtrip_events(seed.tenant_id, subtrip.subtrip_id)
        .await
        .unwrap();
    let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(types, vec!["created", "received", "updated"]);

    let update_event = events.last().unwrap();
    assert_eq!(update_event.details["rate"]["to"], serde_json::json!("550"));

    app.cleanup().await;
}

#[tokio::test]
async fn deleting_a_subtrip_keeps_its_audit_trail() {
    let Some(app) = TestApp::spawn().await else {
        return;
    };
    let seed = seed_master_data(&app.db).await;

    let subtrip = create_loaded_subtrip(&app.db, &seed, seed.market_vehicle_id, 500, 20).await;
    let deleted = app
        .db
        .delete_subtrip(seed.tenant_id, subtrip.subtrip_id)
        .await
        .unwrap();
    assert!(deleted);

    assert!(app
        .db
        .get_subtrip(seed.tenant_id, subtrip.subtrip_id)
        .await
        .unwrap()
        .is_none());

    let events = app
        .db
        .list_subtrip_events(seed.tenant_id, subtrip.subtrip_id)
        .await
        .unwrap();
    assert!(!events.is_empty());

    app.cleanup().await;
}

#[tokio::test]
async fn tenant_isolation_hides_other_tenants_subtrips() {
    let Some(app) = TestApp::spawn().await else {
        return;
    };
    let seed = seed_master_data(&app.db).await;
    let other_seed = seed_master_data(&app.db).await;

    let subtrip = create_loaded_subtrip(&app.db, &seed, seed.market_vehicle_id, 500, 20).await;

    assert!(app
        .db
        .get_subtrip(other_seed.tenant_id, subtrip.subtrip_id)
        .await
        .unwrap()
        .is_none());

    app.cleanup().await;
}
