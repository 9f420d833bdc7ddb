use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use trip_dispatch::api::rest::router;
use trip_dispatch::config::Config;
use trip_dispatch::state::AppState;

const ADMIN_ID: &str = "00000000-0000-0000-0000-00000000a001";

fn test_config() -> Config {
    Config {
        http_port: 0,
        log_level: "info".to_string(),
        event_buffer_size: 64,
        claim_limit: 5,
        commission_percent: 10.0,
        payouts_enabled: true,
    }
}

fn setup() -> axum::Router {
    router(Arc::new(AppState::new(&test_config())))
}

fn admin_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-actor-id", ADMIN_ID)
        .header("x-actor-role", "ADMIN")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn admin_get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("x-actor-id", ADMIN_ID)
        .header("x-actor-role", "ADMIN")
        .body(Body::empty())
        .unwrap()
}

fn driver_post(uri: &str, driver_id: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("x-actor-id", driver_id)
        .header("x-actor-role", "DRIVER")
        .body(Body::empty())
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn create_trip(app: &axum::Router, hours_out: i64, vehicle: &str, amount: f64) -> Value {
    let scheduled_at = (Utc::now() + Duration::hours(hours_out)).to_rfc3339();
    let response = app
        .clone()
        .oneshot(admin_request(
            "POST",
            "/trips",
            json!({
                "scheduledAt": scheduled_at,
                "vehicleType": vehicle,
                "amount": amount,
                "pickupRegion": "Dar es Salaam",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["booking"].clone()
}

async fn create_driver(app: &axum::Router, name: &str, vehicle: &str, region: &str, vip: bool) -> Value {
    let response = app
        .clone()
        .oneshot(admin_request(
            "POST",
            "/drivers",
            json!({
                "name": name,
                "vehicleType": vehicle,
                "region": region,
                "isVipDriver": vip,
                "rating": 4.5,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

async fn claim_trip(app: &axum::Router, trip_id: &str, driver_id: &str) -> axum::response::Response {
    app.clone()
        .oneshot(driver_post(
            &format!("/trips/scheduled/{trip_id}/claims"),
            driver_id,
        ))
        .await
        .unwrap()
}

#[tokio::test]
async fn health_returns_ok() {
    let app = setup();
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["trips"], 0);
    assert_eq!(body["drivers"], 0);
    assert_eq!(body["claims"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let app = setup();
    let response = app.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("claims_created_total"));
}

#[tokio::test]
async fn requests_without_actor_identity_are_rejected() {
    let app = setup();
    let response = app.oneshot(get_request("/trips/scheduled")).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn direct_assign_happy_path_confirms_trip() {
    let app = setup();
    let trip = create_trip(&app, 24, "CAR", 80_000.0).await;
    let driver = create_driver(&app, "Asha", "Car", "Dar es Salaam", false).await;

    let response = app
        .clone()
        .oneshot(admin_request(
            "POST",
            &format!("/trips/{}/assign", trip["id"].as_str().unwrap()),
            json!({
                "driverId": driver["id"],
                "reason": "phone dispatch: customer requested a known driver",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["booking"]["status"], "CONFIRMED");
    assert_eq!(body["booking"]["driverId"], driver["id"]);
}

#[tokio::test]
async fn direct_assign_rejects_non_vip_for_premium_trip() {
    let app = setup();
    let trip = create_trip(&app, 24, "PREMIUM", 200_000.0).await;
    let driver = create_driver(&app, "Juma", "Car", "Dar es Salaam", false).await;

    let response = app
        .clone()
        .oneshot(admin_request(
            "POST",
            &format!("/trips/{}/assign", trip["id"].as_str().unwrap()),
            json!({
                "driverId": driver["id"],
                "reason": "attempt premium dispatch",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["code"], "DRIVER_NOT_ELIGIBLE");
    let reasons: Vec<String> = body["reasons"]
        .as_array()
        .unwrap()
        .iter()
        .map(|reason| reason.as_str().unwrap().to_string())
        .collect();
    assert!(reasons.contains(&"VIP required".to_string()));
}

#[tokio::test]
async fn award_requires_claim_id() {
    let app = setup();
    let trip = create_trip(&app, 24, "CAR", 80_000.0).await;

    let response = app
        .clone()
        .oneshot(admin_request(
            "POST",
            &format!("/trips/scheduled/{}/award", trip["id"].as_str().unwrap()),
            json!({ "reason": "missing claim id" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn award_flow_accepts_winner_and_rejects_siblings() {
    let app = setup();
    let trip = create_trip(&app, 24, "CAR", 80_000.0).await;
    let trip_id = trip["id"].as_str().unwrap().to_string();

    let first = create_driver(&app, "Asha", "Car", "Dar es Salaam", false).await;
    let second = create_driver(&app, "Neema", "Car", "Dar es Salaam", false).await;

    let response = claim_trip(&app, &trip_id, first["id"].as_str().unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);
    let first_claim = body_json(response).await["claim"].clone();

    let response = claim_trip(&app, &trip_id, second["id"].as_str().unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);

    // exactly one pending claim is recommended before the award
    let response = app
        .clone()
        .oneshot(admin_get(&format!("/trips/scheduled/{trip_id}")))
        .await
        .unwrap();
    let detail = body_json(response).await;
    let recommended: Vec<&Value> = detail["claims"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|claim| claim["recommendation"]["recommended"] == true)
        .collect();
    assert_eq!(recommended.len(), 1);

    let response = app
        .clone()
        .oneshot(admin_request(
            "POST",
            &format!("/trips/scheduled/{trip_id}/award"),
            json!({
                "claimId": first_claim["id"],
                "reason": "first responder, solid history",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["booking"]["driverId"], first["id"]);
    assert_eq!(body["booking"]["status"], "CONFIRMED");

    let response = app
        .clone()
        .oneshot(admin_get(&format!("/trips/scheduled/{trip_id}")))
        .await
        .unwrap();
    let detail = body_json(response).await;
    for claim in detail["claims"].as_array().unwrap() {
        if claim["id"] == first_claim["id"] {
            assert_eq!(claim["status"], "ACCEPTED");
        } else {
            assert_eq!(claim["status"], "REJECTED");
        }
    }

    // a second award must hit the already-assigned guard
    let response = app
        .clone()
        .oneshot(admin_request(
            "POST",
            &format!("/trips/scheduled/{trip_id}/award"),
            json!({
                "claimId": first_claim["id"],
                "reason": "double award",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "ALREADY_ASSIGNED");
}

#[tokio::test]
async fn reassign_moves_trip_and_blocks_same_driver() {
    let app = setup();
    let trip = create_trip(&app, 24, "CAR", 80_000.0).await;
    let trip_id = trip["id"].as_str().unwrap().to_string();

    let first = create_driver(&app, "Asha", "Car", "Dar es Salaam", false).await;
    let second = create_driver(&app, "Neema", "Car", "Dar es Salaam", false).await;

    let response = claim_trip(&app, &trip_id, first["id"].as_str().unwrap()).await;
    let first_claim = body_json(response).await["claim"].clone();
    let response = claim_trip(&app, &trip_id, second["id"].as_str().unwrap()).await;
    let second_claim = body_json(response).await["claim"].clone();

    let response = app
        .clone()
        .oneshot(admin_request(
            "POST",
            &format!("/trips/scheduled/{trip_id}/award"),
            json!({ "claimId": first_claim["id"], "reason": "initial award" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // reassigning to the current driver's own claim is a conflict
    let response = app
        .clone()
        .oneshot(admin_request(
            "POST",
            &format!("/trips/scheduled/{trip_id}/reassign"),
            json!({ "claimId": first_claim["id"], "reason": "same driver" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "SAME_DRIVER");

    let response = app
        .clone()
        .oneshot(admin_request(
            "POST",
            &format!("/trips/scheduled/{trip_id}/reassign"),
            json!({ "claimId": second_claim["id"], "reason": "first driver unreachable" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["booking"]["driverId"], second["id"]);
}

#[tokio::test]
async fn direct_unassign_reopens_claims() {
    let app = setup();
    let trip = create_trip(&app, 24, "CAR", 80_000.0).await;
    let trip_id = trip["id"].as_str().unwrap().to_string();

    let first = create_driver(&app, "Asha", "Car", "Dar es Salaam", false).await;
    let second = create_driver(&app, "Neema", "Car", "Dar es Salaam", false).await;

    let response = claim_trip(&app, &trip_id, first["id"].as_str().unwrap()).await;
    let first_claim = body_json(response).await["claim"].clone();
    claim_trip(&app, &trip_id, second["id"].as_str().unwrap()).await;

    let response = app
        .clone()
        .oneshot(admin_request(
            "POST",
            &format!("/trips/scheduled/{trip_id}/award"),
            json!({ "claimId": first_claim["id"], "reason": "initial award" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(admin_request(
            "POST",
            &format!("/trips/{trip_id}/unassign"),
            json!({ "reason": "driver vehicle broke down" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["booking"]["driverId"], Value::Null);
    assert_eq!(body["booking"]["status"], "PENDING");

    let response = app
        .clone()
        .oneshot(admin_get(&format!("/trips/scheduled/{trip_id}")))
        .await
        .unwrap();
    let detail = body_json(response).await;
    for claim in detail["claims"].as_array().unwrap() {
        assert_eq!(claim["status"], "PENDING");
        assert_eq!(claim["reviewedAt"], Value::Null);
        assert_eq!(claim["reviewedBy"], Value::Null);
    }
}

#[tokio::test]
async fn duplicate_and_over_limit_claims_are_rejected() {
    let app = setup();
    let trip = create_trip(&app, 24, "CAR", 80_000.0).await;
    let trip_id = trip["id"].as_str().unwrap().to_string();

    let first = create_driver(&app, "Asha", "Car", "Dar es Salaam", false).await;
    let first_id = first["id"].as_str().unwrap().to_string();

    let response = claim_trip(&app, &trip_id, &first_id).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = claim_trip(&app, &trip_id, &first_id).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "DUPLICATE_CLAIM");

    for index in 0..4 {
        let driver = create_driver(
            &app,
            &format!("Driver {index}"),
            "Car",
            "Dar es Salaam",
            false,
        )
        .await;
        let response = claim_trip(&app, &trip_id, driver["id"].as_str().unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let sixth = create_driver(&app, "Late Driver", "Car", "Dar es Salaam", false).await;
    let response = claim_trip(&app, &trip_id, sixth["id"].as_str().unwrap()).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "CLAIM_LIMIT_REACHED");
}

#[tokio::test]
async fn claims_outside_the_window_are_rejected() {
    let app = setup();
    let trip = create_trip(&app, 100, "CAR", 80_000.0).await;
    let driver = create_driver(&app, "Asha", "Car", "Dar es Salaam", false).await;

    let response = claim_trip(
        &app,
        trip["id"].as_str().unwrap(),
        driver["id"].as_str().unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "CLAIM_WINDOW_CLOSED");
}

#[tokio::test]
async fn payout_flow_requires_acknowledgement_and_pays_once() {
    let app = setup();
    let trip = create_trip(&app, 24, "CAR", 100_000.0).await;
    let trip_id = trip["id"].as_str().unwrap().to_string();
    let driver = create_driver(&app, "Asha", "Car", "Dar es Salaam", false).await;

    let response = app
        .clone()
        .oneshot(admin_request(
            "POST",
            &format!("/trips/{trip_id}/assign"),
            json!({ "driverId": driver["id"], "reason": "dispatch for payout flow" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    for action in ["start", "complete"] {
        let response = app
            .clone()
            .oneshot(admin_request(
                "POST",
                &format!("/trips/{trip_id}/{action}"),
                json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    // missing acknowledgement surfaces the breakdown instead of applying
    let response = app
        .clone()
        .oneshot(admin_request(
            "POST",
            &format!("/trips/{trip_id}/payout/approve"),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["code"], "COMMISSION_NOT_ACKNOWLEDGED");
    assert_eq!(body["commission"]["commissionAmount"], 10_000.0);
    assert_eq!(body["commission"]["netPaid"], 90_000.0);

    let response = app
        .clone()
        .oneshot(admin_request(
            "POST",
            &format!("/trips/{trip_id}/payout/pay"),
            json!({ "acknowledgeCommission": true, "paymentMethod": "mpesa" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["payout"]["status"], "PAID");
    assert_eq!(body["payout"]["commissionAmount"], 10_000.0);
    assert_eq!(body["payout"]["netPaid"], 90_000.0);

    let response = app
        .clone()
        .oneshot(admin_request(
            "POST",
            &format!("/trips/{trip_id}/payout/pay"),
            json!({ "acknowledgeCommission": true }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "ALREADY_PAID");
}

#[tokio::test]
async fn cancel_enforces_reason_length() {
    let app = setup();
    let trip = create_trip(&app, 24, "CAR", 80_000.0).await;
    let trip_id = trip["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(admin_request(
            "POST",
            &format!("/trips/{trip_id}/cancel"),
            json!({ "reason": "too short" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(admin_request(
            "POST",
            &format!("/trips/{trip_id}/cancel"),
            json!({ "reason": "Customer canceled the airport pickup because the inbound flight was rescheduled." }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["booking"]["status"], "CANCELED");
}

#[tokio::test]
async fn scheduled_list_filters_by_stage_and_derives_claim_fields() {
    let app = setup();
    create_trip(&app, 24, "CAR", 80_000.0).await;
    create_trip(&app, 200, "CAR", 80_000.0).await;

    let response = app
        .clone()
        .oneshot(admin_get("/trips/scheduled?stage=claim_open"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["total"], 1);

    let item = &body["items"][0];
    assert_eq!(item["stage"], "claim_open");
    assert_eq!(item["canClaimNow"], true);
    assert_eq!(item["claimsRemaining"], 5);
    assert!(item["claimOpensAt"].is_string());

    let response = app
        .clone()
        .oneshot(admin_get("/trips/scheduled?stage=waiting"))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["items"][0]["stage"], "waiting");
}

#[tokio::test]
async fn eligible_drivers_returns_only_matching_drivers() {
    let app = setup();
    let trip = create_trip(&app, 24, "CAR", 80_000.0).await;
    let matching = create_driver(&app, "Asha", "Car", "Dar es Salaam", false).await;
    create_driver(&app, "Baraka", "Boda", "Arusha", false).await;

    let response = app
        .clone()
        .oneshot(admin_get(&format!(
            "/trips/{}/eligible-drivers",
            trip["id"].as_str().unwrap()
        )))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["items"][0]["id"], matching["id"]);
}

#[tokio::test]
async fn audit_trail_records_assignment_provenance() {
    let app = setup();
    let trip = create_trip(&app, 24, "CAR", 80_000.0).await;
    let trip_id = trip["id"].as_str().unwrap().to_string();
    let driver = create_driver(&app, "Asha", "Car", "Dar es Salaam", false).await;

    let response = app
        .clone()
        .oneshot(admin_request(
            "POST",
            &format!("/trips/{trip_id}/assign"),
            json!({ "driverId": driver["id"], "reason": "manual dispatch for audit check" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(admin_get(&format!("/trips/{trip_id}/audit")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let entries = body["items"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["action"], "DIRECT_ASSIGN");
    assert_eq!(entries[0]["after"]["driverId"], driver["id"]);
    assert_eq!(entries[0]["before"]["driverId"], Value::Null);
}
