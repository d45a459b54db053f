use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use ride_dispatch::api::rest::router;
use ride_dispatch::state::AppState;
use serde_json::{json, Value};
use tower::ServiceExt;

fn setup() -> (axum::Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(1024, Duration::from_secs(15)));
    (router(state.clone()), state)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn authed_json(method: &str, uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn authed_get(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
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

/// Registers a profile and returns its (bearer token, id).
async fn register(app: &axum::Router, name: &str, role: &str) -> (String, String) {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/register",
            json!({ "full_name": name, "phone": "+2348000000000", "role": role }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    (
        body["token"].as_str().unwrap().to_string(),
        body["profile"]["id"].as_str().unwrap().to_string(),
    )
}

fn booking_payload(key: &str) -> Value {
    json!({
        "service_type": "airport",
        "service_id": "gx470",
        "date": "2024-05-01",
        "pickup_details": { "pickup": "Marina", "destination": "Airport", "time": "09:30" },
        "contact_info": { "phone": "+2348000000001" },
        "idempotency_key": key
    })
}

async fn create_booking(app: &axum::Router, token: &str, key: &str) -> Value {
    let response = app
        .clone()
        .oneshot(authed_json("POST", "/bookings", token, booking_payload(key)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

async fn assign(app: &axum::Router, admin_token: &str, booking_id: &str, driver_id: &str) {
    let response = app
        .clone()
        .oneshot(authed_json(
            "POST",
            &format!("/bookings/{booking_id}/assign"),
            admin_token,
            json!({ "driver_id": driver_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

async fn set_status(
    app: &axum::Router,
    token: &str,
    booking_id: &str,
    status: &str,
) -> axum::response::Response {
    app.clone()
        .oneshot(authed_json(
            "PATCH",
            &format!("/bookings/{booking_id}/status"),
            token,
            json!({ "status": status }),
        ))
        .await
        .unwrap()
}

async fn driver_status_of(app: &axum::Router, admin_token: &str, driver_id: &str) -> String {
    let response = app
        .clone()
        .oneshot(authed_get("/drivers", admin_token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let drivers = body_json(response).await;
    drivers
        .as_array()
        .unwrap()
        .iter()
        .find(|driver| driver["id"] == driver_id)
        .unwrap()["driver_status"]
        .as_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["profiles"], 0);
    assert_eq!(body["bookings"], 0);
    assert_eq!(body["online_drivers"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_string(response).await;
    assert!(body.contains("online_drivers"));
}

#[tokio::test]
async fn register_sets_duty_status_for_drivers_only() {
    let (app, _state) = setup();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/register",
            json!({ "full_name": "Tunde", "role": "driver" }),
        ))
        .await
        .unwrap();
    let driver = body_json(response).await;
    assert_eq!(driver["profile"]["driver_status"], "offline");
    assert!(driver["token"].as_str().unwrap().len() > 0);

    let response = app
        .oneshot(json_request(
            "POST",
            "/register",
            json!({ "full_name": "Amara", "role": "passenger" }),
        ))
        .await
        .unwrap();
    let passenger = body_json(response).await;
    assert!(passenger["profile"]["driver_status"].is_null());
}

#[tokio::test]
async fn create_booking_requires_authentication() {
    let (app, _state) = setup();
    let response = app
        .oneshot(json_request("POST", "/bookings", booking_payload("k1")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_booking_starts_pending_with_share_token() {
    let (app, _state) = setup();
    let (token, _) = register(&app, "Amara", "passenger").await;

    let booking = create_booking(&app, &token, "k1").await;

    assert_eq!(booking["status"], "pending");
    assert!(booking["driver_id"].is_null());
    assert!(booking["share_token"].as_str().unwrap().len() > 0);
    assert_eq!(booking["pickup_details"]["pickup"], "Marina");
}

#[tokio::test]
async fn duplicate_idempotency_key_creates_exactly_one_booking() {
    let (app, _state) = setup();
    let (token, _) = register(&app, "Amara", "passenger").await;

    create_booking(&app, &token, "k1").await;

    let response = app
        .clone()
        .oneshot(authed_json("POST", "/bookings", &token, booking_payload("k1")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["kind"], "duplicate_request");

    let response = app.oneshot(authed_get("/bookings", &token)).await.unwrap();
    let bookings = body_json(response).await;
    assert_eq!(bookings.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn empty_idempotency_key_is_rejected() {
    let (app, _state) = setup();
    let (token, _) = register(&app, "Amara", "passenger").await;

    let response = app
        .oneshot(authed_json("POST", "/bookings", &token, booking_payload("  ")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn booking_list_is_scoped_to_the_owner() {
    let (app, _state) = setup();
    let (amara, _) = register(&app, "Amara", "passenger").await;
    let (bola, _) = register(&app, "Bola", "passenger").await;

    create_booking(&app, &amara, "k1").await;

    let response = app.oneshot(authed_get("/bookings", &bola)).await.unwrap();
    let bookings = body_json(response).await;
    assert_eq!(bookings.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn assign_requires_admin_role() {
    let (app, _state) = setup();
    let (passenger, _) = register(&app, "Amara", "passenger").await;
    let (_, driver_id) = register(&app, "Tunde", "driver").await;
    let booking = create_booking(&app, &passenger, "k1").await;

    let response = app
        .oneshot(authed_json(
            "POST",
            &format!("/bookings/{}/assign", booking["id"].as_str().unwrap()),
            &passenger,
            json!({ "driver_id": driver_id }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn assignment_marks_the_driver_busy() {
    let (app, _state) = setup();
    let (passenger, _) = register(&app, "Amara", "passenger").await;
    let (_, driver_id) = register(&app, "Tunde", "driver").await;
    let (admin, _) = register(&app, "Dispatch", "admin").await;
    let booking = create_booking(&app, &passenger, "k1").await;
    let booking_id = booking["id"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(authed_json(
            "POST",
            &format!("/bookings/{booking_id}/assign"),
            &admin,
            json!({ "driver_id": driver_id, "price": 45000.0 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let assigned = body_json(response).await;
    assert_eq!(assigned["status"], "assigned");
    assert_eq!(assigned["driver_id"], driver_id.as_str());
    assert_eq!(assigned["price"], 45000.0);

    assert_eq!(driver_status_of(&app, &admin, &driver_id).await, "busy");
}

#[tokio::test]
async fn assigning_an_already_assigned_booking_conflicts() {
    let (app, _state) = setup();
    let (passenger, _) = register(&app, "Amara", "passenger").await;
    let (_, driver_a) = register(&app, "Tunde", "driver").await;
    let (_, driver_b) = register(&app, "Segun", "driver").await;
    let (admin, _) = register(&app, "Dispatch", "admin").await;
    let booking = create_booking(&app, &passenger, "k1").await;
    let booking_id = booking["id"].as_str().unwrap();

    assign(&app, &admin, booking_id, &driver_a).await;

    let response = app
        .oneshot(authed_json(
            "POST",
            &format!("/bookings/{booking_id}/assign"),
            &admin,
            json!({ "driver_id": driver_b }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["kind"], "invalid_transition");
}

#[tokio::test]
async fn assigning_an_unknown_driver_returns_404() {
    let (app, _state) = setup();
    let (passenger, _) = register(&app, "Amara", "passenger").await;
    let (admin, _) = register(&app, "Dispatch", "admin").await;
    let booking = create_booking(&app, &passenger, "k1").await;

    let response = app
        .oneshot(authed_json(
            "POST",
            &format!("/bookings/{}/assign", booking["id"].as_str().unwrap()),
            &admin,
            json!({ "driver_id": "00000000-0000-0000-0000-000000000000" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn driver_runs_the_trip_to_completion() {
    let (app, _state) = setup();
    let (passenger, _) = register(&app, "Amara", "passenger").await;
    let (driver, driver_id) = register(&app, "Tunde", "driver").await;
    let (admin, _) = register(&app, "Dispatch", "admin").await;
    let booking = create_booking(&app, &passenger, "k1").await;
    let booking_id = booking["id"].as_str().unwrap();

    assign(&app, &admin, booking_id, &driver_id).await;

    let response = set_status(&app, &driver, booking_id, "driver_accepted").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "driver_accepted");

    let response = set_status(&app, &driver, booking_id, "en_route").await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = set_status(&app, &driver, booking_id, "completed").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "completed");

    assert_eq!(driver_status_of(&app, &admin, &driver_id).await, "available");
}

#[tokio::test]
async fn only_the_assigned_driver_may_accept() {
    let (app, _state) = setup();
    let (passenger, _) = register(&app, "Amara", "passenger").await;
    let (_, driver_id) = register(&app, "Tunde", "driver").await;
    let (other_driver, _) = register(&app, "Segun", "driver").await;
    let (admin, _) = register(&app, "Dispatch", "admin").await;
    let booking = create_booking(&app, &passenger, "k1").await;
    let booking_id = booking["id"].as_str().unwrap();

    assign(&app, &admin, booking_id, &driver_id).await;

    let response = set_status(&app, &other_driver, booking_id, "driver_accepted").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn passenger_cannot_cancel_en_route() {
    let (app, _state) = setup();
    let (passenger, _) = register(&app, "Amara", "passenger").await;
    let (driver, driver_id) = register(&app, "Tunde", "driver").await;
    let (admin, _) = register(&app, "Dispatch", "admin").await;
    let booking = create_booking(&app, &passenger, "k1").await;
    let booking_id = booking["id"].as_str().unwrap();

    assign(&app, &admin, booking_id, &driver_id).await;
    set_status(&app, &driver, booking_id, "driver_accepted").await;
    set_status(&app, &driver, booking_id, "en_route").await;

    let response = app
        .clone()
        .oneshot(authed_json(
            "POST",
            &format!("/bookings/{booking_id}/cancel"),
            &passenger,
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["kind"], "invalid_transition");

    let response = app.oneshot(authed_get("/bookings", &passenger)).await.unwrap();
    let bookings = body_json(response).await;
    assert_eq!(bookings[0]["status"], "en_route");
}

#[tokio::test]
async fn passenger_cancel_releases_the_assigned_driver() {
    let (app, _state) = setup();
    let (passenger, _) = register(&app, "Amara", "passenger").await;
    let (_, driver_id) = register(&app, "Tunde", "driver").await;
    let (admin, _) = register(&app, "Dispatch", "admin").await;
    let booking = create_booking(&app, &passenger, "k1").await;
    let booking_id = booking["id"].as_str().unwrap();

    assign(&app, &admin, booking_id, &driver_id).await;

    let response = app
        .clone()
        .oneshot(authed_json(
            "POST",
            &format!("/bookings/{booking_id}/cancel"),
            &passenger,
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "cancelled");

    assert_eq!(driver_status_of(&app, &admin, &driver_id).await, "available");
}

#[tokio::test]
async fn only_the_owner_may_cancel() {
    let (app, _state) = setup();
    let (amara, _) = register(&app, "Amara", "passenger").await;
    let (bola, _) = register(&app, "Bola", "passenger").await;
    let booking = create_booking(&app, &amara, "k1").await;

    let response = app
        .oneshot(authed_json(
            "POST",
            &format!("/bookings/{}/cancel", booking["id"].as_str().unwrap()),
            &bola,
            json!({}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_cancel_works_en_route() {
    let (app, _state) = setup();
    let (passenger, _) = register(&app, "Amara", "passenger").await;
    let (driver, driver_id) = register(&app, "Tunde", "driver").await;
    let (admin, _) = register(&app, "Dispatch", "admin").await;
    let booking = create_booking(&app, &passenger, "k1").await;
    let booking_id = booking["id"].as_str().unwrap();

    assign(&app, &admin, booking_id, &driver_id).await;
    set_status(&app, &driver, booking_id, "driver_accepted").await;
    set_status(&app, &driver, booking_id, "en_route").await;

    let response = set_status(&app, &admin, booking_id, "cancelled").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "cancelled");

    assert_eq!(driver_status_of(&app, &admin, &driver_id).await, "available");
}

#[tokio::test]
async fn dispatch_board_requires_admin() {
    let (app, _state) = setup();
    let (passenger, _) = register(&app, "Amara", "passenger").await;

    let response = app
        .oneshot(authed_get("/dispatch/board", &passenger))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn dispatch_board_joins_both_parties() {
    let (app, _state) = setup();
    let (passenger, _) = register(&app, "Amara", "passenger").await;
    let (_, driver_id) = register(&app, "Tunde", "driver").await;
    let (admin, _) = register(&app, "Dispatch", "admin").await;
    let booking = create_booking(&app, &passenger, "k1").await;

    assign(&app, &admin, booking["id"].as_str().unwrap(), &driver_id).await;

    let response = app
        .oneshot(authed_get("/dispatch/board", &admin))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let rows = body_json(response).await;
    let row = &rows.as_array().unwrap()[0];
    assert_eq!(row["booking"]["status"], "assigned");
    assert_eq!(row["passenger"]["full_name"], "Amara");
    assert_eq!(row["driver"]["full_name"], "Tunde");
}

#[tokio::test]
async fn driver_roster_requires_admin() {
    let (app, _state) = setup();
    let (driver, _) = register(&app, "Tunde", "driver").await;

    let response = app.oneshot(authed_get("/drivers", &driver)).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn driver_toggles_own_duty_status() {
    let (app, _state) = setup();
    let (driver, _) = register(&app, "Tunde", "driver").await;

    let response = app
        .clone()
        .oneshot(authed_json(
            "PATCH",
            "/drivers/status",
            &driver,
            json!({ "status": "available" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["driver_status"], "available");

    let (passenger, _) = register(&app, "Amara", "passenger").await;
    let response = app
        .oneshot(authed_json(
            "PATCH",
            "/drivers/status",
            &passenger,
            json!({ "status": "available" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn going_offline_clears_the_presence_snapshot() {
    let (app, state) = setup();
    let (driver, _) = register(&app, "Tunde", "driver").await;

    let response = app
        .clone()
        .oneshot(authed_json(
            "POST",
            "/drivers/position",
            &driver,
            json!({ "location": { "lat": 6.45, "lng": 3.40 } }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(state.presence.online_count(), 1);

    let response = app
        .oneshot(authed_json(
            "PATCH",
            "/drivers/status",
            &driver,
            json!({ "status": "offline" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(state.presence.online_count(), 0);
}

#[tokio::test]
async fn position_publish_requires_driver_role() {
    let (app, _state) = setup();
    let (passenger, _) = register(&app, "Amara", "passenger").await;

    let response = app
        .oneshot(authed_json(
            "POST",
            "/drivers/position",
            &passenger,
            json!({ "location": { "lat": 6.45, "lng": 3.40 } }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn tracking_token_resolves_without_authentication() {
    let (app, _state) = setup();
    let (passenger, _) = register(&app, "Amara", "passenger").await;
    let (_, driver_id) = register(&app, "Tunde", "driver").await;
    let (admin, _) = register(&app, "Dispatch", "admin").await;
    let booking = create_booking(&app, &passenger, "k1").await;
    let share_token = booking["share_token"].as_str().unwrap();

    assign(&app, &admin, booking["id"].as_str().unwrap(), &driver_id).await;

    let response = app
        .clone()
        .oneshot(get_request(&format!("/track/{share_token}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let view = body_json(response).await;
    assert_eq!(view["status"], "assigned");
    assert_eq!(view["driver"]["full_name"], "Tunde");
    assert!(view.get("passenger").is_none());
}

#[tokio::test]
async fn unknown_tracking_token_returns_404() {
    let (app, _state) = setup();
    let response = app
        .oneshot(get_request(
            "/track/00000000-0000-0000-0000-000000000000",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn rating_is_allowed_once_after_completion() {
    let (app, _state) = setup();
    let (passenger, _) = register(&app, "Amara", "passenger").await;
    let (driver, driver_id) = register(&app, "Tunde", "driver").await;
    let (admin, _) = register(&app, "Dispatch", "admin").await;
    let booking = create_booking(&app, &passenger, "k1").await;
    let booking_id = booking["id"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(authed_json(
            "POST",
            &format!("/bookings/{booking_id}/rating"),
            &passenger,
            json!({ "score": 5 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    assign(&app, &admin, booking_id, &driver_id).await;
    set_status(&app, &driver, booking_id, "driver_accepted").await;
    set_status(&app, &driver, booking_id, "completed").await;

    let response = app
        .clone()
        .oneshot(authed_json(
            "POST",
            &format!("/bookings/{booking_id}/rating"),
            &passenger,
            json!({ "score": 5, "comment": "smooth ride" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let rating = body_json(response).await;
    assert_eq!(rating["driver_id"], driver_id.as_str());
    assert_eq!(rating["score"], 5);

    let response = app
        .oneshot(authed_json(
            "POST",
            &format!("/bookings/{booking_id}/rating"),
            &passenger,
            json!({ "score": 4 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["kind"], "duplicate_request");
}

#[tokio::test]
async fn rating_score_is_validated() {
    let (app, _state) = setup();
    let (passenger, _) = register(&app, "Amara", "passenger").await;
    let booking = create_booking(&app, &passenger, "k1").await;

    let response = app
        .oneshot(authed_json(
            "POST",
            &format!("/bookings/{}/rating", booking["id"].as_str().unwrap()),
            &passenger,
            json!({ "score": 9 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
