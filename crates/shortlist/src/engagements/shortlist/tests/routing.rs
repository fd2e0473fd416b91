use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use super::common::*;

fn company_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-actor-kind", "company")
        .header("x-actor-id", "acme")
        .body(Body::from(body.to_string()))
        .expect("request builds")
}

fn operator_request(method: &str, uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-actor-kind", "operator")
        .header("x-actor-id", "op-nina");
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request builds")
}

fn create_body() -> serde_json::Value {
    json!({
        "requirements": {
            "title": "Senior Backend Engineer",
            "required_skills": ["Rust", "Postgres"],
            "seniority": "senior",
            "location": {
                "city": "Berlin",
                "country": "Germany",
                "timezone_offset_hours": 1
            },
            "remote_allowed": true
        }
    })
}

#[tokio::test]
async fn create_route_accepts_company_submissions() {
    let (service, _, _, _, _) = build_service();
    let app = router(service);

    let response = app
        .oneshot(company_request("POST", "/api/v1/shortlists", create_body()))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], "submitted");
    assert_eq!(payload["pricing_type"], "new");
    assert!(payload.get("id").is_some());
}

#[tokio::test]
async fn routes_reject_missing_actor_headers() {
    let (service, _, _, _, _) = build_service();
    let app = router(service);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/shortlists")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(create_body().to_string()))
                .expect("request builds"),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn operator_routes_reject_company_callers() {
    let (service, _, _, _, _) = build_service();
    let request = service
        .create(&company(), requirements(), None, now())
        .expect("creates");
    let app = router(service);

    let response = app
        .oneshot(company_request(
            "POST",
            &format!("/api/v1/shortlists/{}/process", request.id.0),
            json!({ "pool": [] }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn guard_violations_map_to_unprocessable_entity() {
    let (service, _, _, _, _) = build_service();
    let request = service
        .create(&company(), requirements(), None, now())
        .expect("creates");
    let app = router(service);

    // Scope cannot be proposed before the search starts.
    let response = app
        .oneshot(operator_request(
            "POST",
            &format!("/api/v1/shortlists/{}/scope", request.id.0),
            Some(json!({
                "price": { "amount_minor": 90000, "currency": "usd" },
                "candidate_count": 3
            })),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let payload = read_json_body(response).await;
    assert!(payload["error"]
        .as_str()
        .expect("error message")
        .contains("cannot propose scope"));
}

#[tokio::test]
async fn unknown_requests_map_to_not_found() {
    let (service, _, _, _, _) = build_service();
    let app = router(service);

    let response = app
        .oneshot(operator_request(
            "GET",
            "/api/v1/shortlists/req-nope",
            None,
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn events_route_returns_the_audit_trail_in_order() {
    let (service, _, _, _, _) = build_service();
    let request = service
        .create(&company(), requirements(), None, now())
        .expect("creates");
    service
        .start_processing(&operator(), &request.id, &pool(), now())
        .expect("starts");
    let app = router(service);

    let response = app
        .oneshot(operator_request(
            "GET",
            &format!("/api/v1/shortlists/{}/events", request.id.0),
            None,
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    let rows = payload.as_array().expect("event array");
    assert!(rows.len() >= 2);
    assert_eq!(rows[0]["event_type"], "submitted");
}
