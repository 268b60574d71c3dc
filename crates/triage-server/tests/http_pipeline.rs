mod common;

use std::sync::Arc;

use common::{case_routes, TestServer, FRONTEND};
use reqwest::header;
use reqwest::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use triage_server::{OpenCaseAccess, RouteGroup};

#[tokio::test]
async fn route_group_receives_parsed_json() {
    let server = TestServer::start().await;
    let resp = reqwest::Client::new()
        .post(server.url("/api/cases"))
        .json(&json!({"name": "Ransomware on FS01"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["received"]["name"], "Ransomware on FS01");
    server.handle.shutdown().await;
}

#[tokio::test]
async fn route_group_receives_parsed_form() {
    let server = TestServer::start().await;
    let resp = reqwest::Client::new()
        .post(server.url("/api/cases"))
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body("name=Phishing&priority=high")
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["received"], json!({"name": "Phishing", "priority": "high"}));
    server.handle.shutdown().await;
}

#[tokio::test]
async fn every_response_carries_security_headers() {
    let server = TestServer::start().await;
    let resp = reqwest::get(server.url("/api/cases/12")).await.unwrap();
    let h = resp.headers();
    let csp = h["content-security-policy"].to_str().unwrap();
    assert!(csp.contains("font-src 'self' https://fonts.gstatic.com"));
    assert!(csp.contains("style-src 'self' 'unsafe-inline' https://fonts.googleapis.com"));
    assert_eq!(h["x-content-type-options"], "nosniff");
    assert_eq!(h["x-frame-options"], "SAMEORIGIN");
    assert_eq!(h["referrer-policy"], "no-referrer");
    server.handle.shutdown().await;
}

#[tokio::test]
async fn cors_allows_only_frontend_origin() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let allowed = client
        .request(reqwest::Method::OPTIONS, server.url("/api/cases"))
        .header(header::ORIGIN, FRONTEND)
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .send()
        .await
        .unwrap();
    assert_eq!(allowed.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], FRONTEND);
    assert_eq!(allowed.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");

    let foreign = client
        .request(reqwest::Method::OPTIONS, server.url("/api/cases"))
        .header(header::ORIGIN, "https://attacker.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .send()
        .await
        .unwrap();
    assert!(foreign
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
    server.handle.shutdown().await;
}

#[tokio::test]
async fn api_requests_past_the_cap_get_429() {
    let server = TestServer::start_with(case_routes(), Arc::new(OpenCaseAccess), |c| {
        c.rate_limit.max_requests = 3;
    })
    .await;

    for _ in 0..3 {
        let resp = reqwest::get(server.url("/api/cases/1")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
    let resp = reqwest::get(server.url("/api/cases/1")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(resp.headers().contains_key(header::RETRY_AFTER));
    assert_eq!(
        resp.text().await.unwrap(),
        "Too many requests, please try again later."
    );

    let health = reqwest::get(server.url("/health")).await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);
    server.handle.shutdown().await;
}

#[tokio::test]
async fn oversized_and_malformed_bodies_are_rejected() {
    let server = TestServer::start_with(case_routes(), Arc::new(OpenCaseAccess), |c| {
        c.body_limit = 1024;
    })
    .await;
    let client = reqwest::Client::new();

    let big = json!({"blob": "a".repeat(4096)});
    let resp = client
        .post(server.url("/api/cases"))
        .json(&big)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);

    let resp = client
        .post(server.url("/api/cases"))
        .header(header::CONTENT_TYPE, "application/json")
        .body("{\"name\":")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert!(body.get("stack").is_none());
    server.handle.shutdown().await;
}

#[tokio::test]
async fn json_extractor_accepts_multi_megabyte_evidence() {
    let evidence = Router::new().route(
        "/",
        post(|Json(v): Json<Value>| async move {
            Json(json!({"stored": v["image"].as_str().map_or(0, str::len)}))
        }),
    );
    let routes = case_routes().mount(RouteGroup::Evidence, evidence);
    let server = TestServer::start_with(routes, Arc::new(OpenCaseAccess), |_| {}).await;

    let image = "A".repeat(3 * 1024 * 1024);
    let resp = reqwest::Client::new()
        .post(server.url("/api/evidence"))
        .json(&json!({"image": image}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["stored"], 3 * 1024 * 1024);
    server.handle.shutdown().await;
}

#[tokio::test]
async fn unmatched_requests_get_route_not_found() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    for (method, path) in [
        (reqwest::Method::GET, "/api/unknown"),
        (reqwest::Method::DELETE, "/api/reports/5"),
        (reqwest::Method::GET, "/no/such/file.js"),
    ] {
        let resp = client.request(method, server.url(path)).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{path}");
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body, json!({"success": false, "message": "Route not found"}));
    }
    server.handle.shutdown().await;
}

#[tokio::test]
async fn serves_uploads_and_public_files() {
    let server = TestServer::start().await;
    std::fs::write(server.dir.path().join("uploads/report.txt"), "case report").unwrap();
    std::fs::write(server.dir.path().join("public/app.js"), "console.log(1)").unwrap();

    let resp = reqwest::get(server.url("/uploads/report.txt")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "case report");

    let resp = reqwest::get(server.url("/app.js")).await.unwrap();
    assert_eq!(resp.text().await.unwrap(), "console.log(1)");
    server.handle.shutdown().await;
}
