//! E2E tests for profiles, usernames and user search

mod common;

use common::TestServer;
use serde_json::{Value, json};

#[tokio::test]
async fn test_signup_creates_profile_with_zero_counters() {
    let server = TestServer::new().await;
    server.signup("u1", "Alice", "artisan").await;

    let profile = server.profile("u1").await;
    assert_eq!(profile["id"], "u1");
    assert_eq!(profile["displayName"], "Alice");
    assert_eq!(profile["userType"], "artisan");
    assert_eq!(profile["followers"], 0);
    assert_eq!(profile["following"], 0);
    assert_eq!(profile["posts"], 0);
}

#[tokio::test]
async fn test_unknown_profile_is_404() {
    let server = TestServer::new().await;

    let response = server
        .client
        .get(&server.url("/api/v1/users/nobody"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
    let json: Value = response.json().await.unwrap();
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn test_signup_validation_errors() {
    let server = TestServer::new().await;
    let token = server.token_for("u1");

    let response = server
        .client
        .post(&server.url("/api/v1/users"))
        .bearer_auth(&token)
        .json(&json!({ "displayName": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let response = server
        .client
        .post(&server.url("/api/v1/users"))
        .bearer_auth(&token)
        .json(&json!({ "displayName": "Alice", "userType": "wizard" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let json: Value = response.json().await.unwrap();
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn test_username_update_and_conflict() {
    let server = TestServer::new().await;
    let alice = server.signup("u1", "Alice", "artisan").await;
    let bob = server.signup("u2", "Bob", "artisan").await;

    let response = server
        .client
        .patch(&server.url("/api/v1/users/me/username"))
        .bearer_auth(&alice)
        .json(&json!({ "username": "  Clay_Studio " }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let json: Value = response.json().await.unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["username"], "clay_studio");

    let response = server
        .client
        .patch(&server.url("/api/v1/users/me/username"))
        .bearer_auth(&bob)
        .json(&json!({ "username": "clay_studio" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);
    let json: Value = response.json().await.unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "username is already taken");

    let response = server
        .client
        .patch(&server.url("/api/v1/users/me/username"))
        .bearer_auth(&bob)
        .json(&json!({ "username": "no" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_search_excludes_caller_and_filters_category() {
    let server = TestServer::new().await;
    let alice = server.signup("u1", "Alice Weaver", "artisan").await;
    server.signup("u2", "Bob Weaver", "artisan").await;
    server.signup("u3", "Carol Weaver", "customer").await;

    let results: Vec<Value> = server
        .client
        .get(&server.url("/api/v1/users/search?q=weaver"))
        .bearer_auth(&alice)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let mut ids: Vec<&str> = results.iter().map(|p| p["id"].as_str().unwrap()).collect();
    ids.sort();
    assert_eq!(ids, ["u2", "u3"]);

    let results: Vec<Value> = server
        .client
        .get(&server.url("/api/v1/users/search?q=weaver&category=customer"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["id"], "u3");
}
