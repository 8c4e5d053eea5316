//! E2E tests for posts and live streams

mod common;

use std::time::Duration;

use common::{SseReader, TestServer};
use serde_json::{Value, json};

async fn create_post(server: &TestServer, token: &str, title: &str) -> reqwest::Response {
    server
        .client
        .post(&server.url("/api/v1/posts"))
        .bearer_auth(token)
        .json(&json!({
            "title": title,
            "content": "Wheel thrown stoneware",
            "imageUrl": "https://cdn.example.com/bowl.jpg",
        }))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_create_list_and_delete_post() {
    let server = TestServer::new().await;
    let alice = server.signup("u1", "Alice", "artisan").await;

    let response = create_post(&server, &alice, "Tea bowl").await;
    assert_eq!(response.status(), 201);
    let json: Value = response.json().await.unwrap();
    assert_eq!(json["success"], true);
    let post_id = json["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(json["data"]["authorId"], "u1");
    assert_eq!(server.profile("u1").await["posts"], 1);

    let posts: Vec<Value> = server
        .client
        .get(&server.url("/api/v1/users/u1/posts"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["title"], "Tea bowl");

    let response = server
        .client
        .delete(&server.url(&format!("/api/v1/posts/{post_id}")))
        .bearer_auth(&alice)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(server.profile("u1").await["posts"], 0);
}

#[tokio::test]
async fn test_oversized_body_is_rejected_before_validation() {
    let server = TestServer::new().await;
    let alice = server.signup("u1", "Alice", "artisan").await;

    let response = server
        .client
        .post(&server.url("/api/v1/posts"))
        .bearer_auth(&alice)
        .json(&json!({
            "title": "Huge",
            "content": "x".repeat(70 * 1024),
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let json: Value = response.json().await.unwrap();
    assert_eq!(json["success"], false);
    assert!(json["error"].as_str().unwrap().contains("limit"));
    assert_eq!(server.profile("u1").await["posts"], 0);
}

#[tokio::test]
async fn test_only_author_can_delete_post() {
    let server = TestServer::new().await;
    let alice = server.signup("u1", "Alice", "artisan").await;
    let bob = server.signup("u2", "Bob", "customer").await;

    let json: Value = create_post(&server, &alice, "Tea bowl")
        .await
        .json()
        .await
        .unwrap();
    let post_id = json["data"]["id"].as_str().unwrap().to_string();

    let response = server
        .client
        .delete(&server.url(&format!("/api/v1/posts/{post_id}")))
        .bearer_auth(&bob)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
    assert_eq!(server.profile("u1").await["posts"], 1);
}

#[tokio::test]
async fn test_post_validation() {
    let server = TestServer::new().await;
    let alice = server.signup("u1", "Alice", "artisan").await;

    let response = server
        .client
        .post(&server.url("/api/v1/posts"))
        .bearer_auth(&alice)
        .json(&json!({
            "title": "Tea bowl",
            "content": "Stoneware",
            "imageUrl": "ftp://example.com/bowl.jpg",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    assert_eq!(server.profile("u1").await["posts"], 0);
}

#[tokio::test]
async fn test_posts_stream_delivers_snapshots() {
    let server = TestServer::new().await;
    let alice = server.signup("u1", "Alice", "artisan").await;

    let response = server
        .client
        .get(&server.url("/api/v1/streaming/users/u1/posts"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let mut events = SseReader::new(response);

    let (event, initial) = tokio::time::timeout(Duration::from_secs(5), events.next_event())
        .await
        .expect("initial snapshot");
    assert_eq!(event, "snapshot");
    assert_eq!(initial, json!([]));

    create_post(&server, &alice, "Tea bowl").await;

    let (event, updated) = tokio::time::timeout(Duration::from_secs(5), events.next_event())
        .await
        .expect("snapshot after new post");
    assert_eq!(event, "snapshot");
    assert_eq!(updated.as_array().unwrap().len(), 1);
    assert_eq!(updated[0]["title"], "Tea bowl");
}

#[tokio::test]
async fn test_profile_stream_tracks_counters() {
    let server = TestServer::new().await;
    let alice = server.signup("u1", "Alice", "customer").await;
    server.signup("u2", "Bob", "artisan").await;

    let response = server
        .client
        .get(&server.url("/api/v1/streaming/users/u2/profile"))
        .send()
        .await
        .unwrap();
    let mut events = SseReader::new(response);

    let (_, initial) = tokio::time::timeout(Duration::from_secs(5), events.next_event())
        .await
        .expect("initial snapshot");
    assert_eq!(initial["followers"], 0);

    server.follow(&alice, "u2").await;

    let (_, updated) = tokio::time::timeout(Duration::from_secs(5), events.next_event())
        .await
        .expect("snapshot after follow");
    assert_eq!(updated["followers"], 1);
}
