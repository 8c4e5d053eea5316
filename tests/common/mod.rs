//! Common test utilities for E2E tests

#![allow(dead_code)]

use artisan_graph::config::{self, CounterPolicy};
use artisan_graph::data::UserId;
use artisan_graph::{AppState, build_router};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::TcpListener;

pub const TEST_SESSION_SECRET: &str = "test-session-secret-at-least-32-bytes";

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server with the default (guarded) counter policy
    pub async fn new() -> Self {
        Self::with_policy(CounterPolicy::Guarded).await
    }

    /// Create a new test server instance
    pub async fn with_policy(counter_policy: CounterPolicy) -> Self {
        // Create temporary directory for test database
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
                domain: "localhost".to_string(),
                protocol: "http".to_string(),
            },
            database: config::DatabaseConfig { path: db_path },
            auth: config::AuthConfig {
                session_secret: TEST_SESSION_SECRET.to_string(),
                session_max_age: 604800,
            },
            graph: config::GraphConfig {
                counter_policy,
                max_page_size: 50,
            },
            subscriptions: config::SubscriptionConfig {
                channel_capacity: 64,
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        let state = AppState::new(config).await.unwrap();

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let app = build_router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait a bit for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        Self {
            addr: addr_str,
            state,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Session token for `user_id`, as the identity provider would issue it
    pub fn token_for(&self, user_id: &str) -> String {
        use artisan_graph::auth::{Session, create_session_token};

        let session = Session::new(UserId::parse(user_id).unwrap(), 3600);
        create_session_token(&session, &self.state.config.auth.session_secret)
            .expect("Failed to create test token")
    }

    /// Sign up `user_id` through the API and return its token
    pub async fn signup(&self, user_id: &str, display_name: &str, user_type: &str) -> String {
        let token = self.token_for(user_id);
        let response = self
            .client
            .post(self.url("/api/v1/users"))
            .bearer_auth(&token)
            .json(&json!({
                "displayName": display_name,
                "userType": user_type,
                "email": format!("{user_id}@example.com"),
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200, "signup of {user_id} failed");
        token
    }

    pub async fn follow(&self, token: &str, target: &str) -> reqwest::Response {
        self.client
            .post(self.url(&format!("/api/v1/users/{target}/follow")))
            .bearer_auth(token)
            .send()
            .await
            .unwrap()
    }

    pub async fn unfollow(&self, token: &str, target: &str) -> reqwest::Response {
        self.client
            .post(self.url(&format!("/api/v1/users/{target}/unfollow")))
            .bearer_auth(token)
            .send()
            .await
            .unwrap()
    }

    pub async fn profile(&self, user_id: &str) -> Value {
        self.client
            .get(self.url(&format!("/api/v1/users/{user_id}")))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    pub async fn relationship(&self, token: Option<&str>, target: &str) -> Value {
        let mut request = self
            .client
            .get(self.url(&format!("/api/v1/users/{target}/relationship")));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request.send().await.unwrap().json().await.unwrap()
    }
}

/// Incremental reader for a `text/event-stream` response
pub struct SseReader {
    response: reqwest::Response,
    buffer: String,
}

impl SseReader {
    pub fn new(response: reqwest::Response) -> Self {
        Self {
            response,
            buffer: String::new(),
        }
    }

    /// Next `(event, data)` pair, skipping keep-alive comments
    pub async fn next_event(&mut self) -> (String, Value) {
        loop {
            if let Some(end) = self.buffer.find("\n\n") {
                let block: String = self.buffer.drain(..end + 2).collect();
                let mut event = String::from("message");
                let mut data = String::new();
                for line in block.lines() {
                    if let Some(value) = line.strip_prefix("event:") {
                        event = value.trim().to_string();
                    } else if let Some(value) = line.strip_prefix("data:") {
                        data.push_str(value.trim_start());
                    }
                }
                if data.is_empty() {
                    continue;
                }
                let value = serde_json::from_str(&data).unwrap_or(Value::String(data));
                return (event, value);
            }

            let chunk = self
                .response
                .chunk()
                .await
                .unwrap()
                .expect("event stream ended");
            self.buffer.push_str(&String::from_utf8_lossy(&chunk));
        }
    }
}
