//! Data models
//!
//! Rust structs representing store documents.
//! Generated IDs use ULID and timestamps use chrono.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// Example: "01ARZ3NDEKTSV4RRFFQ69G5FAV"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

const MAX_USER_ID_LEN: usize = 128;

/// Opaque account identifier issued by the external authentication provider.
///
/// Never created by this crate, only referenced. Must be usable as a single
/// path segment, so it cannot be empty or contain `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    pub fn parse(raw: impl Into<String>) -> Result<Self, InvalidUserId> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(InvalidUserId("user id cannot be empty".to_string()));
        }
        if raw.len() > MAX_USER_ID_LEN {
            return Err(InvalidUserId(format!(
                "user id must be at most {MAX_USER_ID_LEN} bytes"
            )));
        }
        if raw.contains('/') {
            return Err(InvalidUserId("user id cannot contain '/'".to_string()));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for UserId {
    type Error = InvalidUserId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<UserId> for String {
    fn from(value: UserId) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct InvalidUserId(pub String);

// =============================================================================
// Users
// =============================================================================

/// Kind of account holder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Artisan,
    #[default]
    Customer,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Artisan => "artisan",
            Self::Customer => "customer",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "artisan" => Some(Self::Artisan),
            "customer" => Some(Self::Customer),
            _ => None,
        }
    }
}

/// Profile document stored at `users/{id}`
///
/// Carries the denormalized `followers`, `following` and `posts` counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub email: Option<String>,
    pub display_name: String,
    /// Lowercase handle, unique across users
    pub username: Option<String>,
    pub user_type: UserType,
    pub craft_type: Option<String>,
    pub location: Option<String>,
    pub bio: Option<String>,
    pub followers: i64,
    pub following: i64,
    pub posts: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn counters(&self) -> FollowCounters {
        FollowCounters {
            followers: self.followers,
            following: self.following,
        }
    }
}

/// Partial update of the descriptive fields of a profile.
///
/// `None` leaves a field untouched. Counters are never part of a patch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfilePatch {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub username: Option<String>,
    pub user_type: Option<UserType>,
    pub craft_type: Option<String>,
    pub location: Option<String>,
    pub bio: Option<String>,
}

/// Denormalized follow counters of one user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FollowCounters {
    pub followers: i64,
    pub following: i64,
}

/// Counter field that can be incremented in a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterField {
    Followers,
    Following,
    Posts,
}

impl CounterField {
    pub fn column(&self) -> &'static str {
        match self {
            Self::Followers => "followers",
            Self::Following => "following",
            Self::Posts => "posts",
        }
    }
}

// =============================================================================
// Follow edges
// =============================================================================

/// "follower follows followee"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowEdge {
    pub follower_id: UserId,
    pub followee_id: UserId,
    pub followed_at: DateTime<Utc>,
}

/// Payload of one view of an edge: `uid` is the other party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDocument {
    pub uid: UserId,
    pub followed_at: DateTime<Utc>,
}

// =============================================================================
// Posts
// =============================================================================

/// A post in the marketplace feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub author_id: String,
    pub title: String,
    pub content: String,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_rejects_path_separators() {
        assert!(UserId::parse("u1").is_ok());
        assert!(UserId::parse("").is_err());
        assert!(UserId::parse("a/b").is_err());
        assert!(UserId::parse("x".repeat(129)).is_err());
    }

    #[test]
    fn user_id_deserialization_is_validated() {
        let parsed: Result<UserId, _> = serde_json::from_str("\"a/b\"");
        assert!(parsed.is_err());
        let parsed: UserId = serde_json::from_str("\"u2\"").unwrap();
        assert_eq!(parsed.as_str(), "u2");
    }

    #[test]
    fn user_type_round_trips_through_str() {
        assert_eq!(UserType::parse("artisan"), Some(UserType::Artisan));
        assert_eq!(UserType::parse("Artisan"), None);
        assert_eq!(UserType::Customer.as_str(), "customer");
    }
}
