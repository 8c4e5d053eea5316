//! Document store boundary
//!
//! The services never talk to a backend directly. They describe what they
//! want as a [`WriteBatch`] of document operations addressed by logical
//! [`DocumentPath`]s and hand it to a [`DocumentStore`], which applies every
//! operation or none of them.
//!
//! Logical layout:
//!
//! ```text
//! users/{userId}                              profile + counters
//! following/{userId}/myFollowing/{targetId}   userId follows targetId
//! followers/{userId}/myFollowers/{sourceId}   sourceId follows userId
//! posts/{postId}                              post
//! ```

use std::fmt;

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::models::*;

// =============================================================================
// Paths
// =============================================================================

/// Address of a single document
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocumentPath {
    /// `users/{id}`
    User(UserId),
    /// `following/{owner}/myFollowing/{target}`
    Following { owner: UserId, target: UserId },
    /// `followers/{owner}/myFollowers/{source}`
    Follower { owner: UserId, source: UserId },
    /// `posts/{id}`
    Post(String),
}

impl DocumentPath {
    /// Outbound view of "follower follows followee".
    pub fn outbound(follower: &UserId, followee: &UserId) -> Self {
        Self::Following {
            owner: follower.clone(),
            target: followee.clone(),
        }
    }

    /// Inbound view of "follower follows followee".
    pub fn inbound(follower: &UserId, followee: &UserId) -> Self {
        Self::Follower {
            owner: followee.clone(),
            source: follower.clone(),
        }
    }

    /// `(follower, followee)` for either view of an edge.
    pub fn edge_key(&self) -> Option<(&UserId, &UserId)> {
        match self {
            Self::Following { owner, target } => Some((owner, target)),
            Self::Follower { owner, source } => Some((source, owner)),
            _ => None,
        }
    }

    /// Every path whose content changes when this one is written.
    ///
    /// Both views of an edge are the same record, so a write to one is
    /// visible through the other.
    pub fn views(&self) -> Vec<DocumentPath> {
        match self.edge_key() {
            Some((follower, followee)) => vec![
                Self::outbound(follower, followee),
                Self::inbound(follower, followee),
            ],
            None => vec![self.clone()],
        }
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "users/{id}"),
            Self::Following { owner, target } => {
                write!(f, "following/{owner}/myFollowing/{target}")
            }
            Self::Follower { owner, source } => {
                write!(f, "followers/{owner}/myFollowers/{source}")
            }
            Self::Post(id) => write!(f, "posts/{id}"),
        }
    }
}

/// Address of a collection that can be listed, counted or watched
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CollectionRef {
    /// `following/{owner}/myFollowing`
    MyFollowing(UserId),
    /// `followers/{owner}/myFollowers`
    MyFollowers(UserId),
    /// `posts` filtered by `authorId`
    PostsBy(UserId),
}

impl CollectionRef {
    /// Whether a write to `path` can change the content of this collection.
    pub fn contains(&self, path: &DocumentPath) -> bool {
        match (self, path) {
            (Self::MyFollowing(user), DocumentPath::Following { owner, .. }) => user == owner,
            (Self::MyFollowers(user), DocumentPath::Follower { owner, .. }) => user == owner,
            // Post ids do not reveal their author; any post write is relevant.
            (Self::PostsBy(_), DocumentPath::Post(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for CollectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MyFollowing(owner) => write!(f, "following/{owner}/myFollowing"),
            Self::MyFollowers(owner) => write!(f, "followers/{owner}/myFollowers"),
            Self::PostsBy(author) => write!(f, "posts?authorId={author}"),
        }
    }
}

// =============================================================================
// Documents and writes
// =============================================================================

/// Content of a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Document {
    User(UserProfile),
    Edge(EdgeDocument),
    Post(Post),
}

/// One write inside a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Create or overwrite a document.
    ///
    /// Overwriting a user keeps its counters.
    Set { path: DocumentPath, document: Document },
    /// Remove a document. Removing an absent document is not an error.
    Delete { path: DocumentPath },
    /// Add `by` to a counter. Fails the batch if the document is absent.
    Increment {
        path: DocumentPath,
        field: CounterField,
        by: i64,
    },
    /// Update descriptive user fields. Fails the batch if the document is absent.
    Merge { path: DocumentPath, patch: ProfilePatch },
}

impl WriteOp {
    pub fn path(&self) -> &DocumentPath {
        match self {
            Self::Set { path, .. }
            | Self::Delete { path }
            | Self::Increment { path, .. }
            | Self::Merge { path, .. } => path,
        }
    }
}

/// Expected state of a document, checked inside the transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Present,
    Absent,
}

/// Precondition evaluated atomically with the writes of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guard {
    pub path: DocumentPath,
    pub expect: Presence,
}

/// Writes applied all-or-nothing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    pub guard: Option<Guard>,
    pub ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only apply the batch when `path` is in the `expect` state.
    pub fn guarded(mut self, path: DocumentPath, expect: Presence) -> Self {
        self.guard = Some(Guard { path, expect });
        self
    }

    pub fn set(mut self, path: DocumentPath, document: Document) -> Self {
        self.ops.push(WriteOp::Set { path, document });
        self
    }

    pub fn delete(mut self, path: DocumentPath) -> Self {
        self.ops.push(WriteOp::Delete { path });
        self
    }

    pub fn increment(mut self, path: DocumentPath, field: CounterField, by: i64) -> Self {
        self.ops.push(WriteOp::Increment { path, field, by });
        self
    }

    pub fn merge(mut self, path: DocumentPath, patch: ProfilePatch) -> Self {
        self.ops.push(WriteOp::Merge { path, patch });
        self
    }

    /// Every path the batch touches, including paired edge views.
    pub fn touched_paths(&self) -> Vec<DocumentPath> {
        let mut paths: Vec<DocumentPath> = Vec::new();
        for op in &self.ops {
            for view in op.path().views() {
                if !paths.contains(&view) {
                    paths.push(view);
                }
            }
        }
        paths
    }
}

/// Result of a committed transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Every write was applied.
    Applied,
    /// The guard did not hold; nothing was written.
    GuardRejected,
}

/// Notification published after a batch is applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub paths: Vec<DocumentPath>,
}

impl ChangeEvent {
    pub fn touches(&self, path: &DocumentPath) -> bool {
        self.paths.contains(path)
    }

    pub fn touches_collection(&self, collection: &CollectionRef) -> bool {
        self.paths.iter().any(|path| collection.contains(path))
    }
}

// =============================================================================
// Queries
// =============================================================================

/// Category filter for user search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchCategory {
    #[default]
    All,
    Artisan,
    Customer,
}

/// User search query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserQuery {
    /// Case-insensitive substring; empty matches everyone
    pub term: String,
    pub category: SearchCategory,
    pub exclude: Option<UserId>,
    pub limit: usize,
}

// =============================================================================
// Errors
// =============================================================================

/// Failure of a store operation. A failed batch has no effect.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A write required a document that does not exist
    #[error("document {0} does not exist")]
    MissingDocument(String),

    /// A uniqueness constraint was violated
    #[error("{0}")]
    Conflict(String),

    /// The batch is malformed
    #[error("invalid write: {0}")]
    InvalidWrite(String),

    /// Stored data could not be decoded
    #[error("corrupt document {path}: {reason}")]
    Corrupt { path: String, reason: String },

    /// Backend failure (I/O, lock timeout, connectivity)
    #[error("backend failure: {0}")]
    Backend(#[from] sqlx::Error),

    /// The task running the batch panicked or was cancelled
    #[error("write task failed: {0}")]
    Interrupted(String),
}

// =============================================================================
// Trait
// =============================================================================

/// Transactional document store consumed by the services
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Apply every write of `batch` atomically, or none of them.
    async fn transactional_write(&self, batch: WriteBatch) -> Result<CommitOutcome, StoreError>;

    /// Read a single document.
    async fn read_document(&self, path: &DocumentPath) -> Result<Option<Document>, StoreError>;

    /// List a collection, newest first.
    async fn list_documents(
        &self,
        collection: &CollectionRef,
        limit: usize,
    ) -> Result<Vec<Document>, StoreError>;

    /// Count the documents of a collection.
    async fn count_documents(&self, collection: &CollectionRef) -> Result<i64, StoreError>;

    /// Search user profiles.
    async fn search_users(&self, query: &UserQuery) -> Result<Vec<UserProfile>, StoreError>;

    /// Receive a [`ChangeEvent`] for every applied batch from now on.
    fn subscribe_changes(&self) -> broadcast::Receiver<ChangeEvent>;
}
