//! SQLite document store
//!
//! All persistence goes through this module.
//! Uses SQLx with migrations from `./migrations`.
//!
//! Logical document paths are mapped onto three tables. Both views of a
//! follow edge resolve to a single `follow_edges` row, so the outbound and
//! inbound copies can never disagree.

use std::path::Path;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Connection, Pool, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tokio::sync::broadcast;

use super::models::*;
use super::store::*;
use crate::error::AppError;

/// Default buffer of the change channel
pub const DEFAULT_CHANGE_CAPACITY: usize = 256;

/// Row of the `users` table
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: String,
    email: Option<String>,
    display_name: String,
    username: Option<String>,
    user_type: String,
    craft_type: Option<String>,
    location: Option<String>,
    bio: Option<String>,
    followers: i64,
    following: i64,
    posts: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn into_profile(self) -> Result<UserProfile, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            path: format!("users/{}", self.id),
            reason,
        };
        let user_type = UserType::parse(&self.user_type)
            .ok_or_else(|| corrupt(format!("unknown user type {:?}", self.user_type)))?;
        let id = UserId::parse(self.id.clone()).map_err(|e| corrupt(e.to_string()))?;

        Ok(UserProfile {
            id,
            email: self.email,
            display_name: self.display_name,
            username: self.username,
            user_type,
            craft_type: self.craft_type,
            location: self.location,
            bio: self.bio,
            followers: self.followers,
            following: self.following,
            posts: self.posts,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn parse_stored_user_id(raw: String, path: &dyn std::fmt::Display) -> Result<UserId, StoreError> {
    UserId::parse(raw).map_err(|e| StoreError::Corrupt {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

fn map_write_error(error: sqlx::Error) -> StoreError {
    match &error {
        sqlx::Error::Database(db_error) if db_error.is_unique_violation() => {
            StoreError::Conflict("username is already taken".to_string())
        }
        _ => StoreError::Backend(error),
    }
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Read one document through any executor (pool or open transaction).
async fn fetch_document<'e, E>(
    executor: E,
    path: &DocumentPath,
) -> Result<Option<Document>, StoreError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    match path {
        DocumentPath::User(id) => {
            let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = ?")
                .bind(id.as_str())
                .fetch_optional(executor)
                .await?;
            row.map(|row| row.into_profile().map(Document::User))
                .transpose()
        }
        DocumentPath::Following { .. } | DocumentPath::Follower { .. } => {
            let Some((follower, followee)) = path.edge_key() else {
                return Ok(None);
            };
            let followed_at = sqlx::query_scalar::<_, DateTime<Utc>>(
                "SELECT followed_at FROM follow_edges WHERE follower_id = ? AND followee_id = ?",
            )
            .bind(follower.as_str())
            .bind(followee.as_str())
            .fetch_optional(executor)
            .await?;

            // Each view names the other party.
            let uid = match path {
                DocumentPath::Following { target, .. } => target.clone(),
                _ => follower.clone(),
            };
            Ok(followed_at.map(|followed_at| Document::Edge(EdgeDocument { uid, followed_at })))
        }
        DocumentPath::Post(id) => {
            let post = sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE id = ?")
                .bind(id)
                .fetch_optional(executor)
                .await?;
            Ok(post.map(Document::Post))
        }
    }
}

async fn apply_set(
    conn: &mut SqliteConnection,
    path: &DocumentPath,
    document: &Document,
) -> Result<(), StoreError> {
    match (path, document) {
        (DocumentPath::User(id), Document::User(profile)) if &profile.id == id => {
            sqlx::query(
                r#"
                INSERT INTO users (
                    id, email, display_name, username, user_type, craft_type,
                    location, bio, followers, following, posts, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, 0, 0, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    email = excluded.email,
                    display_name = excluded.display_name,
                    user_type = excluded.user_type,
                    craft_type = excluded.craft_type,
                    location = excluded.location,
                    bio = excluded.bio,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(profile.id.as_str())
            .bind(&profile.email)
            .bind(&profile.display_name)
            .bind(&profile.username)
            .bind(profile.user_type.as_str())
            .bind(&profile.craft_type)
            .bind(&profile.location)
            .bind(&profile.bio)
            .bind(profile.created_at)
            .bind(profile.updated_at)
            .execute(&mut *conn)
            .await
            .map_err(map_write_error)?;
        }
        (DocumentPath::Following { target, .. }, Document::Edge(edge)) if &edge.uid == target => {
            upsert_edge(conn, path, edge.followed_at).await?;
        }
        (DocumentPath::Follower { source, .. }, Document::Edge(edge)) if &edge.uid == source => {
            upsert_edge(conn, path, edge.followed_at).await?;
        }
        (DocumentPath::Post(id), Document::Post(post)) if &post.id == id => {
            sqlx::query(
                r#"
                INSERT INTO posts (id, author_id, title, content, image_url, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    content = excluded.content,
                    image_url = excluded.image_url
                "#,
            )
            .bind(&post.id)
            .bind(&post.author_id)
            .bind(&post.title)
            .bind(&post.content)
            .bind(&post.image_url)
            .bind(post.created_at)
            .execute(&mut *conn)
            .await?;
        }
        _ => {
            return Err(StoreError::InvalidWrite(format!(
                "document does not belong at {path}"
            )));
        }
    }
    Ok(())
}

async fn upsert_edge(
    conn: &mut SqliteConnection,
    path: &DocumentPath,
    followed_at: DateTime<Utc>,
) -> Result<(), StoreError> {
    let Some((follower, followee)) = path.edge_key() else {
        return Err(StoreError::InvalidWrite(format!("{path} is not an edge")));
    };
    sqlx::query(
        r#"
        INSERT INTO follow_edges (follower_id, followee_id, followed_at) VALUES (?, ?, ?)
        ON CONFLICT(follower_id, followee_id) DO UPDATE SET followed_at = excluded.followed_at
        "#,
    )
    .bind(follower.as_str())
    .bind(followee.as_str())
    .bind(followed_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn apply_delete(conn: &mut SqliteConnection, path: &DocumentPath) -> Result<(), StoreError> {
    match path {
        DocumentPath::User(id) => {
            sqlx::query("DELETE FROM users WHERE id = ?")
                .bind(id.as_str())
                .execute(&mut *conn)
                .await?;
        }
        DocumentPath::Following { .. } | DocumentPath::Follower { .. } => {
            if let Some((follower, followee)) = path.edge_key() {
                sqlx::query("DELETE FROM follow_edges WHERE follower_id = ? AND followee_id = ?")
                    .bind(follower.as_str())
                    .bind(followee.as_str())
                    .execute(&mut *conn)
                    .await?;
            }
        }
        DocumentPath::Post(id) => {
            sqlx::query("DELETE FROM posts WHERE id = ?")
                .bind(id)
                .execute(&mut *conn)
                .await?;
        }
    }
    Ok(())
}

async fn apply_increment(
    conn: &mut SqliteConnection,
    path: &DocumentPath,
    field: CounterField,
    by: i64,
) -> Result<(), StoreError> {
    let DocumentPath::User(id) = path else {
        return Err(StoreError::InvalidWrite(format!(
            "{path} has no counter fields"
        )));
    };

    let column = field.column();
    let sql = format!("UPDATE users SET {column} = {column} + ?, updated_at = ? WHERE id = ?");
    let result = sqlx::query(&sql)
        .bind(by)
        .bind(Utc::now())
        .bind(id.as_str())
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::MissingDocument(path.to_string()));
    }
    Ok(())
}

async fn apply_merge(
    conn: &mut SqliteConnection,
    path: &DocumentPath,
    patch: &ProfilePatch,
) -> Result<(), StoreError> {
    let DocumentPath::User(id) = path else {
        return Err(StoreError::InvalidWrite(format!("{path} is not a profile")));
    };

    let mut builder = QueryBuilder::<Sqlite>::new("UPDATE users SET updated_at = ");
    builder.push_bind(Utc::now());
    let text_fields = [
        ("email", &patch.email),
        ("display_name", &patch.display_name),
        ("username", &patch.username),
        ("craft_type", &patch.craft_type),
        ("location", &patch.location),
        ("bio", &patch.bio),
    ];
    for (column, value) in text_fields {
        if let Some(value) = value {
            builder.push(format!(", {column} = "));
            builder.push_bind(value.clone());
        }
    }
    if let Some(user_type) = patch.user_type {
        builder.push(", user_type = ");
        builder.push_bind(user_type.as_str());
    }
    builder.push(" WHERE id = ");
    builder.push_bind(id.as_str());

    let result = builder
        .build()
        .execute(&mut *conn)
        .await
        .map_err(map_write_error)?;
    if result.rows_affected() == 0 {
        return Err(StoreError::MissingDocument(path.to_string()));
    }
    Ok(())
}

async fn apply_batch(
    conn: &mut SqliteConnection,
    batch: &WriteBatch,
) -> Result<CommitOutcome, StoreError> {
    if let Some(guard) = &batch.guard {
        let present = fetch_document(&mut *conn, &guard.path).await?.is_some();
        let holds = match guard.expect {
            Presence::Present => present,
            Presence::Absent => !present,
        };
        if !holds {
            return Ok(CommitOutcome::GuardRejected);
        }
    }

    for op in &batch.ops {
        match op {
            WriteOp::Set { path, document } => apply_set(conn, path, document).await?,
            WriteOp::Delete { path } => apply_delete(conn, path).await?,
            WriteOp::Increment { path, field, by } => {
                apply_increment(conn, path, *field, *by).await?
            }
            WriteOp::Merge { path, patch } => apply_merge(conn, path, patch).await?,
        }
    }

    Ok(CommitOutcome::Applied)
}

/// SQLite-backed [`DocumentStore`].
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
    changes: broadcast::Sender<ChangeEvent>,
}

impl Database {
    // =========================================================================
    // Connection
    // =========================================================================

    /// Connect to SQLite database
    ///
    /// Creates the database file if it doesn't exist.
    /// Runs pending migrations automatically.
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        Self::connect_with_capacity(path, DEFAULT_CHANGE_CAPACITY).await
    }

    /// Connect with an explicit change channel capacity.
    pub async fn connect_with_capacity(
        path: &Path,
        change_capacity: usize,
    ) -> Result<Self, AppError> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
        }

        let connection_string = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&connection_string).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        let (changes, _) = broadcast::channel(change_capacity.max(1));

        tracing::info!(path = %path.display(), "Database connected and migrated successfully");

        Ok(Self { pool, changes })
    }

    async fn run_batch(&self, batch: &WriteBatch) -> Result<CommitOutcome, StoreError> {
        let mut conn = self.pool.acquire().await?;
        // IMMEDIATE takes the write lock up front, so the guard read and the
        // writes cannot interleave with another batch.
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result = match apply_batch(&mut conn, batch).await {
            Ok(outcome) => sqlx::query("COMMIT")
                .execute(&mut *conn)
                .await
                .map(|_| outcome)
                .map_err(StoreError::from),
            Err(error) => Err(error),
        };

        if result.is_err() {
            if let Err(error) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                // The transaction state is unknown; never hand this connection out again.
                tracing::error!(%error, "Rollback failed, closing connection");
                let _ = conn.detach().close().await;
            }
        }
        result
    }

    /// Run one batch to completion, record it and publish its change.
    async fn commit(&self, batch: WriteBatch) -> Result<CommitOutcome, StoreError> {
        let started = Instant::now();
        let result = self.run_batch(&batch).await;

        let status = match &result {
            Ok(CommitOutcome::Applied) => "applied",
            Ok(CommitOutcome::GuardRejected) => "guard_rejected",
            Err(_) => "error",
        };
        crate::metrics::observe_store_transaction(status, started.elapsed());

        match &result {
            Ok(CommitOutcome::Applied) => {
                let paths = batch.touched_paths();
                tracing::debug!(ops = batch.ops.len(), paths = paths.len(), "Batch applied");
                // No receivers is fine.
                let _ = self.changes.send(ChangeEvent { paths });
            }
            Ok(CommitOutcome::GuardRejected) => {
                tracing::debug!(guard = ?batch.guard, "Batch skipped by guard");
            }
            Err(error) => {
                tracing::warn!(%error, ops = batch.ops.len(), "Batch rolled back");
            }
        }

        result
    }
}

#[async_trait]
impl DocumentStore for Database {
    async fn transactional_write(&self, batch: WriteBatch) -> Result<CommitOutcome, StoreError> {
        // The batch runs on its own task: dropping the caller must not leave
        // a transaction open on a pooled connection.
        let db = self.clone();
        tokio::spawn(async move { db.commit(batch).await })
            .await
            .map_err(|e| StoreError::Interrupted(e.to_string()))?
    }

    async fn read_document(&self, path: &DocumentPath) -> Result<Option<Document>, StoreError> {
        fetch_document(&self.pool, path).await
    }

    async fn list_documents(
        &self,
        collection: &CollectionRef,
        limit: usize,
    ) -> Result<Vec<Document>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        match collection {
            CollectionRef::MyFollowing(owner) => {
                let rows = sqlx::query_as::<_, (String, DateTime<Utc>)>(
                    "SELECT followee_id, followed_at FROM follow_edges WHERE follower_id = ? ORDER BY followed_at DESC, followee_id LIMIT ?",
                )
                .bind(owner.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?;
                rows.into_iter()
                    .map(|(uid, followed_at)| {
                        Ok(Document::Edge(EdgeDocument {
                            uid: parse_stored_user_id(uid, collection)?,
                            followed_at,
                        }))
                    })
                    .collect()
            }
            CollectionRef::MyFollowers(owner) => {
                let rows = sqlx::query_as::<_, (String, DateTime<Utc>)>(
                    "SELECT follower_id, followed_at FROM follow_edges WHERE followee_id = ? ORDER BY followed_at DESC, follower_id LIMIT ?",
                )
                .bind(owner.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?;
                rows.into_iter()
                    .map(|(uid, followed_at)| {
                        Ok(Document::Edge(EdgeDocument {
                            uid: parse_stored_user_id(uid, collection)?,
                            followed_at,
                        }))
                    })
                    .collect()
            }
            CollectionRef::PostsBy(author) => {
                let posts = sqlx::query_as::<_, Post>(
                    "SELECT * FROM posts WHERE author_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
                )
                .bind(author.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?;
                Ok(posts.into_iter().map(Document::Post).collect())
            }
        }
    }

    async fn count_documents(&self, collection: &CollectionRef) -> Result<i64, StoreError> {
        let (sql, owner) = match collection {
            CollectionRef::MyFollowing(owner) => {
                ("SELECT COUNT(*) FROM follow_edges WHERE follower_id = ?", owner)
            }
            CollectionRef::MyFollowers(owner) => {
                ("SELECT COUNT(*) FROM follow_edges WHERE followee_id = ?", owner)
            }
            CollectionRef::PostsBy(author) => {
                ("SELECT COUNT(*) FROM posts WHERE author_id = ?", author)
            }
        };
        let count = sqlx::query_scalar::<_, i64>(sql)
            .bind(owner.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn search_users(&self, query: &UserQuery) -> Result<Vec<UserProfile>, StoreError> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM users WHERE 1 = 1");

        let term = query.term.trim();
        if !term.is_empty() {
            let pattern = escape_like(term);
            builder.push(" AND (");
            let mut separated = builder.separated(" OR ");
            for column in ["display_name", "username", "craft_type", "location"] {
                separated.push(format!("{column} LIKE "));
                separated.push_bind_unseparated(pattern.clone());
                separated.push_unseparated(" ESCAPE '\\'");
            }
            builder.push(")");
        }

        match query.category {
            SearchCategory::All => {}
            SearchCategory::Artisan => {
                builder.push(" AND user_type = ");
                builder.push_bind(UserType::Artisan.as_str());
            }
            SearchCategory::Customer => {
                builder.push(" AND user_type = ");
                builder.push_bind(UserType::Customer.as_str());
            }
        }

        if let Some(exclude) = &query.exclude {
            builder.push(" AND id != ");
            builder.push_bind(exclude.as_str().to_string());
        }

        builder.push(" ORDER BY created_at DESC, id LIMIT ");
        builder.push_bind(i64::try_from(query.limit).unwrap_or(i64::MAX));

        let rows = builder
            .build_query_as::<UserRow>()
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(UserRow::into_profile).collect()
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::escape_like;

    #[test]
    fn like_patterns_escape_wildcards() {
        assert_eq!(escape_like("pot"), "%pot%");
        assert_eq!(escape_like("50%_off"), "%50\\%\\_off%");
    }
}
