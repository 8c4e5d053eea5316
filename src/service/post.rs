//! Post service
//!
//! Posts and the author's `posts` counter change in the same batch.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;

use super::{clamp_limit, normalize_optional_text};
use crate::data::{
    CollectionRef, CommitOutcome, CounterField, Document, DocumentPath, DocumentStore, EntityId,
    LiveQuery, Post, Presence, UserId, WriteBatch,
};
use crate::error::AppError;

const MAX_TITLE_CHARS: usize = 120;
const MAX_CONTENT_CHARS: usize = 5000;

/// Post form
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub image_url: Option<String>,
}

fn required_text(value: &str, field: &str, max_chars: usize) -> Result<String, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation(format!("{field} cannot be empty")));
    }
    if value.chars().count() > max_chars {
        return Err(AppError::Validation(format!(
            "{field} must be at most {max_chars} characters"
        )));
    }
    Ok(value.to_string())
}

fn validate_image_url(raw: Option<String>) -> Result<Option<String>, AppError> {
    let Some(raw) = normalize_optional_text(raw) else {
        return Ok(None);
    };
    let url = url::Url::parse(&raw)
        .map_err(|_| AppError::Validation("image URL is not a valid URL".to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(Some(url.to_string())),
        _ => Err(AppError::Validation(
            "image URL must use http or https".to_string(),
        )),
    }
}

/// Post service
pub struct PostService {
    store: Arc<dyn DocumentStore>,
    max_page_size: usize,
}

impl PostService {
    /// Create new post service
    pub fn new(store: Arc<dyn DocumentStore>, max_page_size: usize) -> Self {
        Self {
            store,
            max_page_size,
        }
    }

    /// Publish a post as `actor`.
    ///
    /// # Errors
    /// `Store(MissingDocument)` when `actor` has no profile; the post is not
    /// written in that case.
    pub async fn create_post(&self, actor: &UserId, input: NewPost) -> Result<Post, AppError> {
        let post = Post {
            id: EntityId::new().0,
            author_id: actor.to_string(),
            title: required_text(&input.title, "title", MAX_TITLE_CHARS)?,
            content: required_text(&input.content, "content", MAX_CONTENT_CHARS)?,
            image_url: validate_image_url(input.image_url)?,
            created_at: Utc::now(),
        };

        let batch = WriteBatch::new()
            .set(DocumentPath::Post(post.id.clone()), Document::Post(post.clone()))
            .increment(DocumentPath::User(actor.clone()), CounterField::Posts, 1);
        self.store.transactional_write(batch).await?;

        tracing::info!(post_id = %post.id, author = %actor, "Post created");
        Ok(post)
    }

    /// Delete one of `actor`'s posts.
    pub async fn delete_post(&self, actor: &UserId, post_id: &str) -> Result<(), AppError> {
        let path = DocumentPath::Post(post_id.to_string());
        let post = match self.store.read_document(&path).await? {
            Some(Document::Post(post)) => post,
            _ => return Err(AppError::NotFound),
        };
        if post.author_id != actor.as_str() {
            return Err(AppError::Forbidden);
        }

        let batch = WriteBatch::new()
            .guarded(path.clone(), Presence::Present)
            .delete(path)
            .increment(DocumentPath::User(actor.clone()), CounterField::Posts, -1);
        match self.store.transactional_write(batch).await? {
            CommitOutcome::Applied => {
                tracing::info!(%post_id, author = %actor, "Post deleted");
                Ok(())
            }
            // Deleted concurrently.
            CommitOutcome::GuardRejected => Err(AppError::NotFound),
        }
    }

    /// Posts by `author`, newest first.
    pub async fn list_posts(
        &self,
        author: &UserId,
        limit: Option<usize>,
    ) -> Result<Vec<Post>, AppError> {
        let documents = self
            .store
            .list_documents(
                &CollectionRef::PostsBy(author.clone()),
                clamp_limit(limit, self.max_page_size),
            )
            .await?;
        Ok(documents
            .into_iter()
            .filter_map(|document| match document {
                Document::Post(post) => Some(post),
                _ => None,
            })
            .collect())
    }

    /// Live query over the same page `list_posts` returns.
    pub fn live_query(&self, author: UserId, limit: Option<usize>) -> LiveQuery {
        LiveQuery::Collection {
            collection: CollectionRef::PostsBy(author),
            limit: clamp_limit(limit, self.max_page_size),
        }
    }
}
