//! Streaming API endpoints
//!
//! Live snapshots over Server-Sent Events. Each SSE connection owns one
//! [`Subscription`](crate::data::Subscription); it is dropped, and so
//! cancelled, when the client disconnects.

use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use serde::Serialize;
use tokio_stream::StreamExt as _;

use super::dto::{PageParams, parse_user_id};
use crate::AppState;
use crate::data::{Document, DocumentPath, LiveQuery, Post, Snapshot, StoreError};
use crate::error::AppError;

fn data_event<T: Serialize>(sequence: u64, data: &T) -> Event {
    match Event::default()
        .event("snapshot")
        .id(sequence.to_string())
        .json_data(data)
    {
        Ok(event) => event,
        Err(error) => {
            tracing::error!(%error, "Failed to encode snapshot");
            Event::default()
                .event("error")
                .data("failed to encode snapshot")
        }
    }
}

fn error_event(error: &StoreError) -> Event {
    tracing::warn!(%error, "Live query read failed");
    Event::default().event("error").data(error.to_string())
}

fn posts_event(snapshot: Result<Snapshot, StoreError>) -> Result<Event, Infallible> {
    Ok(match snapshot {
        Ok(snapshot) => {
            let posts: Vec<Post> = snapshot
                .documents
                .into_iter()
                .filter_map(|document| match document {
                    Document::Post(post) => Some(post),
                    _ => None,
                })
                .collect();
            data_event(snapshot.sequence, &posts)
        }
        Err(error) => error_event(&error),
    })
}

fn profile_event(snapshot: Result<Snapshot, StoreError>) -> Result<Event, Infallible> {
    Ok(match snapshot {
        Ok(snapshot) => {
            // `null` while the profile does not exist.
            let profile = snapshot
                .documents
                .into_iter()
                .find_map(|document| match document {
                    Document::User(profile) => Some(profile),
                    _ => None,
                });
            data_event(snapshot.sequence, &profile)
        }
        Err(error) => error_event(&error),
    })
}

/// GET /api/v1/streaming/users/:id/posts
/// Newest posts of a user, re-sent whenever they change
pub async fn stream_posts(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let author = parse_user_id(id)?;
    let subscription = state
        .feed
        .subscribe(state.posts.live_query(author, params.limit));
    let stream = subscription.into_stream().map(posts_event);

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// GET /api/v1/streaming/users/:id/profile
/// A user's profile, including live counters
pub async fn stream_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let user = parse_user_id(id)?;
    let subscription = state
        .feed
        .subscribe(LiveQuery::Document(DocumentPath::User(user)));
    let stream = subscription.into_stream().map(profile_event);

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
