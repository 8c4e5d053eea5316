//! Follow graph endpoints

use axum::{
    extract::{Path, Query, State},
    response::Json,
};

use super::dto::{AuditResponse, FollowResponse, PageParams, parse_user_id};
use crate::AppState;
use crate::auth::{CurrentUser, MaybeUser};
use crate::data::FollowEdge;
use crate::error::AppError;
use crate::service::Relationship;

/// POST /api/v1/users/:id/follow
pub async fn follow(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<FollowResponse>, AppError> {
    let target = parse_user_id(id)?;
    let change = state.follows.follow(Some(&session.user_id), &target).await?;
    Ok(Json(change.into()))
}

/// POST /api/v1/users/:id/unfollow
pub async fn unfollow(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<FollowResponse>, AppError> {
    let target = parse_user_id(id)?;
    let change = state
        .follows
        .unfollow(Some(&session.user_id), &target)
        .await?;
    Ok(Json(change.into()))
}

/// GET /api/v1/users/:id/relationship
/// Both flags are false for anonymous callers
pub async fn relationship(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(id): Path<String>,
) -> Result<Json<Relationship>, AppError> {
    let target = parse_user_id(id)?;
    let relationship = state.follows.relationship(user.user_id(), &target).await?;
    Ok(Json(relationship))
}

/// GET /api/v1/users/:id/followers
pub async fn followers(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<Json<Vec<FollowEdge>>, AppError> {
    let user = parse_user_id(id)?;
    Ok(Json(state.follows.followers(&user, params.limit).await?))
}

/// GET /api/v1/users/:id/following
pub async fn following(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<Json<Vec<FollowEdge>>, AppError> {
    let user = parse_user_id(id)?;
    Ok(Json(state.follows.following(&user, params.limit).await?))
}

/// GET /api/v1/users/:id/counters/audit
pub async fn audit_counters(
    State(state): State<AppState>,
    CurrentUser(_session): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<AuditResponse>, AppError> {
    let user = parse_user_id(id)?;
    let audit = state.follows.audit_counters(&user).await?;
    Ok(Json(audit.into()))
}
