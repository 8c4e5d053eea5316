//! Post endpoints

use axum::{
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};

use super::dto::{DataResponse, PageParams, json_body, parse_user_id};
use crate::AppState;
use crate::auth::CurrentUser;
use crate::data::Post;
use crate::error::{ActionResult, AppError};
use crate::service::NewPost;

/// POST /api/v1/posts
pub async fn create_post(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    payload: Result<Json<NewPost>, JsonRejection>,
) -> Result<(StatusCode, Json<DataResponse<Post>>), AppError> {
    let input = json_body(payload)?;
    let post = state.posts.create_post(&session.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse::new(post))))
}

/// DELETE /api/v1/posts/:id
pub async fn delete_post(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<ActionResult>, AppError> {
    state.posts.delete_post(&session.user_id, &id).await?;
    Ok(Json(ActionResult::ok()))
}

/// GET /api/v1/users/:id/posts
pub async fn list_posts(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<Json<Vec<Post>>, AppError> {
    let author = parse_user_id(id)?;
    Ok(Json(state.posts.list_posts(&author, params.limit).await?))
}
