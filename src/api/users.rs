//! Profile endpoints

use axum::{
    extract::{Path, Query, State, rejection::JsonRejection},
    response::Json,
};

use super::dto::{DataResponse, SearchParams, UsernameRequest, json_body, parse_user_id};
use crate::AppState;
use crate::auth::{CurrentUser, MaybeUser};
use crate::data::UserProfile;
use crate::error::AppError;
use crate::service::NewProfile;

/// POST /api/v1/users
/// Create or refresh the caller's profile document
pub async fn create_profile(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    payload: Result<Json<NewProfile>, JsonRejection>,
) -> Result<Json<DataResponse<UserProfile>>, AppError> {
    let mut input = json_body(payload)?;
    if input.email.is_none() {
        input.email = session.email.clone();
    }
    let profile = state.profiles.create_profile(&session.user_id, input).await?;
    Ok(Json(DataResponse::new(profile)))
}

/// GET /api/v1/users/:id
pub async fn get_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UserProfile>, AppError> {
    let user = parse_user_id(id)?;
    Ok(Json(state.profiles.get_profile(&user).await?))
}

/// PATCH /api/v1/users/me/username
pub async fn update_username(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    payload: Result<Json<UsernameRequest>, JsonRejection>,
) -> Result<Json<DataResponse<UserProfile>>, AppError> {
    let request = json_body(payload)?;
    let profile = state
        .profiles
        .update_username(&session.user_id, &request.username)
        .await?;
    Ok(Json(DataResponse::new(profile)))
}

/// GET /api/v1/users/search
/// The caller, when authenticated, is left out of the results
pub async fn search_users(
    State(state): State<AppState>,
    user: MaybeUser,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<UserProfile>>, AppError> {
    let profiles = state
        .profiles
        .search_users(user.user_id(), &params.q, params.category, params.limit)
        .await?;
    Ok(Json(profiles))
}
