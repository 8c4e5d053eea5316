//! Request and response DTOs
//!
//! Mutations answer with the `{success, error}` envelope; reads return the
//! resource itself.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use serde::{Deserialize, Serialize};

use crate::data::{SearchCategory, UserId};
use crate::error::{ActionResult, AppError};
use crate::service::{CounterAudit, FollowChange};

/// Pagination parameters
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub limit: Option<usize>,
}

/// User search query parameters
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub category: SearchCategory,
    pub limit: Option<usize>,
}

/// Username update request
#[derive(Debug, Deserialize)]
pub struct UsernameRequest {
    pub username: String,
}

/// Outcome of follow/unfollow
#[derive(Debug, Clone, Serialize)]
pub struct FollowResponse {
    #[serde(flatten)]
    pub result: ActionResult,
    /// `false` when the relationship was already in the requested state
    pub changed: bool,
}

impl From<FollowChange> for FollowResponse {
    fn from(change: FollowChange) -> Self {
        Self {
            result: ActionResult::ok(),
            changed: change == FollowChange::Applied,
        }
    }
}

/// Counter audit with a precomputed verdict
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditResponse {
    #[serde(flatten)]
    pub audit: CounterAudit,
    pub consistent: bool,
}

impl From<CounterAudit> for AuditResponse {
    fn from(audit: CounterAudit) -> Self {
        Self {
            consistent: audit.is_consistent(),
            audit,
        }
    }
}

/// Successful mutation returning the affected resource
#[derive(Debug, Clone, Serialize)]
pub struct DataResponse<T> {
    #[serde(flatten)]
    pub result: ActionResult,
    pub data: T,
}

impl<T> DataResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            result: ActionResult::ok(),
            data,
        }
    }
}

/// Path segment as a [`UserId`]
pub fn parse_user_id(raw: String) -> Result<UserId, AppError> {
    UserId::parse(raw).map_err(|e| AppError::Validation(e.to_string()))
}

/// Unwrap a JSON body, reporting malformed input in the error envelope.
pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| AppError::Validation(rejection.body_text()))
}
