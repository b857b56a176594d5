use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::fmt;
use thiserror::Error;

use crate::models::StatsResponse;

/// Request parameters that feed the time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryParam {
    StartTime,
    EndTime,
    Step,
}

impl QueryParam {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryParam::StartTime => "starttime",
            QueryParam::EndTime => "endtime",
            QueryParam::Step => "step",
        }
    }
}

impl fmt::Display for QueryParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParameterError {
    #[error("Unable to parse {param} parameter: {reason}")]
    Unparsable { param: QueryParam, reason: String },

    #[error("endtime ({end}) is before starttime ({start})")]
    EndBeforeStart { start: String, end: String },
}

#[derive(Debug, Error)]
pub enum StatsError {
    #[error(transparent)]
    InvalidParameter(#[from] ParameterError),

    #[error("Unable to query metrics backend: {0}")]
    BackendUnreachable(String),

    #[error("Error from Prometheus: {error_type}: {message}")]
    BackendError { error_type: String, message: String },

    #[error("{reason}: query={query}, returned JSON={body}")]
    MalformedResponse {
        query: String,
        reason: String,
        body: String,
    },

    #[error("data array returned by Prometheus has more than one element: query={query}, returned JSON={body}")]
    AmbiguousResult { query: String, body: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StatsError {
    /// Short label used for logging and the error counter.
    pub fn kind(&self) -> &'static str {
        match self {
            StatsError::InvalidParameter(_) => "invalid_parameter",
            StatsError::BackendUnreachable(_) => "backend_unreachable",
            StatsError::BackendError { .. } => "backend_error",
            StatsError::MalformedResponse { .. } => "malformed_response",
            StatsError::AmbiguousResult { .. } => "ambiguous_result",
            StatsError::Internal(_) => "internal",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            StatsError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            StatsError::BackendUnreachable(_)
            | StatsError::BackendError { .. }
            | StatsError::MalformedResponse { .. }
            | StatsError::AmbiguousResult { .. } => StatusCode::BAD_GATEWAY,
            StatsError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<reqwest::Error> for StatsError {
    fn from(err: reqwest::Error) -> Self {
        StatsError::BackendUnreachable(err.to_string())
    }
}

impl IntoResponse for StatsError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(StatsResponse::failure(&self));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, StatsError>;
