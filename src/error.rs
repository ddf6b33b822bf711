//! Unified application error model and mapping helpers.
//! This module provides a common error enum used across the HTTP surface and
//! the authentication/dispatch layers, along with the HTTP status mapper.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    MalformedSample { code: String, message: String },
    NoMatch { code: String, message: String },
    Unauthorized { code: String, message: String },
    ExecutionFailed { code: String, message: String },
    TimedOut { code: String, message: String },
    StoreUnavailable { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::MalformedSample { code, .. }
            | AppError::NoMatch { code, .. }
            | AppError::Unauthorized { code, .. }
            | AppError::ExecutionFailed { code, .. }
            | AppError::TimedOut { code, .. }
            | AppError::StoreUnavailable { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::MalformedSample { message, .. }
            | AppError::NoMatch { message, .. }
            | AppError::Unauthorized { message, .. }
            | AppError::ExecutionFailed { message, .. }
            | AppError::TimedOut { message, .. }
            | AppError::StoreUnavailable { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn malformed<S: Into<String>>(code: S, msg: S) -> Self { AppError::MalformedSample { code: code.into(), message: msg.into() } }
    pub fn no_match<S: Into<String>>(code: S, msg: S) -> Self { AppError::NoMatch { code: code.into(), message: msg.into() } }
    pub fn unauthorized<S: Into<String>>(code: S, msg: S) -> Self { AppError::Unauthorized { code: code.into(), message: msg.into() } }
    pub fn execution<S: Into<String>>(code: S, msg: S) -> Self { AppError::ExecutionFailed { code: code.into(), message: msg.into() } }
    pub fn timed_out<S: Into<String>>(code: S, msg: S) -> Self { AppError::TimedOut { code: code.into(), message: msg.into() } }
    pub fn store_unavailable<S: Into<String>>(code: S, msg: S) -> Self { AppError::StoreUnavailable { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::MalformedSample { .. } => 400,
            AppError::NoMatch { .. } => 401,
            AppError::Unauthorized { .. } => 401,
            AppError::ExecutionFailed { .. } => 422,
            AppError::TimedOut { .. } => 504,
            AppError::StoreUnavailable { .. } => 503,
            AppError::Internal { .. } => 500,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        // Default mapping: treat as Internal unless downcasted elsewhere
        AppError::Internal { code: "internal_error".into(), message: err.to_string() }
    }
}
