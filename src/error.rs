use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::search::Retriever;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    InputError,
    RetrieverUnavailable,
    AllRetrieversUnavailable,
    IndexWriteFailure,
    IndexReadFailure,
    InvalidRequest,
    IoError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InputError => write!(f, "INPUT_ERROR"),
            Self::RetrieverUnavailable => write!(f, "RETRIEVER_UNAVAILABLE"),
            Self::AllRetrieversUnavailable => write!(f, "ALL_RETRIEVERS_UNAVAILABLE"),
            Self::IndexWriteFailure => write!(f, "INDEX_WRITE_FAILURE"),
            Self::IndexReadFailure => write!(f, "INDEX_READ_FAILURE"),
            Self::InvalidRequest => write!(f, "INVALID_REQUEST"),
            Self::IoError => write!(f, "IO_ERROR"),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RadarError {
    pub code: ErrorCode,
    pub message: String,
}

impl fmt::Display for RadarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for RadarError {}

impl RadarError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    pub fn input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InputError, message)
    }

    pub fn retriever_unavailable(retriever: Retriever, reason: &str) -> Self {
        Self::new(
            ErrorCode::RetrieverUnavailable,
            format!("{retriever} retriever unavailable: {reason}"),
        )
    }

    pub fn all_retrievers_unavailable() -> Self {
        Self::new(
            ErrorCode::AllRetrieversUnavailable,
            "All retrievers are unavailable (lexical, dense, sparse)",
        )
    }

    pub fn index_write(repo_id: &str, reason: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::IndexWriteFailure,
            format!("Failed to publish batch for {repo_id}: {reason}"),
        )
    }

    pub fn index_read(repo_id: &str, reason: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::IndexReadFailure,
            format!("Failed to read index for {repo_id}: {reason}"),
        )
    }
}

/// The `{code, message}` pair reported to callers. Errors that carry no
/// `RadarError` are reported as `IO_ERROR`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl From<&anyhow::Error> for ErrorBody {
    fn from(e: &anyhow::Error) -> Self {
        match e.downcast_ref::<RadarError>() {
            Some(re) => Self {
                code: re.code.to_string(),
                message: re.message.clone(),
            },
            None => Self {
                code: ErrorCode::IoError.to_string(),
                message: e.to_string(),
            },
        }
    }
}

/// Extract the error code carried by an `anyhow` chain, if any.
pub fn code_of(e: &anyhow::Error) -> Option<ErrorCode> {
    e.downcast_ref::<RadarError>().map(|re| re.code)
}
