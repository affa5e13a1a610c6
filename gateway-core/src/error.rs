//! The six user-visible error codes (spec.md §7) and the internal error
//! types each component raises, classified into exactly one of them.

use crate::reflection::ReflectionError;

/// Codes returned in the HTTP response body's `code` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    ArgsParseFailed = 10001,
    LoginRequired = 10002,
    MethodNotFound = 10003,
    NoAvailableService = 10004,
    RemoteCallFailed = 10005,
    InternalServerError = 10006,
}

impl ErrorCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("registry transport error: {0}")]
    Transport(#[from] etcd_client::Error),
    #[error("registry watch stream ended unexpectedly")]
    WatchClosed,
    #[error("registry watch was compacted or otherwise lost events")]
    WatchCompacted,
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("routing record not found for {0}")]
    NotFound(String),
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("routing record for {0} is not valid JSON: {1}")]
    Malformed(String, serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error("method directory lookup failed: {0}")]
    Directory(#[from] DirectoryError),
    #[error("authentication required for this method")]
    LoginRequired,
    #[error("no available backend for service '{0}'")]
    NoAvailableService(String),
    #[error("request body is not valid JSON: {0}")]
    ArgsParseFailed(serde_json::Error),
    #[error("descriptor resolution failed: {0}")]
    Reflection(#[from] ReflectionError),
    #[error("transcoding failed: {0}")]
    Transcode(#[from] crate::codec::TranscodeError),
    #[error("remote call failed: {0}")]
    RemoteCallFailed(tonic::Status),
    #[error("channel dial failed: {0}")]
    DialFailed(#[from] tonic::transport::Error),
}

impl InvokeError {
    /// Classifies any internal failure into exactly one public error code
    /// (spec.md §7). This match has no wildcard arm so that adding a new
    /// variant forces a decision here.
    pub fn code(&self) -> ErrorCode {
        match self {
            InvokeError::ArgsParseFailed(_) => ErrorCode::ArgsParseFailed,
            InvokeError::LoginRequired => ErrorCode::LoginRequired,
            InvokeError::Directory(DirectoryError::NotFound(_)) => ErrorCode::MethodNotFound,
            InvokeError::NoAvailableService(_) | InvokeError::DialFailed(_) => {
                ErrorCode::NoAvailableService
            }
            InvokeError::RemoteCallFailed(_) => ErrorCode::RemoteCallFailed,
            InvokeError::Directory(_) | InvokeError::Reflection(_) | InvokeError::Transcode(_) => {
                ErrorCode::InternalServerError
            }
        }
    }
}
