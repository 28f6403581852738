//! Error types for grant sharing.

use crate::buffer::SharedBuffer;
use std::collections::TryReserveError;
use thiserror::Error;

/// Errors that can occur while sharing, encoding or resolving buffers.
#[derive(Error, Debug)]
pub enum GrantError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Out of memory")]
    OutOfMemory,

    #[error("Platform rejected {operation}: {reason}")]
    PlatformFailure {
        operation: &'static str,
        reason: String,
    },

    #[error("Malformed metapage: {0}")]
    FormatError(String),
}

impl GrantError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        GrantError::InvalidArgument(msg.into())
    }

    pub fn platform(operation: &'static str, reason: impl Into<String>) -> Self {
        GrantError::PlatformFailure {
            operation,
            reason: reason.into(),
        }
    }

    pub fn format(msg: impl Into<String>) -> Self {
        GrantError::FormatError(msg.into())
    }
}

impl From<TryReserveError> for GrantError {
    fn from(_: TryReserveError) -> Self {
        GrantError::OutOfMemory
    }
}

/// Result type for grant operations.
pub type GrantResult<T> = Result<T, GrantError>;

/// A failed [`release_shared_buffer`].
///
/// While the buffer is still shared it is handed back, and releasing it
/// again picks up where the failed call stopped.
///
/// [`release_shared_buffer`]: crate::instance::Instance::release_shared_buffer
#[derive(Error, Debug)]
#[error("{error}")]
pub struct ReleaseError {
    buffer: Option<SharedBuffer>,
    error: GrantError,
}

impl ReleaseError {
    pub(crate) fn retained(buffer: SharedBuffer, error: GrantError) -> Self {
        Self {
            buffer: Some(buffer),
            error,
        }
    }

    pub(crate) fn released(error: GrantError) -> Self {
        Self {
            buffer: None,
            error,
        }
    }

    pub fn error(&self) -> &GrantError {
        &self.error
    }

    /// The buffer, if it is still shared and can be released again.
    pub fn into_buffer(self) -> Option<SharedBuffer> {
        self.buffer
    }

    pub fn into_error(self) -> GrantError {
        self.error
    }
}
