//! Error types for the identity backend contract.
//!
//! Two layers: [`DirectoryError`] for faults raised by the directory
//! transport collaborator, and [`BackendError`] for conditions a backend
//! operation surfaces to the host. Soft negatives (wrong credentials,
//! never-existed identities, natively unsupported actions) are plain
//! `Ok(false)` / `Ok(None)` returns and never appear here.

use thiserror::Error;

/// Error raised by the directory transport.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The directory service could not be reached or the connection dropped.
    #[error("directory unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A search request failed on the server side.
    #[error("directory search failed: {message}")]
    SearchFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The named entry does not exist.
    #[error("no such entry: {dn}")]
    NoSuchEntry { dn: String },

    /// A password modification was rejected by directory-side policy.
    ///
    /// Carries the server's message and result code so the backend can
    /// surface the rejection verbatim.
    #[error("password rejected by policy: {message} (code {code})")]
    PasswordPolicy { message: String, code: u32 },
}

impl DirectoryError {
    /// Create an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        DirectoryError::Unavailable {
            message: message.into(),
            source: None,
        }
    }

    /// Create an unavailable error with source.
    pub fn unavailable_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DirectoryError::Unavailable {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a search failure.
    pub fn search_failed(message: impl Into<String>) -> Self {
        DirectoryError::SearchFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a search failure with source.
    pub fn search_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DirectoryError::SearchFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type for directory transport calls.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Error surfaced by a backend operation.
#[derive(Debug, Error)]
pub enum BackendError {
    /// An operation requiring directory resolvability was invoked against
    /// an identity that was known once but has vanished from the directory.
    #[error("identity '{uid}' is known but no longer present in the directory")]
    Offline { uid: String },

    /// The identity object could not be obtained at all.
    #[error("identity lookup failed: {message}")]
    Fatal { message: String },

    /// The directory rejected a password change. Message and code are
    /// passed through from the directory unmodified.
    #[error("{message}")]
    PolicyRejected { message: String, code: u32 },

    /// A plugin was asked for an action it does not implement.
    #[error("action not implemented by plugin")]
    Unsupported,

    /// A transport fault from the directory collaborator.
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

impl BackendError {
    /// Create an offline-identity error.
    pub fn offline(uid: impl Into<String>) -> Self {
        BackendError::Offline { uid: uid.into() }
    }

    /// Create a fatal lookup error.
    pub fn fatal(message: impl Into<String>) -> Self {
        BackendError::Fatal {
            message: message.into(),
        }
    }

    /// Create a policy rejection with the directory's message and code.
    pub fn policy_rejected(message: impl Into<String>, code: u32) -> Self {
        BackendError::PolicyRejected {
            message: message.into(),
            code,
        }
    }

    /// Get an error code for classification at the host boundary.
    pub fn error_code(&self) -> &'static str {
        match self {
            BackendError::Offline { .. } => "OFFLINE_IDENTITY",
            BackendError::Fatal { .. } => "FATAL_LOOKUP",
            BackendError::PolicyRejected { .. } => "POLICY_REJECTED",
            BackendError::Unsupported => "UNSUPPORTED",
            BackendError::Directory(_) => "DIRECTORY_FAULT",
        }
    }
}

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(BackendError::offline("jake").error_code(), "OFFLINE_IDENTITY");
        assert_eq!(BackendError::fatal("gone").error_code(), "FATAL_LOOKUP");
        assert_eq!(
            BackendError::policy_rejected("too weak", 19).error_code(),
            "POLICY_REJECTED"
        );
        assert_eq!(BackendError::Unsupported.error_code(), "UNSUPPORTED");
    }

    #[test]
    fn test_policy_rejection_message_passthrough() {
        let err = BackendError::policy_rejected("Password fails quality checking policy", 19);
        assert_eq!(err.to_string(), "Password fails quality checking policy");
        if let BackendError::PolicyRejected { code, .. } = err {
            assert_eq!(code, 19);
        } else {
            panic!("expected PolicyRejected variant");
        }
    }

    #[test]
    fn test_directory_error_conversion() {
        let err: BackendError = DirectoryError::unavailable("connection refused").into();
        assert_eq!(err.error_code(), "DIRECTORY_FAULT");
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_error_with_source() {
        let source = std::io::Error::other("socket closed");
        let err = DirectoryError::search_failed_with_source("search aborted", source);
        if let DirectoryError::SearchFailed { source, .. } = &err {
            assert!(source.is_some());
        } else {
            panic!("expected SearchFailed variant");
        }
    }
}
