//! Error types shared by every layer of the toolkit.
//!
//! Errors carry a structured [`ErrorContext`] so that a failure deep inside a
//! storage backend or a remote query can still say which dataset, column or
//! identifier it was working on.

use std::fmt;

/// Result type used across the crate.
pub type ExoResult<T> = Result<T, ExoError>;

/// Structured context for errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// The operation being performed (e.g. "load", "join", "download_gaia")
    pub operation: Option<String>,
    /// The entity type involved (e.g. "dataset", "column", "star_system")
    pub entity: Option<String>,
    /// The entity name or identifier, if applicable
    pub entity_id: Option<String>,
    /// Additional details about the error
    pub details: Option<String>,
    /// Whether retrying the operation may succeed
    pub retryable: bool,
}

impl ErrorContext {
    /// Create a new error context with an operation name.
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: Some(operation.into()),
            ..Default::default()
        }
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    pub fn with_entity_id(mut self, id: impl ToString) -> Self {
        self.entity_id = Some(id.to_string());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }

    fn is_empty(&self) -> bool {
        self.operation.is_none()
            && self.entity.is_none()
            && self.entity_id.is_none()
            && self.details.is_none()
            && !self.retryable
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return Ok(());
        }
        let mut parts = Vec::new();
        if let Some(ref op) = self.operation {
            parts.push(format!("operation={}", op));
        }
        if let Some(ref entity) = self.entity {
            parts.push(format!("entity={}", entity));
        }
        if let Some(ref id) = self.entity_id {
            parts.push(format!("id={}", id));
        }
        if let Some(ref details) = self.details {
            parts.push(format!("details={}", details));
        }
        if self.retryable {
            parts.push("retryable=true".to_string());
        }
        write!(f, "[{}]", parts.join(", "))
    }
}

/// Error type for catalog, storage and download operations.
#[derive(Debug, thiserror::Error)]
pub enum ExoError {
    /// A persisted dataset, star system or other named entity does not exist.
    #[error("Not found: {message} {context}")]
    NotFound {
        message: String,
        context: ErrorContext,
    },

    /// Columns disagree with the schema registry or with the stored manifest.
    #[error("Schema mismatch: {message} {context}")]
    SchemaMismatch {
        message: String,
        context: ErrorContext,
    },

    /// A column required by the operation is absent from the table.
    #[error("Missing column '{column}' {context}")]
    MissingColumn {
        column: String,
        context: ErrorContext,
    },

    /// Some items of a batch download failed.
    #[error("Partial download: {failed} of {total} items failed {context}")]
    PartialDownload {
        failed: usize,
        total: usize,
        context: ErrorContext,
    },

    /// Reading or writing persisted data failed.
    #[error("Storage error: {message} {context}")]
    Storage {
        message: String,
        context: ErrorContext,
    },

    /// A remote archive query or file transfer failed.
    #[error("Remote error: {message} {context}")]
    Remote {
        message: String,
        context: ErrorContext,
    },

    /// Configuration could not be read or is inconsistent.
    #[error("Configuration error: {message} {context}")]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    /// Input data is malformed.
    #[error("Validation error: {message} {context}")]
    Validation {
        message: String,
        context: ErrorContext,
    },

    /// Internal/unexpected errors.
    #[error("Internal error: {message} {context}")]
    Internal {
        message: String,
        context: ErrorContext,
    },
}

impl ExoError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn not_found_with_context(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::NotFound {
            message: message.into(),
            context,
        }
    }

    pub fn schema_mismatch(message: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn schema_mismatch_with_context(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::SchemaMismatch {
            message: message.into(),
            context,
        }
    }

    pub fn missing_column(column: impl Into<String>) -> Self {
        Self::MissingColumn {
            column: column.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn partial_download(failed: usize, total: usize) -> Self {
        Self::PartialDownload {
            failed,
            total,
            context: ErrorContext::default(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn storage_with_context(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::Storage {
            message: message.into(),
            context,
        }
    }

    /// Create a remote error. Transport failures are worth retrying.
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
            context: ErrorContext::default().retryable(),
        }
    }

    pub fn remote_with_context(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::Remote {
            message: message.into(),
            context,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn validation_with_context(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::Validation {
            message: message.into(),
            context,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.context().retryable
    }

    /// True for [`ExoError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Get the error context.
    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::NotFound { context, .. }
            | Self::SchemaMismatch { context, .. }
            | Self::MissingColumn { context, .. }
            | Self::PartialDownload { context, .. }
            | Self::Storage { context, .. }
            | Self::Remote { context, .. }
            | Self::Configuration { context, .. }
            | Self::Validation { context, .. }
            | Self::Internal { context, .. } => context,
        }
    }

    fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            Self::NotFound { context, .. }
            | Self::SchemaMismatch { context, .. }
            | Self::MissingColumn { context, .. }
            | Self::PartialDownload { context, .. }
            | Self::Storage { context, .. }
            | Self::Remote { context, .. }
            | Self::Configuration { context, .. }
            | Self::Validation { context, .. }
            | Self::Internal { context, .. } => context,
        }
    }

    /// Add or update the operation in the error context.
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.context_mut().operation = Some(operation.into());
        self
    }

    /// Attach the entity the failing operation was working on.
    pub fn with_entity(mut self, entity: impl Into<String>, id: impl ToString) -> Self {
        let context = self.context_mut();
        context.entity = Some(entity.into());
        context.entity_id = Some(id.to_string());
        self
    }
}

impl From<std::io::Error> for ExoError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            return ExoError::not_found(err.to_string());
        }
        ExoError::storage_with_context(
            err.to_string(),
            ErrorContext::default().with_details(format!("io_error_kind={:?}", err.kind())),
        )
    }
}

impl From<serde_json::Error> for ExoError {
    fn from(err: serde_json::Error) -> Self {
        ExoError::storage_with_context(
            format!("JSON encoding error: {}", err),
            ErrorContext::default().with_details(format!("category={:?}", err.classify())),
        )
    }
}

impl From<polars::error::PolarsError> for ExoError {
    fn from(err: polars::error::PolarsError) -> Self {
        ExoError::storage(format!("Table encoding error: {}", err))
    }
}

impl From<toml::de::Error> for ExoError {
    fn from(err: toml::de::Error) -> Self {
        ExoError::configuration(format!("Failed to parse config file: {}", err))
    }
}

impl From<tempfile::PersistError> for ExoError {
    fn from(err: tempfile::PersistError) -> Self {
        ExoError::storage_with_context(
            format!("Failed to commit file: {}", err.error),
            ErrorContext::new("persist").with_details(err.file.path().display().to_string()),
        )
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for ExoError {
    fn from(err: reqwest::Error) -> Self {
        let mut context = ErrorContext::default();
        if let Some(url) = err.url() {
            context = context.with_entity("url").with_entity_id(url.as_str());
        }
        if let Some(status) = err.status() {
            context = context.with_details(format!("status={}", status));
        }
        // Timeouts, refused connections and 5xx answers are transient
        let transient = err.is_timeout()
            || err.is_connect()
            || err.status().map(|s| s.is_server_error()).unwrap_or(false);
        if transient {
            context = context.retryable();
        }
        ExoError::Remote {
            message: err.to_string(),
            context,
        }
    }
}
