use std::borrow::Cow;
use std::io;

/// Namespace-level failures. Any of these aborts the whole operation.
#[amora_derive::amora_error(result)]
pub enum StorageError {
    /// The filesystem refused to create or list a directory (permissions, device errors).
    #[error("Storage unavailable{}: {source}", format_context(.context))]
    Unavailable { source: io::Error, context: Option<Cow<'static, str>> },

    /// A user id or file name failed validation before any I/O happened.
    #[error("Invalid name{}: {message}", format_context(.context))]
    InvalidName { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Path traversal security violation{}: {message}", format_context(.context))]
    PathTraversalAttempt { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Internal storage fault{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

impl StorageError {
    /// `true` for failures the caller may retry later (infrastructure, not input).
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Internal { .. })
    }
}

/// Why a single file did not end up stored.
///
/// Transfer failures are values, not errors: they are reported per item and never
/// abort sibling items of a batch.
#[derive(Debug, thiserror::Error)]
pub enum TransferFailure {
    #[error("namespace already holds the maximum of {ceiling} files")]
    QuotaExceeded { ceiling: usize },

    #[error("transfer cancelled: {source}")]
    Cancelled { source: io::Error },

    #[error("invalid file name: {reason}")]
    InvalidName { reason: Cow<'static, str> },

    #[error("file exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },

    #[error("transfer failed: {source}")]
    Io { source: io::Error },

    /// The namespace could no longer be inspected while a batch was in progress.
    #[error("storage unavailable: {message}")]
    Unavailable { message: Cow<'static, str> },
}

impl TransferFailure {
    /// Stable machine-readable label, used in API payloads and log fields.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::QuotaExceeded { .. } => "quotaExceeded",
            Self::Cancelled { .. } => "cancelled",
            Self::InvalidName { .. } => "invalidName",
            Self::TooLarge { .. } => "tooLarge",
            Self::Io { .. } => "ioError",
            Self::Unavailable { .. } => "unavailable",
        }
    }

    /// Splits stream errors into client aborts and genuine I/O failures.
    pub(crate) fn from_stream(err: io::Error) -> Self {
        use io::ErrorKind::{
            BrokenPipe, ConnectionAborted, ConnectionReset, Interrupted, TimedOut, UnexpectedEof,
        };

        match err.kind() {
            BrokenPipe | ConnectionAborted | ConnectionReset | Interrupted | TimedOut
            | UnexpectedEof => Self::Cancelled { source: err },
            _ => Self::Io { source: err },
        }
    }
}
