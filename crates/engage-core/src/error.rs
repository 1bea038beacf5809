use std::fmt;

/// Machine-readable error codes shared by the library, CLI, and simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ValidationFailed,
    FetchFailed,
    SubmissionFailed,
    SubmissionRejected,
    ReactionSyncFailed,
    ThreadShapeViolation,
    ConfigParseError,
    StorageUnavailable,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ValidationFailed => "E1001",
            Self::FetchFailed => "E2001",
            Self::SubmissionFailed => "E2002",
            Self::SubmissionRejected => "E2004",
            Self::ReactionSyncFailed => "E2003",
            Self::ThreadShapeViolation => "E3001",
            Self::ConfigParseError => "E4001",
            Self::StorageUnavailable => "E5001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ValidationFailed => "Comment failed validation",
            Self::FetchFailed => "Could not load from the remote store",
            Self::SubmissionFailed => "Comment could not be posted",
            Self::SubmissionRejected => "Posted comment could not be shown",
            Self::ReactionSyncFailed => "Reaction was not saved",
            Self::ThreadShapeViolation => "Comment does not fit the thread",
            Self::ConfigParseError => "Config file parse error",
            Self::StorageUnavailable => "Local storage unavailable",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced next to the message.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ValidationFailed => Some("Fix the highlighted field and submit again."),
            Self::FetchFailed => Some("Retry shortly; the thread stays as it was."),
            Self::SubmissionFailed => {
                Some("Your text was kept. Retry when the connection is back.")
            }
            Self::SubmissionRejected => {
                Some("Reload the thread before posting again; the comment may already exist.")
            }
            Self::ReactionSyncFailed => Some("The counter was restored. Click again to retry."),
            Self::ThreadShapeViolation => Some("Reply to a top-level comment instead."),
            Self::ConfigParseError => Some("Fix syntax in .engage/config.toml and retry."),
            Self::StorageUnavailable => None,
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
