use thiserror::Error;

/// Convenience type alias for Results with HubError
pub type Result<T> = std::result::Result<T, HubError>;

/// Error taxonomy for the hub coordination core.
///
/// Every variant maps to one of the six kinds the API surface exposes to
/// callers (`kind` field of the `{ok, error}` envelope); the variant name
/// and the wire `kind` string are kept identical on purpose.
#[derive(Error, Debug)]
pub enum HubError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("state conflict: {0}")]
    StateConflict(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl HubError {
    /// Wire-level kind string used in the `{ok, error: {kind, message}}` envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            HubError::NotFound(_) => "not_found",
            HubError::StateConflict(_) => "state_conflict",
            HubError::PermissionDenied(_) => "permission_denied",
            HubError::Unavailable(_) => "unavailable",
            HubError::InvalidArgument(_) => "invalid_argument",
            HubError::Internal(_) | HubError::Config(_) | HubError::Http(_) => "internal",
        }
    }

    /// Whether a scheduler retry should be attempted for this error kind.
    /// Only `Unavailable` (and its underlying transport failures) are transient;
    /// everything else is permanent per the retry policy in the scheduler.
    pub fn is_transient(&self) -> bool {
        matches!(self, HubError::Unavailable(_) | HubError::Http(_))
    }

    /// Administrative CLI exit code for this error, per the wire contract.
    pub fn exit_code(&self) -> i32 {
        match self {
            HubError::NotFound(_) => 4,
            HubError::StateConflict(_) => 5,
            HubError::InvalidArgument(_) => 2,
            HubError::Unavailable(_) | HubError::Http(_) => 3,
            HubError::PermissionDenied(_) | HubError::Internal(_) | HubError::Config(_) => 1,
        }
    }
}
