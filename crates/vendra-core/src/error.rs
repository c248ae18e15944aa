use std::fmt;

/// Main error type for vendra
#[derive(Debug)]
pub enum Error {
    /// Configuration errors
    Config(String),

    /// Database errors (SQLx wrapped)
    Database(sqlx::Error),

    /// HTTP/Network errors
    Network(String),

    /// Validation errors
    Validation(String),

    /// Not found errors
    NotFound(String),

    /// Order status transition not allowed by the lifecycle graph
    InvalidTransition { from: String, to: String },

    /// Order is in a state that forbids the requested modification
    CannotModify(String),

    /// Order has already been cancelled
    AlreadyCancelled(String),

    /// Optimistic version check failed after retry
    ConcurrentModification(String),

    /// Unique constraint violations (duplicate outbox event id, tracking number)
    Conflict(String),

    /// No active coverage area matches the destination
    LocationNotCovered(String),

    /// Third-party delivery provider failures
    Provider(String),

    /// Cache errors
    Cache(String),

    /// Serialization errors
    Serialization(serde_json::Error),

    /// IO errors
    Io(std::io::Error),

    /// Generic errors with description
    Other(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Database(e) => write!(f, "Database error: {}", e),
            Error::Network(msg) => write!(f, "Network error: {}", msg),
            Error::Validation(msg) => write!(f, "Validation error: {}", msg),
            Error::NotFound(msg) => write!(f, "Not found: {}", msg),
            Error::InvalidTransition { from, to } => {
                write!(f, "invalid status transition from {} to {}", from, to)
            }
            Error::CannotModify(msg) => write!(f, "Order cannot be modified: {}", msg),
            Error::AlreadyCancelled(msg) => write!(f, "Order already cancelled: {}", msg),
            Error::ConcurrentModification(msg) => write!(f, "Concurrent modification: {}", msg),
            Error::Conflict(msg) => write!(f, "Conflict: {}", msg),
            Error::LocationNotCovered(msg) => write!(f, "Location not covered: {}", msg),
            Error::Provider(msg) => write!(f, "Provider error: {}", msg),
            Error::Cache(msg) => write!(f, "Cache error: {}", msg),
            Error::Serialization(e) => write!(f, "Serialization error: {}", e),
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Database(e) => Some(e),
            Error::Serialization(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

// Conversions from external error types
impl From<sqlx::Error> for Error {
    fn from(error: sqlx::Error) -> Self {
        Error::Database(error)
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Serialization(error)
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::Io(error)
    }
}

impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::Config(error.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        Error::Network(error.to_string())
    }
}

impl From<uuid::Error> for Error {
    fn from(error: uuid::Error) -> Self {
        Error::Validation(format!("Invalid UUID: {}", error))
    }
}

// Common error constructors
impl Error {
    /// Create a new configuration error
    pub fn config<T: Into<String>>(msg: T) -> Self {
        Error::Config(msg.into())
    }

    /// Create a new validation error
    pub fn validation<T: Into<String>>(msg: T) -> Self {
        Error::Validation(msg.into())
    }

    /// Create a new not found error
    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        Error::NotFound(msg.into())
    }

    /// Create a new conflict error
    pub fn conflict<T: Into<String>>(msg: T) -> Self {
        Error::Conflict(msg.into())
    }

    /// Create a new concurrent modification error
    pub fn concurrent<T: Into<String>>(msg: T) -> Self {
        Error::ConcurrentModification(msg.into())
    }

    /// Create a new provider error
    pub fn provider<T: Into<String>>(msg: T) -> Self {
        Error::Provider(msg.into())
    }

    /// Create a new cache error
    pub fn cache<T: Into<String>>(msg: T) -> Self {
        Error::Cache(msg.into())
    }

    /// Create a new network error
    pub fn network<T: Into<String>>(msg: T) -> Self {
        Error::Network(msg.into())
    }

    /// Invalid transition between order statuses
    pub fn invalid_transition(from: impl fmt::Debug, to: impl fmt::Debug) -> Self {
        Error::InvalidTransition {
            from: format!("{:?}", from).to_lowercase(),
            to: format!("{:?}", to).to_lowercase(),
        }
    }
}

impl Error {
    /// Get HTTP status code for error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::NotFound(_) => 404,
            Error::LocationNotCovered(_) => 404,
            Error::InvalidTransition { .. } => 409,
            Error::CannotModify(_) => 409,
            Error::AlreadyCancelled(_) => 409,
            Error::ConcurrentModification(_) => 409,
            Error::Conflict(_) => 409,
            Error::Provider(_) => 502,
            Error::Network(_) => 503,
            Error::Config(_) => 500,
            Error::Database(_) => 500,
            Error::Cache(_) => 500,
            Error::Serialization(_) => 500,
            Error::Io(_) => 500,
            Error::Other(_) => 500,
        }
    }

    /// Get error category for monitoring
    pub fn category(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Database(_) => "database",
            Error::Network(_) => "network",
            Error::Validation(_) => "validation",
            Error::NotFound(_) => "not_found",
            Error::InvalidTransition { .. } => "invalid_transition",
            Error::CannotModify(_) => "cannot_modify",
            Error::AlreadyCancelled(_) => "already_cancelled",
            Error::ConcurrentModification(_) => "concurrent_modification",
            Error::Conflict(_) => "conflict",
            Error::LocationNotCovered(_) => "not_covered",
            Error::Provider(_) => "provider",
            Error::Cache(_) => "cache",
            Error::Serialization(_) => "serialization",
            Error::Io(_) => "io",
            Error::Other(_) => "other",
        }
    }

    /// Whether a retry with a fresh read may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ConcurrentModification(_) | Error::Network(_))
    }
}

/// Map a sqlx error to Conflict when it is a unique-constraint violation,
/// otherwise wrap it as a database error.
pub fn map_unique_violation(error: sqlx::Error, conflict_msg: &str) -> Error {
    if let sqlx::Error::Database(ref db_err) = error {
        if db_err.is_unique_violation() {
            return Error::Conflict(conflict_msg.to_string());
        }
    }
    Error::Database(error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::validation("bad").status_code(), 400);
        assert_eq!(Error::not_found("gone").status_code(), 404);
        assert_eq!(Error::concurrent("lost update").status_code(), 409);
        assert_eq!(Error::LocationNotCovered("ZZ".into()).status_code(), 404);
        assert_eq!(
            Error::InvalidTransition { from: "delivered".into(), to: "pending".into() }
                .status_code(),
            409
        );
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = Error::InvalidTransition { from: "delivered".into(), to: "pending".into() };
        let msg = err.to_string();
        assert!(msg.contains("invalid status transition"));
        assert!(msg.contains("delivered"));
        assert!(msg.contains("pending"));
    }

    #[test]
    fn test_categories() {
        assert_eq!(Error::validation("x").category(), "validation");
        assert_eq!(Error::conflict("x").category(), "conflict");
        assert_eq!(Error::provider("x").category(), "provider");
    }
}
