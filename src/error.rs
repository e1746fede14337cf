use std::fmt;

/// The primary error type for the `audit-rag` library.
///
/// Every failure of the session provider, the two Cortex adapters and the
/// chat pipeline is reported through this enum so the terminal front end
/// can print it and decide whether the session can continue.
#[derive(Debug)]
pub enum RagError {
    /// A missing or malformed setting, such as an absent environment
    /// variable or an out-of-range chat option.
    ConfigError(String),

    /// Key material or a host token could not be read, parsed or signed.
    AuthError(String),

    /// An error that occurs during an API request, typically related to
    /// network issues or DNS problems. Wraps a `reqwest::Error`.
    RequestError(reqwest::Error),

    /// A non-successful response from Snowflake (e.g., 4xx or 5xx).
    /// Includes the HTTP status code and the response body for debugging.
    ApiError { status: u16, body: String },

    /// The response body was not valid JSON or did not match the
    /// expected structure.
    ResponseParseError(String),

    /// Listing or describing the Cortex Search services failed.
    DiscoveryError(String),

    /// An error specific to the retrieval step (unknown service,
    /// malformed search results).
    RetrievalError(String),

    /// An error originating from within the stateful `Chat` session.
    ChatError(String),

    /// An I/O error, such as an unreadable host token file.
    IoError(std::io::Error),
}

impl fmt::Display for RagError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RagError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            RagError::AuthError(msg) => write!(f, "Authentication error: {}", msg),
            RagError::RequestError(err) => write!(f, "Request error: {}", err),
            RagError::ApiError { status, body } => {
                write!(f, "API error (status {}): {}", status, body)
            }
            RagError::ResponseParseError(msg) => write!(f, "Response parse error: {}", msg),
            RagError::DiscoveryError(msg) => write!(f, "Service discovery error: {}", msg),
            RagError::RetrievalError(msg) => write!(f, "Retrieval error: {}", msg),
            RagError::ChatError(msg) => write!(f, "Chat session error: {}", msg),
            RagError::IoError(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for RagError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RagError::RequestError(err) => Some(err),
            RagError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

// --- From Implementations for Ergonomics ---

impl From<reqwest::Error> for RagError {
    fn from(err: reqwest::Error) -> Self {
        RagError::RequestError(err)
    }
}

impl From<serde_json::Error> for RagError {
    fn from(err: serde_json::Error) -> Self {
        RagError::ResponseParseError(err.to_string())
    }
}

impl From<std::io::Error> for RagError {
    fn from(err: std::io::Error) -> Self {
        RagError::IoError(err)
    }
}

impl From<jsonwebtoken::errors::Error> for RagError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        RagError::AuthError(err.to_string())
    }
}
