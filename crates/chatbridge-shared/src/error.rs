use thiserror::Error;

/// Failures reported by the external transport collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Transport is not connected")]
    Disconnected,

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Media download failed: {0}")]
    Download(String),

    #[error("Media upload failed: {0}")]
    Upload(String),

    #[error("Operation not supported by this transport: {0}")]
    Unsupported(&'static str),
}

/// Failures of a correlated query/response exchange.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// No response arrived in time.  Kept distinct from `Send` so callers
    /// can decide whether a retry makes sense.
    #[error("Timed out waiting for response to query {id}")]
    Timeout { id: String },

    #[error("Failed to send query: {0}")]
    Send(#[from] TransportError),

    #[error("A query with id {0} is already pending")]
    DuplicateId(String),

    #[error("Query {id} was cancelled before a response arrived")]
    Cancelled { id: String },
}
