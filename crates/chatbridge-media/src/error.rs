use thiserror::Error;

use chatbridge_shared::TransportError;
use chatbridge_store::StoreError;

#[derive(Error, Debug)]
pub enum MediaError {
    /// The leading `OggS` page signature is missing.
    #[error("Not a valid Ogg file (missing OggS signature)")]
    NotOgg,

    #[error("Message carries no media")]
    NotMedia,

    /// One of locator, key, digests or length is missing.
    #[error("Incomplete media information for download")]
    IncompleteMedia,

    #[error("Invalid media path: {0}")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Media fetch failed: {0}")]
    Fetch(#[from] TransportError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Lock poisoned: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, MediaError>;
