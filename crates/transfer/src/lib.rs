//! Chunked object upload with bounded retry, plus chunk-addressed local writes.
//!
//! Files at or below the single-shot threshold go up in one request. Larger
//! files are split into fixed-size byte ranges sent in order under one
//! upload session; each range is retried on transient failures and on
//! token or signed-URL expiry until the [`UploadPolicy`] budget runs out.

mod chunked;
mod policy;
mod types;
mod uploader;
mod validation;

pub use chunked::{ChunkReader, ChunkWriter, chunk_count, plan_chunks};
pub use policy::{RetryBudget, RetryDecision, UploadPolicy};
pub use types::{ByteRange, Chunk, UploadProgress, UploadReport, UploadSession};
pub use uploader::{
    BoxFuture, ChunkUpload, ChunkedUploader, ObjectTransfer, TokenSource, TransferFailure,
};
pub use validation::validate_relative_path;

use bucketmgr_protocol::ErrorClass;

/// Default chunk size and single-shot threshold: 2 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 2 * 1024 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("file needs {chunks} chunks, policy allows {max}")]
    TooManyChunks { chunks: u64, max: u32 },

    #[error("upload of {range} failed after {attempts} attempts: {failure}")]
    RetriesExhausted {
        range: String,
        attempts: u32,
        failure: TransferFailure,
    },

    #[error("token refresh failed: {0}")]
    TokenRefresh(TransferFailure),

    #[error("cancelled")]
    Cancelled,

    #[error("background task failed: {0}")]
    Join(String),
}

impl TransferError {
    /// Classification shown alongside the message.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Io(_) => ErrorClass::Io,
            Self::InvalidPath(_) | Self::TooManyChunks { .. } => ErrorClass::InvalidInput,
            Self::RetriesExhausted { failure, .. } => failure.class,
            Self::TokenRefresh(_) => ErrorClass::AuthExpired,
            Self::Cancelled | Self::Join(_) => ErrorClass::Fatal,
        }
    }
}
