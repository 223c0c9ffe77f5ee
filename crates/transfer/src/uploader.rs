//! Single-shot and chunked uploads against an [`ObjectTransfer`] backend.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use bucketmgr_protocol::ErrorClass;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chunked::{ChunkReader, chunk_count, plan_chunks};
use crate::policy::{RetryBudget, RetryDecision, UploadPolicy};
use crate::types::{ByteRange, Chunk, UploadProgress, UploadReport, UploadSession};
use crate::TransferError;

/// Boxed future returned by the collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A failed upload request, classified for the retry policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} [{class}]")]
pub struct TransferFailure {
    pub class: ErrorClass,
    pub message: String,
}

impl TransferFailure {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::TransientNetworkFailure, message)
    }

    pub fn token_expired(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::AuthExpired, message)
    }

    pub fn url_expired(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::UrlExpired, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Fatal, message)
    }
}

/// One chunk request within an upload session.
#[derive(Debug, Clone, Copy)]
pub struct ChunkUpload<'a> {
    pub bucket: &'a str,
    pub object: &'a str,
    pub range: ByteRange,
    /// Size of the whole file.
    pub total: u64,
    pub session_id: &'a str,
    pub data: &'a [u8],
}

impl ChunkUpload<'_> {
    /// `Content-Range` header value for this chunk.
    pub fn content_range(&self) -> String {
        self.range.content_range(self.total)
    }
}

/// Remote object store the uploader writes to.
///
/// Implemented over HTTP by the storage client; tests substitute scripted mocks.
pub trait ObjectTransfer: Send + Sync {
    /// Uploads a whole object in one request.
    fn upload_object<'a>(
        &'a self,
        bucket: &'a str,
        object: &'a str,
        data: &'a [u8],
        token: &'a str,
    ) -> BoxFuture<'a, Result<(), TransferFailure>>;

    /// Uploads one byte range of a resumable session.
    fn upload_chunk<'a>(
        &'a self,
        chunk: ChunkUpload<'a>,
        token: &'a str,
    ) -> BoxFuture<'a, Result<(), TransferFailure>>;
}

/// Mints a fresh bearer token after the current one was rejected.
pub trait TokenSource: Send + Sync {
    fn refresh(&self) -> BoxFuture<'_, Result<String, TransferFailure>>;
}

#[derive(Clone, Copy)]
enum Request<'a> {
    Whole {
        bucket: &'a str,
        object: &'a str,
        data: &'a [u8],
    },
    Chunk(ChunkUpload<'a>),
}

impl Request<'_> {
    fn describe(&self) -> String {
        match self {
            Self::Whole { data, .. } => format!("whole object ({} bytes)", data.len()),
            Self::Chunk(chunk) => chunk.content_range(),
        }
    }
}

/// Uploads local files, chunking those above the single-shot threshold.
pub struct ChunkedUploader {
    transport: Arc<dyn ObjectTransfer>,
    tokens: Option<Arc<dyn TokenSource>>,
    policy: UploadPolicy,
    cancel: CancellationToken,
}

impl ChunkedUploader {
    pub fn new(transport: Arc<dyn ObjectTransfer>, policy: UploadPolicy) -> Self {
        Self {
            transport,
            tokens: None,
            policy,
            cancel: CancellationToken::new(),
        }
    }

    /// Sets the source consulted when a request fails with an expired token.
    ///
    /// Without one, token-expiry retries resend the original token.
    pub fn with_token_source(mut self, tokens: Arc<dyn TokenSource>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Uses `cancel` to abort the upload between requests.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    /// Uploads `path` as `bucket/object`.
    ///
    /// `on_progress` receives [`UploadProgress::Indeterminate`] before the
    /// first request and a percentage after every acknowledged request.
    /// Exhausting the retries for any chunk fails the whole upload; chunks
    /// already sent are not rolled back and the remote session is abandoned.
    pub async fn upload<F>(
        &self,
        bucket: &str,
        object: &str,
        path: &Path,
        access_token: &str,
        mut on_progress: F,
    ) -> Result<UploadReport, TransferError>
    where
        F: FnMut(UploadProgress) + Send,
    {
        let mut reader = open_reader(path, self.policy.chunk_size).await?;
        let size = reader.file_size();
        let mut token = access_token.to_string();

        on_progress(UploadProgress::Indeterminate);

        if size <= self.policy.single_shot_threshold {
            debug!(bucket, object, bytes = size, "single-shot upload");
            let (_, data) = read_whole(reader).await?;
            let attempts = self
                .send(
                    Request::Whole {
                        bucket,
                        object,
                        data: &data,
                    },
                    &mut token,
                )
                .await?;
            on_progress(UploadProgress::Percent(100));
            info!(bucket, object, bytes = size, attempts, "upload completed");
            return Ok(UploadReport {
                session_id: None,
                bytes: size,
                chunks: 1,
                attempts,
            });
        }

        let chunk_count = chunk_count(size, self.policy.chunk_size);
        if chunk_count > u64::from(self.policy.max_chunk_count) {
            return Err(TransferError::TooManyChunks {
                chunks: chunk_count,
                max: self.policy.max_chunk_count,
            });
        }
        let ranges = plan_chunks(size, self.policy.chunk_size);

        let mut session = UploadSession::new(size);
        info!(
            bucket,
            object,
            bytes = size,
            chunks = chunk_count,
            session = %session.id(),
            "starting chunked upload"
        );

        let mut attempts = 0;
        for (index, expected) in ranges.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(TransferError::Cancelled);
            }

            let (returned, chunk) = read_next(reader).await?;
            reader = returned;
            let chunk = chunk.filter(|c| c.range == expected).ok_or_else(|| {
                TransferError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("file changed while uploading: expected {expected}"),
                ))
            })?;

            let request = ChunkUpload {
                bucket,
                object,
                range: chunk.range,
                total: size,
                session_id: session.id(),
                data: &chunk.data,
            };
            attempts += self.send(Request::Chunk(request), &mut token).await?;

            session.acknowledge(chunk.range);
            debug!(
                chunk = index,
                range = %chunk.range,
                acknowledged = session.acknowledged_bytes(),
                "chunk acknowledged"
            );
            on_progress(UploadProgress::Percent(session.percent()));
        }

        info!(bucket, object, bytes = size, attempts, "upload completed");
        Ok(UploadReport {
            session_id: Some(session.id().to_string()),
            bytes: size,
            chunks: session.acknowledged().len(),
            attempts,
        })
    }

    /// Sends one request until it succeeds or its retry budget is spent.
    ///
    /// Returns the number of calls made. Retries reuse the identical request.
    async fn send(&self, request: Request<'_>, token: &mut String) -> Result<u32, TransferError> {
        let mut budget = RetryBudget::new(&self.policy);
        let mut attempts = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(TransferError::Cancelled);
            }
            attempts += 1;

            let result = match request {
                Request::Whole {
                    bucket,
                    object,
                    data,
                } => {
                    self.transport
                        .upload_object(bucket, object, data, token)
                        .await
                }
                Request::Chunk(chunk) => self.transport.upload_chunk(chunk, token).await,
            };
            let failure = match result {
                Ok(()) => return Ok(attempts),
                Err(failure) => failure,
            };

            match budget.charge(failure.class) {
                RetryDecision::GiveUp => {
                    error!(
                        request = %request.describe(),
                        attempts,
                        class = %failure.class,
                        "upload request failed"
                    );
                    return Err(TransferError::RetriesExhausted {
                        range: request.describe(),
                        attempts,
                        failure,
                    });
                }
                RetryDecision::Retry {
                    delay,
                    refresh_token,
                } => {
                    warn!(
                        request = %request.describe(),
                        attempt = attempts,
                        class = %failure.class,
                        error = %failure.message,
                        "retrying upload request"
                    );
                    if refresh_token && let Some(tokens) = &self.tokens {
                        *token = tokens
                            .refresh()
                            .await
                            .map_err(TransferError::TokenRefresh)?;
                    }
                    if !delay.is_zero() {
                        tokio::select! {
                            _ = self.cancel.cancelled() => return Err(TransferError::Cancelled),
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                }
            }
        }
    }
}

async fn open_reader(path: &Path, chunk_size: u64) -> Result<ChunkReader, TransferError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || ChunkReader::new(&path, chunk_size))
        .await
        .map_err(|e| TransferError::Join(e.to_string()))?
}

async fn read_next(mut reader: ChunkReader) -> Result<(ChunkReader, Option<Chunk>), TransferError> {
    let (reader, chunk) = tokio::task::spawn_blocking(move || {
        let chunk = reader.next_chunk();
        (reader, chunk)
    })
    .await
    .map_err(|e| TransferError::Join(e.to_string()))?;
    Ok((reader, chunk?))
}

async fn read_whole(mut reader: ChunkReader) -> Result<(ChunkReader, Vec<u8>), TransferError> {
    let (reader, data) = tokio::task::spawn_blocking(move || {
        let data = reader.read_to_end();
        (reader, data)
    })
    .await
    .map_err(|e| TransferError::Join(e.to_string()))?;
    Ok((reader, data?))
}
