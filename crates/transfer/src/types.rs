use std::fmt;

/// A contiguous, non-empty byte range of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    /// Offset of the first byte.
    pub start: u64,
    /// Number of bytes.
    pub len: u64,
}

impl ByteRange {
    pub fn new(start: u64, len: u64) -> Self {
        Self { start, len }
    }

    /// Offset of the last byte (inclusive).
    pub fn end(&self) -> u64 {
        self.start + self.len.saturating_sub(1)
    }

    /// Offset one past the last byte.
    pub fn end_exclusive(&self) -> u64 {
        self.start + self.len
    }

    /// `Content-Range` header value: `bytes start-end/total`.
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end(), total)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bytes {}-{}", self.start, self.end())
    }
}

/// A chunk of file data read for upload.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub range: ByteRange,
    pub data: Vec<u8>,
}

/// One resumable upload of a single file.
///
/// Lives for the duration of one upload call and is discarded afterwards;
/// nothing is persisted for resumption across restarts.
#[derive(Debug, Clone)]
pub struct UploadSession {
    id: String,
    total_bytes: u64,
    acknowledged: Vec<ByteRange>,
}

impl UploadSession {
    /// Creates a session with a fresh random identifier.
    pub fn new(total_bytes: u64) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), total_bytes)
    }

    pub fn with_id(id: String, total_bytes: u64) -> Self {
        Self {
            id,
            total_bytes,
            acknowledged: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Records a range the server acknowledged.
    pub fn acknowledge(&mut self, range: ByteRange) {
        self.acknowledged.push(range);
    }

    /// Ranges acknowledged so far, in upload order.
    pub fn acknowledged(&self) -> &[ByteRange] {
        &self.acknowledged
    }

    pub fn acknowledged_bytes(&self) -> u64 {
        self.acknowledged.iter().map(|r| r.len).sum()
    }

    /// Acknowledged share of the file as a whole percentage (0-100).
    pub fn percent(&self) -> u8 {
        if self.total_bytes == 0 {
            return 100;
        }
        let pct = self.acknowledged_bytes().saturating_mul(100) / self.total_bytes;
        pct.min(100) as u8
    }
}

/// Progress reported while uploading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadProgress {
    /// Nothing acknowledged yet.
    Indeterminate,
    /// Share of the file acknowledged so far.
    Percent(u8),
}

/// Summary of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    /// Session identifier; `None` for single-shot uploads.
    pub session_id: Option<String>,
    pub bytes: u64,
    /// Number of upload calls that succeeded (1 for single-shot).
    pub chunks: usize,
    /// Total calls made, including retries.
    pub attempts: u32,
}
