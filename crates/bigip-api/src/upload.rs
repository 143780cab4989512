// Chunked file upload
//
// `POST /mgmt/shared/file-transfer/uploads/{name}` accepts one byte range per
// request, described by `Content-Range: {start}-{end}/{total}`. Chunks are
// sent strictly in order; the device appends them to
// `/var/config/rest/downloads/{name}`.

use std::fmt;
use std::io::SeekFrom;
use std::path::Path;

use bytes::Bytes;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, HeaderValue};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

use crate::client::{ApiRequest, ManagementClient};
use crate::error::Error;

/// Upload endpoint prefix.
pub const UPLOAD_PATH: &str = "/mgmt/shared/file-transfer/uploads";

/// Bytes sent per upload request.
pub const UPLOAD_CHUNK_SIZE: u64 = 1024 * 1024;

/// Inclusive byte window `[start, end]` of a file of `total` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

impl ChunkRange {
    /// Number of bytes in the window.
    pub fn size(&self) -> u64 {
        self.end - self.start + 1
    }
}

impl fmt::Display for ChunkRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}/{}", self.start, self.end, self.total)
    }
}

/// Split `total` bytes into consecutive windows of at most `chunk_size`.
///
/// An empty file yields no windows.
pub fn chunk_ranges(total: u64, chunk_size: u64) -> Vec<ChunkRange> {
    let chunk_size = chunk_size.max(1);
    let mut ranges = Vec::new();
    let mut start = 0;
    while start < total {
        let end = start.saturating_add(chunk_size - 1).min(total - 1);
        ranges.push(ChunkRange { start, end, total });
        start = end + 1;
    }
    ranges
}

impl ManagementClient {
    /// Upload a local file in [`UPLOAD_CHUNK_SIZE`] chunks.
    ///
    /// Returns the remote file name the device stored the upload under.
    /// An empty file is rejected with an `InvalidInput` I/O error.
    pub async fn upload_file(&self, path: &Path) -> Result<String, Error> {
        self.upload_file_chunked(path, UPLOAD_CHUNK_SIZE).await
    }

    /// Upload a local file using a custom chunk size.
    pub async fn upload_file_chunked(&self, path: &Path, chunk_size: u64) -> Result<String, Error> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| invalid_input(format!("upload path has no file name: {}", path.display())))?;

        let mut file = tokio::fs::File::open(path).await?;
        let total = file.metadata().await?.len();
        let ranges = chunk_ranges(total, chunk_size);
        if ranges.is_empty() {
            return Err(invalid_input(format!("refusing to upload empty file {file_name}")));
        }

        let upload_path = format!("{UPLOAD_PATH}/{file_name}");
        debug!(file = %file_name, total, chunks = ranges.len(), "uploading file");

        for range in ranges {
            let len = usize::try_from(range.size()).map_err(|_| {
                invalid_input(format!("chunk of {} bytes does not fit in memory", range.size()))
            })?;
            let mut buf = vec![0u8; len];
            file.seek(SeekFrom::Start(range.start)).await?;
            file.read_exact(&mut buf).await?;

            let content_range = HeaderValue::from_str(&range.to_string())
                .map_err(|e| invalid_input(format!("invalid Content-Range header: {e}")))?;

            let req = ApiRequest::post()
                .header(
                    CONTENT_TYPE,
                    HeaderValue::from_static("application/octet-stream"),
                )
                .header(CONTENT_RANGE, content_range)
                .header(CONTENT_LENGTH, HeaderValue::from(range.size()))
                .bytes(Bytes::from(buf));

            debug!(range = %range, "uploading chunk");
            self.request(&upload_path, req).await?;
        }

        Ok(file_name)
    }
}

fn invalid_input(message: String) -> Error {
    Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, message))
}
