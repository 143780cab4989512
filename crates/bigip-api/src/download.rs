// Artifact download
//
// Streams a package from its public download URL to a local file. No
// device token is involved; the URL usually points at a release host, so
// callers pass a client from `TransportConfig::build_download_client`.

use std::path::Path;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use url::Url;

use crate::client::{parse_body, stringify};
use crate::error::Error;

/// Download `url` into `dest`, replacing any existing file.
///
/// Returns the number of bytes written. Fails with `HttpStatus` when the
/// server answers above 300.
pub async fn download_to_file(http: &reqwest::Client, url: &Url, dest: &Path) -> Result<u64, Error> {
    debug!(%url, dest = %dest.display(), "downloading artifact");

    let resp = http.get(url.clone()).send().await?;
    let status = resp.status().as_u16();
    if status > 300 {
        let body = resp.text().await.unwrap_or_default();
        return Err(Error::HttpStatus {
            status,
            body: stringify(&parse_body(body)),
        });
    }

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut file = tokio::fs::File::create(dest).await?;
    let mut stream = resp.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    debug!(bytes = written, "download complete");
    Ok(written)
}
