//! Streams resolved derivative resources to disk.

use std::path::Path;

use bucketmgr_protocol::Resource;
use bucketmgr_transfer::ChunkWriter;
use reqwest::header::{CONTENT_TYPE, COOKIE};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{ApsClient, ensure_success};
use crate::ApsError;

/// Progress of a [`download_resources`] run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEvent {
    Started { total: usize },
    FileCompleted {
        index: usize,
        total: usize,
        path: String,
        bytes: u64,
    },
    FileFailed {
        index: usize,
        total: usize,
        path: String,
        error: String,
    },
    Finished {
        completed: usize,
        failed: usize,
        cancelled: bool,
    },
}

/// Outcome of a download run that was not aborted by an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    pub total: usize,
    pub completed: usize,
    pub bytes: u64,
    pub cancelled: bool,
}

/// Downloads every resource into `dest_dir`, one after another.
///
/// A failed file is reported and the rest continue; if any failed the call
/// ends with [`ApsError::DownloadIncomplete`]. Cancellation is checked
/// before each file and yields a summary with `cancelled` set.
pub async fn download_resources(
    client: &ApsClient,
    resources: &[Resource],
    dest_dir: &Path,
    events_tx: &mpsc::Sender<DownloadEvent>,
    cancel: &CancellationToken,
) -> Result<DownloadSummary, ApsError> {
    let total = resources.len();
    let mut writer = ChunkWriter::new(dest_dir);
    let mut summary = DownloadSummary {
        total,
        ..Default::default()
    };
    let mut failed = 0;

    let _ = events_tx.send(DownloadEvent::Started { total }).await;
    info!(total, dest = %dest_dir.display(), "downloading derivatives");

    for (index, resource) in resources.iter().enumerate() {
        if cancel.is_cancelled() {
            summary.cancelled = true;
            info!(completed = summary.completed, "download cancelled");
            break;
        }

        match fetch_one(client, resource, &mut writer).await {
            Ok(bytes) => {
                summary.completed += 1;
                summary.bytes += bytes;
                debug!(path = %resource.local_path, bytes, "downloaded");
                let _ = events_tx
                    .send(DownloadEvent::FileCompleted {
                        index,
                        total,
                        path: resource.local_path.clone(),
                        bytes,
                    })
                    .await;
            }
            Err(e) => {
                failed += 1;
                warn!(path = %resource.local_path, class = %e.class(), error = %e, "download failed");
                let _ = events_tx
                    .send(DownloadEvent::FileFailed {
                        index,
                        total,
                        path: resource.local_path.clone(),
                        error: e.to_string(),
                    })
                    .await;
            }
        }
    }

    let _ = events_tx
        .send(DownloadEvent::Finished {
            completed: summary.completed,
            failed,
            cancelled: summary.cancelled,
        })
        .await;

    if failed > 0 && !summary.cancelled {
        return Err(ApsError::DownloadIncomplete { failed, total });
    }
    info!(completed = summary.completed, bytes = summary.bytes, "download finished");
    Ok(summary)
}

/// GETs one resource with its signed cookies and streams the body to disk.
async fn fetch_one(
    client: &ApsClient,
    resource: &Resource,
    writer: &mut ChunkWriter,
) -> Result<u64, ApsError> {
    let mut request = client.http().get(&resource.remote_path);
    if !resource.content_type.is_empty() {
        request = request.header(CONTENT_TYPE, &resource.content_type);
    }
    let cookie = resource.cookie_header();
    if !cookie.is_empty() {
        request = request.header(COOKIE, cookie);
    }

    let mut resp = ensure_success(request.send().await?).await?;
    writer.begin(&resource.local_path).await?;

    while let Some(chunk) = resp.chunk().await? {
        writer.append(&resource.local_path, &chunk).await?;
    }
    Ok(writer.finish(&resource.local_path).await?)
}
