//! Bucket and object storage endpoints.

use bucketmgr_protocol::{
    Bucket, BucketObject, BucketsPage, ObjectsPage, Region, validate_bucket_key,
};
use bucketmgr_transfer::{BoxFuture, ChunkUpload, ObjectTransfer, TransferFailure};
use reqwest::header::{CONTENT_RANGE, CONTENT_TYPE};
use serde::Serialize;
use tracing::{debug, info};

use crate::client::{ApsClient, encode_segment, ensure_success, read_json};
use crate::ApsError;

/// Listing page size.
const PAGE_LIMIT: &str = "100";

/// Retention policy for new buckets.
pub const DEFAULT_BUCKET_POLICY: &str = "transient";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateBucket<'a> {
    bucket_key: &'a str,
    policy_key: &'a str,
}

/// Appends a random suffix so the key is globally unique.
///
/// The name is lowercased first; keys only allow `[-_.a-z0-9]`.
pub fn bucket_key_with_guid(name: &str) -> String {
    format!("{}.{}", name.trim().to_ascii_lowercase(), uuid::Uuid::new_v4())
}

impl ApsClient {
    /// Lists every bucket in `region`, following pages until one is empty.
    pub async fn list_buckets(&self, region: Region, token: &str) -> Result<Vec<Bucket>, ApsError> {
        let mut buckets: Vec<Bucket> = Vec::new();
        let mut start_at: Option<String> = None;

        loop {
            let mut query = vec![("region", region.as_str().to_string()), ("limit", PAGE_LIMIT.into())];
            if let Some(key) = &start_at {
                query.push(("startAt", key.clone()));
            }
            let resp = self
                .http()
                .get(self.url("/oss/v2/buckets"))
                .bearer_auth(token)
                .query(&query)
                .send()
                .await?;
            let page: BucketsPage = read_json(resp).await?;

            let Some(last) = page.items.last() else {
                break;
            };
            // A server that ignores startAt would repeat the same page.
            if start_at.as_deref() == Some(last.bucket_key.as_str()) {
                break;
            }
            start_at = Some(last.bucket_key.clone());
            debug!(count = page.items.len(), "bucket page");
            buckets.extend(page.items);
            if page.next.is_none() {
                break;
            }
        }

        info!(region = %region, count = buckets.len(), "listed buckets");
        Ok(buckets)
    }

    /// Creates a bucket after checking the key locally.
    pub async fn create_bucket(
        &self,
        bucket_key: &str,
        policy: &str,
        region: Region,
        token: &str,
    ) -> Result<Bucket, ApsError> {
        validate_bucket_key(bucket_key)?;

        let resp = self
            .http()
            .post(self.url("/oss/v2/buckets"))
            .bearer_auth(token)
            .header("x-ads-region", region.as_str())
            .json(&CreateBucket {
                bucket_key,
                policy_key: policy,
            })
            .send()
            .await?;
        let bucket: Bucket = read_json(resp).await?;

        info!(bucket = %bucket.bucket_key, policy, "created bucket");
        Ok(bucket)
    }

    /// Lists every object in a bucket.
    pub async fn list_objects(&self, bucket: &str, token: &str) -> Result<Vec<BucketObject>, ApsError> {
        let url = self.url(&format!("/oss/v2/buckets/{}/objects", encode_segment(bucket)));
        let mut objects: Vec<BucketObject> = Vec::new();
        let mut start_at: Option<String> = None;

        loop {
            let mut query = vec![("limit", PAGE_LIMIT.to_string())];
            if let Some(key) = &start_at {
                query.push(("startAt", key.clone()));
            }
            let resp = self
                .http()
                .get(&url)
                .bearer_auth(token)
                .query(&query)
                .send()
                .await?;
            let page: ObjectsPage = read_json(resp).await?;

            let Some(last) = page.items.last() else {
                break;
            };
            if start_at.as_deref() == Some(last.object_key.as_str()) {
                break;
            }
            start_at = Some(last.object_key.clone());
            objects.extend(page.items);
            if page.next.is_none() {
                break;
            }
        }

        debug!(bucket, count = objects.len(), "listed objects");
        Ok(objects)
    }

    pub async fn delete_object(&self, bucket: &str, object: &str, token: &str) -> Result<(), ApsError> {
        let resp = self
            .http()
            .delete(self.object_url(bucket, object))
            .bearer_auth(token)
            .send()
            .await?;
        ensure_success(resp).await?;
        info!(bucket, object, "deleted object");
        Ok(())
    }

    /// Uploads a whole object in one PUT.
    pub async fn put_object(
        &self,
        bucket: &str,
        object: &str,
        data: &[u8],
        token: &str,
    ) -> Result<(), ApsError> {
        let resp = self
            .http()
            .put(self.object_url(bucket, object))
            .bearer_auth(token)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(data.to_vec())
            .send()
            .await?;
        ensure_success(resp).await?;
        Ok(())
    }

    /// Uploads one range of a resumable session.
    pub async fn put_chunk(&self, chunk: &ChunkUpload<'_>, token: &str) -> Result<(), ApsError> {
        let url = format!("{}/resumable", self.object_url(chunk.bucket, chunk.object));
        let resp = self
            .http()
            .put(url)
            .bearer_auth(token)
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_RANGE, chunk.content_range())
            .header("Session-Id", chunk.session_id)
            .body(chunk.data.to_vec())
            .send()
            .await?;
        ensure_success(resp).await?;
        debug!(range = %chunk.range, "chunk accepted");
        Ok(())
    }

    fn object_url(&self, bucket: &str, object: &str) -> String {
        self.url(&format!(
            "/oss/v2/buckets/{}/objects/{}",
            encode_segment(bucket),
            encode_segment(object)
        ))
    }
}

impl ObjectTransfer for ApsClient {
    fn upload_object<'a>(
        &'a self,
        bucket: &'a str,
        object: &'a str,
        data: &'a [u8],
        token: &'a str,
    ) -> BoxFuture<'a, Result<(), TransferFailure>> {
        Box::pin(async move {
            self.put_object(bucket, object, data, token)
                .await
                .map_err(TransferFailure::from)
        })
    }

    fn upload_chunk<'a>(
        &'a self,
        chunk: ChunkUpload<'a>,
        token: &'a str,
    ) -> BoxFuture<'a, Result<(), TransferFailure>> {
        Box::pin(async move {
            self.put_chunk(&chunk, token)
                .await
                .map_err(TransferFailure::from)
        })
    }
}
