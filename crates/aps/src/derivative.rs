//! Model-derivative endpoints: translation jobs, manifests, signed cookies.

use bucketmgr_derivatives::{DerivativeError, DerivativeService};
use bucketmgr_protocol::{DerivativeDownload, JobHandle, Manifest, OutputFormat, Region, TranslationJob};
use bucketmgr_transfer::BoxFuture;
use reqwest::StatusCode;
use reqwest::header::SET_COOKIE;
use serde_json::json;
use tracing::{debug, info};

use crate::client::{ApsClient, encode_segment, ensure_success, read_json};
use crate::ApsError;

/// Views requested for every output format.
const VIEWS: [&str; 2] = ["2d", "3d"];

fn job_body(job: &TranslationJob) -> serde_json::Value {
    let formats: Vec<_> = job
        .formats
        .iter()
        .map(|format: &OutputFormat| json!({ "type": format.as_str(), "views": VIEWS }))
        .collect();
    json!({
        "input": { "urn": job.urn },
        "output": {
            "destination": { "region": job.region.as_str().to_ascii_lowercase() },
            "formats": formats,
        }
    })
}

impl ApsClient {
    /// Submits a translation job. Does not force re-translation of an
    /// already translated source.
    pub async fn start_job(&self, job: &TranslationJob, token: &str) -> Result<JobHandle, ApsError> {
        let resp = self
            .http()
            .post(self.derivative_url(job.region, "/job"))
            .bearer_auth(token)
            .header("x-ads-force", "false")
            .json(&job_body(job))
            .send()
            .await?;
        let handle: JobHandle = read_json(resp).await?;

        info!(urn = %handle.urn, result = %handle.result, "translation job submitted");
        Ok(handle)
    }

    /// Fetches the manifest of `urn`; `None` while the server has none.
    pub async fn manifest(&self, urn: &str, region: Region, token: &str) -> Result<Option<Manifest>, ApsError> {
        let url = self.derivative_url(region, &format!("/{}/manifest", encode_segment(urn)));
        let resp = self.http().get(url).bearer_auth(token).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            debug!(urn, "manifest not found");
            return Ok(None);
        }
        let manifest: Manifest = read_json(resp).await?;
        debug!(urn, status = %manifest.status, progress = %manifest.progress, "manifest");
        Ok(Some(manifest))
    }

    /// Fetches the signed download URL and cookies of one derivative.
    pub async fn signed_download(
        &self,
        derivative_urn: &str,
        urn: &str,
        region: Region,
        token: &str,
    ) -> Result<DerivativeDownload, ApsError> {
        let url = self.derivative_url(
            region,
            &format!(
                "/{}/manifest/{}/signedcookies",
                encode_segment(urn),
                encode_segment(derivative_urn)
            ),
        );
        let resp = self.http().get(url).bearer_auth(token).send().await?;
        let resp = ensure_success(resp).await?;

        let cookies: Vec<String> = resp
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect();
        let body = resp.bytes().await?;
        let mut download: DerivativeDownload = serde_json::from_slice(&body)?;
        download.cookies = cookies;
        Ok(download)
    }
}

impl DerivativeService for ApsClient {
    fn get_manifest<'a>(
        &'a self,
        urn: &'a str,
        region: Region,
        token: &'a str,
    ) -> BoxFuture<'a, Result<Option<Manifest>, DerivativeError>> {
        Box::pin(async move {
            self.manifest(urn, region, token)
                .await
                .map_err(DerivativeError::from)
        })
    }

    fn get_download_url<'a>(
        &'a self,
        derivative_urn: &'a str,
        urn: &'a str,
        region: Region,
        token: &'a str,
    ) -> BoxFuture<'a, Result<DerivativeDownload, DerivativeError>> {
        Box::pin(async move {
            self.signed_download(derivative_urn, urn, region, token)
                .await
                .map_err(DerivativeError::from)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_http::{MockServer, Reply};
    use bucketmgr_protocol::ErrorClass;

    fn client(server: &MockServer) -> ApsClient {
        ApsClient::new().unwrap().with_base_url(&server.url)
    }

    #[tokio::test]
    async fn start_job_posts_formats_and_region() {
        let server =
            MockServer::start(vec![Reply::json(200, r#"{"result":"created","urn":"dXJu"}"#)]).await;

        let job = TranslationJob {
            urn: "dXJu".into(),
            formats: vec![OutputFormat::Svf2],
            region: Region::Emea,
        };
        let handle = client(&server).start_job(&job, "tok").await.unwrap();
        assert_eq!(handle.result, "created");

        let req = &server.requests()[0];
        assert_eq!(req.target, "/modelderivative/v2/regions/eu/designdata/job");
        assert_eq!(req.header("x-ads-force"), Some("false"));
        let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
        assert_eq!(body["input"]["urn"], "dXJu");
        assert_eq!(body["output"]["destination"]["region"], "emea");
        assert_eq!(body["output"]["formats"][0]["type"], "svf2");
        assert_eq!(body["output"]["formats"][0]["views"], json!(["2d", "3d"]));
    }

    #[tokio::test]
    async fn missing_manifest_is_none() {
        let server = MockServer::start(vec![Reply::json(404, r#"{"diagnostic":"not found"}"#)]).await;
        let manifest = client(&server)
            .get_manifest("dXJu", Region::Us, "tok")
            .await
            .unwrap();
        assert!(manifest.is_none());
        assert_eq!(
            server.requests()[0].target,
            "/modelderivative/v2/designdata/dXJu/manifest"
        );
    }

    #[tokio::test]
    async fn garbled_manifest_is_malformed() {
        let server = MockServer::start(vec![Reply::json(200, "{not json")]).await;
        let err = client(&server)
            .get_manifest("dXJu", Region::Us, "tok")
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::MalformedManifest);
    }

    #[tokio::test]
    async fn signed_cookies_are_collected() {
        let server = MockServer::start(vec![
            Reply::json(
                200,
                r#"{"etag":"e","size":3,"url":"https://cdn.example.com/dXJu/output/0.pf","content-type":"application/octet-stream","expiration":1}"#,
            )
            .header("Set-Cookie", "CloudFront-Policy=p; Path=/; Secure")
            .header("Set-Cookie", "CloudFront-Key-Pair-Id=k; Path=/"),
        ])
        .await;

        let download = client(&server)
            .get_download_url("urn:adsk.viewing:fs.file:dXJu/output/0.pf", "dXJu", Region::Us, "tok")
            .await
            .unwrap();

        assert_eq!(download.url, "https://cdn.example.com/dXJu/output/0.pf");
        assert_eq!(download.cookies.len(), 2);
        assert_eq!(
            server.requests()[0].target,
            "/modelderivative/v2/designdata/dXJu/manifest/urn%3Aadsk.viewing%3Afs.file%3AdXJu%2Foutput%2F0.pf/signedcookies"
        );
    }

    #[tokio::test]
    async fn expired_token_keeps_class_through_service() {
        let server = MockServer::start(vec![Reply::json(401, "{}")]).await;
        let err = client(&server)
            .get_download_url("urn:x/a.bin", "dXJu", Region::Us, "tok")
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::AuthExpired);
    }
}
