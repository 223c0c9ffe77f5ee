//! Flattens a derivative manifest into downloadable resources.

use std::sync::Arc;

use bucketmgr_protocol::{DerivativeDownload, Manifest, ManifestNode, Region, Resource};
use bucketmgr_transfer::{BoxFuture, TokenSource, UploadPolicy};
use tracing::{debug, info};

use crate::DerivativeError;
use crate::decompose::decompose_urn;
use crate::retry::Recovery;

/// Remote model-derivative service consulted by the poller and resolver.
pub trait DerivativeService: Send + Sync {
    /// Fetches the manifest of `urn`; `None` if the server has none yet.
    fn get_manifest<'a>(
        &'a self,
        urn: &'a str,
        region: Region,
        token: &'a str,
    ) -> BoxFuture<'a, Result<Option<Manifest>, DerivativeError>>;

    /// Fetches the signed download location of one derivative of `urn`.
    fn get_download_url<'a>(
        &'a self,
        derivative_urn: &'a str,
        urn: &'a str,
        region: Region,
        token: &'a str,
    ) -> BoxFuture<'a, Result<DerivativeDownload, DerivativeError>>;
}

/// Nodes carrying a downloadable URN, in depth-first pre-order.
///
/// Top-level derivatives are traversed but never returned themselves.
/// Uses an explicit stack, so nesting depth is bounded only by memory.
pub fn downloadable_nodes(derivatives: &[ManifestNode]) -> Vec<&ManifestNode> {
    let mut stack: Vec<&ManifestNode> = derivatives
        .iter()
        .rev()
        .flat_map(|derivative| derivative.children.iter().rev())
        .collect();
    let mut found = Vec::new();

    while let Some(node) = stack.pop() {
        if node.downloadable_urn().is_some() {
            found.push(node);
        }
        stack.extend(node.children.iter().rev());
    }
    found
}

/// Resolves translation output into [`Resource`]s.
pub struct ManifestResolver {
    service: Arc<dyn DerivativeService>,
    tokens: Option<Arc<dyn TokenSource>>,
    retry: UploadPolicy,
}

impl ManifestResolver {
    pub fn new(service: Arc<dyn DerivativeService>) -> Self {
        Self {
            service,
            tokens: None,
            retry: UploadPolicy::default(),
        }
    }

    /// Sets the source consulted when a request fails with an expired token.
    pub fn with_token_source(mut self, tokens: Arc<dyn TokenSource>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Replaces the per-request retry limits; only the retry fields apply.
    pub fn with_retry_policy(mut self, retry: UploadPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Fetches the manifest of `urn` and resolves one [`Resource`] per
    /// downloadable node.
    ///
    /// An absent manifest or derivative list yields an empty list. Each
    /// request is retried within the retry policy; a download-URL fetch
    /// that still fails aborts the whole resolution.
    pub async fn resolve_downloads(
        &self,
        urn: &str,
        token: &str,
        region: Region,
    ) -> Result<Vec<Resource>, DerivativeError> {
        let mut token = token.to_string();

        let mut recovery = Recovery::new(&self.retry, self.tokens.as_ref(), "manifest");
        let fetched = loop {
            match self.service.get_manifest(urn, region, &token).await {
                Ok(manifest) => break manifest,
                Err(e) => recovery.recover(e, &mut token).await?,
            }
        };
        let Some(manifest) = fetched else {
            debug!(urn, "no manifest yet");
            return Ok(Vec::new());
        };
        let Some(derivatives) = manifest.derivatives.as_deref() else {
            debug!(urn, "manifest has no derivatives");
            return Ok(Vec::new());
        };

        let job_urn = if manifest.urn.is_empty() {
            urn
        } else {
            manifest.urn.as_str()
        };

        let nodes = downloadable_nodes(derivatives);
        let mut resources = Vec::with_capacity(nodes.len());

        for node in nodes {
            let Some(node_urn) = node.downloadable_urn() else {
                continue;
            };
            let mut info = decompose_urn(node_urn)?;
            let download = self
                .download_url(node_urn, job_urn, region, &mut token)
                .await?;
            info.resolve(&download.url)?;

            let file_name = info.file_name.clone().unwrap_or_default();
            let local_path = info.relative_file_path().unwrap_or_default();
            debug!(urn = %node_urn, path = %local_path, "resolved derivative");

            resources.push(Resource {
                file_name,
                content_type: download.content_type,
                remote_path: download.url,
                cookies: download.cookies,
                local_path,
            });
        }

        info!(urn = %job_urn, resources = resources.len(), "resolved manifest");
        Ok(resources)
    }

    async fn download_url(
        &self,
        node_urn: &str,
        job_urn: &str,
        region: Region,
        token: &mut String,
    ) -> Result<DerivativeDownload, DerivativeError> {
        let mut recovery = Recovery::new(&self.retry, self.tokens.as_ref(), node_urn);
        loop {
            match self
                .service
                .get_download_url(node_urn, job_urn, region, token)
                .await
            {
                Ok(download) => return Ok(download),
                Err(e) => recovery.recover(e, token).await?,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{CountingTokens, ScriptedService, leaf, node};
    use bucketmgr_protocol::ErrorClass;
    use std::time::Duration;

    fn manifest(urn: &str, derivatives: Vec<ManifestNode>) -> Manifest {
        Manifest {
            urn: urn.into(),
            status: "success".into(),
            progress: "complete".into(),
            region: "US".into(),
            derivatives: Some(derivatives),
        }
    }

    fn sample_tree() -> Vec<ManifestNode> {
        vec![
            // Top-level URN is never emitted.
            ManifestNode {
                urn: Some("urn:x/output/top.svf".into()),
                children: vec![
                    node(vec![
                        leaf("urn:x/output/Resource/3D/model.svf"),
                        node(vec![node(vec![leaf("urn:x/output/Resource/3D/0.pf")])]),
                    ]),
                    ManifestNode {
                        urn: Some("urn:x/output/Resource/thumb.png".into()),
                        children: vec![leaf("urn:x/output/Resource/thumb/small.png")],
                        ..Default::default()
                    },
                ],
                ..Default::default()
            },
            node(vec![leaf("urn:x/output/Resource/2D/sheet.pdf")]),
        ]
    }

    #[test]
    fn downloadable_nodes_are_preorder() {
        let tree = sample_tree();
        let urns: Vec<_> = downloadable_nodes(&tree)
            .into_iter()
            .filter_map(|n| n.downloadable_urn())
            .collect();
        assert_eq!(
            urns,
            vec![
                "urn:x/output/Resource/3D/model.svf",
                "urn:x/output/Resource/3D/0.pf",
                "urn:x/output/Resource/thumb.png",
                "urn:x/output/Resource/thumb/small.png",
                "urn:x/output/Resource/2D/sheet.pdf",
            ]
        );
    }

    #[test]
    fn deep_nesting_does_not_exhaust_the_stack() {
        let mut current = leaf("urn:x/output/deep/f.bin");
        for _ in 0..2_000 {
            current = node(vec![current]);
        }
        let tree = vec![node(vec![current])];
        assert_eq!(downloadable_nodes(&tree).len(), 1);
    }

    #[tokio::test]
    async fn resolves_one_resource_per_downloadable_node() {
        let service = Arc::new(ScriptedService::with_manifests(vec![Ok(Some(manifest(
            "canonical",
            sample_tree(),
        )))]));
        let resolver = ManifestResolver::new(service.clone());

        let resources = resolver
            .resolve_downloads("caller-urn", "tok", Region::Us)
            .await
            .unwrap();

        assert_eq!(resources.len(), 5);
        assert_eq!(resources[0].local_path, "Resource/3D/model.svf");
        assert_eq!(resources[0].file_name, "model.svf");
        assert_eq!(resources[1].local_path, "Resource/3D/0.pf");
        assert_eq!(resources[3].local_path, "Resource/thumb/small.png");
        assert_eq!(resources[4].local_path, "Resource/2D/sheet.pdf");
        assert_eq!(resources[0].content_type, "application/octet-stream");
        assert_eq!(resources[0].cookies, vec!["CloudFront-Policy=p; Path=/"]);

        // Download URLs are requested against the manifest's own URN.
        let calls = service.download_calls();
        assert_eq!(calls.len(), 5);
        assert!(calls.iter().all(|(_, job)| job == "canonical"));
    }

    #[tokio::test]
    async fn absent_manifest_is_empty() {
        let service = Arc::new(ScriptedService::with_manifests(vec![Ok(None)]));
        let resolver = ManifestResolver::new(service);
        assert!(
            resolver
                .resolve_downloads("u", "t", Region::Us)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn manifest_without_derivatives_is_empty() {
        let mut m = manifest("u", Vec::new());
        m.derivatives = None;
        let service = Arc::new(ScriptedService::with_manifests(vec![Ok(Some(m))]));
        let resolver = ManifestResolver::new(service.clone());

        let resources = resolver.resolve_downloads("u", "t", Region::Emea).await.unwrap();
        assert!(resources.is_empty());
        assert!(service.download_calls().is_empty());
    }

    fn quick_retry() -> UploadPolicy {
        UploadPolicy {
            max_retries: 2,
            max_token_retries: 2,
            retry_delay: Duration::from_millis(10),
            ..UploadPolicy::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_url_fetch_aborts_resolution() {
        let service = Arc::new(
            ScriptedService::with_manifests(vec![Ok(Some(manifest("c", sample_tree())))])
                .fail_download(
                    "urn:x/output/Resource/3D/0.pf",
                    DerivativeError::service(ErrorClass::TransientNetworkFailure, "502"),
                    10,
                ),
        );
        let resolver = ManifestResolver::new(service.clone()).with_retry_policy(quick_retry());

        let err = resolver
            .resolve_downloads("c", "t", Region::Us)
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::TransientNetworkFailure);

        // One initial request plus two retries, then nothing after the failure.
        let calls = service.download_calls();
        let failing: Vec<_> = calls
            .iter()
            .filter(|(urn, _)| urn == "urn:x/output/Resource/3D/0.pf")
            .collect();
        assert_eq!(failing.len(), 3);
        assert_eq!(calls.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_url_failure_is_retried() {
        let service = Arc::new(
            ScriptedService::with_manifests(vec![Ok(Some(manifest("c", sample_tree())))])
                .fail_download(
                    "urn:x/output/Resource/3D/model.svf",
                    DerivativeError::service(ErrorClass::TransientNetworkFailure, "503"),
                    1,
                ),
        );
        let resolver = ManifestResolver::new(service.clone()).with_retry_policy(quick_retry());

        let resources = resolver
            .resolve_downloads("c", "t", Region::Us)
            .await
            .unwrap();

        assert_eq!(resources.len(), 5);
        assert_eq!(resources[0].local_path, "Resource/3D/model.svf");
        assert_eq!(service.download_calls().len(), 6);
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_for_later_requests() {
        let service = Arc::new(
            ScriptedService::with_manifests(vec![Ok(Some(manifest("c", sample_tree())))])
                .fail_download(
                    "urn:x/output/Resource/3D/0.pf",
                    DerivativeError::service(ErrorClass::AuthExpired, "401"),
                    1,
                ),
        );
        let tokens = Arc::new(CountingTokens::default());
        let resolver = ManifestResolver::new(service.clone())
            .with_retry_policy(quick_retry())
            .with_token_source(tokens.clone());

        let resources = resolver
            .resolve_downloads("c", "tok", Region::Us)
            .await
            .unwrap();

        assert_eq!(resources.len(), 5);
        assert_eq!(tokens.refreshed(), 1);
        assert_eq!(
            service.download_tokens(),
            vec!["tok", "tok", "fresh-1", "fresh-1", "fresh-1", "fresh-1"]
        );
    }

    #[tokio::test]
    async fn expired_token_without_source_is_fatal_to_resolution() {
        let service = Arc::new(ScriptedService::with_manifests(vec![Err(
            DerivativeError::service(ErrorClass::AuthExpired, "401"),
        )]));
        let resolver = ManifestResolver::new(service.clone()).with_retry_policy(quick_retry());

        let err = resolver
            .resolve_downloads("c", "tok", Region::Us)
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::AuthExpired);
        assert_eq!(service.manifest_calls(), 1);
    }

    #[tokio::test]
    async fn malformed_node_urn_aborts_resolution() {
        let tree = vec![node(vec![leaf("no-separator-here")])];
        let service = Arc::new(ScriptedService::with_manifests(vec![Ok(Some(manifest(
            "c", tree,
        )))]));
        let resolver = ManifestResolver::new(service);

        let err = resolver
            .resolve_downloads("c", "t", Region::Us)
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::MalformedManifest);
    }
}
