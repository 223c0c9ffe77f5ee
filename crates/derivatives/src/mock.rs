//! Scripted [`DerivativeService`] shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use bucketmgr_protocol::{DerivativeDownload, Manifest, ManifestNode, Region};
use bucketmgr_transfer::{BoxFuture, TokenSource, TransferFailure};

use crate::{DerivativeError, DerivativeService};

type ManifestReply = Result<Option<Manifest>, DerivativeError>;

/// Replays manifest replies in order, repeating the last one once the
/// script runs out.
pub struct ScriptedService {
    manifests: Mutex<VecDeque<ManifestReply>>,
    last: Mutex<Option<ManifestReply>>,
    manifest_calls: AtomicUsize,
    manifest_tokens: Mutex<Vec<String>>,
    download_failures: Mutex<HashMap<String, VecDeque<DerivativeError>>>,
    download_calls: Mutex<Vec<(String, String)>>,
    download_tokens: Mutex<Vec<String>>,
}

impl ScriptedService {
    pub fn with_manifests(replies: Vec<ManifestReply>) -> Self {
        Self {
            manifests: Mutex::new(replies.into()),
            last: Mutex::new(None),
            manifest_calls: AtomicUsize::new(0),
            manifest_tokens: Mutex::new(Vec::new()),
            download_failures: Mutex::new(HashMap::new()),
            download_calls: Mutex::new(Vec::new()),
            download_tokens: Mutex::new(Vec::new()),
        }
    }

    /// Fails the next `times` download-URL requests for `derivative_urn`.
    pub fn fail_download(self, derivative_urn: &str, err: DerivativeError, times: usize) -> Self {
        self.download_failures
            .lock()
            .unwrap()
            .insert(derivative_urn.to_string(), vec![err; times].into());
        self
    }

    pub fn manifest_calls(&self) -> usize {
        self.manifest_calls.load(Ordering::SeqCst)
    }

    /// Bearer token sent with each manifest request.
    pub fn manifest_tokens(&self) -> Vec<String> {
        self.manifest_tokens.lock().unwrap().clone()
    }

    /// `(derivative urn, job urn)` per download-URL request.
    pub fn download_calls(&self) -> Vec<(String, String)> {
        self.download_calls.lock().unwrap().clone()
    }

    pub fn download_tokens(&self) -> Vec<String> {
        self.download_tokens.lock().unwrap().clone()
    }

    fn next_manifest(&self, token: &str) -> ManifestReply {
        self.manifest_calls.fetch_add(1, Ordering::SeqCst);
        self.manifest_tokens.lock().unwrap().push(token.to_string());
        let next = self.manifests.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        if let Some(reply) = next {
            *last = Some(reply);
        }
        last.clone().unwrap_or(Ok(None))
    }
}

impl DerivativeService for ScriptedService {
    fn get_manifest<'a>(
        &'a self,
        _urn: &'a str,
        _region: Region,
        token: &'a str,
    ) -> BoxFuture<'a, Result<Option<Manifest>, DerivativeError>> {
        Box::pin(async move { self.next_manifest(token) })
    }

    fn get_download_url<'a>(
        &'a self,
        derivative_urn: &'a str,
        urn: &'a str,
        _region: Region,
        token: &'a str,
    ) -> BoxFuture<'a, Result<DerivativeDownload, DerivativeError>> {
        Box::pin(async move {
            self.download_calls
                .lock()
                .unwrap()
                .push((derivative_urn.to_string(), urn.to_string()));
            self.download_tokens.lock().unwrap().push(token.to_string());
            let failure = self
                .download_failures
                .lock()
                .unwrap()
                .get_mut(derivative_urn)
                .and_then(VecDeque::pop_front);
            if let Some(err) = failure {
                return Err(err);
            }
            let name = derivative_urn.rsplit('/').next().unwrap_or_default();
            Ok(DerivativeDownload {
                url: format!("https://cdn.example.com/dl/{name}?Policy=abc"),
                content_type: "application/octet-stream".into(),
                size: None,
                cookies: vec!["CloudFront-Policy=p; Path=/".into()],
            })
        })
    }
}

/// Hands out `fresh-1`, `fresh-2`, ... on each refresh.
#[derive(Default)]
pub struct CountingTokens {
    refreshed: AtomicUsize,
}

impl CountingTokens {
    pub fn refreshed(&self) -> usize {
        self.refreshed.load(Ordering::SeqCst)
    }
}

impl TokenSource for CountingTokens {
    fn refresh(&self) -> BoxFuture<'_, Result<String, TransferFailure>> {
        Box::pin(async move {
            let n = self.refreshed.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("fresh-{n}"))
        })
    }
}

/// Manifest whose progress text is `progress`, still in flight.
pub fn progress_manifest(progress: &str) -> Manifest {
    Manifest {
        urn: "dXJu".into(),
        status: "inprogress".into(),
        progress: progress.into(),
        region: "US".into(),
        derivatives: None,
    }
}

pub fn leaf(urn: &str) -> ManifestNode {
    ManifestNode {
        urn: Some(urn.into()),
        ..Default::default()
    }
}

pub fn node(children: Vec<ManifestNode>) -> ManifestNode {
    ManifestNode {
        children,
        ..Default::default()
    }
}
