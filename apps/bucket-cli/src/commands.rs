//! CLI parser and command implementations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use bucketmgr_aps::{
    ApsClient, ApsError, ClientCredentialsSource, Credentials, DEFAULT_BUCKET_POLICY, DownloadEvent,
    bucket_key_with_guid, download_resources,
};
use bucketmgr_derivatives::{JobPoller, ManifestResolver, PollOutcome, PollUpdate};
use bucketmgr_protocol::{OutputFormat, Region, TranslationJob, urn_for_object_id};
use bucketmgr_transfer::{ChunkedUploader, UploadProgress};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;

#[derive(Parser)]
#[command(name = "bucketmgr")]
#[command(about = "Manage storage buckets, translate models and download derivatives")]
#[command(version)]
pub struct Cli {
    /// Config file path (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Region override (US or EMEA)
    #[arg(short, long, global = true)]
    pub region: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List buckets in the region
    Buckets,

    /// Create a bucket
    CreateBucket {
        /// Bucket name
        name: String,
        /// Append a random suffix to make the key unique
        #[arg(long)]
        guid: bool,
        /// Retention policy: transient, temporary or persistent
        #[arg(long, default_value = DEFAULT_BUCKET_POLICY)]
        policy: String,
    },

    /// List objects in a bucket
    Objects {
        bucket: String,
    },

    /// Upload a file, in chunks if it is large
    Upload {
        bucket: String,
        file: PathBuf,
        /// Object key (defaults to the file name)
        #[arg(long)]
        object_key: Option<String>,
    },

    /// Delete an object
    Delete {
        bucket: String,
        object: String,
    },

    /// Request a translation and wait for it to finish
    Translate {
        bucket: String,
        object: String,
        /// Output format: svf or svf2
        #[arg(long, default_value = "svf2")]
        format: String,
        /// Submit the job and return immediately
        #[arg(long)]
        no_wait: bool,
    },

    /// Download the translated derivatives of an object
    Download {
        bucket: String,
        object: String,
        /// Destination directory
        dest: PathBuf,
        /// Remove the destination directory first
        #[arg(long)]
        clean: bool,
    },

    /// Print a fresh access token and its lifetime
    Token,
}

/// Long-lived collaborators shared by every command.
struct App {
    client: Arc<ApsClient>,
    tokens: Arc<ClientCredentialsSource>,
    config: Config,
    region: Region,
    cancel: CancellationToken,
}

impl App {
    async fn token(&self) -> anyhow::Result<String> {
        Ok(self.tokens.token().await?.value)
    }
}

/// Runs the parsed command to completion.
pub async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    let credentials = config
        .credentials(Credentials::from_env())
        .ok_or(ApsError::MissingCredentials(
            "set client_id/client_secret in the config file or APS_CLIENT_ID/APS_CLIENT_SECRET",
        ))?;
    let region = cli
        .region
        .as_deref()
        .map_or_else(|| config.region(), Region::parse);

    let client = Arc::new(ApsClient::new()?.with_base_url(config.base_url.clone()));
    let tokens = Arc::new(ClientCredentialsSource::new(Arc::clone(&client), credentials));

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping");
            on_interrupt.cancel();
        }
    });

    let ctx = App {
        client,
        tokens,
        config,
        region,
        cancel,
    };

    match cli.command {
        Commands::Buckets => list_buckets(&ctx).await,
        Commands::CreateBucket { name, guid, policy } => create_bucket(&ctx, &name, guid, &policy).await,
        Commands::Objects { bucket } => list_objects(&ctx, &bucket).await,
        Commands::Upload {
            bucket,
            file,
            object_key,
        } => upload(&ctx, &bucket, &file, object_key).await,
        Commands::Delete { bucket, object } => {
            let token = ctx.token().await?;
            ctx.client.delete_object(&bucket, &object, &token).await?;
            println!("deleted {bucket}/{object}");
            Ok(())
        }
        Commands::Translate {
            bucket,
            object,
            format,
            no_wait,
        } => translate(&ctx, &bucket, &object, &format, no_wait).await,
        Commands::Download {
            bucket,
            object,
            dest,
            clean,
        } => download(&ctx, &bucket, &object, &dest, clean).await,
        Commands::Token => {
            let token = ctx.tokens.refresh_token().await?;
            println!("{}", token.value);
            eprintln!("expires in {}s", token.seconds_left());
            Ok(())
        }
    }
}

async fn list_buckets(ctx: &App) -> anyhow::Result<()> {
    let token = ctx.token().await?;
    for bucket in ctx.client.list_buckets(ctx.region, &token).await? {
        println!("{}\t{}", bucket.bucket_key, bucket.policy_key);
    }
    Ok(())
}

async fn create_bucket(ctx: &App, name: &str, guid: bool, policy: &str) -> anyhow::Result<()> {
    let key = if guid {
        bucket_key_with_guid(name)
    } else {
        name.to_string()
    };
    let token = ctx.token().await?;
    let bucket = ctx.client.create_bucket(&key, policy, ctx.region, &token).await?;
    println!("{}", bucket.bucket_key);
    Ok(())
}

async fn list_objects(ctx: &App, bucket: &str) -> anyhow::Result<()> {
    let token = ctx.token().await?;
    for object in ctx.client.list_objects(bucket, &token).await? {
        println!(
            "{}\t{}\t{}",
            object.object_key,
            object.size,
            urn_for_object_id(&object.object_id)
        );
    }
    Ok(())
}

async fn upload(
    ctx: &App,
    bucket: &str,
    file: &Path,
    object_key: Option<String>,
) -> anyhow::Result<()> {
    let object = match object_key {
        Some(key) => key,
        None => file
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .with_context(|| format!("cannot derive an object key from {}", file.display()))?,
    };

    let token = ctx.token().await?;
    let uploader = ChunkedUploader::new(ctx.client.clone(), ctx.config.upload_policy())
        .with_token_source(ctx.tokens.clone())
        .with_cancel(ctx.cancel.clone());

    let report = uploader
        .upload(bucket, &object, file, &token, |progress| match progress {
            UploadProgress::Indeterminate => info!(object = %object, "upload started"),
            UploadProgress::Percent(pct) => info!(object = %object, pct, "upload progress"),
        })
        .await?;

    println!(
        "uploaded {bucket}/{object} ({} bytes, {} request(s))",
        report.bytes, report.chunks
    );
    Ok(())
}

/// Base64 URN of `bucket/object`, the identifier translation jobs use.
fn object_urn(bucket: &str, object: &str) -> String {
    urn_for_object_id(&format!("urn:adsk.objects:os.object:{bucket}/{object}"))
}

async fn translate(
    ctx: &App,
    bucket: &str,
    object: &str,
    format: &str,
    no_wait: bool,
) -> anyhow::Result<()> {
    let job = TranslationJob {
        urn: object_urn(bucket, object),
        formats: vec![OutputFormat::parse(format)],
        region: ctx.region,
    };
    let token = ctx.token().await?;
    let handle = ctx.client.start_job(&job, &token).await?;
    println!("{}\t{}", handle.urn, handle.result);
    if no_wait {
        return Ok(());
    }

    let poller = JobPoller::new(ctx.client.clone(), ctx.config.poll_config())
        .with_token_source(ctx.tokens.clone())
        .with_cancel(ctx.cancel.clone());
    let outcome = poller
        .poll(&job.urn, ctx.region, &token, |update| {
            if let PollUpdate::Progress(pct) = update {
                info!(pct = *pct, "translation progress");
            }
        })
        .await?;

    match outcome {
        PollOutcome::Completed(state) => {
            println!("translation complete after {}s", state.elapsed.as_secs());
        }
        PollOutcome::Cancelled => println!("stopped waiting; the job keeps running"),
    }
    Ok(())
}

async fn download(
    ctx: &App,
    bucket: &str,
    object: &str,
    dest: &Path,
    clean: bool,
) -> anyhow::Result<()> {
    let urn = object_urn(bucket, object);
    let token = ctx.token().await?;

    let resolver = ManifestResolver::new(ctx.client.clone())
        .with_token_source(ctx.tokens.clone())
        .with_retry_policy(ctx.config.upload_policy());
    let resources = resolver.resolve_downloads(&urn, &token, ctx.region).await?;
    if resources.is_empty() {
        bail!("no derivatives to download yet for {bucket}/{object}");
    }

    if clean && dest.exists() {
        tokio::fs::remove_dir_all(dest)
            .await
            .with_context(|| format!("failed to clean {}", dest.display()))?;
    }
    tokio::fs::create_dir_all(dest).await?;

    let (events_tx, mut events_rx) = mpsc::channel(64);
    let printer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match event {
                DownloadEvent::Started { total } => info!(total, "downloading"),
                DownloadEvent::FileCompleted {
                    index, total, path, ..
                } => println!("[{}/{total}] {path}", index + 1),
                DownloadEvent::FileFailed {
                    index,
                    total,
                    path,
                    error,
                } => eprintln!("[{}/{total}] {path} failed: {error}", index + 1),
                DownloadEvent::Finished { .. } => break,
            }
        }
    });

    let result = download_resources(&ctx.client, &resources, dest, &events_tx, &ctx.cancel).await;
    drop(events_tx);
    let _ = printer.await;

    let summary = result?;
    if summary.cancelled {
        println!("download cancelled after {} file(s)", summary.completed);
    } else {
        println!("downloaded {} file(s), {} bytes", summary.completed, summary.bytes);
    }
    Ok(())
}
