use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use blockship_blocks::{BlockId, block_files, list_blocks};
use blockship_common::error::BlockshipError;
use blockship_store::s3::{Credentials, S3Config, S3Store};
use blockship_store::traits::ObjectStore;
use blockship_uploader::uploader::{BlockUploader, UploaderConfig};
use clap::Parser;
use tokio::task::JoinSet;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "blockship", about = "Uploads locally generated TSDB blocks to object storage")]
struct Cli {
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    #[arg(long)]
    tenant: String,

    #[arg(long)]
    bucket: String,

    #[arg(long, default_value = "us-west-2")]
    region: String,

    // S3-compatible endpoint. Defaults to AWS in the given region.
    #[arg(long)]
    endpoint: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = EnvFilter::from_default_env().add_directive("blockship=info".parse()?);
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    let endpoint = cli
        .endpoint
        .clone()
        .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", cli.region));

    let credentials =
        Credentials::from_env().context("reading credentials from the environment")?;
    let store: Arc<dyn ObjectStore> = Arc::new(S3Store::new(S3Config {
        endpoint,
        region: cli.region.clone(),
        bucket: cli.bucket.clone(),
        credentials,
    })?);
    let uploader = Arc::new(BlockUploader::new(store, UploaderConfig::new(&cli.tenant)));

    let blocks = list_blocks(&cli.data_dir)
        .await
        .with_context(|| format!("scanning {}", cli.data_dir.display()))?;
    info!(
        bucket = %cli.bucket,
        tenant = %cli.tenant,
        blocks = blocks.len(),
        "starting block upload"
    );

    for block in &blocks {
        upload_block(&cli.data_dir, block, &uploader).await?;
    }

    info!(blocks = blocks.len(), "all blocks uploaded");
    Ok(())
}

// One task per file; the first failure is returned after the remaining
// uploads have run to their end.
async fn upload_block(
    data_dir: &Path,
    block: &BlockId,
    uploader: &Arc<BlockUploader>,
) -> anyhow::Result<()> {
    let files = block_files(&data_dir.join(block.to_string())).await?;
    info!(block = %block, files = files.len(), "uploading block");

    let mut tasks: JoinSet<Result<(), BlockshipError>> = JoinSet::new();
    for file in files {
        let uploader = Arc::clone(uploader);
        let data_dir = data_dir.to_path_buf();
        tasks.spawn(async move {
            let target = uploader.upload_file(&data_dir, &file).await?;
            info!(key = %target.object_key, size = target.size_bytes, "uploaded file");
            Ok(())
        });
    }

    let mut first_error: Option<anyhow::Error> = None;
    while let Some(joined) = tasks.join_next().await {
        let result = match joined {
            Ok(result) => result,
            Err(join_err) => {
                if first_error.is_none() {
                    first_error = Some(join_err.into());
                }
                continue;
            }
        };
        if let Err(err) = result
            && first_error.is_none()
        {
            first_error = Some(err.into());
        }
    }

    match first_error {
        Some(err) => Err(err.context(format!("uploading block {block}"))),
        None => Ok(()),
    }
}
