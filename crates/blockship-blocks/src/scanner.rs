use std::path::{Path, PathBuf};

use blockship_common::error::Result;
use tokio::fs;
use tracing::debug;

use crate::types::BlockId;

// Entries that do not parse as ULIDs (wal, lock files) are skipped.
pub async fn list_blocks(data_dir: &Path) -> Result<Vec<BlockId>> {
    let mut entries = fs::read_dir(data_dir).await?;
    let mut blocks = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();

        let Ok(block) = BlockId::parse(&name) else {
            debug!(entry = %name, "skipping non-block entry");
            continue;
        };
        if entry.file_type().await?.is_dir() {
            blocks.push(block);
        }
    }

    blocks.sort();
    Ok(blocks)
}

pub async fn block_files(block_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut pending = vec![block_dir.to_path_buf()];
    let mut files = Vec::new();

    while let Some(dir) = pending.pop() {
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }
    }

    files.sort();
    Ok(files)
}
