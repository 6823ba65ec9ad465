use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use blockship_common::content_type;
use blockship_common::error::{BlockshipError, Result};
use blockship_store::traits::ObjectStore;
use bytes::Bytes;
use tracing::info;

use crate::multipart::upload_multipart;

pub const DEFAULT_MAX_PART_SIZE: u64 = 100 * 1024 * 1024;
pub const DEFAULT_MULTIPART_THRESHOLD: u64 = 100 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct UploaderConfig {
    pub tenant: String,
    pub max_part_size: u64,
    // Files strictly larger than this go through multipart upload.
    pub multipart_threshold: u64,
}

impl UploaderConfig {
    pub fn new(tenant: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            max_part_size: DEFAULT_MAX_PART_SIZE,
            multipart_threshold: DEFAULT_MULTIPART_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadTarget {
    pub local_path: PathBuf,
    pub object_key: String,
    pub size_bytes: u64,
}

pub struct BlockUploader {
    store: Arc<dyn ObjectStore>,
    config: UploaderConfig,
}

impl BlockUploader {
    pub fn new(store: Arc<dyn ObjectStore>, config: UploaderConfig) -> Self {
        Self { store, config }
    }

    pub async fn upload_file(&self, data_dir: &Path, path: &Path) -> Result<UploadTarget> {
        let data = Bytes::from(tokio::fs::read(path).await?);
        let target = self.resolve_target(data_dir, path, data.len() as u64)?;
        let content_type = content_type::detect(&data);

        if target.size_bytes > self.config.multipart_threshold {
            upload_multipart(
                &self.store,
                &target.object_key,
                data,
                content_type,
                self.config.max_part_size,
            )
            .await?;
        } else {
            info!(
                key = %target.object_key,
                size = target.size_bytes,
                "uploading object with single put"
            );
            self.store
                .put_object(&target.object_key, data, content_type)
                .await?;
        }
        Ok(target)
    }

    // Maps a file under data_dir to <tenant>/<relative path>, with `/`
    // separators regardless of platform.
    pub fn resolve_target(
        &self,
        data_dir: &Path,
        path: &Path,
        size_bytes: u64,
    ) -> Result<UploadTarget> {
        let relative = path.strip_prefix(data_dir).map_err(|_| {
            BlockshipError::InvalidPath(format!(
                "{} is not under data directory {}",
                path.display(),
                data_dir.display()
            ))
        })?;
        if relative.as_os_str().is_empty() {
            return Err(BlockshipError::InvalidPath(format!(
                "{} is the data directory itself",
                path.display()
            )));
        }

        let mut object_key = self.config.tenant.clone();
        for component in relative.components() {
            let Component::Normal(part) = component else {
                return Err(BlockshipError::InvalidPath(format!(
                    "unexpected component in {}",
                    relative.display()
                )));
            };
            let part = part.to_str().ok_or_else(|| {
                BlockshipError::InvalidPath(format!(
                    "non-utf8 path component in {}",
                    relative.display()
                ))
            })?;
            object_key.push('/');
            object_key.push_str(part);
        }

        Ok(UploadTarget {
            local_path: path.to_path_buf(),
            object_key,
            size_bytes,
        })
    }
}
