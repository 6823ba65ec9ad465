use std::collections::HashMap;

use async_trait::async_trait;
use blockship_common::error::{BlockshipError, Result};
use bytes::Bytes;
use md5::{Digest, Md5};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::traits::{CompletedPart, ObjectStore};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: String,
}

#[derive(Debug, Clone)]
struct StoredPart {
    data: Bytes,
    etag: String,
    digest: [u8; 16],
}

#[derive(Debug)]
struct PendingUpload {
    key: String,
    content_type: String,
    parts: HashMap<i32, StoredPart>,
}

// Validates multipart requests the way S3 does, including the
// ascending part-number order required on complete.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, StoredObject>>,
    uploads: Mutex<HashMap<String, PendingUpload>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn object(&self, key: &str) -> Option<Bytes> {
        self.objects
            .lock()
            .await
            .get(key)
            .map(|object| object.data.clone())
    }

    pub async fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .lock()
            .await
            .get(key)
            .map(|object| object.content_type.clone())
    }

    // Sessions that were opened but neither completed nor aborted.
    pub async fn open_uploads(&self) -> usize {
        self.uploads.lock().await.len()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put_object(&self, key: &str, data: Bytes, content_type: &str) -> Result<String> {
        let etag = hex::encode(Md5::digest(&data));
        self.objects.lock().await.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(etag)
    }

    async fn create_multipart_upload(&self, key: &str, content_type: &str) -> Result<String> {
        let upload_id = Uuid::new_v4().to_string();
        self.uploads.lock().await.insert(
            upload_id.clone(),
            PendingUpload {
                key: key.to_string(),
                content_type: content_type.to_string(),
                parts: HashMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<String> {
        if part_number < 1 {
            return Err(BlockshipError::InvalidPart {
                key: key.to_string(),
                reason: format!("part number {part_number} is not positive"),
            });
        }

        let mut uploads = self.uploads.lock().await;
        let upload = uploads
            .get_mut(upload_id)
            .filter(|upload| upload.key == key)
            .ok_or_else(|| BlockshipError::NoSuchUpload(upload_id.to_string()))?;

        let digest: [u8; 16] = Md5::digest(&data).into();
        let etag = hex::encode(digest);
        upload.parts.insert(
            part_number,
            StoredPart {
                data,
                etag: etag.clone(),
                digest,
            },
        );
        Ok(etag)
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<String> {
        let mut uploads = self.uploads.lock().await;
        let upload = uploads
            .get(upload_id)
            .filter(|upload| upload.key == key)
            .ok_or_else(|| BlockshipError::NoSuchUpload(upload_id.to_string()))?;

        if parts.is_empty() {
            return Err(BlockshipError::InvalidPart {
                key: key.to_string(),
                reason: "no parts submitted".to_string(),
            });
        }

        let mut previous: Option<i32> = None;
        for part in &parts {
            if let Some(previous) = previous
                && part.part_number <= previous
            {
                return Err(BlockshipError::PartOrder {
                    key: key.to_string(),
                    part: part.part_number,
                    prev: previous,
                });
            }
            previous = Some(part.part_number);

            let stored = upload.parts.get(&part.part_number).ok_or_else(|| {
                BlockshipError::InvalidPart {
                    key: key.to_string(),
                    reason: format!("part {} was never uploaded", part.part_number),
                }
            })?;
            if stored.etag != part.etag.trim_matches('"') {
                return Err(BlockshipError::InvalidPart {
                    key: key.to_string(),
                    reason: format!("etag mismatch for part {}", part.part_number),
                });
            }
        }

        let mut data = Vec::new();
        let mut digests = Vec::new();
        for part in &parts {
            if let Some(stored) = upload.parts.get(&part.part_number) {
                data.extend_from_slice(&stored.data);
                digests.extend_from_slice(&stored.digest);
            }
        }
        let etag = format!("{}-{}", hex::encode(Md5::digest(&digests)), parts.len());
        let content_type = upload.content_type.clone();

        uploads.remove(upload_id);
        drop(uploads);

        self.objects.lock().await.insert(
            key.to_string(),
            StoredObject {
                data: Bytes::from(data),
                content_type,
            },
        );
        Ok(etag)
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()> {
        let mut uploads = self.uploads.lock().await;
        uploads
            .get(upload_id)
            .filter(|upload| upload.key == key)
            .ok_or_else(|| BlockshipError::NoSuchUpload(upload_id.to_string()))?;
        uploads.remove(upload_id);
        Ok(())
    }
}
