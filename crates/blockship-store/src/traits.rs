use async_trait::async_trait;
use blockship_common::error::Result;
use bytes::Bytes;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: i32,
    pub etag: String,
}

// A store is scoped to one bucket; keys are bucket-relative.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(&self, key: &str, data: Bytes, content_type: &str) -> Result<String>;
    async fn create_multipart_upload(&self, key: &str, content_type: &str) -> Result<String>;
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<String>;
    // Parts must be sorted ascending by part number.
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<String>;
    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()>;
}
