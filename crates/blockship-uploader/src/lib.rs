pub mod multipart;
pub mod plan;
pub mod uploader;

pub use multipart::{MAX_UPLOAD_ATTEMPTS, upload_multipart};
pub use plan::{PartSpan, split_parts};
pub use uploader::{
    BlockUploader, DEFAULT_MAX_PART_SIZE, DEFAULT_MULTIPART_THRESHOLD, UploadTarget,
    UploaderConfig,
};
