pub mod memory;
pub mod s3;
pub mod traits;

pub use memory::MemoryStore;
pub use s3::{Credentials, S3Config, S3Store};
pub use traits::{CompletedPart, ObjectStore};
