pub mod scanner;
pub mod types;

pub use scanner::{block_files, list_blocks};
pub use types::BlockId;
