use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlockshipError {
    #[error("transient backend error for {key}: {reason}")]
    TransientBackend { key: String, reason: String },
    #[error("multipart {op} failed for {key}: {reason}")]
    Session {
        op: SessionOp,
        key: String,
        reason: String,
    },
    #[error("no such multipart upload: {0}")]
    NoSuchUpload(String),
    #[error("parts out of order for {key}: part {part} submitted after part {prev}")]
    PartOrder { key: String, part: i32, prev: i32 },
    #[error("invalid part for {key}: {reason}")]
    InvalidPart { key: String, reason: String },
    #[error("invalid block id: {0}")]
    InvalidBlockId(String),
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BlockshipError {
    // Only per-request backend failures are worth retrying; session
    // failures and local errors are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientBackend { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOp {
    Open,
    Complete,
    Abort,
}

impl std::fmt::Display for SessionOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Complete => write!(f, "complete"),
            Self::Abort => write!(f, "abort"),
        }
    }
}

pub type Result<T> = std::result::Result<T, BlockshipError>;
