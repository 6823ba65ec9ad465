pub mod content_type;
pub mod error;
pub mod time;

pub use error::{BlockshipError, Result, SessionOp};
