use std::fmt;
use std::str::FromStr;

use blockship_common::error::{BlockshipError, Result};
use ulid::Ulid;

// ULIDs order lexicographically by creation time, so sorted block ids
// give chronological upload order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(Ulid);

impl BlockId {
    pub fn parse(s: &str) -> Result<Self> {
        Ulid::from_string(s)
            .map(Self)
            .map_err(|err| BlockshipError::InvalidBlockId(format!("{s}: {err}")))
    }
}

impl FromStr for BlockId {
    type Err = BlockshipError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_prints_ulids() {
        let id = BlockId::parse("01ARZ3NDEKTSV4RRFFQ69G5FAV").unwrap();
        assert_eq!(id.to_string(), "01ARZ3NDEKTSV4RRFFQ69G5FAV");
        assert_eq!(
            "01ARZ3NDEKTSV4RRFFQ69G5FAV".parse::<BlockId>().unwrap(),
            id
        );
    }

    #[test]
    fn rejects_non_ulid_names() {
        assert!(BlockId::parse("wal").is_err());
        assert!(BlockId::parse("").is_err());
        assert!(BlockId::parse("01ARZ3NDEKTSV4RRFFQ69G5FA!").is_err());
    }

    #[test]
    fn ordering_follows_creation_time() {
        let older = BlockId::parse("01ARZ3NDEKTSV4RRFFQ69G5FAV").unwrap();
        let newer = BlockId::parse("01BX5ZZKBKACTAV9WEVGEMMVRZ").unwrap();
        assert!(older < newer);
    }
}
