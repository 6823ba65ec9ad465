#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartSpan {
    pub number: i32,
    pub offset: u64,
    pub len: u64,
}

// Spans cover [0, size_bytes) exactly; part numbers start at 1 and only
// the final span may be shorter than max_part_size.
pub fn split_parts(size_bytes: u64, max_part_size: u64) -> Vec<PartSpan> {
    assert!(max_part_size > 0, "max_part_size must be positive");

    let mut spans = Vec::with_capacity(size_bytes.div_ceil(max_part_size) as usize);
    let mut offset = 0;
    let mut number = 1;
    while offset < size_bytes {
        let len = max_part_size.min(size_bytes - offset);
        spans.push(PartSpan {
            number,
            offset,
            len,
        });
        offset += len;
        number += 1;
    }
    spans
}
