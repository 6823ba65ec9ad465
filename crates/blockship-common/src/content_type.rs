pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

const SNIFF_LEN: usize = 512;

pub fn detect(data: &[u8]) -> &'static str {
    if data.starts_with(b"\x1f\x8b\x08") {
        return "application/x-gzip";
    }
    if data.starts_with(b"PK\x03\x04") {
        return "application/zip";
    }
    if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        return "image/png";
    }
    if data.starts_with(b"\xff\xd8\xff") {
        return "image/jpeg";
    }
    if data.starts_with(b"%PDF-") {
        return "application/pdf";
    }
    if looks_textual(data) {
        return "text/plain; charset=utf-8";
    }
    DEFAULT_CONTENT_TYPE
}

fn looks_textual(data: &[u8]) -> bool {
    let head = &data[..data.len().min(SNIFF_LEN)];
    !head
        .iter()
        .any(|b| matches!(b, 0x00..=0x08 | 0x0b | 0x0e..=0x1a | 0x1c..=0x1f))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_gzip_magic() {
        assert_eq!(detect(b"\x1f\x8b\x08\x00rest"), "application/x-gzip");
    }

    #[test]
    fn json_metadata_is_text() {
        assert_eq!(
            detect(br#"{"ulid":"01ARZ3NDEKTSV4RRFFQ69G5FAV"}"#),
            "text/plain; charset=utf-8"
        );
    }

    #[test]
    fn empty_payload_is_text() {
        assert_eq!(detect(b""), "text/plain; charset=utf-8");
    }

    #[test]
    fn binary_payload_is_octet_stream() {
        assert_eq!(detect(&[0x00, 0x01, 0x02, 0x85]), DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn only_leading_bytes_decide() {
        let mut data = vec![b'a'; SNIFF_LEN];
        data.push(0x00);
        assert_eq!(detect(&data), "text/plain; charset=utf-8");
    }
}
