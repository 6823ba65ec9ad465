use blockship_common::time::{format_amz_date, format_amz_short_date};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use sha2::{Digest, Sha256};
use url::Url;

use super::Credentials;

type HmacSha256 = Hmac<Sha256>;

// Everything except the unreserved characters A-Za-z0-9 - . _ ~.
const AWS_URI_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'!')
    .add(b'"')
    .add(b'#')
    .add(b'$')
    .add(b'%')
    .add(b'&')
    .add(b'\'')
    .add(b'(')
    .add(b')')
    .add(b'*')
    .add(b'+')
    .add(b',')
    .add(b'/')
    .add(b':')
    .add(b';')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'?')
    .add(b'@')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}')
    .add(b'\x7f');

pub(crate) struct SignedRequest {
    pub amz_date: String,
    pub content_sha256: String,
    pub authorization: String,
    pub security_token: Option<String>,
}

pub(crate) struct RequestSigner<'a> {
    credentials: &'a Credentials,
    region: &'a str,
}

impl<'a> RequestSigner<'a> {
    pub(crate) fn new(credentials: &'a Credentials, region: &'a str) -> Self {
        Self {
            credentials,
            region,
        }
    }

    pub(crate) fn sign(
        &self,
        method: &str,
        url: &Url,
        host: &str,
        payload_hash: &str,
        now: DateTime<Utc>,
    ) -> SignedRequest {
        let amz_date = format_amz_date(&now);
        let short_date = format_amz_short_date(&now);

        let mut header_pairs = vec![
            ("host".to_string(), host.to_string()),
            ("x-amz-content-sha256".to_string(), payload_hash.to_string()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        if let Some(token) = self.credentials.session_token.as_deref()
            && !token.is_empty()
        {
            header_pairs.push(("x-amz-security-token".to_string(), token.to_string()));
        }
        header_pairs.sort_by(|left, right| left.0.cmp(&right.0));

        let canonical_headers = header_pairs
            .iter()
            .map(|(name, value)| format!("{name}:{value}\n"))
            .collect::<String>();
        let signed_headers = header_pairs
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(";");

        let canonical_query = url.query().map(canonical_query_string).unwrap_or_default();
        let canonical_request = canonical_request(
            method,
            &canonical_uri(url.path()),
            &canonical_query,
            &canonical_headers,
            &signed_headers,
            payload_hash,
        );

        let scope = format!("{short_date}/{}/s3/aws4_request", self.region);
        let string_to_sign = string_to_sign(&canonical_request, &amz_date, &scope);
        let signing_key = signing_key(&self.credentials.secret_key, &short_date, self.region);
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.credentials.access_key, scope, signed_headers, signature
        );

        SignedRequest {
            amz_date,
            content_sha256: payload_hash.to_string(),
            authorization,
            security_token: self.credentials.session_token.clone(),
        }
    }
}

pub(crate) fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

// Encodes one raw path segment or query name/value. The request URL must
// carry exactly these bytes, since the canonical request reuses them.
pub(crate) fn uri_encode(value: &str) -> String {
    utf8_percent_encode(value, AWS_URI_ENCODE_SET).to_string()
}

fn signing_key(secret_key: &str, date: &str, region: &str) -> Vec<u8> {
    let date_key = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date.as_bytes());
    let region_key = hmac_sha256(&date_key, region.as_bytes());
    let service_key = hmac_sha256(&region_key, b"s3");
    hmac_sha256(&service_key, b"aws4_request")
}

fn canonical_request(
    method: &str,
    uri: &str,
    query_string: &str,
    canonical_headers: &str,
    signed_headers: &str,
    payload_hash: &str,
) -> String {
    format!(
        "{method}\n{uri}\n{query_string}\n{canonical_headers}\n{signed_headers}\n{payload_hash}"
    )
}

fn string_to_sign(canonical_request: &str, date_time: &str, scope: &str) -> String {
    let canonical_hash = sha256_hex(canonical_request.as_bytes());
    format!("AWS4-HMAC-SHA256\n{date_time}\n{scope}\n{canonical_hash}")
}

// S3 signs the path exactly as sent on the wire; no re-encoding here.
pub(crate) fn canonical_uri(path: &str) -> String {
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

// Takes the wire-encoded query; pairs are sorted, never re-encoded.
pub(crate) fn canonical_query_string(query_string: &str) -> String {
    let mut params = query_string
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
        .collect::<Vec<_>>();

    params.sort_unstable();

    params
        .into_iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = match HmacSha256::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => return Vec::new(),
    };
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}
