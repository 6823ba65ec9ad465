mod sign;

use std::time::Duration;

use async_trait::async_trait;
use blockship_common::error::{BlockshipError, Result, SessionOp};
use blockship_common::time;
use bytes::Bytes;
use quick_xml::{de::from_str as xml_from_str, se::to_string as xml_to_string};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::traits::{CompletedPart, ObjectStore};
use sign::{RequestSigner, sha256_hex, uri_encode};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
    pub session_token: Option<String>,
}

impl Credentials {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            session_token: None,
        }
    }

    pub fn from_env() -> Result<Self> {
        let access_key = std::env::var("AWS_ACCESS_KEY_ID")
            .map_err(|_| BlockshipError::Config("AWS_ACCESS_KEY_ID is not set".to_string()))?;
        let secret_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .map_err(|_| BlockshipError::Config("AWS_SECRET_ACCESS_KEY is not set".to_string()))?;
        let session_token = std::env::var("AWS_SESSION_TOKEN")
            .ok()
            .filter(|token| !token.is_empty());
        Ok(Self {
            access_key,
            secret_key,
            session_token,
        })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub credentials: Credentials,
}

pub struct S3Store {
    client: reqwest::Client,
    endpoint: Url,
    host: String,
    bucket: String,
    region: String,
    credentials: Credentials,
}

impl S3Store {
    pub fn new(config: S3Config) -> Result<Self> {
        let endpoint = parse_endpoint(&config.endpoint)?;
        let host = host_header_value(&endpoint)?;
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|err| {
                BlockshipError::Config(format!("failed to create http client: {err}"))
            })?;

        Ok(Self {
            client,
            endpoint,
            host,
            bucket: config.bucket,
            region: config.region,
            credentials: config.credentials,
        })
    }

    // Path and query are percent-encoded here exactly once, with the AWS
    // set; the signed canonical request reuses these same bytes. Keys and
    // upload ids are opaque, so nothing about their alphabet is assumed.
    fn object_url(&self, key: &str, query: &[(&str, &str)]) -> Url {
        let mut url = self.endpoint.clone();

        let mut path = url.path().trim_end_matches('/').to_string();
        path.push('/');
        path.push_str(&uri_encode(&self.bucket));
        for segment in key.split('/') {
            if !segment.is_empty() {
                path.push('/');
                path.push_str(&uri_encode(segment));
            }
        }
        url.set_path(&path);

        if query.is_empty() {
            url.set_query(None);
        } else {
            let pairs = query
                .iter()
                .map(|(name, value)| {
                    if value.is_empty() {
                        uri_encode(name)
                    } else {
                        format!("{}={}", uri_encode(name), uri_encode(value))
                    }
                })
                .collect::<Vec<_>>();
            url.set_query(Some(&pairs.join("&")));
        }
        url
    }

    async fn send_signed(
        &self,
        method: Method,
        url: Url,
        content_type: Option<&str>,
        body: Bytes,
    ) -> std::result::Result<reqwest::Response, reqwest::Error> {
        let payload_hash = sha256_hex(&body);
        let signer = RequestSigner::new(&self.credentials, &self.region);
        let signed = signer.sign(method.as_str(), &url, &self.host, &payload_hash, time::now());

        debug!(method = %method, url = %url, "sending signed request");

        let mut request = self
            .client
            .request(method, url)
            .header("Host", &self.host)
            .header("x-amz-date", signed.amz_date)
            .header("x-amz-content-sha256", signed.content_sha256)
            .header("Authorization", signed.authorization)
            .body(body);

        if let Some(content_type) = content_type
            && !content_type.is_empty()
        {
            request = request.header(reqwest::header::CONTENT_TYPE, content_type);
        }
        if let Some(token) = signed.security_token.as_deref()
            && !token.is_empty()
        {
            request = request.header("x-amz-security-token", token);
        }

        request.send().await
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put_object(&self, key: &str, data: Bytes, content_type: &str) -> Result<String> {
        let url = self.object_url(key, &[]);
        let response = self
            .send_signed(Method::PUT, url, Some(content_type), data)
            .await
            .map_err(|err| transient(key, err))?;

        if !response.status().is_success() {
            return Err(BlockshipError::TransientBackend {
                key: key.to_string(),
                reason: error_reason(response).await,
            });
        }
        Ok(header_etag(&response))
    }

    async fn create_multipart_upload(&self, key: &str, content_type: &str) -> Result<String> {
        let url = self.object_url(key, &[("uploads", "")]);

        let response = self
            .send_signed(Method::POST, url, Some(content_type), Bytes::new())
            .await
            .map_err(|err| session(SessionOp::Open, key, err.to_string()))?;

        if !response.status().is_success() {
            let reason = error_reason(response).await;
            return Err(session(SessionOp::Open, key, reason));
        }

        let body = response
            .text()
            .await
            .map_err(|err| session(SessionOp::Open, key, err.to_string()))?;
        let result: InitiateMultipartUploadResultXml = xml_from_str(&body).map_err(|err| {
            session(SessionOp::Open, key, format!("invalid initiate response: {err}"))
        })?;
        Ok(result.upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<String> {
        let part = part_number.to_string();
        let url = self.object_url(key, &[("partNumber", &part), ("uploadId", upload_id)]);

        let response = self
            .send_signed(Method::PUT, url, None, data)
            .await
            .map_err(|err| transient(key, err))?;

        if !response.status().is_success() {
            return Err(BlockshipError::TransientBackend {
                key: key.to_string(),
                reason: error_reason(response).await,
            });
        }
        Ok(header_etag(&response))
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<String> {
        let url = self.object_url(key, &[("uploadId", upload_id)]);

        let payload = CompleteMultipartUploadXml {
            parts: parts
                .iter()
                .map(|part| CompletePartXml {
                    part_number: part.part_number,
                    etag: quoted_etag(&part.etag),
                })
                .collect(),
        };
        let xml = xml_to_string(&payload).map_err(|err| {
            session(
                SessionOp::Complete,
                key,
                format!("failed to serialize complete request: {err}"),
            )
        })?;
        let body = format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{xml}");

        let response = self
            .send_signed(Method::POST, url, Some("application/xml"), Bytes::from(body))
            .await
            .map_err(|err| session(SessionOp::Complete, key, err.to_string()))?;

        if !response.status().is_success() {
            let reason = error_reason(response).await;
            return Err(session(SessionOp::Complete, key, reason));
        }

        let text = response
            .text()
            .await
            .map_err(|err| session(SessionOp::Complete, key, err.to_string()))?;
        let result: CompleteMultipartUploadResultXml = xml_from_str(&text).map_err(|err| {
            session(
                SessionOp::Complete,
                key,
                format!("invalid complete response: {err}"),
            )
        })?;
        Ok(result.etag.trim_matches('"').to_string())
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()> {
        let url = self.object_url(key, &[("uploadId", upload_id)]);

        let response = self
            .send_signed(Method::DELETE, url, None, Bytes::new())
            .await
            .map_err(|err| session(SessionOp::Abort, key, err.to_string()))?;

        if !response.status().is_success() {
            let reason = error_reason(response).await;
            return Err(session(SessionOp::Abort, key, reason));
        }
        Ok(())
    }
}

fn transient(key: &str, err: reqwest::Error) -> BlockshipError {
    BlockshipError::TransientBackend {
        key: key.to_string(),
        reason: err.to_string(),
    }
}

fn session(op: SessionOp, key: &str, reason: String) -> BlockshipError {
    BlockshipError::Session {
        op,
        key: key.to_string(),
        reason,
    }
}

fn header_etag(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(reqwest::header::ETAG)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim_matches('"').to_string())
        .unwrap_or_default()
}

async fn error_reason(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match xml_from_str::<ErrorResponseXml>(&body) {
        Ok(err) if !err.code.is_empty() => format!("{status}: {}: {}", err.code, err.message),
        _ => status.to_string(),
    }
}

fn quoted_etag(etag: &str) -> String {
    if etag.starts_with('"') && etag.ends_with('"') {
        etag.to_string()
    } else {
        format!("\"{etag}\"")
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Url> {
    let endpoint = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("https://{endpoint}")
    };
    Url::parse(&endpoint)
        .map_err(|err| BlockshipError::Config(format!("invalid endpoint: {err}")))
}

fn host_header_value(url: &Url) -> Result<String> {
    let host = url
        .host_str()
        .ok_or_else(|| BlockshipError::Config("endpoint has no host".to_string()))?;

    let value = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    Ok(value)
}

#[derive(Debug, Deserialize)]
#[serde(rename = "InitiateMultipartUploadResult")]
struct InitiateMultipartUploadResultXml {
    #[serde(rename = "UploadId")]
    upload_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename = "CompleteMultipartUpload")]
struct CompleteMultipartUploadXml {
    #[serde(rename = "Part")]
    parts: Vec<CompletePartXml>,
}

#[derive(Debug, Serialize)]
struct CompletePartXml {
    #[serde(rename = "PartNumber")]
    part_number: i32,
    #[serde(rename = "ETag")]
    etag: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename = "CompleteMultipartUploadResult")]
struct CompleteMultipartUploadResultXml {
    #[serde(rename = "ETag", default)]
    etag: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename = "Error")]
struct ErrorResponseXml {
    #[serde(rename = "Code", default)]
    code: String,
    #[serde(rename = "Message", default)]
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store(endpoint: &str) -> S3Store {
        S3Store::new(S3Config {
            endpoint: endpoint.to_string(),
            region: "us-west-2".to_string(),
            bucket: "tsdb-blocks".to_string(),
            credentials: Credentials::new("AKIDEXAMPLE", "secret"),
        })
        .unwrap()
    }

    #[test]
    fn object_urls_are_path_style() {
        let store = test_store("https://s3.us-west-2.amazonaws.com");
        let url = store.object_url("T1/01ARZ3NDEKTSV4RRFFQ69G5FAV/chunks/000001", &[]);
        assert_eq!(
            url.as_str(),
            "https://s3.us-west-2.amazonaws.com/tsdb-blocks/T1/01ARZ3NDEKTSV4RRFFQ69G5FAV/chunks/000001"
        );
    }

    #[test]
    fn opaque_upload_ids_are_encoded_once() {
        let store = test_store("https://s3.us-west-2.amazonaws.com");

        let url = store.object_url("T1/index", &[("partNumber", "2"), ("uploadId", "abc~def")]);
        assert_eq!(url.query(), Some("partNumber=2&uploadId=abc~def"));

        let url = store.object_url("T1/index", &[("uploadId", "2~leGDq+u0/fJG=8OW")]);
        assert_eq!(url.query(), Some("uploadId=2~leGDq%2Bu0%2FfJG%3D8OW"));
    }

    #[test]
    fn the_wire_bytes_are_what_gets_signed() {
        let store = test_store("https://s3.us-west-2.amazonaws.com");
        let url = store.object_url(
            "T1/block dir/a+b",
            &[("partNumber", "2"), ("uploadId", "abc~def")],
        );

        assert_eq!(url.path(), "/tsdb-blocks/T1/block%20dir/a%2Bb");
        assert_eq!(sign::canonical_uri(url.path()), url.path());
        assert_eq!(
            sign::canonical_query_string(url.query().unwrap()),
            "partNumber=2&uploadId=abc~def"
        );
    }

    #[test]
    fn bare_endpoints_default_to_https() {
        let store = test_store("s3.us-west-2.amazonaws.com");
        assert_eq!(store.endpoint.scheme(), "https");
        assert_eq!(store.host, "s3.us-west-2.amazonaws.com");
    }

    #[test]
    fn host_header_keeps_nonstandard_port() {
        let store = test_store("http://localhost:9000");
        assert_eq!(store.host, "localhost:9000");
    }

    #[test]
    fn complete_payload_serializes_quoted_parts() {
        let payload = CompleteMultipartUploadXml {
            parts: vec![
                CompletePartXml {
                    part_number: 1,
                    etag: quoted_etag("abc"),
                },
                CompletePartXml {
                    part_number: 2,
                    etag: quoted_etag("\"def\""),
                },
            ],
        };
        let xml = xml_to_string(&payload).unwrap();
        assert_eq!(
            xml,
            "<CompleteMultipartUpload>\
             <Part><PartNumber>1</PartNumber><ETag>\"abc\"</ETag></Part>\
             <Part><PartNumber>2</PartNumber><ETag>\"def\"</ETag></Part>\
             </CompleteMultipartUpload>"
        );
    }

    #[test]
    fn initiate_response_parses_upload_id() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<InitiateMultipartUploadResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Bucket>tsdb-blocks</Bucket>
  <Key>T1/block/index</Key>
  <UploadId>VXBsb2FkSWQ</UploadId>
</InitiateMultipartUploadResult>"#;
        let result: InitiateMultipartUploadResultXml = xml_from_str(body).unwrap();
        assert_eq!(result.upload_id, "VXBsb2FkSWQ");
    }

    #[test]
    fn error_bodies_parse_code_and_message() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<Error><Code>NoSuchUpload</Code><Message>The specified upload does not exist</Message></Error>"#;
        let err: ErrorResponseXml = xml_from_str(body).unwrap();
        assert_eq!(err.code, "NoSuchUpload");
        assert_eq!(err.message, "The specified upload does not exist");
    }
}
