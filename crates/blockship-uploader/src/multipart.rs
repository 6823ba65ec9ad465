use std::sync::Arc;

use blockship_common::error::{BlockshipError, Result};
use blockship_store::traits::{CompletedPart, ObjectStore};
use bytes::Bytes;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::plan::{PartSpan, split_parts};

// Counts the first attempt.
pub const MAX_UPLOAD_ATTEMPTS: u32 = 3;

pub async fn upload_multipart(
    store: &Arc<dyn ObjectStore>,
    key: &str,
    data: Bytes,
    content_type: &str,
    max_part_size: u64,
) -> Result<String> {
    let upload_id = store.create_multipart_upload(key, content_type).await?;
    let spans = split_parts(data.len() as u64, max_part_size);

    info!(
        key,
        upload_id = %upload_id,
        size = data.len(),
        parts = spans.len(),
        "uploading object with multipart"
    );

    let mut tasks: JoinSet<Result<CompletedPart>> = JoinSet::new();
    for span in &spans {
        let store = Arc::clone(store);
        let key = key.to_string();
        let upload_id = upload_id.clone();
        let part = data.slice(span.offset as usize..(span.offset + span.len) as usize);
        let span = *span;
        tasks.spawn(async move {
            upload_part_with_retry(store.as_ref(), &key, &upload_id, span, part).await
        });
    }

    // All tasks run to completion; the first error wins and triggers the abort.
    let mut completed = Vec::with_capacity(spans.len());
    let mut first_error: Option<BlockshipError> = None;
    while let Some(joined) = tasks.join_next().await {
        let result = joined.unwrap_or_else(|err| {
            Err(BlockshipError::Internal(format!(
                "part upload task failed: {err}"
            )))
        });
        match result {
            Ok(part) => completed.push(part),
            Err(err) => {
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
    }

    if let Some(err) = first_error {
        warn!(key, upload_id = %upload_id, error = %err, "part upload failed, aborting session");
        if let Err(abort_err) = store.abort_multipart_upload(key, &upload_id).await {
            warn!(
                key,
                upload_id = %upload_id,
                error = %abort_err,
                "failed to abort multipart upload, orphaned parts may remain"
            );
        }
        return Err(err);
    }

    completed.sort_by_key(|part| part.part_number);
    store.complete_multipart_upload(key, &upload_id, completed).await
}

async fn upload_part_with_retry(
    store: &dyn ObjectStore,
    key: &str,
    upload_id: &str,
    span: PartSpan,
    data: Bytes,
) -> Result<CompletedPart> {
    let mut attempt = 1;
    loop {
        match store.upload_part(key, upload_id, span.number, data.clone()).await {
            Ok(etag) => {
                return Ok(CompletedPart {
                    part_number: span.number,
                    etag,
                });
            }
            Err(err) if err.is_transient() && attempt < MAX_UPLOAD_ATTEMPTS => {
                warn!(key, part = span.number, attempt, error = %err, "part upload failed, retrying");
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;

    // Fails the first `failures` upload_part calls, then succeeds.
    struct FailingParts {
        failures: u32,
        transient: bool,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ObjectStore for FailingParts {
        async fn put_object(&self, _: &str, _: Bytes, _: &str) -> Result<String> {
            unimplemented!()
        }

        async fn create_multipart_upload(&self, _: &str, _: &str) -> Result<String> {
            unimplemented!()
        }

        async fn upload_part(
            &self,
            key: &str,
            _upload_id: &str,
            part_number: i32,
            _data: Bytes,
        ) -> Result<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                if self.transient {
                    return Err(BlockshipError::TransientBackend {
                        key: key.to_string(),
                        reason: format!("injected failure {call}"),
                    });
                }
                return Err(BlockshipError::InvalidPart {
                    key: key.to_string(),
                    reason: format!("rejected part {part_number}"),
                });
            }
            Ok(format!("etag-{part_number}"))
        }

        async fn complete_multipart_upload(
            &self,
            _: &str,
            _: &str,
            _: Vec<CompletedPart>,
        ) -> Result<String> {
            unimplemented!()
        }

        async fn abort_multipart_upload(&self, _: &str, _: &str) -> Result<()> {
            unimplemented!()
        }
    }

    fn span() -> PartSpan {
        PartSpan {
            number: 7,
            offset: 0,
            len: 4,
        }
    }

    #[tokio::test]
    async fn retry_heals_transient_failures() {
        let store = FailingParts {
            failures: 2,
            transient: true,
            calls: AtomicU32::new(0),
        };

        let part = upload_part_with_retry(&store, "k", "id", span(), Bytes::from_static(b"data"))
            .await
            .unwrap();

        assert_eq!(part.part_number, 7);
        assert_eq!(part.etag, "etag-7");
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_stops_after_three_attempts_and_keeps_the_last_error() {
        let store = FailingParts {
            failures: u32::MAX,
            transient: true,
            calls: AtomicU32::new(0),
        };

        let err = upload_part_with_retry(&store, "k", "id", span(), Bytes::from_static(b"data"))
            .await
            .unwrap_err();

        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
        // The third attempt's error comes back unmodified.
        match err {
            BlockshipError::TransientBackend { reason, .. } => {
                assert_eq!(reason, "injected failure 2");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn non_transient_errors_are_not_retried() {
        let store = FailingParts {
            failures: u32::MAX,
            transient: false,
            calls: AtomicU32::new(0),
        };

        let err = upload_part_with_retry(&store, "k", "id", span(), Bytes::from_static(b"data"))
            .await
            .unwrap_err();

        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, BlockshipError::InvalidPart { .. }));
    }
}
