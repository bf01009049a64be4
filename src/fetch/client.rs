//! Abstraction over the two range-fetch transports the pipeline needs:
//! plain HTTP (for the public data.commoncrawl.org mirror, the
//! teacher's stack) and S3-compatible object storage (for internal
//! mirrors, the teacher's `minio` stack via `saver.rs`).

use bytes::Bytes;

use crate::fetch::retry::FetchOutcome;

/// A single byte-range GET against a named file. Implementations issue
/// exactly one range per call: spec §4.B asserts statically that
/// object-storage APIs are single-range, which this trait encodes by
/// construction — there is no multi-range method to call.
#[async_trait::async_trait]
pub trait FetchClient: Send + Sync {
    async fn get_range(&self, file: &str, offset: usize, length: usize) -> FetchOutcome;
}

/// Fetches ranges over plain HTTP, against a base URL that `file` is
/// joined to. Generalizes the teacher's `download_and_unzip`.
pub struct HttpRangeClient {
    client: reqwest::Client,
    base_url: String,
    timeout: std::time::Duration,
}

impl HttpRangeClient {
    pub fn new(base_url: impl Into<String>, timeout: std::time::Duration) -> Self {
        HttpRangeClient {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            timeout,
        }
    }
}

#[async_trait::async_trait]
impl FetchClient for HttpRangeClient {
    async fn get_range(&self, file: &str, offset: usize, length: usize) -> FetchOutcome {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), file);
        let range_header = format!("bytes={}-{}", offset, offset + length.saturating_sub(1));

        let request = self
            .client
            .get(&url)
            .header("Range", range_header)
            .timeout(self.timeout)
            .send();

        let response = match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => return FetchOutcome::Transient(e.to_string()),
            Err(_) => return FetchOutcome::Transient("request timed out".to_string()),
        };

        match response.status() {
            reqwest::StatusCode::PARTIAL_CONTENT => match response.bytes().await {
                Ok(body) => FetchOutcome::Success(body),
                Err(e) => FetchOutcome::Transient(e.to_string()),
            },
            reqwest::StatusCode::OK => FetchOutcome::ServerIgnoredRange,
            reqwest::StatusCode::NOT_FOUND => FetchOutcome::NotFound,
            other => FetchOutcome::Transient(format!("unexpected status {other}")),
        }
    }
}

/// Fetches ranges from an S3-compatible bucket via `minio`. Kept as a
/// distinct type (rather than a runtime flag on `HttpRangeClient`) so
/// the single-range assertion from spec §4.B is a property of the type,
/// not a condition someone could accidentally violate.
pub struct S3RangeClient {
    client: minio::s3::client::Client,
    bucket: String,
}

impl S3RangeClient {
    pub fn new(client: minio::s3::client::Client, bucket: impl Into<String>) -> Self {
        S3RangeClient {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait::async_trait]
impl FetchClient for S3RangeClient {
    async fn get_range(&self, file: &str, offset: usize, length: usize) -> FetchOutcome {
        use minio::s3::args::GetObjectArgs;

        let mut args = match GetObjectArgs::new(&self.bucket, file) {
            Ok(args) => args,
            Err(e) => return FetchOutcome::Transient(e.to_string()),
        };
        args.offset = Some(offset);
        args.length = Some(length);

        match self.client.get_object(&args).await {
            Ok(resp) => match resp.bytes().await {
                Ok(body) => FetchOutcome::Success(Bytes::from(body.to_vec())),
                Err(e) => FetchOutcome::Transient(e.to_string()),
            },
            Err(e) => {
                let msg = e.to_string();
                if msg.contains("NoSuchKey") || msg.contains("404") {
                    FetchOutcome::NotFound
                } else {
                    FetchOutcome::Transient(msg)
                }
            }
        }
    }
}
