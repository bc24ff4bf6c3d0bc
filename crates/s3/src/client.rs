//! S3 client implementation
//!
//! Wraps aws-sdk-s3 and implements the ObjectStore trait from arl-core.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use arl_core::{
    ByteStream, Error, ObjectInfo, ObjectStore, ObjectStoreConnector, Result, ServiceAccount,
};

const DEFAULT_REGION: &str = "us-east-1";

/// S3 client wrapper
pub struct S3Client {
    inner: aws_sdk_s3::Client,
}

impl S3Client {
    /// Create a new S3 client from service-account credentials
    pub async fn from_service_account(account: ServiceAccount) -> Result<Self> {
        let credentials = aws_credential_types::Credentials::new(
            account.access_key_id,
            account.secret_access_key,
            account.session_token,
            None, // expiry
            "arl-service-account",
        );
        let region = account
            .region
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(aws_config::Region::new(region));
        if let Some(endpoint) = &account.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(account.force_path_style)
            .build();

        Ok(Self {
            inner: aws_sdk_s3::Client::from_conf(s3_config),
        })
    }

    /// Get the underlying aws-sdk-s3 client
    pub fn inner(&self) -> &aws_sdk_s3::Client {
        &self.inner
    }
}

/// Map an SDK error message, recognizing missing buckets and keys
fn classify(message: String, what: impl FnOnce() -> String) -> Error {
    if message.contains("NotFound") || message.contains("NoSuchKey") || message.contains("NoSuchBucket") {
        Error::NotFound(what())
    } else {
        Error::Network(message)
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self.inner.list_objects_v2().bucket(bucket);
            if !prefix.is_empty() {
                request = request.prefix(prefix);
            }
            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| classify(e.to_string(), || format!("Bucket not found: {bucket}")))?;

            for object in response.contents() {
                let key = object.key().unwrap_or_default();
                // Folder placeholders carry no content.
                if key.ends_with('/') {
                    continue;
                }
                let size = object.size().unwrap_or(0).max(0) as u64;
                objects.push(ObjectInfo::new(bucket, key, size));
            }

            continuation_token = response.next_continuation_token().map(|s| s.to_string());
            if !response.is_truncated().unwrap_or(false) || continuation_token.is_none() {
                break;
            }
            tracing::debug!(bucket, prefix, listed = objects.len(), "listing next page");
        }

        Ok(objects)
    }

    async fn get_object(&self, object: &ObjectInfo) -> Result<ByteStream> {
        let response = self
            .inner
            .get_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .send()
            .await
            .map_err(|e| classify(e.to_string(), || object.path()))?;

        Ok(body_stream(response.body))
    }
}

/// Adapt an SDK response body to the core chunk stream
fn body_stream(body: aws_sdk_s3::primitives::ByteStream) -> ByteStream {
    stream::unfold(body, |mut body| async move {
        let chunk = body.next().await?;
        Some((chunk.map_err(|e| Error::Network(e.to_string())), body))
    })
    .boxed()
}

/// Connects to S3-compatible stores with locator credentials
#[derive(Debug, Default, Clone, Copy)]
pub struct S3Connector;

#[async_trait]
impl ObjectStoreConnector for S3Connector {
    async fn connect(&self, credentials: ServiceAccount) -> Result<Arc<dyn ObjectStore>> {
        tracing::debug!(
            access_key_id = %credentials.access_key_id,
            endpoint = ?credentials.endpoint,
            "connecting to object store"
        );
        Ok(Arc::new(S3Client::from_service_account(credentials).await?))
    }
}
