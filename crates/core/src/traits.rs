//! Collaborator traits
//!
//! The drivers reach the network only through these traits, so the core
//! stays independent of any HTTP client or cloud SDK. Adapter crates
//! implement them; tests substitute in-memory fakes or mocks.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Unit delivered to the caller of a locator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Origin label followed by the archive member path, if any
    pub path: String,
    pub content: Vec<u8>,
}

impl Entry {
    pub fn new(path: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            content,
        }
    }
}

impl From<(String, Vec<u8>)> for Entry {
    fn from((path, content): (String, Vec<u8>)) -> Self {
        Self { path, content }
    }
}

/// A response body delivered chunk by chunk
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// GET request with extra headers
#[derive(Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Look up a header value by case-insensitive name
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

// Header values carry credentials.
impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.headers.iter().map(|(n, _)| n.as_str()).collect();
        f.debug_struct("HttpRequest")
            .field("url", &self.url)
            .field("headers", &names)
            .finish()
    }
}

/// Single-stream HTTP transport
#[async_trait]
pub trait HttpFetch: Send + Sync {
    /// Issue a GET and return the body stream
    ///
    /// Implementations fail with `Error::HttpStatus` on a non-success status.
    async fn get(&self, request: HttpRequest) -> Result<ByteStream>;
}

/// Object advertised by a cloud listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub bucket: String,
    pub key: String,
    /// Advertised size in bytes
    pub size: u64,
}

impl ObjectInfo {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>, size: u64) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            size,
        }
    }

    /// `bucket/key`
    pub fn path(&self) -> String {
        format!("{}/{}", self.bucket, self.key)
    }
}

/// Credentials carried by a `service-account` payload
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAccount {
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible services
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub force_path_style: bool,
}

impl fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("access_key_id", &self.access_key_id)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

/// Cloud object listing and download
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List every object under `prefix`, following pagination
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>>;

    /// Open one object's body as a chunk stream
    async fn get_object(&self, object: &ObjectInfo) -> Result<ByteStream>;
}

/// Builds an [`ObjectStore`] client from locator credentials
#[async_trait]
pub trait ObjectStoreConnector: Send + Sync {
    async fn connect(&self, credentials: ServiceAccount) -> Result<Arc<dyn ObjectStore>>;
}

/// Kind of a repository listing entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeEntryKind {
    File,
    Dir,
    Symlink,
    Submodule,
    #[serde(other)]
    Other,
}

/// One entry of a repository directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    #[serde(rename = "type")]
    pub kind: TreeEntryKind,
    pub path: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub download_url: Option<String>,
}

/// Repository contents listing and raw file download
#[async_trait]
pub trait RepositoryTree: Send + Sync {
    /// List one directory (or a single file) of `owner/repo`
    ///
    /// `query` is appended verbatim, leading `?` included, or empty.
    async fn list_directory(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        query: &str,
    ) -> Result<Vec<TreeEntry>>;

    /// Stream a file's raw content
    async fn download(&self, url: &str) -> Result<ByteStream>;
}
