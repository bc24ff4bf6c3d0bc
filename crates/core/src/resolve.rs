//! Locator entry point
//!
//! A [`Locator`] is validated entirely at construction. Fetching dispatches
//! on the method to one driver and returns a single-pass stream that ends
//! right after the first error.

use std::sync::Arc;

use futures::stream::{BoxStream, StreamExt};

use crate::config::FetchOptions;
use crate::drivers::github::GithubContents;
use crate::drivers::{cloud, http, repository};
use crate::error::Result;
use crate::locator::{AuthKind, Descriptor, Method, parse_locator};
use crate::traits::{Entry, HttpFetch, ObjectStoreConnector};

/// Lazy sequence of fetched entries
pub type EntryStream = BoxStream<'static, Result<Entry>>;

/// Network collaborators used by the drivers
#[derive(Clone)]
pub struct Transports {
    pub http: Arc<dyn HttpFetch>,
    pub object_stores: Arc<dyn ObjectStoreConnector>,
}

impl Transports {
    pub fn new(http: Arc<dyn HttpFetch>, object_stores: Arc<dyn ObjectStoreConnector>) -> Self {
        Self {
            http,
            object_stores,
        }
    }
}

/// A parsed, validated locator ready to fetch
#[derive(Debug, Clone)]
pub struct Locator {
    descriptor: Descriptor,
    options: FetchOptions,
}

impl Locator {
    /// Parse `input` with default options
    pub fn new(input: &str) -> Result<Self> {
        Self::with_options(input, FetchOptions::default())
    }

    pub fn with_options(input: &str, options: FetchOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            descriptor: parse_locator(input)?,
            options,
        })
    }

    pub fn from_descriptor(descriptor: Descriptor, options: FetchOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            descriptor,
            options,
        })
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// Start fetching; nothing touches the network until the stream is polled
    pub fn fetch(&self, transports: &Transports) -> EntryStream {
        let descriptor = &self.descriptor;
        tracing::info!(locator = %descriptor, "resolving locator");

        let entries = match descriptor.method() {
            Method::Http | Method::Https => {
                http::fetch(descriptor, &self.options, transports.http.clone())
            }
            Method::CloudObjectStore => {
                cloud::fetch(descriptor, &self.options, transports.object_stores.clone())
            }
            Method::RepositoryTree => {
                let token = match descriptor.auth_kind() {
                    Some(AuthKind::Token) => descriptor.auth_payload().map(str::to_string),
                    _ => None,
                };
                let tree = GithubContents::new(
                    transports.http.clone(),
                    self.options.repository_api_url.clone(),
                    token,
                );
                repository::fetch(descriptor, &self.options, Arc::new(tree))
            }
        };

        fuse_on_error(entries)
    }
}

/// End `stream` right after its first `Err`
///
/// Items already produced stay valid; anything behind the error is dropped.
pub fn fuse_on_error<T: Send + 'static>(
    stream: BoxStream<'static, Result<T>>,
) -> BoxStream<'static, Result<T>> {
    stream
        .scan(false, |failed, item| {
            if *failed {
                return futures::future::ready(None);
            }
            *failed = item.is_err();
            futures::future::ready(Some(item))
        })
        .boxed()
}
