//! HTTP(S) driver
//!
//! Single GET, body spooled chunk by chunk under the size ceiling, then
//! multiplexed with the full URL as origin label.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use futures::stream::BoxStream;
use futures::{StreamExt, TryFutureExt, TryStreamExt};

use crate::config::FetchOptions;
use crate::drivers::spool_body;
use crate::error::{Error, Result};
use crate::locator::{AuthKind, Descriptor, Method};
use crate::multiplex::expand_stream;
use crate::traits::{Entry, HttpFetch, HttpRequest};

/// Full URL for a descriptor, prefixing the method's scheme when missing
pub fn full_url(method: Method, destination: &str) -> String {
    let prefix = format!("{}://", method.as_str());
    if destination.starts_with(&prefix) {
        destination.to_string()
    } else {
        format!("{prefix}{destination}")
    }
}

/// Build the GET for a descriptor, applying its auth
pub fn build_request(descriptor: &Descriptor, options: &FetchOptions) -> Result<HttpRequest> {
    let url = full_url(descriptor.method(), descriptor.destination());
    url::Url::parse(&url)?;

    let request = HttpRequest::get(url);
    let (Some(kind), Some(payload)) = (descriptor.auth_kind(), descriptor.auth_payload()) else {
        return Ok(request);
    };

    let request = match kind {
        AuthKind::Basic => {
            let (user, password) = payload.split_once(':').ok_or_else(|| {
                Error::Syntax("basic auth payload must be user:password".into())
            })?;
            let encoded = STANDARD.encode(format!("{user}:{password}"));
            request.header("Authorization", format!("Basic {encoded}"))
        }
        AuthKind::Bearer => request.header("Authorization", format!("Bearer {payload}")),
        AuthKind::Token => request.header("Authorization", format!("token {payload}")),
        AuthKind::ApiKeyHeader => request.header(options.api_key_header.as_str(), payload),
        AuthKind::ServiceAccount => {
            return Err(Error::UnsupportedAuth(format!(
                "{kind} is not valid for {}",
                descriptor.method()
            )));
        }
    };

    Ok(request)
}

/// Fetch an http/https descriptor
pub fn fetch(
    descriptor: &Descriptor,
    options: &FetchOptions,
    http: Arc<dyn HttpFetch>,
) -> BoxStream<'static, Result<Entry>> {
    let request = build_request(descriptor, options);
    download(request, options.clone(), http)
        .try_flatten_stream()
        .boxed()
}

async fn download(
    request: Result<HttpRequest>,
    options: FetchOptions,
    http: Arc<dyn HttpFetch>,
) -> Result<BoxStream<'static, Result<Entry>>> {
    let request = request?;
    let url = request.url.clone();

    tracing::debug!(url = %url, "GET");
    let body = http.get(request).await?;
    let spool = spool_body(body, options.spool_threshold, options.max_size).await?;
    tracing::debug!(url = %url, bytes = spool.len(), "download complete");

    Ok(expand_stream(spool)
        .map_ok(move |member| Entry::from(member.labelled(&url)))
        .boxed())
}
