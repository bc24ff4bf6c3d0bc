//! Cloud object-store driver
//!
//! Lists every object under `bucket/prefix`. A single match is multiplexed,
//! so a locator naming one archive explodes it; several matches are
//! downloaded in parallel and reported as individual files.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use futures::stream::BoxStream;
use futures::{StreamExt, TryFutureExt, TryStreamExt};

use super::{collect_body, spool_body};
use crate::config::FetchOptions;
use crate::error::{Error, Result};
use crate::executor::run_bounded;
use crate::locator::Descriptor;
use crate::multiplex::expand_stream;
use crate::traits::{Entry, ObjectInfo, ObjectStore, ObjectStoreConnector, ServiceAccount};

/// Decode a `service-account` payload: base64, then JSON credentials
pub fn decode_service_account(payload: &str) -> Result<ServiceAccount> {
    let raw = STANDARD.decode(payload.trim()).map_err(|e| {
        Error::Syntax(format!("service-account payload should be base64 encoded: {e}"))
    })?;
    serde_json::from_slice(&raw).map_err(|e| {
        Error::Syntax(format!("service-account payload should be JSON credentials: {e}"))
    })
}

/// Split `bucket[/prefix]`; a destination without `/` lists the whole bucket
pub fn split_destination(destination: &str) -> (&str, &str) {
    destination.split_once('/').unwrap_or((destination, ""))
}

/// Fetch a cloud-object-store descriptor
pub fn fetch(
    descriptor: &Descriptor,
    options: &FetchOptions,
    connector: Arc<dyn ObjectStoreConnector>,
) -> BoxStream<'static, Result<Entry>> {
    let credentials = match descriptor.auth_payload() {
        Some(payload) => decode_service_account(payload),
        None => Err(Error::UnsupportedAuth(
            "cloud-object-store requires service-account credentials".into(),
        )),
    };

    resolve(
        credentials,
        descriptor.destination().to_string(),
        options.clone(),
        connector,
    )
    .try_flatten_stream()
    .boxed()
}

async fn resolve(
    credentials: Result<ServiceAccount>,
    destination: String,
    options: FetchOptions,
    connector: Arc<dyn ObjectStoreConnector>,
) -> Result<BoxStream<'static, Result<Entry>>> {
    let store = connector.connect(credentials?).await?;

    let (bucket, prefix) = split_destination(&destination);
    let objects = store.list_objects(bucket, prefix).await?;
    tracing::info!(bucket, prefix, count = objects.len(), "listed objects");

    // Any oversized object fails the whole operation before a download starts.
    if let Some(limit) = options.max_size {
        if let Some(big) = objects.iter().find(|o| o.size > limit) {
            tracing::debug!(key = %big.key, size = big.size, limit, "object over size limit");
            return Err(Error::SizeLimitExceeded { limit });
        }
    }

    if let [object] = objects.as_slice() {
        let body = store.get_object(object).await?;
        let spool = spool_body(body, options.spool_threshold, options.max_size).await?;
        tracing::debug!(key = %object.key, bytes = spool.len(), on_disk = spool.is_on_disk(), "object spooled");
        return Ok(expand_stream(spool)
            .map_ok(move |member| Entry::from(member.labelled(&destination)))
            .boxed());
    }

    Ok(run_bounded(
        objects,
        move |object| download(store.clone(), object),
        options.max_concurrent,
        options.item_timeout,
    ))
}

async fn download(store: Arc<dyn ObjectStore>, object: ObjectInfo) -> Result<Entry> {
    let content = collect_body(store.get_object(&object).await?).await?;
    tracing::debug!(path = %object.path(), bytes = content.len(), "object downloaded");
    Ok(Entry::new(object.path(), content))
}
