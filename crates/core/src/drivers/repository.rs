//! Repository-tree driver
//!
//! Walks the remote tree from the requested subpath, checks every file
//! against the size ceiling while listing, then downloads all files in
//! parallel. Each file goes through the multiplexer, so archives stored in
//! the repository are exploded under their repository path.

use std::sync::Arc;

use futures::stream::BoxStream;
use futures::{StreamExt, TryFutureExt, TryStreamExt};

use crate::config::FetchOptions;
use crate::drivers::spool_body;
use crate::error::{Error, Result};
use crate::executor::run_bounded;
use crate::locator::Descriptor;
use crate::multiplex::expand_stream;
use crate::spool::Spool;
use crate::traits::{Entry, RepositoryTree, TreeEntryKind};

/// Parsed `owner/repo[/subpath][?query]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoTarget {
    pub owner: String,
    pub repo: String,
    /// Subpath without trailing `/`, empty for the root
    pub path: String,
    /// Query string including its leading `?`, or empty
    pub query: String,
}

impl RepoTarget {
    pub fn parse(destination: &str) -> Result<Self> {
        let (root, query) = match destination.split_once('?') {
            Some((root, query)) => (root, format!("?{query}")),
            None => (destination, String::new()),
        };

        let parts: Vec<&str> = root.splitn(3, '/').collect();
        let (owner, repo, path) = match parts.as_slice() {
            [owner, repo] => (*owner, *repo, ""),
            [owner, repo, path] => (*owner, *repo, path.trim_end_matches('/')),
            _ => ("", "", ""),
        };

        if owner.is_empty() || repo.is_empty() {
            return Err(Error::Syntax(format!(
                "repository destination should be owner/repo[/subpath], got '{destination}'"
            )));
        }

        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            path: path.to_string(),
            query,
        })
    }
}

/// Fetch a repository-tree descriptor through `tree`
pub fn fetch(
    descriptor: &Descriptor,
    options: &FetchOptions,
    tree: Arc<dyn RepositoryTree>,
) -> BoxStream<'static, Result<Entry>> {
    let target = RepoTarget::parse(descriptor.destination());
    resolve(target, options.clone(), tree)
        .try_flatten_stream()
        .boxed()
}

async fn resolve(
    target: Result<RepoTarget>,
    options: FetchOptions,
    tree: Arc<dyn RepositoryTree>,
) -> Result<BoxStream<'static, Result<Entry>>> {
    let target = target?;
    let files = list_files(tree.as_ref(), &target, options.max_size).await?;
    tracing::info!(
        owner = %target.owner,
        repo = %target.repo,
        path = %target.path,
        files = files.len(),
        "listed repository tree"
    );

    let threshold = options.spool_threshold;
    let downloads = run_bounded(
        files,
        move |(path, url)| download(tree.clone(), path, url, threshold),
        options.max_concurrent,
        options.item_timeout,
    );

    Ok(downloads
        .map_ok(|(path, spool)| {
            expand_stream(spool).map_ok(move |member| Entry::from(member.labelled(&path)))
        })
        .try_flatten()
        .boxed())
}

/// Collect `(path, download_url)` for every non-empty file under the target
///
/// Fails fast when a listed size exceeds `max_size`.
pub async fn list_files(
    tree: &dyn RepositoryTree,
    target: &RepoTarget,
    max_size: Option<u64>,
) -> Result<Vec<(String, String)>> {
    let mut pending = vec![target.path.clone()];
    let mut files = Vec::new();

    while let Some(dir) = pending.pop() {
        let listing = tree
            .list_directory(&target.owner, &target.repo, &dir, &target.query)
            .await?;

        for entry in listing {
            match entry.kind {
                TreeEntryKind::Dir => pending.push(entry.path),
                TreeEntryKind::File if entry.size == 0 => {}
                TreeEntryKind::File => {
                    if let Some(limit) = max_size {
                        if entry.size > limit {
                            return Err(Error::SizeLimitExceeded { limit });
                        }
                    }
                    match entry.download_url {
                        Some(url) => files.push((entry.path, url)),
                        None => tracing::warn!(path = %entry.path, "file has no download URL, skipping"),
                    }
                }
                kind => tracing::debug!(path = %entry.path, ?kind, "skipping non-file entry"),
            }
        }
    }

    Ok(files)
}

async fn download(
    tree: Arc<dyn RepositoryTree>,
    path: String,
    url: String,
    threshold: usize,
) -> Result<(String, Spool)> {
    let body = tree.download(&url).await?;
    // Sizes were checked against the listing.
    let spool = spool_body(body, threshold, None).await?;
    tracing::debug!(path = %path, bytes = spool.len(), "file downloaded");
    Ok((path, spool))
}
