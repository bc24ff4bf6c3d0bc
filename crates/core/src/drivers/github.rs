//! GitHub contents API client
//!
//! Implements [`RepositoryTree`] on top of any [`HttpFetch`].

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::traits::{ByteStream, HttpFetch, HttpRequest, RepositoryTree, TreeEntry};

const ACCEPT: &str = "application/vnd.github+json";

/// A listing is an array for directories and a bare object for a file
#[derive(Deserialize)]
#[serde(untagged)]
enum Listing {
    Many(Vec<TreeEntry>),
    One(TreeEntry),
}

/// Repository tree backed by the GitHub contents API
pub struct GithubContents {
    http: Arc<dyn HttpFetch>,
    api_url: String,
    token: Option<String>,
}

impl GithubContents {
    pub fn new(http: Arc<dyn HttpFetch>, api_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http,
            api_url: api_url.into(),
            token,
        }
    }

    /// `{api}/repos/{owner}/{repo}/contents[/{path}]{query}`
    pub fn contents_url(&self, owner: &str, repo: &str, path: &str, query: &str) -> Result<String> {
        let mut url = url::Url::parse(&self.api_url)?;
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("{} cannot be a base URL", self.api_url)))?
            .pop_if_empty()
            .extend(["repos", owner, repo, "contents"])
            .extend(path.split('/').filter(|s| !s.is_empty()));

        let mut url = url.to_string();
        url.push_str(query);
        Ok(url)
    }

    fn request(&self, url: String) -> HttpRequest {
        let request = HttpRequest::get(url).header("Accept", ACCEPT);
        match &self.token {
            Some(token) => request.header("Authorization", format!("token {token}")),
            None => request,
        }
    }
}

#[async_trait]
impl RepositoryTree for GithubContents {
    async fn list_directory(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        query: &str,
    ) -> Result<Vec<TreeEntry>> {
        let url = self.contents_url(owner, repo, path, query)?;
        tracing::debug!(url = %url, "listing repository path");

        let mut body = self.http.get(self.request(url)).await?;
        let mut raw = Vec::new();
        while let Some(chunk) = body.next().await {
            raw.extend_from_slice(&chunk?);
        }

        Ok(match serde_json::from_slice::<Listing>(&raw)? {
            Listing::Many(entries) => entries,
            Listing::One(entry) => vec![entry],
        })
    }

    async fn download(&self, url: &str) -> Result<ByteStream> {
        self.http.get(self.request(url.to_string())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::testing::FakeHttp;
    use crate::traits::TreeEntryKind;

    fn client(http: Arc<FakeHttp>, token: Option<&str>) -> GithubContents {
        GithubContents::new(http, "https://api.test", token.map(str::to_string))
    }

    #[test]
    fn test_contents_url() {
        let gh = client(Arc::new(FakeHttp::new()), None);
        assert_eq!(
            gh.contents_url("o", "r", "", "").unwrap(),
            "https://api.test/repos/o/r/contents"
        );
        assert_eq!(
            gh.contents_url("o", "r", "rules/windows", "?ref=dev").unwrap(),
            "https://api.test/repos/o/r/contents/rules/windows?ref=dev"
        );
    }

    #[tokio::test]
    async fn test_single_file_listing_is_normalized() {
        let http = Arc::new(FakeHttp::new().route(
            "https://api.test/repos/o/r/contents/README.md",
            r#"{"type":"file","path":"README.md","size":4,"download_url":"https://raw.test/README.md"}"#,
        ));
        let entries = client(http, None)
            .list_directory("o", "r", "README.md", "")
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, TreeEntryKind::File);
    }

    #[tokio::test]
    async fn test_token_header_on_listing_and_download() {
        let http = Arc::new(
            FakeHttp::new()
                .route("https://api.test/repos/o/r/contents", "[]")
                .route("https://raw.test/f", "data"),
        );
        let gh = client(http.clone(), Some("t0k"));

        gh.list_directory("o", "r", "", "").await.unwrap();
        gh.download("https://raw.test/f").await.unwrap();

        for request in http.requests() {
            assert_eq!(request.header_value("Authorization"), Some("token t0k"));
        }
        assert_eq!(http.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_listing_not_json() {
        let http = Arc::new(FakeHttp::new().route("https://api.test/repos/o/r/contents", "<html>"));
        let err = client(http, None)
            .list_directory("o", "r", "", "")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }
}
