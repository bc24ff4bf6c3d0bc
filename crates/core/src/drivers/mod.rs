//! Transport drivers
//!
//! One driver per locator method family. Each turns a descriptor into a
//! stream of entries, fetching through the collaborator traits and passing
//! payloads through the content multiplexer.

pub mod cloud;
pub mod github;
pub mod http;
pub mod repository;

use std::io;

use futures::StreamExt;

use crate::error::{Error, Result};
use crate::spool::Spool;
use crate::traits::ByteStream;

/// Drain a response body into a fresh spool, enforcing `limit` per chunk
///
/// On overflow the body is dropped mid-stream and the partial spool released.
/// Once the spool has rolled over to a temp file, chunks are written on the
/// blocking pool.
pub(crate) async fn spool_body(
    mut body: ByteStream,
    threshold: usize,
    limit: Option<u64>,
) -> Result<Spool> {
    let mut spool = Spool::new(threshold, limit);
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        if spool.is_on_disk() {
            spool = tokio::task::spawn_blocking(move || spool.push(&chunk).map(|()| spool))
                .await
                .map_err(|e| Error::Io(io::Error::other(e)))??;
        } else {
            spool.push(&chunk)?;
        }
    }

    if spool.is_on_disk() {
        spool = tokio::task::spawn_blocking(move || spool.rewind().map(|()| spool))
            .await
            .map_err(|e| Error::Io(io::Error::other(e)))??;
    } else {
        spool.rewind()?;
    }
    Ok(spool)
}

/// Drain a response body fully into memory
pub(crate) async fn collect_body(mut body: ByteStream) -> Result<Vec<u8>> {
    let mut content = Vec::new();
    while let Some(chunk) = body.next().await {
        content.extend_from_slice(&chunk?);
    }
    Ok(content)
}


#[cfg(test)]
mod tests {
    use std::io::Read;

    use bytes::Bytes;
    use futures::stream;

    use super::*;

    fn body(data: &[u8], chunk_size: usize) -> ByteStream {
        let chunks: Vec<Result<Bytes>> = data
            .chunks(chunk_size)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        stream::iter(chunks).boxed()
    }

    #[tokio::test]
    async fn test_spool_body_spills_to_disk() {
        let data: Vec<u8> = (0..=255u8).cycle().take(4096).collect();

        let mut spool = spool_body(body(&data, 100), 8, None).await.unwrap();
        assert!(spool.is_on_disk());
        assert_eq!(spool.len(), 4096);

        let mut read_back = Vec::new();
        spool.read_to_end(&mut read_back).unwrap();
        assert_eq!(read_back, data);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_spool_body_limit_on_disk() {
        let data = vec![7u8; 1000];

        let err = spool_body(body(&data, 64), 8, Some(500)).await.unwrap_err();
        assert!(matches!(err, Error::SizeLimitExceeded { limit: 500 }));
    }

    #[tokio::test]
    async fn test_spool_body_in_memory() {
        let mut spool = spool_body(body(b"small", 2), 1024, Some(5)).await.unwrap();
        assert!(!spool.is_on_disk());

        let mut read_back = Vec::new();
        spool.read_to_end(&mut read_back).unwrap();
        assert_eq!(read_back, b"small");
    }

    #[tokio::test]
    async fn test_collect_body() {
        let content = collect_body(body(b"abcdefg", 3)).await.unwrap();
        assert_eq!(content, b"abcdefg");
    }
}
