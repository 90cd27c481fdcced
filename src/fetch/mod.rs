//! Loading dataset bytes from local files or HTTP(S) URLs.

mod basic;
mod client;
pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;

use anyhow::{Context, Result};
use bytes::Bytes;
use tracing::debug;

pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Bytes> {
    let req = reqwest::Request::new(reqwest::Method::GET, url.parse()?);

    let resp = client.execute(req).await?.error_for_status()?;
    Ok(resp.bytes().await?)
}

pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Loads a source that is either a local path or an `http(s)` URL.
#[tracing::instrument(skip(client))]
pub async fn load_source<C: HttpClient>(client: &C, source: &str) -> Result<Bytes> {
    let bytes = if is_url(source) {
        fetch_bytes(client, source)
            .await
            .with_context(|| format!("fetching {source}"))?
    } else {
        Bytes::from(
            tokio::fs::read(source)
                .await
                .with_context(|| format!("reading {source}"))?,
        )
    };
    debug!(bytes = bytes.len(), "Source loaded");
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://data.example.org/a.csv"));
        assert!(is_url("http://localhost/a.csv"));
        assert!(!is_url("data/student-mat.csv"));
        assert!(!is_url("httpdata.csv"));
    }

    #[tokio::test]
    async fn test_load_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.csv");
        std::fs::write(&path, "school;G1\nGP;10\n").unwrap();

        let client = BasicClient::new().unwrap();
        let bytes = load_source(&client, path.to_str().unwrap()).await.unwrap();
        assert_eq!(&bytes[..], b"school;G1\nGP;10\n");
    }

    #[tokio::test]
    async fn test_load_missing_file_names_source() {
        let client = BasicClient::new().unwrap();
        let err = load_source(&client, "/nonexistent/student-mat.csv")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/student-mat.csv"));
    }
}
