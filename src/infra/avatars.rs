//! Disk-backed avatar resolution.
//!
//! Resolves an avatar reference (remote URL, local path, or inline data URI)
//! into an embeddable `data:` URI. Encoded payloads are cached on disk for 24
//! hours under a key derived from the reference, so repeated layout runs do
//! not re-download stable avatars. The cache tolerates concurrent writers to
//! one key: payloads for a given reference are content-stable inside the
//! freshness window, so the last write wins.

use std::{
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use metrics::counter;
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use tokio::fs;
use tracing::warn;
use url::Url;

const FRESHNESS_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);
const DEFAULT_CONTENT_TYPE: &str = "image/png";

#[derive(Debug, Error)]
pub enum AvatarError {
    #[error("failed to read avatar source: {0}")]
    Io(#[from] std::io::Error),
    #[error("avatar download failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("avatar download failed with status {status}")]
    Status { status: reqwest::StatusCode },
}

pub struct AvatarStore {
    cache_dir: PathBuf,
    client: reqwest::Client,
    freshness: Duration,
}

impl AvatarStore {
    pub fn new(cache_dir: impl Into<PathBuf>, client: reqwest::Client) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            client,
            freshness: FRESHNESS_WINDOW,
        }
    }

    #[cfg(test)]
    fn with_freshness(mut self, freshness: Duration) -> Self {
        self.freshness = freshness;
        self
    }

    /// Resolve a reference to an embeddable data URI.
    ///
    /// A fresh cache entry wins; `data:` references pass through untouched;
    /// `http(s)` URLs are downloaded; anything else is read as a local file.
    pub async fn resolve(&self, reference: &str) -> Result<String, AvatarError> {
        let cache_path = self.cache_dir.join(cache_key(reference));
        if let Some(cached) = self.read_fresh(&cache_path).await {
            counter!("mecenate_avatar_cache_hits_total").increment(1);
            return Ok(cached);
        }

        if reference.starts_with("data:") {
            return Ok(reference.to_string());
        }

        counter!("mecenate_avatar_cache_misses_total").increment(1);
        let payload = match remote_url(reference) {
            Some(url) => self.fetch_remote(url, reference).await?,
            None => self.read_local(Path::new(reference)).await?,
        };

        self.store(&cache_path, &payload).await;
        Ok(payload)
    }

    async fn read_fresh(&self, path: &Path) -> Option<String> {
        let metadata = fs::metadata(path).await.ok()?;
        let modified = metadata.modified().ok()?;
        let age = SystemTime::now().duration_since(modified).ok()?;
        if age < self.freshness {
            fs::read_to_string(path).await.ok()
        } else {
            None
        }
    }

    async fn read_local(&self, path: &Path) -> Result<String, AvatarError> {
        let data = fs::read(path).await?;
        Ok(encode_data_uri(&content_type_for(path), &data))
    }

    async fn fetch_remote(&self, url: Url, reference: &str) -> Result<String, AvatarError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AvatarError::Status { status });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| content_type_for(Path::new(reference)));
        let data = response.bytes().await?;

        Ok(encode_data_uri(&content_type, &data))
    }

    // Cache writes are best-effort: a failure degrades to re-fetching next
    // time, never to a resolution error.
    async fn store(&self, path: &Path, payload: &str) {
        if let Err(err) = fs::create_dir_all(&self.cache_dir).await {
            warn!(
                target: "mecenate::avatars",
                error = %err,
                "failed to create avatar cache directory"
            );
            return;
        }
        if let Err(err) = fs::write(path, payload).await {
            warn!(
                target: "mecenate::avatars",
                path = %path.display(),
                error = %err,
                "failed to write avatar cache entry"
            );
        }
    }
}

fn remote_url(reference: &str) -> Option<Url> {
    let url = Url::parse(reference).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

/// Deterministic cache key: non-alphanumeric characters collapse to `_`.
fn cache_key(reference: &str) -> String {
    let sanitized: String = reference
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("img_{sanitized}.txt")
}

fn content_type_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first()
        .filter(|mime| mime.type_() == mime_guess::mime::IMAGE)
        .map(|mime| mime.to_string())
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string())
}

fn encode_data_uri(content_type: &str, data: &[u8]) -> String {
    format!("data:{content_type};base64,{}", BASE64.encode(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> AvatarStore {
        AvatarStore::new(dir.path().join("cache"), reqwest::Client::new())
    }

    #[tokio::test]
    async fn data_uris_pass_through_untouched() {
        let dir = TempDir::new().expect("temp dir");
        let reference = "data:image/svg+xml;base64,PHN2Zy8+";

        let resolved = store(&dir).resolve(reference).await.expect("resolve");
        assert_eq!(resolved, reference);
    }

    #[tokio::test]
    async fn local_files_become_base64_data_uris() {
        let dir = TempDir::new().expect("temp dir");
        let source = dir.path().join("avatar.png");
        let bytes = b"\x89PNG\r\nfake-pixels";
        std::fs::write(&source, bytes).expect("write source");

        let resolved = store(&dir)
            .resolve(source.to_str().expect("utf8 path"))
            .await
            .expect("resolve");

        assert_eq!(
            resolved,
            format!("data:image/png;base64,{}", BASE64.encode(bytes))
        );
    }

    #[tokio::test]
    async fn second_resolution_is_served_from_cache() {
        let dir = TempDir::new().expect("temp dir");
        let source = dir.path().join("avatar.gif");
        std::fs::write(&source, b"GIF89a").expect("write source");
        let store = store(&dir);
        let reference = source.to_str().expect("utf8 path").to_string();

        let first = store.resolve(&reference).await.expect("first resolve");

        // Deleting the source proves the second resolution never re-reads it.
        std::fs::remove_file(&source).expect("remove source");
        let second = store.resolve(&reference).await.expect("second resolve");

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn stale_entries_trigger_a_re_read() {
        let dir = TempDir::new().expect("temp dir");
        let source = dir.path().join("avatar.png");
        std::fs::write(&source, b"old").expect("write source");
        let store = store(&dir).with_freshness(Duration::ZERO);
        let reference = source.to_str().expect("utf8 path").to_string();

        let first = store.resolve(&reference).await.expect("first resolve");
        std::fs::write(&source, b"new").expect("rewrite source");
        let second = store.resolve(&reference).await.expect("second resolve");

        assert_ne!(first, second);
        assert!(second.ends_with(&BASE64.encode(b"new")));
    }

    #[tokio::test]
    async fn missing_local_files_surface_io_errors() {
        let dir = TempDir::new().expect("temp dir");
        let missing = dir.path().join("nope.png");

        let err = store(&dir)
            .resolve(missing.to_str().expect("utf8 path"))
            .await
            .expect_err("missing file");
        assert!(matches!(err, AvatarError::Io(_)));
    }

    #[test]
    fn cache_keys_are_deterministic_and_sanitized() {
        assert_eq!(
            cache_key("https://a.b/c.png"),
            "img_https___a_b_c_png.txt"
        );
        assert_eq!(cache_key("https://a.b/c.png"), cache_key("https://a.b/c.png"));
    }

    #[test]
    fn content_types_follow_extensions_with_png_fallback() {
        assert_eq!(content_type_for(Path::new("x.jpg")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("x.jpeg")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("x.gif")), "image/gif");
        assert_eq!(content_type_for(Path::new("x.svg")), "image/svg+xml");
        assert_eq!(content_type_for(Path::new("x.unknown")), "image/png");
        assert_eq!(content_type_for(Path::new("x")), "image/png");
    }
}
