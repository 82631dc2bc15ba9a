//! Rewriting of stored image locations to URLs reachable from the client.
//!
//! The API returns object-storage URLs that may name the storage service's
//! internal host. Only objects inside the configured bucket are exposed, and
//! always through the public origin.

use anyhow::{Context as _, Result};
use regex::Regex;
use url::Url;

pub const DEFAULT_PUBLIC_ORIGIN: &str = "http://localhost:9000";
pub const DEFAULT_BUCKET: &str = "orchid-bucket";
pub const DEFAULT_INTERNAL_HOST: &str = "minio:9000";

#[derive(Debug, Clone)]
pub struct ImageHost {
    base: Url,
    origin: String,
    bucket_prefix: String,
    internal: Regex,
}

impl ImageHost {
    pub fn new(public_origin: &str, bucket: &str, internal_host: &str) -> Result<Self> {
        let origin = public_origin.trim_end_matches('/').to_string();
        let base = Url::parse(&origin)
            .with_context(|| format!("invalid image origin '{}'", public_origin))?;
        let internal = Regex::new(&format!("{}(/.*)", regex::escape(internal_host)))
            .with_context(|| format!("invalid internal image host '{}'", internal_host))?;
        Ok(Self {
            base,
            origin,
            bucket_prefix: format!("/{}/", bucket.trim_matches('/')),
            internal,
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Public URL for a stored image location, or an empty string when the
    /// location is empty or points outside the bucket.
    pub fn public_url(&self, raw: &str) -> String {
        if raw.is_empty() {
            return String::new();
        }
        if raw.starts_with(&format!("{}/", self.origin)) {
            return raw.to_string();
        }

        let mut path = match self.base.join(raw) {
            Ok(url) => url.path().to_string(),
            Err(_) => self
                .internal
                .captures(raw)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
        };
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        if !path.starts_with(&self.bucket_prefix) {
            return String::new();
        }
        format!("{}{}", self.origin, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> ImageHost {
        ImageHost::new(DEFAULT_PUBLIC_ORIGIN, DEFAULT_BUCKET, DEFAULT_INTERNAL_HOST).unwrap()
    }

    #[test]
    fn test_empty_stays_empty() {
        assert_eq!(host().public_url(""), "");
    }

    #[test]
    fn test_public_url_passes_through() {
        let url = "http://localhost:9000/orchid-bucket/a.png?X-Amz-Signature=1";
        assert_eq!(host().public_url(url), url);
    }

    #[test]
    fn test_internal_host_rewritten() {
        assert_eq!(
            host().public_url("http://minio:9000/orchid-bucket/a.png?X-Amz-Expires=60"),
            "http://localhost:9000/orchid-bucket/a.png"
        );
        assert_eq!(
            host().public_url("https://cdn.example.com/orchid-bucket/deep/b.jpg"),
            "http://localhost:9000/orchid-bucket/deep/b.jpg"
        );
    }

    #[test]
    fn test_relative_paths_resolved() {
        assert_eq!(
            host().public_url("/orchid-bucket/c.png"),
            "http://localhost:9000/orchid-bucket/c.png"
        );
        assert_eq!(
            host().public_url("orchid-bucket/c.png"),
            "http://localhost:9000/orchid-bucket/c.png"
        );
    }

    #[test]
    fn test_paths_outside_bucket_rejected() {
        assert_eq!(host().public_url("http://minio:9000/other-bucket/a.png"), "");
        assert_eq!(host().public_url("/etc/passwd"), "");
        assert_eq!(host().public_url("http://localhost:9000"), "");
        assert_eq!(host().public_url("http://minio:9000/orchid-bucket"), "");
    }

    #[test]
    fn test_unparseable_url_uses_internal_host_match() {
        assert_eq!(
            host().public_url("http://[minio:9000/orchid-bucket/e.png"),
            "http://localhost:9000/orchid-bucket/e.png"
        );
        assert_eq!(host().public_url("http://[elsewhere/orchid-bucket/e.png"), "");
    }

    #[test]
    fn test_custom_configuration() {
        let host = ImageHost::new("https://img.example.com/", "/flowers/", "store.local:9000").unwrap();
        assert_eq!(host.origin(), "https://img.example.com");
        assert_eq!(
            host.public_url("http://store.local:9000/flowers/x.png"),
            "https://img.example.com/flowers/x.png"
        );
        assert!(ImageHost::new("not a url", "b", "h").is_err());
    }
}
