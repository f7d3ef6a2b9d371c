//! Object-store adapters for attendance and enrolment images.
//!
//! Stored references are classified by shape:
//!
//! - `primary:<key>` — primary HTTP object store (static credential).
//! - `secondary:<key>` — secondary HTTP object store (short-lived bearer
//!   token, cached in-process and refreshed on 401/403).
//! - `http(s)://...` — an external URL, streamed through as-is.
//! - anything else — a key in the local filesystem store.

use attend_core::config::StorageConfig;
use attend_core::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

pub const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

/// Bytes plus the origin's content type.
#[derive(Debug, Clone)]
pub struct FetchedObject {
    pub bytes: Bytes,
    pub content_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Local,
    Primary,
    Secondary,
    External,
}

/// Splits a stored reference into its backend and the backend-local key.
pub fn classify(reference: &str) -> (StoreKind, &str) {
    if let Some(key) = reference.strip_prefix("primary:") {
        (StoreKind::Primary, key)
    } else if let Some(key) = reference.strip_prefix("secondary:") {
        (StoreKind::Secondary, key)
    } else if reference.starts_with("http://") || reference.starts_with("https://") {
        (StoreKind::External, reference)
    } else {
        (StoreKind::Local, reference)
    }
}

/// Filename for the `Content-Disposition` header: the basename of the key.
pub fn basename(reference: &str) -> &str {
    reference.rsplit('/').next().unwrap_or(reference)
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores bytes under a key and returns the full reference (including
    /// backend prefix) to persist.
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<String>;

    /// Fetches a backend-local key.
    async fn fetch(&self, key: &str) -> Result<FetchedObject>;
}

// ---- local filesystem ----

pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Stored keys use `/` separators; reject anything trying to escape the
    /// root.
    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
        {
            return Err(Error::validation("Invalid image key"));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn put(&self, key: &str, bytes: Bytes, _content_type: &str) -> Result<String> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &bytes).await?;
        Ok(key.to_string())
    }

    async fn fetch(&self, key: &str) -> Result<FetchedObject> {
        let path = self.resolve(key)?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|_| Error::not_found("Image not found"))?;
        Ok(FetchedObject {
            bytes: Bytes::from(bytes),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
        })
    }
}

// ---- primary HTTP store (static credential) ----

pub struct PrimaryStore {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl PrimaryStore {
    pub fn new(endpoint: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
        }
    }
}

#[async_trait]
impl ObjectStore for PrimaryStore {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<String> {
        let response = self
            .client
            .put(format!("{}/{}", self.endpoint, key))
            .header("x-api-key", &self.api_key)
            .header("content-type", content_type)
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::upstream("Image upload failed")
                .with_details(format!("primary store returned {}", response.status())));
        }
        Ok(format!("primary:{}", key))
    }

    async fn fetch(&self, key: &str) -> Result<FetchedObject> {
        let response = self
            .client
            .get(format!("{}/{}", self.endpoint, key))
            .header("x-api-key", &self.api_key)
            .send()
            .await?;

        if response.status().as_u16() == 404 {
            return Err(Error::not_found("Image not found"));
        }
        if !response.status().is_success() {
            return Err(Error::upstream("Image fetch failed")
                .with_details(format!("primary store returned {}", response.status())));
        }

        let content_type = header_content_type(&response);
        Ok(FetchedObject {
            bytes: response.bytes().await?,
            content_type,
        })
    }
}

// ---- secondary HTTP store (short-lived token) ----

/// Tokens are valid for about 30 minutes; refresh a little early so
/// in-flight requests never straddle the expiry.
const TOKEN_LIFETIME: Duration = Duration::from_secs(25 * 60);

struct CachedToken {
    value: String,
    acquired_at: Instant,
}

pub struct SecondaryStore {
    client: reqwest::Client,
    endpoint: String,
    key_id: String,
    key_secret: String,
    token: RwLock<Option<CachedToken>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

impl SecondaryStore {
    pub fn new(endpoint: String, key_id: String, key_secret: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            key_id,
            key_secret,
            token: RwLock::new(None),
        }
    }

    async fn current_token(&self) -> Result<String> {
        {
            let guard = self.token.read().await;
            if let Some(cached) = guard.as_ref() {
                if cached.acquired_at.elapsed() < TOKEN_LIFETIME {
                    return Ok(cached.value.clone());
                }
            }
        }
        self.refresh_token().await
    }

    async fn refresh_token(&self) -> Result<String> {
        let mut guard = self.token.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(cached) = guard.as_ref() {
            if cached.acquired_at.elapsed() < TOKEN_LIFETIME {
                return Ok(cached.value.clone());
            }
        }

        let response = self
            .client
            .post(format!("{}/auth/token", self.endpoint))
            .json(&serde_json::json!({
                "key_id": self.key_id,
                "key_secret": self.key_secret,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::upstream("Object store authentication failed")
                .with_details(format!("secondary store returned {}", response.status())));
        }

        let parsed: TokenResponse = response.json().await?;
        debug!("Secondary store token refreshed");
        *guard = Some(CachedToken {
            value: parsed.token.clone(),
            acquired_at: Instant::now(),
        });
        Ok(parsed.token)
    }

    async fn invalidate_token(&self) {
        *self.token.write().await = None;
    }

    async fn send_with_auth(
        &self,
        build: impl Fn(&str) -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        let token = self.current_token().await?;
        let response = build(&token).send().await?;

        // Expired or revoked token: refresh once and retry.
        if matches!(response.status().as_u16(), 401 | 403) {
            self.invalidate_token().await;
            let token = self.current_token().await?;
            return Ok(build(&token).send().await?);
        }
        Ok(response)
    }
}

#[async_trait]
impl ObjectStore for SecondaryStore {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<String> {
        let url = format!("{}/objects/{}", self.endpoint, key);
        let response = self
            .send_with_auth(|token| {
                self.client
                    .put(&url)
                    .bearer_auth(token)
                    .header("content-type", content_type)
                    .body(bytes.clone())
            })
            .await?;

        if !response.status().is_success() {
            return Err(Error::upstream("Image upload failed")
                .with_details(format!("secondary store returned {}", response.status())));
        }
        Ok(format!("secondary:{}", key))
    }

    async fn fetch(&self, key: &str) -> Result<FetchedObject> {
        let url = format!("{}/objects/{}", self.endpoint, key);
        let response = self
            .send_with_auth(|token| self.client.get(&url).bearer_auth(token))
            .await?;

        if response.status().as_u16() == 404 {
            return Err(Error::not_found("Image not found"));
        }
        if !response.status().is_success() {
            return Err(Error::upstream("Image fetch failed")
                .with_details(format!("secondary store returned {}", response.status())));
        }

        let content_type = header_content_type(&response);
        Ok(FetchedObject {
            bytes: response.bytes().await?,
            content_type,
        })
    }
}

fn header_content_type(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string()
}

// ---- dispatch ----

/// Routes stored references to the right backend and streams external URLs
/// through directly. Also decides where new uploads go.
pub struct ImageStore {
    local: LocalStore,
    primary: Option<PrimaryStore>,
    secondary: Option<Arc<SecondaryStore>>,
    http: reqwest::Client,
    upload_backend: StoreKind,
}

impl ImageStore {
    pub fn new(config: &StorageConfig) -> Self {
        let primary = (!config.primary_endpoint.is_empty()).then(|| {
            PrimaryStore::new(config.primary_endpoint.clone(), config.primary_api_key.clone())
        });
        let secondary = (!config.secondary_endpoint.is_empty()).then(|| {
            Arc::new(SecondaryStore::new(
                config.secondary_endpoint.clone(),
                config.secondary_key_id.clone(),
                config.secondary_key_secret.clone(),
            ))
        });
        let upload_backend = match config.backend.as_str() {
            "primary" => StoreKind::Primary,
            "secondary" => StoreKind::Secondary,
            _ => StoreKind::Local,
        };

        Self {
            local: LocalStore::new(config.local_root.clone()),
            primary,
            secondary,
            http: reqwest::Client::new(),
            upload_backend,
        }
    }

    /// Uploads to the configured backend and returns the reference to
    /// persist on the attendance or employee row.
    pub async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<String> {
        match self.upload_backend {
            StoreKind::Primary => match &self.primary {
                Some(store) => store.put(key, bytes, content_type).await,
                None => Err(Error::internal("Primary object store is not configured")),
            },
            StoreKind::Secondary => match &self.secondary {
                Some(store) => store.put(key, bytes, content_type).await,
                None => Err(Error::internal("Secondary object store is not configured")),
            },
            _ => self.local.put(key, bytes, content_type).await,
        }
    }

    /// Fetches any stored reference, whichever backend it lives in.
    pub async fn fetch(&self, reference: &str) -> Result<FetchedObject> {
        match classify(reference) {
            (StoreKind::Local, key) => self.local.fetch(key).await,
            (StoreKind::Primary, key) => match &self.primary {
                Some(store) => store.fetch(key).await,
                None => Err(Error::internal("Primary object store is not configured")),
            },
            (StoreKind::Secondary, key) => match &self.secondary {
                Some(store) => store.fetch(key).await,
                None => Err(Error::internal("Secondary object store is not configured")),
            },
            (StoreKind::External, url) => {
                let response = self.http.get(url).send().await?;
                if response.status().as_u16() == 404 {
                    return Err(Error::not_found("Image not found"));
                }
                if !response.status().is_success() {
                    return Err(Error::upstream("Image fetch failed")
                        .with_details(format!("external origin returned {}", response.status())));
                }
                let content_type = header_content_type(&response);
                Ok(FetchedObject {
                    bytes: response.bytes().await?,
                    content_type,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_by_reference_shape() {
        assert_eq!(
            classify("primary:2023/06/15/a/b/in_x_b.jpg"),
            (StoreKind::Primary, "2023/06/15/a/b/in_x_b.jpg")
        );
        assert_eq!(classify("secondary:k.jpg"), (StoreKind::Secondary, "k.jpg"));
        assert_eq!(
            classify("https://cdn.example.com/x.jpg"),
            (StoreKind::External, "https://cdn.example.com/x.jpg")
        );
        assert_eq!(
            classify("2023/06/15/a/b/in_x_b.jpg"),
            (StoreKind::Local, "2023/06/15/a/b/in_x_b.jpg")
        );
    }

    #[test]
    fn basename_is_last_segment() {
        assert_eq!(basename("2023/06/15/ravi/mg-road/in_t_mg-road.jpg"), "in_t_mg-road.jpg");
        assert_eq!(basename("flat.jpg"), "flat.jpg");
    }

    #[test]
    fn local_store_rejects_traversal() {
        let store = LocalStore::new("/tmp/attendance-test");
        assert!(store.resolve("../etc/passwd").is_err());
        assert!(store.resolve("/etc/passwd").is_err());
        assert!(store.resolve("2023/06/15/ok.jpg").is_ok());
    }

    #[tokio::test]
    async fn local_store_round_trip() {
        let root = std::env::temp_dir().join("attend-store-test");
        let store = LocalStore::new(&root);
        let reference = store
            .put("2023/06/15/a/b/in_t_b.jpg", Bytes::from_static(b"jpegbytes"), DEFAULT_CONTENT_TYPE)
            .await
            .unwrap();
        assert_eq!(reference, "2023/06/15/a/b/in_t_b.jpg");

        let fetched = store.fetch(&reference).await.unwrap();
        assert_eq!(fetched.bytes.as_ref(), b"jpegbytes");
        assert_eq!(fetched.content_type, DEFAULT_CONTENT_TYPE);

        let _ = tokio::fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn local_store_missing_key_is_not_found() {
        let store = LocalStore::new(std::env::temp_dir().join("attend-store-empty"));
        let err = store.fetch("nope/missing.jpg").await.unwrap_err();
        assert_eq!(err.http_status(), 404);
    }
}
