//! Adapter for the external face-matching service.
//!
//! The service owns the gallery ("collection") employees are enrolled into.
//! All traffic goes through the [`FaceService`] trait so the pipeline can be
//! exercised against a stub in tests.

use crate::imaging::FaceBox;
use attend_core::config::FaceConfig;
use attend_core::{Error, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// A gallery hit for a probe image.
#[derive(Debug, Clone)]
pub struct FaceMatch {
    pub face_id: String,
    /// External id supplied at enrolment time (an employee id).
    pub external_id: Option<String>,
    /// Similarity percentage, 0..100.
    pub similarity: f32,
}

/// Result of enrolling a reference image.
#[derive(Debug, Clone)]
pub struct IndexedFace {
    pub face_id: String,
    pub confidence: f32,
}

#[async_trait]
pub trait FaceService: Send + Sync {
    /// Enrols a reference image under an external id and returns the gallery
    /// face id.
    async fn index_face(&self, external_id: &str, image: &[u8]) -> Result<IndexedFace>;

    /// Searches the gallery with a probe image; hits below `threshold` are
    /// filtered out. Empty result means nothing matched.
    async fn search(&self, image: &[u8], threshold: f32) -> Result<Vec<FaceMatch>>;

    /// Pairwise similarity (0..100) between two images.
    async fn compare(&self, source: &[u8], target: &[u8]) -> Result<f32>;

    /// All face bounding boxes in a frame, as fractional coordinates.
    async fn detect(&self, image: &[u8]) -> Result<Vec<FaceBox>>;

    /// Removes an enrolled face from the gallery.
    async fn delete_face(&self, face_id: &str) -> Result<()>;
}

/// HTTP-backed implementation.
pub struct HttpFaceService {
    client: reqwest::Client,
    config: FaceConfig,
    collection_ready: AtomicBool,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    face_id: String,
    external_id: Option<String>,
    similarity: f32,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    matches: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct IndexResponse {
    face_id: String,
    confidence: f32,
}

#[derive(Debug, Deserialize)]
struct CompareResponse {
    similarity: f32,
}

#[derive(Debug, Deserialize)]
struct DetectBox {
    left: f32,
    top: f32,
    width: f32,
    height: f32,
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    faces: Vec<DetectBox>,
}

impl HttpFaceService {
    pub fn new(config: FaceConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            collection_ready: AtomicBool::new(false),
        }
    }

    /// Creates the collection if this process has not confirmed it yet. The
    /// remote call is idempotent; the flag only suppresses repeats.
    async fn ensure_collection(&self) -> Result<()> {
        if self.collection_ready.load(Ordering::Acquire) {
            return Ok(());
        }

        let response = self
            .client
            .post(format!("{}/collections", self.config.endpoint))
            .bearer_auth(&self.config.api_key)
            .json(&serde_json::json!({ "name": self.config.collection }))
            .send()
            .await?;

        // 409 means it already exists, which is exactly what we want.
        if !response.status().is_success() && response.status().as_u16() != 409 {
            return Err(classify_face_error(
                response.status().as_u16(),
                &response.text().await.unwrap_or_default(),
            ));
        }

        self.collection_ready.store(true, Ordering::Release);
        debug!("Face collection {} confirmed", self.config.collection);
        Ok(())
    }

    fn encode(image: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(image)
    }

    async fn post_json(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}{}", self.config.endpoint, path))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_face_error(status, &body));
        }

        Ok(response)
    }
}

#[async_trait]
impl FaceService for HttpFaceService {
    async fn index_face(&self, external_id: &str, image: &[u8]) -> Result<IndexedFace> {
        self.ensure_collection().await?;

        let response = self
            .post_json(
                "/faces/index",
                serde_json::json!({
                    "collection": self.config.collection,
                    "external_id": external_id,
                    "image": Self::encode(image),
                }),
            )
            .await?;

        let indexed: IndexResponse = response.json().await?;
        Ok(IndexedFace {
            face_id: indexed.face_id,
            confidence: indexed.confidence,
        })
    }

    async fn search(&self, image: &[u8], threshold: f32) -> Result<Vec<FaceMatch>> {
        self.ensure_collection().await?;

        let response = self
            .post_json(
                "/faces/search",
                serde_json::json!({
                    "collection": self.config.collection,
                    "image": Self::encode(image),
                    "threshold": threshold,
                }),
            )
            .await?;

        let parsed: SearchResponse = response.json().await?;
        Ok(parsed
            .matches
            .into_iter()
            .filter(|hit| hit.similarity >= threshold)
            .map(|hit| FaceMatch {
                face_id: hit.face_id,
                external_id: hit.external_id,
                similarity: hit.similarity,
            })
            .collect())
    }

    async fn compare(&self, source: &[u8], target: &[u8]) -> Result<f32> {
        let response = self
            .post_json(
                "/faces/compare",
                serde_json::json!({
                    "source": Self::encode(source),
                    "target": Self::encode(target),
                }),
            )
            .await?;

        let parsed: CompareResponse = response.json().await?;
        Ok(parsed.similarity)
    }

    async fn detect(&self, image: &[u8]) -> Result<Vec<FaceBox>> {
        let response = self
            .post_json(
                "/faces/detect",
                serde_json::json!({ "image": Self::encode(image) }),
            )
            .await?;

        let parsed: DetectResponse = response.json().await?;
        Ok(parsed
            .faces
            .into_iter()
            .map(|b| FaceBox {
                left: b.left,
                top: b.top,
                width: b.width,
                height: b.height,
            })
            .collect())
    }

    async fn delete_face(&self, face_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(format!(
                "{}/collections/{}/faces/{}",
                self.config.endpoint, self.config.collection, face_id
            ))
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;

        if !response.status().is_success() && response.status().as_u16() != 404 {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_face_error(status, &body));
        }

        Ok(())
    }
}

/// Maps face-service failures onto the platform error kinds: no detectable
/// face is a client problem, a missing collection is a deployment problem,
/// anything else is the upstream's fault.
pub fn classify_face_error(status: u16, body: &str) -> Error {
    let lowered = body.to_lowercase();
    if lowered.contains("no face") || lowered.contains("face not detected") {
        return Error::unprocessable("No face detected in the image");
    }
    if lowered.contains("collection") && lowered.contains("not found") {
        return Error::internal("Face collection missing")
            .with_details("the configured collection does not exist on the face service");
    }
    Error::upstream(format!("Face service error ({})", status)).with_details(body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use attend_core::ErrorKind;

    #[test]
    fn no_face_maps_to_unprocessable() {
        let err = classify_face_error(400, r#"{"error":"No face detected in request image"}"#);
        assert_eq!(err.kind, ErrorKind::Unprocessable);
        assert_eq!(err.http_status(), 422);
    }

    #[test]
    fn missing_collection_maps_to_internal() {
        let err = classify_face_error(404, r#"{"error":"collection 'employees' not found"}"#);
        assert_eq!(err.kind, ErrorKind::Internal);
    }

    #[test]
    fn other_failures_map_to_upstream() {
        let err = classify_face_error(503, "service unavailable");
        assert_eq!(err.kind, ErrorKind::Upstream);
        assert_eq!(err.http_status(), 502);
    }
}
