//! REST client for the remote Collection Store.
//!
//! Uses `reqwest` with default headers built once, and `url` for route
//! construction so product IDs are percent-encoded as path segments.

use std::sync::Arc;

use basket_core::{CollectionEntry, CollectionKind, Identity, ProductId};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use super::{AddRequest, AddResponse, CollectionStore, FetchResponse, StatusResponse, UpdateRequest};
use crate::config::StoreConfig;
use crate::error::{Result, SyncError};

/// Longest response body excerpt included in logs and errors.
const BODY_EXCERPT_CHARS: usize = 200;

/// Client for the Collection Store REST API.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct HttpCollectionStore {
    inner: Arc<HttpCollectionStoreInner>,
}

struct HttpCollectionStoreInner {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpCollectionStore {
    /// Create a new Collection Store client.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is not a valid header value or the HTTP
    /// client fails to build.
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(token) = &config.token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
                .map_err(|e| SyncError::Transport(format!("Invalid store token format: {e}")))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            inner: Arc::new(HttpCollectionStoreInner {
                client,
                base_url: config.base_url.clone(),
            }),
        })
    }

    /// Build `{base}/collections/{name}/{segments..}`.
    fn route(&self, kind: CollectionKind, segments: &[&str]) -> Result<Url> {
        let mut url = self.inner.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| SyncError::Transport("store URL cannot be a base".to_string()))?;
            path.pop_if_empty().push("collections").push(kind.as_str());
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    fn route_for(&self, kind: CollectionKind, segments: &[&str], identity: &Identity) -> Result<Url> {
        let mut url = self.route(kind, segments)?;
        url.query_pairs_mut()
            .append_pair("identity", identity.as_str());
        Ok(url)
    }

    /// Read a response, mapping non-success statuses and `success: false`
    /// bodies to [`SyncError::Rejected`].
    async fn read<R>(response: reqwest::Response) -> Result<R>
    where
        R: DeserializeOwned + Acknowledged,
    {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<StatusResponse>(&body)
                .ok()
                .and_then(|r| r.message)
                .unwrap_or_else(|| {
                    format!(
                        "HTTP {status}: {}",
                        body.chars().take(BODY_EXCERPT_CHARS).collect::<String>()
                    )
                });
            return Err(SyncError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: R = serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %body.chars().take(BODY_EXCERPT_CHARS).collect::<String>(),
                "Failed to parse collection store response"
            );
            SyncError::Decode(e.to_string())
        })?;

        if !parsed.success() {
            return Err(SyncError::Rejected {
                status: status.as_u16(),
                message: parsed
                    .message()
                    .unwrap_or("Collection store reported failure")
                    .to_string(),
            });
        }

        Ok(parsed)
    }
}

/// Common `{success, message}` envelope of every response.
trait Acknowledged {
    fn success(&self) -> bool;
    fn message(&self) -> Option<&str>;
}

impl<T> Acknowledged for FetchResponse<T> {
    fn success(&self) -> bool {
        self.success
    }

    fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl<T> Acknowledged for AddResponse<T> {
    fn success(&self) -> bool {
        self.success
    }

    fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl Acknowledged for StatusResponse {
    fn success(&self) -> bool {
        self.success
    }

    fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl CollectionStore for HttpCollectionStore {
    #[instrument(skip(self), fields(collection = %T::KIND, identity = %identity))]
    async fn fetch<T: CollectionEntry>(&self, identity: &Identity) -> Result<Vec<T>> {
        let url = self.route_for(T::KIND, &[], identity)?;
        let response = self.inner.client.get(url).send().await?;
        let body: FetchResponse<T> = Self::read(response).await?;

        let items = body.items.unwrap_or_default();
        debug!(count = items.len(), "Fetched collection");
        Ok(items)
    }

    #[instrument(skip(self), fields(collection = %T::KIND, identity = %identity, product_id = %id))]
    async fn add<T: CollectionEntry>(
        &self,
        identity: &Identity,
        id: &ProductId,
        quantity: Option<u32>,
    ) -> Result<Option<T>> {
        let url = self.route(T::KIND, &["add"])?;
        let request = AddRequest {
            identity: identity.as_str().to_string(),
            id: id.clone(),
            quantity,
        };

        let response = self.inner.client.post(url).json(&request).send().await?;
        let body: AddResponse<T> = Self::read(response).await?;
        Ok(body.item)
    }

    #[instrument(skip(self), fields(collection = %kind, identity = %identity, product_id = %id))]
    async fn update(
        &self,
        kind: CollectionKind,
        identity: &Identity,
        id: &ProductId,
        quantity: u32,
    ) -> Result<()> {
        let url = self.route(kind, &["update", id.as_str()])?;
        let request = UpdateRequest {
            identity: identity.as_str().to_string(),
            quantity,
        };

        let response = self.inner.client.put(url).json(&request).send().await?;
        let _: StatusResponse = Self::read(response).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(collection = %kind, identity = %identity, product_id = %id))]
    async fn remove(&self, kind: CollectionKind, identity: &Identity, id: &ProductId) -> Result<()> {
        let url = self.route_for(kind, &["remove", id.as_str()], identity)?;
        let response = self.inner.client.delete(url).send().await?;
        let _: StatusResponse = Self::read(response).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(collection = %kind, identity = %identity))]
    async fn clear(&self, kind: CollectionKind, identity: &Identity) -> Result<()> {
        let url = self.route_for(kind, &["clear"], identity)?;
        let response = self.inner.client.delete(url).send().await?;
        let _: StatusResponse = Self::read(response).await?;
        Ok(())
    }
}
