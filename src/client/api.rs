//! Remote Backend Client
//!
//! CRUD access to the item and outfit collections on the backend. The
//! service layer talks to [`RemoteCollection`] only, so tests can swap the
//! HTTP client for an in-process fake.
//!
//! Endpoints, relative to the configured server URL:
//!
//! | Operation | Request |
//! |---|---|
//! | list   | `GET    /api/v1/{resource}?user_id={id}` |
//! | create | `POST   /api/v1/{resource}` |
//! | update | `PATCH  /api/v1/{resource}/{id}` |
//! | delete | `DELETE /api/v1/{resource}/{id}` |

use crate::client::config::Config;
use crate::shared::wardrobe::Entity;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use thiserror::Error;

/// Failure of a single backend call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Transport failure; the server may never have seen the request
    #[error("network error: {0}")]
    Network(String),
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RemoteError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            RemoteError::Server {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            RemoteError::Network(err.to_string())
        }
    }
}

/// Remote CRUD over one entity collection
#[async_trait]
pub trait RemoteCollection<T: Entity>: Send + Sync {
    async fn list(&self, user_id: &str) -> Result<Vec<T>, RemoteError>;
    /// Returns the stored entity, which may carry a server-assigned id
    async fn create(&self, entity: &T) -> Result<T, RemoteError>;
    async fn update(&self, entity: &T) -> Result<T, RemoteError>;
    async fn delete(&self, id: &str) -> Result<(), RemoteError>;
}

/// reqwest-backed implementation of [`RemoteCollection`] for every entity kind
#[derive(Debug, Clone)]
pub struct HttpBackend {
    config: Config,
    client: Client,
}

impl HttpBackend {
    pub fn new(config: Config) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| RemoteError::Network(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn collection_url<T: Entity>(&self) -> String {
        self.config
            .api_url(&format!("/api/v1/{}", T::KIND.resource()))
    }

    /// Collection url plus `id` as one percent-encoded path segment
    fn entity_url<T: Entity>(&self, id: &str) -> Result<Url, RemoteError> {
        let mut url = Url::parse(&self.collection_url::<T>())
            .map_err(|e| RemoteError::Network(format!("invalid server url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| RemoteError::Network("server url cannot have a path".to_string()))?
            .push(id);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.config.get_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response, RemoteError> {
        let response = self.authorize(request).send().await?;
        check_status(response, what).await
    }
}

async fn check_status(response: Response, what: &str) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::NOT_FOUND {
        return Err(RemoteError::NotFound(what.to_string()));
    }
    let message = if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body
    };
    Err(RemoteError::Server {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl<T: Entity> RemoteCollection<T> for HttpBackend {
    async fn list(&self, user_id: &str) -> Result<Vec<T>, RemoteError> {
        let request = self
            .client
            .get(self.collection_url::<T>())
            .query(&[("user_id", user_id)]);
        let response = self.send(request, T::KIND.resource()).await?;
        Ok(response.json::<Vec<T>>().await?)
    }

    async fn create(&self, entity: &T) -> Result<T, RemoteError> {
        let request = self.client.post(self.collection_url::<T>()).json(entity);
        let response = self.send(request, entity.id()).await?;
        Ok(response.json::<T>().await?)
    }

    async fn update(&self, entity: &T) -> Result<T, RemoteError> {
        let request = self
            .client
            .patch(self.entity_url::<T>(entity.id())?)
            .json(entity);
        let response = self.send(request, entity.id()).await?;
        Ok(response.json::<T>().await?)
    }

    async fn delete(&self, id: &str) -> Result<(), RemoteError> {
        let request = self.client.delete(self.entity_url::<T>(id)?);
        self.send(request, id).await?;
        tracing::debug!("Deleted remote {} {}", T::KIND, id);
        Ok(())
    }
}
