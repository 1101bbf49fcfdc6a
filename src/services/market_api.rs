use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::modules::market::model::Listing;
use crate::modules::task::model::TaskKey;

/// Source of market listings for one task.
#[async_trait]
pub trait MarketFetcher: Send + Sync {
    async fn fetch(&self, key: TaskKey) -> Result<Vec<Listing>, FetchError>;

    /// Drops pooled connections so a request abandoned mid-flight cannot leave
    /// a half-read socket behind for the next call.
    fn reset(&self);
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("HTTP error for {url}: {message}")]
    Http { url: String, message: String },

    #[error("API returned status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Malformed response from {url}: {message}")]
    Decode { url: String, message: String },
}

/// HTTP client for the game's market endpoint.
pub struct MarketApiClient {
    client: RwLock<Client>,
    url_template: String,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl MarketApiClient {
    pub fn new(url_template: String, connect_timeout: Duration, read_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = build_client(connect_timeout, read_timeout)?;
        Ok(Self {
            client: RwLock::new(client),
            url_template,
            connect_timeout,
            read_timeout,
        })
    }

    pub fn url_for(&self, key: TaskKey) -> String {
        self.url_template
            .replace("{server_type}", &key.server_type.to_string())
            .replace("{product_type}", &key.product_type.to_string())
    }

    fn client(&self) -> Client {
        match self.client.read() {
            Ok(client) => client.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

fn build_client(connect_timeout: Duration, read_timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .read_timeout(read_timeout)
        .timeout(connect_timeout + read_timeout)
        .build()
}

#[async_trait]
impl MarketFetcher for MarketApiClient {
    async fn fetch(&self, key: TaskKey) -> Result<Vec<Listing>, FetchError> {
        let url = self.url_for(key);
        tracing::debug!(url = %url, "Requesting market listings");

        let response = self.client().get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout { url: url.clone() }
            } else {
                FetchError::Http {
                    url: url.clone(),
                    message: e.to_string(),
                }
            }
        })?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url,
                status: response.status().as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout { url: url.clone() }
            } else {
                FetchError::Http {
                    url: url.clone(),
                    message: e.to_string(),
                }
            }
        })?;

        serde_json::from_slice::<Vec<Listing>>(&body).map_err(|e| FetchError::Decode {
            url,
            message: e.to_string(),
        })
    }

    fn reset(&self) {
        match build_client(self.connect_timeout, self.read_timeout) {
            Ok(fresh) => match self.client.write() {
                Ok(mut client) => *client = fresh,
                Err(poisoned) => *poisoned.into_inner() = fresh,
            },
            Err(e) => tracing::error!(error = %e, "Failed to rebuild market API client"),
        }
    }
}
