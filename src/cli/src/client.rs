//! HTTP client for communicating with the Warden API server.

use anyhow::{Context, Result};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Success envelope returned by the server.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
}

/// Error envelope returned by the server.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// A non-success response from the API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message} ({code}, HTTP {status})")]
    Rejected {
        status: StatusCode,
        code: String,
        message: String,
    },

    #[error("HTTP {status}: {body}")]
    Unexpected { status: StatusCode, body: String },
}

impl ApiError {
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Rejected { code, .. } => Some(code),
            Self::Unexpected { .. } => None,
        }
    }
}

/// HTTP client for the Warden API.
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client pointing at the given base URL.
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Return the configured base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, label: &str) -> Result<Response> {
        let resp = builder
            .send()
            .await
            .with_context(|| format!("{} failed", label))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        let err = match serde_json::from_str::<ErrorEnvelope>(&body) {
            Ok(envelope) => ApiError::Rejected {
                status,
                code: envelope.error.code,
                message: envelope.error.message,
            },
            Err(_) => ApiError::Unexpected { status, body },
        };
        Err(err.into())
    }

    async fn data<T: DeserializeOwned>(resp: Response, label: &str) -> Result<T> {
        let api_resp: ApiResponse<T> = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", label))?;

        if !api_resp.success {
            anyhow::bail!("{} reported failure without an error body", label);
        }
        api_resp
            .data
            .ok_or_else(|| anyhow::anyhow!("API returned success but no data"))
    }

    /// Perform a GET request and deserialize the response data.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let label = format!("GET {}", path);
        let resp = self.send(self.request(Method::GET, path), &label).await?;
        Self::data(resp, &label).await
    }

    /// Perform a POST request with a JSON body and deserialize the response.
    pub async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let label = format!("POST {}", path);
        let resp = self
            .send(self.request(Method::POST, path).json(body), &label)
            .await?;
        Self::data(resp, &label).await
    }

    /// Perform a PUT request with a JSON body and deserialize the response.
    pub async fn put<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let label = format!("PUT {}", path);
        let resp = self
            .send(self.request(Method::PUT, path).json(body), &label)
            .await?;
        Self::data(resp, &label).await
    }

    /// Perform a DELETE request. The server answers with an empty 204.
    pub async fn delete(&self, path: &str) -> Result<()> {
        let label = format!("DELETE {}", path);
        self.send(self.request(Method::DELETE, path), &label).await?;
        Ok(())
    }

    /// Perform a raw GET and return the JSON body regardless of status.
    ///
    /// `/health` answers 503 with a full report when storage is down.
    pub async fn get_raw(&self, path: &str) -> Result<serde_json::Value> {
        let label = format!("GET {}", path);
        let resp = self
            .request(Method::GET, path)
            .send()
            .await
            .with_context(|| format!("{} failed", label))?;
        resp.json()
            .await
            .with_context(|| format!("Failed to parse response from {}", label))
    }
}
