//! Rate-limited HTTP client for the REST directory back-end

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

use thand_core::{ProviderError, ThandResult};

use super::types::ApiError;

/// JSON directory API client with request throttling.
pub struct RestClient {
    client: Client,
    provider: String,
    base_url: String,
    api_token: String,
    rate_limiter: Arc<Semaphore>,
    next_slot: Mutex<Instant>,
    min_request_interval: Duration,
}

impl RestClient {
    /// Create a client bound to one provider instance.
    ///
    /// # Arguments
    /// * `provider` - instance name used in error attribution
    /// * `base_url` - directory API root
    /// * `api_token` - bearer token
    /// * `requests_per_minute` - throttle ceiling
    pub fn new(
        provider: impl Into<String>,
        base_url: impl Into<String>,
        api_token: impl Into<String>,
        requests_per_minute: u32,
    ) -> Self {
        let requests_per_minute = requests_per_minute.max(1);
        let permits = requests_per_minute as usize;
        let min_interval = Duration::from_millis((60_000 / requests_per_minute as u64).max(10));

        Self {
            client: Client::new(),
            provider: provider.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token: api_token.into(),
            rate_limiter: Arc::new(Semaphore::new(permits)),
            next_slot: Mutex::new(Instant::now()),
            min_request_interval: min_interval,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn get<Res: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> ThandResult<Res> {
        let builder = self.client.get(self.url(path)).query(query);
        self.execute(path, builder).await
    }

    pub async fn post<Req: Serialize, Res: DeserializeOwned>(
        &self,
        path: &str,
        body: &Req,
    ) -> ThandResult<Res> {
        let builder = self.client.post(self.url(path)).json(body);
        self.execute(path, builder).await
    }

    pub async fn patch<Req: Serialize, Res: DeserializeOwned>(
        &self,
        path: &str,
        body: &Req,
    ) -> ThandResult<Res> {
        let builder = self.client.patch(self.url(path)).json(body);
        self.execute(path, builder).await
    }

    pub async fn delete(&self, path: &str) -> ThandResult<()> {
        let builder = self.client.request(Method::DELETE, self.url(path));
        let _: serde_json::Value = self.execute(path, builder).await?;
        Ok(())
    }

    /// Run a request through the throttle and map the response.
    async fn execute<Res: DeserializeOwned>(
        &self,
        path: &str,
        builder: RequestBuilder,
    ) -> ThandResult<Res> {
        let _permit = self.rate_limiter.acquire().await.map_err(|err| {
            ProviderError::Misconfigured {
                provider: self.provider.clone(),
                reason: format!("rate limiter closed: {err}"),
            }
        })?;

        // Enforce the minimum interval between requests: claim the next
        // slot under the lock, sleep outside it.
        let wait = {
            let mut next_slot = self.next_slot.lock().unwrap();
            let now = Instant::now();
            let wait = next_slot.saturating_duration_since(now);
            *next_slot = now.max(*next_slot) + self.min_request_interval;
            wait
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }

        let response = builder
            .bearer_auth(&self.api_token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|err| ProviderError::RequestFailed {
                provider: self.provider.clone(),
                status: 0,
                message: format!("request failed: {err}"),
            })?;

        let status = response.status();
        if status.is_success() {
            // Empty bodies (DELETE and friends) decode as null.
            let bytes = response.bytes().await.map_err(|err| {
                ProviderError::RequestFailed {
                    provider: self.provider.clone(),
                    status: status.as_u16(),
                    message: format!("failed to read response: {err}"),
                }
            })?;
            let slice: &[u8] = if bytes.is_empty() { b"null" } else { &bytes };
            return serde_json::from_slice(slice).map_err(|err| {
                ProviderError::RequestFailed {
                    provider: self.provider.clone(),
                    status: status.as_u16(),
                    message: format!("failed to parse response: {err}"),
                }
                .into()
            });
        }

        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ApiError>(&body)
            .map(|api_error| api_error.error)
            .unwrap_or_default();
        let message = if detail.message.is_empty() {
            body
        } else {
            detail.message
        };

        Err(match status {
            StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited {
                provider: self.provider.clone(),
            },
            StatusCode::CONFLICT => ProviderError::AlreadyAssigned {
                provider: self.provider.clone(),
                code: detail.code,
            },
            StatusCode::NOT_FOUND => ProviderError::EndpointNotFound {
                provider: self.provider.clone(),
                path: path.to_string(),
            },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Misconfigured {
                provider: self.provider.clone(),
                reason: format!("authentication rejected ({status}): {message}"),
            },
            _ => ProviderError::RequestFailed {
                provider: self.provider.clone(),
                status: status.as_u16(),
                message,
            },
        }
        .into())
    }
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("api_token", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining() {
        let client = RestClient::new("rest-dev", "https://dir.example.com/api/", "tok", 60);
        assert_eq!(client.url("/users"), "https://dir.example.com/api/users");
        assert_eq!(client.url("users"), "https://dir.example.com/api/users");
    }

    #[test]
    fn test_debug_redacts_token() {
        let client = RestClient::new("rest-dev", "https://dir.example.com", "secret", 60);
        let rendered = format!("{client:?}");
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
