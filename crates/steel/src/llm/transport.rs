// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use llm_contracts::{LLMError, LLMResult};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde_json::Value;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How often a failed request is repeated and how long to wait between tries.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_secs(1),
        }
    }

    /// Exponential backoff, capped at 32 times the base delay.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2_u32.pow(attempt.min(5))
    }
}

/// A blocking JSON-over-HTTP client shared by the providers.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    provider: &'static str,
    retry: RetryPolicy,
}

impl HttpTransport {
    pub fn new(provider: &'static str, timeout: Duration, retry: RetryPolicy) -> LLMResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LLMError::Configuration(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            provider,
            retry,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Posts `payload` and returns the decoded JSON body.
    ///
    /// Rate limits and transport failures are retried with backoff; any
    /// other client error is returned at once.
    pub fn post_json(&self, url: &str, headers: &[(&str, &str)], payload: &Value) -> LLMResult<Value> {
        let mut last_error = None;

        for attempt in 0..=self.retry.max_retries {
            debug!(
                provider = self.provider,
                attempt = attempt + 1,
                max_attempts = self.retry.max_retries + 1,
                "Sending request"
            );

            let mut request = self
                .client
                .post(url)
                .header("content-type", "application/json")
                .json(payload);
            for (name, value) in headers {
                request = request.header(*name, *value);
            }

            match request.send() {
                Ok(response) => {
                    let status = response.status();
                    info!(provider = self.provider, %status, "Received response");

                    if status.is_success() {
                        return response.json::<Value>().map_err(|e| {
                            LLMError::Serialisation(format!("Failed to parse JSON response: {e}"))
                        });
                    }
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        last_error = Some(LLMError::RateLimit);
                    } else {
                        let body = response.text().unwrap_or_default();
                        let error = if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                            LLMError::Authentication(format!("{} API error {status}: {body}", self.provider))
                        } else {
                            LLMError::Provider(format!("{} API error {status}: {body}", self.provider))
                        };
                        if status.is_client_error() {
                            return Err(error);
                        }
                        last_error = Some(error);
                    }
                }
                Err(e) if e.is_timeout() => {
                    warn!(provider = self.provider, "Request timed out");
                    last_error = Some(LLMError::Timeout);
                }
                Err(e) => {
                    last_error = Some(LLMError::Network(format!("Request failed: {e}")));
                }
            }

            if attempt < self.retry.max_retries {
                let wait = self.retry.delay(attempt);
                warn!(provider = self.provider, ?wait, "Retrying after failure");
                thread::sleep(wait);
            }
        }

        Err(last_error.unwrap_or_else(|| LLMError::Provider(format!("{} request failed", self.provider))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 8,
            base_delay: Duration::from_millis(10),
        };
        assert_eq!(policy.delay(0), Duration::from_millis(10));
        assert_eq!(policy.delay(2), Duration::from_millis(40));
        assert_eq!(policy.delay(9), Duration::from_millis(320));
    }
}
