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

use llm_contracts::{LLMError, Provider, ProviderConfig, TextGenerator};
use serde_json::json;
use std::time::Duration;
use steel::llm::{GeminiClient, OllamaClient, RetryPolicy};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        base_delay: Duration::from_millis(5),
    }
}

fn gemini_config(server: &MockServer) -> ProviderConfig {
    std::env::set_var("STEEL_HTTP_TEST_KEY", "secret");
    ProviderConfig {
        base_url: Some(server.uri()),
        api_key_env: "STEEL_HTTP_TEST_KEY".to_string(),
        timeout_seconds: 5,
        ..ProviderConfig::default()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_gemini_retries_rate_limit_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-2.0-flash:generateContent"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-2.0-flash:generateContent"))
        .and(header("x-goog-api-key", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": "planned"}]}}]
        })))
        .mount(&server)
        .await;

    let config = gemini_config(&server);
    let reply = tokio::task::spawn_blocking(move || {
        GeminiClient::with_retry(&config, fast_retry(2))?.generate("plan")
    })
    .await
    .unwrap()
    .unwrap();
    assert_eq!(reply.text, "planned");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .expect(1)
        .mount(&server)
        .await;

    let config = gemini_config(&server);
    let result = tokio::task::spawn_blocking(move || {
        GeminiClient::with_retry(&config, fast_retry(3))?.generate("plan")
    })
    .await
    .unwrap();
    assert!(matches!(result, Err(LLMError::Provider(message)) if message.contains("400")));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ollama_chat_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": {"role": "assistant", "content": "hello"},
            "done": true
        })))
        .mount(&server)
        .await;

    let config = ProviderConfig {
        provider: Provider::Ollama,
        model: "llama3".to_string(),
        base_url: Some(server.uri()),
        ..ProviderConfig::default()
    };
    let reply = tokio::task::spawn_blocking(move || {
        OllamaClient::with_retry(&config, fast_retry(0))?.generate("hi")
    })
    .await
    .unwrap()
    .unwrap();
    assert_eq!(reply.text, "hello");
}
