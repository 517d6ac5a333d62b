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

use llm_contracts::{
    GeneratedText, GenerationConfig, LLMError, LLMResult, ProviderConfig, TextGenerator,
};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::llm::transport::{HttpTransport, RetryPolicy};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct GeminiClient {
    transport: HttpTransport,
    base_url: String,
    model: String,
    api_key: String,
    generation: GenerationConfig,
}

impl GeminiClient {
    pub fn new(config: &ProviderConfig) -> LLMResult<Self> {
        Self::with_retry(config, RetryPolicy::new(config.max_retries))
    }

    pub fn with_retry(config: &ProviderConfig, retry: RetryPolicy) -> LLMResult<Self> {
        let transport = HttpTransport::new(
            "gemini",
            Duration::from_secs(config.timeout_seconds),
            retry,
        )?;
        Ok(Self {
            transport,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: config.model.clone(),
            api_key: config.api_key()?,
            generation: config.generation.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    fn build_payload(&self, prompt: &str) -> Value {
        let mut generation = serde_json::Map::new();
        if let Some(temperature) = self.generation.temperature {
            generation.insert("temperature".into(), json!(temperature));
        }
        if let Some(max_tokens) = self.generation.max_tokens {
            generation.insert("maxOutputTokens".into(), json!(max_tokens));
        }
        if let Some(top_p) = self.generation.top_p {
            generation.insert("topP".into(), json!(top_p));
        }
        if let Some(stop) = &self.generation.stop_sequences {
            generation.insert("stopSequences".into(), json!(stop));
        }

        let mut payload = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }]
            }]
        });
        if !generation.is_empty() {
            payload["generationConfig"] = Value::Object(generation);
        }
        payload
    }
}

/// Pulls the reply text out of a `generateContent` response.
pub(crate) fn extract_text(response: &Value) -> LLMResult<String> {
    if let Some(text) = response["text"].as_str() {
        return Ok(text.to_string());
    }
    let parts = response["candidates"][0]["content"]["parts"]
        .as_array()
        .ok_or_else(|| {
            let reason = response["promptFeedback"]["blockReason"]
                .as_str()
                .or_else(|| response["candidates"][0]["finishReason"].as_str())
                .unwrap_or("no candidates");
            LLMError::Provider(format!("Gemini returned no content ({reason})"))
        })?;
    Ok(parts
        .iter()
        .filter_map(|part| part["text"].as_str())
        .collect::<Vec<_>>()
        .join(""))
}

impl TextGenerator for GeminiClient {
    fn generate(&self, prompt: &str) -> LLMResult<GeneratedText> {
        let payload = self.build_payload(prompt);
        debug!(model = %self.model, prompt_chars = prompt.len(), "Calling Gemini");
        let response = self.transport.post_json(
            &self.endpoint(),
            &[("x-goog-api-key", self.api_key.as_str())],
            &payload,
        )?;
        extract_text(&response).map(GeneratedText::new)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GeminiClient {
        std::env::set_var("STEEL_GEMINI_UNIT_KEY", "test-key");
        let config = ProviderConfig {
            api_key_env: "STEEL_GEMINI_UNIT_KEY".to_string(),
            base_url: Some("http://localhost:9/v1beta/".to_string()),
            ..ProviderConfig::default()
        };
        GeminiClient::new(&config).unwrap()
    }

    #[test]
    fn payload_carries_prompt_and_generation_settings() {
        let payload = client().build_payload("plan a dashboard");
        assert_eq!(payload["contents"][0]["parts"][0]["text"], "plan a dashboard");
        assert!(payload["generationConfig"]["temperature"].is_number());
    }

    #[test]
    fn endpoint_names_the_model() {
        assert_eq!(
            client().endpoint(),
            "http://localhost:9/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn text_field_wins_over_candidates() {
        let response = json!({"text": "direct", "candidates": []});
        assert_eq!(extract_text(&response).unwrap(), "direct");
    }

    #[test]
    fn candidate_parts_are_joined() {
        let response = json!({
            "candidates": [{"content": {"parts": [{"text": "Hello, "}, {"text": "world"}]}}]
        });
        assert_eq!(extract_text(&response).unwrap(), "Hello, world");
    }

    #[test]
    fn blocked_prompt_is_a_provider_error() {
        let response = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        let err = extract_text(&response).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }
}
