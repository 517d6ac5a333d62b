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
    GeneratedText, GenerationConfig, LLMError, LLMResult, ProviderConfig, ProviderRequest,
    TextGenerator,
};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::llm::transport::{HttpTransport, RetryPolicy};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Debug, Clone)]
pub struct OllamaClient {
    transport: HttpTransport,
    base_url: String,
    model: String,
    generation: GenerationConfig,
}

impl OllamaClient {
    pub fn new(config: &ProviderConfig) -> LLMResult<Self> {
        Self::with_retry(config, RetryPolicy::new(config.max_retries))
    }

    pub fn with_retry(config: &ProviderConfig, retry: RetryPolicy) -> LLMResult<Self> {
        let transport = HttpTransport::new(
            "ollama",
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
            generation: config.generation.clone(),
        })
    }

    fn build_ollama_payload(&self, request: &ProviderRequest) -> Value {
        let mut payload = json!({
            "model": request.model,
            "messages": request.messages.iter().map(|msg| {
                json!({
                    "role": msg.role,
                    "content": msg.content
                })
            }).collect::<Vec<_>>(),
            "stream": false
        });

        let mut options = serde_json::Map::new();
        if let Some(max_tokens) = request.max_tokens {
            options.insert("num_predict".into(), json!(max_tokens));
        }
        if let Some(temperature) = request.temperature {
            options.insert("temperature".into(), json!(temperature));
        }
        if let Some(top_p) = request.top_p {
            options.insert("top_p".into(), json!(top_p));
        }
        if let Some(stop) = &request.stop_sequences {
            options.insert("stop".into(), json!(stop));
        }
        if !options.is_empty() {
            payload["options"] = Value::Object(options);
        }

        for (key, value) in &request.provider_specific {
            payload[key] = value.clone();
        }

        payload
    }
}

fn parse_ollama_response(response: &Value) -> LLMResult<String> {
    response["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| {
            LLMError::Provider("Failed to extract content from Ollama response".to_string())
        })
}

impl TextGenerator for OllamaClient {
    fn generate(&self, prompt: &str) -> LLMResult<GeneratedText> {
        let request = ProviderRequest::from_prompt(&self.model, prompt, &self.generation);
        let payload = self.build_ollama_payload(&request);
        debug!(model = %self.model, prompt_chars = prompt.len(), "Calling Ollama");
        let response = self
            .transport
            .post_json(&format!("{}/api/chat", self.base_url), &[], &payload)?;
        parse_ollama_response(&response).map(GeneratedText::new)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OllamaClient {
        let config = ProviderConfig {
            provider: llm_contracts::Provider::Ollama,
            model: "llama3".to_string(),
            ..ProviderConfig::default()
        };
        OllamaClient::new(&config).unwrap()
    }

    #[test]
    fn payload_is_a_single_user_turn() {
        let client = client();
        let request = ProviderRequest::from_prompt("llama3", "hi", &client.generation);
        let payload = client.build_ollama_payload(&request);
        assert_eq!(payload["model"], "llama3");
        assert_eq!(payload["messages"][0]["role"], "user");
        assert_eq!(payload["stream"], false);
        assert!(payload["options"]["temperature"].is_number());
    }

    #[test]
    fn reply_content_is_extracted() {
        let response = json!({"message": {"role": "assistant", "content": "ok"}, "done": true});
        assert_eq!(parse_ollama_response(&response).unwrap(), "ok");
        assert!(parse_ollama_response(&json!({"done": true})).is_err());
    }
}
